//! # SyncState Testkit
//!
//! Test utilities for SyncState.
//!
//! This crate provides:
//! - Managers over in-memory, file-backed and fault-injecting stores
//! - Property-based test generators using proptest
//! - Concurrent producer stress runs
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use syncstate_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_manager() {
//!     with_memory_manager(|manager| {
//!         let record = manager.get_or_create(&ctx(), ResourceType::Tunnel, "abc", &RecordScope::new())?;
//!         // ... test operations
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::stress::*;
    pub use syncstate_core::{
        OpContext, RecordScope, ResourceType, SourceIdentity, StateRecord, SyncStateManager,
        SyncStatus,
    };
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use stress::*;
