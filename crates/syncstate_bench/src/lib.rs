//! Benchmark utilities.

#![warn(missing_docs)]

use rand::distributions::Alphanumeric;
use rand::Rng;
use syncstate_core::{ConfigPayload, ContributionEntry, SourceIdentity};

/// Generates a random external-ID-like key of `len` characters.
pub fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates a JSON payload of roughly `size` bytes.
pub fn config_of_size(size: usize) -> ConfigPayload {
    let filler: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect();
    ConfigPayload::from_json(&serde_json::json!({ "filler": filler }))
        .unwrap_or_default()
}

/// Generates `count` entries from distinct producers.
pub fn contributions(count: usize, payload_size: usize) -> Vec<ContributionEntry> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| ContributionEntry {
            source: SourceIdentity::namespaced("BenchProducer", "bench", format!("p{i}")),
            config: config_of_size(payload_size),
            priority: rng.gen_range(0..200),
            last_updated: rng.gen_range(1_000..2_000),
        })
        .collect()
}
