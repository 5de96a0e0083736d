//! Core value types: resource kinds, sync status, and source identities.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Precedence hint attached to a contribution. Lower values win when a
/// downstream consumer resolves field conflicts.
pub type Priority = i32;

/// Priority used when a producer does not specify one.
pub const DEFAULT_PRIORITY: Priority = 100;

/// The kind of external resource a state record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceType {
    /// Cloudflare Tunnel.
    Tunnel,
    /// Ingress configuration of a tunnel.
    TunnelConfiguration,
    /// Zero Trust virtual network.
    VirtualNetwork,
    /// Private network route through a tunnel.
    NetworkRoute,
    /// DNS record in a zone.
    #[serde(rename = "DNSRecord")]
    DnsRecord,
    /// Access application.
    AccessApplication,
    /// Access group.
    AccessGroup,
    /// Access identity provider.
    AccessIdentityProvider,
    /// Access service token.
    AccessServiceToken,
    /// Device posture rule.
    DevicePostureRule,
    /// Gateway rule.
    GatewayRule,
    /// Gateway list.
    GatewayList,
    /// R2 bucket.
    R2Bucket,
    /// Zone ruleset.
    ZoneRuleset,
}

impl ResourceType {
    /// Every known resource type.
    pub const ALL: [ResourceType; 14] = [
        ResourceType::Tunnel,
        ResourceType::TunnelConfiguration,
        ResourceType::VirtualNetwork,
        ResourceType::NetworkRoute,
        ResourceType::DnsRecord,
        ResourceType::AccessApplication,
        ResourceType::AccessGroup,
        ResourceType::AccessIdentityProvider,
        ResourceType::AccessServiceToken,
        ResourceType::DevicePostureRule,
        ResourceType::GatewayRule,
        ResourceType::GatewayList,
        ResourceType::R2Bucket,
        ResourceType::ZoneRuleset,
    ];

    /// Returns the camel-case tag, e.g. `AccessApplication`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Tunnel => "Tunnel",
            ResourceType::TunnelConfiguration => "TunnelConfiguration",
            ResourceType::VirtualNetwork => "VirtualNetwork",
            ResourceType::NetworkRoute => "NetworkRoute",
            ResourceType::DnsRecord => "DNSRecord",
            ResourceType::AccessApplication => "AccessApplication",
            ResourceType::AccessGroup => "AccessGroup",
            ResourceType::AccessIdentityProvider => "AccessIdentityProvider",
            ResourceType::AccessServiceToken => "AccessServiceToken",
            ResourceType::DevicePostureRule => "DevicePostureRule",
            ResourceType::GatewayRule => "GatewayRule",
            ResourceType::GatewayList => "GatewayList",
            ResourceType::R2Bucket => "R2Bucket",
            ResourceType::ZoneRuleset => "ZoneRuleset",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownResourceType(s.to_string()))
    }
}

/// Sync state of a record as reported by the downstream sync worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Not yet pushed to the external API.
    #[default]
    Pending,
    /// External resource matches the merged configuration.
    Synced,
    /// The last sync attempt failed.
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Pending => "Pending",
            SyncStatus::Synced => "Synced",
            SyncStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Identifies one producer contributing configuration to a record.
///
/// The canonical string form is `Kind/Name` without a namespace and
/// `Kind/Namespace/Name` with one. It is stable and parses back with
/// [`FromStr`].
///
/// # Example
///
/// ```rust
/// use syncstate_core::SourceIdentity;
///
/// let source = SourceIdentity::namespaced("Ingress", "default", "web");
/// assert_eq!(source.to_string(), "Ingress/default/web");
/// assert_eq!("Ingress/default/web".parse::<SourceIdentity>().unwrap(), source);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceIdentity {
    /// Kind of the producing object, e.g. `Ingress`.
    pub kind: String,
    /// Namespace of the producing object, if it is namespaced.
    pub namespace: Option<String>,
    /// Name of the producing object.
    pub name: String,
}

impl SourceIdentity {
    /// Creates a cluster-scoped identity.
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: None,
            name: name.into(),
        }
    }

    /// Creates a namespaced identity. An empty namespace is treated as none.
    pub fn namespaced(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            kind: kind.into(),
            namespace: (!namespace.is_empty()).then_some(namespace),
            name: name.into(),
        }
    }
}

impl fmt::Display for SourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

impl FromStr for SourceIdentity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::InvalidSourceIdentity(s.to_string()));
        }
        match parts.as_slice() {
            [kind, name] => Ok(SourceIdentity::new(*kind, *name)),
            [kind, ns, name] => Ok(SourceIdentity::namespaced(*kind, *ns, *name)),
            _ => Err(CoreError::InvalidSourceIdentity(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_round_trip() {
        for t in ResourceType::ALL {
            assert_eq!(t.as_str().parse::<ResourceType>().unwrap(), t);
        }
        assert_eq!(ResourceType::DnsRecord.to_string(), "DNSRecord");
        assert!("Nope".parse::<ResourceType>().is_err());
    }

    #[test]
    fn sync_status_default_is_pending() {
        assert_eq!(SyncStatus::default(), SyncStatus::Pending);
        assert_eq!(SyncStatus::Synced.to_string(), "Synced");
    }

    #[test]
    fn source_identity_string_form() {
        let cluster = SourceIdentity::new("AccessApplication", "my-app");
        assert_eq!(cluster.to_string(), "AccessApplication/my-app");

        let namespaced = SourceIdentity::namespaced("Ingress", "default", "my-app-ingress");
        assert_eq!(namespaced.to_string(), "Ingress/default/my-app-ingress");
    }

    #[test]
    fn empty_namespace_is_none() {
        let source = SourceIdentity::namespaced("AccessApplication", "", "my-app");
        assert_eq!(source.namespace, None);
        assert_eq!(source, SourceIdentity::new("AccessApplication", "my-app"));
    }

    #[test]
    fn source_identity_parse() {
        let parsed: SourceIdentity = "Ingress/default/web".parse().unwrap();
        assert_eq!(parsed.namespace.as_deref(), Some("default"));

        let parsed: SourceIdentity = "ClusterTunnel/main".parse().unwrap();
        assert_eq!(parsed.namespace, None);
        assert_eq!(parsed.name, "main");
    }

    #[test]
    fn source_identity_parse_rejects_malformed() {
        for bad in ["", "Kind", "Kind/", "/name", "a/b/c/d", "Kind//name"] {
            assert!(bad.parse::<SourceIdentity>().is_err(), "{bad:?} should fail");
        }
    }
}
