//! Property-based test generators using proptest.
//!
//! Provides strategies for generating identities, keys and contribution
//! entries that satisfy the record model's invariants.

use proptest::prelude::*;
use syncstate_core::{ConfigPayload, ContributionEntry, ResourceType, SourceIdentity};

/// Strategy for any resource type.
pub fn resource_type_strategy() -> impl Strategy<Value = ResourceType> {
    prop::sample::select(ResourceType::ALL.to_vec())
}

/// Strategy for source identities, with and without a namespace.
pub fn source_identity_strategy() -> impl Strategy<Value = SourceIdentity> {
    (
        prop::string::string_regex("[A-Z][A-Za-z]{0,15}").expect("Invalid regex"),
        prop::option::of(prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")),
        prop::string::string_regex("[a-z][a-z0-9-]{0,20}").expect("Invalid regex"),
    )
        .prop_map(|(kind, namespace, name)| match namespace {
            Some(ns) => SourceIdentity::namespaced(kind, ns, name),
            None => SourceIdentity::new(kind, name),
        })
}

/// Strategy for record keys as external systems produce them: mixed case,
/// punctuation and occasionally very long.
pub fn record_key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        prop::string::string_regex("[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{12}").expect("Invalid regex"),
        prop::string::string_regex("[A-Za-z0-9][A-Za-z0-9 ._/-]{0,80}").expect("Invalid regex"),
    ]
}

/// Strategy for small JSON configuration payloads.
pub fn config_payload_strategy() -> impl Strategy<Value = ConfigPayload> {
    prop::collection::btree_map(
        prop::string::string_regex("[a-z]{1,8}").expect("Invalid regex"),
        any::<i64>(),
        0..4,
    )
    .prop_map(|map| ConfigPayload::from_json(&map).expect("map serializes"))
}

/// Strategy for contribution entries with timestamps in a narrow window,
/// so that merges see both newer and older entries.
pub fn contribution_strategy() -> impl Strategy<Value = ContributionEntry> {
    (
        source_identity_strategy(),
        config_payload_strategy(),
        -10i32..200,
        1_000u64..1_010,
    )
        .prop_map(|(source, config, priority, last_updated)| ContributionEntry {
            source,
            config,
            priority,
            last_updated,
        })
}

/// Strategy for entry lists with unique identities.
pub fn unique_contributions_strategy(
    max: usize,
) -> impl Strategy<Value = Vec<ContributionEntry>> {
    prop::collection::vec(contribution_strategy(), 0..=max).prop_map(|entries| {
        let mut seen = std::collections::HashSet::new();
        entries
            .into_iter()
            .filter(|e| seen.insert(e.source.clone()))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use syncstate_core::{record_name, MAX_NAME_LEN};

    proptest! {
        #[test]
        fn identities_round_trip_through_display(source in source_identity_strategy()) {
            let parsed: SourceIdentity = source.to_string().parse().unwrap();
            prop_assert_eq!(parsed, source);
        }

        #[test]
        fn generated_keys_name_valid_records(
            resource_type in resource_type_strategy(),
            key in record_key_strategy(),
        ) {
            let name = record_name(resource_type, &key);
            prop_assert!(name.len() <= MAX_NAME_LEN);
            prop_assert!(syncstate_storage::validate_name(&name).is_ok());
        }

        #[test]
        fn unique_contributions_are_unique(entries in unique_contributions_strategy(8)) {
            let identities: HashSet<_> = entries.iter().map(|e| e.source.clone()).collect();
            prop_assert_eq!(identities.len(), entries.len());
        }
    }
}
