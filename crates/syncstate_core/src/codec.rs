//! CBOR encoding of state records into store payloads.

use crate::error::{CoreError, CoreResult};
use crate::record::StateRecord;
use syncstate_storage::StoredObject;

/// Encodes the persisted fields of `record`.
///
/// # Errors
///
/// Returns `Codec` if CBOR encoding fails.
pub fn encode_record(record: &StateRecord) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(record, &mut buf).map_err(|e| CoreError::Codec {
        record: record.name().to_string(),
        message: e.to_string(),
    })?;
    Ok(buf)
}

/// Decodes a stored object, attaching its name and version.
///
/// # Errors
///
/// Returns `Codec` if the payload is not a valid record.
pub fn decode_record(object: StoredObject) -> CoreResult<StateRecord> {
    let mut record: StateRecord =
        ciborium::from_reader(object.data.as_slice()).map_err(|e| CoreError::Codec {
            record: object.name.clone(),
            message: e.to_string(),
        })?;
    record.name = object.name;
    record.version = object.version;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ConfigPayload, ContributionEntry, RecordScope};
    use crate::types::{ResourceType, SourceIdentity, SyncStatus};
    use syncstate_storage::Labels;

    #[test]
    fn stored_object_carries_name_and_version() {
        let mut record = StateRecord::new(
            ResourceType::Tunnel,
            "pending-main",
            RecordScope::new().with_account("acc"),
        );
        record.upsert_source(ContributionEntry::new(
            SourceIdentity::namespaced("ClusterTunnel", "ops", "main"),
            ConfigPayload::from_json(&serde_json::json!({ "name": "main" })).unwrap(),
            50,
        ));
        record.sync_status = SyncStatus::Error;
        record.result_data.insert("error".into(), "quota".into());

        let object = StoredObject {
            name: record.name().to_string(),
            version: 7,
            labels: Labels::new(),
            data: encode_record(&record).unwrap(),
        };
        let decoded = decode_record(object).unwrap();

        assert_eq!(decoded.version(), 7);
        assert_eq!(decoded.name(), "tunnel-pending-main");
        assert_eq!(decoded.sources, record.sources);
        assert_eq!(decoded.scope, record.scope);
        assert_eq!(decoded.sync_status, SyncStatus::Error);
        assert_eq!(decoded.result_data["error"], "quota");
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let object = StoredObject {
            name: "tunnel-x".into(),
            version: 1,
            labels: Labels::new(),
            data: vec![0xff, 0x00, 0x13],
        };
        let err = decode_record(object).unwrap_err();
        assert!(matches!(err, CoreError::Codec { ref record, .. } if record == "tunnel-x"));
    }
}
