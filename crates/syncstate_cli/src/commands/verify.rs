//! Verify command implementation.

use std::path::Path;
use syncstate_core::{decode_record, record_name};
use syncstate_storage::{FileStore, RecordStore};

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Number of records checked.
    pub records_checked: usize,
    /// Number of valid records.
    pub valid_records: usize,
    /// Records that have no sources.
    pub empty_records: Vec<(String, u64)>,
    /// List of errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.empty_records.is_empty() && self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path, fix: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying store at {:?}", path);
    println!();

    let store = FileStore::open(path)?;
    let result = verify_store(&store)?;
    print_result(&result);

    if fix && !result.empty_records.is_empty() {
        let removed = remove_empty(&store, &result.empty_records);
        println!();
        println!("Deleted {removed} empty record(s)");
    }

    if !result.is_ok() && !fix {
        return Err("store verification found problems".into());
    }
    Ok(())
}

/// Checks that every object decodes, sits under the name its key derives,
/// has at least one source and no duplicate sources.
///
/// Objects are read one by one, so an unreadable object is reported rather
/// than failing the whole run.
pub fn verify_store<S: RecordStore>(store: &S) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let mut result = VerifyResult::default();

    for name in store.names()? {
        let object = match store.get(&name) {
            Ok(Some(object)) => object,
            // Deleted since it was listed.
            Ok(None) => continue,
            Err(e) => {
                result.records_checked += 1;
                result.errors.push(format!("{name}: {e}"));
                continue;
            }
        };
        result.records_checked += 1;
        let version = object.version;

        let record = match decode_record(object) {
            Ok(record) => record,
            Err(e) => {
                result.errors.push(format!("{name}: {e}"));
                continue;
            }
        };

        let mut valid = true;
        let expected = record_name(record.resource_type, &record.key);
        if expected != name {
            result
                .errors
                .push(format!("{name}: key {:?} derives name {expected}", record.key));
            valid = false;
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &record.sources {
            if !seen.insert(&entry.source) {
                result
                    .errors
                    .push(format!("{name}: duplicate source {}", entry.source));
                valid = false;
            }
        }

        if record.is_empty() {
            result.empty_records.push((name, version));
            valid = false;
        }

        if valid {
            result.valid_records += 1;
        }
    }

    Ok(result)
}

/// Deletes the listed records, each conditional on its observed version.
/// Returns how many were deleted.
pub fn remove_empty<S: RecordStore>(store: &S, records: &[(String, u64)]) -> usize {
    records
        .iter()
        .filter(|(name, version)| match store.delete(name, Some(*version)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(record = %name, error = %e, "could not delete empty record");
                false
            }
        })
        .count()
}

fn print_result(result: &VerifyResult) {
    println!("Records checked: {}", result.records_checked);
    println!("Valid records:   {}", result.valid_records);
    println!("Empty records:   {}", result.empty_records.len());
    for (name, _) in &result.empty_records {
        println!("  - {name}");
    }
    if !result.errors.is_empty() {
        println!("Errors:");
        for error in &result.errors {
            println!("  - {error}");
        }
    }
    println!();
    println!("{}", if result.is_ok() { "OK" } else { "PROBLEMS FOUND" });
}
