//! Inventory file load and save.
//!
//! The file is JSON5 so it can be edited by hand. Saves are written as plain
//! JSON (a JSON5 subset) to a sibling temp file and renamed into place.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::record::Basestation;
use crate::config::types::RetryPolicy;
use crate::error::PersistenceError;
use crate::hardware::types::normalize_address;
use crate::hardware::BasestationRadio;

/// Persisted form of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredBasestation {
    #[serde(alias = "mac")]
    pub address: String,
    #[serde(default = "default_unreachable")]
    pub unreachable: bool,
    #[serde(default)]
    pub last_state: bool,
}

fn default_unreachable() -> bool {
    true
}

/// Older inventories stored a bare list of addresses.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Address(String),
    Record(StoredBasestation),
}

impl From<StoredEntry> for StoredBasestation {
    fn from(entry: StoredEntry) -> Self {
        match entry {
            StoredEntry::Address(address) => StoredBasestation {
                address,
                unreachable: true,
                last_state: false,
            },
            StoredEntry::Record(record) => record,
        }
    }
}

impl From<&Basestation> for StoredBasestation {
    fn from(record: &Basestation) -> Self {
        Self {
            address: record.address().to_string(),
            unreachable: record.is_unreachable(),
            last_state: record.power_state(),
        }
    }
}

/// Parse inventory text. Any invalid entry rejects the whole document.
pub fn parse_inventory(content: &str) -> Result<Vec<StoredBasestation>, PersistenceError> {
    let entries: Vec<StoredEntry> =
        json5::from_str(content).map_err(|e| PersistenceError::Malformed(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut stored = Vec::with_capacity(entries.len());

    for entry in entries {
        let mut record = StoredBasestation::from(entry);
        record.address = normalize_address(&record.address);

        if record.address.is_empty() {
            return Err(PersistenceError::Malformed("entry with empty address".to_string()));
        }
        if !seen.insert(record.address.clone()) {
            warn!("Duplicate basestation {} in inventory, keeping the first entry", record.address);
            continue;
        }
        stored.push(record);
    }

    Ok(stored)
}

pub struct InventoryStore {
    path: PathBuf,
}

impl InventoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read persisted entries. Missing or malformed files both yield `None`.
    pub async fn load_entries(&self) -> Option<Vec<StoredBasestation>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No inventory at {:?}", self.path);
                return None;
            }
            Err(e) => {
                error!("Failed to read inventory {:?}, reason: {}", self.path, e);
                return None;
            }
        };

        match parse_inventory(&content) {
            Ok(entries) => Some(entries),
            Err(e) => {
                error!("Failed to load basestations from {:?}, reason: {}", self.path, e);
                None
            }
        }
    }

    /// Load records, materializing a radio link for each persisted address.
    pub async fn load(
        &self,
        radio: &dyn BasestationRadio,
        retry: RetryPolicy,
    ) -> Option<Vec<Basestation>> {
        let entries = self.load_entries().await?;

        let records: Vec<Basestation> = entries
            .into_iter()
            .map(|e| {
                Basestation::restored(radio.link(&e.address), e.unreachable, e.last_state)
                    .with_retry(retry)
            })
            .collect();

        info!("Loaded {} basestations!", records.len());
        Some(records)
    }

    pub async fn save(&self, records: &[Basestation]) -> Result<(), PersistenceError> {
        let stored: Vec<StoredBasestation> = records.iter().map(StoredBasestation::from).collect();
        self.save_entries(&stored).await?;
        info!("Saved {} basestations to {:?}", stored.len(), self.path);
        Ok(())
    }

    pub async fn save_entries(
        &self,
        entries: &[StoredBasestation],
    ) -> Result<(), PersistenceError> {
        let content = serde_json::to_string_pretty(entries)?;
        let io_err = |path: &Path| {
            let path = path.display().to_string();
            move |source: std::io::Error| PersistenceError::Io { path, source }
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_err(parent))?;
        }

        let tmp = self.temp_path();
        tokio::fs::write(&tmp, content).await.map_err(io_err(&tmp))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(&self.path)(e));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockDevice, MockRadio};

    fn address(i: usize) -> String {
        format!("C3:1A:0B:22:9F:{:02X}", i)
    }

    #[tokio::test]
    async fn test_round_trip_preserves_order_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = InventoryStore::new(dir.path().join("basestations.json5"));

        for n in 0..=5 {
            let entries: Vec<StoredBasestation> = (0..n)
                .map(|i| StoredBasestation {
                    address: address(n - i),
                    unreachable: i % 2 == 0,
                    last_state: i % 3 == 0,
                })
                .collect();

            store.save_entries(&entries).await.unwrap();
            let loaded = store.load_entries().await.expect("inventory present");
            assert_eq!(loaded, entries, "round trip of {n} records");
        }
    }

    #[tokio::test]
    async fn test_save_records_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = InventoryStore::new(dir.path().join("nested").join("fleet.json5"));
        let radio = MockRadio::new(vec![]);

        let records = vec![
            Basestation::restored(MockDevice::new(&address(2), true, true).link(), false, true),
            Basestation::discovered(MockDevice::new(&address(1), true, false).link()),
        ];
        store.save(&records).await.unwrap();
        assert!(!store.temp_path().exists());

        let loaded = store.load(&radio, RetryPolicy::single()).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].address(), address(2));
        assert!(!loaded[0].is_unreachable());
        assert!(loaded[0].power_state());
        assert_eq!(loaded[1].address(), address(1));
        assert!(loaded[1].is_unreachable());
        assert!(!loaded[1].power_state());
    }

    #[tokio::test]
    async fn test_missing_file_is_no_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let store = InventoryStore::new(dir.path().join("absent.json5"));
        assert!(store.load_entries().await.is_none());
    }

    #[tokio::test]
    async fn test_malformed_file_is_no_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("basestations.json5");
        let store = InventoryStore::new(&path);

        for content in [
            "{not json",
            "{\"address\": \"C3:1A:0B:22:9F:01\"}",
            "[{\"address\": \"C3:1A:0B:22:9F:01\"}, 42]",
            "[{\"address\": \"\"}]",
            "[{\"unreachable\": false}]",
        ] {
            std::fs::write(&path, content).unwrap();
            assert!(store.load_entries().await.is_none(), "content {content:?} should be rejected");
        }
    }

    #[test]
    fn test_legacy_shapes() {
        let parsed = parse_inventory(
            r#"[
                // hand-edited
                "c3:1a:0b:22:9f:01",
                {address: "C3:1A:0B:22:9F:02"},
                {mac: "C3:1A:0B:22:9F:03", unreachable: false, last_state: true},
            ]"#,
        )
        .unwrap();

        assert_eq!(
            parsed,
            vec![
                StoredBasestation { address: address(1), unreachable: true, last_state: false },
                StoredBasestation { address: address(2), unreachable: true, last_state: false },
                StoredBasestation { address: address(3), unreachable: false, last_state: true },
            ]
        );
    }

    #[test]
    fn test_duplicates_collapsed() {
        let parsed = parse_inventory(
            r#"[{"address": "C3:1A:0B:22:9F:01", "unreachable": false, "last_state": true},
                {"address": "c3:1a:0b:22:9f:01", "unreachable": true, "last_state": false}]"#,
        )
        .unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(!parsed[0].unreachable);
    }

    fn entry() -> StoredBasestation {
        StoredBasestation { address: address(1), unreachable: false, last_state: true }
    }

    #[tokio::test]
    async fn test_save_under_regular_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let store = InventoryStore::new(blocker.join("basestations.json5"));

        let result = store.save_entries(&[entry()]).await;

        assert!(matches!(result, Err(PersistenceError::Io { .. })));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("basestations.json5");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "").unwrap();
        let store = InventoryStore::new(&path);

        let result = store.save_entries(&[entry()]).await;

        assert!(matches!(result, Err(PersistenceError::Io { .. })));
        assert!(!store.temp_path().exists());
        assert!(path.join("keep").exists());
    }
}
