//! Port slot allocation.
//!
//! Each feature holds one slot index. The concrete ports for a slot are never
//! stored: they are recomputed from the index and the current [`PortConfig`],
//! so editing `per_feature` or `base` moves every existing allocation with it.
//!
//! The table lives in `.wt/port_allocations.json`. [`PortStore`] serializes
//! read-modify-write cycles across processes with an exclusive advisory lock
//! on a sibling lock file, and replaces the table via an atomic rename.

use crate::config::PortConfig;
use crate::error::{Result, WtError};
use crate::paths;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Allocation table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub index: u32,
}

/// Persisted mapping from feature name to slot index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAllocations {
    #[serde(default)]
    pub features: BTreeMap<String, Allocation>,
}

impl PortAllocations {
    pub fn get(&self, feature: &str) -> Option<Allocation> {
        self.features.get(feature).copied()
    }

    /// Assign `feature` the lowest free slot, or return the slot it already holds.
    pub fn allocate(&mut self, feature: &str, config: &PortConfig) -> Result<u32> {
        if let Some(existing) = self.features.get(feature) {
            return Ok(existing.index);
        }

        let used: BTreeSet<u32> = self.features.values().map(|a| a.index).collect();
        let max_slots = config.max_slots();
        let index = (0..max_slots)
            .find(|i| !used.contains(i))
            .ok_or_else(|| WtError::NoAvailableSlots {
                feature: feature.to_string(),
                max_slots,
            })?;

        self.features.insert(feature.to_string(), Allocation { index });
        Ok(index)
    }

    /// Release the slot held by `feature`. Returns whether anything was removed.
    pub fn deallocate(&mut self, feature: &str) -> bool {
        self.features.remove(feature).is_some()
    }

    /// Concrete ports for `feature`, or `None` if it holds no slot.
    pub fn ports_for(&self, feature: &str, config: &PortConfig) -> Option<Vec<u32>> {
        self.get(feature).map(|a| ports_for_index(config, a.index))
    }

    pub fn to_json(&self) -> Result<String> {
        let mut data = serde_json::to_string_pretty(self)?;
        data.push('\n');
        Ok(data)
    }
}

/// `config.base + index * config.per_feature + i` for each `i` in `0..per_feature`.
pub fn ports_for_index(config: &PortConfig, index: u32) -> Vec<u32> {
    let start = config.base + index * config.per_feature;
    (start..start + config.per_feature).collect()
}

// ---------------------------------------------------------------------------
// PortStore
// ---------------------------------------------------------------------------

/// Filesystem-backed allocation table for one project root.
#[derive(Debug, Clone)]
pub struct PortStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl PortStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: paths::allocations_path(root),
            lock_path: paths::allocations_lock_path(root),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the table. A missing file reads as an empty table.
    pub fn load(&self) -> Result<PortAllocations> {
        if !self.path.exists() {
            return Ok(PortAllocations::default());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(PortAllocations::default());
        }
        let table: PortAllocations = serde_json::from_str(&raw)?;
        Ok(table)
    }

    pub fn save(&self, table: &PortAllocations) -> Result<()> {
        crate::io::atomic_write(&self.path, table.to_json()?.as_bytes())
    }

    pub fn allocate(&self, feature: &str, config: &PortConfig) -> Result<u32> {
        self.update(|table| {
            let before = table.get(feature);
            let index = table.allocate(feature, config)?;
            if before.is_none() {
                tracing::info!(feature, index, "allocated port slot");
            }
            Ok((index, before.is_none()))
        })
    }

    pub fn deallocate(&self, feature: &str) -> Result<()> {
        self.update(|table| {
            let removed = table.deallocate(feature);
            if removed {
                tracing::info!(feature, "released port slot");
            }
            Ok(((), removed))
        })
    }

    /// Ports currently held by `feature`.
    pub fn ports_for(&self, feature: &str, config: &PortConfig) -> Result<Vec<u32>> {
        self.load()?
            .ports_for(feature, config)
            .ok_or_else(|| WtError::MissingAllocation(feature.to_string()))
    }

    /// Run `f` against the table while holding the lock; persist if it reports a change.
    fn update<T>(&self, f: impl FnOnce(&mut PortAllocations) -> Result<(T, bool)>) -> Result<T> {
        let _guard = self.lock()?;
        let mut table = self.load()?;
        let (out, changed) = f(&mut table)?;
        if changed {
            self.save(&table)?;
        }
        Ok(out)
    }

    fn lock(&self) -> Result<LockGuard> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(LockGuard { file })
    }
}

struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(base: u32, per_feature: u32, max: u32) -> PortConfig {
        PortConfig {
            base,
            per_feature,
            max,
        }
    }

    #[test]
    fn allocate_is_idempotent() {
        let cfg = config(3000, 10, 100);
        let mut table = PortAllocations::default();
        let first = table.allocate("auth", &cfg).unwrap();
        let second = table.allocate("auth", &cfg).unwrap();
        assert_eq!(first, second);
        assert_eq!(table.features.len(), 1);
    }

    #[test]
    fn allocate_reuses_lowest_free_slot() {
        let cfg = config(3000, 10, 100);
        let mut table = PortAllocations::default();
        assert_eq!(table.allocate("a", &cfg).unwrap(), 0);
        assert_eq!(table.allocate("b", &cfg).unwrap(), 1);
        table.deallocate("a");
        assert_eq!(table.allocate("c", &cfg).unwrap(), 0);
        assert_eq!(table.allocate("d", &cfg).unwrap(), 2);
    }

    #[test]
    fn allocate_fails_when_pool_exhausted() {
        let cfg = config(3000, 10, 20);
        let mut table = PortAllocations::default();
        assert_eq!(table.allocate("a", &cfg).unwrap(), 0);
        assert_eq!(table.allocate("b", &cfg).unwrap(), 1);
        let err = table.allocate("c", &cfg).unwrap_err();
        assert!(matches!(
            err,
            WtError::NoAvailableSlots { ref feature, max_slots: 2 } if feature == "c"
        ));
        assert!(table.get("c").is_none());
    }

    #[test]
    fn allocate_with_zero_slots_fails() {
        let cfg = config(3000, 10, 5);
        let mut table = PortAllocations::default();
        assert!(table.allocate("a", &cfg).is_err());
    }

    #[test]
    fn deallocate_missing_is_noop() {
        let mut table = PortAllocations::default();
        assert!(!table.deallocate("ghost"));
    }

    #[test]
    fn ports_for_index_is_deterministic() {
        assert_eq!(
            ports_for_index(&config(3000, 10, 100), 1),
            (3010..=3019).collect::<Vec<_>>()
        );
        assert_eq!(ports_for_index(&config(8000, 3, 30), 2), vec![8006, 8007, 8008]);
    }

    #[test]
    fn ports_follow_config_changes() {
        let mut table = PortAllocations::default();
        table.allocate("a", &config(3000, 2, 100)).unwrap();
        table.allocate("b", &config(3000, 2, 100)).unwrap();
        assert_eq!(table.ports_for("b", &config(3000, 2, 100)).unwrap(), vec![3002, 3003]);
        assert_eq!(
            table.ports_for("b", &config(3000, 4, 100)).unwrap(),
            vec![3004, 3005, 3006, 3007]
        );
    }

    #[test]
    fn store_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = PortStore::new(dir.path());
        assert_eq!(store.load().unwrap(), PortAllocations::default());
    }

    #[test]
    fn store_persists_pretty_json_with_newline() {
        let dir = TempDir::new().unwrap();
        let store = PortStore::new(dir.path());
        assert_eq!(store.allocate("feat-a", &config(3000, 10, 100)).unwrap(), 0);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.ends_with("}\n"));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["features"]["feat-a"]["index"], 0);
    }

    #[test]
    fn store_round_trips_allocations() {
        let dir = TempDir::new().unwrap();
        let store = PortStore::new(dir.path());
        let cfg = config(3000, 10, 100);
        store.allocate("a", &cfg).unwrap();
        store.allocate("b", &cfg).unwrap();
        store.deallocate("a").unwrap();
        assert_eq!(store.allocate("c", &cfg).unwrap(), 0);

        let table = store.load().unwrap();
        assert_eq!(table.get("b"), Some(Allocation { index: 1 }));
        assert_eq!(table.get("c"), Some(Allocation { index: 0 }));
        assert!(table.get("a").is_none());
    }

    #[test]
    fn store_ports_for_missing_feature_errors() {
        let dir = TempDir::new().unwrap();
        let store = PortStore::new(dir.path());
        let err = store.ports_for("nope", &config(3000, 2, 100)).unwrap_err();
        assert!(matches!(err, WtError::MissingAllocation(ref f) if f == "nope"));
        assert!(err.to_string().contains("wt up nope"));
    }

    #[test]
    fn concurrent_allocations_get_distinct_slots() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_path_buf();
        let cfg = config(3000, 2, 100);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let root = root.clone();
                std::thread::spawn(move || {
                    PortStore::new(&root)
                        .allocate(&format!("feature-{i}"), &cfg)
                        .unwrap()
                })
            })
            .collect();
        let mut indices: Vec<u32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert_eq!(PortStore::new(&root).load().unwrap().features.len(), 8);
    }
}
