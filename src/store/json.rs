use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{ScalarStore, StateStore};
use crate::error::StoreError;
use crate::instance::{InstanceId, InstanceState};

const RECORDS_DIR: &str = "instances";
const LAST_ID_FILE: &str = "last_id";
const LIVE_COUNT_FILE: &str = "live_count";

/// Directory-backed store: one JSON document per instance plus two plain
/// text scalar files.
///
/// ```text
/// <root>/instances/<id>.json
/// <root>/last_id
/// <root>/live_count
/// ```
///
/// Every write lands in a sibling temp file first and is renamed into place,
/// so a crash mid-write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join(RECORDS_DIR))?;
        Ok(Self { root })
    }

    fn record_path(&self, id: InstanceId) -> PathBuf {
        self.root.join(RECORDS_DIR).join(format!("{}.json", id.get()))
    }

    fn read_scalar(&self, name: &str) -> Result<Option<u64>, StoreError> {
        match fs::read_to_string(self.root.join(name)) {
            Ok(text) => text
                .trim()
                .parse::<u64>()
                .map(Some)
                .map_err(|err| StoreError::Unavailable(format!("{name}: {err}"))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write_scalar(&self, name: &str, value: u64) -> Result<(), StoreError> {
        write_atomic(&self.root.join(name), value.to_string().as_bytes())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

impl StateStore for JsonFileStore {
    fn load_all(&self) -> Result<Vec<InstanceState>, StoreError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(self.root.join(RECORDS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let parsed = fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<InstanceState>(&bytes)?));
            match parsed {
                Ok(state) => records.push(state),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable record");
                }
            }
        }
        records.sort_by_key(|state| state.instance_id);
        Ok(records)
    }

    fn save(&self, state: &InstanceState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.record_path(state.instance_id), &bytes)
    }

    fn delete(&self, id: InstanceId) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl ScalarStore for JsonFileStore {
    fn load_last_id(&self) -> Result<Option<InstanceId>, StoreError> {
        Ok(self.read_scalar(LAST_ID_FILE)?.and_then(InstanceId::new))
    }

    fn store_last_id(&self, id: InstanceId) -> Result<(), StoreError> {
        self.write_scalar(LAST_ID_FILE, id.get())
    }

    fn load_live_count(&self) -> Result<usize, StoreError> {
        Ok(self.read_scalar(LIVE_COUNT_FILE)?.unwrap_or(0) as usize)
    }

    fn store_live_count(&self, count: usize) -> Result<(), StoreError> {
        self.write_scalar(LIVE_COUNT_FILE, count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Extent, Geometry};
    use crate::instance::Mode;

    fn id(raw: u64) -> InstanceId {
        InstanceId::new(raw).unwrap()
    }

    #[test]
    fn records_round_trip_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let mut a = InstanceState::new(id(2), Mode::Timer, Geometry::auto_at(3, 4));
        a.window_width = Extent::Fixed(40);
        let b = InstanceState::new(id(1), Mode::Coin, Geometry::auto_at(0, 0));
        store.save(&a).unwrap();
        store.save(&b).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded, vec![b.clone(), a.clone()]);

        store.delete(id(2)).unwrap();
        store.delete(id(2)).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![b]);
    }

    #[test]
    fn corrupt_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        fs::write(dir.path().join(RECORDS_DIR).join("9.json"), b"{not json").unwrap();
        let ok = InstanceState::new(id(1), Mode::Dice, Geometry::default());
        store.save(&ok).unwrap();
        assert_eq!(store.load_all().unwrap(), vec![ok]);
    }

    #[test]
    fn bad_setting_value_keeps_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let mut doc = serde_json::to_value(InstanceState::new(id(6), Mode::Coin, Geometry::default())).unwrap();
        doc["settings"]["color"] = serde_json::json!("#+f+f+f");
        fs::write(
            dir.path().join(RECORDS_DIR).join("6.json"),
            serde_json::to_vec(&doc).unwrap(),
        )
        .unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].setting("color").is_none());
        assert!(loaded[0].flag("show_history"));
    }

    #[test]
    fn scalars_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        assert_eq!(store.load_last_id().unwrap(), None);
        assert_eq!(store.load_live_count().unwrap(), 0);
        store.store_last_id(id(12)).unwrap();
        store.store_live_count(3).unwrap();
        assert_eq!(store.load_last_id().unwrap(), Some(id(12)));
        assert_eq!(store.load_live_count().unwrap(), 3);
    }
}
