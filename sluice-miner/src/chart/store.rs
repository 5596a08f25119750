//! Versioned chart persistence.
//!
//! The persisted payload is a v2 envelope around a schema-1 state.
//! Bare schema-1 objects from older builds load fine; anything
//! unrecognizable loads as "no data" and causes a cold start, never an
//! error. NaN gaps cross the wire as JSON null. Storage itself is a
//! last-writer-wins string KV behind [`StorageBackend`]; write failures
//! are logged and swallowed so a full disk cannot take the chart down.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::series::ChartState;
use super::Channel;
use crate::tracing::prelude::*;

pub const ENVELOPE_VERSION: u32 = 2;
pub const SCHEMA_VERSION: u32 = 1;

const DEFAULT_KEY: &str = "sluice.chart.v2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub v: u32,
    /// Persisted-at wall clock, epoch ms.
    pub ts: i64,
    pub state: PersistedState,
}

/// Schema-1 chart state as it sits in storage. Temperature arrays were
/// added after the first release and stay optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub schema: u32,
    pub labels: Vec<i64>,
    #[serde(rename = "dataData1m")]
    pub data_1m: Vec<Option<f64>>,
    #[serde(rename = "dataData10m")]
    pub data_10m: Vec<Option<f64>>,
    #[serde(rename = "dataData1h")]
    pub data_1h: Vec<Option<f64>>,
    #[serde(rename = "dataData1d")]
    pub data_1d: Vec<Option<f64>>,
    #[serde(rename = "dataVregTemp", default)]
    pub data_vreg_temp: Option<Vec<Option<f64>>>,
    #[serde(rename = "dataAsicTemp", default)]
    pub data_asic_temp: Option<Vec<Option<f64>>>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("payload could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Last-writer-wins string KV.
pub trait StorageBackend: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// In-memory KV. Clones share the same map, so a handle kept outside
/// a [`ChartStore`] sees what the store writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
#[derive(Debug)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl StorageBackend for FileBackend {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn to_wire(values: &[f64]) -> Vec<Option<f64>> {
    values
        .iter()
        .map(|v| v.is_finite().then_some(*v))
        .collect()
}

fn from_wire(values: Vec<Option<f64>>) -> Vec<f64> {
    values
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect()
}

fn to_persisted(state: &ChartState) -> PersistedState {
    PersistedState {
        schema: SCHEMA_VERSION,
        labels: state.labels().to_vec(),
        data_1m: to_wire(state.channel(Channel::Hashrate1m)),
        data_10m: to_wire(state.channel(Channel::Hashrate10m)),
        data_1h: to_wire(state.channel(Channel::Hashrate1h)),
        data_1d: to_wire(state.channel(Channel::Hashrate1d)),
        data_vreg_temp: Some(to_wire(state.channel(Channel::VregTemp))),
        data_asic_temp: Some(to_wire(state.channel(Channel::AsicTemp))),
    }
}

fn from_persisted(persisted: PersistedState, cap: usize) -> ChartState {
    let values: [Vec<f64>; Channel::COUNT] = [
        from_wire(persisted.data_1m),
        from_wire(persisted.data_10m),
        from_wire(persisted.data_1h),
        from_wire(persisted.data_1d),
        from_wire(persisted.data_vreg_temp.unwrap_or_default()),
        from_wire(persisted.data_asic_temp.unwrap_or_default()),
    ];
    let mut state = ChartState::from_parts(persisted.labels, values);
    let repair = state.repair();
    if repair.padded > 0 || repair.truncated > 0 || repair.reset {
        debug!(
            padded = repair.padded,
            truncated = repair.truncated,
            reset = repair.reset,
            "persisted chart state needed repair"
        );
    }
    state.enforce_cap(cap);
    state
}

/// Saves and restores the chart state under one storage key.
pub struct ChartStore {
    backend: Box<dyn StorageBackend>,
    key: String,
}

impl ChartStore {
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self::with_key(backend, DEFAULT_KEY)
    }

    pub fn with_key(backend: Box<dyn StorageBackend>, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Persists the state. Failures are logged and swallowed.
    pub fn save(&mut self, state: &ChartState, now_ms: i64) {
        let envelope = Envelope {
            v: ENVELOPE_VERSION,
            ts: now_ms,
            state: to_persisted(state),
        };
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%err, "chart state failed to encode");
                return;
            }
        };
        if let Err(err) = self.backend.put(&self.key, &payload) {
            warn!(%err, "chart state failed to persist");
        }
    }

    /// Loads the newest persisted state, or `None` for a cold start.
    /// Bare schema-1 payloads (pre-envelope builds) are migrated on the
    /// fly; garbage is treated as no data.
    pub fn load(&self, cap: usize) -> Option<ChartState> {
        let raw = match self.backend.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(%err, "chart state failed to load");
                return None;
            }
        };

        if let Ok(envelope) = serde_json::from_str::<Envelope>(&raw) {
            if envelope.v == ENVELOPE_VERSION && envelope.state.schema == SCHEMA_VERSION {
                return Some(from_persisted(envelope.state, cap));
            }
            debug!(
                v = envelope.v,
                schema = envelope.state.schema,
                "persisted chart state has unknown version"
            );
            return None;
        }

        if let Ok(bare) = serde_json::from_str::<PersistedState>(&raw) {
            if bare.schema == SCHEMA_VERSION {
                return Some(from_persisted(bare, cap));
            }
        }

        debug!("persisted chart state is unrecognizable, cold start");
        None
    }

    /// Explicitly wipes the persisted state. This is the only path
    /// that touches storage destructively.
    pub fn clear(&mut self) {
        if let Err(err) = self.backend.remove(&self.key) {
            warn!(%err, "chart state failed to clear");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Row;

    fn assert_series_eq(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                (a.is_nan() && e.is_nan()) || a == e,
                "series mismatch: {a} vs {e}"
            );
        }
    }

    fn sample_state() -> ChartState {
        let mut state = ChartState::new();
        let mut row: Row = [9.2e12, 9.1e12, 9.0e12, 8.9e12, 58.0, 61.0];
        state.append_point(1_000, &row);
        row[Channel::Hashrate1m.index()] = f64::NAN;
        row[Channel::VregTemp.index()] = f64::NAN;
        state.append_point(2_000, &row);
        row[Channel::Hashrate1m.index()] = 9.3e12;
        row[Channel::VregTemp.index()] = 58.5;
        state.append_point(3_000, &row);
        state
    }

    #[test]
    fn round_trip_preserves_values_and_gaps() {
        let state = sample_state();
        let mut store = ChartStore::new(Box::new(MemoryBackend::new()));
        store.save(&state, 10_000);

        let loaded = store.load(20_000).unwrap();
        assert_eq!(loaded.labels(), state.labels());
        for ch in Channel::ALL {
            assert_series_eq(loaded.channel(ch), state.channel(ch));
        }
    }

    #[test]
    fn envelope_carries_version_and_timestamp() {
        let raw = serde_json::to_string(&Envelope {
            v: ENVELOPE_VERSION,
            ts: 42_000,
            state: to_persisted(&sample_state()),
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["v"], 2);
        assert_eq!(value["ts"], 42_000);
        assert_eq!(value["state"]["schema"], 1);
        assert!(value["state"]["dataData1m"].is_array());
        // The NaN gap is a JSON null on the wire.
        assert!(value["state"]["dataData1m"][1].is_null());
    }

    #[test]
    fn bare_schema_one_is_migrated() {
        let raw = serde_json::json!({
            "schema": 1,
            "labels": [1000, 2000],
            "dataData1m": [1.0, 2.0],
            "dataData10m": [1.0, 2.0],
            "dataData1h": [1.0, 2.0],
            "dataData1d": [1.0, null]
        })
        .to_string();
        let mut backend = MemoryBackend::new();
        backend.put(DEFAULT_KEY, &raw).unwrap();
        let store = ChartStore::new(Box::new(backend));

        let loaded = store.load(20_000).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(loaded.channel(Channel::Hashrate1d)[1].is_nan());
        // Missing temperature arrays pad out as gaps.
        assert_series_eq(loaded.channel(Channel::VregTemp), &[f64::NAN, f64::NAN]);
    }

    #[test]
    fn garbage_loads_as_cold_start() {
        for raw in ["", "hello {", "[1,2,3]", "{\"v\": 7}", "{\"schema\": 9}"] {
            let mut backend = MemoryBackend::new();
            backend.put(DEFAULT_KEY, raw).unwrap();
            let store = ChartStore::new(Box::new(backend));
            assert!(store.load(20_000).is_none(), "accepted garbage: {raw}");
        }
    }

    #[test]
    fn unknown_envelope_version_is_a_cold_start() {
        let raw = serde_json::json!({
            "v": 3,
            "ts": 0,
            "state": {
                "schema": 1,
                "labels": [1000],
                "dataData1m": [1.0],
                "dataData10m": [1.0],
                "dataData1h": [1.0],
                "dataData1d": [1.0]
            }
        })
        .to_string();
        let mut backend = MemoryBackend::new();
        backend.put(DEFAULT_KEY, &raw).unwrap();
        let store = ChartStore::new(Box::new(backend));
        assert!(store.load(20_000).is_none());
    }

    #[test]
    fn load_applies_the_point_cap() {
        let mut state = ChartState::new();
        for i in 0..30 {
            state.append_point(i * 1_000, &[1.0; Channel::COUNT]);
        }
        let mut store = ChartStore::new(Box::new(MemoryBackend::new()));
        store.save(&state, 50_000);

        let loaded = store.load(10).unwrap();
        assert_eq!(loaded.len(), 10);
        assert_eq!(loaded.labels()[0], 20_000);
    }

    #[test]
    fn short_series_are_repaired_on_load() {
        let raw = serde_json::json!({
            "schema": 1,
            "labels": [1000, 2000, 3000],
            "dataData1m": [1.0],
            "dataData10m": [1.0, 2.0, 3.0],
            "dataData1h": [1.0, 2.0, 3.0],
            "dataData1d": [1.0, 2.0, 3.0]
        })
        .to_string();
        let mut backend = MemoryBackend::new();
        backend.put(DEFAULT_KEY, &raw).unwrap();
        let store = ChartStore::new(Box::new(backend));

        let loaded = store.load(20_000).unwrap();
        assert_eq!(loaded.channel(Channel::Hashrate1m).len(), 3);
        assert!(loaded.channel(Channel::Hashrate1m)[2].is_nan());
    }

    struct FailingBackend;

    impl StorageBackend for FailingBackend {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }

        fn put(&mut self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk full")))
        }

        fn remove(&mut self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Io(std::io::Error::other("disk gone")))
        }
    }

    #[test]
    fn backend_failures_are_swallowed() {
        let mut store = ChartStore::new(Box::new(FailingBackend));
        store.save(&sample_state(), 1_000);
        assert!(store.load(20_000).is_none());
        store.clear();
    }

    #[test]
    fn clear_wipes_the_key() {
        let mut store = ChartStore::new(Box::new(MemoryBackend::new()));
        store.save(&sample_state(), 1_000);
        assert!(store.load(20_000).is_some());
        store.clear();
        assert!(store.load(20_000).is_none());
    }

    #[test]
    fn file_backend_round_trips() {
        let dir = std::env::temp_dir().join(format!("sluice-store-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let mut backend = FileBackend::new(&dir);
        assert!(backend.get("k").unwrap().is_none());
        backend.put("k", "payload").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("payload"));
        backend.put("k", "newer").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("newer"));
        backend.remove("k").unwrap();
        assert!(backend.get("k").unwrap().is_none());
        // Removing a missing key is fine.
        backend.remove("k").unwrap();

        let _ = std::fs::remove_dir_all(&dir);
    }
}
