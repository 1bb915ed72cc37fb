//! Nightly wandering rollup.
//!
//! Counts wandering episodes for the current night and reports the count,
//! together with the effective window boundaries, once a day at the window
//! end minute. The count is written to disk only on shutdown and read back
//! (then deleted) on the next start.

use crate::core::metrics::MetricPoint;
use crate::core::window::{NightWindow, WallClock};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Series names reported at each flush.
pub const NIGHT_START_SERIES: &str = "night_start";
pub const NIGHT_END_SERIES: &str = "night_end";
pub const WANDER_COUNT_SERIES: &str = "wander_count";

/// Persistence errors.
#[derive(Debug)]
pub enum RollupError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for RollupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollupError::IoError(e) => write!(f, "IO error: {e}"),
            RollupError::ParseError(e) => write!(f, "Parse error: {e}"),
            RollupError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for RollupError {}

/// On-disk record format.
#[derive(Debug, Serialize, Deserialize)]
struct RollupRecord {
    #[serde(rename = "wanderCount")]
    wander_count: u64,
}

/// Single-record recovery file for one agent instance.
#[derive(Debug, Clone)]
pub struct RollupStore {
    path: PathBuf,
}

impl RollupStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<data_path>/<instance_id>.rollup.json`
    pub fn for_instance(data_path: &Path, instance_id: &str) -> Self {
        Self::new(data_path.join(format!("{instance_id}.rollup.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the record, replacing any previous one.
    pub fn write(&self, wander_count: u64) -> Result<(), RollupError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RollupError::IoError(e.to_string()))?;
        }

        let json = serde_json::to_string_pretty(&RollupRecord { wander_count })
            .map_err(|e| RollupError::SerializeError(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| RollupError::IoError(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| RollupError::IoError(e.to_string()))
    }

    fn read_content(&self) -> Result<Option<String>, RollupError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RollupError::IoError(e.to_string())),
        }
    }

    fn parse(content: &str) -> Result<u64, RollupError> {
        serde_json::from_str::<RollupRecord>(content)
            .map(|r| r.wander_count)
            .map_err(|e| RollupError::ParseError(e.to_string()))
    }

    /// Read the record without removing it.
    pub fn peek(&self) -> Result<Option<u64>, RollupError> {
        self.read_content()?
            .map(|content| Self::parse(&content))
            .transpose()
    }

    /// Read the record and delete the file.
    ///
    /// The file is removed even if it cannot be parsed. A failed delete is
    /// only logged.
    pub fn take(&self) -> Result<Option<u64>, RollupError> {
        let Some(content) = self.read_content()? else {
            return Ok(None);
        };

        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Could not remove rollup file {:?}: {e}", self.path);
        }

        Self::parse(&content).map(Some)
    }
}

/// The nightly wandering count.
#[derive(Debug)]
pub struct RollupCounter {
    count: u64,
    store: RollupStore,
    last_flush: Option<NaiveDate>,
}

impl RollupCounter {
    pub fn new(store: RollupStore) -> Self {
        Self {
            count: 0,
            store,
            last_flush: None,
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn store(&self) -> &RollupStore {
        &self.store
    }

    pub fn record_wander_event(&mut self) {
        self.count += 1;
    }

    /// Report and reset if `now` is the window end minute.
    ///
    /// Returns the three rollup points on a match. Fires at most once per
    /// local day; a missed minute is not caught up.
    pub fn flush_if_window_end_now(
        &mut self,
        now: f64,
        window: &NightWindow,
        clock: &WallClock,
        bridge_id: &str,
    ) -> Option<Vec<MetricPoint>> {
        let time = clock.time_of_day(now)?;
        if !window.is_end_minute(time) {
            return None;
        }
        let day = clock.date(now)?;
        if self.last_flush == Some(day) {
            return None;
        }
        let (start, end) = clock.window_instants(window, now)?;

        let points = vec![
            MetricPoint::new(bridge_id, NIGHT_START_SERIES, now, start),
            MetricPoint::new(bridge_id, NIGHT_END_SERIES, now, end),
            MetricPoint::new(bridge_id, WANDER_COUNT_SERIES, now, self.count as f64),
        ];
        self.count = 0;
        self.last_flush = Some(day);
        Some(points)
    }

    /// Write the current count for the next start.
    pub fn persist(&self) -> Result<(), RollupError> {
        self.store.write(self.count)
    }

    /// Load a count left by a previous run and delete the record.
    ///
    /// Missing or unreadable records start the count from zero.
    pub fn restore(&mut self) -> u64 {
        self.count = match self.store.take() {
            Ok(Some(count)) => {
                tracing::info!("Restored wander count {count} from {:?}", self.store.path());
                count
            }
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!("Could not restore wander count, starting from zero: {e}");
                0
            }
        };
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(h: u32, m: u32) -> f64 {
        Utc.with_ymd_and_hms(2024, 5, 20, h, m, 0).unwrap().timestamp() as f64
    }

    fn new_counter(dir: &Path) -> RollupCounter {
        RollupCounter::new(RollupStore::for_instance(dir, "night_wander"))
    }

    #[test]
    fn test_restore_then_persist_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("night_wander.rollup.json");
        std::fs::write(&path, r#"{"wanderCount": 5}"#).unwrap();

        let mut counter = new_counter(dir.path());
        assert_eq!(counter.store().peek().unwrap(), Some(5));
        assert!(path.exists());
        assert_eq!(counter.restore(), 5);
        assert!(!path.exists());
        assert_eq!(counter.store().peek().unwrap(), None);

        counter.persist().unwrap();
        let mut again = new_counter(dir.path());
        assert_eq!(again.restore(), 5);
    }

    #[test]
    fn test_missing_and_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut counter = new_counter(dir.path());
        assert_eq!(counter.restore(), 0);

        let path = counter.store().path().to_path_buf();
        std::fs::write(&path, "{not json").unwrap();
        counter.record_wander_event();
        assert_eq!(counter.restore(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_flush_only_at_end_minute() {
        let dir = tempfile::tempdir().unwrap();
        let mut counter = new_counter(dir.path());
        let window = NightWindow::parse("23:00", "07:00").unwrap();
        let clock = WallClock::Zone(chrono_tz::UTC);

        counter.record_wander_event();
        counter.record_wander_event();

        assert!(counter
            .flush_if_window_end_now(at(6, 59), &window, &clock, "BID1")
            .is_none());
        assert!(counter
            .flush_if_window_end_now(at(7, 1), &window, &clock, "BID1")
            .is_none());
        assert_eq!(counter.count(), 2);

        let points = counter
            .flush_if_window_end_now(at(7, 0), &window, &clock, "BID1")
            .unwrap();
        assert_eq!(counter.count(), 0);
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].series, "BID1/Night_Wander/night_start");
        assert_eq!(points[0].value, at(23, 0) - 24.0 * 3600.0);
        assert_eq!(points[1].series, "BID1/Night_Wander/night_end");
        assert_eq!(points[1].value, at(7, 0));
        assert_eq!(points[2].series, "BID1/Night_Wander/wander_count");
        assert_eq!(points[2].value, 2.0);

        // Same minute again: already flushed today.
        counter.record_wander_event();
        assert!(counter
            .flush_if_window_end_now(at(7, 0) + 30.0, &window, &clock, "BID1")
            .is_none());
        assert_eq!(counter.count(), 1);
    }
}
