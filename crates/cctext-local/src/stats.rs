//! Run counters, written as one JSON object.
//!
//! Two shapes: plain counters (`"total-response-count": 12`) and per-value
//! breakdowns (`"mime-type": {"text/html": 9, "__null": 1}`).

use cctext_core::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Breakdown key for a missing value.
pub const NULL_VALUE: &str = "__null";

#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    #[serde(flatten)]
    counters: BTreeMap<String, u64>,
    #[serde(flatten)]
    breakdowns: BTreeMap<String, BTreeMap<String, u64>>,
}

impl Stats {
    pub fn bump(&mut self, stat: &str) {
        self.bump_by(stat, 1);
    }

    pub fn bump_by(&mut self, stat: &str, amount: u64) {
        *self.counters.entry(stat.to_string()).or_default() += amount;
    }

    pub fn bump_value(&mut self, stat: &str, value: Option<&str>) {
        let value = value.unwrap_or(NULL_VALUE);
        *self
            .breakdowns
            .entry(stat.to_string())
            .or_default()
            .entry(value.to_string())
            .or_default() += 1;
    }

    pub fn counter(&self, stat: &str) -> u64 {
        self.counters.get(stat).copied().unwrap_or(0)
    }

    pub fn breakdown(&self, stat: &str, value: &str) -> u64 {
        self.breakdowns
            .get(stat)
            .and_then(|m| m.get(value))
            .copied()
            .unwrap_or(0)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Truncates and rewrites `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec(self).map_err(std::io::Error::other)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

/// Writes stats to a file at the end of a run and, optionally, every `every`.
#[derive(Debug)]
pub struct StatsFile {
    path: PathBuf,
    every: Option<Duration>,
    last: Instant,
}

impl StatsFile {
    pub fn new(path: impl Into<PathBuf>, every: Option<Duration>) -> Self {
        Self {
            path: path.into(),
            every,
            last: Instant::now(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn maybe_flush(&mut self, stats: &Stats) -> Result<bool> {
        match self.every {
            Some(every) if self.last.elapsed() >= every => {
                self.flush(stats)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn flush(&mut self, stats: &Stats) -> Result<()> {
        self.last = Instant::now();
        stats.write_to(&self.path)
    }
}
