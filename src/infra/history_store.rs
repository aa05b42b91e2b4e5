// JSON persistence for the run's History, qualitative samples and
// the baseline-vs-final comparison.

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::domain::history::{History, HistoryFile, QualitativeSample};

const HISTORY_FILE: &str = "history.json";
const SAMPLES_FILE: &str = "samples.json";
const COMPARISON_FILE: &str = "comparison.json";

pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    pub fn save_history(&self, history: &History) -> Result<PathBuf> {
        self.write_json(HISTORY_FILE, &history.to_file())
    }

    pub fn load_history(&self) -> Result<History> {
        let file: HistoryFile = self.read_json(HISTORY_FILE)?;
        History::from_file(&file)
            .with_context(|| format!("'{}' is not a valid history", self.history_path().display()))
    }

    pub fn save_samples(&self, samples: &[QualitativeSample]) -> Result<PathBuf> {
        self.write_json(SAMPLES_FILE, &samples)
    }

    #[cfg(test)]
    pub fn load_samples(&self) -> Result<Vec<QualitativeSample>> {
        self.read_json(SAMPLES_FILE)
    }

    pub fn save_comparison<T: Serialize>(&self, comparison: &T) -> Result<PathBuf> {
        self.write_json(COMPARISON_FILE, comparison)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(value)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Wrote '{}'", path.display());
        Ok(path)
    }

    fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path: &Path = &self.dir.join(name);
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read '{}'", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Cannot parse '{}'", path.display()))
    }
}
