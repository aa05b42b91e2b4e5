// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights with Burn's named MessagePack
// recorder at full precision, plus the two configs needed to
// rebuild the model and the run.
//
// File naming convention:
//   <run_dir>/
//     model_baseline.mpk  ← weights before the first batch
//     model_final.mpk     ← weights after the last batch
//     model_config.json   ← SummarizerConfig (architecture)
//     run_config.json     ← RunConfig (hyperparameters, paths)
//
// The recorder appends the `.mpk` extension itself.
//
// Loading fails if the saved record does not match the
// architecture of the model it is loaded into; the model config
// is always written next to the weights.

use anyhow::{Context, Result};
use serde::Serialize;
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};

use crate::application::run_use_case::RunConfig;
use crate::ml::model::{Summarizer, SummarizerConfig};
use crate::ml::similarity::SimilaritySource;

// f32 on disk: a 1e-5 learning-rate update is below f16 resolution.
type CheckpointRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

/// run_config.json: the config plus the similarity encoder it resolved to.
#[derive(Serialize)]
struct SavedRunConfig<'a> {
    #[serde(flatten)]
    config: &'a RunConfig,
    similarity: SimilaritySource,
}

const MODEL_CONFIG_FILE: &str = "model_config.json";
const RUN_CONFIG_FILE: &str = "run_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTag {
    Baseline,
    Final,
}

impl CheckpointTag {
    fn stem(&self) -> &'static str {
        match self {
            CheckpointTag::Baseline => "model_baseline",
            CheckpointTag::Final => "model_final",
        }
    }
}

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the directory and prove a file can be written there.
    pub fn ensure_writable(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create run directory '{}'", self.dir.display()))?;
        let probe = self.dir.join(".write_probe");
        fs::write(&probe, b"ok")
            .with_context(|| format!("Run directory '{}' is not writable", self.dir.display()))?;
        fs::remove_file(&probe).ok();
        Ok(())
    }

    pub fn has_model(&self, tag: CheckpointTag) -> bool {
        self.dir.join(format!("{}.mpk", tag.stem())).exists()
    }

    pub fn save_model<B: Backend>(&self, model: &Summarizer<B>, tag: CheckpointTag) -> Result<()> {
        let path = self.dir.join(tag.stem());

        CheckpointRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        tracing::info!("Saved {:?} checkpoint to '{}.mpk'", tag, path.display());
        Ok(())
    }

    /// Load `tag` weights into a model of the matching architecture.
    pub fn load_model<B: Backend>(
        &self,
        model: Summarizer<B>,
        tag: CheckpointTag,
        device: &B::Device,
    ) -> Result<Summarizer<B>> {
        let path = self.dir.join(tag.stem());

        let record = CheckpointRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!(
                    "Cannot load checkpoint '{}'. Has the run finished?",
                    path.display()
                )
            })?;

        Ok(model.load_record(record))
    }

    pub fn save_model_config(&self, cfg: &SummarizerConfig) -> Result<()> {
        let path = self.dir.join(MODEL_CONFIG_FILE);
        cfg.save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))?;
        tracing::debug!("Saved model config to '{}'", path.display());
        Ok(())
    }

    pub fn load_model_config(&self) -> Result<SummarizerConfig> {
        let path = self.dir.join(MODEL_CONFIG_FILE);
        SummarizerConfig::load(&path).map_err(|e| {
            anyhow::anyhow!("Cannot read model config from '{}': {:?}", path.display(), e)
        })
    }

    pub fn save_run_config(&self, cfg: &RunConfig) -> Result<()> {
        let path = self.dir.join(RUN_CONFIG_FILE);
        let json = serde_json::to_string_pretty(&SavedRunConfig {
            config: cfg,
            similarity: cfg.similarity_source(),
        })?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    pub fn load_run_config(&self) -> Result<RunConfig> {
        let path = self.dir.join(RUN_CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure 'run' has been executed first.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }
}
