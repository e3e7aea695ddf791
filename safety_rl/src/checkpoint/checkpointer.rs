//! Network checkpointing for the actor-critic learner.
//!
//! Each network is stored under its own name as
//! `<dir>/<name>_<step:08>.bin`. Only the most recent `max_models` files per
//! name are kept on disk.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;

use crate::error::{Result, SafetyRlError};

/// Configuration for the checkpointer.
#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    /// Directory to store checkpoints.
    pub checkpoint_dir: PathBuf,
    /// Updates between checkpoint saves.
    pub save_interval: usize,
    /// Number of recent checkpoints to keep per network (0 = keep all).
    pub max_models: usize,
}

impl Default for CheckpointerConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir: PathBuf::from("./checkpoints"),
            save_interval: 10_000,
            max_models: 5,
        }
    }
}

impl CheckpointerConfig {
    /// Create a new config with specified checkpoint directory.
    pub fn new(checkpoint_dir: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_dir: checkpoint_dir.into(),
            ..Default::default()
        }
    }

    /// Set the save interval.
    pub fn with_save_interval(mut self, interval: usize) -> Self {
        self.save_interval = interval;
        self
    }

    /// Set the number of checkpoints to keep per network.
    pub fn with_max_models(mut self, n: usize) -> Self {
        self.max_models = n;
        self
    }
}

/// Checkpoint metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointInfo {
    /// Path to the checkpoint file.
    pub path: PathBuf,
    /// Update step at which the checkpoint was saved.
    pub step: usize,
}

/// Saves and restores named networks with a bounded on-disk history.
#[derive(Debug)]
pub struct Checkpointer {
    config: CheckpointerConfig,
    history: HashMap<String, VecDeque<CheckpointInfo>>,
}

impl Checkpointer {
    /// Create a new checkpointer.
    ///
    /// Creates the checkpoint directory if it doesn't exist.
    pub fn new(config: CheckpointerConfig) -> Result<Self> {
        if config.save_interval == 0 {
            return Err(SafetyRlError::InvalidConfig(
                "checkpoint save_interval must be > 0".to_string(),
            ));
        }
        fs::create_dir_all(&config.checkpoint_dir)?;

        Ok(Self {
            config,
            history: HashMap::new(),
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &CheckpointerConfig {
        &self.config
    }

    /// Check if it's time to save a checkpoint.
    pub fn should_save(&self, step: usize) -> bool {
        step > 0 && step % self.config.save_interval == 0
    }

    /// Path of the checkpoint for `name` at `step`.
    pub fn checkpoint_path(&self, name: &str, step: usize) -> PathBuf {
        self.config
            .checkpoint_dir
            .join(format!("{}_{:08}.bin", name, step))
    }

    /// Save `model` as `name` at `step`, then drop the oldest files beyond
    /// `max_models`.
    pub fn save<B: Backend, M: Module<B>>(
        &mut self,
        name: &str,
        model: &M,
        step: usize,
    ) -> Result<PathBuf> {
        let path = self.checkpoint_path(name, step);

        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(&path, &recorder)
            .map_err(|e| SafetyRlError::Recorder(e.to_string()))?;
        log::debug!("saved {} checkpoint at step {} to {}", name, step, path.display());

        let history = self.history.entry(name.to_string()).or_default();
        history.push_back(CheckpointInfo {
            path: path.clone(),
            step,
        });
        if self.config.max_models > 0 {
            while history.len() > self.config.max_models {
                if let Some(old) = history.pop_front() {
                    if let Err(e) = fs::remove_file(&old.path) {
                        log::warn!("failed to remove old checkpoint {}: {}", old.path.display(), e);
                    }
                }
            }
        }

        Ok(path)
    }

    /// Load a model from a checkpoint file into `model_template`.
    pub fn load<B: Backend, M: Module<B>>(
        &self,
        model_template: M,
        path: &Path,
        device: &B::Device,
    ) -> Result<M> {
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model_template
            .load_file(path, &recorder, device)
            .map_err(|e| SafetyRlError::Recorder(e.to_string()))
    }

    /// Load the most recent checkpoint of `name` found on disk.
    ///
    /// Returns the model and the step it was saved at.
    pub fn load_latest<B: Backend, M: Module<B>>(
        &self,
        name: &str,
        model_template: M,
        device: &B::Device,
    ) -> Result<(M, usize)> {
        let latest = self.list_checkpoints(name)?.pop().ok_or_else(|| {
            SafetyRlError::Recorder(format!(
                "no {} checkpoints in {}",
                name,
                self.config.checkpoint_dir.display()
            ))
        })?;
        let model = self.load(model_template, &latest.path, device)?;
        Ok((model, latest.step))
    }

    /// List all checkpoints of `name` in the directory, oldest first.
    pub fn list_checkpoints(&self, name: &str) -> Result<Vec<CheckpointInfo>> {
        let prefix = format!("{}_", name);
        let mut checkpoints: Vec<CheckpointInfo> = fs::read_dir(&self.config.checkpoint_dir)?
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let path = e.path();
                let filename = path.file_name()?.to_str()?;
                let step = filename
                    .strip_prefix(prefix.as_str())?
                    .strip_suffix(".bin")?
                    .parse()
                    .ok()?;
                Some(CheckpointInfo { path, step })
            })
            .collect();

        checkpoints.sort_by_key(|c| c.step);
        Ok(checkpoints)
    }
}
