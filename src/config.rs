use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use healthcheck::catalog::Catalog;
use healthcheck::domain::CommandSpec;
use healthcheck::progress::{ProgressConfig, default_durations};
use healthcheck::runner::RunnerConfig;
use healthcheck::sequencer::SequencerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    /// Volume the disk checks target
    pub drive: String,
    pub runner: RunnerSection,
    pub progress: ProgressSection,
    pub sequence: SequenceSection,
    /// Per-step command replacements, keyed by step id
    pub commands: HashMap<String, CommandSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSection {
    pub poll_interval_ms: u64,
    pub stop_grace_ms: u64,
    pub reader_join_timeout_ms: u64,
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            stop_grace_ms: 5000,
            reader_join_timeout_ms: 1000,
        }
    }
}

impl RunnerSection {
    pub fn to_runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
            reader_join_timeout: Duration::from_millis(self.reader_join_timeout_ms),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSection {
    pub tick_interval_ms: u64,
    pub ceiling: f64,
    pub default_duration_secs: u64,
    /// Display name -> expected seconds
    pub durations: HashMap<String, u64>,
}

impl Default for ProgressSection {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            ceiling: 0.95,
            default_duration_secs: 30,
            durations: default_durations(),
        }
    }
}

impl ProgressSection {
    pub fn to_progress_config(&self) -> ProgressConfig {
        ProgressConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            ceiling: self.ceiling.clamp(0.0, 1.0),
            default_duration: Duration::from_secs(self.default_duration_secs),
            durations: self
                .durations
                .iter()
                .map(|(name, secs)| (name.clone(), Duration::from_secs(*secs)))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSection {
    pub inter_step_delay_ms: u64,
    /// Proceed with follow-ups when nobody can be asked
    pub assume_yes: bool,
}

impl Default for SequenceSection {
    fn default() -> Self {
        Self {
            inter_step_delay_ms: 500,
            assume_yes: true,
        }
    }
}

impl SequenceSection {
    pub fn to_sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            inter_step_delay: Duration::from_millis(self.inter_step_delay_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            drive: "c:".to_string(),
            runner: RunnerSection::default(),
            progress: ProgressSection::default(),
            sequence: SequenceSection::default(),
            commands: HashMap::new(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config =
                config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!(
                            "Failed to load config from {}: {}",
                            primary_config.display(),
                            e
                        );
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Built-in catalog for the configured drive, with command overrides applied
    pub fn catalog(&self) -> Result<Catalog> {
        let mut catalog = Catalog::builtin(&self.drive);
        for (id, spec) in &self.commands {
            catalog
                .override_command(id, spec.clone())
                .context(format!("Invalid command override '{}'", id))?;
            log::info!("Command for '{}' overridden: {}", id, spec.command());
        }
        Ok(catalog)
    }
}
