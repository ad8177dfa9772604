use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::risk::RiskWeights;

/// Main configuration structure for VeriGuardX
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct VeriGuardConfig {
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Pipeline driver settings
    pub pipeline: PipelineConfig,
    /// Risk scorecard settings
    pub risk: RiskConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Simulated latency between progress writes
    pub step_delay_ms: u64,
    /// Extra random latency added on top of the step delay
    pub delay_jitter_ms: u64,
    /// Progress increment per write while a stage runs
    pub progress_step: u8,
    /// Scans retried for a borderline risk score before the part is held
    pub max_rescans: u32,
    /// Pause before each rescan
    pub rescan_delay_ms: u64,
    /// Default location for session snapshots
    pub snapshot_path: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 150,
            delay_jitter_ms: 100,
            progress_step: 25,
            max_rescans: 3,
            rescan_delay_ms: 2_000,
            snapshot_path: ".veriguard/session.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RiskConfig {
    pub weights: RiskWeights,
    /// Points removed per critical failure
    pub critical_penalty: f64,
    /// Points removed from visual-only audits
    pub uncertainty_penalty: f64,
    pub rescan_band_low: f64,
    pub rescan_band_high: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            critical_penalty: 30.0,
            uncertainty_penalty: 10.0,
            rescan_band_low: 35.0,
            rescan_band_high: 45.0,
        }
    }
}

impl VeriGuardConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (veriguard.toml)
    /// 3. Environment variables (prefixed with VERIGUARD_, `__` between sections)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("veriguard.toml").exists() {
            builder = builder.add_source(File::with_name("veriguard"));
        }

        builder = builder.add_source(
            Environment::with_prefix("VERIGUARD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let veriguard_config: VeriGuardConfig = config.try_deserialize()?;
        veriguard_config.risk.weights.validate()?;

        Ok(veriguard_config)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists. Returns the path that was read.
    ///
    /// Runs before telemetry is up, so reporting is left to [`init_config`].
    pub fn load_env_file() -> Result<Option<PathBuf>> {
        if Path::new(".env").exists() {
            return Ok(Some(dotenvy::dotenv()?));
        }
        Ok(None)
    }
}

struct LoadedConfig {
    config: VeriGuardConfig,
    env_file: Option<PathBuf>,
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<LoadedConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let env_file = VeriGuardConfig::load_env_file().ok().flatten();
        let config = VeriGuardConfig::load()?;
        Ok(LoadedConfig { config, env_file })
    });

fn loaded() -> Result<&'static LoadedConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Get the global configuration
pub fn config() -> Result<&'static VeriGuardConfig> {
    loaded().map(|loaded| &loaded.config)
}

/// Report where the configuration came from. Call once telemetry is up.
pub fn init_config() -> Result<()> {
    let loaded = loaded()?;
    if let Some(path) = &loaded.env_file {
        tracing::info!(path = %path.display(), "Loaded environment variables from .env file");
    }
    tracing::info!("Configuration loaded successfully");
    Ok(())
}
