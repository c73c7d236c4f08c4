// src/config.rs
//
// =============================================================================
// FLOWRT: HOST CONFIGURATION (§6.1)
// =============================================================================
//
// Four layers, each overriding the last: built-in defaults, an optional
// config file (YAML or JSON — `serde_yaml` parses both), environment
// variables (`FLOWRT_<SECTION>_<KEY>`), then explicit CLI flags, composed
// into one struct instead of scattering `std::env::var` calls through the
// entry point.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostConfig {
    /// Global concurrency bound on simultaneous flow runs (§5).
    pub runtime_concurrency: usize,
    pub runtime_log_level: String,
    /// Scratch directory a host-provided `FileStore`/`PdfRasterizer` may use
    /// for intermediate artifacts. Flowrt's own collaborators are in-memory
    /// and ignore it; it is plumbed through for real implementations.
    pub temp_dir: Option<PathBuf>,
    /// Per-provider base settings (e.g. a self-hosted endpoint override).
    /// Flowrt ships no real provider client, so this is forwarded verbatim
    /// to whatever `ProviderClient` a host wires in.
    pub providers: HashMap<String, ProviderSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProviderSettings {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            runtime_concurrency: 4,
            runtime_log_level: "info".to_string(),
            temp_dir: None,
            providers: HashMap::new(),
        }
    }
}

/// The file layer: every field optional so a partial file only overrides
/// what it sets, leaving defaults (or earlier layers) alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct HostConfigFile {
    #[serde(default)]
    runtime: Option<RuntimeFile>,
    #[serde(default, rename = "tempDir")]
    temp_dir: Option<PathBuf>,
    #[serde(default)]
    providers: Option<HashMap<String, ProviderSettings>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RuntimeFile {
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    log_level: Option<String>,
}

/// Explicit overrides from parsed CLI flags (§6.2). `None` means "not
/// passed on the command line" — distinct from a file/env value of zero.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub concurrency: Option<usize>,
    pub log_level: Option<String>,
}

impl HostConfig {
    pub fn load(file_path: Option<&Path>, cli: CliOverrides) -> Result<Self> {
        let mut config = HostConfig::default();

        if let Some(path) = file_path {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let file: HostConfigFile = serde_yaml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            config.apply_file(file);
        }

        config.apply_env();
        config.apply_cli(cli);
        Ok(config)
    }

    fn apply_file(&mut self, file: HostConfigFile) {
        if let Some(runtime) = file.runtime {
            if let Some(c) = runtime.concurrency {
                self.runtime_concurrency = c;
            }
            if let Some(l) = runtime.log_level {
                self.runtime_log_level = l;
            }
        }
        if let Some(providers) = file.providers {
            self.providers.extend(providers);
        }
        if let Some(dir) = file.temp_dir {
            self.temp_dir = Some(dir);
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("FLOWRT_RUNTIME_CONCURRENCY") {
            if let Ok(parsed) = v.parse() {
                self.runtime_concurrency = parsed;
            }
        }
        if let Ok(v) = std::env::var("FLOWRT_RUNTIME_LOG_LEVEL") {
            self.runtime_log_level = v;
        }
        if let Ok(v) = std::env::var("FLOWRT_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(v));
        }
    }

    fn apply_cli(&mut self, cli: CliOverrides) {
        if let Some(c) = cli.concurrency {
            self.runtime_concurrency = c;
        }
        if let Some(l) = cli.log_level {
            self.runtime_log_level = l;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_overrides() {
        let config = HostConfig::load(None, CliOverrides::default()).unwrap();
        assert_eq!(config.runtime_concurrency, 4);
        assert_eq!(config.runtime_log_level, "info");
    }

    #[test]
    fn cli_overrides_beat_defaults() {
        let config = HostConfig::load(
            None,
            CliOverrides {
                concurrency: Some(16),
                log_level: Some("debug".to_string()),
            },
        )
        .unwrap();
        assert_eq!(config.runtime_concurrency, 16);
        assert_eq!(config.runtime_log_level, "debug");
    }

    #[test]
    fn env_overrides_defaults_but_not_cli() {
        std::env::set_var("FLOWRT_RUNTIME_CONCURRENCY", "9");
        let config = HostConfig::load(None, CliOverrides::default()).unwrap();
        assert_eq!(config.runtime_concurrency, 9);

        let config = HostConfig::load(None, CliOverrides { concurrency: Some(2), log_level: None }).unwrap();
        assert_eq!(config.runtime_concurrency, 2);
        std::env::remove_var("FLOWRT_RUNTIME_CONCURRENCY");
    }
}
