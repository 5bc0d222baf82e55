use super::smart_load;
use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Json, Toml, Yaml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// Embed the default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../../default-config.toml");

/// Engine settings as they appear under `[engine]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads (0 = automatic)
    pub workers: usize,
    /// Percentage of CPU cores used when `workers` is automatic
    pub thread_percentage: u8,
    /// Yield results in input order
    pub order: bool,
    /// Chunk count (0 = streaming)
    pub chunks: usize,
    /// Keep worker logs after success
    pub retain_logs: bool,
    /// Per-worker log files
    pub redirect_output: bool,
    /// Directory for worker logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    /// Job queue bound (0 = unbounded)
    pub job_capacity: usize,
    /// Result channel bound (0 = unbounded)
    pub result_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            thread_percentage: 100,
            order: true,
            chunks: 0,
            retain_logs: false,
            redirect_output: true,
            log_dir: None,
            job_capacity: 0,
            result_capacity: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.thread_percentage) {
            anyhow::bail!(
                "engine.thread_percentage must be between 1 and 100, got {}",
                self.thread_percentage
            );
        }
        Ok(())
    }
}

/// Layered configuration: embedded defaults, user config, project config,
/// an explicit file, then `PARMAP_` environment variables.
pub struct ParmapConfig {
    figment: Figment,
    sources: Vec<PathBuf>,
}

impl ParmapConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_custom_config(None)
    }

    pub fn load_with_custom_config(custom_config: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));
        let mut sources = Vec::new();

        let user_config = Self::user_config_path();
        for path in [
            user_config.clone(),
            user_config.with_extension("json"),
            user_config.with_extension("yaml"),
            user_config.with_extension("yml"),
        ] {
            sources.push(path.clone());
            figment = figment.merge(smart_load::auto(path));
        }

        sources.extend(
            ["parmap.toml", "parmap.json", "parmap.yaml", "parmap.yml"].map(PathBuf::from),
        );
        figment = figment
            .merge(Toml::file("parmap.toml"))
            .merge(Json::file("parmap.json"))
            .merge(Yaml::file("parmap.yaml"))
            .merge(Yaml::file("parmap.yml"));

        if let Some(custom_path) = custom_config {
            if !custom_path.exists() {
                anyhow::bail!("config file not found: {}", custom_path.display());
            }
            sources.push(custom_path.to_path_buf());
            figment = figment.merge(smart_load::auto(custom_path));
        }

        // Environment variables always have highest priority.
        // PARMAP_CONFIG names the config file and is not a setting.
        figment = figment.merge(Env::prefixed("PARMAP_").ignore(&["config"]).split("__"));

        Ok(ParmapConfig { figment, sources })
    }

    /// Typed, validated engine section.
    pub fn engine(&self) -> Result<EngineConfig> {
        let engine: EngineConfig = self
            .figment
            .extract_inner("engine")
            .context("invalid [engine] configuration")?;
        engine.validate()?;
        Ok(engine)
    }

    /// Get the full merged configuration as a structured value
    pub fn get_full_config(&self) -> Result<serde_json::Value> {
        Ok(self.figment.extract()?)
    }

    /// Files that were consulted, whether or not they exist.
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    fn user_config_path() -> PathBuf {
        match std::env::var("HOME") {
            Ok(home) => PathBuf::from(home).join(".config/parmap/config.toml"),
            Err(_) => PathBuf::from("~/.config/parmap/config.toml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_config_loads_defaults() {
        let config = ParmapConfig::load().expect("Should load default config");
        let full = config.get_full_config().unwrap();
        assert!(full.get("engine").is_some());
    }

    #[test]
    fn test_embedded_defaults_match_struct_defaults() {
        let figment = Figment::new().merge(Toml::string(DEFAULT_CONFIG));
        let engine: EngineConfig = figment.extract_inner("engine").unwrap();
        assert_eq!(engine, EngineConfig::default());
    }

    #[test]
    fn test_custom_config_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("custom.yaml");
        fs::write(&path, "engine:\n  workers: 3\n  order: false\n").unwrap();

        let config = ParmapConfig::load_with_custom_config(Some(&path)).unwrap();
        let engine = config.engine().unwrap();
        assert_eq!(engine.workers, 3);
        assert!(!engine.order);
        assert!(engine.redirect_output);
        assert_eq!(config.sources().last().unwrap(), &path);
    }

    #[test]
    fn test_missing_custom_config_is_an_error() {
        let result = ParmapConfig::load_with_custom_config(Some(Path::new("non_existent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_thread_percentage_is_validated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[engine]\nthread_percentage = 0\n").unwrap();

        let config = ParmapConfig::load_with_custom_config(Some(&path)).unwrap();
        assert!(config.engine().is_err());
    }
}
