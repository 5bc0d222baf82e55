//! Configuration command implementations
//!
//! Commands for inspecting the layered parmap configuration.

use crate::cli::{ConfigCommands, ConfigFormat, Output};
use crate::config::ParmapConfig;
use anyhow::{Context, Result};

/// Execute config commands
pub fn execute(cmd: ConfigCommands, config: &ParmapConfig, output: &Output) -> Result<()> {
    match cmd {
        ConfigCommands::Show { format } => show(config, format),
        ConfigCommands::Path => path(config, output),
    }
}

fn show(config: &ParmapConfig, format: ConfigFormat) -> Result<()> {
    // Refuse to print a configuration the engine would reject
    config.engine()?;

    let full = config.get_full_config()?;
    let rendered = match format {
        ConfigFormat::Toml => toml::to_string_pretty(&full).context("failed to render TOML")?,
        ConfigFormat::Json => serde_json::to_string_pretty(&full)?,
        ConfigFormat::Yaml => serde_yml::to_string(&full).context("failed to render YAML")?,
    };
    println!("{}", rendered.trim_end());
    Ok(())
}

fn path(config: &ParmapConfig, output: &Output) -> Result<()> {
    for source in config.sources() {
        let found = source.exists();
        output.key_value(
            &source.display().to_string(),
            if found { "found" } else { "missing" },
            found,
        );
    }
    output.verbose("PARMAP_* environment variables override every file (e.g. PARMAP_ENGINE__WORKERS=4)");
    Ok(())
}
