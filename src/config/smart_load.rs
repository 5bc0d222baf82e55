use figment::providers::{Format, Json, Toml, Yaml};
use std::path::Path;

/// Pick a figment provider for a config file from its extension, falling back
/// to sniffing the content. Missing files yield an empty provider.
pub fn auto<P: AsRef<Path>>(path: P) -> impl figment::Provider {
    let path = path.as_ref();
    let extension = path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "toml" => SmartProvider::Toml(Toml::file(path)),
        "json" => SmartProvider::Json(Json::file(path)),
        "yaml" | "yml" => SmartProvider::Yaml(Yaml::file(path)),
        _ => {
            let detected = std::fs::read_to_string(path)
                .ok()
                .and_then(|content| detect_format_from_content(&content));
            tracing::debug!(
                "config {} has no known extension, detected {:?}",
                path.display(),
                detected
            );
            match detected {
                Some(ConfigFormat::Json) => SmartProvider::Json(Json::file(path)),
                Some(ConfigFormat::Yaml) => SmartProvider::Yaml(Yaml::file(path)),
                Some(ConfigFormat::Toml) | None => SmartProvider::Toml(Toml::file(path)),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

/// Wrapper enum to handle different provider types
enum SmartProvider {
    Toml(figment::providers::Data<figment::providers::Toml>),
    Json(figment::providers::Data<figment::providers::Json>),
    Yaml(figment::providers::Data<figment::providers::Yaml>),
}

impl figment::Provider for SmartProvider {
    fn metadata(&self) -> figment::Metadata {
        match self {
            SmartProvider::Toml(p) => p.metadata(),
            SmartProvider::Json(p) => p.metadata(),
            SmartProvider::Yaml(p) => p.metadata(),
        }
    }

    fn data(&self) -> Result<figment::value::Map<figment::Profile, figment::value::Dict>, figment::Error> {
        match self {
            SmartProvider::Toml(p) => p.data(),
            SmartProvider::Json(p) => p.data(),
            SmartProvider::Yaml(p) => p.data(),
        }
    }
}

/// Guess the format of a config file from its content.
fn detect_format_from_content(content: &str) -> Option<ConfigFormat> {
    let trimmed = content.trim();
    let is_json_document = (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'));
    if is_json_document {
        return Some(ConfigFormat::Json);
    }

    let lines = || trimmed.lines().map(str::trim);
    let is_table_header = |line: &str| line.starts_with('[') && line.ends_with(']');

    if trimmed.starts_with("---") || lines().any(|line| line.contains(':') && !is_table_header(line)) {
        return Some(ConfigFormat::Yaml);
    }
    if lines().any(|line| is_table_header(line) || line.contains('=')) {
        return Some(ConfigFormat::Toml);
    }
    None
}
