use anyhow::Context;
use folio_editor::EditorConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_NAME: &str = "folio.config.json";

/// Folio configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Session settings shared with embedders
    #[serde(flatten)]
    pub editor: EditorConfig,

    /// Pretty-print JSON written by the CLI
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool {
    true
}

impl Config {
    /// Load config from a directory
    pub fn load(cwd: &str) -> anyhow::Result<Self> {
        let config_path = PathBuf::from(cwd).join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Config::default_file())
        }
    }

    pub fn default_file() -> Self {
        Self {
            editor: EditorConfig::default(),
            pretty: default_pretty(),
        }
    }

    pub fn to_json_string(&self, value: &impl Serialize) -> anyhow::Result<String> {
        Ok(if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let json = r#"{
            "blockType": "paragraph",
            "throttleMs": 250,
            "pretty": false
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.editor.block_type, "paragraph");
        assert_eq!(config.editor.span_type, "span");
        assert_eq!(config.editor.throttle_ms, 250);
        assert!(!config.pretty);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default_file();
        assert_eq!(config.editor.default_style, "normal");
        assert_eq!(config.editor.history_limit, 100);
        assert!(config.pretty);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load("/nonexistent/folio").unwrap();
        assert_eq!(config, Config::default_file());
    }
}
