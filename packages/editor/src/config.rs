use folio_model::Schema;
use serde::{Deserialize, Serialize};

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    #[serde(default = "default_block_type")]
    pub block_type: String,

    #[serde(default = "default_span_type")]
    pub span_type: String,

    #[serde(default = "default_style")]
    pub default_style: String,

    /// Length of the throttling window after a local edit
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,

    /// Maximum number of undo steps kept
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Re-apply every translated patch batch and compare with the editor tree
    #[serde(default = "default_verify_patches")]
    pub verify_patches: bool,
}

fn default_block_type() -> String {
    "block".to_string()
}

fn default_span_type() -> String {
    "span".to_string()
}

fn default_style() -> String {
    "normal".to_string()
}

fn default_throttle_ms() -> u64 {
    500
}

fn default_history_limit() -> usize {
    100
}

fn default_verify_patches() -> bool {
    cfg!(debug_assertions)
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            block_type: default_block_type(),
            span_type: default_span_type(),
            default_style: default_style(),
            throttle_ms: default_throttle_ms(),
            history_limit: default_history_limit(),
            verify_patches: default_verify_patches(),
        }
    }
}

impl EditorConfig {
    pub fn schema(&self) -> Schema {
        Schema {
            block_type: self.block_type.clone(),
            span_type: self.span_type.clone(),
            default_style: self.default_style.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EditorConfig = serde_json::from_str(r#"{"throttleMs": 100}"#).unwrap();
        assert_eq!(config.throttle_ms, 100);
        assert_eq!(config.block_type, "block");
        assert_eq!(config.history_limit, 100);
    }

    #[test]
    fn test_schema_from_config() {
        let config = EditorConfig {
            span_type: "run".to_string(),
            ..EditorConfig::default()
        };
        assert_eq!(config.schema().span_type, "run");
    }
}
