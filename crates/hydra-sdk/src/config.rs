use std::path::Path;

use hydra_processor::ProcessorConfig;
use hydra_resolver::ResolverConfig;
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Configuration for a hydrated document's resolver and processor.
///
/// ```toml
/// [resolver]
/// placeholder_pattern = '^\$([0-9]+)$'
/// cache_capacity = 256
///
/// [processor]
/// max_item_bytes = 16777216
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HydraConfig {
    pub resolver: ResolverConfig,
    pub processor: ProcessorConfig,
}

impl HydraConfig {
    /// Parse a TOML configuration. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> SdkResult<Self> {
        toml::from_str(source).map_err(|e| SdkError::Config(e.to_string()))
    }

    /// Load a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> SdkResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_source_is_default() {
        assert_eq!(HydraConfig::from_toml_str("").unwrap(), HydraConfig::default());
    }

    #[test]
    fn partial_source_keeps_other_defaults() {
        let config = HydraConfig::from_toml_str(
            r#"
            [resolver]
            placeholder_pattern = '@(\w+)'
            "#,
        )
        .unwrap();
        assert_eq!(config.resolver.placeholder_pattern, r"@(\w+)");
        assert_eq!(config.resolver.cache_capacity, 256);
        assert_eq!(config.processor.max_item_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn malformed_source_is_config_error() {
        let err = HydraConfig::from_toml_str("[resolver\n").unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[processor]\nmax_item_bytes = 8").unwrap();

        let config = HydraConfig::load(file.path()).unwrap();
        assert_eq!(config.processor.max_item_bytes, 8);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = HydraConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, SdkError::Io(_)));
    }
}
