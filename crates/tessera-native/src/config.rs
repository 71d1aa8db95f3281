use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Options read once when an engine is created.
///
/// Every field has a default, so an empty TOML document is a valid configuration:
///
/// ```toml
/// enable_object_cache = true
/// opt_level = "speed"
/// passes = ["unreachable", "pipeline"]
/// verify = true
/// dump_ir = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineOptions {
    /// Consult and populate the compiled-object cache.
    pub enable_object_cache: bool,

    /// Level of the optimizer pipeline run during link.
    pub opt_level: OptLevel,

    /// Explicit optimizer passes. Empty means the full pipeline for `opt_level`.
    pub passes: Vec<Pass>,

    /// Turn on Cranelift's own verifier inside every compile.
    pub verify: bool,

    /// Log every lowered function at info level instead of debug.
    pub dump_ir: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enable_object_cache: true,
            opt_level: OptLevel::Speed,
            passes: Vec::new(),
            verify: true,
            dump_ir: false,
        }
    }
}

impl EngineOptions {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(format!("{}: {}", path.display(), err)))?;
        Self::from_toml_str(&text)
    }

    pub fn without_cache(mut self) -> Self {
        self.enable_object_cache = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Value of Cranelift's `opt_level` setting.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

impl fmt::Display for OptLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_setting())
    }
}

/// Individually selectable optimizer passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    /// Remove blocks not reachable from the entry block.
    Unreachable,
    /// Cranelift's mid-end pipeline (egraph rewrites, legalization).
    Pipeline,
}

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Error reading engine configuration: {0}")]
    #[diagnostic(
        code("CONFIG-001"),
        help("Check that the file exists and is readable")
    )]
    Read(String),

    #[error("Invalid engine configuration: {0}")]
    #[diagnostic(
        code("CONFIG-002"),
        help("Known keys are enable_object_cache, opt_level, passes, verify and dump_ir")
    )]
    Parse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let options = EngineOptions::from_toml_str("").unwrap();
        assert_eq!(options, EngineOptions::default());
        assert!(options.enable_object_cache);
        assert_eq!(options.opt_level, OptLevel::Speed);
    }

    #[test]
    fn test_parse_full_document() {
        let options = EngineOptions::from_toml_str(
            r#"
            enable_object_cache = false
            opt_level = "speed_and_size"
            passes = ["unreachable", "pipeline"]
            verify = false
            dump_ir = true
            "#,
        )
        .unwrap();
        assert!(!options.enable_object_cache);
        assert_eq!(options.opt_level, OptLevel::SpeedAndSize);
        assert_eq!(options.passes, vec![Pass::Unreachable, Pass::Pipeline]);
        assert!(!options.verify);
        assert!(options.dump_ir);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = EngineOptions::from_toml_str("cache = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_pass_rejected() {
        for pass in ["inline", "dce"] {
            let err = EngineOptions::from_toml_str(&format!("passes = [\"{pass}\"]")).unwrap_err();
            assert!(matches!(err, ConfigError::Parse(_)), "`{pass}` accepted");
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = EngineOptions::load("/definitely/not/here/engine.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read(_)));
    }
}
