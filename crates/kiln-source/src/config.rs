use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Virtual file name used when the caller does not supply one.
pub const DEFAULT_FILE_NAME: &str = "code.cpp";

/// Top level `kiln.toml` configuration.
///
/// Every field has a default, so an empty document is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct KilnConfig {
    /// Defaults applied to every compilation
    pub compile: CompileDefaults,

    /// Class-name conventions of the managed runtime
    pub classes: ClassNames,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompileDefaults {
    /// Virtual file name when none is given
    pub file_name: String,

    /// Flags prepended to the caller's flags (include paths and the like)
    pub flags: Vec<String>,

    /// Optimisation level used when no `-O` flag is present
    pub opt_level: OptLevel,
}

impl Default for CompileDefaults {
    fn default() -> Self {
        Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
            flags: Vec::new(),
            opt_level: OptLevel::Speed,
        }
    }
}

/// Code generation optimisation level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    /// Name of the matching Cranelift `opt_level` setting.
    pub fn as_setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

/// How the managed runtime names the classes the bridge checks against.
///
/// The defaults follow the JVM: `java.lang.String`, `java.lang.Class`, and
/// array classes spelled `[I`, `[Ljava.lang.Object;`, `[[I` and so on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClassNames {
    pub string_class: String,
    pub class_class: String,
    pub array_prefix: String,
}

impl Default for ClassNames {
    fn default() -> Self {
        Self {
            string_class: "java.lang.String".to_string(),
            class_class: "java.lang.Class".to_string(),
            array_prefix: "[".to_string(),
        }
    }
}

impl KilnConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: KilnConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("loading configuration from {}", path.display());
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e.to_string()))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.compile.file_name.trim().is_empty() {
            return Err(ConfigError::Invalid("compile.file_name must not be empty".into()));
        }
        if self.classes.array_prefix.is_empty() {
            return Err(ConfigError::Invalid("classes.array_prefix must not be empty".into()));
        }
        if let Some(flag) = self.compile.flags.iter().find(|f| f.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("compile.flags contains an empty flag {flag:?}")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = KilnConfig::from_toml_str("").unwrap();
        assert_eq!(config, KilnConfig::default());
        assert_eq!(config.compile.file_name, "code.cpp");
        assert_eq!(config.classes.string_class, "java.lang.String");
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = KilnConfig::from_toml_str(
            r#"
            [compile]
            flags = ["-I/opt/jdk/include", "-DFAST=1"]
            opt_level = "none"

            [classes]
            string_class = "System.String"
            "#,
        )
        .unwrap();
        assert_eq!(config.compile.flags.len(), 2);
        assert_eq!(config.compile.opt_level, OptLevel::None);
        assert_eq!(config.compile.file_name, "code.cpp");
        assert_eq!(config.classes.string_class, "System.String");
        assert_eq!(config.classes.class_class, "java.lang.Class");
    }

    #[test]
    fn rejects_empty_array_prefix() {
        let err = KilnConfig::from_toml_str("[classes]\narray_prefix = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = KilnConfig::from_toml_str("[compile\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[compile]\nfile_name = \"kernel.c\"").unwrap();
        let config = KilnConfig::load(file.path()).unwrap();
        assert_eq!(config.compile.file_name, "kernel.c");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = KilnConfig::load("/definitely/not/here/kiln.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read(..)));
    }
}
