//! Driver configuration
//!
//! The compiler itself needs no configuration; this module configures the
//! driver around it — which assembler and linker to invoke and whether to
//! keep the intermediate assembly file. Values come from an optional TOML
//! file merged over the defaults:
//!
//! ```toml
//! assembler = "nasm"
//! linker = "ld"
//! linker-args = ["-z", "noexecstack"]
//! keep-asm = true
//! ```

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct CompilerConfig {
    /// Assembler program to run; defaults to `nasm`.
    #[serde(default)]
    pub assembler: Option<String>,

    /// Linker program to run; defaults to `ld`.
    #[serde(default)]
    pub linker: Option<String>,

    /// Extra arguments appended to the link invocation.
    #[serde(default)]
    pub linker_args: Vec<String>,

    /// Keep the intermediate `.asm` file after a successful build.
    #[serde(default)]
    pub keep_asm: bool,
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("invalid configuration: {}", e))
    }

    /// Overlay another configuration; set fields win.
    pub fn merge(&mut self, other: CompilerConfig) {
        if other.assembler.is_some() {
            self.assembler = other.assembler;
        }
        if other.linker.is_some() {
            self.linker = other.linker;
        }
        if !other.linker_args.is_empty() {
            self.linker_args = other.linker_args;
        }
        self.keep_asm = self.keep_asm || other.keep_asm;
    }

    pub fn assembler_program(&self) -> &str {
        self.assembler.as_deref().unwrap_or("nasm")
    }

    pub fn linker_program(&self) -> &str {
        self.linker.as_deref().unwrap_or("ld")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::new();
        assert_eq!(config.assembler_program(), "nasm");
        assert_eq!(config.linker_program(), "ld");
        assert!(config.linker_args.is_empty());
        assert!(!config.keep_asm);
    }

    #[test]
    fn test_from_toml() {
        let config = CompilerConfig::from_toml(
            r#"
            assembler = "yasm"
            linker-args = ["-z", "noexecstack"]
            keep-asm = true
            "#,
        )
        .unwrap();
        assert_eq!(config.assembler_program(), "yasm");
        assert_eq!(config.linker_program(), "ld");
        assert_eq!(config.linker_args, vec!["-z", "noexecstack"]);
        assert!(config.keep_asm);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(CompilerConfig::from_toml("optimize = true").is_err());
    }

    #[test]
    fn test_merge_prefers_set_fields() {
        let mut config = CompilerConfig::from_toml(r#"assembler = "yasm""#).unwrap();
        config.merge(CompilerConfig::from_toml(r#"linker = "lld""#).unwrap());
        assert_eq!(config.assembler_program(), "yasm");
        assert_eq!(config.linker_program(), "lld");
    }
}
