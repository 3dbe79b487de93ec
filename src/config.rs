//! Compiler configuration
//!
//! [`CompilerConfig`] carries everything the driver may vary per
//! compilation: the optimization level, the opaque target identifier handed
//! to a back-end, the debug flag, and the dump toggles for intermediate
//! artifacts. Configs can be built fluently or loaded from a TOML file:
//!
//! ```toml
//! optimization-level = 3
//! target = "x86_64"
//!
//! [dump]
//! tokens = true
//! ir = true
//! ```

use serde::Deserialize;
use std::path::Path;

/// Optimization level, 0 through 3. The level doubles as the maximum
/// number of optimizer passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "u8")]
pub enum OptimizationLevel {
    /// No optimization
    O0,
    /// One pass
    O1,
    /// Two passes plus peephole (the default)
    O2,
    /// Three passes plus peephole
    O3,
}

impl Default for OptimizationLevel {
    fn default() -> Self {
        OptimizationLevel::O2
    }
}

impl OptimizationLevel {
    /// Maximum number of fixed-point passes to run.
    pub fn passes(self) -> usize {
        self as usize
    }

    pub fn level(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for OptimizationLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OptimizationLevel::O0),
            1 => Ok(OptimizationLevel::O1),
            2 => Ok(OptimizationLevel::O2),
            3 => Ok(OptimizationLevel::O3),
            other => Err(format!(
                "Invalid optimization level {}. Expected 0, 1, 2, or 3",
                other
            )),
        }
    }
}

impl std::fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "O{}", self.level())
    }
}

/// Toggles for dumping intermediate artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DumpOptions {
    pub tokens: bool,
    pub ast: bool,
    pub ir: bool,
    pub optimized_ir: bool,
    pub stats: bool,
}

/// Configuration for one compilation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CompilerConfig {
    pub optimization_level: OptimizationLevel,
    /// Opaque target identifier passed through to a back-end
    pub target: String,
    /// Print phase progress while compiling
    pub debug: bool,
    pub dump: DumpOptions,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            optimization_level: OptimizationLevel::default(),
            target: "x86_64".to_string(),
            debug: false,
            dump: DumpOptions::default(),
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse compiler config: {}", e))
    }

    /// Load a configuration from a TOML file.
    pub fn load_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config '{}': {}", path.display(), e))?;
        Self::from_toml(&content)
    }

    pub fn with_optimization_level(mut self, level: OptimizationLevel) -> Self {
        self.optimization_level = level;
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_dump(mut self, dump: DumpOptions) -> Self {
        self.dump = dump;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.optimization_level, OptimizationLevel::O2);
        assert_eq!(config.target, "x86_64");
        assert!(!config.debug);
        assert!(!config.dump.tokens);
    }

    #[test]
    fn test_passes_per_level() {
        assert_eq!(OptimizationLevel::O0.passes(), 0);
        assert_eq!(OptimizationLevel::O1.passes(), 1);
        assert_eq!(OptimizationLevel::O2.passes(), 2);
        assert_eq!(OptimizationLevel::O3.passes(), 3);
    }

    #[test]
    fn test_level_from_u8() {
        assert_eq!(OptimizationLevel::try_from(0), Ok(OptimizationLevel::O0));
        assert_eq!(OptimizationLevel::try_from(3), Ok(OptimizationLevel::O3));
        assert!(OptimizationLevel::try_from(4).is_err());
    }

    #[test]
    fn test_level_ordering() {
        assert!(OptimizationLevel::O3 > OptimizationLevel::O2);
        assert!(OptimizationLevel::O0 < OptimizationLevel::O1);
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::new()
            .with_optimization_level(OptimizationLevel::O3)
            .with_target("aarch64")
            .with_debug(true);
        assert_eq!(config.optimization_level, OptimizationLevel::O3);
        assert_eq!(config.target, "aarch64");
        assert!(config.debug);
    }

    #[test]
    fn test_from_toml() {
        let config = CompilerConfig::from_toml(
            "optimization-level = 3\ntarget = \"riscv64\"\n\n[dump]\ntokens = true\noptimized-ir = true\n",
        )
        .unwrap();
        assert_eq!(config.optimization_level, OptimizationLevel::O3);
        assert_eq!(config.target, "riscv64");
        assert!(config.dump.tokens);
        assert!(config.dump.optimized_ir);
        assert!(!config.dump.ast);
    }

    #[test]
    fn test_from_toml_rejects_bad_level() {
        let err = CompilerConfig::from_toml("optimization-level = 9\n").unwrap_err();
        assert!(err.contains("Failed to parse compiler config"));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = CompilerConfig::from_toml("").unwrap();
        assert_eq!(config, CompilerConfig::default());
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "optimization-level = 1").unwrap();
        let config = CompilerConfig::load_file(file.path()).unwrap();
        assert_eq!(config.optimization_level, OptimizationLevel::O1);
    }

    #[test]
    fn test_load_missing_file() {
        let err = CompilerConfig::load_file(Path::new("/nonexistent/compiler.toml")).unwrap_err();
        assert!(err.contains("Failed to read config"));
    }
}
