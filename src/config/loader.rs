use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::{ConfigError, PipelineConfig};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "MOSAIC_PIPELINE_CONFIG";

/// Configuration file lookup and loading
pub struct ConfigLoader;

impl ConfigLoader {
    /// Get the default configuration path, `~/.mosaic-pipeline/pipeline.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".mosaic-pipeline").join("pipeline.toml"))
    }

    /// Pick the configuration file: explicit path, then the environment
    /// variable, then the default location
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }

        if let Ok(value) = std::env::var(CONFIG_ENV_VAR) {
            if !value.trim().is_empty() {
                return Ok(PathBuf::from(value.trim()));
            }
        }

        match Self::default_path() {
            Some(path) if path.exists() => Ok(path),
            Some(path) => Err(ConfigError::NotFound(format!(
                "${} and {}",
                CONFIG_ENV_VAR,
                path.display()
            ))),
            None => Err(ConfigError::NotFound(format!("${}", CONFIG_ENV_VAR))),
        }
    }

    /// Read, parse and validate a configuration file.
    /// Relative paths inside the file are taken relative to the file's folder.
    pub fn load(path: &Path) -> Result<PipelineConfig, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: PipelineConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let absolute = fs::canonicalize(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = absolute.parent() {
            debug!("Resolving relative configuration paths against {}", base.display());
            config.resolve_relative(base);
        }

        config.validate()?;
        info!(
            "Loaded configuration from {} ({} dataset(s))",
            path.display(),
            config.datasets.len()
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[paths]
data_root = "data"
source_root = "/remote"
params_root = "/params"
results_root = "results"

[tools]
bin_dir = "bin"

[[datasets]]
id = "0131_test"
"#;

    #[test]
    fn test_explicit_path_wins() {
        let path = ConfigLoader::resolve_path(Some(Path::new("/tmp/x.toml"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/x.toml"));
    }

    #[test]
    fn test_default_path_location() {
        if let Some(path) = ConfigLoader::default_path() {
            assert!(path.to_string_lossy().contains(".mosaic-pipeline"));
            assert!(path.to_string_lossy().ends_with("pipeline.toml"));
        }
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("pipeline.toml");
        fs::write(&config_file, MINIMAL).unwrap();

        let config = ConfigLoader::load(&config_file).unwrap();
        let base = fs::canonicalize(temp_dir.path()).unwrap();
        assert_eq!(config.paths.data_root, base.join("data"));
        assert_eq!(config.paths.results_root, base.join("results"));
        assert_eq!(config.paths.source_root, PathBuf::from("/remote"));
        assert_eq!(config.tools.bin_dir, base.join("bin"));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let config_file = temp_dir.path().join("pipeline.toml");
        fs::write(&config_file, "[paths]\ndata_root = 3\n").unwrap();

        let err = ConfigLoader::load(&config_file).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = ConfigLoader::load(&temp_dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
