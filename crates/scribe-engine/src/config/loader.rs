use super::schema::ScribeConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Where configuration is looked for, most specific first.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("scribe.yaml")];
        paths.extend(dirs::home_dir().map(|home| home.join(".scribe").join("config.yaml")));
        paths
    }

    /// First file from [`Self::search_paths`] that exists, else defaults.
    pub async fn load_default() -> Result<ScribeConfig, ConfigError> {
        match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => Self::load_from(&path).await,
            None => Ok(ScribeConfig::default()),
        }
    }

    pub async fn load_from(path: &Path) -> Result<ScribeConfig, ConfigError> {
        Self::parse(&tokio::fs::read_to_string(path).await?)
    }

    /// Blank documents mean "all defaults".
    pub fn parse(content: &str) -> Result<ScribeConfig, ConfigError> {
        match content.trim() {
            "" => Ok(ScribeConfig::default()),
            yaml => Ok(serde_yaml::from_str(yaml)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_search_paths_prefer_working_directory() {
        let paths = ConfigLoader::search_paths();
        assert_eq!(paths[0], PathBuf::from("scribe.yaml"));
        if let Some(home) = paths.get(1) {
            assert!(home.ends_with(".scribe/config.yaml"));
        }
    }

    #[test]
    fn test_defaults() {
        let config = ConfigLoader::parse("").unwrap();
        assert_eq!(config.recorder.settle_delay_ms, 500);
        assert_eq!(config.recorder.observer_init_delay_ms, 100);
        assert_eq!(config.recorder.keepalive_interval_secs, 20);
        assert_eq!(config.recorder.fingerprint_prefix, 100);
        assert_eq!(config.remote.port, 9001);
        assert_eq!(config.remote.call_timeout_ms, 10000);
        assert!(config.state.path.is_none());
    }

    #[test]
    fn test_partial_override() {
        let config = ConfigLoader::parse(
            r#"
recorder:
  settle_delay_ms: 0
delivery:
  default_destination: "https://hooks.example.com/manual"
state:
  path: /tmp/scribe-state.json
"#,
        )
        .unwrap();
        assert_eq!(config.recorder.settle_delay_ms, 0);
        assert_eq!(config.recorder.keepalive_interval_secs, 20);
        assert_eq!(
            config.delivery.default_destination,
            "https://hooks.example.com/manual"
        );
        assert_eq!(
            config.state.resolved_path(),
            PathBuf::from("/tmp/scribe-state.json")
        );
    }

    #[test]
    fn test_invalid_yaml() {
        let err = ConfigLoader::parse("recorder: [1, 2").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "remote:\n  port: 9100").unwrap();
        let config = ConfigLoader::load_from(file.path()).await.unwrap();
        assert_eq!(config.remote.port, 9100);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = ConfigLoader::load_from(Path::new("/nonexistent/scribe.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
