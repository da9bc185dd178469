use super::{default_config_path, ConfigValidator, Settings};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct ConfigLoader {
    explicit_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(explicit_path: Option<PathBuf>) -> Self {
        Self { explicit_path }
    }

    /// Read the file (when there is one), overlay the environment and validate.
    pub async fn load(&self) -> Result<Settings> {
        let mut settings = self.load_file().await?;
        settings.merge_env_vars();
        ConfigValidator::validate(&settings)?;
        Ok(settings)
    }

    /// Like [`load`](Self::load) without the credential check, for offline commands.
    pub async fn load_offline(&self) -> Result<Settings> {
        let mut settings = self.load_file().await?;
        settings.merge_env_vars();
        ConfigValidator::validate_filters(&settings)?;
        Ok(settings)
    }

    async fn load_file(&self) -> Result<Settings> {
        match &self.explicit_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Configuration file not found: {}",
                        path.display()
                    )));
                }
                Self::parse_file(path).await
            }
            None => match default_config_path() {
                Some(path) if path.exists() => Self::parse_file(&path).await,
                _ => {
                    tracing::debug!("No configuration file found, using defaults");
                    Ok(Settings::default())
                }
            },
        }
    }

    async fn parse_file(path: &Path) -> Result<Settings> {
        tracing::debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path).await?;
        Self::parse(path, &content)
    }

    /// Parse by extension: `.yml`/`.yaml` as YAML, anything else as TOML.
    pub fn parse(path: &Path, content: &str) -> Result<Settings> {
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "yml" || ext == "yaml");

        if is_yaml {
            Ok(serde_yaml::from_str(content)?)
        } else {
            Ok(toml::from_str(content)?)
        }
    }
}
