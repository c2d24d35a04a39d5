use crate::RasterConfig;
use std::path::Path;
use std::{fs, io};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error reading config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Error writing config file '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Error parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Error serializing config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl RasterConfig {
    /// Parse a config from TOML. Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid TOML or contains fields of the wrong type.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read and parse a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn try_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
        Self::from_toml_str(&config_str)
    }

    /// Load a config file, falling back to defaults if the file does not exist or does not parse.
    #[must_use]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Self {
        match Self::try_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(err) => {
                log::warn!("{err}; using default config");
                Self::default()
            }
        }
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let config_str = self.to_toml_string()?;
        fs::write(path, config_str)
            .map_err(|source| ConfigError::Write { path: path.display().to_string(), source })
    }
}
