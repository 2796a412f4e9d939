use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "iamcheck.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Settings read from `iamcheck.toml`. Command line flags take precedence.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Named profile from the shared AWS config files.
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Overrides the IAM and STS endpoints, e.g. for an emulator.
    pub endpoint_url: Option<String>,
    pub concurrency: Option<usize>,
}

impl Configuration {
    /// Loads the given file, or `./iamcheck.toml` when none is given and it
    /// exists. No file at all yields the defaults.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(&path),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Values set in `other` win.
    pub fn merge(self, other: Configuration) -> Self {
        Self {
            profile: other.profile.or(self.profile),
            region: other.region.or(self.region),
            endpoint_url: other.endpoint_url.or(self.endpoint_url),
            concurrency: other.concurrency.or(self.concurrency),
        }
    }
}
