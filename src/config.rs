use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AlphaPickleError;
use crate::plot::PlotOptions;
use crate::runner::RunOptions;

pub const CONFIG_FILE_NAME: &str = "alphapickle.json";

/// Optional settings file; every field may be left out.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub plot_size: Option<f64>,
    #[serde(default)]
    pub plot_increment: Option<usize>,
    #[serde(default)]
    pub jobs: Option<usize>,
}

impl Config {
    /// Fields set in `overrides` win over `self`.
    pub fn merge(self, overrides: Config) -> Config {
        Config {
            plot_size: overrides.plot_size.or(self.plot_size),
            plot_increment: overrides.plot_increment.or(self.plot_increment),
            jobs: overrides.jobs.or(self.jobs),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// An explicit path must exist; otherwise the first file found in
    /// [`ConfigLoader::search_paths`] is used, or defaults when there is none.
    pub fn resolve(path: Option<&Path>) -> Result<Config, AlphaPickleError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::search_paths().into_iter().find(|candidate| candidate.is_file()) {
            Some(found) => Self::load(&found),
            None => {
                debug!("no config file found, using defaults");
                Ok(Config::default())
            }
        }
    }

    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = BaseDirs::new() {
            paths.push(dirs.config_dir().join("alphapickle").join(CONFIG_FILE_NAME));
        }
        paths
    }

    pub fn load(path: &Path) -> Result<Config, AlphaPickleError> {
        let content =
            fs::read_to_string(path).map_err(|_| AlphaPickleError::ConfigRead(path.to_path_buf()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| AlphaPickleError::ConfigParse(format!("{}: {err}", path.display())))?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn resolve_options(config: Config) -> Result<RunOptions, AlphaPickleError> {
        let defaults = RunOptions::default();
        let options = RunOptions {
            plot: PlotOptions {
                size_inches: config.plot_size.unwrap_or(defaults.plot.size_inches),
                label_increment: config.plot_increment.unwrap_or(defaults.plot.label_increment),
            },
            jobs: config.jobs.unwrap_or(defaults.jobs),
        };
        options.validate()?;
        Ok(options)
    }
}
