//! Configuration loading for trove.
//!
//! Sources are layered with [`figment`]: `config.toml`, `config.yaml` and
//! `config.json` from the platform configuration directory, in that order and
//! each optional, then environment variables prefixed with `TROVE_`. Nested keys
//! in environment variables are separated by `__` and single underscores stand
//! for dashes, so `TROVE_OUTPUT__PATH_RESTRICT=ascii` sets
//! `output.path-restrict`.
//!
//! ```toml
//! [output]
//! directory = ["{category}", "{user}"]
//! filename = { "width > 1000" = "{id}_large.{extension}", "" = "{id}.{extension}" }
//! archive = "~/.local/share/trove/archive.sqlite3"
//! skip = "enumerate"
//! ```

pub mod error;
mod output;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::output::{OutputConfig, RestrictConfig, Skip, TemplateConfig};
use directories::ProjectDirs;
use exn::{OptionExt, ResultExt};
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::Deserialize;
use std::path::Path;

pub const ENV_PREFIX: &str = "TROVE_";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    pub output: OutputConfig,
}

impl Config {
    /// Configuration from the platform configuration directory and the
    /// environment.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// Configuration from a single file, picking the format from its
    /// extension. The environment still applies on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .ok_or_raise(|| ErrorKind::UnsupportedFormat(path.to_path_buf()))?;
        let figment = match extension {
            "toml" => Figment::from(Toml::file_exact(path)),
            "yaml" | "yml" => Figment::from(Yaml::file_exact(path)),
            "json" => Figment::from(Json::file_exact(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        };
        tracing::debug!(path = %path.display(), "loading configuration file");
        Self::from_figment(figment.merge(env()))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        figment.extract().or_raise(|| ErrorKind::Extract)
    }

    /// The default layering of sources, for callers that want to add their
    /// own providers before extracting.
    pub fn figment() -> Figment {
        let mut figment = Figment::new();
        match ProjectDirs::from("", "", "trove") {
            Some(dirs) => {
                let dir = dirs.config_dir();
                tracing::debug!(dir = %dir.display(), "looking for configuration");
                figment = figment
                    .merge(Toml::file_exact(dir.join("config.toml")))
                    .merge(Yaml::file_exact(dir.join("config.yaml")))
                    .merge(Json::file_exact(dir.join("config.json")));
            },
            None => tracing::warn!("no home directory, only reading configuration from the environment"),
        }
        figment.merge(env())
    }
}

fn env() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| key.as_str().replace("__", ".").replace('_', "-").into())
}
