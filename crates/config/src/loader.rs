use std::path::{Path, PathBuf};

use {
    directories::ProjectDirs,
    secrecy::{ExposeSecret, Secret},
    tracing::debug,
};

use crate::schema::DmrecallConfig;

pub const CONFIG_FILE_NAME: &str = "dmrecall.toml";
const KEY_FILE_NAME: &str = "OPENAI_KEY.txt";
const KEY_ENV_VARS: [&str; 2] = ["OPENAI_API_KEY", "OPENAI_KEY"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    #[error("invalid configuration value {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// A year of minutes.
const MAX_CONTEXT_WINDOW_MINUTES: i64 = 60 * 24 * 366;
/// A century of days.
const MAX_PERIOD_DAYS: i64 = 366 * 100;

fn check_range<T>(field: &'static str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{value} is outside {min}..={max}"),
        });
    }
    Ok(())
}

fn check_positive(field: &'static str, value: Option<usize>) -> Result<(), ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".into(),
        }),
        _ => Ok(()),
    }
}

/// Platform config directory (`~/.config/dmrecall` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "dmrecall", "dmrecall").map(|d| d.config_dir().to_path_buf())
}

/// Resolve the config file: an explicit path wins, then `./dmrecall.toml`,
/// then the platform config directory.
pub fn find_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    config_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .filter(|p| p.is_file())
}

pub fn parse_config(raw: &str, path: &Path) -> Result<DmrecallConfig, ConfigError> {
    toml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the configuration and fill in the API key from the environment or a
/// key file when the file does not set one.
///
/// With no config file anywhere, defaults are used.
pub fn load_config(explicit: Option<&Path>) -> Result<DmrecallConfig, ConfigError> {
    let (mut config, base_dir) = match find_config_file(explicit) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            debug!(path = %path.display(), "loaded config file");
            let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
            (parse_config(&raw, &path)?, base)
        },
        None => {
            debug!("no config file found, using defaults");
            (DmrecallConfig::default(), PathBuf::new())
        },
    };

    if config.openai.api_key.is_none() {
        config.openai.api_key = resolve_api_key(|name| std::env::var(name).ok(), &base_dir);
    }
    Ok(config)
}

fn resolve_api_key(
    env: impl Fn(&str) -> Option<String>,
    base_dir: &Path,
) -> Option<Secret<String>> {
    KEY_ENV_VARS
        .iter()
        .filter_map(|name| env(name))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
        .or_else(|| {
            std::fs::read_to_string(base_dir.join(KEY_FILE_NAME))
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        })
        .map(Secret::new)
}

impl DmrecallConfig {
    /// Settings every archive operation needs.
    pub fn validate_archive(&self) -> Result<(), ConfigError> {
        if self.archive.conversation_id == 0 {
            return Err(ConfigError::Missing("archive.conversation_id"));
        }
        Ok(())
    }

    /// Settings the search and digest commands need on top of the archive ones.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_archive()?;
        match &self.openai.api_key {
            Some(key) if !key.expose_secret().trim().is_empty() => {},
            _ => return Err(ConfigError::Missing("openai.api_key")),
        }
        self.validate_knobs()
    }

    /// Numeric search and digest settings. Unset search values are left to
    /// the pipeline defaults.
    pub fn validate_knobs(&self) -> Result<(), ConfigError> {
        let search = &self.search;
        if let Some(minutes) = search.context_window_minutes {
            check_range(
                "search.context_window_minutes",
                minutes,
                1,
                MAX_CONTEXT_WINDOW_MINUTES,
            )?;
        }
        check_positive("search.keyword_limit", search.keyword_limit)?;
        check_positive("search.top_n", search.top_n)?;
        check_positive("search.curate_limit", search.curate_limit)?;
        check_positive("search.token_budget", search.token_budget)?;
        check_positive("search.embed_word_ceiling", search.embed_word_ceiling)?;
        check_positive("search.embedding_batch_size", search.embedding_batch_size)?;
        check_range("digest.period_days", self.digest.period_days, 1, MAX_PERIOD_DAYS)?;
        check_positive("digest.chunk_chars", Some(self.digest.chunk_chars))
    }
}
