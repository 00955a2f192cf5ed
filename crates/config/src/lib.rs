//! Configuration for dmrecall, loaded from `dmrecall.toml`.

pub mod loader;
pub mod schema;

pub use {
    loader::{ConfigError, config_dir, find_config_file, load_config, parse_config},
    schema::{
        ArchiveConfig, AuditConfig, DigestConfig, DmrecallConfig, OpenAiConfig, SearchConfig,
    },
};
