use crate::settings::{TaggerSettings, PACKAGED_DEFAULTS, SETTINGS_FILE_NAME};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub engine: String,
    pub collection_path: String,
    pub num_workers: usize,
    pub web_port: u16,
    pub log_level: String,
    pub progress_interval: usize,
    /// Raw `[tagger]` table; coerced on demand by [`AppConfig::tagger_settings`].
    #[serde(default)]
    pub tagger: serde_json::Value,
    #[serde(skip)]
    pub config_dir: PathBuf,
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    pub fn load_from(config_dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = config_dir.as_ref();
        let env = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let layer = |name: &str| dir.join(name).to_string_lossy().into_owned();

        let s = Config::builder()
            .add_source(File::from_str(PACKAGED_DEFAULTS, FileFormat::Toml))
            .add_source(File::with_name(&layer("default")).required(false))
            .add_source(File::with_name(&layer(&env)).required(false))
            .add_source(File::with_name(&layer("local")).required(false))
            .add_source(
                File::with_name(&layer(SETTINGS_FILE_NAME))
                    .format(FileFormat::Json)
                    .required(false),
            )
            .add_source(Environment::with_prefix("NEEDIMAGE").separator("__"))
            .build()?;

        let mut config: AppConfig = s.try_deserialize()?;
        config.config_dir = dir.to_path_buf();
        Ok(config)
    }

    pub fn tagger_settings(&self) -> TaggerSettings {
        TaggerSettings::from_value(&self.tagger, &TaggerSettings::packaged_defaults())
    }

    /// Re-reads the configuration directory. Scans call this so that edits
    /// saved since startup apply to the next run.
    pub fn reload(&self) -> Result<Self, ConfigError> {
        Self::load_from(&self.config_dir)
    }
}
