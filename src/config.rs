use crate::data::assignment::aggregate::AggregateOptions;
use crate::error::ConfigurationError;
use crate::util;
use std::env;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEV_IDENTITY_SECRET: &str = "studygroup-dev-secret";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Mongodb,
    Memory,
}

fn default_store() -> StoreKind {
    match env::var("STORE_BACKEND").as_deref() {
        Ok("memory") => StoreKind::Memory,
        _ => StoreKind::Mongodb,
    }
}

fn default_mongodb_uri() -> String {
    env::var("MONGODB_URI").unwrap_or("mongodb://localhost:27017".to_string())
}

fn default_mongodb_db() -> String {
    env::var("MONGODB_DB_NAME").unwrap_or("studygroup".to_string())
}

fn default_store_timeout_secs() -> u64 {
    env::var("STORE_TIMEOUT_SECS")
        .ok()
        .and_then(|it| it.parse().ok())
        .unwrap_or(10)
}

fn default_identity_secret() -> String {
    env::var("IDENTITY_SECRET").unwrap_or(DEV_IDENTITY_SECRET.to_string())
}

fn default_group_code_attempts() -> u32 {
    16
}

fn default_planner_window_days() -> i64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    file_path: PathBuf,

    #[serde(default = "default_store")]
    pub store: StoreKind,
    #[serde(default = "default_mongodb_uri")]
    pub mongodb_uri: String,
    #[serde(default = "default_mongodb_db")]
    pub mongodb_db: String,
    /// Upper bound for connecting to and selecting a store server.
    #[serde(default = "default_store_timeout_secs")]
    pub store_timeout_secs: u64,

    /// Shared secret used to verify identity provider tokens.
    #[serde(default = "default_identity_secret")]
    pub identity_secret: String,

    #[serde(default = "default_group_code_attempts")]
    pub group_code_attempts: u32,
    /// Drop dangling group codes from a user's memberships when aggregation
    /// runs into them.
    #[serde(default)]
    pub repair_dangling_memberships: bool,
    /// Planner items dated outside `[now, now + planner_window_days]` aren't synced.
    #[serde(default = "default_planner_window_days")]
    pub planner_window_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            file_path: config_dir().join("settings.yml"),
            store: default_store(),
            mongodb_uri: default_mongodb_uri(),
            mongodb_db: default_mongodb_db(),
            store_timeout_secs: default_store_timeout_secs(),
            identity_secret: default_identity_secret(),
            group_code_attempts: default_group_code_attempts(),
            repair_dangling_memberships: false,
            planner_window_days: default_planner_window_days(),
        }
    }
}

#[inline]
fn config_dir() -> PathBuf {
    PathBuf::from(env::var("CONFIG_DIR").unwrap_or("./config".to_string()))
}

impl Config {
    pub fn load() -> Result<Config, ConfigurationError> {
        let config_file = util::find_first_subpath(
            config_dir(),
            &["settings.yml", "settings.yaml"],
            Path::exists,
        )
        .ok_or_else(|| ConfigurationError::NotFound(config_dir()))?;

        let file = File::open(&config_file)?;
        let mut config: Config = serde_yaml::from_reader(BufReader::new(file))?;
        config.file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigurationError> {
        if let Some(parent) = self.file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&self.file_path)?;
        let mut out = BufWriter::new(file);
        serde_yaml::to_writer(&mut out, self)?;
        out.flush()?;
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            repair_dangling: self.repair_dangling_memberships,
        }
    }

    /// Configuration for tests and embedding: in-memory store, nothing read
    /// from disk.
    pub fn in_memory(identity_secret: impl ToString) -> Config {
        Config {
            store: StoreKind::Memory,
            identity_secret: identity_secret.to_string(),
            ..Default::default()
        }
    }
}
