#[macro_use]
extern crate rocket;
#[macro_use]
extern crate serde;

use std::sync::Arc;

use rocket::http::Method;
use rocket::{Build, Rocket};
use rocket_cors::{AllowedHeaders, AllowedOrigins};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{Config, StoreKind};
use crate::error::{BackendError, ConfigurationError};
use crate::route::mount_api;
use crate::store::{MemoryStore, MongoStore, Store};

pub mod config;
pub mod data;
pub mod error;
pub mod identity;
pub mod notify;
pub mod policy;
pub mod resp;
pub mod route;
pub mod store;
pub mod util;

#[cfg(test)]
mod testing;

fn init_logging(level: Level) {
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Unable to set global logger: {}", err);
    }
    if let Err(err) = tracing_log::LogTracer::init() {
        eprintln!("Unable to forward log records: {}", err);
    }
}

fn load_config() -> Result<Config, BackendError> {
    match Config::load() {
        Ok(c) => {
            tracing::info!("Configuration loaded.");
            Ok(c)
        }
        Err(ConfigurationError::NotFound(dir)) => {
            tracing::info!("No configuration in {}, generating defaults.", dir.display());
            let c = Config::default();
            if c.save().is_err() {
                tracing::warn!("Unable to save generated configuration.");
            }
            Ok(c)
        }
        Err(other) => {
            tracing::error!("Configuration error: {}", other);
            Err(other.into())
        }
    }
}

/// Opens the store selected by the configuration.
pub async fn open_store(c: &Config) -> Result<Store, BackendError> {
    match c.store {
        StoreKind::Mongodb => {
            tracing::info!("Connecting to MongoDB: {}", c.mongodb_uri);
            let mongo =
                MongoStore::connect(&c.mongodb_uri, &c.mongodb_db, c.store_timeout()).await?;

            if let Err(e) = mongo.ping().await {
                tracing::error!("Unable to connect to MongoDB.");
                return Err(e.into());
            }
            tracing::info!("Using MongoDB database: {}", c.mongodb_db);
            Ok(Arc::new(mongo))
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store, data is lost on shutdown.");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Reads `.env` and configuration, opens the store and builds the server.
pub async fn create(log_level: Option<Level>) -> Result<Rocket<Build>, BackendError> {
    if let Some(l) = log_level {
        init_logging(l);
    }

    tracing::info!("Reading .env file...");
    if dotenv::dotenv().is_err() {
        tracing::warn!("Unable to load .env file.");
    }

    tracing::info!("Loading configuration...");
    let c = load_config()?;
    let store = open_store(&c).await?;

    build(c, store)
}

/// Builds the HTTP server around an already opened store.
pub fn build(c: Config, store: Store) -> Result<Rocket<Build>, BackendError> {
    tracing::info!("Setting up CORS...");
    let cors = rocket_cors::CorsOptions {
        allowed_origins: AllowedOrigins::All,
        allowed_methods: vec![Method::Get, Method::Put, Method::Post, Method::Delete]
            .into_iter()
            .map(From::from)
            .collect(),
        allowed_headers: AllowedHeaders::All,
        allow_credentials: true,
        ..Default::default()
    }
    .to_cors()?;

    let r = rocket::build().manage(c).manage(store).attach(cors);
    Ok(mount_api(r))
}
