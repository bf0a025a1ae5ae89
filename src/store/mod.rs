//! Document store the users and groups collections live in.
//!
//! Writes are single-document; nothing here spans both collections, so callers
//! composing a group write with a user write get no atomicity between the two.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rocket::futures::stream::BoxStream;
use thiserror::Error;

use crate::data::assignment::Assignment;
use crate::data::group::{GroupCode, GroupDocument};
use crate::data::user::UserDocument;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Conditional create hit an existing document.
    #[error("{0} already exists")]
    Conflict(String),
    /// Update targeted a document that doesn't exist.
    #[error("{0} not found")]
    Missing(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Bson(#[from] bson::ser::Error),
}

/// One notification per change to a watched user document.
pub type UserChanges = BoxStream<'static, Result<(), StoreError>>;

#[rocket::async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load_user(&self, uid: &str) -> Result<Option<UserDocument>, StoreError>;
    /// Creates the user document; `false` if one already exists.
    async fn insert_user(&self, user: &UserDocument) -> Result<bool, StoreError>;
    async fn replace_user_assignments(
        &self,
        uid: &str,
        assignments: &[Assignment],
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
    /// Adds `code` to the user's groups unless already present.
    async fn push_user_group(&self, uid: &str, code: &GroupCode) -> Result<(), StoreError>;
    async fn pull_user_group(&self, uid: &str, code: &GroupCode) -> Result<(), StoreError>;

    async fn load_group(&self, code: &GroupCode) -> Result<Option<GroupDocument>, StoreError>;
    /// Conditional create; [`StoreError::Conflict`] if the code is taken.
    async fn insert_group(&self, group: &GroupDocument) -> Result<(), StoreError>;
    /// Adds `uid` to the group's members unless already present.
    async fn push_group_member(&self, code: &GroupCode, uid: &str) -> Result<(), StoreError>;
    async fn pull_group_member(&self, code: &GroupCode, uid: &str) -> Result<(), StoreError>;

    async fn watch_user(&self, uid: &str) -> Result<UserChanges, StoreError>;
}

pub type Store = Arc<dyn DocumentStore>;
