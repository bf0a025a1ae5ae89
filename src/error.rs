use std::path::PathBuf;
use thiserror::Error;

use crate::data::group::GroupCode;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("configuration file not found in '{0}'")]
    NotFound(PathBuf),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    // External errors
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Cors(#[from] rocket_cors::Error),
}

/// Outcome of group, user and assignment operations that didn't succeed.
///
/// Expected conditions (missing group, repeated join, bad input) are ordinary
/// variants; store and network failures collapse into [`CoreError::RemoteFailure`]
/// with the upstream message preserved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("user not authenticated")]
    NotAuthenticated,
    #[error("{0} not found")]
    NotFound(String),
    #[error("already a member of group {0}")]
    AlreadyMember(GroupCode),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("no unused group code found after {0} attempts")]
    ExhaustedRetries(u32),
    #[error("remote failure: {0}")]
    RemoteFailure(String),
}

impl CoreError {
    pub fn group_not_found(code: &GroupCode) -> CoreError {
        CoreError::NotFound(format!("group {}", code))
    }

    pub fn user_not_found(uid: impl AsRef<str>) -> CoreError {
        CoreError::NotFound(format!("user {}", uid.as_ref()))
    }
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Missing(what) => CoreError::NotFound(what),
            other => CoreError::RemoteFailure(other.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
