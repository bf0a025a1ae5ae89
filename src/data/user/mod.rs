use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::data::assignment::Assignment;
use crate::data::group::GroupCode;
use crate::identity::{Identity, Profile};

pub mod db;

pub static USER_COLLECTION_NAME: &str = "users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    #[schema(value_type = Vec<String>)]
    pub groups: Vec<GroupCode>,
    /// Unset until the first sync.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignments: Option<Vec<Assignment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserDocument {
    pub fn new(identity: &Identity, profile: &Profile) -> UserDocument {
        tracing::info!("Creating user document for {}", identity);

        UserDocument {
            uid: identity.to_string(),
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            groups: vec![],
            assignments: None,
            last_sync: None,
            created_at: Utc::now(),
        }
    }

    /// Name shown to other group members.
    pub fn display_label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.email
        } else {
            &self.display_name
        }
    }

    pub fn synced_assignments(&self) -> &[Assignment] {
        self.assignments.as_deref().unwrap_or_default()
    }
}
