use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CoreError;
use crate::identity::Identity;

pub mod db;

pub static GROUP_COLLECTION_NAME: &str = "groups";

pub const GROUP_CODE_LENGTH: usize = 6;
const GROUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Six character `[A-Z0-9]` code identifying a group. Doubles as the group's
/// storage key.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupCode(String);

impl GroupCode {
    pub fn random() -> GroupCode {
        let mut rng = rand::thread_rng();
        let code = (0..GROUP_CODE_LENGTH)
            .map(|_| GROUP_CODE_ALPHABET[rng.gen_range(0..GROUP_CODE_ALPHABET.len())] as char)
            .collect();
        GroupCode(code)
    }

    /// Normalizes user input (trimmed, uppercased). Only blank input is
    /// rejected; a code that doesn't name a group fails at lookup instead.
    pub fn parse(input: impl AsRef<str>) -> Result<GroupCode, CoreError> {
        let code = input.as_ref().trim().to_uppercase();

        if code.is_empty() {
            return Err(CoreError::InvalidInput(
                "group code must not be empty".to_string(),
            ));
        }

        Ok(GroupCode(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for GroupCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GroupCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Endless supply of random candidate codes.
pub fn random_codes() -> impl Iterator<Item = GroupCode> + Send {
    std::iter::repeat_with(GroupCode::random)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupDocument {
    #[schema(value_type = String)]
    pub code: GroupCode,
    pub name: String,
    pub created_by: String,
    #[serde(default)]
    pub members: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl GroupDocument {
    pub fn new(code: GroupCode, name: impl ToString, creator: &Identity) -> GroupDocument {
        GroupDocument {
            code,
            name: name.to_string(),
            created_by: creator.to_string(),
            members: vec![creator.to_string()],
            created_at: Utc::now(),
        }
    }

    pub fn has_member(&self, uid: impl AsRef<str>) -> bool {
        self.members.iter().any(|it| it == uid.as_ref())
    }
}
