use std::fmt::{Display, Formatter};

use crate::error::CoreError;

/// Opaque, stable user identifier issued by the identity provider.
///
/// Never empty; a blank identifier means the caller isn't signed in.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(uid: impl AsRef<str>) -> Result<Identity, CoreError> {
        let uid = uid.as_ref().trim();
        if uid.is_empty() {
            return Err(CoreError::NotAuthenticated);
        }
        Ok(Identity(uid.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for Identity {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<String> for Identity {
    fn eq(&self, other: &String) -> bool {
        &self.0 == other
    }
}

/// Profile data the identity provider hands over at sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub email: String,
    pub display_name: String,
}

impl Profile {
    pub fn new(email: impl ToString, display_name: impl ToString) -> Profile {
        Profile {
            email: email.to_string(),
            display_name: display_name.to_string(),
        }
    }
}
