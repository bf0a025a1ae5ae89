use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rocket::futures::future::ready;
use rocket::futures::StreamExt;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use super::{DocumentStore, StoreError, UserChanges};
use crate::data::assignment::Assignment;
use crate::data::group::{GroupCode, GroupDocument, GROUP_COLLECTION_NAME};
use crate::data::user::{UserDocument, USER_COLLECTION_NAME};

const CHANGE_FEED_CAPACITY: usize = 256;

fn user_path(uid: &str) -> String {
    format!("{}/{}", USER_COLLECTION_NAME, uid)
}

fn group_path(code: &GroupCode) -> String {
    format!("{}/{}", GROUP_COLLECTION_NAME, code)
}

/// Process-local store for tests and single-node development.
///
/// Documents can be taken offline by path (`users/<uid>`, `groups/<code>`) to
/// simulate a failing backend; every access to an offline document returns
/// [`StoreError::Unavailable`].
#[derive(Debug)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, UserDocument>>,
    groups: RwLock<HashMap<GroupCode, GroupDocument>>,
    changes: broadcast::Sender<String>,
    offline: Mutex<HashSet<String>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        MemoryStore {
            users: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            changes,
            offline: Mutex::new(HashSet::new()),
        }
    }

    pub fn take_offline(&self, path: impl ToString) {
        self.offline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string());
    }

    pub fn bring_online(&self, path: impl AsRef<str>) {
        self.offline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path.as_ref());
    }

    fn check(&self, path: String) -> Result<(), StoreError> {
        let offline = self
            .offline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&path);
        if offline {
            return Err(StoreError::Unavailable(path));
        }
        Ok(())
    }

    fn user_changed(&self, uid: &str) {
        // No receivers just means nobody is watching.
        let _ = self.changes.send(uid.to_string());
    }

    async fn update_user<F>(&self, uid: &str, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut UserDocument) + Send,
    {
        self.check(user_path(uid))?;
        {
            let mut users = self.users.write().await;
            let user = users
                .get_mut(uid)
                .ok_or_else(|| StoreError::Missing(format!("user {}", uid)))?;
            update(user);
        }
        self.user_changed(uid);
        Ok(())
    }

    async fn update_group<F>(&self, code: &GroupCode, update: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut GroupDocument) + Send,
    {
        self.check(group_path(code))?;
        let mut groups = self.groups.write().await;
        let group = groups
            .get_mut(code)
            .ok_or_else(|| StoreError::Missing(format!("group {}", code)))?;
        update(group);
        Ok(())
    }
}

#[rocket::async_trait]
impl DocumentStore for MemoryStore {
    async fn load_user(&self, uid: &str) -> Result<Option<UserDocument>, StoreError> {
        self.check(user_path(uid))?;
        Ok(self.users.read().await.get(uid).cloned())
    }

    async fn insert_user(&self, user: &UserDocument) -> Result<bool, StoreError> {
        self.check(user_path(&user.uid))?;
        {
            let mut users = self.users.write().await;
            if users.contains_key(&user.uid) {
                return Ok(false);
            }
            users.insert(user.uid.clone(), user.clone());
        }
        self.user_changed(&user.uid);
        Ok(true)
    }

    async fn replace_user_assignments(
        &self,
        uid: &str,
        assignments: &[Assignment],
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let assignments = assignments.to_vec();
        self.update_user(uid, move |user| {
            user.assignments = Some(assignments);
            user.last_sync = Some(synced_at);
        })
        .await
    }

    async fn push_user_group(&self, uid: &str, code: &GroupCode) -> Result<(), StoreError> {
        self.update_user(uid, |user| {
            if !user.groups.contains(code) {
                user.groups.push(code.clone());
            }
        })
        .await
    }

    async fn pull_user_group(&self, uid: &str, code: &GroupCode) -> Result<(), StoreError> {
        self.update_user(uid, |user| user.groups.retain(|it| it != code))
            .await
    }

    async fn load_group(&self, code: &GroupCode) -> Result<Option<GroupDocument>, StoreError> {
        self.check(group_path(code))?;
        Ok(self.groups.read().await.get(code).cloned())
    }

    async fn insert_group(&self, group: &GroupDocument) -> Result<(), StoreError> {
        self.check(group_path(&group.code))?;
        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.code) {
            return Err(StoreError::Conflict(format!("group {}", group.code)));
        }
        groups.insert(group.code.clone(), group.clone());
        Ok(())
    }

    async fn push_group_member(&self, code: &GroupCode, uid: &str) -> Result<(), StoreError> {
        self.update_group(code, |group| {
            if !group.has_member(uid) {
                group.members.push(uid.to_string());
            }
        })
        .await
    }

    async fn pull_group_member(&self, code: &GroupCode, uid: &str) -> Result<(), StoreError> {
        self.update_group(code, |group| group.members.retain(|it| it != uid))
            .await
    }

    async fn watch_user(&self, uid: &str) -> Result<UserChanges, StoreError> {
        self.check(user_path(uid))?;

        let uid = uid.to_string();
        let changes = BroadcastStream::new(self.changes.subscribe()).filter_map(move |change| {
            let relevant = match change {
                Ok(changed) => changed == uid,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::debug!("change feed lagged by {} events", skipped);
                    true
                }
            };
            ready(relevant.then_some(Ok::<(), StoreError>(())))
        });

        Ok(changes.boxed())
    }
}
