use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{random_codes, GroupCode, GroupDocument};
use crate::data::store_failure;
use crate::error::{CoreError, CoreResult};
use crate::identity::Identity;
use crate::policy::{self, Access};
use crate::store::{DocumentStore, StoreError};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GroupCreateData {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GroupJoinData {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatedGroup {
    #[schema(value_type = String)]
    pub code: GroupCode,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JoinedGroup {
    pub group_name: String,
    #[schema(value_type = String)]
    pub code: GroupCode,
}

#[rocket::async_trait]
pub trait GroupRegistryExt {
    /// Creates a group under a fresh random code with the creator as its only
    /// member, trying at most `max_attempts` codes.
    async fn create_group(
        &self,
        creator: &Identity,
        name: &str,
        max_attempts: u32,
    ) -> CoreResult<CreatedGroup>;

    /// [`GroupRegistryExt::create_group`] drawing candidate codes from `codes`.
    async fn create_group_with_codes(
        &self,
        creator: &Identity,
        name: &str,
        codes: &mut (dyn Iterator<Item = GroupCode> + Send),
        max_attempts: u32,
    ) -> CoreResult<CreatedGroup>;

    async fn join_group(&self, identity: &Identity, code: &str) -> CoreResult<JoinedGroup>;

    /// Removes the user from the group. The group stays around even with no
    /// members left.
    async fn leave_group(&self, identity: &Identity, code: &str) -> CoreResult<()>;

    async fn read_group(&self, actor: &Identity, code: &str) -> CoreResult<GroupDocument>;
}

#[rocket::async_trait]
impl<S: DocumentStore + ?Sized> GroupRegistryExt for S {
    async fn create_group(
        &self,
        creator: &Identity,
        name: &str,
        max_attempts: u32,
    ) -> CoreResult<CreatedGroup> {
        let mut codes = random_codes();
        self.create_group_with_codes(creator, name, &mut codes, max_attempts)
            .await
    }

    async fn create_group_with_codes(
        &self,
        creator: &Identity,
        name: &str,
        codes: &mut (dyn Iterator<Item = GroupCode> + Send),
        max_attempts: u32,
    ) -> CoreResult<CreatedGroup> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput(
                "group name must not be empty".to_string(),
            ));
        }
        policy::ensure(creator, Access::CreateGroup)?;

        for attempt in 1..=max_attempts {
            let code = match codes.next() {
                Some(it) => it,
                None => break,
            };

            // Point lookup first; the conditional insert below still catches
            // a concurrent creator that picked the same code.
            let existing = self
                .load_group(&code)
                .await
                .map_err(store_failure("create group"))?;
            if existing.is_some() {
                tracing::debug!("group code {} taken (attempt {})", code, attempt);
                continue;
            }

            match self
                .insert_group(&GroupDocument::new(code.clone(), name, creator))
                .await
            {
                Ok(()) => {}
                Err(StoreError::Conflict(_)) => {
                    tracing::debug!("group code {} raced (attempt {})", code, attempt);
                    continue;
                }
                Err(e) => return Err(store_failure("create group")(e)),
            }

            self.push_user_group(creator.as_str(), &code)
                .await
                .map_err(store_failure("create group"))?;

            tracing::info!("{} created group {} '{}'", creator, code, name);
            return Ok(CreatedGroup {
                code,
                name: name.to_string(),
            });
        }

        tracing::warn!("gave up looking for a free group code");
        Err(CoreError::ExhaustedRetries(max_attempts))
    }

    async fn join_group(&self, identity: &Identity, code: &str) -> CoreResult<JoinedGroup> {
        let code = GroupCode::parse(code)?;

        let group = self
            .load_group(&code)
            .await
            .map_err(store_failure("join group"))?
            .ok_or_else(|| CoreError::group_not_found(&code))?;
        policy::ensure(identity, Access::UpdateGroup(&group))?;

        if group.has_member(identity) {
            return Err(CoreError::AlreadyMember(code));
        }

        self.push_group_member(&code, identity.as_str())
            .await
            .map_err(store_failure("join group"))?;
        self.push_user_group(identity.as_str(), &code)
            .await
            .map_err(store_failure("join group"))?;

        tracing::info!("{} joined group {}", identity, code);
        Ok(JoinedGroup {
            group_name: group.name,
            code,
        })
    }

    async fn leave_group(&self, identity: &Identity, code: &str) -> CoreResult<()> {
        let code = GroupCode::parse(code)?;

        let group = self
            .load_group(&code)
            .await
            .map_err(store_failure("leave group"))?
            .ok_or_else(|| CoreError::group_not_found(&code))?;
        policy::ensure(identity, Access::UpdateGroup(&group))?;

        self.pull_group_member(&code, identity.as_str())
            .await
            .map_err(store_failure("leave group"))?;

        match self.pull_user_group(identity.as_str(), &code).await {
            Ok(()) | Err(StoreError::Missing(_)) => {}
            Err(e) => return Err(store_failure("leave group")(e)),
        }

        tracing::info!("{} left group {}", identity, code);
        Ok(())
    }

    async fn read_group(&self, actor: &Identity, code: &str) -> CoreResult<GroupDocument> {
        let code = GroupCode::parse(code)?;

        let group = self
            .load_group(&code)
            .await
            .map_err(store_failure("read group"))?
            .ok_or_else(|| CoreError::group_not_found(&code))?;
        policy::ensure(actor, Access::ReadGroup(&group))?;

        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::assignment::Assignment;
    use crate::data::user::db::UserDirectoryExt;
    use crate::data::user::UserDocument;
    use crate::store::{MemoryStore, UserChanges};
    use crate::testing::{id, signed_up};
    use chrono::{DateTime, Utc};

    fn code(s: &str) -> GroupCode {
        GroupCode::parse(s).unwrap()
    }

    #[rocket::async_test]
    async fn create_group_adds_creator() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;

        let created = store.create_group(&u1, "Study Group Fall 2024", 16).await.unwrap();
        assert_eq!(created.code.as_str().len(), 6);
        assert!(created
            .code
            .as_str()
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(created.name, "Study Group Fall 2024");

        let group = store.read_group(&u1, created.code.as_str()).await.unwrap();
        assert_eq!(group.members, vec!["u1".to_string()]);
        assert_eq!(group.created_by, "u1");

        let user = store.read_user(&u1, "u1").await.unwrap();
        assert_eq!(user.groups, vec![created.code]);
    }

    #[rocket::async_test]
    async fn create_group_rejects_blank_names() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;

        for name in ["", "   \t"] {
            assert!(matches!(
                store.create_group(&u1, name, 16).await,
                Err(CoreError::InvalidInput(_))
            ));
        }
    }

    #[rocket::async_test]
    async fn create_group_retries_on_collision() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let u2 = signed_up(&store, "u2", "Two").await;

        let mut first = vec![code("AAAAAA")].into_iter();
        store
            .create_group_with_codes(&u1, "First", &mut first, 4)
            .await
            .unwrap();

        let mut colliding = vec![code("AAAAAA"), code("AAAAAA"), code("BBBBBB")].into_iter();
        let created = store
            .create_group_with_codes(&u2, "Second", &mut colliding, 4)
            .await
            .unwrap();

        assert_eq!(created.code, code("BBBBBB"));
        let original = store.read_group(&u1, "AAAAAA").await.unwrap();
        assert_eq!(original.name, "First");
    }

    #[rocket::async_test]
    async fn create_group_gives_up_after_max_attempts() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let mut first = vec![code("AAAAAA")].into_iter();
        store
            .create_group_with_codes(&u1, "First", &mut first, 1)
            .await
            .unwrap();

        let mut always_taken = std::iter::repeat(code("AAAAAA"));
        let result = store
            .create_group_with_codes(&u1, "Second", &mut always_taken, 5)
            .await;

        assert_eq!(result, Err(CoreError::ExhaustedRetries(5)));
        let user = store.read_user(&u1, "u1").await.unwrap();
        assert_eq!(user.groups.len(), 1);
    }

    #[rocket::async_test]
    async fn join_normalizes_code_and_links_both_sides() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let u2 = signed_up(&store, "u2", "Two").await;
        let mut codes = vec![code("ABC123")].into_iter();
        store
            .create_group_with_codes(&u1, "Calc", &mut codes, 1)
            .await
            .unwrap();

        let joined = store.join_group(&u2, " abc123").await.unwrap();
        assert_eq!(
            joined,
            JoinedGroup {
                group_name: "Calc".to_string(),
                code: code("ABC123")
            }
        );

        let group = store.read_group(&u2, "ABC123").await.unwrap();
        assert_eq!(group.members, vec!["u1".to_string(), "u2".to_string()]);
        assert_eq!(
            store.read_user(&u2, "u2").await.unwrap().groups,
            vec![code("ABC123")]
        );
    }

    #[rocket::async_test]
    async fn second_join_is_rejected() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let u2 = signed_up(&store, "u2", "Two").await;
        let created = store.create_group(&u1, "Calc", 16).await.unwrap();

        store.join_group(&u2, created.code.as_str()).await.unwrap();
        let again = store.join_group(&u2, created.code.as_str()).await;
        assert_eq!(again, Err(CoreError::AlreadyMember(created.code.clone())));

        let creator_again = store.join_group(&u1, created.code.as_str()).await;
        assert_eq!(creator_again, Err(CoreError::AlreadyMember(created.code.clone())));

        let group = store.read_group(&u1, created.code.as_str()).await.unwrap();
        assert_eq!(group.members.len(), 2);
    }

    #[rocket::async_test]
    async fn join_unknown_group_is_not_found() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;

        assert!(matches!(
            store.join_group(&u1, "ZZZZZZ").await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            store.join_group(&u1, "").await,
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[rocket::async_test]
    async fn malformed_codes_are_not_found() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        store.create_group(&u1, "Calc", 16).await.unwrap();

        for bad in ["ABC12", "AB-123", "abcdefg", "ÄBC123"] {
            assert!(
                matches!(store.join_group(&u1, bad).await, Err(CoreError::NotFound(_))),
                "join accepted '{}'",
                bad
            );
            assert!(
                matches!(store.leave_group(&u1, bad).await, Err(CoreError::NotFound(_))),
                "leave accepted '{}'",
                bad
            );
        }

        assert!(matches!(
            store.leave_group(&u1, "  ").await,
            Err(CoreError::InvalidInput(_))
        ));
        assert_eq!(store.read_user(&u1, "u1").await.unwrap().groups.len(), 1);
    }

    #[rocket::async_test]
    async fn leave_then_join_restores_membership() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let created = store.create_group(&u1, "Solo", 16).await.unwrap();

        store.leave_group(&u1, created.code.as_str()).await.unwrap();
        assert!(store.read_user(&u1, "u1").await.unwrap().groups.is_empty());
        let empty = store.load_group(&created.code).await.unwrap().unwrap();
        assert!(empty.members.is_empty(), "group should survive with no members");

        store.join_group(&u1, created.code.as_str()).await.unwrap();
        let group = store.read_group(&u1, created.code.as_str()).await.unwrap();
        assert_eq!(group.members, vec!["u1".to_string()]);
        assert_eq!(
            store.read_user(&u1, "u1").await.unwrap().groups,
            vec![created.code]
        );
    }

    #[rocket::async_test]
    async fn leave_as_non_member_is_a_no_op() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let created = store.create_group(&u1, "Calc", 16).await.unwrap();

        store
            .leave_group(&id("stranger"), created.code.as_str())
            .await
            .unwrap();
        let group = store.read_group(&u1, created.code.as_str()).await.unwrap();
        assert_eq!(group.members, vec!["u1".to_string()]);

        assert!(matches!(
            store.leave_group(&u1, "ZZZZZZ").await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[rocket::async_test]
    async fn groups_are_private_to_members() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let u2 = signed_up(&store, "u2", "Two").await;
        let created = store.create_group(&u1, "Calc", 16).await.unwrap();

        assert!(matches!(
            store.read_group(&u2, created.code.as_str()).await,
            Err(CoreError::PermissionDenied(_))
        ));
    }

    #[rocket::async_test]
    async fn store_failures_surface_as_remote_failure() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let created = store.create_group(&u1, "Calc", 16).await.unwrap();
        store.take_offline(format!("groups/{}", created.code));

        match store.join_group(&u1, created.code.as_str()).await {
            Err(CoreError::RemoteFailure(message)) => {
                assert!(message.contains(created.code.as_str()))
            }
            other => panic!("expected remote failure, got {:?}", other),
        }
    }

    #[rocket::async_test]
    async fn user_write_failure_leaves_group_membership() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let u2 = signed_up(&store, "u2", "Two").await;
        let created = store.create_group(&u1, "Calc", 16).await.unwrap();
        store.take_offline("users/u2");

        let result = store.join_group(&u2, created.code.as_str()).await;
        assert!(matches!(result, Err(CoreError::RemoteFailure(_))));

        // The two writes aren't atomic: the group side already went through.
        let group = store.load_group(&created.code).await.unwrap().unwrap();
        assert!(group.has_member("u2"));
    }

    /// Hides some groups from point lookups, as if another creator inserted
    /// them between this creator's lookup and insert.
    struct ConcurrentCreator {
        inner: MemoryStore,
        hidden: Vec<GroupCode>,
    }

    #[rocket::async_trait]
    impl DocumentStore for ConcurrentCreator {
        async fn load_user(&self, uid: &str) -> Result<Option<UserDocument>, StoreError> {
            self.inner.load_user(uid).await
        }

        async fn insert_user(&self, user: &UserDocument) -> Result<bool, StoreError> {
            self.inner.insert_user(user).await
        }

        async fn replace_user_assignments(
            &self,
            uid: &str,
            assignments: &[Assignment],
            synced_at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner
                .replace_user_assignments(uid, assignments, synced_at)
                .await
        }

        async fn push_user_group(&self, uid: &str, code: &GroupCode) -> Result<(), StoreError> {
            self.inner.push_user_group(uid, code).await
        }

        async fn pull_user_group(&self, uid: &str, code: &GroupCode) -> Result<(), StoreError> {
            self.inner.pull_user_group(uid, code).await
        }

        async fn load_group(&self, code: &GroupCode) -> Result<Option<GroupDocument>, StoreError> {
            if self.hidden.contains(code) {
                return Ok(None);
            }
            self.inner.load_group(code).await
        }

        async fn insert_group(&self, group: &GroupDocument) -> Result<(), StoreError> {
            self.inner.insert_group(group).await
        }

        async fn push_group_member(&self, code: &GroupCode, uid: &str) -> Result<(), StoreError> {
            self.inner.push_group_member(code, uid).await
        }

        async fn pull_group_member(&self, code: &GroupCode, uid: &str) -> Result<(), StoreError> {
            self.inner.pull_group_member(code, uid).await
        }

        async fn watch_user(&self, uid: &str) -> Result<UserChanges, StoreError> {
            self.inner.watch_user(uid).await
        }
    }

    #[rocket::async_test]
    async fn create_group_retries_when_insert_conflicts() {
        let inner = MemoryStore::new();
        let u1 = signed_up(&inner, "u1", "One").await;
        let u2 = signed_up(&inner, "u2", "Two").await;
        let mut first = vec![code("AAAAAA")].into_iter();
        inner
            .create_group_with_codes(&u1, "First", &mut first, 1)
            .await
            .unwrap();

        let store = ConcurrentCreator {
            inner,
            hidden: vec![code("AAAAAA")],
        };

        let mut racing = vec![code("AAAAAA"), code("BBBBBB")].into_iter();
        let created = store
            .create_group_with_codes(&u2, "Second", &mut racing, 4)
            .await
            .unwrap();
        assert_eq!(created.code, code("BBBBBB"));

        let original = store.inner.load_group(&code("AAAAAA")).await.unwrap().unwrap();
        assert_eq!(original.name, "First");
        assert_eq!(original.members, vec!["u1".to_string()]);

        let mut always_racing = std::iter::repeat(code("AAAAAA"));
        let result = store
            .create_group_with_codes(&u2, "Third", &mut always_racing, 3)
            .await;
        assert_eq!(result, Err(CoreError::ExhaustedRetries(3)));

        let user = store.inner.read_user(&u2, "u2").await.unwrap();
        assert_eq!(user.groups, vec![code("BBBBBB")]);
    }
}
