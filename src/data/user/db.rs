use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserDocument;
use crate::data::assignment::planner::{self, PlannerSource, PlannerWindow};
use crate::data::assignment::Assignment;
use crate::data::group::{GroupCode, GroupDocument};
use crate::data::store_failure;
use crate::error::{CoreError, CoreResult};
use crate::identity::{Identity, Profile};
use crate::policy::{self, Access};
use crate::store::{DocumentStore, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncReceipt {
    pub count: usize,
    pub last_sync: DateTime<Utc>,
}

/// A user's group codes split by whether they still resolve for that user.
#[derive(Debug, Default)]
pub(crate) struct ResolvedGroups {
    pub groups: Vec<GroupDocument>,
    /// Missing groups, or groups that no longer list the user.
    pub dangling: Vec<GroupCode>,
    pub failed: Vec<(GroupCode, StoreError)>,
}

pub(crate) async fn resolve_groups<S: DocumentStore + ?Sized>(
    store: &S,
    identity: &Identity,
    codes: &[GroupCode],
) -> ResolvedGroups {
    let mut resolved = ResolvedGroups::default();

    for code in codes {
        match store.load_group(code).await {
            Ok(Some(group)) if policy::allows(identity, Access::ReadGroup(&group)) => {
                resolved.groups.push(group)
            }
            Ok(_) => {
                tracing::debug!("{} has dangling group reference {}", identity, code);
                resolved.dangling.push(code.clone())
            }
            Err(e) => resolved.failed.push((code.clone(), e)),
        }
    }

    resolved
}

#[rocket::async_trait]
pub trait UserDirectoryExt {
    /// Creates the user document on first sign-in. Returns whether it was
    /// created; existing documents are left untouched.
    async fn ensure_user(&self, identity: &Identity, profile: &Profile) -> CoreResult<bool>;

    async fn read_user(&self, actor: &Identity, uid: &str) -> CoreResult<UserDocument>;

    /// Replaces the stored assignment snapshot wholesale.
    async fn sync_assignments(
        &self,
        identity: &Identity,
        assignments: Vec<Assignment>,
    ) -> CoreResult<SyncReceipt>;

    /// Pulls planner items for the next `window_days` days, sanitizes them
    /// and syncs the result.
    async fn sync_from_source(
        &self,
        identity: &Identity,
        source: &dyn PlannerSource,
        window_days: i64,
    ) -> CoreResult<SyncReceipt>;

    /// Groups the user belongs to, skipping codes that no longer resolve.
    async fn get_groups(&self, identity: &Identity) -> CoreResult<Vec<GroupDocument>>;

    /// Drops dangling group codes from the user's memberships and returns
    /// them. Safe to run repeatedly.
    async fn reconcile_memberships(&self, identity: &Identity) -> CoreResult<Vec<GroupCode>>;
}

#[rocket::async_trait]
impl<S: DocumentStore + ?Sized> UserDirectoryExt for S {
    async fn ensure_user(&self, identity: &Identity, profile: &Profile) -> CoreResult<bool> {
        policy::ensure(identity, Access::WriteUser(identity.as_str()))?;

        let existing = self
            .load_user(identity.as_str())
            .await
            .map_err(store_failure("ensure user"))?;
        if existing.is_some() {
            tracing::trace!("user {} already exists", identity);
            return Ok(false);
        }

        self.insert_user(&UserDocument::new(identity, profile))
            .await
            .map_err(store_failure("ensure user"))
    }

    async fn read_user(&self, actor: &Identity, uid: &str) -> CoreResult<UserDocument> {
        policy::ensure(actor, Access::ReadUser(uid))?;

        self.load_user(uid)
            .await
            .map_err(store_failure("read user"))?
            .ok_or_else(|| CoreError::user_not_found(uid))
    }

    async fn sync_assignments(
        &self,
        identity: &Identity,
        assignments: Vec<Assignment>,
    ) -> CoreResult<SyncReceipt> {
        policy::ensure(identity, Access::WriteUser(identity.as_str()))?;

        let last_sync = Utc::now();
        self.replace_user_assignments(identity.as_str(), &assignments, last_sync)
            .await
            .map_err(store_failure("sync assignments"))?;

        tracing::debug!("synced {} assignments for {}", assignments.len(), identity);
        Ok(SyncReceipt {
            count: assignments.len(),
            last_sync,
        })
    }

    async fn sync_from_source(
        &self,
        identity: &Identity,
        source: &dyn PlannerSource,
        window_days: i64,
    ) -> CoreResult<SyncReceipt> {
        let items = source
            .planner_items(PlannerWindow::starting_now(window_days))
            .await?;
        let fetched = items.len();
        let assignments = planner::sanitize(items);
        tracing::debug!(
            "kept {} of {} planner items for {}",
            assignments.len(),
            fetched,
            identity
        );

        self.sync_assignments(identity, assignments).await
    }

    async fn get_groups(&self, identity: &Identity) -> CoreResult<Vec<GroupDocument>> {
        let user = match self
            .load_user(identity.as_str())
            .await
            .map_err(store_failure("get groups"))?
        {
            Some(it) => it,
            None => return Ok(vec![]),
        };

        let mut resolved = resolve_groups(self, identity, &user.groups).await;
        if !resolved.failed.is_empty() {
            let (_, e) = resolved.failed.swap_remove(0);
            return Err(store_failure("get groups")(e));
        }

        Ok(resolved.groups)
    }

    async fn reconcile_memberships(&self, identity: &Identity) -> CoreResult<Vec<GroupCode>> {
        policy::ensure(identity, Access::WriteUser(identity.as_str()))?;

        let user = self
            .load_user(identity.as_str())
            .await
            .map_err(store_failure("reconcile memberships"))?
            .ok_or_else(|| CoreError::user_not_found(identity))?;

        let resolved = resolve_groups(self, identity, &user.groups).await;
        for code in &resolved.dangling {
            self.pull_user_group(identity.as_str(), code)
                .await
                .map_err(store_failure("reconcile memberships"))?;
        }

        if !resolved.dangling.is_empty() {
            tracing::info!(
                "removed {} dangling group reference(s) from {}",
                resolved.dangling.len(),
                identity
            );
        }
        Ok(resolved.dangling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::assignment::planner::PlannerItem;
    use crate::data::group::db::GroupRegistryExt;
    use crate::store::MemoryStore;
    use crate::testing::{id, signed_up};

    struct CannedPlanner(&'static str);

    #[rocket::async_trait]
    impl PlannerSource for CannedPlanner {
        async fn planner_items(&self, _: PlannerWindow) -> Result<Vec<PlannerItem>, CoreError> {
            serde_json::from_str(self.0).map_err(|e| CoreError::RemoteFailure(e.to_string()))
        }
    }

    #[rocket::async_test]
    async fn ensure_user_is_idempotent() {
        let store = MemoryStore::new();
        let u1 = id("u1");

        assert!(store
            .ensure_user(&u1, &Profile::new("u1@uni.edu", "One"))
            .await
            .unwrap());
        let created = store.read_user(&u1, "u1").await.unwrap();

        assert!(!store
            .ensure_user(&u1, &Profile::new("other@uni.edu", "Renamed"))
            .await
            .unwrap());
        let again = store.read_user(&u1, "u1").await.unwrap();

        assert_eq!(created, again);
        assert!(again.groups.is_empty());
        assert_eq!(again.assignments, None);
    }

    #[rocket::async_test]
    async fn sync_round_trips_in_order() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let assignments = vec![
            Assignment::new("B", "2024-12-22T17:00:00Z", "English", "2"),
            Assignment::new("A", "2024-12-20T23:59:00Z", "Calculus", 1),
        ];

        let before = Utc::now();
        let receipt = store
            .sync_assignments(&u1, assignments.clone())
            .await
            .unwrap();

        let user = store.read_user(&u1, "u1").await.unwrap();
        assert_eq!(user.assignments, Some(assignments));
        assert_eq!(receipt.count, 2);
        assert!(user.last_sync.unwrap() >= before);
    }

    #[rocket::async_test]
    async fn sync_replaces_previous_snapshot() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;

        store
            .sync_assignments(&u1, vec![Assignment::new("Old", "2024-12-01", "C", 1)])
            .await
            .unwrap();
        store.sync_assignments(&u1, vec![]).await.unwrap();

        let user = store.read_user(&u1, "u1").await.unwrap();
        assert_eq!(user.assignments, Some(vec![]));
    }

    #[rocket::async_test]
    async fn sync_without_user_document_is_not_found() {
        let store = MemoryStore::new();
        let result = store.sync_assignments(&id("ghost"), vec![]).await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[rocket::async_test]
    async fn sync_failure_preserves_message() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        store.take_offline("users/u1");

        match store.sync_assignments(&u1, vec![]).await {
            Err(CoreError::RemoteFailure(message)) => assert!(message.contains("users/u1")),
            other => panic!("expected remote failure, got {:?}", other),
        }
    }

    #[rocket::async_test]
    async fn sync_from_source_sanitizes() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let source = CannedPlanner(
            r#"[
                {"plannable_type": "assignment", "plannable_date": "2024-12-20T23:59:00Z",
                 "plannable_id": 7, "context_name": "Physics"},
                {"plannable_type": "announcement", "plannable_date": "2024-12-20T23:59:00Z",
                 "plannable_id": 8}
            ]"#,
        );

        let receipt = store.sync_from_source(&u1, &source, 60).await.unwrap();
        assert_eq!(receipt.count, 1);

        let user = store.read_user(&u1, "u1").await.unwrap();
        assert_eq!(
            user.assignments.unwrap(),
            vec![Assignment::new(
                "Untitled Assignment",
                "2024-12-20T23:59:00Z",
                "Physics",
                7
            )]
        );
    }

    #[rocket::async_test]
    async fn get_groups_skips_dangling_codes() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let created = store.create_group(&u1, "Real", 4).await.unwrap();
        store
            .push_user_group("u1", &GroupCode::parse("GONE00").unwrap())
            .await
            .unwrap();

        let groups = store.get_groups(&u1).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].code, created.code);
    }

    #[rocket::async_test]
    async fn get_groups_for_unknown_user_is_empty() {
        let store = MemoryStore::new();
        assert!(store.get_groups(&id("ghost")).await.unwrap().is_empty());
    }

    #[rocket::async_test]
    async fn reconcile_drops_only_dangling_codes() {
        let store = MemoryStore::new();
        let u1 = signed_up(&store, "u1", "One").await;
        let u2 = signed_up(&store, "u2", "Two").await;

        let kept = store.create_group(&u1, "Kept", 4).await.unwrap();
        let foreign = store.create_group(&u2, "Not mine", 4).await.unwrap();
        let gone = GroupCode::parse("GONE00").unwrap();
        store.push_user_group("u1", &gone).await.unwrap();
        store.push_user_group("u1", &foreign.code).await.unwrap();

        let removed = store.reconcile_memberships(&u1).await.unwrap();
        assert_eq!(removed, vec![gone, foreign.code]);

        let user = store.read_user(&u1, "u1").await.unwrap();
        assert_eq!(user.groups, vec![kept.code]);

        assert!(store.reconcile_memberships(&u1).await.unwrap().is_empty());
    }
}
