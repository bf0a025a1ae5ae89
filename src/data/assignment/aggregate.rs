//! Merged view of the assignments of everyone a user shares a group with.
//!
//! Reads here never fail the whole view: unreadable groups and members are
//! logged and skipped so whatever is reachable still shows up.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{Assignment, AssignmentId};
use crate::data::user::db::{resolve_groups, UserDirectoryExt};
use crate::identity::Identity;
use crate::store::DocumentStore;
use crate::util::parse_timestamp;

/// One group mate's latest synced assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FriendAssignments {
    pub owner_identity: String,
    pub owner_display_name: String,
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedAssignment {
    pub title: String,
    pub due_date: String,
    pub course_name: String,
    #[schema(value_type = String)]
    pub id: AssignmentId,
    pub owner_identity: String,
    pub owner_display_name: String,
}

impl AggregatedAssignment {
    pub fn new(assignment: &Assignment, owner: &FriendAssignments) -> AggregatedAssignment {
        AggregatedAssignment {
            title: assignment.title.clone(),
            due_date: assignment.due_date.clone(),
            course_name: assignment.course_name.clone(),
            id: assignment.id.clone(),
            owner_identity: owner.owner_identity.clone(),
            owner_display_name: owner.owner_display_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Run membership reconciliation when a dangling group code shows up.
    pub repair_dangling: bool,
}

/// Orders by due date, earliest first. Unparsable dates go last; ties keep
/// their relative order.
pub fn sort_by_due_date(items: &mut [AggregatedAssignment]) {
    items.sort_by_cached_key(|it| {
        let due = parse_timestamp(&it.due_date);
        (due.is_none(), due)
    });
}

pub fn flatten_sorted(friends: &[FriendAssignments]) -> Vec<AggregatedAssignment> {
    let mut flat: Vec<AggregatedAssignment> = friends
        .iter()
        .flat_map(|owner| {
            owner
                .assignments
                .iter()
                .map(move |a| AggregatedAssignment::new(a, owner))
        })
        .collect();

    sort_by_due_date(&mut flat);
    flat
}

#[rocket::async_trait]
pub trait AssignmentAggregatorExt {
    /// Assignments of every other member of the user's groups, one entry per
    /// member with something synced, ordered by member identity.
    async fn get_friend_assignments(
        &self,
        identity: &Identity,
        options: AggregateOptions,
    ) -> Vec<FriendAssignments>;

    /// Same as [`AssignmentAggregatorExt::get_friend_assignments`] but `None`
    /// when the requesting user's own document can't be read.
    async fn friend_assignments_snapshot(
        &self,
        identity: &Identity,
        options: AggregateOptions,
    ) -> Option<Vec<FriendAssignments>>;

    /// Flattened, owner-tagged and sorted by due date.
    async fn get_friend_feed(
        &self,
        identity: &Identity,
        options: AggregateOptions,
    ) -> Vec<AggregatedAssignment>;
}

#[rocket::async_trait]
impl<S: DocumentStore + ?Sized> AssignmentAggregatorExt for S {
    async fn get_friend_assignments(
        &self,
        identity: &Identity,
        options: AggregateOptions,
    ) -> Vec<FriendAssignments> {
        self.friend_assignments_snapshot(identity, options)
            .await
            .unwrap_or_default()
    }

    async fn friend_assignments_snapshot(
        &self,
        identity: &Identity,
        options: AggregateOptions,
    ) -> Option<Vec<FriendAssignments>> {
        let user = match self.load_user(identity.as_str()).await {
            Ok(Some(it)) => it,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("unable to load {} for aggregation: {}", identity, e);
                return None;
            }
        };

        let resolved = resolve_groups(self, identity, &user.groups).await;
        for (code, e) in &resolved.failed {
            tracing::warn!("skipping group {} while aggregating: {}", code, e);
        }

        if options.repair_dangling && !resolved.dangling.is_empty() {
            if let Err(e) = self.reconcile_memberships(identity).await {
                tracing::warn!("membership repair for {} failed: {}", identity, e);
            }
        }

        let members: BTreeSet<&str> = resolved
            .groups
            .iter()
            .flat_map(|group| group.members.iter())
            .map(String::as_str)
            .filter(|member| *member != identity.as_str())
            .collect();

        let mut friends = Vec::with_capacity(members.len());
        for member in members {
            match self.load_user(member).await {
                Ok(Some(friend)) if !friend.synced_assignments().is_empty() => {
                    friends.push(FriendAssignments {
                        owner_identity: friend.uid.clone(),
                        owner_display_name: friend.display_label().to_string(),
                        assignments: friend.synced_assignments().to_vec(),
                    })
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("skipping member {} while aggregating: {}", member, e),
            }
        }

        tracing::debug!("aggregated {} group mate(s) for {}", friends.len(), identity);
        Some(friends)
    }

    async fn get_friend_feed(
        &self,
        identity: &Identity,
        options: AggregateOptions,
    ) -> Vec<AggregatedAssignment> {
        flatten_sorted(&self.get_friend_assignments(identity, options).await)
    }
}
