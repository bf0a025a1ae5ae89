//! Access rules for the `users` and `groups` collections.
//!
//! Users documents are world-readable to signed-in identities and writable only
//! by their owner. A group is readable only by its members, while creating a
//! group or changing its membership is open to anyone signed in.

use crate::data::group::GroupDocument;
use crate::error::CoreError;
use crate::identity::Identity;

#[derive(Debug, Clone, Copy)]
pub enum Access<'a> {
    ReadUser(&'a str),
    WriteUser(&'a str),
    ReadGroup(&'a GroupDocument),
    CreateGroup,
    UpdateGroup(&'a GroupDocument),
}

pub fn can_read_user(_actor: &Identity, _target: &str) -> bool {
    true
}

pub fn can_write_user(actor: &Identity, target: &str) -> bool {
    actor == target
}

pub fn can_read_group(actor: &Identity, group: &GroupDocument) -> bool {
    group.has_member(actor)
}

pub fn can_update_group(_actor: &Identity, _group: &GroupDocument) -> bool {
    true
}

pub fn allows(actor: &Identity, access: Access<'_>) -> bool {
    match access {
        Access::ReadUser(target) => can_read_user(actor, target),
        Access::WriteUser(target) => can_write_user(actor, target),
        Access::ReadGroup(group) => can_read_group(actor, group),
        Access::CreateGroup => true,
        Access::UpdateGroup(group) => can_update_group(actor, group),
    }
}

pub fn ensure(actor: &Identity, access: Access<'_>) -> Result<(), CoreError> {
    if allows(actor, access) {
        return Ok(());
    }

    tracing::debug!("denied {:?} for {}", access, actor);
    let detail = match access {
        Access::ReadUser(uid) => format!("can't read user {}", uid),
        Access::WriteUser(uid) => format!("can't write user {}", uid),
        Access::ReadGroup(group) => format!("not a member of group {}", group.code),
        Access::CreateGroup => "can't create groups".to_string(),
        Access::UpdateGroup(group) => format!("can't update group {}", group.code),
    };
    Err(CoreError::PermissionDenied(detail))
}
