use std::collections::BTreeMap;

use rocket::{Build, Rocket, Route};

pub mod assignments;
pub mod groups;
pub mod users;

use assignments::*;
use groups::*;
use users::*;

use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    data::{
        assignment::{
            aggregate::{AggregatedAssignment, FriendAssignments},
            planner::{Plannable, PlannerItem},
            Assignment,
        },
        group::{
            db::{CreatedGroup, GroupCreateData, GroupJoinData, JoinedGroup},
            GroupDocument,
        },
        user::{db::SyncReceipt, UserDocument},
    },
    identity::Identity,
    resp::{identity::doc::IdTokenAuth, identity::IdentityToken, problem::Problem},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        session_start,
        user_get,
        assignments_sync,
        planner_sync,
        group_list,
        group_create,
        group_join,
        group_leave,
        group_get,
        group_reconcile,
        friend_assignments,
        friend_feed
    ),
    components(schemas(
        UserDocument,
        SyncReceipt,
        Assignment,
        PlannerItem,
        Plannable,
        GroupDocument,
        GroupCreateData,
        GroupJoinData,
        CreatedGroup,
        JoinedGroup,
        FriendAssignments,
        AggregatedAssignment,
        Problem
    )),
    modifiers(&IdTokenAuth, &V1_PREFIX)
)]
pub struct ApiDocV1;

pub struct PathPrefix(pub &'static str);
static V1_PREFIX: PathPrefix = PathPrefix("/api/v1");

impl utoipa::Modify for PathPrefix {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut new_paths = BTreeMap::new();

        for (path, item) in std::mem::take(&mut openapi.paths.paths) {
            new_paths.insert(self.0.to_string() + path.as_ref(), item);
        }

        openapi.paths.paths = new_paths;
    }
}

/// Identity of a request that presented a valid identity token.
pub(crate) fn signed_in(auth: Result<IdentityToken, Problem>) -> Result<Identity, Problem> {
    Ok(auth?.identity()?)
}

pub fn api_v1() -> Vec<Route> {
    routes![
        session_start,
        user_get,
        assignments_sync,
        planner_sync,
        group_list,
        group_create,
        group_join,
        group_leave,
        group_get,
        group_reconcile,
        friend_assignments,
        friend_feed
    ]
}

pub fn mount_api(rocket: Rocket<Build>) -> Rocket<Build> {
    rocket.mount("/api/v1", api_v1()).mount(
        "/",
        SwaggerUi::new("/swagger/<_..>").url("/api/v1/openapi.json", ApiDocV1::openapi()),
    )
}
