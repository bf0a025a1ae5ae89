use rocket::serde::json::Json;
use rocket::State;

use crate::config::Config;
use crate::data::assignment::aggregate::{
    AggregatedAssignment, AssignmentAggregatorExt, FriendAssignments,
};
use crate::resp::identity::IdentityToken;
use crate::resp::problem::Problem;
use crate::route::signed_in;
use crate::store::Store;

/// Assignments of everyone sharing a group with the caller, grouped by owner
#[utoipa::path(
    responses(
        (
            status = 200,
            description = "One entry per group member with synced assignments",
            body = Vec<FriendAssignments>
        ),
    ),
    security(("id_token" = []))
)]
#[get("/assignments/friends")]
#[tracing::instrument(skip(store, config))]
pub async fn friend_assignments(
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<Json<Vec<FriendAssignments>>, Problem> {
    let identity = signed_in(auth)?;
    Ok(Json(
        store
            .get_friend_assignments(&identity, config.aggregate_options())
            .await,
    ))
}

/// Same assignments as a single list ordered by due date
#[utoipa::path(
    responses(
        (
            status = 200,
            description = "Owner tagged assignments, earliest due first",
            body = Vec<AggregatedAssignment>
        ),
    ),
    security(("id_token" = []))
)]
#[get("/assignments/feed")]
#[tracing::instrument(skip(store, config))]
pub async fn friend_feed(
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<Json<Vec<AggregatedAssignment>>, Problem> {
    let identity = signed_in(auth)?;
    Ok(Json(
        store
            .get_friend_feed(&identity, config.aggregate_options())
            .await,
    ))
}
