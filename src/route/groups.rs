use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::State;

use crate::config::Config;
use crate::data::group::db::{
    CreatedGroup, GroupCreateData, GroupJoinData, GroupRegistryExt, JoinedGroup,
};
use crate::data::group::{GroupCode, GroupDocument};
use crate::data::user::db::UserDirectoryExt;
use crate::resp::identity::IdentityToken;
use crate::resp::problem::Problem;
use crate::route::signed_in;
use crate::store::Store;

/// Groups the caller belongs to
#[utoipa::path(
    responses(
        (status = 200, description = "Caller's groups", body = Vec<GroupDocument>),
        (status = 502, description = "Store failure", body = Problem),
    ),
    security(("id_token" = []))
)]
#[get("/groups")]
#[tracing::instrument(skip(store))]
pub async fn group_list(
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
) -> Result<Json<Vec<GroupDocument>>, Problem> {
    let identity = signed_in(auth)?;
    Ok(Json(store.get_groups(&identity).await?))
}

#[utoipa::path(
    request_body = GroupCreateData,
    responses(
        (
            status = 201,
            description = "Group created with caller as its only member",
            body = CreatedGroup
        ),
        (status = 400, description = "Blank group name", body = Problem),
        (status = 503, description = "No unused group code found", body = Problem),
    ),
    security(("id_token" = []))
)]
#[post("/groups", data = "<group>")]
#[tracing::instrument(skip(store, config))]
pub async fn group_create(
    group: Json<GroupCreateData>,
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<(Status, Json<CreatedGroup>), Problem> {
    let identity = signed_in(auth)?;
    let created = store
        .create_group(&identity, &group.name, config.group_code_attempts)
        .await?;
    Ok((Status::Created, Json(created)))
}

#[utoipa::path(
    request_body = GroupJoinData,
    responses(
        (status = 200, description = "Joined group", body = JoinedGroup),
        (status = 404, description = "No group with that code", body = Problem),
        (status = 409, description = "Already a member", body = Problem),
    ),
    security(("id_token" = []))
)]
#[post("/groups/join", data = "<join>")]
#[tracing::instrument(skip(store))]
pub async fn group_join(
    join: Json<GroupJoinData>,
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
) -> Result<Json<JoinedGroup>, Problem> {
    let identity = signed_in(auth)?;
    Ok(Json(store.join_group(&identity, &join.code).await?))
}

#[utoipa::path(
    params(("code" = String, Path, description = "Group code, case insensitive")),
    responses(
        (status = 204, description = "Caller is no longer a member"),
    ),
    security(("id_token" = []))
)]
#[delete("/groups/<code>")]
#[tracing::instrument(skip(store))]
pub async fn group_leave(
    code: &str,
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
) -> Result<Status, Problem> {
    let identity = signed_in(auth)?;
    store.leave_group(&identity, code).await?;
    Ok(Status::NoContent)
}

#[utoipa::path(
    params(("code" = String, Path, description = "Group code, case insensitive")),
    responses(
        (status = 200, description = "Group document", body = GroupDocument),
        (status = 403, description = "Caller isn't a member", body = Problem),
        (status = 404, description = "No group with that code", body = Problem),
    ),
    security(("id_token" = []))
)]
#[get("/groups/<code>")]
#[tracing::instrument(skip(store))]
pub async fn group_get(
    code: &str,
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
) -> Result<Json<GroupDocument>, Problem> {
    let identity = signed_in(auth)?;
    Ok(Json(store.read_group(&identity, code).await?))
}

/// Drops group codes from the caller's memberships that no longer resolve
#[utoipa::path(
    responses(
        (status = 200, description = "Removed group codes", body = Vec<String>),
    ),
    security(("id_token" = []))
)]
#[post("/groups/reconcile")]
#[tracing::instrument(skip(store))]
pub async fn group_reconcile(
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
) -> Result<Json<Vec<GroupCode>>, Problem> {
    let identity = signed_in(auth)?;
    Ok(Json(store.reconcile_memberships(&identity).await?))
}
