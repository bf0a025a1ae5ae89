use rocket::serde::json::Json;
use rocket::State;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::data::assignment::planner::{PlannerItem, PlannerSource, PlannerWindow};
use crate::data::assignment::Assignment;
use crate::data::user::db::{SyncReceipt, UserDirectoryExt};
use crate::data::user::UserDocument;
use crate::error::CoreError;
use crate::resp::identity::IdentityToken;
use crate::resp::problem::Problem;
use crate::route::signed_in;
use crate::store::Store;

/// Signs in: creates the caller's user document on first use
#[utoipa::path(
    responses(
        (status = 200, description = "Caller's user document", body = UserDocument),
        (status = 401, description = "Missing or invalid identity token", body = Problem),
    ),
    security(("id_token" = []))
)]
#[post("/session")]
#[tracing::instrument(skip(store))]
pub async fn session_start(
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
) -> Result<Json<UserDocument>, Problem> {
    let token = auth?;
    let identity = token.identity()?;

    if store.ensure_user(&identity, &token.profile()).await? {
        tracing::info!("first sign-in for {}", identity);
    }

    Ok(Json(store.read_user(&identity, identity.as_str()).await?))
}

#[utoipa::path(
    params(("uid" = String, Path, description = "User identity")),
    responses(
        (status = 200, description = "User document", body = UserDocument),
        (status = 404, description = "No such user", body = Problem),
    ),
    security(("id_token" = []))
)]
#[get("/users/<uid>")]
#[tracing::instrument(skip(store))]
pub async fn user_get(
    uid: &str,
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
) -> Result<Json<UserDocument>, Problem> {
    let identity = signed_in(auth)?;
    Ok(Json(store.read_user(&identity, uid).await?))
}

/// Replaces the caller's assignment snapshot
#[utoipa::path(
    request_body = Vec<Assignment>,
    responses(
        (status = 200, description = "Sync receipt", body = SyncReceipt),
        (status = 404, description = "Caller never signed in", body = Problem),
    ),
    security(("id_token" = []))
)]
#[put("/users/me/assignments", data = "<assignments>")]
#[tracing::instrument(skip(store, assignments))]
pub async fn assignments_sync(
    assignments: Json<Vec<Assignment>>,
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
) -> Result<Json<SyncReceipt>, Problem> {
    let identity = signed_in(auth)?;
    Ok(Json(
        store
            .sync_assignments(&identity, assignments.into_inner())
            .await?,
    ))
}

/// Sanitizes raw course planner items and syncs the assignments among them
#[utoipa::path(
    request_body = Vec<PlannerItem>,
    responses(
        (status = 200, description = "Sync receipt", body = SyncReceipt),
        (status = 404, description = "Caller never signed in", body = Problem),
    ),
    security(("id_token" = []))
)]
#[post("/users/me/planner", data = "<items>")]
#[tracing::instrument(skip(store, config, items))]
pub async fn planner_sync(
    items: Json<Vec<PlannerItem>>,
    auth: Result<IdentityToken, Problem>,
    store: &State<Store>,
    config: &State<Config>,
) -> Result<Json<SyncReceipt>, Problem> {
    let identity = signed_in(auth)?;
    let source = SubmittedPlanner(Mutex::new(Some(items.into_inner())));

    Ok(Json(
        store
            .sync_from_source(&identity, &source, config.planner_window_days)
            .await?,
    ))
}

/// Planner items the client fetched from the course API, cut down to the
/// requested window.
struct SubmittedPlanner(Mutex<Option<Vec<PlannerItem>>>);

#[rocket::async_trait]
impl PlannerSource for SubmittedPlanner {
    async fn planner_items(&self, window: PlannerWindow) -> Result<Vec<PlannerItem>, CoreError> {
        let items = self.0.lock().await.take().unwrap_or_default();
        Ok(items.into_iter().filter(|it| window.contains(it)).collect())
    }
}
