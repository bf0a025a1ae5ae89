use std::sync::Arc;

use rocket::http::Header;
use rocket::local::asynchronous::Client;

use crate::config::Config;
use crate::data::user::db::UserDirectoryExt;
use crate::identity::{Identity, Profile};
use crate::resp::identity::IdentityToken;
use crate::store::{DocumentStore, MemoryStore, Store};

pub(crate) fn id(uid: &str) -> Identity {
    Identity::new(uid).expect("test identities aren't blank")
}

pub(crate) async fn signed_up<S: DocumentStore + ?Sized>(
    store: &S,
    uid: &str,
    display_name: &str,
) -> Identity {
    let identity = id(uid);
    store
        .ensure_user(
            &identity,
            &Profile::new(format!("{}@uni.edu", uid), display_name),
        )
        .await
        .expect("unable to create test user");
    identity
}

pub(crate) const TEST_SECRET: &str = "test-secret";

/// Server over a fresh in-memory store. The store handle is returned for
/// seeding and inspecting state directly.
pub(crate) async fn test_client() -> (Client, Arc<MemoryStore>) {
    let memory = Arc::new(MemoryStore::new());
    let store: Store = memory.clone();
    let rocket = crate::build(Config::in_memory(TEST_SECRET), store).expect("invalid backend");
    let client = Client::tracked(rocket).await.expect("invalid backend");
    (client, memory)
}

pub(crate) fn id_token(uid: &str) -> String {
    IdentityToken::new(uid, &Profile::new(format!("{}@uni.edu", uid), uid))
        .encode_jwt(TEST_SECRET)
        .expect("unable to encode test identity token")
}

pub(crate) fn bearer(uid: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", id_token(uid)))
}
