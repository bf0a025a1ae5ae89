use std::time::Duration;

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, Database};
use rocket::futures::StreamExt;

use super::{DocumentStore, StoreError, UserChanges};
use crate::data::assignment::Assignment;
use crate::data::group::{GroupCode, GroupDocument, GROUP_COLLECTION_NAME};
use crate::data::user::{UserDocument, USER_COLLECTION_NAME};

const DUPLICATE_KEY: i32 = 11000;

mod filter {
    use bson::{doc, Document};

    #[inline]
    pub fn by_id(id: impl AsRef<str>) -> Document {
        doc! { "_id": id.as_ref() }
    }

    #[inline]
    pub fn changes_to(id: impl AsRef<str>) -> Document {
        doc! { "$match": { "documentKey._id": id.as_ref() } }
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        e.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

/// MongoDB backed store. Users are keyed by identity and groups by code, both
/// in `_id`.
///
/// Watching users relies on change streams, which need a replica set.
#[derive(Debug, Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> MongoStore {
        MongoStore { db }
    }

    pub async fn connect(
        uri: impl AsRef<str>,
        db_name: impl AsRef<str>,
        timeout: Duration,
    ) -> Result<MongoStore, mongodb::error::Error> {
        let mut options = ClientOptions::parse(uri.as_ref()).await?;
        options.app_name = Some("studygroup-backend".to_string());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(options)?;
        Ok(MongoStore::new(client.database(db_name.as_ref())))
    }

    pub async fn ping(&self) -> Result<(), mongodb::error::Error> {
        self.db.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }

    fn users(&self) -> Collection<UserDocument> {
        self.db.collection(USER_COLLECTION_NAME)
    }

    fn user_documents(&self) -> Collection<Document> {
        self.db.collection(USER_COLLECTION_NAME)
    }

    fn groups(&self) -> Collection<GroupDocument> {
        self.db.collection(GROUP_COLLECTION_NAME)
    }

    fn group_documents(&self) -> Collection<Document> {
        self.db.collection(GROUP_COLLECTION_NAME)
    }

    async fn update_user(&self, uid: &str, update: Document) -> Result<(), StoreError> {
        let result = self
            .user_documents()
            .update_one(filter::by_id(uid), update, None)
            .await?;

        if result.matched_count == 0 {
            return Err(StoreError::Missing(format!("user {}", uid)));
        }
        Ok(())
    }

    async fn update_group(&self, code: &GroupCode, update: Document) -> Result<(), StoreError> {
        let result = self
            .group_documents()
            .update_one(filter::by_id(code), update, None)
            .await?;

        if result.matched_count == 0 {
            return Err(StoreError::Missing(format!("group {}", code)));
        }
        Ok(())
    }
}

#[rocket::async_trait]
impl DocumentStore for MongoStore {
    async fn load_user(&self, uid: &str) -> Result<Option<UserDocument>, StoreError> {
        tracing::trace!("loading user {}", uid);
        Ok(self.users().find_one(filter::by_id(uid), None).await?)
    }

    async fn insert_user(&self, user: &UserDocument) -> Result<bool, StoreError> {
        let mut document = bson::to_document(user)?;
        document.insert("_id", user.uid.as_str());

        match self.user_documents().insert_one(document, None).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn replace_user_assignments(
        &self,
        uid: &str,
        assignments: &[Assignment],
        synced_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let assignments = bson::to_bson(assignments)?;
        let synced_at = bson::to_bson(&synced_at)?;

        self.update_user(
            uid,
            doc! { "$set": { "assignments": assignments, "lastSync": synced_at } },
        )
        .await
    }

    async fn push_user_group(&self, uid: &str, code: &GroupCode) -> Result<(), StoreError> {
        self.update_user(uid, doc! { "$addToSet": { "groups": code.as_str() } })
            .await
    }

    async fn pull_user_group(&self, uid: &str, code: &GroupCode) -> Result<(), StoreError> {
        self.update_user(uid, doc! { "$pull": { "groups": code.as_str() } })
            .await
    }

    async fn load_group(&self, code: &GroupCode) -> Result<Option<GroupDocument>, StoreError> {
        tracing::trace!("loading group {}", code);
        Ok(self.groups().find_one(filter::by_id(code), None).await?)
    }

    async fn insert_group(&self, group: &GroupDocument) -> Result<(), StoreError> {
        let mut document = bson::to_document(group)?;
        document.insert("_id", group.code.as_str());

        match self.group_documents().insert_one(document, None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                Err(StoreError::Conflict(format!("group {}", group.code)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn push_group_member(&self, code: &GroupCode, uid: &str) -> Result<(), StoreError> {
        self.update_group(code, doc! { "$addToSet": { "members": uid } })
            .await
    }

    async fn pull_group_member(&self, code: &GroupCode, uid: &str) -> Result<(), StoreError> {
        self.update_group(code, doc! { "$pull": { "members": uid } })
            .await
    }

    async fn watch_user(&self, uid: &str) -> Result<UserChanges, StoreError> {
        let stream = self
            .user_documents()
            .watch(vec![filter::changes_to(uid)], None)
            .await?;

        Ok(stream
            .map(|event| event.map(|_| ()).map_err(StoreError::from))
            .boxed())
    }
}
