//! Live friend-assignment views driven by changes to the user's own document.
//!
//! Every change starts a fresh aggregation. Aggregations may overlap and finish
//! out of order; each carries a generation number and only results newer than
//! the last delivered one reach the observer. Once a subscription is closed its
//! observer is never called again.

use std::sync::Arc;

use rocket::futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_futures::Instrument;
use uuid::Uuid;

use crate::data::assignment::aggregate::{
    AggregateOptions, AssignmentAggregatorExt, FriendAssignments,
};
use crate::data::store_failure;
use crate::error::CoreResult;
use crate::identity::Identity;
use crate::store::{Store, UserChanges};

pub type Observer = Box<dyn Fn(Vec<FriendAssignments>) + Send + Sync>;

struct Delivery {
    token: CancellationToken,
    /// Highest generation handed to the observer. Held while the observer
    /// runs so closing waits out an in-progress call.
    delivered: Mutex<u64>,
    observer: Observer,
}

impl Delivery {
    async fn deliver(&self, generation: u64, view: Vec<FriendAssignments>) -> bool {
        let mut delivered = self.delivered.lock().await;
        if self.token.is_cancelled() || generation <= *delivered {
            return false;
        }
        *delivered = generation;
        (self.observer)(view);
        true
    }

    async fn close(&self) {
        self.token.cancel();
        let _ = self.delivered.lock().await;
    }
}

/// Handle to a running subscription. Dropping it stops the subscription too,
/// but only [`Subscription::unsubscribe`] waits for an in-progress observer call.
pub struct Subscription {
    id: Uuid,
    delivery: Arc<Delivery>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_active(&self) -> bool {
        !self.delivery.token.is_cancelled() && !self.task.is_finished()
    }

    pub async fn unsubscribe(self) {
        self.delivery.close().await;
        tracing::debug!("subscription {} closed", self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.delivery.token.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Subscription:{}", self.id)
    }
}

#[derive(Clone)]
pub struct ChangeNotifier {
    store: Store,
    options: AggregateOptions,
}

impl ChangeNotifier {
    pub fn new(store: Store, options: AggregateOptions) -> ChangeNotifier {
        ChangeNotifier { store, options }
    }

    /// Delivers the user's friend assignments now and after every change to
    /// the user's document.
    pub async fn subscribe<F>(&self, identity: &Identity, observer: F) -> CoreResult<Subscription>
    where
        F: Fn(Vec<FriendAssignments>) + Send + Sync + 'static,
    {
        self.subscribe_with(identity, Box::new(observer), CancellationToken::new())
            .await
    }

    async fn subscribe_with(
        &self,
        identity: &Identity,
        observer: Observer,
        token: CancellationToken,
    ) -> CoreResult<Subscription> {
        let changes = self
            .store
            .watch_user(identity.as_str())
            .await
            .map_err(store_failure("subscribe"))?;

        let id = Uuid::new_v4();
        let delivery = Arc::new(Delivery {
            token,
            delivered: Mutex::new(0),
            observer,
        });

        let span = tracing::debug_span!("friend_assignments", subscription = %id, user = %identity);
        let task = tokio::spawn(
            watch(
                self.store.clone(),
                identity.clone(),
                self.options,
                changes,
                delivery.clone(),
            )
            .instrument(span),
        );

        tracing::debug!("subscription {} started for {}", id, identity);
        Ok(Subscription { id, delivery, task })
    }
}

async fn watch(
    store: Store,
    identity: Identity,
    options: AggregateOptions,
    mut changes: UserChanges,
    delivery: Arc<Delivery>,
) {
    let mut generation = 1;
    refresh(&store, &identity, options, &delivery, generation);

    loop {
        tokio::select! {
            _ = delivery.token.cancelled() => break,
            change = changes.next() => match change {
                Some(Ok(())) => {
                    generation += 1;
                    tracing::trace!("user document changed, refresh {}", generation);
                    refresh(&store, &identity, options, &delivery, generation);
                }
                Some(Err(e)) => tracing::warn!("change feed error: {}", e),
                None => {
                    tracing::debug!("change feed closed");
                    break;
                }
            }
        }
    }
}

fn refresh(
    store: &Store,
    identity: &Identity,
    options: AggregateOptions,
    delivery: &Arc<Delivery>,
    generation: u64,
) {
    let store = store.clone();
    let identity = identity.clone();
    let delivery = delivery.clone();

    tokio::spawn(
        async move {
            let view = tokio::select! {
                _ = delivery.token.cancelled() => return,
                view = store.friend_assignments_snapshot(&identity, options) => view,
            };

            // A missing or unreadable user document delivers nothing.
            if let Some(view) = view {
                if !delivery.deliver(generation, view).await {
                    tracing::trace!("dropped stale refresh {}", generation);
                }
            }
        }
        .in_current_span(),
    );
}

/// Everything watched on behalf of one signed-in user.
pub struct Session {
    identity: Identity,
    notifier: ChangeNotifier,
    root: CancellationToken,
    subscriptions: Vec<Subscription>,
}

impl Session {
    pub fn new(identity: Identity, notifier: ChangeNotifier) -> Session {
        Session {
            identity,
            notifier,
            root: CancellationToken::new(),
            subscriptions: vec![],
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.iter().filter(|it| it.is_active()).count()
    }

    pub async fn watch_friend_assignments<F>(&mut self, observer: F) -> CoreResult<Uuid>
    where
        F: Fn(Vec<FriendAssignments>) + Send + Sync + 'static,
    {
        let subscription = self
            .notifier
            .subscribe_with(&self.identity, Box::new(observer), self.root.child_token())
            .await?;
        let id = subscription.id();
        self.subscriptions.push(subscription);
        Ok(id)
    }

    pub async fn unsubscribe(&mut self, id: Uuid) -> bool {
        match self.subscriptions.iter().position(|it| it.id() == id) {
            Some(index) => {
                self.subscriptions.swap_remove(index).unsubscribe().await;
                true
            }
            None => false,
        }
    }

    /// Tears down every subscription together. No observer of this session
    /// runs after this returns.
    pub async fn sign_out(self) {
        self.root.cancel();
        for subscription in self.subscriptions {
            subscription.unsubscribe().await;
        }
        tracing::info!("{} signed out", self.identity);
    }
}
