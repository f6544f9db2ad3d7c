//! Request coalescing: at most one in-flight job per key.

use crate::Error;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::oneshot;

pub type SharedOutcome<T> = Shared<BoxFuture<'static, std::result::Result<T, Arc<Error>>>>;

/// Result of [`InflightRequests::claim`].
pub enum Claim<T: Clone> {
    /// The caller must produce the outcome through [`LeaderSlot::complete`].
    Leader(LeaderSlot<T>, SharedOutcome<T>),
    /// Another caller is already producing it.
    Follower(SharedOutcome<T>),
}

/// Map from key to the shared outcome of the job currently producing it.
pub struct InflightRequests<T: Clone> {
    jobs: DashMap<String, SharedOutcome<T>>,
}

impl<T> InflightRequests<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Join the in-flight job for `key`, or become its leader.
    pub fn claim(self: &Arc<Self>, key: &str) -> Claim<T> {
        match self.jobs.entry(key.to_string()) {
            Entry::Occupied(occupied) => Claim::Follower(occupied.get().clone()),
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel::<std::result::Result<T, Arc<Error>>>();
                let shared = rx
                    .map(|received| {
                        received.unwrap_or_else(|_| {
                            Err(Arc::new(Error::runtime("in-flight job ended without a result")))
                        })
                    })
                    .boxed()
                    .shared();
                vacant.insert(shared.clone());
                Claim::Leader(
                    LeaderSlot {
                        key: key.to_string(),
                        tx: Some(tx),
                        owner: Arc::clone(self),
                    },
                    shared,
                )
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.jobs.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl<T> Default for InflightRequests<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Leadership of one key. Dropping it, completed or not, releases the key; an
/// uncompleted drop resolves followers with an error.
pub struct LeaderSlot<T: Clone> {
    key: String,
    tx: Option<oneshot::Sender<std::result::Result<T, Arc<Error>>>>,
    owner: Arc<InflightRequests<T>>,
}

impl<T: Clone> LeaderSlot<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn complete(mut self, outcome: std::result::Result<T, Arc<Error>>) {
        if let Some(tx) = self.tx.take() {
            // Every receiver may already be gone; the outcome is then unobserved.
            let _ = tx.send(outcome);
        }
    }
}

impl<T: Clone> Drop for LeaderSlot<T> {
    fn drop(&mut self) {
        self.owner.jobs.remove(&self.key);
    }
}
