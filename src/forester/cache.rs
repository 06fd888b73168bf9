use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use super::client::Forester;
use crate::model::entry::Forest;
use crate::notice::Reporter;

type Pending = watch::Receiver<Option<Arc<Forest>>>;

/// Latest forest snapshot in front of `forester query all`.
///
/// Stale snapshots are served immediately while a refresh runs in the
/// background. At most one query is in flight; everyone who needs a fresh
/// result waits on that one.
#[derive(Clone)]
pub struct ForestCache {
    inner: Arc<Inner>,
}

struct Inner {
    forester: Forester,
    reporter: Arc<dyn Reporter>,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    snapshot: Option<Arc<Forest>>,
    stale: bool,
    generation: u64,
    in_flight: Option<Pending>,
}

impl ForestCache {
    pub fn new(forester: Forester, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                forester,
                reporter,
                state: Mutex::new(State::default()),
            }),
        }
    }

    pub fn forester(&self) -> &Forester {
        &self.inner.forester
    }

    /// The current forest. Only waits when there is nothing to serve yet.
    pub async fn get(&self) -> Arc<Forest> {
        let pending = {
            let mut state = self.inner.lock();
            match state.snapshot.clone() {
                Some(snapshot) if !state.stale => return snapshot,
                Some(snapshot) => {
                    self.inner.start_refresh(&mut state);
                    return snapshot;
                }
                None => self.inner.start_refresh(&mut state),
            }
        };
        wait(pending).await
    }

    /// Query now (or join the query already running) and wait for it.
    pub async fn refresh(&self) -> Arc<Forest> {
        let pending = {
            let mut state = self.inner.lock();
            state.stale = true;
            self.inner.start_refresh(&mut state)
        };
        wait(pending).await
    }

    /// Mark the snapshot stale. The next `get` still serves it, but kicks
    /// off a refresh.
    pub fn invalidate(&self) {
        let mut state = self.inner.lock();
        state.stale = true;
        state.generation += 1;
        tracing::debug!("forest invalidated (generation {})", state.generation);
    }

    /// The snapshot as it is, without triggering anything.
    pub fn snapshot(&self) -> Option<Arc<Forest>> {
        self.inner.lock().snapshot.clone()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_refresh(self: &Arc<Self>, state: &mut State) -> Pending {
        if let Some(pending) = &state.in_flight {
            return pending.clone();
        }

        let (tx, rx) = watch::channel(None);
        state.in_flight = Some(rx.clone());

        let generation = state.generation;
        let mut guard = FetchGuard {
            inner: Arc::clone(self),
            done: false,
        };
        tokio::spawn(async move {
            let forest = guard.inner.fetch(generation).await;
            guard.done = true;
            tx.send_replace(Some(forest));
        });

        rx
    }

    async fn fetch(&self, generation: u64) -> Arc<Forest> {
        let outcome = self.forester.query_all().await;

        let mut state = self.lock();
        state.in_flight = None;

        match outcome {
            Ok(forest) => {
                tracing::info!("forest refreshed: {} trees", forest.len());
                let forest = Arc::new(forest);
                state.snapshot = Some(forest.clone());
                // An invalidation that arrived mid-query leaves it stale.
                state.stale = state.generation != generation;
                forest
            }
            Err(err) => {
                self.reporter.report(err.to_notice());
                state.stale = true;
                state.snapshot.get_or_insert_with(Arc::default).clone()
            }
        }
    }
}

/// Clears `in_flight` when a fetch task dies before publishing, so the
/// next caller starts a fresh query instead of joining a dead one.
struct FetchGuard {
    inner: Arc<Inner>,
    done: bool,
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if !self.done {
            tracing::warn!("forest refresh aborted");
            self.inner.lock().in_flight = None;
        }
    }
}

async fn wait(mut pending: Pending) -> Arc<Forest> {
    match pending.wait_for(Option::is_some).await {
        Ok(forest) => (*forest).clone().unwrap_or_default(),
        Err(_) => {
            tracing::warn!("forest refresh ended without a result");
            Arc::default()
        }
    }
}
