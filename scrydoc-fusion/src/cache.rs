//! In-flight-or-completed load cache.
//!
//! Each name maps to one shared future; every requester of the name awaits
//! the same load, so a module or document is fetched and processed at most
//! once per package and a failure reaches every waiter.
//!
//! A load that awaits another load records the wait in a [`WaitGraph`].
//! Two loads awaiting each other would never finish, so a wait that
//! closes a loop is refused with [`FusionError::Cycle`] instead.

use crate::error::{FusionError, Result, SharedResult};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

pub type Loading<T> = Shared<BoxFuture<'static, SharedResult<Arc<T>>>>;

pub struct LoadCache<T> {
    /// What is being loaded, for log messages
    what: &'static str,
    entries: DashMap<String, Loading<T>>,
}

impl<T: Send + Sync + 'static> LoadCache<T> {
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            entries: DashMap::new(),
        }
    }

    /// The load of `name`, started with `start` if nobody asked before.
    pub fn load<F>(&self, name: &str, start: F) -> Loading<T>
    where
        F: FnOnce() -> BoxFuture<'static, Result<T>>,
    {
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let what = self.what;
                let shown = name.to_string();
                let loading = start()
                    .map(move |result| match result {
                        Ok(value) => Ok(Arc::new(value)),
                        Err(err) => {
                            tracing::error!(name = %shown, error = %err, "failed to load {}", what);
                            Err(Arc::new(err))
                        }
                    })
                    .boxed()
                    .shared();
                entry.insert(loading.clone());
                loading
            }
        }
    }

    /// The finished value of `name`, if its load succeeded already
    pub fn peek(&self, name: &str) -> Option<Arc<T>> {
        let loading = self.entries.get(name)?.clone();
        loading.peek().and_then(|result| result.as_ref().ok().cloned())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names requested so far, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Which in-flight loads are awaiting which, by name.
#[derive(Debug, Default)]
pub struct WaitGraph {
    /// waiter -> targets it is awaiting; a target appears once per wait
    edges: Mutex<HashMap<String, Vec<String>>>,
}

/// One recorded wait; dropping it removes the edge.
#[derive(Debug)]
pub struct WaitEdge<'a> {
    graph: &'a WaitGraph,
    waiter: String,
    target: String,
}

fn reaches(edges: &HashMap<String, Vec<String>>, from: &str, to: &str) -> bool {
    let mut seen = HashSet::new();
    let mut stack = vec![from];
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !seen.insert(current) {
            continue;
        }
        if let Some(next) = edges.get(current) {
            stack.extend(next.iter().map(String::as_str));
        }
    }
    false
}

impl WaitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `waiter` awaits `target`, unless `target` is already
    /// waiting on `waiter`, directly or through other loads.
    pub fn enter(&self, waiter: &str, target: &str) -> Option<WaitEdge<'_>> {
        let mut edges = self.edges.lock();
        if reaches(&edges, target, waiter) {
            return None;
        }
        edges
            .entry(waiter.to_string())
            .or_default()
            .push(target.to_string());
        Some(WaitEdge {
            graph: self,
            waiter: waiter.to_string(),
            target: target.to_string(),
        })
    }

    /// Run the load started by `start` as a wait of `waiter` on `target`.
    pub async fn wait<T, F, Fut>(&self, waiter: &str, target: &str, start: F) -> SharedResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SharedResult<T>>,
    {
        let Some(_edge) = self.enter(waiter, target) else {
            tracing::warn!(waiter = %waiter, target = %target, "refusing cyclic wait");
            return Err(Arc::new(FusionError::Cycle(target.to_string())));
        };
        start().await
    }

    /// Number of waits in flight
    pub fn len(&self) -> usize {
        self.edges.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for WaitEdge<'_> {
    fn drop(&mut self) {
        let mut edges = self.graph.edges.lock();
        if let Some(targets) = edges.get_mut(&self.waiter) {
            if let Some(idx) = targets.iter().position(|t| t == &self.target) {
                targets.swap_remove(idx);
            }
            if targets.is_empty() {
                edges.remove(&self.waiter);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_one_load_per_name() {
        let cache: LoadCache<String> = LoadCache::new("thing");
        let starts = Arc::new(AtomicUsize::new(0));

        let requests: Vec<_> = (0..4)
            .map(|_| {
                let starts = starts.clone();
                cache.load("a", move || {
                    async move {
                        starts.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok("loaded".to_string())
                    }
                    .boxed()
                })
            })
            .collect();
        let results = futures::future::join_all(requests).await;

        assert_eq!(starts.load(Ordering::SeqCst), 1);
        let first = results[0].as_ref().unwrap();
        assert!(results.iter().all(|r| Arc::ptr_eq(r.as_ref().unwrap(), first)));
        assert_eq!(cache.peek("a").as_deref().map(String::as_str), Some("loaded"));
        assert_eq!(cache.names(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_failures_are_shared() {
        let cache: LoadCache<String> = LoadCache::new("thing");
        let first = cache.load("bad", || async { Err(FusionError::NotFound("bad".into())) }.boxed());
        let second = cache.load("bad", || async { Ok("never".to_string()) }.boxed());

        let (a, b) = futures::join!(first, second);
        let (a, b) = (a.unwrap_err(), b.unwrap_err());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.peek("bad").is_none());
        assert!(cache.contains("bad"));
    }

    #[test]
    fn test_wait_graph_refuses_loops() {
        let graph = WaitGraph::new();
        assert!(graph.enter("a", "a").is_none());

        let ab = graph.enter("a", "b").unwrap();
        let bc = graph.enter("b", "c").unwrap();
        assert!(graph.enter("c", "a").is_none());
        assert!(graph.enter("c", "d").is_some());
        assert_eq!(graph.len(), 2);

        drop(bc);
        let ca = graph.enter("c", "a").unwrap();
        assert!(graph.enter("b", "c").is_none());
        drop(ab);
        drop(ca);
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_wait_reports_cycles() {
        let graph = WaitGraph::new();
        let _edge = graph.enter("ping", "pong").unwrap();

        let refused = graph
            .wait("pong", "ping", || async { Ok::<_, Arc<FusionError>>(1) })
            .await
            .unwrap_err();
        assert!(matches!(&*refused, FusionError::Cycle(name) if name == "ping"));

        let allowed = graph
            .wait("pong", "other", || async { Ok::<_, Arc<FusionError>>(2) })
            .await;
        assert_eq!(allowed.unwrap(), 2);
        assert_eq!(graph.len(), 1);
    }
}
