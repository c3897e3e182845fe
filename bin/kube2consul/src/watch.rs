//! Endpoints watch loop feeding the reconciler
//!
//! A failed sync is retried after a delay until it succeeds or a newer event
//! for the same object supersedes it. Everything runs on one task, so events
//! and retries for an object are applied one at a time, in order.

use crate::metrics::SyncMetrics;
use futures::{Stream, StreamExt};
use k8s_openapi::api::core::v1::Endpoints;
use kube::Api;
use kube_runtime::watcher::Event;
use kube_runtime::{watcher, WatchStreamExt};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use sync_core::Reconciler;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Registry change requested for one object
#[derive(Clone, Debug)]
pub enum SyncAction {
    Apply(Endpoints),
    Delete(Endpoints),
}

impl SyncAction {
    fn from_event(event: Event<Endpoints>) -> Option<Self> {
        match event {
            Event::Apply(endpoints) | Event::InitApply(endpoints) => Some(SyncAction::Apply(endpoints)),
            Event::Delete(endpoints) => Some(SyncAction::Delete(endpoints)),
            Event::Init => {
                debug!("Endpoints watch (re)started");
                None
            }
            Event::InitDone => {
                info!("Initial Endpoints list synced");
                None
            }
        }
    }

    fn endpoints(&self) -> &Endpoints {
        match self {
            SyncAction::Apply(endpoints) | SyncAction::Delete(endpoints) => endpoints,
        }
    }

    fn key(&self) -> String {
        object_key(self.endpoints())
    }
}

/// Failed actions waiting for their retry deadline, one per object
#[derive(Default)]
pub struct RetryQueue {
    pending: HashMap<String, (Instant, SyncAction)>,
}

impl RetryQueue {
    /// Retry `action` at `at`, replacing any retry pending for its object
    pub fn schedule(&mut self, action: SyncAction, at: Instant) {
        self.pending.insert(action.key(), (at, action));
    }

    pub fn cancel(&mut self, key: &str) {
        self.pending.remove(key);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|(at, _)| *at).min()
    }

    /// Remove and return every action due at `now`, oldest deadline first
    pub fn take_due(&mut self, now: Instant) -> Vec<SyncAction> {
        let mut due: Vec<(Instant, String)> = self
            .pending
            .iter()
            .filter(|(_, (at, _))| *at <= now)
            .map(|(key, (at, _))| (*at, key.clone()))
            .collect();
        due.sort();

        due.into_iter()
            .filter_map(|(_, key)| self.pending.remove(&key).map(|(_, action)| action))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// EventHandler applies watch events to the registry
pub struct EventHandler {
    reconciler: Reconciler,
    metrics: Arc<SyncMetrics>,
}

impl EventHandler {
    pub fn new(reconciler: Reconciler, metrics: Arc<SyncMetrics>) -> Self {
        Self { reconciler, metrics }
    }

    /// Apply `event`, returning the action to retry if it failed
    pub async fn handle(&self, event: Event<Endpoints>) -> Option<SyncAction> {
        let action = SyncAction::from_event(event)?;
        if self.perform(&action).await {
            None
        } else {
            Some(action)
        }
    }

    /// Run `action` against the registry, returning whether it succeeded
    pub async fn perform(&self, action: &SyncAction) -> bool {
        match action {
            SyncAction::Apply(endpoints) => match self.reconciler.reconcile(endpoints).await {
                Ok(summary) => {
                    self.metrics.record_success(summary.registered, summary.removed);
                    true
                }
                Err(e) => {
                    self.metrics.record_failure();
                    error!("Failed to sync {}: {}", object_key(endpoints), e);
                    false
                }
            },
            SyncAction::Delete(endpoints) => match self.reconciler.remove(endpoints).await {
                Ok(removed) => {
                    self.metrics.record_success(0, removed);
                    true
                }
                Err(e) => {
                    self.metrics.record_failure();
                    error!("Failed to remove {}: {}", object_key(endpoints), e);
                    false
                }
            },
        }
    }
}

/// Watch `api` and apply every event in order, retrying failures
pub async fn run(
    api: Api<Endpoints>,
    handler: Arc<EventHandler>,
    retry_delay: Duration,
) -> anyhow::Result<()> {
    info!("Starting Endpoints watch");

    let stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();
    drive(stream, &handler, retry_delay).await;

    Ok(())
}

/// Apply events from `stream` and retry failed actions after `retry_delay`
pub async fn drive<S, E>(mut stream: S, handler: &EventHandler, retry_delay: Duration)
where
    S: Stream<Item = Result<Event<Endpoints>, E>> + Unpin,
    E: Display,
{
    let mut retries = RetryQueue::default();

    loop {
        let deadline = retries.next_deadline();
        // placeholder deadline, the branch is disabled when nothing is pending
        let wake = sleep_until(deadline.unwrap_or_else(|| Instant::now() + retry_delay));

        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(event)) => {
                    let Some(action) = SyncAction::from_event(event) else {
                        continue;
                    };
                    retries.cancel(&action.key());
                    if !handler.perform(&action).await {
                        retries.schedule(action, Instant::now() + retry_delay);
                    }
                }
                Some(Err(e)) => {
                    handler.metrics.watch_errors_total.inc();
                    warn!("Endpoints watch error: {}", e);
                }
                None => break,
            },
            _ = wake, if deadline.is_some() => {
                for action in retries.take_due(Instant::now()) {
                    debug!("Retrying sync of {}", action.key());
                    if !handler.perform(&action).await {
                        retries.schedule(action, Instant::now() + retry_delay);
                    }
                }
            }
        }
    }

    if !retries.is_empty() {
        warn!("Endpoints watch ended with {} syncs pending retry", retries.len());
    }
}

fn object_key(endpoints: &Endpoints) -> String {
    format!(
        "{}/{}",
        endpoints.metadata.namespace.as_deref().unwrap_or("default"),
        endpoints.metadata.name.as_deref().unwrap_or("unknown")
    )
}
