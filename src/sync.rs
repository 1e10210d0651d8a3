//! Keeps the registry in step with the container runtime.
//!
//! [`Synchronizer::bootstrap`] loads everything that is already running.
//! [`Synchronizer::run`] then follows the runtime's event stream until its
//! cancellation token fires, applying one event at a time in delivery order.
//!
//! A [`Subscription`] is always opened before the listing it complements, so
//! a start or stop that lands between the two is buffered and replayed
//! afterwards instead of being lost. Replays are harmless: a start replaces
//! and a stop deletes. When the stream breaks the synchronizer resubscribes
//! and rebuilds the registry from a fresh listing, retrying until the
//! listing succeeds, so containers that stopped while we were disconnected
//! are not served.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::RuntimeError;
use crate::mapper::NamingPolicy;
use crate::registry::Registry;
use crate::runtime::ContainerRuntime;
use crate::types::{AddressSet, LifecycleEvent};

/// A live event subscription whose items are buffered until consumed.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Result<LifecycleEvent, RuntimeError>>,
    forwarder: JoinHandle<()>,
}

impl Subscription {
    /// Next buffered item, or `None` once the runtime stream has ended.
    async fn next(&mut self) -> Option<Result<LifecycleEvent, RuntimeError>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

pub struct Synchronizer {
    runtime: Arc<dyn ContainerRuntime>,
    registry: Registry,
    policy: NamingPolicy,
    reconnect_delay: Duration,
}

impl Synchronizer {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        registry: Registry,
        policy: NamingPolicy,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            runtime,
            registry,
            policy,
            reconnect_delay,
        }
    }

    /// Opens the runtime event stream and starts buffering it.
    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Arc::clone(&self.runtime);
        let forwarder = tokio::spawn(async move {
            let mut stream = runtime.events();
            while let Some(item) = stream.next().await {
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
            }
        });
        // Let the forwarder issue the subscription before the caller lists.
        tokio::task::yield_now().await;
        info!("Subscribed to container events");
        Subscription { rx, forwarder }
    }

    /// Registers every running container. Returns how many were registered.
    pub async fn bootstrap(&self) -> anyhow::Result<usize> {
        let containers = self
            .runtime
            .list_running()
            .await
            .context("Error listing running containers")?;

        let mut registered = 0;
        for container in &containers {
            if let Some(reg) = self.policy.registration(container) {
                self.registry.upsert(&reg.hostnames, &reg.addresses).await;
                registered += 1;
            }
        }
        info!(
            "Initial scan found {} containers, registered {} ({} hostnames)",
            containers.len(),
            registered,
            self.registry.len().await
        );
        if self.registry.is_empty().await {
            info!("No containers published yet");
        }
        self.dump().await;
        Ok(registered)
    }

    /// Rebuilds the registry from scratch in a single swap.
    async fn resync(&self) -> anyhow::Result<()> {
        let containers = self
            .runtime
            .list_running()
            .await
            .context("Error listing running containers")?;

        let mut records: HashMap<String, AddressSet> = HashMap::new();
        for reg in containers.iter().filter_map(|c| self.policy.registration(c)) {
            for hostname in reg.hostnames {
                records.insert(hostname, reg.addresses.clone());
            }
        }
        info!("Resynchronized {} hostnames", records.len());
        self.registry.replace_all(records).await;
        self.dump().await;
        Ok(())
    }

    /// Waits, resubscribes and resyncs until a resync succeeds.
    /// Returns `None` if `shutdown` fires first.
    async fn reconnect(&self, shutdown: &CancellationToken) -> Option<Subscription> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = sleep(self.reconnect_delay) => {}
            }

            let events = self.subscribe().await;
            match self.resync().await {
                Ok(()) => return Some(events),
                Err(e) => error!("Resync failed: {:#}. Retrying in {:?}", e, self.reconnect_delay),
            }
        }
    }

    /// Follows `events` until `shutdown` is cancelled, reconnecting as needed.
    ///
    /// `events` must have been opened with [`Synchronizer::subscribe`] before
    /// the registry was bootstrapped.
    pub async fn run(&self, mut events: Subscription, shutdown: CancellationToken) {
        loop {
            loop {
                let next = tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Synchronizer shutting down");
                        return;
                    }
                    next = events.next() => next,
                };

                match next {
                    Some(Ok(event)) => self.apply(&event).await,
                    Some(Err(e)) => {
                        error!("Error in container event stream: {}", e);
                        break;
                    }
                    None => {
                        warn!("Container event stream ended");
                        break;
                    }
                }
            }

            events = match self.reconnect(&shutdown).await {
                Some(events) => events,
                None => {
                    info!("Synchronizer shutting down");
                    return;
                }
            };
        }
    }

    /// Applies a single lifecycle event to the registry.
    pub async fn apply(&self, event: &LifecycleEvent) {
        if event.kind != "container" {
            return;
        }

        match event.action.as_str() {
            "start" => self.on_start(event).await,
            "die" | "stop" | "kill" => self.on_stop(event).await,
            _ => {}
        }
    }

    async fn on_start(&self, event: &LifecycleEvent) {
        let target = match event.container_id.as_ref().or(event.container_name.as_ref()) {
            Some(t) => t,
            None => {
                warn!("Ignoring start event without container id or name");
                return;
            }
        };

        let container = match self.runtime.inspect(target).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to inspect started container {}: {}", target, e);
                return;
            }
        };

        match self.policy.registration(&container) {
            Some(reg) => {
                info!(
                    "Container started: {} {:?} -> {:?}",
                    container.id, reg.hostnames, reg.addresses
                );
                self.registry.upsert(&reg.hostnames, &reg.addresses).await;
                self.dump().await;
            }
            None => debug!("Container {} started but is not published", container.id),
        }
    }

    async fn on_stop(&self, event: &LifecycleEvent) {
        let name = match &event.container_name {
            Some(n) => n,
            None => {
                warn!(
                    "Ignoring {} event without container name (id {:?})",
                    event.action, event.container_id
                );
                return;
            }
        };

        let hostnames = self.policy.hostnames(name);
        if hostnames.is_empty() {
            return;
        }
        info!("Container {}: {} -> removing {:?}", event.action, name, hostnames);
        self.registry.delete(&hostnames).await;
        self.dump().await;
    }

    async fn dump(&self) {
        if log::log_enabled!(log::Level::Debug) {
            let snapshot = self.registry.snapshot().await;
            match serde_json::to_string(&snapshot) {
                Ok(json) => debug!("Registry: {}", json),
                Err(e) => debug!("Failed to serialize registry: {}", e),
            }
        }
    }
}
