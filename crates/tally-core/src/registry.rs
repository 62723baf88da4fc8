//! Subscription registry.
//!
//! Tracks every subscribed name (channels in one registry, channel groups in
//! another) together with its delivery sinks and connected flag. The whole
//! item set sits behind a single reader/writer lock: queries share it,
//! mutations take it exclusively. Log lines are captured under the lock and
//! emitted after it is released.

use crate::metrics;
use crate::sink::{Sink, SubscriptionSinks};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tally_protocol::EntityKind;
use tracing::{debug, info, info_span, Span};

/// Snapshot of one registry entry.
#[derive(Debug, Clone)]
pub struct SubscriptionItem {
    /// Channel or group name.
    pub name: String,
    /// Receives payloads and status events.
    pub success: Sink,
    /// Receives error notifications.
    pub error: Sink,
    /// What the name refers to, fixed when the subscription is added.
    pub entity: EntityKind,
    /// Whether the subscription has been reported as connected in this cycle.
    pub connected: bool,
}

impl SubscriptionItem {
    /// Mark as connected. Returns `true` if the flag changed.
    fn set_connected(&mut self) -> bool {
        if self.connected {
            return false;
        }
        self.connected = true;
        true
    }
}

#[derive(Debug, Default)]
struct Inner {
    items: HashMap<String, SubscriptionItem>,
    aborted: bool,
}

/// Concurrency-safe set of subscriptions keyed by name.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    inner: RwLock<Inner>,
    kind: &'static str,
    span: Span,
}

impl SubscriptionRegistry {
    /// Create an empty registry. `kind` labels its log lines and metrics.
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self::with_span(kind, info_span!("subscriptions", kind))
    }

    /// Create an empty registry logging under the given span.
    #[must_use]
    pub fn with_span(kind: &'static str, span: Span) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            kind,
            span,
        }
    }

    /// Registry label.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Add an unconnected channel subscription.
    ///
    /// Does nothing if `name` is already tracked: the existing sinks and
    /// connected flag win. Returns `true` if the item was inserted.
    pub fn add(&self, name: &str, sinks: SubscriptionSinks) -> bool {
        self.insert(name, EntityKind::Channel, false, sinks)
    }

    /// Add a channel subscription that is already connected.
    ///
    /// Same duplicate handling as [`add`](Self::add).
    pub fn add_connected(&self, name: &str, sinks: SubscriptionSinks) -> bool {
        self.insert(name, EntityKind::Channel, true, sinks)
    }

    /// Add an unconnected subscription of the given kind.
    ///
    /// Same duplicate handling as [`add`](Self::add); the first kind wins too.
    pub fn add_entity(&self, name: &str, entity: EntityKind, sinks: SubscriptionSinks) -> bool {
        self.insert(name, entity, false, sinks)
    }

    fn insert(
        &self,
        name: &str,
        entity: EntityKind,
        connected: bool,
        sinks: SubscriptionSinks,
    ) -> bool {
        let added = {
            let mut inner = self.inner.write();
            let added = match inner.items.entry(name.to_string()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(slot) => {
                    slot.insert(SubscriptionItem {
                        name: name.to_string(),
                        success: sinks.success,
                        error: sinks.error,
                        entity,
                        connected,
                    });
                    true
                }
            };
            // Gauge is set under the lock so updates land in mutation order
            metrics::set_active_subscriptions(self.kind, inner.items.len());
            added
        };

        self.span.in_scope(|| {
            if added {
                debug!(name, ?entity, connected, "Added item");
            } else {
                debug!(name, "Item not added, already exists");
            }
        });
        added
    }

    /// Remove a subscription. Returns whether it was present.
    pub fn remove(&self, name: &str) -> bool {
        self.take(name).is_some()
    }

    /// Remove a subscription and return its last state.
    pub fn take(&self, name: &str) -> Option<SubscriptionItem> {
        let item = {
            let mut inner = self.inner.write();
            let item = inner.items.remove(name);
            metrics::set_active_subscriptions(self.kind, inner.items.len());
            item
        };

        self.span
            .in_scope(|| debug!(name, existed = item.is_some(), "Removed item"));
        item
    }

    /// Number of tracked subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().items.len()
    }

    /// Whether `name` is tracked.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.inner.read().items.contains_key(name)
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().items.is_empty()
    }

    /// Snapshot of one subscription.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<SubscriptionItem> {
        self.inner.read().items.get(name).cloned()
    }

    /// All tracked names, in no particular order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.inner.read().items.keys().cloned().collect()
    }

    /// All tracked names joined with commas.
    #[must_use]
    pub fn names_string(&self) -> String {
        self.names().join(",")
    }

    /// Whether any subscription is connected.
    #[must_use]
    pub fn has_connected(&self) -> bool {
        self.inner.read().items.values().any(|item| item.connected)
    }

    /// Names of connected subscriptions, in no particular order.
    #[must_use]
    pub fn connected_names(&self) -> Vec<String> {
        self.inner
            .read()
            .items
            .values()
            .filter(|item| item.connected)
            .map(|item| item.name.clone())
            .collect()
    }

    /// Connected names joined with commas.
    #[must_use]
    pub fn connected_names_string(&self) -> String {
        self.connected_names().join(",")
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        let removed = {
            let mut inner = self.inner.write();
            let removed = std::mem::take(&mut inner.items).len();
            metrics::set_active_subscriptions(self.kind, 0);
            removed
        };

        self.span.in_scope(|| debug!(removed, "Cleared items"));
    }

    /// Request that every subscription be dropped at the next
    /// [`apply_abort`](Self::apply_abort). Removes nothing by itself.
    pub fn abort(&self) {
        self.inner.write().aborted = true;
        self.span.in_scope(|| info!("Aborting"));
    }

    /// Whether an abort has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.inner.read().aborted
    }

    /// Clear the registry if an abort has been requested.
    ///
    /// The marker stays set, so later calls keep clearing. Returns whether
    /// the marker was set.
    pub fn apply_abort(&self) -> bool {
        let (aborted, removed) = {
            let mut inner = self.inner.write();
            if inner.aborted {
                let removed = std::mem::take(&mut inner.items).len();
                metrics::set_active_subscriptions(self.kind, 0);
                (true, removed)
            } else {
                (false, 0)
            }
        };

        if aborted {
            self.span.in_scope(|| info!(removed, "Applied abort"));
        }
        aborted
    }

    /// Mark every subscription as unconnected, starting a new connect cycle.
    pub fn reset_connected(&self) {
        {
            let mut inner = self.inner.write();
            for item in inner.items.values_mut() {
                item.connected = false;
            }
        }

        self.span.in_scope(|| debug!("Reset connected flags"));
    }

    /// Mark every unconnected subscription as connected.
    ///
    /// Returns the names that changed, so each name is reported at most once
    /// per connect cycle.
    pub fn set_connected(&self) -> Vec<String> {
        let changed: Vec<String> = {
            let mut inner = self.inner.write();
            inner
                .items
                .values_mut()
                .filter_map(|item| item.set_connected().then(|| item.name.clone()))
                .collect()
        };

        if !changed.is_empty() {
            self.span
                .in_scope(|| debug!(names = %changed.join(","), "Set items as connected"));
        }
        changed
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new("subscriptions")
    }
}
