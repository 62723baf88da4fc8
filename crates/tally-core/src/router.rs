//! Envelope routing for the subscribe loop.
//!
//! The router owns the channel and channel-group registries. The poll loop
//! hands it each decoded envelope and it forwards every payload to the sink
//! of the subscription the server matched. It also turns registry state
//! changes into status events. Sends never block: a full or closed sink
//! drops the delivery.

use crate::metrics;
use crate::registry::SubscriptionRegistry;
use crate::sink::{Sink, SubscriptionSinks};
use bytes::Bytes;
use tally_protocol::{
    codec, ConnectionAction, ConnectionEvent, EntityKind, Envelope, MatchKind, ProtocolError,
};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Whether presence channels get connect/reconnect status events.
    pub presence_events: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            presence_events: true,
        }
    }
}

/// Outcome of routing one envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Payloads handed to a sink.
    pub delivered: usize,
    /// Payloads whose sink was full or closed.
    pub dropped: usize,
    /// Payloads for names that are not tracked.
    pub unmatched: usize,
}

/// Routes envelopes and status events to subscription sinks.
#[derive(Debug)]
pub struct Router {
    channels: SubscriptionRegistry,
    groups: SubscriptionRegistry,
    config: RouterConfig,
}

impl Router {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            channels: SubscriptionRegistry::new("channels"),
            groups: SubscriptionRegistry::new("groups"),
            config,
        }
    }

    /// Channel and wildcard subscriptions.
    #[must_use]
    pub fn channels(&self) -> &SubscriptionRegistry {
        &self.channels
    }

    /// Channel-group subscriptions.
    #[must_use]
    pub fn groups(&self) -> &SubscriptionRegistry {
        &self.groups
    }

    /// Track a channel or wildcard pattern. Returns `false` if already tracked.
    pub fn subscribe_channel(&self, name: &str, sinks: SubscriptionSinks) -> bool {
        self.channels.add_entity(name, EntityKind::for_channel_name(name), sinks)
    }

    /// Track a channel group. Returns `false` if already tracked.
    pub fn subscribe_group(&self, name: &str, sinks: SubscriptionSinks) -> bool {
        self.groups.add_entity(name, EntityKind::ChannelGroup, sinks)
    }

    /// Stop tracking a channel, reporting the removal on its success sink.
    pub fn unsubscribe_channel(&self, name: &str) -> bool {
        Self::unsubscribe(&self.channels, name)
    }

    /// Stop tracking a channel group, reporting the removal on its success sink.
    pub fn unsubscribe_group(&self, name: &str) -> bool {
        Self::unsubscribe(&self.groups, name)
    }

    fn unsubscribe(registry: &SubscriptionRegistry, name: &str) -> bool {
        match registry.take(name) {
            Some(item) => {
                let event =
                    ConnectionEvent::new(name, item.entity, ConnectionAction::Unsubscribed);
                deliver(&item.success, event.to_bytes());
                true
            }
            None => false,
        }
    }

    /// Decode raw envelope bytes and route the result.
    ///
    /// # Errors
    ///
    /// Returns the decode error; nothing is delivered in that case.
    pub fn route_bytes(&self, data: &[u8]) -> Result<RouteReport, ProtocolError> {
        let envelope = codec::decode(data).map_err(|e| {
            metrics::record_decode_error();
            warn!(error = %e, "Rejected envelope");
            e
        })?;
        Ok(self.route(&envelope))
    }

    /// Forward every message payload to the sink of the matched subscription.
    pub fn route(&self, envelope: &Envelope) -> RouteReport {
        let mut report = RouteReport::default();

        for msg in &envelope.messages {
            let (registry, name) = match msg.match_kind() {
                MatchKind::Channel => (&self.channels, msg.channel.as_str()),
                MatchKind::Wildcard(pattern) => (&self.channels, pattern),
                MatchKind::Group(group) => (&self.groups, group),
            };

            let Some(item) = registry.get(name) else {
                trace!(channel = %msg.channel, name, "No subscription for message");
                report.unmatched += 1;
                continue;
            };

            let payload = match serde_json::to_vec(&msg.payload) {
                Ok(data) => Bytes::from(data),
                Err(e) => {
                    warn!(channel = %msg.channel, error = %e, "Failed to serialize payload");
                    report.dropped += 1;
                    continue;
                }
            };

            if deliver(&item.success, payload) {
                report.delivered += 1;
            } else {
                report.dropped += 1;
            }
        }

        metrics::record_envelope(envelope.len());
        debug!(
            messages = envelope.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            unmatched = report.unmatched,
            "Routed envelope"
        );
        report
    }

    /// Report every subscription that became connected since the last reset.
    ///
    /// Returns the number of status events handed to sinks.
    pub fn announce_connected(&self, action: ConnectionAction) -> usize {
        let mut sent = 0;

        for name in self.channels.set_connected() {
            sent += self.announce(&self.channels, &name, action);
        }
        for name in self.groups.set_connected() {
            sent += self.announce(&self.groups, &name, action);
        }

        sent
    }

    fn announce(
        &self,
        registry: &SubscriptionRegistry,
        name: &str,
        action: ConnectionAction,
    ) -> usize {
        if !self.config.presence_events && tally_protocol::event::is_presence(name) {
            return 0;
        }
        // Removed between set_connected and here
        let Some(item) = registry.get(name) else {
            return 0;
        };

        let event = ConnectionEvent::new(name, item.entity, action);
        usize::from(deliver(&item.success, event.to_bytes()))
    }

    /// Start a new connect cycle on both registries.
    pub fn reset_connected(&self) {
        self.channels.reset_connected();
        self.groups.reset_connected();
    }

    /// Request that every subscription be dropped at the next [`apply_abort`](Self::apply_abort).
    pub fn abort(&self) {
        self.channels.abort();
        self.groups.abort();
    }

    /// Drop every subscription if an abort was requested.
    pub fn apply_abort(&self) -> bool {
        let channels = self.channels.apply_abort();
        let groups = self.groups.apply_abort();
        channels || groups
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

fn deliver(sink: &Sink, data: Bytes) -> bool {
    let delivered = match sink.try_send(data) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Sink full, dropping delivery");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Sink closed, dropping delivery");
            false
        }
    };
    metrics::record_delivery(delivered);
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::subscription_channels;
    use serde_json::json;
    use tally_protocol::{Message, Timetoken};

    fn envelope(messages: Vec<Message>) -> Envelope {
        Envelope {
            messages,
            timetoken: Timetoken::new("1", 1),
        }
    }

    #[test]
    fn test_route_by_match_kind() {
        let router = Router::new();
        let (room, mut room_rx) = subscription_channels(8);
        let (group, mut group_rx) = subscription_channels(8);
        let (news, mut news_rx) = subscription_channels(8);

        router.subscribe_channel("room1", room);
        router.subscribe_group("cg1", group);
        router.subscribe_channel("news.*", news);

        let report = router.route(&envelope(vec![
            Message::new("room1", "room1", json!("a")),
            Message::new("room2", "cg1", json!({"b": 1})),
            Message::new("news.sport", "news.*", json!("c")),
            Message::new("room9", "", json!("d")),
        ]));

        assert_eq!(
            report,
            RouteReport {
                delivered: 3,
                dropped: 0,
                unmatched: 1
            }
        );
        assert_eq!(room_rx.drain_success(), vec![Bytes::from_static(b"\"a\"")]);
        assert_eq!(group_rx.drain_success(), vec![Bytes::from_static(b"{\"b\":1}")]);
        assert_eq!(news_rx.drain_success(), vec![Bytes::from_static(b"\"c\"")]);
    }

    #[test]
    fn test_route_full_sink_drops() {
        let router = Router::new();
        let (room, mut room_rx) = subscription_channels(1);
        router.subscribe_channel("room1", room);

        let report = router.route(&envelope(vec![
            Message::new("room1", "room1", json!(1)),
            Message::new("room1", "room1", json!(2)),
        ]));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(room_rx.drain_success().len(), 1);
    }

    #[test]
    fn test_route_bytes_rejects_malformed() {
        let router = Router::new();
        assert!(router.route_bytes(b"{\"m\": 5}").is_err());

        let report = router
            .route_bytes(br#"{"t": {"t": "1", "r": 0}, "m": []}"#)
            .unwrap();
        assert_eq!(report, RouteReport::default());
    }

    #[test]
    fn test_announce_connected_once_per_cycle() {
        let router = Router::new();
        let (room, mut room_rx) = subscription_channels(8);
        let (group, mut group_rx) = subscription_channels(8);
        router.subscribe_channel("room1", room);
        router.subscribe_group("cg1", group);

        assert_eq!(router.announce_connected(ConnectionAction::Connected), 2);
        assert_eq!(router.announce_connected(ConnectionAction::Connected), 0);
        assert_eq!(
            room_rx.drain_success(),
            vec![Bytes::from_static(
                b"[1, \"subscribe channel 'room1' connected\", \"room1\"]"
            )]
        );
        assert_eq!(
            group_rx.drain_success(),
            vec![Bytes::from_static(
                b"[1, \"subscribe channel group 'cg1' connected\", \"cg1\"]"
            )]
        );

        router.reset_connected();
        assert_eq!(router.announce_connected(ConnectionAction::Reconnected), 2);
        assert_eq!(
            room_rx.drain_success(),
            vec![Bytes::from_static(
                b"[1, \"subscribe channel 'room1' reconnected\", \"room1\"]"
            )]
        );
    }

    #[test]
    fn test_presence_events_disabled() {
        let router = Router::with_config(RouterConfig {
            presence_events: false,
        });
        let (presence, mut presence_rx) = subscription_channels(8);
        router.subscribe_channel("room1-pnpres", presence);

        assert_eq!(router.announce_connected(ConnectionAction::Connected), 0);
        assert!(presence_rx.drain_success().is_empty());
        assert!(router.channels().has_connected());
    }

    #[test]
    fn test_unsubscribe_reports_event() {
        let router = Router::new();
        let (room, mut room_rx) = subscription_channels(8);
        let (group, mut group_rx) = subscription_channels(8);
        router.subscribe_channel("room1-pnpres", room);
        router.subscribe_group("cg1", group);

        assert!(router.unsubscribe_channel("room1-pnpres"));
        assert!(!router.unsubscribe_channel("room1-pnpres"));
        assert!(router.unsubscribe_group("cg1"));

        assert_eq!(
            room_rx.drain_success(),
            vec![Bytes::from_static(
                b"[1, \"presence channel 'room1' unsubscribed\", \"room1\"]"
            )]
        );
        assert_eq!(
            group_rx.drain_success(),
            vec![Bytes::from_static(
                b"[1, \"subscribe channel group 'cg1' unsubscribed\", \"cg1\"]"
            )]
        );
    }

    #[test]
    fn test_entity_kind_fixed_at_subscribe() {
        let router = Router::new();
        router.subscribe_channel("news.*", subscription_channels(1).0);
        router.subscribe_channel("room1", subscription_channels(1).0);
        router.subscribe_group("cg1", subscription_channels(1).0);

        assert_eq!(router.channels().get("news.*").unwrap().entity, EntityKind::Wildcard);
        assert_eq!(router.channels().get("room1").unwrap().entity, EntityKind::Channel);
        assert_eq!(router.groups().get("cg1").unwrap().entity, EntityKind::ChannelGroup);
    }

    #[test]
    fn test_group_status_uses_stored_kind() {
        let router = Router::new();
        let (group, mut group_rx) = subscription_channels(8);
        router.subscribe_group("cg1-pnpres", group);

        assert_eq!(router.announce_connected(ConnectionAction::Connected), 1);
        assert!(router.unsubscribe_group("cg1-pnpres"));
        assert_eq!(
            group_rx.drain_success(),
            vec![
                Bytes::from_static(b"[1, \"presence channel group 'cg1' connected\", \"cg1\"]"),
                Bytes::from_static(
                    b"[1, \"presence channel group 'cg1' unsubscribed\", \"cg1\"]"
                ),
            ]
        );
    }

    #[test]
    fn test_abort_clears_both_registries() {
        let router = Router::new();
        router.subscribe_channel("room1", subscription_channels(1).0);
        router.subscribe_group("cg1", subscription_channels(1).0);

        assert!(!router.apply_abort());
        router.abort();
        assert_eq!(router.channels().len(), 1);
        assert!(router.apply_abort());
        assert!(router.channels().is_empty());
        assert!(router.groups().is_empty());
    }
}
