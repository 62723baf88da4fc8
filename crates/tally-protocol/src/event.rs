//! Connection status events.
//!
//! When a subscription changes state the client reports it to the caller's
//! success sink as a short status line:
//!
//! ```text
//! [1, "subscribe channel 'room1' connected", "room1"]
//! [1, "presence channel group 'cg1' unsubscribed", "cg1"]
//! ```

use bytes::Bytes;
use std::fmt;

use crate::envelope::{MatchKind, WILDCARD_MARKER};

/// Suffix that turns a channel name into its presence channel.
pub const PRESENCE_SUFFIX: &str = "-pnpres";

/// Check if a name refers to a presence channel.
#[must_use]
pub fn is_presence(name: &str) -> bool {
    name.contains(PRESENCE_SUFFIX)
}

/// Strip every presence suffix from a name.
#[must_use]
pub fn strip_presence(name: &str) -> String {
    name.replace(PRESENCE_SUFFIX, "")
}

/// State transition being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionAction {
    /// Subscription became active.
    Connected,
    /// Subscription was removed.
    Unsubscribed,
    /// Subscription became active again after a reconnect.
    Reconnected,
}

impl ConnectionAction {
    /// Verb for the transition.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionAction::Connected => "connect",
            ConnectionAction::Unsubscribed => "unsubscribe",
            ConnectionAction::Reconnected => "reconnect",
        }
    }

    /// Past-tense form used in the status line.
    #[must_use]
    pub fn past_tense(&self) -> &'static str {
        match self {
            ConnectionAction::Connected => "connected",
            ConnectionAction::Unsubscribed => "unsubscribed",
            ConnectionAction::Reconnected => "reconnected",
        }
    }
}

impl fmt::Display for ConnectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of subscription an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Plain channel.
    Channel,
    /// Channel group.
    ChannelGroup,
    /// Wildcard channel pattern.
    Wildcard,
}

impl EntityKind {
    /// Kind of a name subscribed through the channel list.
    #[must_use]
    pub fn for_channel_name(name: &str) -> Self {
        if name.contains(WILDCARD_MARKER) {
            EntityKind::Wildcard
        } else {
            EntityKind::Channel
        }
    }
}

impl From<MatchKind<'_>> for EntityKind {
    fn from(kind: MatchKind<'_>) -> Self {
        match kind {
            MatchKind::Channel => EntityKind::Channel,
            MatchKind::Wildcard(_) => EntityKind::Wildcard,
            MatchKind::Group(_) => EntityKind::ChannelGroup,
        }
    }
}

/// A status transition for one subscription, rendered once and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEvent {
    name: String,
    kind: EntityKind,
    action: ConnectionAction,
}

impl ConnectionEvent {
    /// Create an event for a subscription of any kind.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EntityKind, action: ConnectionAction) -> Self {
        Self {
            name: name.into(),
            kind,
            action,
        }
    }

    /// Create an event for a channel.
    #[must_use]
    pub fn for_channel(channel: impl Into<String>, action: ConnectionAction) -> Self {
        Self::new(channel, EntityKind::Channel, action)
    }

    /// Create an event for a channel group.
    #[must_use]
    pub fn for_channel_group(group: impl Into<String>, action: ConnectionAction) -> Self {
        Self::new(group, EntityKind::ChannelGroup, action)
    }

    /// Target name as given, including any presence suffix.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Reported transition.
    #[must_use]
    pub fn action(&self) -> ConnectionAction {
        self.action
    }

    /// Render the status line for delivery to a success sink.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = if is_presence(&self.name) {
            "presence"
        } else {
            "subscribe"
        };
        let name = strip_presence(&self.name);
        let entity = match self.kind {
            EntityKind::Channel | EntityKind::Wildcard => "channel",
            EntityKind::ChannelGroup => "channel group",
        };

        write!(
            f,
            "[1, \"{} {} '{}' {}\", \"{}\"]",
            source,
            entity,
            name,
            self.action.past_tense(),
            name
        )
    }
}
