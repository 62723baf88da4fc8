//! Envelope types for the subscribe long-poll response.
//!
//! One envelope carries a batch of messages for every channel, wildcard
//! pattern and channel group the client is subscribed to. The server keeps
//! the short single-letter keys, so every field is renamed here.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, trace};

/// Marker the server puts in a subscription match for wildcard subscriptions
/// (`"news.*"` matches `"news.sport"`, `"news.weather"`, ...).
pub const WILDCARD_MARKER: &str = ".*";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Position of an event in the server's stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timetoken {
    /// Opaque cursor value.
    #[serde(rename = "t", default, deserialize_with = "null_as_default")]
    pub timetoken: String,
    /// Region the cursor belongs to.
    #[serde(rename = "r", default, deserialize_with = "null_as_default")]
    pub region: i32,
}

impl Timetoken {
    /// Create a new timetoken marker.
    #[must_use]
    pub fn new(timetoken: impl Into<String>, region: i32) -> Self {
        Self {
            timetoken: timetoken.into(),
            region,
        }
    }
}

/// How the server matched a message against the client's subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind<'a> {
    /// Direct channel subscription, or no match information at all.
    Channel,
    /// Wildcard subscription, carrying the pattern.
    Wildcard(&'a str),
    /// Channel-group subscription, carrying the group name.
    Group(&'a str),
}

/// One entity's event within an envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Shard identifier.
    #[serde(rename = "a", default, deserialize_with = "null_as_default")]
    pub shard: String,
    /// The name or pattern the server matched against.
    #[serde(rename = "b", default, deserialize_with = "null_as_default")]
    pub subscription_match: String,
    /// Channel the message was published to.
    #[serde(rename = "c", default, deserialize_with = "null_as_default")]
    pub channel: String,
    /// Message payload, passed through untouched.
    #[serde(rename = "d", default)]
    pub payload: serde_json::Value,
    /// Flag bits.
    #[serde(rename = "f", default, deserialize_with = "null_as_default")]
    pub flags: i64,
    /// Identifier of the publishing client.
    #[serde(rename = "i", default, deserialize_with = "null_as_default")]
    pub issuing_client_id: String,
    /// Subscribe key.
    #[serde(rename = "k", default, deserialize_with = "null_as_default")]
    pub subscribe_key: String,
    /// Per-shard sequence number.
    #[serde(rename = "s", default, deserialize_with = "null_as_default")]
    pub sequence_number: u64,
    /// Originating timetoken.
    #[serde(rename = "o", default, deserialize_with = "null_as_default")]
    pub originating_timetoken: Timetoken,
    /// Publish timetoken.
    #[serde(rename = "p", default, deserialize_with = "null_as_default")]
    pub publish_timetoken: Timetoken,
    /// User metadata, passed through untouched.
    #[serde(rename = "u", default)]
    pub user_metadata: serde_json::Value,
}

impl Message {
    /// Create a message for `channel` matched by `subscription_match`.
    #[must_use]
    pub fn new(
        channel: impl Into<String>,
        subscription_match: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            channel: channel.into(),
            subscription_match: subscription_match.into(),
            payload,
            ..Self::default()
        }
    }

    /// Classify the subscription match.
    ///
    /// A message is a group match only when the match is non-empty, differs
    /// from the channel and is not a wildcard pattern. Wildcard matches are
    /// reported separately but still count as channel deliveries.
    #[must_use]
    pub fn match_kind(&self) -> MatchKind<'_> {
        let sm = self.subscription_match.as_str();
        if sm.is_empty() || sm == self.channel {
            MatchKind::Channel
        } else if sm.contains(WILDCARD_MARKER) {
            MatchKind::Wildcard(sm)
        } else {
            MatchKind::Group(sm)
        }
    }

    /// Whether this message was delivered through a channel group.
    #[must_use]
    pub fn is_group_match(&self) -> bool {
        matches!(self.match_kind(), MatchKind::Group(_))
    }

    fn log_fields(&self, index: usize) {
        trace!(
            index,
            channel = %self.channel,
            flags = self.flags,
            issuing_client_id = %self.issuing_client_id,
            originating_timetoken = %self.originating_timetoken.timetoken,
            originating_region = self.originating_timetoken.region,
            publish_timetoken = %self.publish_timetoken.timetoken,
            publish_region = self.publish_timetoken.region,
            sequence_number = self.sequence_number,
            shard = %self.shard,
            subscribe_key = %self.subscribe_key,
            subscription_match = %self.subscription_match,
            "Envelope message"
        );

        match self.payload.as_str() {
            Some(payload) => trace!(index, payload, "Message payload"),
            None => debug!(index, payload = %self.payload, "Payload not converted to string"),
        }
        match self.user_metadata.as_str() {
            Some(meta) => trace!(index, user_metadata = meta, "Message user metadata"),
            None => debug!(index, "User metadata not converted to string"),
        }
    }
}

/// Names that had activity in one envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activity {
    /// Every message's channel, in message order. Duplicates are kept.
    pub channels: Vec<String>,
    /// Group names of messages that arrived through a channel group.
    pub channel_groups: Vec<String>,
}

/// One decoded subscribe response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Messages in server order.
    #[serde(rename = "m", default, deserialize_with = "null_as_default")]
    pub messages: Vec<Message>,
    /// Cursor to resume the next poll from.
    #[serde(rename = "t", default, deserialize_with = "null_as_default")]
    pub timetoken: Timetoken,
}

impl Envelope {
    /// Number of messages in the envelope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the envelope carries no messages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Split the envelope into the channels and channel groups that had activity.
    #[must_use]
    pub fn activity(&self) -> Activity {
        let mut activity = Activity::default();

        for (i, msg) in self.messages.iter().enumerate() {
            msg.log_fields(i + 1);
            activity.channels.push(msg.channel.clone());
            if msg.is_group_match() {
                activity.channel_groups.push(msg.subscription_match.clone());
            }
        }

        activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_match_kind() {
        let direct = Message::new("room1", "room1", json!("hi"));
        assert_eq!(direct.match_kind(), MatchKind::Channel);

        let unmatched = Message::new("room1", "", json!("hi"));
        assert_eq!(unmatched.match_kind(), MatchKind::Channel);

        let wildcard = Message::new("news.sport", "news.*", json!("hi"));
        assert_eq!(wildcard.match_kind(), MatchKind::Wildcard("news.*"));

        let group = Message::new("room2", "cg1", json!("hi"));
        assert_eq!(group.match_kind(), MatchKind::Group("cg1"));
        assert!(group.is_group_match());
        assert!(!direct.is_group_match());
        assert!(!unmatched.is_group_match());
        assert!(!wildcard.is_group_match());
    }

    #[test]
    fn test_activity_split() {
        let envelope = Envelope {
            messages: vec![
                Message::new("room1", "room1", json!("a")),
                Message::new("room2", "cg1", json!("b")),
                Message::new("news.sport", "news.*", json!("c")),
                Message::new("room3", "", json!({"nested": true})),
                Message::new("room1", "room1", json!(42)),
            ],
            timetoken: Timetoken::new("15000000000000000", 1),
        };

        let activity = envelope.activity();
        assert_eq!(
            activity.channels,
            vec!["room1", "room2", "news.sport", "room3", "room1"]
        );
        assert_eq!(activity.channel_groups, vec!["cg1"]);
    }

    #[test]
    fn test_empty_envelope_activity() {
        let activity = Envelope::default().activity();
        assert!(activity.channels.is_empty());
        assert!(activity.channel_groups.is_empty());
    }
}
