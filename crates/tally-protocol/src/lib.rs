//! # tally-protocol
//!
//! Wire types for the Tally subscribe client.
//!
//! This crate covers the two formats the client speaks at its edges:
//!
//! - **Envelope** - the multiplexed subscribe response, decoded into messages
//!   and split into the channels and channel groups that had activity
//! - **ConnectionEvent** - status lines reported to the caller when a
//!   subscription connects, reconnects or is removed
//!
//! ## Example
//!
//! ```rust
//! use tally_protocol::codec;
//!
//! let body = br#"{"t": {"t": "1", "r": 1},
//!                 "m": [{"b": "cg1", "c": "room2", "d": "hi"}]}"#;
//! let envelope = codec::decode(body).unwrap();
//! let activity = envelope.activity();
//! assert_eq!(activity.channels, vec!["room2"]);
//! assert_eq!(activity.channel_groups, vec!["cg1"]);
//! ```

pub mod codec;
pub mod envelope;
pub mod event;

pub use codec::{decode, ProtocolError};
pub use envelope::{Activity, Envelope, MatchKind, Message, Timetoken, WILDCARD_MARKER};
pub use event::{ConnectionAction, ConnectionEvent, EntityKind, PRESENCE_SUFFIX};
