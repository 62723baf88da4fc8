//! Decoding of raw subscribe responses.
//!
//! The subscribe endpoint answers with a single JSON document per poll. The
//! transport hands the body over as bytes and gets back an [`Envelope`] or
//! a terminal error for that batch.

use thiserror::Error;
use tracing::debug;

use crate::envelope::Envelope;

/// Maximum accepted envelope size (16 MiB).
pub const MAX_ENVELOPE_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur while decoding an envelope.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Envelope exceeds maximum size.
    #[error("Envelope size {0} exceeds maximum {MAX_ENVELOPE_SIZE}")]
    EnvelopeTooLarge(usize),

    /// Body is not a well-formed envelope.
    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode an envelope from raw response bytes.
///
/// No partial envelope is ever returned: either every message decodes or
/// the whole batch is rejected.
///
/// # Errors
///
/// Returns an error if the body is too large or does not have the envelope shape.
pub fn decode(data: &[u8]) -> Result<Envelope, ProtocolError> {
    if data.len() > MAX_ENVELOPE_SIZE {
        return Err(ProtocolError::EnvelopeTooLarge(data.len()));
    }

    let envelope: Envelope = serde_json::from_slice(data)?;
    debug!(
        messages = envelope.len(),
        timetoken = %envelope.timetoken.timetoken,
        region = envelope.timetoken.region,
        "Decoded envelope"
    );

    Ok(envelope)
}

/// Decode an envelope from a string body.
///
/// # Errors
///
/// Returns an error if the body is too large or does not have the envelope shape.
pub fn decode_str(body: &str) -> Result<Envelope, ProtocolError> {
    decode(body.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::MatchKind;
    use serde_json::json;

    const TWO_ROOMS: &str = r#"{
        "t": {"t": "15628652479932717", "r": 4},
        "m": [
            {"a": "4", "b": "room1", "c": "room1", "d": "hello", "f": 0,
             "i": "client-1", "k": "sub-c-1", "s": 1,
             "o": {"t": "15628652479932710", "r": 4},
             "p": {"t": "15628652479932717", "r": 4}, "u": "meta"},
            {"a": "4", "b": "cg1", "c": "room2", "d": {"text": "hi"}, "f": 0,
             "i": "client-2", "k": "sub-c-1", "s": 2,
             "p": {"t": "15628652479932718", "r": 4}}
        ]
    }"#;

    #[test]
    fn test_decode_envelope() {
        let envelope = decode_str(TWO_ROOMS).unwrap();

        assert_eq!(envelope.len(), 2);
        assert_eq!(envelope.timetoken.timetoken, "15628652479932717");
        assert_eq!(envelope.timetoken.region, 4);

        let first = &envelope.messages[0];
        assert_eq!(first.shard, "4");
        assert_eq!(first.issuing_client_id, "client-1");
        assert_eq!(first.subscribe_key, "sub-c-1");
        assert_eq!(first.sequence_number, 1);
        assert_eq!(first.originating_timetoken.timetoken, "15628652479932710");
        assert_eq!(first.payload, json!("hello"));
        assert_eq!(first.user_metadata, json!("meta"));

        let second = &envelope.messages[1];
        assert_eq!(second.payload, json!({"text": "hi"}));
        assert_eq!(second.originating_timetoken, Default::default());
        assert!(second.user_metadata.is_null());
        assert_eq!(second.match_kind(), MatchKind::Group("cg1"));

        let activity = envelope.activity();
        assert_eq!(activity.channels, vec!["room1", "room2"]);
        assert_eq!(activity.channel_groups, vec!["cg1"]);
    }

    #[test]
    fn test_decode_missing_or_null_messages() {
        let envelope = decode_str(r#"{"t": {"t": "1", "r": 0}}"#).unwrap();
        assert!(envelope.is_empty());

        let envelope = decode_str(r#"{"t": {"t": "1", "r": 0}, "m": null}"#).unwrap();
        assert!(envelope.is_empty());
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(decode(b"not json"), Err(ProtocolError::Json(_))));
        assert!(matches!(decode(b"[1, 2, 3]"), Err(ProtocolError::Json(_))));
        assert!(matches!(
            decode_str(r#"{"m": [{"c": 17}]}"#),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode_str(r#"{"m": "nope"}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_envelope_too_large() {
        let body = vec![b' '; MAX_ENVELOPE_SIZE + 1];
        match decode(&body) {
            Err(ProtocolError::EnvelopeTooLarge(size)) => assert_eq!(size, MAX_ENVELOPE_SIZE + 1),
            other => panic!("Expected EnvelopeTooLarge error, got {:?}", other),
        }
    }
}
