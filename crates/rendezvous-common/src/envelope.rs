//! Signaling envelope and its JSON text codec.
//!
//! One envelope travels per WebSocket text frame. The relay reads only the
//! addressing fields (`type`, `from`, `to`, `seqnr`) and the discriminators
//! of a `signaling-protocol` payload; everything below `payload.payload.type`
//! is forwarded as-is.

use crate::types::{
    envelope_type, signal_type, BROADCAST, FORWARD_ERROR, SIGNALING_PROTOCOL, SIGNALING_SERVER,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// A parsed signaling envelope.
///
/// Every field is optional on the wire and kept as raw JSON: decoding is
/// purely structural, and the router decides what a missing or non-string
/// field means. Use [`Envelope::sender`] and [`Envelope::destination`] for the
/// string view of the addressing fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Outer message type (`ACK`, `ERROR`, `ROUTE`, or a client-chosen value).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    /// Claimed sender identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Value>,
    /// Destination: a peer id, [`BROADCAST`] or [`SIGNALING_SERVER`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Value>,
    /// Sender-chosen sequence number, echoed verbatim in ACK and ERROR replies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seqnr: Option<Value>,
    /// Opaque signaling payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Human-readable reason, set on ERROR envelopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    /// Unrecognised top-level fields, kept so forwarding is lossless.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Sub-protocol of a `signaling-protocol` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind<'a> {
    /// A connection offer.
    Offer,
    /// A connection answer.
    Answer,
    /// A relay-issued denial.
    Denied,
    /// Any other discriminator.
    Unknown(&'a str),
}

/// Errors that can occur while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A binary frame did not contain UTF-8 text.
    #[error("frame is not valid UTF-8")]
    InvalidUtf8,
    /// The frame is not parseable JSON.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame is valid JSON but not an object.
    #[error("envelope must be a JSON object")]
    NotAnObject,
}

impl Envelope {
    /// Decode one text frame.
    ///
    /// ```
    /// use rendezvous_common::Envelope;
    /// let env = Envelope::decode(r#"{"from":"A","to":"*","seqnr":1}"#).unwrap();
    /// assert!(env.is_broadcast());
    /// assert!(Envelope::decode("{\"from\":").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the text is not a JSON object. Field
    /// types are not checked.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Decode a binary frame carrying UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] for non-UTF-8 bytes, otherwise as
    /// [`Envelope::decode`].
    pub fn decode_bytes(raw: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
        Self::decode(text)
    }

    /// Serialize to a single JSON text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        // String keys and JSON values only; serialization has no failure path.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    /// Acknowledgement sent by the relay to `to`, echoing `seqnr`.
    #[must_use]
    pub fn ack(seqnr: Option<Value>, to: &str) -> Self {
        Self {
            kind: Some(envelope_type::ACK.into()),
            from: Some(SIGNALING_SERVER.into()),
            to: Some(to.into()),
            seqnr,
            ..Self::default()
        }
    }

    /// Forward-failure report sent by the relay to `to`, echoing `seqnr`.
    #[must_use]
    pub fn forward_error(seqnr: Option<Value>, to: &str) -> Self {
        Self {
            kind: Some(envelope_type::ERROR.into()),
            from: Some(SIGNALING_SERVER.into()),
            to: Some(to.into()),
            seqnr,
            error: Some(FORWARD_ERROR.into()),
            ..Self::default()
        }
    }

    /// ROUTE envelope telling `to` that its offer was denied.
    ///
    /// `seqnr` is relay-originated; `offer_seqnr` is the nested sequence
    /// number of the offer being denied.
    #[must_use]
    pub fn denied(to: &str, seqnr: i64, offer_seqnr: Option<Value>) -> Self {
        let mut inner = json!({
            "type": SIGNALING_PROTOCOL,
            "to": to,
            "from": SIGNALING_SERVER,
            "payload": { "type": signal_type::DENIED },
        });
        if let (Some(seqnr), Some(obj)) = (offer_seqnr, inner.as_object_mut()) {
            obj.insert("seqnr".to_string(), seqnr);
        }
        Self {
            kind: Some(envelope_type::ROUTE.into()),
            from: Some(SIGNALING_SERVER.into()),
            to: Some(to.into()),
            seqnr: Some(seqnr.into()),
            payload: Some(inner),
            ..Self::default()
        }
    }

    /// Outer `type`, when it is a string.
    #[must_use]
    pub fn type_name(&self) -> Option<&str> {
        self.kind.as_ref().and_then(Value::as_str)
    }

    /// Claimed sender, when `from` is a string.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.from.as_ref().and_then(Value::as_str)
    }

    /// Destination, when `to` is a string.
    #[must_use]
    pub fn destination(&self) -> Option<&str> {
        self.to.as_ref().and_then(Value::as_str)
    }

    /// Point the envelope at `peer_id`.
    pub fn set_destination(&mut self, peer_id: &str) {
        self.to = Some(peer_id.into());
    }

    /// Whether the envelope is addressed to the relay itself.
    #[must_use]
    pub fn is_for_server(&self) -> bool {
        self.destination() == Some(SIGNALING_SERVER)
    }

    /// Whether the envelope asks the relay to pick a receiver.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.destination() == Some(BROADCAST)
    }

    /// Whether sender and receiver are the same peer.
    #[must_use]
    pub fn is_self_addressed(&self) -> bool {
        matches!((&self.from, &self.to), (Some(from), Some(to)) if from == to)
    }

    /// Sub-protocol of a `signaling-protocol` payload.
    ///
    /// Returns `None` when there is no payload, the payload is not
    /// `signaling-protocol`, or the inner payload carries no string `type`.
    #[must_use]
    pub fn signal(&self) -> Option<SignalKind<'_>> {
        let payload = self.payload.as_ref()?;
        if payload.get("type").and_then(Value::as_str) != Some(SIGNALING_PROTOCOL) {
            return None;
        }
        let kind = payload.get("payload")?.get("type")?.as_str()?;
        Some(match kind {
            signal_type::OFFER => SignalKind::Offer,
            signal_type::ANSWER => SignalKind::Answer,
            signal_type::DENIED => SignalKind::Denied,
            other => SignalKind::Unknown(other),
        })
    }

    /// Sequence number of the nested signaling message.
    ///
    /// Read from `payload.seqnr`, falling back to `payload.payload.seqnr`.
    #[must_use]
    pub fn nested_seqnr(&self) -> Option<Value> {
        let payload = self.payload.as_ref()?;
        payload
            .get("seqnr")
            .or_else(|| payload.get("payload").and_then(|inner| inner.get("seqnr")))
            .filter(|v| !v.is_null())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(from: &str, to: &str) -> Envelope {
        Envelope::decode(&format!(
            r#"{{"from":"{from}","to":"{to}","seqnr":1,
                "payload":{{"type":"signaling-protocol","payload":{{"type":"offer","seqnr":7,"sdp":"v=0"}}}}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn decode_reads_addressing_fields() {
        let env = offer("A", "*");
        assert_eq!(env.sender(), Some("A"));
        assert_eq!(env.destination(), Some("*"));
        assert_eq!(env.seqnr, Some(json!(1)));
        assert!(env.is_broadcast());
        assert!(!env.is_for_server());
    }

    #[test]
    fn decode_truncated_frame_is_error() {
        assert!(matches!(
            Envelope::decode(r#"{"from":"A","to":"#),
            Err(DecodeError::Json(_))
        ));
    }

    #[test]
    fn decode_non_object_is_error() {
        assert!(matches!(
            Envelope::decode("[1,2,3]"),
            Err(DecodeError::NotAnObject)
        ));
        assert!(matches!(
            Envelope::decode("\"hello\""),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn decode_accepts_any_field_types() {
        let env = Envelope::decode(r#"{"type":7,"from":["A"],"to":42,"seqnr":"1"}"#).unwrap();
        assert_eq!(env.type_name(), None);
        assert_eq!(env.sender(), None);
        assert_eq!(env.destination(), None);
        assert_eq!(env.seqnr, Some(json!("1")));
        assert!(!env.is_broadcast());

        let float = Envelope::decode(r#"{"from":"A","to":"B","seqnr":1.5}"#).unwrap();
        assert_eq!(float.seqnr, Some(json!(1.5)));
    }

    #[test]
    fn odd_field_types_survive_reencoding() {
        let raw = json!({"from": "A", "to": "B", "seqnr": "1", "payload": {"x": 1}});
        let env = Envelope::decode(&raw.to_string()).unwrap();
        let reparsed: Value = serde_json::from_str(&env.encode()).unwrap();
        assert_eq!(reparsed, raw);
    }

    #[test]
    fn set_destination_rewrites_to() {
        let mut env = offer("A", "*");
        env.set_destination("B");
        assert_eq!(env.destination(), Some("B"));
        assert!(!env.is_broadcast());
    }

    #[test]
    fn decode_bytes_rejects_invalid_utf8() {
        assert!(matches!(
            Envelope::decode_bytes(&[0xff, 0xfe, b'{']),
            Err(DecodeError::InvalidUtf8)
        ));
    }

    #[test]
    fn null_payload_decodes_as_none() {
        let env = Envelope::decode(r#"{"from":"A","to":"*","payload":null}"#).unwrap();
        assert!(env.payload.is_none());
        assert_eq!(env.signal(), None);
    }

    #[test]
    fn unknown_fields_survive_reencoding() {
        let env = Envelope::decode(r#"{"from":"A","to":"B","ttl":3,"route":["x"]}"#).unwrap();
        let reparsed: Value = serde_json::from_str(&env.encode()).unwrap();
        assert_eq!(reparsed["ttl"], 3);
        assert_eq!(reparsed["route"][0], "x");
        assert_eq!(reparsed["to"], "B");
    }

    #[test]
    fn signal_recognises_offer_and_answer() {
        assert_eq!(offer("A", "*").signal(), Some(SignalKind::Offer));

        let answer = Envelope::decode(
            r#"{"from":"B","to":"A","payload":{"type":"signaling-protocol","payload":{"type":"answer"}}}"#,
        )
        .unwrap();
        assert_eq!(answer.signal(), Some(SignalKind::Answer));

        let other = Envelope::decode(
            r#"{"from":"B","to":"*","payload":{"type":"signaling-protocol","payload":{"type":"candidate"}}}"#,
        )
        .unwrap();
        assert_eq!(other.signal(), Some(SignalKind::Unknown("candidate")));
    }

    #[test]
    fn signal_ignores_other_protocols() {
        let env =
            Envelope::decode(r#"{"from":"A","to":"*","payload":{"type":"dht","payload":{"type":"offer"}}}"#)
                .unwrap();
        assert_eq!(env.signal(), None);
    }

    #[test]
    fn nested_seqnr_prefers_outer_payload() {
        let env = Envelope::decode(
            r#"{"payload":{"type":"signaling-protocol","seqnr":3,"payload":{"type":"offer","seqnr":7}}}"#,
        )
        .unwrap();
        assert_eq!(env.nested_seqnr(), Some(json!(3)));
        assert_eq!(offer("A", "*").nested_seqnr(), Some(json!(7)));
    }

    #[test]
    fn self_addressed_detection() {
        assert!(offer("A", "A").is_self_addressed());
        assert!(!offer("A", "B").is_self_addressed());
        assert!(!Envelope::default().is_self_addressed());
    }

    #[test]
    fn ack_is_addressed_from_server() {
        let ack: Value = serde_json::from_str(&Envelope::ack(Some(json!(1)), "A").encode()).unwrap();
        assert_eq!(
            ack,
            json!({"type": "ACK", "seqnr": 1, "to": "A", "from": "signaling-server"})
        );
    }

    #[test]
    fn forward_error_echoes_seqnr() {
        let err = Envelope::forward_error(Some(json!("9")), "A");
        assert_eq!(err.type_name(), Some("ERROR"));
        assert_eq!(err.seqnr, Some(json!("9")));
        assert_eq!(err.destination(), Some("A"));
        assert_eq!(err.error, Some(json!(FORWARD_ERROR)));
    }

    #[test]
    fn denied_wraps_signaling_payload() {
        let env = Envelope::denied("A", 4242, Some(json!(7)));
        assert_eq!(env.type_name(), Some("ROUTE"));
        assert_eq!(env.seqnr, Some(json!(4242)));
        assert_eq!(env.signal(), Some(SignalKind::Denied));
        let payload = env.payload.unwrap();
        assert_eq!(payload["to"], "A");
        assert_eq!(payload["from"], "signaling-server");
        assert_eq!(payload["seqnr"], 7);
        assert_eq!(payload["payload"], json!({"type": "denied"}));
    }

    #[test]
    fn denied_without_offer_seqnr_omits_it() {
        let env = Envelope::denied("A", 1, None);
        assert!(env.payload.unwrap().get("seqnr").is_none());
    }
}
