//! Signaling wire format
//!
//! Every signaling message is a flat JSON object:
//!
//! ```text
//! {"method": "...", "parameter": "...", "source": "...", "destination": "..."}
//! ```
//!
//! `source` names the originating peer on inbound messages, `destination`
//! the addressed peer on outbound ones. Missing fields decode as empty
//! strings. The `candidate` method carries a JSON array of
//! `{"candidate", "sdpMid", "sdpMLineIndex"}` objects in `parameter`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{AppError, Result};

/// Inbound: create a session for `source` and send it an offer
pub const METHOD_START: &str = "start";
/// Inbound: tear down the session for `source`
pub const METHOD_CLOSE: &str = "close";
/// Inbound: SDP answer in `parameter`
pub const METHOD_ANSWER: &str = "answer";
/// Both directions: JSON array of ICE candidates in `parameter`
pub const METHOD_CANDIDATE: &str = "candidate";
/// Inbound: start rendering for `source`
pub const METHOD_ACQUIRE: &str = "acquire";
/// Outbound: SDP offer in `parameter`
pub const METHOD_OFFER: &str = "offer";

/// Signaling envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    pub method: String,
    pub parameter: String,
    pub source: String,
    pub destination: String,
}

impl Envelope {
    /// Build an outbound envelope (empty `source`)
    pub fn outbound(
        method: impl Into<String>,
        destination: impl Into<String>,
        parameter: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            parameter: parameter.into(),
            source: String::new(),
            destination: destination.into(),
        }
    }

    /// Decode an envelope from raw text
    ///
    /// Anything other than a JSON object whose known fields are strings is
    /// a decode error. Absent fields are not.
    pub fn decode(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| AppError::Decode(format!("invalid JSON: {}", e)))?;

        if !value.is_object() {
            return Err(AppError::Decode("envelope is not a JSON object".to_string()));
        }

        serde_json::from_value(value)
            .map_err(|e| AppError::Decode(format!("invalid envelope: {}", e)))
    }

    /// Encode to single-line JSON
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| AppError::Encode(e.to_string()))
    }
}

/// ICE candidate as exchanged over signaling
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IceCandidate {
    /// Candidate attribute line
    #[serde(rename = "candidate")]
    pub sdp: String,
    /// Media stream identification tag
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,
    /// Index of the m-line this candidate belongs to
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u16,
}

impl IceCandidate {
    pub fn new(sdp: impl Into<String>, sdp_mid: impl Into<String>, sdp_mline_index: u16) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_mid: sdp_mid.into(),
            sdp_mline_index,
        }
    }

    /// Decode one array entry. `sdpMLineIndex` is required.
    fn from_object(object: &Map<String, Value>) -> Option<Self> {
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let index = match object.get("sdpMLineIndex") {
            Some(Value::Number(n)) => n.as_u64().and_then(|v| u16::try_from(v).ok()),
            // String-typed JSON encoders emit every scalar quoted
            Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
            _ => None,
        }?;

        Some(Self {
            sdp: text("candidate"),
            sdp_mid: text("sdpMid"),
            sdp_mline_index: index,
        })
    }
}

/// Decode the `parameter` of a `candidate` message
///
/// Malformed JSON or a non-array root fails the whole batch. An entry that is
/// not an object or lacks a usable `sdpMLineIndex` is skipped on its own.
pub fn decode_candidates(parameter: &str) -> Result<Vec<IceCandidate>> {
    let value: Value = serde_json::from_str(parameter)
        .map_err(|e| AppError::Decode(format!("invalid candidate JSON: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(AppError::Decode("candidate list is not a JSON array".to_string()));
    };

    let mut candidates = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let Some(object) = item.as_object() else {
            warn!("Candidate #{} is not an object, skipping", i);
            continue;
        };
        match IceCandidate::from_object(object) {
            Some(candidate) => candidates.push(candidate),
            None => warn!("Candidate #{} has no valid sdpMLineIndex, skipping", i),
        }
    }

    Ok(candidates)
}

/// Encode a candidate batch as the `parameter` of a `candidate` message
pub fn encode_candidates(candidates: &[IceCandidate]) -> Result<String> {
    serde_json::to_string(candidates).map_err(|e| AppError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_envelope() {
        let raw = r#"{"method":"answer","parameter":"v=0","source":"peerA","destination":""}"#;
        let env = Envelope::decode(raw).unwrap();
        assert_eq!(env.method, "answer");
        assert_eq!(env.parameter, "v=0");
        assert_eq!(env.source, "peerA");
        assert!(env.destination.is_empty());
    }

    #[test]
    fn test_decode_missing_fields_default_to_empty() {
        let env = Envelope::decode(r#"{"method":"start","source":"peerA"}"#).unwrap();
        assert_eq!(env.method, "start");
        assert_eq!(env.source, "peerA");
        assert!(env.parameter.is_empty());

        let env = Envelope::decode("{}").unwrap();
        assert_eq!(env, Envelope::default());
    }

    #[test]
    fn test_decode_is_repeatable() {
        let raw = r#"{"method":"close","source":"peerB","extra":42}"#;
        assert_eq!(Envelope::decode(raw).unwrap(), Envelope::decode(raw).unwrap());
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        for raw in ["", "not json", "{\"method\":", "[]", "\"start\"", "42", r#"{"method":5}"#] {
            assert!(
                matches!(Envelope::decode(raw), Err(AppError::Decode(_))),
                "expected decode error for {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_encode_outbound_offer() {
        let env = Envelope::outbound(METHOD_OFFER, "peerA", "v=0\r\n");
        let encoded = env.encode().unwrap();
        assert!(!encoded.contains('\n'));

        let decoded = Envelope::decode(&encoded).unwrap();
        assert_eq!(decoded.method, "offer");
        assert_eq!(decoded.destination, "peerA");
        assert_eq!(decoded.parameter, "v=0\r\n");
        assert!(decoded.source.is_empty());
    }

    #[test]
    fn test_encode_candidates_wire_format() {
        let list = vec![
            IceCandidate::new("candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host", "0", 0),
            IceCandidate::new("candidate:2 1 tcp 1518280447 10.0.0.2 9 typ host", "1", 1),
        ];
        assert_eq!(
            encode_candidates(&list).unwrap(),
            concat!(
                r#"[{"candidate":"candidate:1 1 udp 2122260223 10.0.0.2 50000 typ host","sdpMid":"0","sdpMLineIndex":0},"#,
                r#"{"candidate":"candidate:2 1 tcp 1518280447 10.0.0.2 9 typ host","sdpMid":"1","sdpMLineIndex":1}]"#
            )
        );
        assert_eq!(encode_candidates(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_decode_candidates() {
        let parameter = r#"[
            {"candidate":"candidate:a","sdpMid":"0","sdpMLineIndex":0},
            {"candidate":"candidate:b","sdpMLineIndex":"1"}
        ]"#;
        let list = decode_candidates(parameter).unwrap();
        assert_eq!(
            list,
            vec![
                IceCandidate::new("candidate:a", "0", 0),
                IceCandidate::new("candidate:b", "", 1),
            ]
        );
    }

    #[test]
    fn test_decode_candidates_skips_entry_without_index() {
        let parameter = r#"[
            {"candidate":"candidate:a","sdpMid":"0"},
            {"candidate":"candidate:b","sdpMid":"0","sdpMLineIndex":-1},
            "garbage",
            {"candidate":"candidate:c","sdpMid":"0","sdpMLineIndex":2}
        ]"#;
        let list = decode_candidates(parameter).unwrap();
        assert_eq!(list, vec![IceCandidate::new("candidate:c", "0", 2)]);
    }

    #[test]
    fn test_decode_candidates_rejects_non_array() {
        assert!(decode_candidates("").is_err());
        assert!(decode_candidates("{}").is_err());
        assert!(decode_candidates("[{").is_err());
        assert!(decode_candidates("[]").unwrap().is_empty());
    }
}
