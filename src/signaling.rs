use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// Field names on a session description message.
const TYPE_FIELD: &str = "type";
const SDP_FIELD: &str = "sdp";

// Description type string that marks a loopback request.
const LOOPBACK_TYPE: &str = "offer-loopback";

/// Which side of the offer/answer exchange a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

/// A trickled ICE candidate, in the shape it crosses the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInit {
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u32,
    pub candidate: String,
}

#[derive(Serialize, Deserialize)]
struct DescriptionWire {
    #[serde(rename = "type")]
    kind: SdpKind,
    sdp: String,
}

/// One signaling message exchanged through the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingMessage {
    Description { kind: SdpKind, sdp: String },
    Candidate(CandidateInit),
    /// Request to restart the session in loopback self-test mode. Only ever
    /// received; there is no wire encoding for it.
    LoopbackOffer,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed signaling message: {0}")]
    MalformedMessage(String),
}

impl SignalingMessage {
    /// Decode a relay payload. A message carrying the `type` discriminator is
    /// a session description (or the loopback marker); anything else must be
    /// an ICE candidate with exactly the three candidate fields.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|err| DecodeError::MalformedMessage(format!("invalid json: {err}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| DecodeError::MalformedMessage("not a json object".into()))?;

        match object.get(TYPE_FIELD) {
            Some(kind) => {
                let kind = kind.as_str().ok_or_else(|| {
                    DecodeError::MalformedMessage(format!("{TYPE_FIELD} must be a string"))
                })?;
                if kind == LOOPBACK_TYPE {
                    return Ok(SignalingMessage::LoopbackOffer);
                }
                let sdp = object.get(SDP_FIELD).and_then(Value::as_str).ok_or_else(|| {
                    DecodeError::MalformedMessage(format!("missing or non-string {SDP_FIELD}"))
                })?;
                let kind = match kind {
                    "offer" => SdpKind::Offer,
                    "answer" => SdpKind::Answer,
                    other => {
                        return Err(DecodeError::MalformedMessage(format!(
                            "unknown description type '{other}'"
                        )));
                    }
                };
                Ok(SignalingMessage::Description {
                    kind,
                    sdp: sdp.to_string(),
                })
            }
            None => {
                let candidate: CandidateInit = serde_json::from_value(value).map_err(|err| {
                    DecodeError::MalformedMessage(format!("invalid candidate: {err}"))
                })?;
                Ok(SignalingMessage::Candidate(candidate))
            }
        }
    }

    /// Encode for transmission. Returns `None` for the loopback marker, which
    /// never goes back out through the relay.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            SignalingMessage::Description { kind, sdp } => serde_json::to_string(&DescriptionWire {
                kind: *kind,
                sdp: sdp.clone(),
            })
            .ok(),
            SignalingMessage::Candidate(candidate) => serde_json::to_string(candidate).ok(),
            SignalingMessage::LoopbackOffer => None,
        }
    }
}
