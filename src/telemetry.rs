//! Inbound telemetry decoding
//!
//! Frame layout, whitespace separated:
//!
//! ```text
//! <seq> <lat> <lng> <adjustment> <entered code> [...]
//! ```
//!
//! Decoding is best effort. The raw tokens of every non-blank frame are stored
//! as the locator's last message; coordinates and status fields only change on
//! a complete frame with a usable GPS fix. Nothing here returns an error to the
//! caller.

use crate::locator::Coordinates;
use crate::registry::LocatorRegistry;
use std::sync::Arc;

/// Payload a locator sends when it is out of range of its gateway
pub const OUT_OF_RANGE_STATUS: &str = "-21";

/// Why a frame carried no usable fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeReason {
    /// Latitude or longitude reported as zero
    GpsUnavailable,
    /// Latitude or longitude is not a number
    NonNumeric,
}

/// Result of decoding one payload, independent of any locator
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryDecode {
    Applied {
        coordinates: Coordinates,
        adjustment: String,
        entered_code: String,
    },
    Degraded {
        reason: DegradeReason,
    },
    OutOfRange,
    /// Too few tokens to carry a fix
    RawOnly,
    /// Blank payload; the stored message is left as it was
    Blank,
}

/// What handling a frame did to the registry
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    /// No locator owns the topic's channel field
    Unrouted,
    Decoded {
        locator_id: String,
        result: TelemetryDecode,
    },
}

pub fn tokenize(payload: &str) -> Vec<String> {
    payload.split_whitespace().map(String::from).collect()
}

/// Trailing path segment of a topic, e.g. `field1` for
/// `channels/2983140/subscribe/fields/field1`
pub fn channel_field(topic: &str) -> &str {
    topic.rsplit('/').next().unwrap_or(topic)
}

/// Classify tokenized telemetry
pub fn decode_tokens(tokens: &[String]) -> TelemetryDecode {
    if tokens.is_empty() {
        return TelemetryDecode::Blank;
    }
    if tokens.len() == 1 && tokens[0] == OUT_OF_RANGE_STATUS {
        return TelemetryDecode::OutOfRange;
    }
    if tokens.len() <= 4 {
        return TelemetryDecode::RawOnly;
    }

    let (lat, lng) = match (tokens[1].parse::<f64>(), tokens[2].parse::<f64>()) {
        (Ok(lat), Ok(lng)) => (lat, lng),
        _ => {
            return TelemetryDecode::Degraded {
                reason: DegradeReason::NonNumeric,
            }
        },
    };

    // NaN fails this check too
    if !(lat.abs() > 0.0 && lng.abs() > 0.0) {
        return TelemetryDecode::Degraded {
            reason: DegradeReason::GpsUnavailable,
        };
    }

    TelemetryDecode::Applied {
        coordinates: Coordinates::new(tokens[1].clone(), tokens[2].clone()),
        adjustment: tokens[3].clone(),
        entered_code: tokens[4].clone(),
    }
}

pub fn decode_payload(payload: &str) -> TelemetryDecode {
    decode_tokens(&tokenize(payload))
}

/// Applies inbound frames to the registry
#[derive(Debug, Clone)]
pub struct TelemetryDecoder {
    registry: Arc<LocatorRegistry>,
}

impl TelemetryDecoder {
    pub fn new(registry: Arc<LocatorRegistry>) -> Self {
        Self { registry }
    }

    /// Route a frame by its topic and apply it to the owning locator
    pub async fn handle(&self, topic: &str, payload: &str) -> DecodeOutcome {
        tracing::debug!(topic = %topic, payload = %payload, "Telemetry frame received");

        let field = channel_field(topic);
        let Some(entry) = self.registry.find_by_channel(field) else {
            tracing::warn!(topic = %topic, "No locator listens on this channel");
            return DecodeOutcome::Unrouted;
        };

        let tokens = tokenize(payload);
        let result = decode_tokens(&tokens);
        let locator_id = entry.id().to_string();

        match &result {
            TelemetryDecode::Applied {
                coordinates,
                adjustment,
                entered_code,
            } => {
                // One write for the message and the fix so readers see both or neither
                entry
                    .apply_frame(tokens, coordinates.clone(), adjustment, entered_code)
                    .await;
                tracing::info!(
                    locator_id = %locator_id,
                    lat = %coordinates.lat,
                    lng = %coordinates.lng,
                    adjustment = %adjustment,
                    entered_code = %entered_code,
                    "Locator position updated"
                );
            },
            TelemetryDecode::Degraded { reason } => {
                entry.record_message(tokens).await;
                match reason {
                    DegradeReason::GpsUnavailable => {
                        tracing::info!(locator_id = %locator_id, "GPS not available")
                    },
                    DegradeReason::NonNumeric => tracing::warn!(
                        locator_id = %locator_id,
                        payload = %payload,
                        "Non-numeric lat/lng in payload"
                    ),
                }
            },
            TelemetryDecode::OutOfRange => {
                entry.record_message(tokens).await;
                tracing::warn!(locator_id = %locator_id, "Locator out of range");
            },
            TelemetryDecode::RawOnly => {
                entry.record_message(tokens).await;
                tracing::debug!(locator_id = %locator_id, "Partial frame stored as raw message");
            },
            TelemetryDecode::Blank => {
                tracing::debug!(locator_id = %locator_id, "Blank frame ignored");
            },
        }

        DecodeOutcome::Decoded { locator_id, result }
    }
}
