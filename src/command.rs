//! Outbound command frames
//!
//! The locator firmware reads space-separated ASCII frames with coordinates in
//! fixed six-decimal notation. Everything here is pure formatting.

use crate::error::{BridgeError, Result};
use crate::locator::LocatorView;
use serde::Serialize;

/// A validated operator destination
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Destination {
    pub lat: f64,
    pub lng: f64,
}

impl Destination {
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)) {
            return Err(BridgeError::Validation("lat/lng out of range".into()));
        }
        Ok(Self { lat, lng })
    }
}

/// Command path frame: `<code> <lat> <lng>`
pub fn encode_destination(code: &str, destination: &Destination) -> String {
    format!("{} {:.6} {:.6}", code, destination.lat, destination.lng)
}

/// Device status frame: `<code> <lat> <lng> <adjustment> ` (trailing space kept)
///
/// Uses the stored destination (0.0 for an unset half) and the stored display
/// code unless `code_override` is given.
pub fn encode_status_frame(view: &LocatorView, code_override: Option<&str>) -> String {
    let lat = view.state.destination.lat.unwrap_or(0.0);
    let lng = view.state.destination.lng.unwrap_or(0.0);
    let adjustment = if view.is_adjusted() { 1 } else { 0 };
    let code = code_override.unwrap_or(&view.state.display_code);
    format!("{} {:.6} {:.6} {} ", code, lat, lng, adjustment)
}

/// Topic the locators read commands from
pub fn command_topic(channel_id: &str, field: &str) -> String {
    format!("channels/{}/publish/fields/{}", channel_id, field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::{DestinationState, Locator};

    fn view(adjustment: &str, destination: DestinationState) -> LocatorView {
        let mut state = Locator::new("1234");
        state.adjustment = adjustment.to_string();
        state.destination = destination;
        LocatorView {
            id: "1".into(),
            inbound_channel: "field1".into(),
            state,
        }
    }

    #[test]
    fn test_encode_destination_exact_bytes() {
        let destination = Destination::new(10.5, -79.25).unwrap();
        assert_eq!(
            encode_destination("42", &destination),
            "42 10.500000 -79.250000"
        );
    }

    #[test]
    fn test_encode_destination_never_scientific() {
        let destination = Destination::new(0.0000001, 179.9999999).unwrap();
        assert_eq!(
            encode_destination("7", &destination),
            "7 0.000000 180.000000"
        );
    }

    #[test]
    fn test_destination_range_checks() {
        assert!(Destination::new(90.0, 180.0).is_ok());
        assert!(Destination::new(-90.0, -180.0).is_ok());
        assert!(Destination::new(90.1, 0.0).is_err());
        assert!(Destination::new(0.0, -180.5).is_err());
        assert!(Destination::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_status_frame_uses_stored_state() {
        let v = view(
            "1",
            DestinationState {
                lat: Some(-2.1),
                lng: Some(-79.9),
            },
        );
        assert_eq!(encode_status_frame(&v, None), "1234 -2.100000 -79.900000 1 ");
    }

    #[test]
    fn test_status_frame_override_and_unset_destination() {
        let v = view("no", DestinationState::default());
        assert_eq!(
            encode_status_frame(&v, Some("9")),
            "9 0.000000 0.000000 0 "
        );
    }

    #[test]
    fn test_command_topic() {
        assert_eq!(
            command_topic("3038672", "field1"),
            "channels/3038672/publish/fields/field1"
        );
    }
}
