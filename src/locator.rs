//! Locator state model
//!
//! A [`Locator`] is the in-memory record of one physical GPS device. Its
//! `id` and inbound channel are fixed when the registry is built; every
//! other field is mutated in place by telemetry or by operator commands.

use serde::{Deserialize, Serialize};

/// Position served for a locator that has never reported a GPS fix
pub const DEFAULT_LATITUDE: &str = "-2.0528875";
pub const DEFAULT_LONGITUDE: &str = "-79.9351418";

/// Adjustment tokens the firmware and operators use for "strap adjusted"
const TRUTHY_ADJUSTMENT: &[&str] = &["1", "true", "sí", "si"];

/// Last known position, kept as the decimal strings the device sent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: String,
    pub lng: String,
}

impl Coordinates {
    pub fn new(lat: impl Into<String>, lng: impl Into<String>) -> Self {
        Self {
            lat: lat.into(),
            lng: lng.into(),
        }
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Self::new(DEFAULT_LATITUDE, DEFAULT_LONGITUDE)
    }
}

/// Operator-assigned destination. Both halves are `None` until first set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DestinationState {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Whether a raw adjustment token reads as "adjusted"
pub fn is_truthy_adjustment(raw: &str) -> bool {
    let lowered = raw.trim().to_lowercase();
    TRUTHY_ADJUSTMENT.contains(&lowered.as_str())
}

/// Mutable state of one locator
#[derive(Debug, Clone, PartialEq)]
pub struct Locator {
    pub display_code: String,
    pub last_message: Vec<String>,
    /// Raw adjustment token as reported by the device
    pub adjustment: String,
    pub entered_code: String,
    pub coordinates: Coordinates,
    pub unlock_requested: bool,
    pub destination: DestinationState,
}

impl Locator {
    pub fn new(display_code: impl Into<String>) -> Self {
        Self {
            display_code: display_code.into(),
            last_message: Vec::new(),
            adjustment: "false".to_string(),
            entered_code: String::new(),
            coordinates: Coordinates::default(),
            unlock_requested: false,
            destination: DestinationState::default(),
        }
    }

    pub fn is_adjusted(&self) -> bool {
        is_truthy_adjustment(&self.adjustment)
    }

    pub fn has_reported(&self) -> bool {
        !self.last_message.is_empty()
    }
}

/// Owned copy of a locator, handed to readers outside the registry lock
#[derive(Debug, Clone, PartialEq)]
pub struct LocatorView {
    pub id: String,
    pub inbound_channel: String,
    pub state: Locator,
}

impl LocatorView {
    pub fn is_adjusted(&self) -> bool {
        self.state.is_adjusted()
    }
}
