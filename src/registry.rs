//! In-memory locator registry
//!
//! The registry is built once from configuration and never grows or shrinks.
//! Each entry guards its mutable [`Locator`] state with its own lock so that
//! telemetry delivery and API handlers can touch different locators without
//! contending, and so a reader never sees a half-applied field group.

use crate::config::LocatorConfig;
use crate::error::{BridgeError, Result};
use crate::locator::{Coordinates, DestinationState, Locator, LocatorView};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One registered locator
#[derive(Debug)]
pub struct LocatorEntry {
    id: String,
    inbound_channel: String,
    state: RwLock<Locator>,
}

/// Row served by the message query surface
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSnapshot {
    pub id: String,
    pub topic: String,
    pub message: Vec<String>,
    /// Token 1 of the last message, `None` while the message is too short
    pub lat: Option<String>,
    /// Token 2 of the last message, `None` while the message is too short
    pub lng: Option<String>,
    pub unlock_requested: bool,
}

impl LocatorEntry {
    fn new(config: &LocatorConfig) -> Self {
        Self {
            id: config.id.clone(),
            inbound_channel: config.channel_field.clone(),
            state: RwLock::new(Locator::new(config.code.clone())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn inbound_channel(&self) -> &str {
        &self.inbound_channel
    }

    /// Copy of the full locator state
    pub async fn view(&self) -> LocatorView {
        LocatorView {
            id: self.id.clone(),
            inbound_channel: self.inbound_channel.clone(),
            state: self.state.read().await.clone(),
        }
    }

    pub async fn coordinates(&self) -> Coordinates {
        self.state.read().await.coordinates.clone()
    }

    pub async fn destination(&self) -> DestinationState {
        self.state.read().await.destination
    }

    pub async fn record_message(&self, tokens: Vec<String>) {
        self.state.write().await.last_message = tokens;
    }

    pub async fn set_display_code(&self, code: impl Into<String>) {
        self.state.write().await.display_code = code.into();
    }

    pub async fn set_adjustment(&self, adjustment: impl Into<String>) {
        self.state.write().await.adjustment = adjustment.into();
    }

    pub async fn set_entered_code(&self, code: impl Into<String>) {
        self.state.write().await.entered_code = code.into();
    }

    pub async fn set_coordinates(&self, coordinates: Coordinates) {
        self.state.write().await.coordinates = coordinates;
    }

    pub async fn set_destination(&self, lat: f64, lng: f64) {
        self.state.write().await.destination = DestinationState {
            lat: Some(lat),
            lng: Some(lng),
        };
    }

    pub async fn set_unlock_requested(&self, requested: bool) {
        self.state.write().await.unlock_requested = requested;
    }

    /// Store a complete telemetry frame and the fix it carries under one write
    pub async fn apply_frame(
        &self,
        tokens: Vec<String>,
        coordinates: Coordinates,
        adjustment: &str,
        entered_code: &str,
    ) {
        let mut state = self.state.write().await;
        state.last_message = tokens;
        state.coordinates = coordinates;
        state.adjustment = adjustment.to_string();
        state.entered_code = entered_code.to_string();
    }

    /// Store an operator command: new display code plus destination
    pub async fn assign_destination(&self, code: &str, lat: f64, lng: f64) {
        let mut state = self.state.write().await;
        state.display_code = code.to_string();
        state.destination = DestinationState {
            lat: Some(lat),
            lng: Some(lng),
        };
    }

    async fn message_snapshot(&self) -> Option<MessageSnapshot> {
        let state = self.state.read().await;
        if !state.has_reported() {
            return None;
        }
        Some(MessageSnapshot {
            id: self.id.clone(),
            topic: self.inbound_channel.clone(),
            message: state.last_message.clone(),
            lat: state.last_message.get(1).cloned(),
            lng: state.last_message.get(2).cloned(),
            unlock_requested: state.unlock_requested,
        })
    }
}

/// Fixed-size collection of all known locators
#[derive(Debug)]
pub struct LocatorRegistry {
    entries: Vec<LocatorEntry>,
    by_id: HashMap<String, usize>,
    by_channel: HashMap<String, usize>,
}

impl LocatorRegistry {
    /// Build the registry, rejecting duplicate ids and duplicate inbound channels
    pub fn new(configs: &[LocatorConfig]) -> Result<Self> {
        let mut entries = Vec::with_capacity(configs.len());
        let mut by_id = HashMap::new();
        let mut by_channel = HashMap::new();

        for (index, config) in configs.iter().enumerate() {
            if by_id.insert(config.id.clone(), index).is_some() {
                return Err(BridgeError::DuplicateLocator(config.id.clone()));
            }
            if by_channel
                .insert(config.channel_field.clone(), index)
                .is_some()
            {
                return Err(BridgeError::DuplicateChannel(config.channel_field.clone()));
            }
            entries.push(LocatorEntry::new(config));
        }

        crate::log_registry_operation!("registry_built", entries.len());

        Ok(Self {
            entries,
            by_id,
            by_channel,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a locator by id. Absence is a normal outcome.
    pub fn find_by_id(&self, id: &str) -> Option<&LocatorEntry> {
        self.by_id.get(id).map(|&index| &self.entries[index])
    }

    /// Look up the locator that listens on the given inbound channel field
    pub fn find_by_channel(&self, channel: &str) -> Option<&LocatorEntry> {
        self.by_channel.get(channel).map(|&index| &self.entries[index])
    }

    /// Ids in registration order
    pub fn list_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LocatorEntry> {
        self.entries.iter()
    }

    /// Message rows for every locator that has reported at least once
    pub async fn snapshot_for_query(&self) -> Vec<MessageSnapshot> {
        let mut rows = Vec::new();
        for entry in &self.entries {
            if let Some(row) = entry.message_snapshot().await {
                rows.push(row);
            }
        }
        rows
    }
}
