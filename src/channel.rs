//! MQTT channel lifecycle
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!      ^              |             |
//!      +--------------+-------------+   (connection error, retry after a fixed delay)
//! ```
//!
//! The event loop is driven by [`ChannelManager::run`], which never returns.
//! Every successful CONNACK re-subscribes the locator telemetry topics, and
//! every inbound PUBLISH is handed to the [`TelemetryDecoder`].

use crate::config::BridgeConfig;
use crate::telemetry::TelemetryDecoder;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;

/// Capacity of the request queue between clients and the event loop
const REQUEST_CAPACITY: usize = 32;
const FALLBACK_CLIENT_ID: &str = "locator-bridge";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Current state plus when it was entered
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ChannelStatus {
    pub state: ChannelState,
    pub since: DateTime<Utc>,
}

/// Owns the MQTT connection to the relay
pub struct ChannelManager {
    options: MqttOptions,
    topics: Vec<String>,
    retry_interval: Duration,
    decoder: TelemetryDecoder,
    client: RwLock<Option<AsyncClient>>,
    status: RwLock<ChannelStatus>,
}

impl ChannelManager {
    pub fn new(config: &BridgeConfig, decoder: TelemetryDecoder) -> Self {
        Self {
            options: mqtt_options(config),
            topics: config.subscribe_topics(),
            retry_interval: config.retry_interval(),
            decoder,
            client: RwLock::new(None),
            status: RwLock::new(ChannelStatus {
                state: ChannelState::Disconnected,
                since: Utc::now(),
            }),
        }
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub async fn status(&self) -> ChannelStatus {
        *self.status.read().await
    }

    pub async fn state(&self) -> ChannelState {
        self.status.read().await.state
    }

    async fn transition(&self, state: ChannelState) {
        let mut status = self.status.write().await;
        if status.state != state {
            tracing::info!(from = %status.state, to = %state, "Channel state changed");
            *status = ChannelStatus {
                state,
                since: Utc::now(),
            };
        }
    }

    /// Create the client without polling it; publishes queue until `run` drives it
    pub async fn attach(&self) -> EventLoop {
        let (client, eventloop) = AsyncClient::new(self.options.clone(), REQUEST_CAPACITY);
        *self.client.write().await = Some(client);
        eventloop
    }

    /// Connect and drive the event loop forever, retrying failed connections
    /// after a fixed delay
    pub async fn run(&self) {
        let (host, port) = self.options.broker_address();
        tracing::info!(
            host = %host,
            port,
            topics = self.topics.len(),
            "Starting MQTT channel"
        );
        let mut eventloop = self.attach().await;
        self.transition(ChannelState::Connecting).await;

        loop {
            match eventloop.poll().await {
                Ok(event) => self.handle_event(event).await,
                Err(e) => {
                    tracing::error!(error = %e, "MQTT connection error");
                    self.transition(ChannelState::Disconnected).await;
                    tracing::info!(
                        "Retrying MQTT connection in {}s",
                        self.retry_interval.as_secs()
                    );
                    tokio::time::sleep(self.retry_interval).await;
                    // The next poll reconnects
                    self.transition(ChannelState::Connecting).await;
                },
            }
        }
    }

    /// React to one event from the transport
    pub async fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    tracing::info!("Connected to MQTT broker");
                    self.transition(ChannelState::Connected).await;
                    self.subscribe_all().await;
                } else {
                    tracing::error!(code = ?ack.code, "MQTT broker refused connection");
                    self.transition(ChannelState::Disconnected).await;
                }
            },
            Event::Incoming(Packet::Publish(publish)) => {
                let payload = String::from_utf8_lossy(&publish.payload);
                self.decoder.handle(&publish.topic, &payload).await;
            },
            Event::Incoming(Packet::Disconnect) => {
                tracing::warn!("Broker closed the MQTT session");
                self.transition(ChannelState::Disconnected).await;
            },
            Event::Incoming(packet) => tracing::trace!(?packet, "MQTT incoming"),
            Event::Outgoing(outgoing) => tracing::trace!(?outgoing, "MQTT outgoing"),
        }
    }

    async fn subscribe_all(&self) {
        let client = self.client.read().await;
        let Some(client) = client.as_ref() else {
            return;
        };
        for topic in &self.topics {
            tracing::info!(topic = %topic, "Subscribing");
            // Non-blocking: this runs on the task that drains the request queue
            match client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                Ok(()) => tracing::info!(topic = %topic, "Subscribed"),
                Err(e) => tracing::error!(topic = %topic, error = %e, "Subscribe failed"),
            }
        }
    }

    /// Publish a command frame. Returns whether the transport accepted it;
    /// failures are logged, never raised.
    pub async fn publish(&self, topic: &str, payload: &str) -> bool {
        let client = self.client.read().await;
        let Some(client) = client.as_ref() else {
            tracing::warn!(topic = %topic, "MQTT client not initialized, dropping publish");
            return false;
        };
        match client.try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec()) {
            Ok(()) => {
                tracing::info!(topic = %topic, payload = %payload, "Published command");
                true
            },
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Publish failed");
                false
            },
        }
    }

    /// Clean MQTT disconnect, used on shutdown
    pub async fn disconnect(&self) {
        let client = self.client.read().await;
        if let Some(client) = client.as_ref() {
            tracing::info!("Disconnecting MQTT client");
            if let Err(e) = client.try_disconnect() {
                tracing::warn!(error = %e, "MQTT disconnect failed");
            }
        }
        drop(client);
        self.transition(ChannelState::Disconnected).await;
    }
}

fn mqtt_options(config: &BridgeConfig) -> MqttOptions {
    let broker = &config.broker;
    let client_id = match broker.client_id.trim() {
        "" => FALLBACK_CLIENT_ID.to_string(),
        id => id.to_string(),
    };

    let mut options = MqttOptions::new(client_id, broker.host.clone(), broker.port);
    options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs.max(5)));
    options.set_clean_session(broker.clean_session);
    let username = broker.effective_username();
    if !username.is_empty() {
        options.set_credentials(username, broker.password.clone());
    }
    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LocatorRegistry;
    use rumqttc::{ConnAck, Publish};
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;

    fn manager_for(config: &BridgeConfig) -> (ChannelManager, Arc<LocatorRegistry>) {
        let registry = Arc::new(LocatorRegistry::new(&config.locators).unwrap());
        let decoder = TelemetryDecoder::new(Arc::clone(&registry));
        (ChannelManager::new(config, decoder), registry)
    }

    fn manager() -> (ChannelManager, Arc<LocatorRegistry>) {
        manager_for(&BridgeConfig::default())
    }

    /// Config pointing at a local listener with a one second retry interval
    fn local_config(port: u16) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.broker.host = "127.0.0.1".into();
        config.broker.port = port;
        config.retry_interval_secs = 1;
        config
    }

    /// Read one MQTT control packet: (packet type, variable header + payload)
    async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(u8, Vec<u8>)> {
        let header = stream.read_u8().await?;
        let mut len = 0usize;
        let mut multiplier = 1usize;
        loop {
            let byte = stream.read_u8().await?;
            len += (byte & 0x7f) as usize * multiplier;
            if byte & 0x80 == 0 {
                break;
            }
            multiplier *= 128;
        }
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;
        Ok((header >> 4, body))
    }

    /// Topic filters of a SUBSCRIBE body
    fn subscribe_filters(body: &[u8]) -> Vec<String> {
        let mut filters = Vec::new();
        let mut at = 2; // packet id
        while at + 2 <= body.len() {
            let len = u16::from_be_bytes([body[at], body[at + 1]]) as usize;
            let start = at + 2;
            filters.push(String::from_utf8_lossy(&body[start..start + len]).into_owned());
            at = start + len + 1; // requested QoS
        }
        filters
    }

    #[test]
    fn test_options_from_config() {
        let mut config = BridgeConfig::default();
        config.broker.client_id = "client-1".into();
        let options = mqtt_options(&config);
        assert_eq!(options.client_id(), "client-1");
        assert_eq!(
            options.broker_address(),
            ("mqtt3.thingspeak.com".to_string(), 1883)
        );
        assert!(!options.clean_session());
    }

    #[test]
    fn test_options_fallback_client_id() {
        let options = mqtt_options(&BridgeConfig::default());
        assert_eq!(options.client_id(), FALLBACK_CLIENT_ID);
    }

    #[tokio::test]
    async fn test_starts_disconnected() {
        let (manager, _) = manager();
        assert_eq!(manager.state().await, ChannelState::Disconnected);
        assert_eq!(manager.topics().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_before_init_fails_soft() {
        let (manager, _) = manager();
        assert!(!manager.publish("channels/1/publish/fields/field1", "1 2 3").await);
    }

    #[tokio::test]
    async fn test_publish_is_queued_once_attached() {
        let (manager, _) = manager();
        let _eventloop = manager.attach().await;
        assert!(
            manager
                .publish("channels/3038672/publish/fields/field1", "42 10.500000 -79.250000")
                .await
        );
    }

    #[tokio::test]
    async fn test_publish_fails_when_event_loop_is_gone() {
        let (manager, _) = manager();
        drop(manager.attach().await);
        assert!(!manager.publish("channels/1/publish/fields/field1", "x").await);
    }

    #[tokio::test]
    async fn test_connack_transitions_to_connected() {
        let (manager, _) = manager();
        let _eventloop = manager.attach().await;
        manager
            .handle_event(Event::Incoming(Packet::ConnAck(ConnAck::new(
                ConnectReturnCode::Success,
                false,
            ))))
            .await;
        assert_eq!(manager.state().await, ChannelState::Connected);
    }

    #[tokio::test]
    async fn test_refused_connack_stays_disconnected() {
        let (manager, _) = manager();
        manager
            .handle_event(Event::Incoming(Packet::ConnAck(ConnAck::new(
                ConnectReturnCode::NotAuthorized,
                false,
            ))))
            .await;
        assert_eq!(manager.state().await, ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn test_inbound_publish_reaches_registry() {
        let (manager, registry) = manager();
        let publish = Publish::new(
            "channels/2983140/subscribe/fields/field2",
            QoS::AtMostOnce,
            "5 10.123456 -79.654321 1 9999",
        );
        manager
            .handle_event(Event::Incoming(Packet::Publish(publish)))
            .await;

        let coordinates = registry.find_by_id("2").unwrap().coordinates().await;
        assert_eq!(coordinates.lat, "10.123456");
        assert_eq!(coordinates.lng, "-79.654321");
    }

    #[tokio::test]
    async fn test_disconnect_marks_state() {
        let (manager, _) = manager();
        let _eventloop = manager.attach().await;
        manager.transition(ChannelState::Connected).await;
        manager.disconnect().await;
        assert_eq!(manager.state().await, ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn test_run_retries_failed_connections() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&attempts);
        let broker = tokio::spawn(async move {
            // Accept and hang up straight away
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        let (manager, _) = manager_for(&local_config(port));
        let manager = Arc::new(manager);
        let runner = Arc::clone(&manager);
        let channel = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(3500)).await;
        channel.abort();
        broker.abort();

        let attempts = attempts.load(Ordering::SeqCst);
        assert!(attempts >= 3, "expected at least 3 connect attempts, got {attempts}");
        assert_ne!(manager.state().await, ChannelState::Connected);
    }

    #[tokio::test]
    async fn test_run_subscribes_every_topic_on_each_connack() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = local_config(port);
        let expected: BTreeSet<String> = config.subscribe_topics().into_iter().collect();

        let (sessions_tx, mut sessions_rx) = mpsc::unbounded_channel();
        let wanted = expected.len();
        let broker = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let (kind, _) = read_packet(&mut stream).await.unwrap();
                assert_eq!(kind, 1, "first packet must be CONNECT");
                // CONNACK, no session present, accepted
                stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await.unwrap();

                let mut topics = BTreeSet::new();
                while topics.len() < wanted {
                    let (kind, body) = read_packet(&mut stream).await.unwrap();
                    if kind == 8 {
                        topics.extend(subscribe_filters(&body));
                    }
                }
                sessions_tx.send(topics).unwrap();
                // Hang up to force a reconnect
                drop(stream);
            }
        });

        let (manager, _) = manager_for(&config);
        let manager = Arc::new(manager);
        let runner = Arc::clone(&manager);
        let channel = tokio::spawn(async move { runner.run().await });

        for session in 0..2 {
            let topics = tokio::time::timeout(Duration::from_secs(10), sessions_rx.recv())
                .await
                .unwrap_or_else(|_| panic!("no subscriptions in session {session}"))
                .unwrap();
            assert_eq!(topics, expected, "session {session}");
        }

        channel.abort();
        broker.abort();
    }
}
