use async_nats::Client;
use futures::stream::StreamExt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::messages::{ChannelEvent, ClientMessage, EventKind};
use super::registry::{EventHandler, HandlerRegistry, SubscriptionId};
use super::DuplexChannel;
use crate::error::ChannelError;

/// Subject naming for one user's traffic
#[derive(Debug, Clone)]
pub struct Subjects {
    /// Outbound voice payloads go to `<input_prefix>.<user_id>`
    pub input_prefix: String,
    /// Backend events arrive on `<event_prefix>.<user_id>`
    pub event_prefix: String,
}

impl Default for Subjects {
    fn default() -> Self {
        Self {
            input_prefix: "voice.input".to_string(),
            event_prefix: "voice.events".to_string(),
        }
    }
}

impl Subjects {
    pub fn input(&self, user_id: &str) -> String {
        format!("{}.{}", self.input_prefix, user_id)
    }

    pub fn events(&self, user_id: &str) -> String {
        format!("{}.{}", self.event_prefix, user_id)
    }
}

struct Connection {
    user_id: String,
    client: Client,
    dispatcher: JoinHandle<()>,
}

/// Duplex channel over NATS: publish voice payloads, subscribe to events
pub struct NatsChannel {
    url: String,
    subjects: Subjects,
    registry: Arc<HandlerRegistry>,
    connection: StdMutex<Option<Connection>>,
    connect_lock: Mutex<()>,
}

impl NatsChannel {
    pub fn new(url: impl Into<String>, subjects: Subjects) -> Self {
        Self {
            url: url.into(),
            subjects,
            registry: Arc::new(HandlerRegistry::new()),
            connection: StdMutex::new(None),
            connect_lock: Mutex::new(()),
        }
    }

    /// The identity the channel is connected for, if any
    pub fn user_id(&self) -> Option<String> {
        self.lock_connection()
            .as_ref()
            .map(|connection| connection.user_id.clone())
    }

    /// Tear down the connection. Only the process owner should call this;
    /// orchestrators share the channel and never close it.
    pub async fn close(&self) {
        let connection = self.lock_connection().take();
        if let Some(connection) = connection {
            info!("Closing NATS connection for {}", connection.user_id);
            connection.dispatcher.abort();
            if let Err(e) = connection.client.flush().await {
                warn!("Failed to flush NATS connection: {}", e);
            }
        }
    }

    fn lock_connection(&self) -> std::sync::MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self) -> Option<(String, Client)> {
        self.lock_connection()
            .as_ref()
            .map(|connection| (connection.user_id.clone(), connection.client.clone()))
    }
}

#[async_trait::async_trait]
impl DuplexChannel for NatsChannel {
    async fn connect(&self, user_id: &str) -> Result<(), ChannelError> {
        let _guard = self.connect_lock.lock().await;

        if self.user_id().as_deref() == Some(user_id) {
            return Ok(());
        }

        info!("Connecting to NATS at {} as {}", self.url, user_id);

        let client = async_nats::connect(self.url.as_str())
            .await
            .map_err(|e| ChannelError::Connect {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        let subject = self.subjects.events(user_id);
        let mut subscriber =
            client
                .subscribe(subject.clone())
                .await
                .map_err(|e| ChannelError::Subscribe {
                    subject: subject.clone(),
                    reason: e.to_string(),
                })?;

        info!("Subscribed to {}", subject);

        let registry = Arc::clone(&self.registry);
        let dispatcher = tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<ChannelEvent>(&msg.payload) {
                    Ok(event) => {
                        info!("Received {} event", event.kind());
                        registry.dispatch(&event);
                    }
                    Err(e) => {
                        warn!("Dropping unrecognized message on {}: {}", msg.subject, e);
                    }
                }
            }

            info!("Event subscription closed");
        });

        let previous = self.lock_connection().replace(Connection {
            user_id: user_id.to_string(),
            client,
            dispatcher,
        });
        if let Some(previous) = previous {
            info!("Replacing connection for {}", previous.user_id);
            previous.dispatcher.abort();
        }

        info!("Connected to NATS successfully");

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock_connection().as_ref().is_some_and(|connection| {
            connection.client.connection_state() == async_nats::connection::State::Connected
        })
    }

    fn on(&self, kind: EventKind, handler: EventHandler) -> SubscriptionId {
        self.registry.on(kind, handler)
    }

    fn off(&self, id: SubscriptionId) {
        self.registry.off(id)
    }

    fn off_all(&self) {
        self.registry.off_all()
    }

    async fn send_voice_payload(&self, audio: &str, format: &str, sample_rate: u32) {
        let Some((user_id, client)) = self.client() else {
            warn!("Dropping voice payload: channel is not connected");
            return;
        };

        let message = ClientMessage::VoiceInput {
            audio: audio.to_string(),
            format: format.to_string(),
            sample_rate,
        };

        let payload = match serde_json::to_vec(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize voice payload: {}", e);
                return;
            }
        };

        let subject = self.subjects.input(&user_id);
        let bytes = payload.len();

        match client.publish(subject.clone(), payload.into()).await {
            Ok(()) => info!(
                "Published voice payload to {} ({} bytes, {}, {} Hz)",
                subject, bytes, format, sample_rate
            ),
            Err(e) => error!("Failed to publish voice payload: {}", e),
        }
    }
}
