//! Broker connection management
//!
//! A connection is opened per "connect" press and lives in its own task
//! driving the MQTT event loop. Everything the task learns (connected,
//! subscribed, failed, message) goes back to the component as a [`UiEvent`]
//! tagged with the session number, so results from a replaced connection
//! can be told apart.
//!
//! There is no reconnection: the first transport error ends the session.

use chrono::Utc;
use posecube_core::UiEvent;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode,
    Transport,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capacity of the client request channel
const REQUEST_CAPACITY: usize = 10;

/// How long a closing session may take to flush its DISCONNECT
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Invalid broker URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// A live broker connection
pub trait BrokerSession: Send {
    /// Close the connection. Further events from it are not delivered.
    fn end(&mut self);
}

/// Opens broker connections
pub trait BrokerConnector: Send + Sync {
    /// Open a connection to `url`, subscribing to `topic` once connected.
    ///
    /// Only problems detectable up front (an unusable URL) are returned as
    /// errors; everything later arrives on `events`.
    fn open(
        &self,
        session: u64,
        url: &str,
        topic: Option<&str>,
        events: mpsc::Sender<UiEvent>,
    ) -> Result<Box<dyn BrokerSession>, BrokerError>;
}

/// MQTT 3.1.1 connector backed by rumqttc
pub struct MqttConnector {
    keep_alive: Duration,
}

impl MqttConnector {
    pub fn new(keep_alive: Duration) -> Self {
        Self { keep_alive }
    }
}

impl BrokerConnector for MqttConnector {
    fn open(
        &self,
        session: u64,
        url: &str,
        topic: Option<&str>,
        events: mpsc::Sender<UiEvent>,
    ) -> Result<Box<dyn BrokerSession>, BrokerError> {
        let mut options = mqtt_options(url)?;
        options.set_keep_alive(self.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let task = tokio::spawn(run_session(
            session,
            client.clone(),
            eventloop,
            topic.map(str::to_string),
            events,
        ));

        Ok(Box::new(MqttSession {
            session,
            client,
            task: Some(task),
        }))
    }
}

struct MqttSession {
    session: u64,
    client: AsyncClient,
    task: Option<JoinHandle<()>>,
}

impl BrokerSession for MqttSession {
    fn end(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        info!(session = self.session, "Closing broker connection");
        if let Err(e) = self.client.try_disconnect() {
            debug!(session = self.session, error = %e, "Disconnect request not queued");
            task.abort();
            return;
        }
        // Let the event loop flush the DISCONNECT, then make sure it is gone
        tokio::spawn(async move {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                task.abort();
            }
        });
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Drive one connection until it fails, is closed, or nobody listens
async fn run_session(
    session: u64,
    client: AsyncClient,
    mut eventloop: EventLoop,
    topic: Option<String>,
    events: mpsc::Sender<UiEvent>,
) {
    loop {
        let event = match eventloop.poll().await {
            Ok(event) => event,
            Err(e) => {
                warn!(session, error = %e, "Broker connection error");
                let _ = events
                    .send(UiEvent::BrokerFailed {
                        session,
                        reason: e.to_string(),
                    })
                    .await;
                break;
            }
        };

        let forwarded = match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                if events.send(UiEvent::BrokerConnected { session }).await.is_err() {
                    break;
                }
                if let Some(topic) = &topic {
                    if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                        warn!(session, topic = %topic, error = %e, "Failed to subscribe");
                        let _ = events
                            .send(UiEvent::BrokerFailed {
                                session,
                                reason: format!("Failed to subscribe to {}: {}", topic, e),
                            })
                            .await;
                        break;
                    }
                }
                Ok(())
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                let Some(topic) = &topic else { continue };
                if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    warn!(session, topic = %topic, "Broker rejected subscription");
                    let _ = events
                        .send(UiEvent::BrokerFailed {
                            session,
                            reason: format!("Failed to subscribe to {}", topic),
                        })
                        .await;
                    break;
                }
                events
                    .send(UiEvent::BrokerSubscribed {
                        session,
                        topic: topic.clone(),
                    })
                    .await
            }
            Event::Incoming(Packet::Publish(publish)) => {
                debug!(session, topic = %publish.topic, bytes = publish.payload.len(), "Message received");
                events
                    .send(UiEvent::MessageReceived {
                        session,
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                        received_at: Utc::now(),
                    })
                    .await
            }
            Event::Outgoing(Outgoing::Disconnect) => {
                debug!(session, "Disconnect sent");
                break;
            }
            _ => Ok(()),
        };

        if forwarded.is_err() {
            debug!(session, "Component gone, stopping broker session");
            break;
        }
    }
}

/// Build client options from a broker URL.
///
/// `mqtt://`, `tcp://`, `mqtts://` and `ssl://` go through rumqttc's URL
/// parser; `ws://` and `wss://` keep the full URL as the websocket endpoint.
/// A client id is generated when the URL does not carry one.
pub fn mqtt_options(url: &str) -> Result<MqttOptions, BrokerError> {
    let url = url.trim();
    if url.starts_with("ws://") || url.starts_with("wss://") {
        return websocket_options(url);
    }

    MqttOptions::parse_url(with_client_id(url)).map_err(|e| BrokerError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn websocket_options(url: &str) -> Result<MqttOptions, BrokerError> {
    let secure = url.starts_with("wss://");
    let rest = url.split_once("://").map(|(_, rest)| rest).unwrap_or_default();
    let authority = rest.split(|c: char| c == '/' || c == '?').next().unwrap_or_default();
    if authority.is_empty() {
        return Err(BrokerError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        });
    }

    let port = match authority.rsplit_once(':') {
        Some((_, port)) => port.parse::<u16>().map_err(|_| BrokerError::InvalidUrl {
            url: url.to_string(),
            reason: format!("invalid port '{}'", port),
        })?,
        None if secure => 443,
        None => 80,
    };

    let mut options = MqttOptions::new(generate_client_id(), url, port);
    if secure {
        options.set_transport(Transport::wss_with_default_config());
    } else {
        options.set_transport(Transport::Ws);
    }
    Ok(options)
}

fn with_client_id(url: &str) -> String {
    if url.contains("client_id=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}client_id={}", url, separator, generate_client_id())
}

fn generate_client_id() -> String {
    format!("posecube-{}", Uuid::new_v4().simple())
}
