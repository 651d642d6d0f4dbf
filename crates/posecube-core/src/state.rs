//! Broker interface state machine
//!
//! [`ViewState`] holds everything the page shows. Every user action, timer
//! tick and broker/HTTP result arrives as a [`UiEvent`]; [`ViewState::apply`]
//! updates the state and returns the [`Effect`]s the host must carry out
//! (open or close a connection, start or stop the timer, fetch a hotspot
//! message). The state itself never touches the network or the clock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::payload::decode_transform;
use crate::transform::{Transform, TransformField};

/// Tabs in the floating panel next to the cube
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    /// Remote transformation editor
    Transform,
    /// Random message hotspot
    Hotspot,
}

/// Broker connection as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting { url: String },
    Connected { url: String },
    Subscribed { url: String, topic: String },
    Failed { reason: String },
}

/// Animation loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Animation {
    #[default]
    Idle,
    /// Timer running; ticks carrying another generation are stale
    Running { generation: u64 },
}

/// Everything that can happen to the component
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Broker URL text field edited
    SetBrokerUrl(String),
    /// Topic text field edited
    SetTopic(String),
    /// "Connect to Broker" pressed
    Connect,
    /// Broker accepted the connection
    BrokerConnected { session: u64 },
    /// Subscription to the topic was acknowledged
    BrokerSubscribed { session: u64, topic: String },
    /// Connection or subscription failed; the session is over
    BrokerFailed { session: u64, reason: String },
    /// Message published on the subscribed topic
    MessageReceived {
        session: u64,
        topic: String,
        payload: Vec<u8>,
        received_at: DateTime<Utc>,
    },
    /// Text typed into one of the nine numeric inputs
    FieldInput { field: TransformField, text: String },
    /// "Apply Transformations" pressed
    Apply,
    /// Animation timer fired
    Tick { generation: u64 },
    /// "Reset Transformations" pressed
    Reset,
    /// Pointer entered the cube
    ShowTabs,
    /// Tabs panel close button
    CloseTabs,
    SelectTab(Tab),
    /// Hotspot pin clicked
    HotspotClicked,
    HotspotLoaded { request: u64, message: String },
    HotspotFailed { request: u64, reason: String },
    /// Component torn down
    Unmount,
}

/// Side effects requested by the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open a broker connection, subscribing to `topic` once connected
    OpenConnection {
        session: u64,
        url: String,
        topic: Option<String>,
    },
    /// Close a broker connection
    CloseConnection { session: u64 },
    /// Start the periodic animation timer
    StartAnimation { generation: u64 },
    /// Cancel the animation timer
    StopAnimation,
    /// Issue one hotspot GET request
    FetchHotspot { request: u64 },
}

/// Component state
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    pub broker_url: String,
    pub topic: String,
    pub connection: ConnectionStatus,
    pub transform: Transform,
    pub animation: Animation,
    /// Cube panel shown
    pub display_visible: bool,
    /// Floating tabs panel shown
    pub tabs_visible: bool,
    pub selected_tab: Option<Tab>,
    pub hotspot_message: Option<String>,
    pub hotspot_error: Option<String>,
    pub messages_applied: u64,
    pub messages_rejected: u64,
    pub last_message_at: Option<DateTime<Utc>>,
    active_session: Option<u64>,
    next_session: u64,
    next_generation: u64,
    pending_hotspot: Option<u64>,
    next_request: u64,
    unmounted: bool,
}

/// Serializable view of the state, pushed to the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub broker_url: String,
    pub topic: String,
    pub connection: ConnectionStatus,
    pub transform: Transform,
    pub transform_css: String,
    pub animating: bool,
    pub display_visible: bool,
    pub tabs_visible: bool,
    pub selected_tab: Option<Tab>,
    pub hotspot_message: Option<String>,
    pub hotspot_error: Option<String>,
    pub messages_applied: u64,
    pub messages_rejected: u64,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ViewState {
    /// Fresh state with the broker fields pre-filled
    pub fn new(broker_url: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            topic: topic.into(),
            ..Self::default()
        }
    }

    pub fn is_animating(&self) -> bool {
        matches!(self.animation, Animation::Running { .. })
    }

    pub fn is_unmounted(&self) -> bool {
        self.unmounted
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            broker_url: self.broker_url.clone(),
            topic: self.topic.clone(),
            connection: self.connection.clone(),
            transform: self.transform,
            transform_css: self.transform.to_css(),
            animating: self.is_animating(),
            display_visible: self.display_visible,
            tabs_visible: self.tabs_visible,
            selected_tab: self.selected_tab,
            hotspot_message: self.hotspot_message.clone(),
            hotspot_error: self.hotspot_error.clone(),
            messages_applied: self.messages_applied,
            messages_rejected: self.messages_rejected,
            last_message_at: self.last_message_at,
        }
    }

    /// Process one event and return the effects to carry out, in order.
    pub fn apply(&mut self, event: UiEvent) -> Vec<Effect> {
        if self.unmounted {
            debug!(?event, "Ignoring event after unmount");
            return Vec::new();
        }

        let effects = match event {
            UiEvent::SetBrokerUrl(url) => {
                self.broker_url = url;
                Vec::new()
            }
            UiEvent::SetTopic(topic) => {
                self.topic = topic;
                Vec::new()
            }
            UiEvent::Connect => self.connect(),
            UiEvent::BrokerConnected { session } => {
                if self.is_current(session) {
                    info!(session, url = %self.broker_url, "Connected to broker");
                    self.connection = ConnectionStatus::Connected {
                        url: self.connection_url(),
                    };
                }
                Vec::new()
            }
            UiEvent::BrokerSubscribed { session, topic } => {
                if self.is_current(session) {
                    info!(session, topic = %topic, "Subscribed to topic");
                    self.connection = ConnectionStatus::Subscribed {
                        url: self.connection_url(),
                        topic,
                    };
                }
                Vec::new()
            }
            UiEvent::BrokerFailed { session, reason } => {
                if self.is_current(session) {
                    warn!(session, reason = %reason, "Broker connection failed");
                    self.connection = ConnectionStatus::Failed { reason };
                }
                Vec::new()
            }
            UiEvent::MessageReceived {
                session,
                topic,
                payload,
                received_at,
            } => {
                if !self.is_current(session) {
                    debug!(session, topic = %topic, "Dropping message from replaced session");
                    return Vec::new();
                }
                match decode_transform(&payload) {
                    Ok(transform) => {
                        debug!(topic = %topic, "Applied pose message");
                        self.transform = transform;
                        self.messages_applied += 1;
                        self.last_message_at = Some(received_at);
                    }
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Error parsing message");
                        self.messages_rejected += 1;
                    }
                }
                Vec::new()
            }
            UiEvent::FieldInput { field, text } => {
                self.transform.apply_input(field, &text);
                Vec::new()
            }
            UiEvent::Apply => {
                self.display_visible = true;
                if self.is_animating() {
                    return Vec::new();
                }
                let generation = self.next_generation;
                self.next_generation += 1;
                self.animation = Animation::Running { generation };
                vec![Effect::StartAnimation { generation }]
            }
            UiEvent::Tick { generation } => {
                match self.animation {
                    Animation::Running { generation: current } if current == generation => {
                        self.transform = self.transform.tick();
                    }
                    _ => debug!(generation, "Ignoring stale tick"),
                }
                Vec::new()
            }
            UiEvent::Reset => {
                self.transform = Transform::default();
                if self.is_animating() {
                    self.animation = Animation::Idle;
                    vec![Effect::StopAnimation]
                } else {
                    Vec::new()
                }
            }
            UiEvent::ShowTabs => {
                if self.display_visible {
                    self.tabs_visible = true;
                }
                Vec::new()
            }
            UiEvent::CloseTabs => {
                self.tabs_visible = false;
                Vec::new()
            }
            UiEvent::SelectTab(tab) => {
                self.selected_tab = Some(tab);
                Vec::new()
            }
            UiEvent::HotspotClicked => {
                let request = self.next_request;
                self.next_request += 1;
                self.pending_hotspot = Some(request);
                vec![Effect::FetchHotspot { request }]
            }
            UiEvent::HotspotLoaded { request, message } => {
                if self.pending_hotspot == Some(request) {
                    self.pending_hotspot = None;
                    self.hotspot_message = Some(message);
                    self.hotspot_error = None;
                }
                Vec::new()
            }
            UiEvent::HotspotFailed { request, reason } => {
                if self.pending_hotspot == Some(request) {
                    warn!(reason = %reason, "Failed to fetch hotspot message");
                    self.pending_hotspot = None;
                    self.hotspot_error = Some(reason);
                }
                Vec::new()
            }
            UiEvent::Unmount => {
                self.unmounted = true;
                let mut effects = Vec::new();
                if let Some(session) = self.active_session.take() {
                    effects.push(Effect::CloseConnection { session });
                }
                if self.is_animating() {
                    self.animation = Animation::Idle;
                    effects.push(Effect::StopAnimation);
                }
                self.connection = ConnectionStatus::Disconnected;
                effects
            }
        };

        debug_assert!(self.transform.is_finite(), "transform left non-finite");
        effects
    }

    fn connect(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        // Old connection goes away before the new one is opened
        if let Some(session) = self.active_session.take() {
            effects.push(Effect::CloseConnection { session });
        }

        let session = self.next_session;
        self.next_session += 1;
        self.active_session = Some(session);

        let topic = self.topic.trim();
        let topic = (!topic.is_empty()).then(|| topic.to_string());
        let url = self.broker_url.clone();

        info!(session, url = %url, topic = ?topic, "Connecting to broker");
        self.connection = ConnectionStatus::Connecting { url: url.clone() };
        effects.push(Effect::OpenConnection {
            session,
            url,
            topic,
        });
        effects
    }

    fn is_current(&self, session: u64) -> bool {
        self.active_session == Some(session)
    }

    fn connection_url(&self) -> String {
        match &self.connection {
            ConnectionStatus::Connecting { url }
            | ConnectionStatus::Connected { url }
            | ConnectionStatus::Subscribed { url, .. } => url.clone(),
            _ => self.broker_url.clone(),
        }
    }
}
