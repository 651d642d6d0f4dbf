//! Component runtime
//!
//! One task owns the [`ViewState`]. Requests from the web surface and
//! events from the broker session, the animation timer and hotspot fetches
//! all funnel into it and are applied one at a time; the effects the state
//! machine asks for are carried out here. Every change publishes a fresh
//! [`Snapshot`] on a watch channel.

use posecube_core::{Effect, Snapshot, UiEvent, ViewState};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::animation::AnimationTimer;
use crate::broker::{BrokerConnector, BrokerSession};
use crate::hotspot::HotspotFetcher;

/// Capacity of the request and internal event channels
const CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum ComponentError {
    #[error("Component is no longer running")]
    Gone,
}

struct Request {
    event: UiEvent,
    reply: oneshot::Sender<Snapshot>,
}

/// Cloneable handle used by the web surface
#[derive(Clone)]
pub struct ComponentHandle {
    requests: mpsc::Sender<Request>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ComponentHandle {
    /// Apply an event and wait for the resulting snapshot
    pub async fn dispatch(&self, event: UiEvent) -> Result<Snapshot, ComponentError> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request { event, reply })
            .await
            .map_err(|_| ComponentError::Gone)?;
        rx.await.map_err(|_| ComponentError::Gone)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }

    /// Tear the component down: close the connection, stop the timer
    pub async fn unmount(&self) -> Result<Snapshot, ComponentError> {
        self.dispatch(UiEvent::Unmount).await
    }
}

/// Collaborators the component needs to carry out effects
pub struct ComponentDeps {
    pub connector: Arc<dyn BrokerConnector>,
    pub hotspot: HotspotFetcher,
    pub tick_interval: Duration,
}

struct Component {
    state: ViewState,
    deps: ComponentDeps,
    session: Option<(u64, Box<dyn BrokerSession>)>,
    timer: Option<AnimationTimer>,
    internal_tx: mpsc::Sender<UiEvent>,
    internal_rx: mpsc::Receiver<UiEvent>,
    requests: mpsc::Receiver<Request>,
    snapshots: watch::Sender<Snapshot>,
}

/// Start the component task
pub fn spawn(state: ViewState, deps: ComponentDeps) -> (ComponentHandle, JoinHandle<()>) {
    let (requests_tx, requests) = mpsc::channel(CHANNEL_CAPACITY);
    let (internal_tx, internal_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (snapshots, snapshots_rx) = watch::channel(state.snapshot());

    let component = Component {
        state,
        deps,
        session: None,
        timer: None,
        internal_tx,
        internal_rx,
        requests,
        snapshots,
    };
    let task = tokio::spawn(component.run());

    (
        ComponentHandle {
            requests: requests_tx,
            snapshots: snapshots_rx,
        },
        task,
    )
}

impl Component {
    async fn run(mut self) {
        info!("Component mounted");
        while !self.state.is_unmounted() {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request { event, reply }) => {
                        self.handle(event);
                        let _ = reply.send(self.state.snapshot());
                    }
                    // Every handle is gone
                    None => self.handle(UiEvent::Unmount),
                },
                Some(event) = self.internal_rx.recv() => self.handle(event),
            }
        }
        info!("Component unmounted");
    }

    fn handle(&mut self, event: UiEvent) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            for effect in self.state.apply(event) {
                if let Some(follow_up) = self.execute(effect) {
                    queue.push_back(follow_up);
                }
            }
        }
        self.snapshots.send_replace(self.state.snapshot());
    }

    /// Carry out one effect; returns an event when the outcome is known at once
    fn execute(&mut self, effect: Effect) -> Option<UiEvent> {
        debug!(?effect, "Executing effect");
        match effect {
            Effect::OpenConnection {
                session,
                url,
                topic,
            } => {
                if let Some((previous, mut old)) = self.session.take() {
                    warn!(session = previous, "Closing leftover broker session");
                    old.end();
                }
                match self.deps.connector.open(
                    session,
                    &url,
                    topic.as_deref(),
                    self.internal_tx.clone(),
                ) {
                    Ok(connection) => {
                        self.session = Some((session, connection));
                        None
                    }
                    Err(e) => {
                        warn!(session, error = %e, "Failed to open broker connection");
                        Some(UiEvent::BrokerFailed {
                            session,
                            reason: e.to_string(),
                        })
                    }
                }
            }
            Effect::CloseConnection { session } => {
                match self.session.take() {
                    Some((current, mut connection)) if current == session => connection.end(),
                    other => self.session = other,
                }
                None
            }
            Effect::StartAnimation { generation } => {
                if let Some(old) = self.timer.take() {
                    warn!(generation = old.generation(), "Replacing running animation timer");
                    old.stop();
                }
                self.timer = Some(AnimationTimer::start(
                    generation,
                    self.deps.tick_interval,
                    self.internal_tx.clone(),
                ));
                None
            }
            Effect::StopAnimation => {
                if let Some(timer) = self.timer.take() {
                    timer.stop();
                }
                None
            }
            Effect::FetchHotspot { request } => {
                let fetcher = self.deps.hotspot.clone();
                let events = self.internal_tx.clone();
                tokio::spawn(async move {
                    let event = match fetcher.fetch().await {
                        Ok(message) => UiEvent::HotspotLoaded { request, message },
                        Err(e) => UiEvent::HotspotFailed {
                            request,
                            reason: e.to_string(),
                        },
                    };
                    let _ = events.send(event).await;
                });
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::testing::FakeBroker;
    use chrono::Utc;
    use posecube_core::{ConnectionStatus, Transform, TransformField};

    fn start(broker: Arc<FakeBroker>) -> ComponentHandle {
        let deps = ComponentDeps {
            connector: broker,
            // Nothing listens here
            hotspot: HotspotFetcher::new("http://127.0.0.1:9/random-message", Duration::from_secs(2))
                .unwrap(),
            tick_interval: Duration::from_millis(1000),
        };
        let (handle, _task) = spawn(ViewState::default(), deps);
        handle
    }

    async fn wait_until(handle: &ComponentHandle, check: impl FnMut(&Snapshot) -> bool) -> Snapshot {
        let mut rx = handle.subscribe();
        let snapshot = tokio::time::timeout(Duration::from_secs(10), rx.wait_for(check))
            .await
            .unwrap()
            .unwrap()
            .clone();
        snapshot
    }

    #[tokio::test]
    async fn test_message_on_subscribed_topic_updates_transform() {
        let broker = Arc::new(FakeBroker::default());
        let handle = start(broker.clone());

        handle
            .dispatch(UiEvent::SetBrokerUrl("mqtt://broker.local:1883".to_string()))
            .await
            .unwrap();
        handle.dispatch(UiEvent::SetTopic("pose".to_string())).await.unwrap();
        let snapshot = handle.dispatch(UiEvent::Connect).await.unwrap();
        assert!(matches!(snapshot.connection, ConnectionStatus::Connecting { .. }));
        assert_eq!(
            broker.opened.lock().unwrap().clone(),
            vec![(0, "mqtt://broker.local:1883".to_string(), Some("pose".to_string()))]
        );

        let events = broker.sender();
        events.send(UiEvent::BrokerConnected { session: 0 }).await.unwrap();
        events
            .send(UiEvent::BrokerSubscribed {
                session: 0,
                topic: "pose".to_string(),
            })
            .await
            .unwrap();
        events
            .send(UiEvent::MessageReceived {
                session: 0,
                topic: "pose".to_string(),
                payload: br#"{"translation":{"x":5}}"#.to_vec(),
                received_at: Utc::now(),
            })
            .await
            .unwrap();

        let snapshot = wait_until(&handle, |s| s.messages_applied == 1).await;
        let mut expected = Transform::default();
        expected.translate_x = 5.0;
        assert_eq!(snapshot.transform, expected);
        assert!(matches!(snapshot.connection, ConnectionStatus::Subscribed { .. }));
    }

    #[tokio::test]
    async fn test_reconnect_ends_previous_session() {
        let broker = Arc::new(FakeBroker::default());
        let handle = start(broker.clone());

        handle
            .dispatch(UiEvent::SetBrokerUrl("mqtt://a".to_string()))
            .await
            .unwrap();
        handle.dispatch(UiEvent::Connect).await.unwrap();
        handle.dispatch(UiEvent::Connect).await.unwrap();

        assert_eq!(broker.closed.lock().unwrap().clone(), vec![0]);
        assert_eq!(broker.opened.lock().unwrap().len(), 2);

        handle.unmount().await.unwrap();
        assert_eq!(broker.closed.lock().unwrap().clone(), vec![0, 1]);
        assert!(matches!(
            handle.dispatch(UiEvent::Apply).await,
            Err(ComponentError::Gone)
        ));
    }

    #[tokio::test]
    async fn test_unusable_url_is_reported() {
        let broker = Arc::new(FakeBroker::default());
        let handle = start(broker);

        let snapshot = handle.dispatch(UiEvent::Connect).await.unwrap();
        assert!(matches!(snapshot.connection, ConnectionStatus::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_twice_runs_one_timer() {
        let broker = Arc::new(FakeBroker::default());
        let handle = start(broker);

        handle.dispatch(UiEvent::Apply).await.unwrap();
        handle.dispatch(UiEvent::Apply).await.unwrap();

        let snapshot = wait_until(&handle, |s| s.transform.roll >= 3.0).await;
        assert_eq!(snapshot.transform.roll, 3.0);
        assert_eq!(snapshot.transform.scale_x, 1.0 + (2.0f64 / 100.0).sin());

        let snapshot = handle.dispatch(UiEvent::Reset).await.unwrap();
        assert!(!snapshot.animating);
        assert_eq!(snapshot.transform, Transform::default());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(handle.snapshot().transform, Transform::default());
    }

    #[tokio::test]
    async fn test_field_input_and_tabs() {
        let broker = Arc::new(FakeBroker::default());
        let handle = start(broker);

        let snapshot = handle
            .dispatch(UiEvent::FieldInput {
                field: TransformField::ScaleX,
                text: "abc".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(snapshot.transform.scale_x, 0.0);

        handle.dispatch(UiEvent::Apply).await.unwrap();
        let snapshot = handle.dispatch(UiEvent::ShowTabs).await.unwrap();
        assert!(snapshot.tabs_visible);
        handle.unmount().await.unwrap();
    }

    #[tokio::test]
    async fn test_hotspot_failure_surfaces() {
        let broker = Arc::new(FakeBroker::default());
        let handle = start(broker);

        handle.dispatch(UiEvent::HotspotClicked).await.unwrap();
        let snapshot = wait_until(&handle, |s| s.hotspot_error.is_some()).await;
        assert!(snapshot.hotspot_message.is_none());
    }
}
