//! Application state management

use anyhow::{Context, Result};
use posecube_core::ViewState;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::broker::{BrokerConnector, MqttConnector};
use crate::component::{self, ComponentDeps, ComponentHandle};
use crate::config::Config;
use crate::hotspot::HotspotFetcher;

/// Shared application state
pub struct AppState {
    /// Handle to the running broker interface component
    pub component: ComponentHandle,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create application state and mount the component
    pub fn new(config: Config) -> Result<(Arc<Self>, JoinHandle<()>)> {
        let connector: Arc<dyn BrokerConnector> = Arc::new(MqttConnector::new(
            Duration::from_secs(config.broker.keep_alive_secs),
        ));
        Self::with_connector(config, connector)
    }

    /// Same as [`AppState::new`] with a custom broker connector
    pub fn with_connector(
        config: Config,
        connector: Arc<dyn BrokerConnector>,
    ) -> Result<(Arc<Self>, JoinHandle<()>)> {
        let hotspot = HotspotFetcher::new(
            config.hotspot.url.clone(),
            Duration::from_secs(config.hotspot.timeout_secs),
        )
        .context("Failed to create hotspot fetcher")?;

        info!(
            broker = %config.broker.url,
            topic = %config.broker.topic,
            hotspot = %hotspot.url(),
            "Mounting component"
        );

        let deps = ComponentDeps {
            connector,
            hotspot,
            tick_interval: config.animation.interval(),
        };
        let view = ViewState::new(config.broker.url.clone(), config.broker.topic.clone());
        let (component, task) = component::spawn(view, deps);

        Ok((Arc::new(Self { component, config }), task))
    }
}
