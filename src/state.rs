//! Shared application state handed to the routers.

use std::sync::Arc;

use crate::services::assets::AssetStore;
use crate::services::client::ConnectionConfig;
use crate::services::hub::HubHandle;

/// State for the message service.
#[derive(Clone)]
pub struct AppState {
    pub hub: HubHandle,
    pub connection: ConnectionConfig,
}

impl AppState {
    #[must_use]
    pub fn new(hub: HubHandle, connection: ConnectionConfig) -> Self {
        Self { hub, connection }
    }
}

/// State for the asset service.
#[derive(Clone)]
pub struct AssetState {
    pub store: Arc<dyn AssetStore>,
}

impl AssetState {
    #[must_use]
    pub fn new(store: Arc<dyn AssetStore>) -> Self {
        Self { store }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use std::path::Path;

    use super::*;
    use crate::services::collector::{Collector, CollectorConfig, CollectorHandle, open_log};
    use crate::services::hub::{Hub, HubConfig};

    /// Start a collector logging into `dir` and a hub on top of it.
    pub async fn test_app_state(dir: &Path, connection: ConnectionConfig) -> (AppState, CollectorHandle) {
        let (writer, reader) = open_log(dir).await.expect("open log");
        let (collector, collector_handle) = Collector::new(writer, reader, CollectorConfig::default());
        collector.start();

        let (hub, hub_handle) = Hub::new(collector_handle.clone(), HubConfig::default());
        tokio::spawn(hub.run());

        (AppState::new(hub_handle, connection), collector_handle)
    }
}
