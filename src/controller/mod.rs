//! Node set management: one actor per configured receiver and the
//! universe→node partition fan-out and blackout route through.

pub mod link;
pub mod node;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use log::{info, warn};

use crate::config::ControllerConfig;
use crate::error::SettingsError;
use crate::models::{ControllerSettings, NodeDefinition};
use crate::store::{self, SettingsStore, CONTROLLER_SETTINGS_KEY};
use link::Dialer;
use node::Node;

pub use node::{LinkState, UniverseBuffer};

/// Build the universe→node index, rejecting any universe claimed twice or
/// outside the 15-bit Art-Net port-address range.
pub fn partition(definitions: &[NodeDefinition]) -> Result<HashMap<u16, usize>, SettingsError> {
    let mut owners = HashMap::new();
    for (index, definition) in definitions.iter().enumerate() {
        if definition.address.trim().is_empty() {
            return Err(SettingsError::Invalid(format!("node {index} has no address")));
        }
        for &universe in &definition.universes {
            if universe > artnet::MAX_PORT_ADDRESS {
                return Err(SettingsError::Invalid(format!(
                    "universe {universe} on {} is above {}",
                    definition.address,
                    artnet::MAX_PORT_ADDRESS
                )));
            }
            if let Some(&other) = owners.get(&universe) {
                let other: &NodeDefinition = &definitions[other];
                return Err(SettingsError::Invalid(format!(
                    "universe {universe} is claimed by both {} and {}",
                    other.address, definition.address
                )));
            }
            owners.insert(universe, index);
        }
    }
    Ok(owners)
}

fn validate(settings: &ControllerSettings) -> Result<HashMap<u16, usize>, SettingsError> {
    if !settings.local_address.is_empty() && settings.local_address.parse::<IpAddr>().is_err() {
        return Err(SettingsError::Invalid(format!(
            "local address {:?} is not an IP address",
            settings.local_address
        )));
    }
    partition(&settings.node_definitions)
}

pub struct ControllerService {
    store: Arc<dyn SettingsStore>,
    dialer: Arc<dyn Dialer>,
    defaults: ControllerSettings,
    backoff: Duration,
    settings: RwLock<ControllerSettings>,
    nodes: Vec<Arc<Node>>,
    owners: HashMap<u16, usize>,
    running: bool,
}

impl ControllerService {
    pub fn new(store: Arc<dyn SettingsStore>, dialer: Arc<dyn Dialer>, config: &ControllerConfig) -> Self {
        let defaults = config.settings();
        Self {
            store,
            dialer,
            settings: RwLock::new(defaults.clone()),
            defaults,
            backoff: config.retry_backoff(),
            nodes: Vec::new(),
            owners: HashMap::new(),
            running: false,
        }
    }

    /// Load the saved node set (or the default) and build its actors.
    /// Actors stay idle until `startup`.
    pub async fn setup(&mut self) {
        let saved = store::load_or(self.store.as_ref(), CONTROLLER_SETTINGS_KEY, self.defaults.clone()).await;
        let settings = match validate(&saved) {
            Ok(_) => saved,
            Err(e) => {
                warn!("[controller] saved node settings rejected, using defaults: {e}");
                self.defaults.clone()
            }
        };
        if let Err(e) = self.rebuild(settings) {
            warn!("[controller] default node settings rejected, no nodes built: {e}");
            self.nodes.clear();
            self.owners.clear();
        }
    }

    fn rebuild(&mut self, settings: ControllerSettings) -> Result<(), SettingsError> {
        let owners = validate(&settings)?;
        self.nodes = settings
            .node_definitions
            .iter()
            .map(|definition| {
                Arc::new(Node::new(
                    definition,
                    &settings.local_address,
                    self.dialer.clone(),
                    self.backoff,
                ))
            })
            .collect();
        self.owners = owners;
        info!(
            "[controller] {} node(s) owning {} universe(s)",
            self.nodes.len(),
            self.owners.len()
        );
        *self.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
        Ok(())
    }

    pub async fn startup(&mut self) {
        for node in &self.nodes {
            node.start().await;
        }
        self.running = true;
    }

    /// Stop every actor and wait for all of them to exit.
    pub async fn shutdown(&mut self) {
        for node in &self.nodes {
            node.stop().await;
        }
        self.running = false;
    }

    pub fn settings(&self) -> ControllerSettings {
        self.settings.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the whole node set. The old actors are fully stopped before
    /// the new ones start.
    pub async fn set_settings(&mut self, settings: ControllerSettings) -> Result<(), SettingsError> {
        validate(&settings)?;
        store::save(self.store.as_ref(), CONTROLLER_SETTINGS_KEY, &settings).await?;

        let was_running = self.running;
        self.shutdown().await;
        self.rebuild(settings)?;
        if was_running {
            self.startup().await;
        }
        info!("[controller] node settings replaced");
        Ok(())
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn node_for(&self, universe: u16) -> Option<Arc<Node>> {
        self.owners.get(&universe).and_then(|&i| self.nodes.get(i)).cloned()
    }

    /// Zero and resend every universe on every connected node.
    pub async fn blackout(&self) -> usize {
        let mut queued = 0;
        for node in &self.nodes {
            queued += node.blackout().await;
        }
        info!("[controller] blackout queued {queued} send(s)");
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::io;

    struct NoDialer;

    #[async_trait]
    impl Dialer for NoDialer {
        async fn dial(&self, _local: &str, _address: &str) -> io::Result<Box<dyn link::Link>> {
            Err(io::Error::new(io::ErrorKind::NotConnected, "offline"))
        }
    }

    fn service(store: Arc<dyn SettingsStore>) -> ControllerService {
        ControllerService::new(store, Arc::new(NoDialer), &ControllerConfig::default())
    }

    #[test]
    fn partition_rejects_double_ownership() {
        let defs = vec![
            NodeDefinition::new("10.0.0.1", vec![0, 1]),
            NodeDefinition::new("10.0.0.2", vec![1, 2]),
        ];
        let err = partition(&defs).unwrap_err();
        assert!(err.to_string().contains("universe 1"), "{err}");
    }

    #[test]
    fn partition_maps_each_universe_to_its_owner() {
        let defs = vec![
            NodeDefinition::new("10.0.0.1", vec![0, 1]),
            NodeDefinition::new("10.0.0.2", vec![5]),
        ];
        let owners = partition(&defs).unwrap();
        assert_eq!(owners.len(), 3);
        assert_eq!(owners[&0], 0);
        assert_eq!(owners[&1], 0);
        assert_eq!(owners[&5], 1);
    }

    #[test]
    fn partition_rejects_out_of_range_universe() {
        let defs = vec![NodeDefinition::new("10.0.0.1", vec![0x8000])];
        assert!(partition(&defs).is_err());
    }

    #[tokio::test]
    async fn setup_uses_defaults_when_nothing_saved() {
        let mut controller = service(Arc::new(MemoryStore::new()));
        controller.setup().await;
        assert_eq!(controller.settings(), ControllerConfig::default().settings());
        assert_eq!(controller.nodes().len(), 1);
        assert!(controller.node_for(5).is_some());
        assert!(controller.node_for(6).is_none());
    }

    #[tokio::test]
    async fn set_settings_round_trips_in_order() {
        let store: Arc<dyn SettingsStore> = Arc::new(MemoryStore::new());
        let mut controller = service(store.clone());
        controller.setup().await;
        controller.startup().await;

        let wanted = ControllerSettings {
            local_address: "127.0.0.1".to_string(),
            node_definitions: vec![
                NodeDefinition::new("10.0.0.9", vec![4, 2]),
                NodeDefinition::new("10.0.0.3", vec![7]),
            ],
        };
        controller.set_settings(wanted.clone()).await.unwrap();
        assert_eq!(controller.settings(), wanted);
        assert_eq!(controller.node_for(7).unwrap().address(), "10.0.0.3");
        assert!(controller.node_for(0).is_none());
        for node in controller.nodes() {
            assert!(node.is_running().await);
        }

        // persisted for the next setup
        let mut reloaded = service(store);
        reloaded.setup().await;
        assert_eq!(reloaded.settings(), wanted);

        controller.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_settings_leave_the_running_set_alone() {
        let mut controller = service(Arc::new(MemoryStore::new()));
        controller.setup().await;
        let before = controller.settings();

        let err = controller
            .set_settings(ControllerSettings {
                local_address: "nowhere".to_string(),
                node_definitions: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
        assert_eq!(controller.settings(), before);
        assert_eq!(controller.nodes().len(), 1);
    }
}
