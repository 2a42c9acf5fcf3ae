//! The domain services behind the bus. Every command lands here, one at a
//! time, so the services never contend with each other.

mod fanout;

pub use fanout::fan_out;

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use tokio::sync::mpsc;

use crate::bus::{reply, BusHandle, Command, Dispatch, Event, Flow};
use crate::config::AppConfig;
use crate::controller::link::Dialer;
use crate::controller::ControllerService;
use crate::error::{DispatchError, StoreError};
use crate::graphics::GraphicsService;
use crate::layout::LayoutService;
use crate::store::SettingsStore;

pub struct Services {
    bus: BusHandle,
    store: Arc<dyn SettingsStore>,
    controller: ControllerService,
    layout: LayoutService,
    graphics: GraphicsService,
}

impl Services {
    pub fn new(bus: BusHandle, store: Arc<dyn SettingsStore>, dialer: Arc<dyn Dialer>, config: &AppConfig) -> Self {
        Self {
            controller: ControllerService::new(store.clone(), dialer, &config.controller),
            layout: LayoutService::new(store.clone(), &config.layout),
            graphics: GraphicsService::new(bus.clone(), store.clone(), &config.render),
            bus,
            store,
        }
    }

    /// Load persisted settings into every service. Nothing runs yet.
    pub async fn setup(&mut self) {
        self.controller.setup().await;
        self.layout.setup().await;
        self.graphics.setup().await;
    }

    pub fn controller(&self) -> &ControllerService {
        &self.controller
    }

    async fn render_frame(&self) -> Result<(), DispatchError> {
        let frame = Arc::new(self.graphics.frame().await);
        let lights = self.layout.light_universes();
        fan_out(frame, lights, &self.controller).await?;
        Ok(())
    }

    /// Tear everything down behind a closed queue, clear the store, rebuild
    /// from defaults and restart. The fresh queue is always handed back, even
    /// when clearing the store failed.
    async fn reset(&mut self) -> (mpsc::Receiver<Event>, Result<(), StoreError>) {
        info!("[services] resetting application");
        self.bus.close_queue();
        self.graphics.shutdown().await;
        self.controller.shutdown().await;

        let cleared = self.store.reset().await;
        if let Err(e) = &cleared {
            warn!("[services] couldn't clear saved settings: {e}");
        }

        let events = self.bus.open_queue();
        self.setup().await;
        self.controller.startup().await;
        self.graphics.startup();
        info!("[services] reset complete");
        (events, cleared)
    }
}

#[async_trait]
impl Dispatch for Services {
    async fn startup(&mut self) {
        self.controller.startup().await;
        self.graphics.startup();
    }

    async fn shutdown(&mut self) {
        self.graphics.shutdown().await;
        self.controller.shutdown().await;
    }

    async fn dispatch(&mut self, event: Event) -> Result<Flow, DispatchError> {
        match event.command {
            Command::FrameReady => self.render_frame().await?,
            Command::GeneratorCrashed => {
                warn!("[services] generator crashed, blacking out");
                self.controller.blackout().await;
            }
            Command::GetGridBounds(tx) => reply(tx, Ok(self.layout.grid_bounds())),
            Command::FetchRenderSettings(tx) => reply(tx, Ok(self.graphics.settings())),
            Command::SetRenderSettings(settings, tx) => {
                let result = self.graphics.set_settings(settings).await;
                reply(tx, result.map_err(|e| e.to_string()));
            }
            Command::FetchLayoutSettings(tx) => reply(tx, Ok(self.layout.settings())),
            Command::SetLayoutSettings(settings, tx) => {
                let result = self.layout.set_settings(settings).await;
                if result.is_ok() {
                    self.graphics.reset().await;
                }
                reply(tx, result.map_err(|e| e.to_string()));
            }
            Command::FetchNodeSettings(tx) => reply(tx, Ok(self.controller.settings())),
            Command::SetNodeSettings(settings, tx) => {
                let result = self.controller.set_settings(settings).await;
                reply(tx, result.map_err(|e| e.to_string()));
            }
            Command::BlackoutNodes(tx) => {
                self.controller.blackout().await;
                reply(tx, Ok(()));
            }
            Command::ResetApplication(tx) => {
                let (events, cleared) = self.reset().await;
                reply(tx, cleared.map_err(|e| e.to_string()));
                return Ok(Flow::Replace(events));
            }
        }
        Ok(Flow::Continue)
    }
}
