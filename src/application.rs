//! Process wiring: settings store, bus, services, and the frame-rate
//! heartbeat.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, LevelFilter};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::bus::{Bus, BusHandle, EventKind, SubscriberId};
use crate::config::{AppConfig, LogLevel};
use crate::controller::link::{Dialer, UdpDialer};
use crate::error::{BusError, StoreError};
use crate::services::Services;
use crate::store::{MemoryStore, SettingsStore, SqliteStore};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// `RUST_LOG` wins; otherwise the configured level.
pub fn init_logging(level: LogLevel) {
    let fallback = LevelFilter::from(level).as_str();
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(fallback))
        .format_timestamp_millis()
        .try_init();
}

struct Heartbeat {
    subscription: SubscriberId,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct Application {
    bus: Bus<Services>,
    heartbeat: Mutex<Option<Heartbeat>>,
}

impl Application {
    /// Open the configured store (SQLite file, or memory) and build every
    /// service against real UDP.
    pub async fn new(config: &AppConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn SettingsStore> = match &config.store.path {
            Some(path) => {
                info!("[app] settings stored in {}", path.display());
                Arc::new(SqliteStore::open(path).await?)
            }
            None => {
                info!("[app] no settings file configured, keeping settings in memory");
                Arc::new(MemoryStore::new())
            }
        };
        let dialer = Arc::new(UdpDialer::new(config.controller.port));
        Ok(Self::with_parts(config, store, dialer).await)
    }

    pub async fn with_parts(config: &AppConfig, store: Arc<dyn SettingsStore>, dialer: Arc<dyn Dialer>) -> Self {
        let bus = Bus::new(&config.bus);
        let mut services = Services::new(bus.handle(), store, dialer, config);
        services.setup().await;
        // a fresh bus is never running, so binding can't be refused
        let _ = bus.bind(services).await;
        Self {
            bus,
            heartbeat: Mutex::new(None),
        }
    }

    pub fn bus(&self) -> BusHandle {
        self.bus.handle()
    }

    pub async fn startup(&self) -> Result<(), BusError> {
        self.bus.startup().await?;

        let mut heartbeat = self.heartbeat.lock().await;
        if heartbeat.is_none() {
            *heartbeat = Some(start_heartbeat(self.bus.handle(), HEARTBEAT_INTERVAL));
        }
        info!("[app] running");
        Ok(())
    }

    pub async fn shutdown(&self) {
        if let Some(Heartbeat {
            subscription,
            stop,
            task,
        }) = self.heartbeat.lock().await.take()
        {
            self.bus.handle().unsubscribe(subscription);
            stop.send_replace(true);
            let _ = task.await;
        }
        self.bus.shutdown().await;
        info!("[app] stopped");
    }
}

fn start_heartbeat(bus: BusHandle, every: Duration) -> Heartbeat {
    let frames = Arc::new(AtomicU64::new(0));
    let subscription = {
        let frames = frames.clone();
        bus.subscribe(EventKind::FrameReady, move || {
            frames.fetch_add(1, Ordering::Relaxed);
        })
    };

    let (stop, mut stop_rx) = watch::channel(false);
    let task = tokio::spawn(async move {
        let mut ticks = tokio::time::interval(every);
        ticks.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = ticks.tick() => {
                    let count = frames.swap(0, Ordering::Relaxed);
                    info!(
                        "[app] {count} frame(s) in the last {}s ({:.1} fps)",
                        every.as_secs(),
                        count as f64 / every.as_secs_f64()
                    );
                }
            }
        }
    });

    Heartbeat {
        subscription,
        stop,
        task,
    }
}
