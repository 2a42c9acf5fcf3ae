//! Frame generator.
//!
//! A background loop sizes a frame to the layout grid, then repaints it with
//! the active pattern every `frequency_ms` and announces each frame on the
//! bus. If it cannot get going it reports a crash and tries again after the
//! configured retry delay (`RETRY_DELAY` by default), until stopped.

pub mod frame;
pub mod patterns;

pub use frame::{FrameBuffer, Rgb};

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use tokio::sync::{watch, OwnedRwLockReadGuard};
use tokio::task::JoinHandle;

use crate::bus::BusHandle;
use crate::config::RenderConfig;
use crate::error::{BusError, GraphicsError, SettingsError};
use crate::models::{Grid, RenderSettings, RenderStatus};
use crate::store::{self, SettingsStore, RENDER_SETTINGS_KEY};

pub const RETRY_DELAY: Duration = Duration::from_secs(5);
pub const MAX_PIXEL_SIZE: u32 = 64;

pub fn validate(settings: &RenderSettings) -> Result<(), SettingsError> {
    if patterns::find(&settings.pattern).is_none() {
        return Err(SettingsError::Invalid(format!(
            "unknown pattern {:?}, expected one of {}",
            settings.pattern,
            patterns::names().join(", ")
        )));
    }
    if settings.frequency_ms == 0 {
        return Err(SettingsError::Invalid("frequency must be at least 1 ms".into()));
    }
    if settings.pixel_size == 0 || settings.pixel_size > MAX_PIXEL_SIZE {
        return Err(SettingsError::Invalid(format!(
            "pixel size must be between 1 and {MAX_PIXEL_SIZE}, got {}",
            settings.pixel_size
        )));
    }
    Ok(())
}

struct GraphicsShared {
    settings: RwLock<RenderSettings>,
    frame: Arc<tokio::sync::RwLock<FrameBuffer>>,
}

impl GraphicsShared {
    fn settings(&self) -> RenderSettings {
        self.settings.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

struct GeneratorTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct GraphicsService {
    bus: BusHandle,
    store: Arc<dyn SettingsStore>,
    defaults: RenderSettings,
    shared: Arc<GraphicsShared>,
    task: Option<GeneratorTask>,
    retry_delay: Duration,
}

impl GraphicsService {
    pub fn new(bus: BusHandle, store: Arc<dyn SettingsStore>, config: &RenderConfig) -> Self {
        let defaults = config.settings();
        Self {
            bus,
            store,
            shared: Arc::new(GraphicsShared {
                settings: RwLock::new(defaults.clone()),
                frame: Arc::new(tokio::sync::RwLock::new(FrameBuffer::default())),
            }),
            defaults,
            task: None,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    pub async fn setup(&mut self) {
        let saved = store::load_or(self.store.as_ref(), RENDER_SETTINGS_KEY, self.defaults.clone()).await;
        let settings = match validate(&saved) {
            Ok(()) => saved,
            Err(e) => {
                warn!("[graphics] saved render settings rejected, using defaults: {e}");
                self.defaults.clone()
            }
        };
        *self.shared.settings.write().unwrap_or_else(|e| e.into_inner()) = settings;
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn startup(&mut self) {
        if self.task.is_some() {
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(
            self.bus.clone(),
            self.shared.clone(),
            self.retry_delay,
            stop_rx,
        ));
        self.task = Some(GeneratorTask { stop, handle });
        info!("[graphics] started");
    }

    pub async fn shutdown(&mut self) {
        let Some(GeneratorTask { stop, handle }) = self.task.take() else {
            return;
        };
        stop.send_replace(true);
        if let Err(e) = handle.await {
            error!("[graphics] generator task failed: {e}");
        }
        info!("[graphics] stopped");
    }

    /// Restart the generator so it re-reads the grid and reallocates.
    pub async fn reset(&mut self) {
        if !self.is_running() {
            return;
        }
        info!("[graphics] resetting");
        self.shutdown().await;
        self.startup();
    }

    /// Read access to the current frame. Repainting waits until the guard
    /// is dropped.
    pub async fn frame(&self) -> OwnedRwLockReadGuard<FrameBuffer> {
        self.shared.frame.clone().read_owned().await
    }

    pub fn settings(&self) -> RenderStatus {
        RenderStatus {
            settings: self.shared.settings(),
            patterns: patterns::names(),
        }
    }

    /// Pattern and frequency apply on the next frame. A new pixel size
    /// restarts the generator.
    pub async fn set_settings(&mut self, settings: RenderSettings) -> Result<(), SettingsError> {
        validate(&settings)?;
        store::save(self.store.as_ref(), RENDER_SETTINGS_KEY, &settings).await?;
        let resize = {
            let mut current = self.shared.settings.write().unwrap_or_else(|e| e.into_inner());
            let resize = current.pixel_size != settings.pixel_size;
            *current = settings;
            resize
        };
        if resize {
            self.reset().await;
        }
        Ok(())
    }
}

async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

async fn run(bus: BusHandle, shared: Arc<GraphicsShared>, retry_delay: Duration, mut stop: watch::Receiver<bool>) {
    loop {
        match generate(&bus, &shared, &mut stop).await {
            Ok(()) => break,
            Err(e) => {
                error!("[graphics] generator crashed: {e}");
                if let Err(e) = bus.emit_generator_crashed() {
                    warn!("[graphics] couldn't report crash: {e}");
                }
            }
        }
        tokio::select! {
            biased;
            _ = stop_requested(&mut stop) => break,
            _ = tokio::time::sleep(retry_delay) => info!("[graphics] retrying generator"),
        }
    }
    debug!("[graphics] generator loop closed");
}

/// One generator lifetime. `Ok` means it was asked to stop.
async fn generate(
    bus: &BusHandle,
    shared: &GraphicsShared,
    stop: &mut watch::Receiver<bool>,
) -> Result<(), GraphicsError> {
    let grid = tokio::select! {
        biased;
        _ = stop_requested(stop) => return Ok(()),
        bounds = bus.get_grid_bounds() => bounds.unwrap_or_else(|e| {
            warn!("[graphics] no grid bounds ({e}), using default grid");
            Grid::default()
        }),
    };
    let pixel_size = shared.settings().pixel_size;
    let buffer = FrameBuffer::new(grid, pixel_size)?;
    info!(
        "[graphics] rendering {}x{} frame ({}x{} grid, pixel size {pixel_size})",
        buffer.width(),
        buffer.height(),
        grid.width(),
        grid.height()
    );
    *shared.frame.write().await = buffer;

    let started = Instant::now();
    loop {
        let settings = shared.settings();
        let pattern =
            patterns::find(&settings.pattern).ok_or_else(|| GraphicsError::UnknownPattern(settings.pattern.clone()))?;

        tokio::select! {
            biased;
            _ = stop_requested(stop) => return Ok(()),
            _ = tokio::time::sleep(Duration::from_millis(settings.frequency_ms.max(1))) => {}
        }

        shared.frame.write().await.render(pattern, started.elapsed().as_secs_f32());

        match bus.emit_frame_ready() {
            Ok(()) => {}
            Err(BusError::QueueFull) => trace!("[graphics] bus busy, frame dropped"),
            Err(e) => debug!("[graphics] frame not announced: {e}"),
        }
    }
}
