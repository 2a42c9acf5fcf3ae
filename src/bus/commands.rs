//! Typed wrappers over the command surface, so callers never build a
//! `Command` or a reply channel by hand.

use super::{BusHandle, Command};
use crate::error::BusError;
use crate::models::{ControllerSettings, Grid, LayoutSettings, RenderSettings, RenderStatus};

impl BusHandle {
    pub fn emit_frame_ready(&self) -> Result<(), BusError> {
        self.enqueue(Command::FrameReady)
    }

    pub fn emit_generator_crashed(&self) -> Result<(), BusError> {
        self.enqueue(Command::GeneratorCrashed)
    }

    pub async fn get_grid_bounds(&self) -> Result<Grid, BusError> {
        self.call(Command::GetGridBounds).await
    }

    pub async fn fetch_render_settings(&self) -> Result<RenderStatus, BusError> {
        self.call(Command::FetchRenderSettings).await
    }

    pub async fn set_render_settings(&self, settings: RenderSettings) -> Result<(), BusError> {
        self.call(|tx| Command::SetRenderSettings(settings, tx)).await
    }

    pub async fn fetch_layout_settings(&self) -> Result<LayoutSettings, BusError> {
        self.call(Command::FetchLayoutSettings).await
    }

    pub async fn set_layout_settings(&self, settings: LayoutSettings) -> Result<(), BusError> {
        self.call(|tx| Command::SetLayoutSettings(settings, tx)).await
    }

    pub async fn fetch_node_settings(&self) -> Result<ControllerSettings, BusError> {
        self.call(Command::FetchNodeSettings).await
    }

    pub async fn set_node_settings(&self, settings: ControllerSettings) -> Result<(), BusError> {
        self.call(|tx| Command::SetNodeSettings(settings, tx)).await
    }

    pub async fn blackout_nodes(&self) -> Result<(), BusError> {
        self.call(Command::BlackoutNodes).await
    }

    pub async fn reset_application(&self) -> Result<(), BusError> {
        self.call(Command::ResetApplication).await
    }
}
