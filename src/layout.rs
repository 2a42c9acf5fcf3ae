//! Physical layout: turns the string/universe description into addressable
//! lights on an integer grid.
//!
//! Strings hang as columns. Within a universe, wiring snakes: the first string
//! runs bottom to top, the next top to bottom, and so on, with pixel indices
//! counting along the wire. Every segment repeats the same definition to the
//! right of the previous one, on its own block of universes.

use std::sync::{Arc, RwLock};

use log::{info, warn};

use crate::config::LayoutConfig;
use crate::error::SettingsError;
use crate::models::{Grid, LayoutSettings, Light, Point};
use crate::store::{self, SettingsStore, LAYOUT_SETTINGS_KEY};

/// Channels per pixel (RGB).
pub const CHANNELS_PER_PIXEL: usize = 3;
pub const MAX_PIXELS_PER_UNIVERSE: usize = artnet::DMX_CHANNELS / CHANNELS_PER_PIXEL;

/// Lights grouped by universe index, each group in pixel order.
pub type LightUniverses = Vec<Vec<Light>>;

pub fn validate(settings: &LayoutSettings) -> Result<(), SettingsError> {
    if settings.segment_count < 1 {
        return Err(SettingsError::Invalid("segment count must be at least 1".into()));
    }
    if settings.segment_definition.is_empty() {
        return Err(SettingsError::Invalid("segment definition has no universes".into()));
    }
    let universes = settings.segment_definition.len() as u64 * settings.segment_count as u64;
    if universes > artnet::MAX_PORT_ADDRESS as u64 + 1 {
        return Err(SettingsError::Invalid(format!(
            "{universes} universes do not fit in a 15-bit port address"
        )));
    }

    let mut any_lights = false;
    for (u, universe) in settings.segment_definition.iter().enumerate() {
        let mut pixels = 0u64;
        for string in universe {
            if string.string_count == 0 {
                return Err(SettingsError::Invalid(format!(
                    "universe {u}: a group of {}-led strings has no strings",
                    string.led_count
                )));
            }
            if string.led_count % 2 == 0 {
                return Err(SettingsError::Invalid(format!(
                    "universe {u}: strings need an odd led count, got {}",
                    string.led_count
                )));
            }
            pixels += string.led_count as u64 * string.string_count as u64;
        }
        if pixels > MAX_PIXELS_PER_UNIVERSE as u64 {
            return Err(SettingsError::Invalid(format!(
                "universe {u}: {pixels} pixels exceed the {MAX_PIXELS_PER_UNIVERSE} a universe can carry"
            )));
        }
        any_lights |= pixels > 0;
    }
    if !any_lights {
        return Err(SettingsError::Invalid("layout has no lights".into()));
    }
    Ok(())
}

/// Lay out every light and compute the grid bounds. Settings must already
/// be valid.
pub fn build_lights(settings: &LayoutSettings) -> (LightUniverses, Grid) {
    let definition = &settings.segment_definition;
    let segment_count = settings.segment_count as usize;
    let mut universes: LightUniverses = vec![Vec::new(); definition.len() * segment_count];

    let mut max_half = 0i32;
    // strings in one segment; known once the first segment is laid out
    let mut strings_per_segment = 0i32;

    for segment in 0..segment_count {
        let mut seen_strings = 0i32;
        for (u, strings) in definition.iter().enumerate() {
            let universe_index = u + segment * definition.len();
            let lights = &mut universes[universe_index];
            let mut upward = true;
            let mut pixel = 0usize;

            for string in strings {
                let half = (string.led_count as i32 - 1) / 2;
                max_half = max_half.max(half);
                for column in 0..string.string_count as i32 {
                    let x = strings_per_segment * segment as i32 + seen_strings + column;
                    for offset in -half..=half {
                        let y = if upward { offset } else { -offset };
                        lights.push(Light {
                            position: Point::new(x, y),
                            pixel,
                            universe: universe_index as u16,
                        });
                        pixel += 1;
                    }
                    upward = !upward;
                }
                seen_strings += string.string_count as i32;
            }
        }
        strings_per_segment = seen_strings;
    }

    let grid = Grid {
        min_x: 0,
        max_x: strings_per_segment * segment_count as i32 - 1,
        min_y: -max_half,
        max_y: max_half,
    };
    (universes, grid)
}

struct LayoutState {
    settings: LayoutSettings,
    lights: Arc<LightUniverses>,
    grid: Grid,
}

impl LayoutState {
    fn new(settings: LayoutSettings) -> Self {
        let (lights, grid) = build_lights(&settings);
        Self {
            settings,
            lights: Arc::new(lights),
            grid,
        }
    }
}

pub struct LayoutService {
    store: Arc<dyn SettingsStore>,
    defaults: LayoutSettings,
    state: RwLock<LayoutState>,
}

impl LayoutService {
    pub fn new(store: Arc<dyn SettingsStore>, config: &LayoutConfig) -> Self {
        let defaults = config.settings();
        let state = match validate(&defaults) {
            Ok(()) => LayoutState::new(defaults.clone()),
            Err(e) => {
                warn!("[layout] configured layout rejected, starting empty: {e}");
                LayoutState {
                    settings: defaults.clone(),
                    lights: Arc::new(Vec::new()),
                    grid: Grid::default(),
                }
            }
        };
        Self {
            store,
            defaults,
            state: RwLock::new(state),
        }
    }

    /// Load the saved layout, if any, and recompute lights.
    pub async fn setup(&self) {
        let saved = store::load_or(self.store.as_ref(), LAYOUT_SETTINGS_KEY, self.defaults.clone()).await;
        match validate(&saved) {
            Ok(()) => self.swap(saved),
            Err(e) => {
                warn!("[layout] saved layout rejected, using default: {e}");
                if validate(&self.defaults).is_ok() {
                    self.swap(self.defaults.clone());
                }
            }
        }
    }

    fn swap(&self, settings: LayoutSettings) {
        let next = LayoutState::new(settings);
        info!(
            "[layout] {} light(s) across {} universe(s), grid {}x{}",
            next.lights.iter().map(Vec::len).sum::<usize>(),
            next.lights.len(),
            next.grid.width(),
            next.grid.height()
        );
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = next;
    }

    pub fn settings(&self) -> LayoutSettings {
        self.state.read().unwrap_or_else(|e| e.into_inner()).settings.clone()
    }

    pub async fn set_settings(&self, settings: LayoutSettings) -> Result<(), SettingsError> {
        validate(&settings)?;
        store::save(self.store.as_ref(), LAYOUT_SETTINGS_KEY, &settings).await?;
        self.swap(settings);
        Ok(())
    }

    pub fn light_universes(&self) -> Arc<LightUniverses> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).lights.clone()
    }

    pub fn grid_bounds(&self) -> Grid {
        self.state.read().unwrap_or_else(|e| e.into_inner()).grid
    }
}
