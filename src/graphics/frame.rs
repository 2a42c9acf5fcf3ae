use crate::error::GraphicsError;
use crate::models::{Grid, Point};

use super::patterns::Pattern;

pub type Rgb = [u8; 3];

/// Largest image a frame may allocate (about 12 MiB of RGB).
pub const MAX_FRAME_PIXELS: usize = 1 << 22;

/// Rendered image covering the layout grid. Every grid cell is a square of
/// `pixel_size × pixel_size` image pixels; lights sample the centre of
/// their cell.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    grid: Grid,
    pixel_size: u32,
    width: usize,
    height: usize,
    pixels: Vec<Rgb>,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self {
            grid: Grid::default(),
            pixel_size: 0,
            width: 0,
            height: 0,
            pixels: Vec::new(),
        }
    }
}

impl FrameBuffer {
    pub fn new(grid: Grid, pixel_size: u32) -> Result<Self, GraphicsError> {
        if pixel_size == 0 {
            return Err(GraphicsError::Geometry("pixel size must be positive".into()));
        }
        if grid.width() <= 0 || grid.height() <= 0 {
            return Err(GraphicsError::Geometry(format!(
                "empty grid {}x{}",
                grid.width(),
                grid.height()
            )));
        }
        let too_large = || {
            GraphicsError::Geometry(format!(
                "{}x{} grid at pixel size {pixel_size} exceeds {MAX_FRAME_PIXELS} pixels",
                grid.width(),
                grid.height()
            ))
        };
        let width = (grid.width() as usize).checked_mul(pixel_size as usize).ok_or_else(too_large)?;
        let height = (grid.height() as usize).checked_mul(pixel_size as usize).ok_or_else(too_large)?;
        match width.checked_mul(height) {
            Some(pixels) if pixels <= MAX_FRAME_PIXELS => {}
            _ => return Err(too_large()),
        }
        Ok(Self {
            grid,
            pixel_size,
            width,
            height,
            pixels: vec![[0; 3]; width * height],
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Colour under a grid position. Black outside the grid or before the
    /// first allocation.
    pub fn pixel(&self, position: Point) -> Rgb {
        if self.pixels.is_empty() || !self.grid.contains(position) {
            return [0; 3];
        }
        let size = self.pixel_size as usize;
        let px = (position.x - self.grid.min_x) as usize * size + size / 2;
        let py = (position.y - self.grid.min_y) as usize * size + size / 2;
        self.pixels[py * self.width + px]
    }

    pub fn set(&mut self, x: usize, y: usize, color: Rgb) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = color;
        }
    }

    /// Paint every image pixel from `pattern` at time `t` (seconds).
    pub fn render(&mut self, pattern: Pattern, t: f32) {
        let (w, h) = (self.width as f32, self.height as f32);
        for y in 0..self.height {
            let ny = (y as f32 + 0.5) / h;
            for x in 0..self.width {
                let nx = (x as f32 + 0.5) / w;
                self.pixels[y * self.width + x] = pattern(nx, ny, t);
            }
        }
    }
}
