use serde::{Deserialize, Serialize};

/// Integer position on the layout grid. `x` is the string column, `y` the LED
/// offset from the string's centre.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Inclusive bounding box of every light position.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl Grid {
    pub fn width(&self) -> i32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> i32 {
        self.max_y - self.min_y + 1
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            min_x: -1,
            max_x: 1,
            min_y: -1,
            max_y: 1,
        }
    }
}

/// One addressable pixel: where it sits on the grid and where its three
/// channels live on the wire.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Light {
    pub position: Point,
    pub pixel: usize,
    pub universe: u16,
}

/// A run of identical LED strings; `led_count` is always odd so every string
/// has a centre LED.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LedString {
    pub led_count: u32,
    pub string_count: u32,
}

impl LedString {
    pub const fn new(led_count: u32, string_count: u32) -> Self {
        Self {
            led_count,
            string_count,
        }
    }
}

/// Strings wired, in order, onto one universe.
pub type LedUniverse = Vec<LedString>;

/// Universes making up one repeated segment of the installation.
pub type LedSegment = Vec<LedUniverse>;
