//! Procedural patterns. Each maps a normalized image position (`0..1` on both
//! axes) and a time in seconds to a colour.

use std::f32::consts::TAU;

use super::frame::Rgb;

pub type Pattern = fn(f32, f32, f32) -> Rgb;

pub const PATTERNS: &[(&str, Pattern)] = &[("rainbow", rainbow), ("pulse", pulse), ("sweep", sweep)];

pub fn find(name: &str) -> Option<Pattern> {
    PATTERNS.iter().find(|(n, _)| *n == name).map(|(_, p)| *p)
}

pub fn names() -> Vec<String> {
    PATTERNS.iter().map(|(n, _)| n.to_string()).collect()
}

/// `h` in turns, `s` and `v` in `0..=1`.
fn hsv(h: f32, s: f32, v: f32) -> Rgb {
    let h = h.rem_euclid(1.0) * 6.0;
    let c = v * s;
    let x = c * (1.0 - ((h % 2.0) - 1.0).abs());
    let (r, g, b) = match h as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    let scale = |f: f32| ((f + m).clamp(0.0, 1.0) * 255.0).round() as u8;
    [scale(r), scale(g), scale(b)]
}

/// Hue drifting diagonally across the grid.
fn rainbow(x: f32, y: f32, t: f32) -> Rgb {
    hsv(x * 0.8 + y * 0.2 + t * 0.1, 1.0, 1.0)
}

/// Whole field breathing in one slowly shifting hue.
fn pulse(_x: f32, _y: f32, t: f32) -> Rgb {
    let level = 0.5 - 0.5 * (t * TAU * 0.25).cos();
    hsv(t * 0.02, 0.8, level)
}

/// Bright band travelling left to right.
fn sweep(x: f32, y: f32, t: f32) -> Rgb {
    let head = (t * 0.3).rem_euclid(1.0);
    let distance = (x - head).rem_euclid(1.0);
    let level = (1.0 - distance * 6.0).max(0.0);
    hsv(0.6 + y * 0.1, 0.6, level)
}
