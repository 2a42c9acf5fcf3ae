//! Compiled defaults for the installation as built: one receiver driving six
//! universes of snaked strings.

use crate::models::{LedSegment, LedString, NodeDefinition};

pub const DEFAULT_LOCAL_ADDRESS: &str = "2.0.0.1";

pub fn default_node_definitions() -> Vec<NodeDefinition> {
    vec![NodeDefinition::new("2.0.0.2", vec![0, 1, 2, 3, 4, 5])]
}

fn universe(strings: &[(u32, u32)]) -> Vec<LedString> {
    strings
        .iter()
        .map(|&(led_count, string_count)| LedString::new(led_count, string_count))
        .collect()
}

/// String runs per universe as `(leds per string, string count)`.
pub fn default_segment_definition() -> LedSegment {
    vec![
        // U1: most of segment 1
        universe(&[(3, 5), (5, 2), (7, 3), (9, 3), (11, 3), (9, 3), (7, 3), (5, 2)]),
        // U2: rest of segment 1, most of segment 2
        universe(&[(3, 10), (5, 2), (7, 3), (9, 3), (11, 3), (9, 3), (7, 3)]),
        // U3: rest of segment 2, most of segment 3
        universe(&[(5, 2), (3, 10), (5, 2), (7, 3), (9, 3), (11, 3), (9, 3)]),
        // U4: rest of segment 3, half of segment 4
        universe(&[(7, 3), (5, 2), (3, 10), (5, 2), (7, 3), (9, 3), (11, 3)]),
        // U5: half of segment 4, half of segment 5
        universe(&[(9, 3), (7, 3), (5, 2), (3, 10), (5, 2), (7, 3), (9, 3)]),
        // U6: rest of segment 5
        universe(&[(11, 3), (9, 3), (7, 3), (5, 2), (3, 5)]),
    ]
}

pub const DEFAULT_SEGMENT_COUNT: u32 = 1;
