pub mod layout;
pub mod node;
pub mod settings;

pub use layout::{Grid, LedSegment, LedString, LedUniverse, Light, Point};
pub use node::NodeDefinition;
pub use settings::{ControllerSettings, LayoutSettings, RenderSettings, RenderStatus};
