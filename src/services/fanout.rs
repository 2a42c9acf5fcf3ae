use std::sync::Arc;

use log::trace;
use tokio::sync::OwnedRwLockReadGuard;
use tokio::task::JoinSet;

use crate::controller::ControllerService;
use crate::error::DispatchError;
use crate::graphics::FrameBuffer;
use crate::layout::{LightUniverses, CHANNELS_PER_PIXEL};

/// Project one frame onto the universe buffers and ask each owning node to
/// transmit. One task per lit universe; returns once all have finished,
/// with the number of sends the nodes accepted.
///
/// The caller holds the frame's read guard through this call, so the frame
/// can't be repainted under a half-written universe.
pub async fn fan_out(
    frame: Arc<OwnedRwLockReadGuard<FrameBuffer>>,
    lights: Arc<LightUniverses>,
    controller: &ControllerService,
) -> Result<usize, DispatchError> {
    let mut tasks = JoinSet::new();

    for (index, universe_lights) in lights.iter().enumerate() {
        let Some(first) = universe_lights.first() else {
            continue;
        };
        let universe = first.universe;
        let Some(node) = controller.node_for(universe) else {
            trace!("[fanout] universe {universe} has no node");
            continue;
        };
        let Some(buffer) = node.buffer(universe) else {
            continue;
        };

        let frame = frame.clone();
        let lights = lights.clone();
        tasks.spawn(async move {
            buffer.with_mut(|data| {
                for light in &lights[index] {
                    let offset = light.pixel * CHANNELS_PER_PIXEL;
                    let Some(channels) = data.get_mut(offset..offset + CHANNELS_PER_PIXEL) else {
                        continue;
                    };
                    channels.copy_from_slice(&frame.pixel(light.position));
                }
            });
            node.request_send(universe).await
        });
    }

    let mut sent = 0;
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(true) => sent += 1,
            Ok(false) => {}
            Err(e) => failure = Some(e.to_string()),
        }
    }
    match failure {
        Some(reason) => Err(DispatchError::FanOut(reason)),
        None => Ok(sent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::controller::link::{Dialer, Link};
    use crate::layout::build_lights;
    use crate::models::{Grid, LayoutSettings, LedString, NodeDefinition};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::io;

    struct Offline;

    #[async_trait]
    impl Dialer for Offline {
        async fn dial(&self, _local: &str, _address: &str) -> io::Result<Box<dyn Link>> {
            Err(io::Error::new(io::ErrorKind::NotConnected, "offline"))
        }
    }

    #[tokio::test]
    async fn every_light_lands_at_its_channel_offset() {
        let layout = LayoutSettings {
            segment_definition: vec![vec![LedString::new(3, 2)], vec![LedString::new(1, 1)]],
            segment_count: 1,
        };
        let (lights, grid) = build_lights(&layout);
        assert_eq!(
            grid,
            Grid {
                min_x: 0,
                max_x: 2,
                min_y: -1,
                max_y: 1
            }
        );

        let mut frame = FrameBuffer::new(grid, 1).unwrap();
        for x in 0..3usize {
            for y in 0..3usize {
                frame.set(x, y, [x as u8 * 10 + 1, y as u8 * 10 + 2, 7]);
            }
        }
        let frame = Arc::new(Arc::new(tokio::sync::RwLock::new(frame)).read_owned().await);

        let config = ControllerConfig {
            node_definitions: vec![
                NodeDefinition::new("10.0.0.1", vec![0]),
                NodeDefinition::new("10.0.0.2", vec![1]),
            ],
            ..ControllerConfig::default()
        };
        let mut controller = ControllerService::new(Arc::new(MemoryStore::new()), Arc::new(Offline), &config);
        controller.setup().await;

        let lights = Arc::new(lights);
        // nodes are offline, so nothing is sent, but buffers are filled
        let sent = fan_out(frame.clone(), lights.clone(), &controller).await.unwrap();
        assert_eq!(sent, 0);

        for universe_lights in lights.iter() {
            for light in universe_lights {
                let node = controller.node_for(light.universe).unwrap();
                let data = node.buffer(light.universe).unwrap().snapshot();
                let at = light.pixel * 3;
                assert_eq!(&data[at..at + 3], &frame.pixel(light.position), "{light:?}");
            }
        }
        let untouched = controller.node_for(1).unwrap().buffer(1).unwrap().snapshot();
        assert!(untouched[3..].iter().all(|&b| b == 0));
    }
}
