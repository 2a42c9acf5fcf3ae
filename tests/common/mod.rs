#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use murmur_lib::controller::link::{Dialer, Link};
use murmur_lib::controller::node::{LinkState, Node};

/// Every frame written by any link, tagged with the node address.
#[derive(Default)]
pub struct Wire {
    pub frames: Mutex<Vec<(String, Vec<u8>)>>,
    pub dials: AtomicUsize,
    /// Fail the next write, once.
    pub break_next_write: AtomicBool,
}

impl Wire {
    pub fn frames_for(&self, address: &str) -> Vec<artnet::ParsedArtDmx> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, bytes)| artnet::parse_artdmx_packet(bytes).unwrap())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.frames.lock().unwrap().clear();
    }
}

pub struct RecordingDialer {
    pub wire: Arc<Wire>,
}

impl RecordingDialer {
    pub fn new() -> (Arc<Self>, Arc<Wire>) {
        let wire = Arc::new(Wire::default());
        (Arc::new(Self { wire: wire.clone() }), wire)
    }
}

struct RecordingLink {
    address: String,
    wire: Arc<Wire>,
}

#[async_trait]
impl Link for RecordingLink {
    async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.wire.break_next_write.swap(false, Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable pulled"));
        }
        self.wire
            .frames
            .lock()
            .unwrap()
            .push((self.address.clone(), buf.to_vec()));
        Ok(buf.len())
    }
}

#[async_trait]
impl Dialer for RecordingDialer {
    async fn dial(&self, _local_address: &str, address: &str) -> io::Result<Box<dyn Link>> {
        self.wire.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingLink {
            address: address.to_string(),
            wire: self.wire.clone(),
        }))
    }
}

pub async fn wait_active(node: &Node) {
    let mut state = node.subscribe_state();
    tokio::time::timeout(Duration::from_secs(2), state.wait_for(|s| *s == LinkState::Active))
        .await
        .expect("node never connected")
        .unwrap();
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
