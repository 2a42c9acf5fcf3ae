//! One actor per physical receiver.
//!
//! The actor owns the node's link and the per-universe packet state. It
//! connects, serves send requests from its inbox while the link holds, and on
//! any dial or write failure drops the link, waits out the backoff and dials
//! again. It only ever stops when told to.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use artnet::{ArtDmxPacket, ARTDMX_PACKET_LEN, DMX_CHANNELS};
use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::link::{Dialer, Link};
use crate::error::NodeError;
use crate::models::NodeDefinition;

pub const SEND_INBOX_CAPACITY: usize = 10;
pub const POLL_INBOX_CAPACITY: usize = 5;

/// The 512 channels of one universe. Fan-out writes it, the owning actor
/// snapshots it right before encoding.
pub struct UniverseBuffer {
    data: Mutex<[u8; DMX_CHANNELS]>,
}

impl Default for UniverseBuffer {
    fn default() -> Self {
        Self {
            data: Mutex::new([0; DMX_CHANNELS]),
        }
    }
}

impl UniverseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the channel data.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [u8; DMX_CHANNELS]) -> R) -> R {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut data)
    }

    pub fn snapshot(&self) -> [u8; DMX_CHANNELS] {
        *self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn clear(&self) {
        self.with_mut(|data| data.fill(0));
    }
}

/// Observable connection state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Active,
    Backoff,
}

enum Phase {
    Idle { failed: bool },
    Connecting,
    Active(Box<dyn Link>),
    Backoff,
}

/// Senders into a live actor. Only present while the link is up.
struct Inbox {
    send: mpsc::Sender<u16>,
    poll: mpsc::Sender<()>,
}

struct NodeShared {
    address: String,
    local_address: String,
    universes: Vec<u16>,
    buffers: HashMap<u16, Arc<UniverseBuffer>>,
    dialer: Arc<dyn Dialer>,
    backoff: Duration,
    inbox: RwLock<Option<Inbox>>,
    state: watch::Sender<LinkState>,
}

impl NodeShared {
    fn set_state(&self, state: LinkState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            trace!("[node {}] {:?} -> {:?}", self.address, current, state);
            *current = state;
            true
        });
    }

    fn install_inbox(&self, inbox: Option<Inbox>) {
        *self.inbox.write().unwrap_or_else(|e| e.into_inner()) = inbox;
    }

    fn send_sender(&self) -> Option<mpsc::Sender<u16>> {
        let inbox = self.inbox.read().unwrap_or_else(|e| e.into_inner());
        inbox.as_ref().map(|inbox| inbox.send.clone())
    }
}

struct NodeTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Node {
    shared: Arc<NodeShared>,
    task: tokio::sync::Mutex<Option<NodeTask>>,
}

impl Node {
    pub fn new(definition: &NodeDefinition, local_address: &str, dialer: Arc<dyn Dialer>, backoff: Duration) -> Self {
        let buffers = definition
            .universes
            .iter()
            .map(|&u| (u, Arc::new(UniverseBuffer::new())))
            .collect();
        let (state, _) = watch::channel(LinkState::Idle);
        Self {
            shared: Arc::new(NodeShared {
                address: definition.address.clone(),
                local_address: local_address.to_string(),
                universes: definition.universes.clone(),
                buffers,
                dialer,
                backoff,
                inbox: RwLock::new(None),
                state,
            }),
            task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.shared.address
    }

    pub fn universes(&self) -> &[u16] {
        &self.shared.universes
    }

    pub fn buffer(&self, universe: u16) -> Option<Arc<UniverseBuffer>> {
        self.shared.buffers.get(&universe).cloned()
    }

    pub fn state(&self) -> LinkState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.shared.state.subscribe()
    }

    pub async fn is_running(&self) -> bool {
        self.task.lock().await.is_some()
    }

    /// Spawn the actor loop unless it is already running.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            debug!("[node {}] already running", self.shared.address);
            return;
        }
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(run(self.shared.clone(), stop_rx));
        *task = Some(NodeTask { stop, handle });
        info!("[node {}] started for universes {:?}", self.shared.address, self.shared.universes);
    }

    /// Signal the actor and wait until it has exited. Any open link is
    /// dropped, which abandons a write still in progress.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        let Some(NodeTask { stop, handle }) = task.take() else {
            return;
        };
        stop.send_replace(true);
        if let Err(e) = handle.await {
            error!("[node {}] actor task failed: {e}", self.shared.address);
        }
        info!("[node {}] stopped", self.shared.address);
    }

    /// Ask the actor to transmit `universe` from its buffer. Waits for inbox
    /// room; false when the link is down or the universe is not ours.
    pub async fn request_send(&self, universe: u16) -> bool {
        if !self.shared.buffers.contains_key(&universe) {
            return false;
        }
        let Some(sender) = self.shared.send_sender() else {
            return false;
        };
        sender.send(universe).await.is_ok()
    }

    /// Reserved for discovery. Accepted while the link is up, then ignored.
    pub fn request_poll(&self) -> bool {
        let inbox = self.shared.inbox.read().unwrap_or_else(|e| e.into_inner());
        inbox.as_ref().is_some_and(|inbox| inbox.poll.try_send(()).is_ok())
    }

    /// Zero every owned universe and queue a send for each. Does nothing
    /// unless the link is up; returns how many sends were queued.
    pub async fn blackout(&self) -> usize {
        if self.state() != LinkState::Active {
            debug!("[node {}] not active, skipping blackout", self.shared.address);
            return 0;
        }
        let mut queued = 0;
        for &universe in &self.shared.universes {
            if let Some(buffer) = self.shared.buffers.get(&universe) {
                buffer.clear();
            }
            if self.request_send(universe).await {
                queued += 1;
            }
        }
        queued
    }
}

/// Resolves once a stop is signalled or the node handle is gone.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}

async fn run(shared: Arc<NodeShared>, mut stop: watch::Receiver<bool>) {
    let mut packets: HashMap<u16, ArtDmxPacket> = shared
        .universes
        .iter()
        .map(|&u| (u, ArtDmxPacket::new(u)))
        .collect();
    let mut frame = Vec::with_capacity(ARTDMX_PACKET_LEN);
    let mut phase = Phase::Idle { failed: false };

    loop {
        phase = match phase {
            Phase::Idle { failed } => {
                shared.set_state(LinkState::Idle);
                if failed {
                    Phase::Backoff
                } else {
                    Phase::Connecting
                }
            }
            Phase::Connecting => {
                shared.set_state(LinkState::Connecting);
                let dial = shared.dialer.dial(&shared.local_address, &shared.address);
                tokio::select! {
                    biased;
                    _ = stop_requested(&mut stop) => break,
                    result = dial => match result {
                        Ok(link) => {
                            info!("[node {}] connected", shared.address);
                            Phase::Active(link)
                        }
                        Err(source) => {
                            let e = NodeError::Dial { address: shared.address.clone(), source };
                            warn!("[node {}] {e}", shared.address);
                            Phase::Idle { failed: true }
                        }
                    },
                }
            }
            Phase::Active(link) => {
                match serve(&shared, link, &mut packets, &mut frame, &mut stop).await {
                    Ok(()) => break,
                    Err(e) => {
                        warn!("[node {}] {e}", shared.address);
                        Phase::Idle { failed: true }
                    }
                }
            }
            Phase::Backoff => {
                shared.set_state(LinkState::Backoff);
                tokio::select! {
                    biased;
                    _ = stop_requested(&mut stop) => break,
                    _ = tokio::time::sleep(shared.backoff) => Phase::Connecting,
                }
            }
        };
    }

    shared.install_inbox(None);
    shared.set_state(LinkState::Idle);
}

/// The `Active` state: serve the inboxes over `link` until stopped (`Ok`) or
/// the link fails (`Err`). The link is dropped on return either way.
async fn serve(
    shared: &NodeShared,
    mut link: Box<dyn Link>,
    packets: &mut HashMap<u16, ArtDmxPacket>,
    frame: &mut Vec<u8>,
    stop: &mut watch::Receiver<bool>,
) -> Result<(), NodeError> {
    let (send, mut sends) = mpsc::channel(SEND_INBOX_CAPACITY);
    let (poll, mut polls) = mpsc::channel(POLL_INBOX_CAPACITY);
    shared.install_inbox(Some(Inbox { send, poll }));
    // inbox first, so anyone who sees Active can send
    shared.set_state(LinkState::Active);

    let result = loop {
        tokio::select! {
            biased;
            _ = stop_requested(stop) => break Ok(()),
            Some(()) = polls.recv() => {
                trace!("[node {}] poll request ignored", shared.address);
            }
            Some(universe) = sends.recv() => {
                let (Some(buffer), Some(packet)) = (shared.buffers.get(&universe), packets.get_mut(&universe)) else {
                    continue;
                };
                packet.encode_into(&buffer.snapshot(), frame);
                tokio::select! {
                    biased;
                    _ = stop_requested(stop) => break Ok(()),
                    written = write_all(link.as_mut(), frame.as_slice()) => {
                        if let Err(source) = written {
                            break Err(NodeError::Write {
                                address: shared.address.clone(),
                                universe,
                                source,
                            });
                        }
                    }
                }
            }
        }
    };

    shared.install_inbox(None);
    result
}

/// Keep writing until the whole frame is out. A zero-length write means the
/// link can take no more and counts as a failure.
async fn write_all(link: &mut dyn Link, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match link.write(buf).await? {
            0 => return Err(io::Error::new(io::ErrorKind::WriteZero, "link accepted no bytes")),
            n => buf = &buf[n..],
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Accepts at most `chunk` bytes per write and records completed frames.
    struct ChunkedLink {
        chunk: usize,
        written: Arc<Mutex<Vec<u8>>>,
    }

    #[async_trait]
    impl Link for ChunkedLink {
        async fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.written.lock().unwrap().extend_from_slice(&buf[..n]);
            Ok(n)
        }
    }

    struct ChunkedDialer {
        chunk: usize,
        written: Arc<Mutex<Vec<u8>>>,
        dials: AtomicUsize,
    }

    #[async_trait]
    impl Dialer for ChunkedDialer {
        async fn dial(&self, _local: &str, _address: &str) -> io::Result<Box<dyn Link>> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ChunkedLink {
                chunk: self.chunk,
                written: self.written.clone(),
            }))
        }
    }

    struct RefusingDialer {
        dials: AtomicUsize,
    }

    #[async_trait]
    impl Dialer for RefusingDialer {
        async fn dial(&self, _local: &str, _address: &str) -> io::Result<Box<dyn Link>> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
        }
    }

    fn chunked(chunk: usize) -> (Arc<ChunkedDialer>, Arc<Mutex<Vec<u8>>>) {
        let written = Arc::new(Mutex::new(Vec::new()));
        let dialer = Arc::new(ChunkedDialer {
            chunk,
            written: written.clone(),
            dials: AtomicUsize::new(0),
        });
        (dialer, written)
    }

    async fn wait_for_state(node: &Node, state: LinkState) {
        let mut rx = node.subscribe_state();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == state))
            .await
            .expect("state never reached")
            .unwrap();
    }

    #[test]
    fn buffer_clear_zeroes_everything() {
        let buffer = UniverseBuffer::new();
        buffer.with_mut(|d| d[..3].copy_from_slice(&[1, 2, 3]));
        assert_eq!(&buffer.snapshot()[..3], &[1, 2, 3]);
        buffer.clear();
        assert!(buffer.snapshot().iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn partial_writes_still_deliver_whole_frames() {
        let (dialer, written) = chunked(100);
        let node = Node::new(&NodeDefinition::new("10.0.0.1", vec![3]), "", dialer, Duration::from_millis(10));
        node.start().await;
        wait_for_state(&node, LinkState::Active).await;

        node.buffer(3).unwrap().with_mut(|d| d[0] = 0xAB);
        assert!(node.request_send(3).await);
        tokio::time::timeout(Duration::from_secs(2), async {
            while written.lock().unwrap().len() < ARTDMX_PACKET_LEN {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("frame never written");
        node.stop().await;

        let bytes = written.lock().unwrap().clone();
        assert_eq!(bytes.len(), ARTDMX_PACKET_LEN);
        let parsed = artnet::parse_artdmx_packet(&bytes).unwrap();
        assert_eq!(parsed.universe, 3);
        assert_eq!(parsed.sequence, 1);
        assert_eq!(parsed.data[0], 0xAB);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let (dialer, _) = chunked(usize::MAX);
        let node = Node::new(&NodeDefinition::new("10.0.0.1", vec![0]), "", dialer.clone(), Duration::from_millis(10));

        node.start().await;
        node.start().await;
        wait_for_state(&node, LinkState::Active).await;
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 1);

        node.stop().await;
        node.stop().await;
        assert!(!node.is_running().await);
        assert_eq!(node.state(), LinkState::Idle);
        assert!(!node.request_send(0).await);
    }

    #[tokio::test]
    async fn refused_dial_keeps_retrying_until_stopped() {
        let dialer = Arc::new(RefusingDialer {
            dials: AtomicUsize::new(0),
        });
        let node = Node::new(&NodeDefinition::new("10.0.0.1", vec![0]), "", dialer.clone(), Duration::from_millis(20));
        node.start().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(dialer.dials.load(Ordering::SeqCst) >= 2);
        assert!(!node.request_send(0).await);

        tokio::time::timeout(Duration::from_secs(1), node.stop())
            .await
            .expect("stop hung during backoff");
    }

    #[tokio::test]
    async fn blackout_is_skipped_while_disconnected() {
        let dialer = Arc::new(RefusingDialer {
            dials: AtomicUsize::new(0),
        });
        let node = Node::new(&NodeDefinition::new("10.0.0.1", vec![0, 1]), "", dialer, Duration::from_secs(5));
        node.buffer(1).unwrap().with_mut(|d| d[7] = 9);
        node.start().await;
        assert_eq!(node.blackout().await, 0);
        assert_eq!(node.buffer(1).unwrap().snapshot()[7], 9);
        node.stop().await;
    }

    #[tokio::test]
    async fn sends_for_foreign_universes_are_refused() {
        let (dialer, _) = chunked(usize::MAX);
        let node = Node::new(&NodeDefinition::new("10.0.0.1", vec![0]), "", dialer, Duration::from_millis(10));
        node.start().await;
        wait_for_state(&node, LinkState::Active).await;
        assert!(!node.request_send(9).await);
        assert!(node.request_poll());
        node.stop().await;
    }
}
