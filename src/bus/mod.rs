//! Command bus
//!
//! Every cross-service interaction goes through here. A single dispatch loop
//! pulls events in arrival order and runs each handler to completion before
//! taking the next, so services never need to lock against one another.
//! Callers either fire-and-forget (`enqueue`) or wait for a typed reply
//! (`call`), bounded by the busy-timeout.

pub mod commands;
pub mod events;
pub mod subscribers;

pub use events::{reply, Command, Event, EventKind, Responder};
pub use subscribers::{Callback, SubscriberId};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::BusConfig;
use crate::error::{BusError, DispatchError};
use subscribers::Subscribers;

/// What the dispatch loop should do once a handler returns.
pub enum Flow {
    Continue,
    /// The handler swapped in a fresh queue (reset); read from it from now on.
    Replace(mpsc::Receiver<Event>),
}

/// The services behind the bus. The loop owns the implementation exclusively
/// while running and hands it back on shutdown.
#[async_trait]
pub trait Dispatch: Send + 'static {
    async fn startup(&mut self) {}
    async fn shutdown(&mut self) {}
    async fn dispatch(&mut self, event: Event) -> Result<Flow, DispatchError>;
}

struct BusShared {
    /// `None` while stopped or mid-reset; enqueues fail fast.
    queue: RwLock<Option<mpsc::Sender<Event>>>,
    queue_size: usize,
    busy_timeout: Duration,
    next_trace_id: AtomicU64,
    running: watch::Sender<bool>,
    subscribers: RwLock<Subscribers>,
}

/// Cheap, clonable entry point handed to every collaborator.
#[derive(Clone)]
pub struct BusHandle {
    shared: Arc<BusShared>,
}

impl BusHandle {
    fn new(config: &BusConfig) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            shared: Arc::new(BusShared {
                queue: RwLock::new(None),
                queue_size: config.queue_size.max(1),
                busy_timeout: config.busy_timeout(),
                next_trace_id: AtomicU64::new(0),
                running,
                subscribers: RwLock::new(Subscribers::new()),
            }),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        self.shared.busy_timeout
    }

    pub fn is_running(&self) -> bool {
        *self.shared.running.borrow()
    }

    fn next_event(&self, command: Command) -> Event {
        Event {
            trace_id: self.shared.next_trace_id.fetch_add(1, Ordering::Relaxed) + 1,
            requested_at: Instant::now(),
            command,
        }
    }

    fn sender(&self) -> Result<mpsc::Sender<Event>, BusError> {
        let queue = self.shared.queue.read().unwrap_or_else(|e| e.into_inner());
        queue.clone().ok_or(BusError::QueueClosed)
    }

    /// Fire-and-forget. Never blocks: a full queue is reported, not waited on.
    pub fn enqueue(&self, command: Command) -> Result<(), BusError> {
        let sender = self.sender()?;
        sender
            .try_send(self.next_event(command))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => BusError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => BusError::QueueClosed,
            })
    }

    /// Request/response bounded by the configured busy-timeout.
    pub async fn call<T>(&self, build: impl FnOnce(Responder<T>) -> Command) -> Result<T, BusError> {
        self.call_with_timeout(self.shared.busy_timeout, build).await
    }

    /// Enqueue a request and wait for its reply, the loop going down, or
    /// `timeout`, whichever comes first. A handler still running at the
    /// deadline is left alone; its reply lands on a dropped receiver.
    pub async fn call_with_timeout<T>(
        &self,
        timeout: Duration,
        build: impl FnOnce(Responder<T>) -> Command,
    ) -> Result<T, BusError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut running = self.shared.running.subscribe();
        let sender = self.sender()?;

        let (tx, rx) = oneshot::channel();
        let event = self.next_event(build(tx));
        match tokio::time::timeout_at(deadline, sender.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => return Err(BusError::QueueClosed),
            Err(_) => return Err(BusError::Timeout),
        }
        drop(sender);

        tokio::select! {
            biased;
            answer = rx => match answer {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(message)) => Err(BusError::Rejected(message)),
                Err(_) => Err(BusError::EventLoopShutdown),
            },
            _ = stopped(&mut running) => Err(BusError::EventLoopShutdown),
            _ = tokio::time::sleep_until(deadline) => Err(BusError::Timeout),
        }
    }

    /// Run `callback` on the dispatch loop after every handled event of `kind`.
    pub fn subscribe(&self, kind: EventKind, callback: impl Fn() + Send + Sync + 'static) -> SubscriberId {
        let mut subscribers = self.shared.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let id = subscribers.subscribe(kind, Arc::new(callback));
        debug!("[bus] subscribed to {kind} ({id:?})");
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.shared.subscribers.write().unwrap_or_else(|e| e.into_inner());
        subscribers.unsubscribe(id)
    }

    fn notify(&self, kind: EventKind) {
        let callbacks = {
            let subscribers = self.shared.subscribers.read().unwrap_or_else(|e| e.into_inner());
            subscribers.callbacks(kind)
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Stop accepting events. Anything already queued stays with the old
    /// receiver.
    pub fn close_queue(&self) {
        let mut queue = self.shared.queue.write().unwrap_or_else(|e| e.into_inner());
        *queue = None;
    }

    /// Install a fresh, empty queue and return its receiving end.
    pub fn open_queue(&self) -> mpsc::Receiver<Event> {
        let (tx, rx) = mpsc::channel(self.shared.queue_size);
        let mut queue = self.shared.queue.write().unwrap_or_else(|e| e.into_inner());
        *queue = Some(tx);
        rx
    }
}

/// Resolves once the bus is marked stopped (or the bus itself is gone).
async fn stopped(running: &mut watch::Receiver<bool>) {
    let _ = running.wait_for(|r| !*r).await;
}

enum Slot<H> {
    Unbound,
    Idle(H),
    Running(JoinHandle<H>),
}

pub struct Bus<H: Dispatch> {
    handle: BusHandle,
    slot: Mutex<Slot<H>>,
}

impl<H: Dispatch> Bus<H> {
    pub fn new(config: &BusConfig) -> Self {
        info!("[bus] creating");
        Self {
            handle: BusHandle::new(config),
            slot: Mutex::new(Slot::Unbound),
        }
    }

    pub fn handle(&self) -> BusHandle {
        self.handle.clone()
    }

    /// Attach the services. Refused (and handed back) while the loop runs.
    pub async fn bind(&self, handler: H) -> Result<(), H> {
        let mut slot = self.slot.lock().await;
        if matches!(*slot, Slot::Running(_)) {
            return Err(handler);
        }
        *slot = Slot::Idle(handler);
        Ok(())
    }

    /// Open the queue, start the services and spawn the dispatch loop.
    /// A second call while running does nothing.
    pub async fn startup(&self) -> Result<(), BusError> {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Unbound) {
            Slot::Running(task) => {
                *slot = Slot::Running(task);
                debug!("[bus] event loop already running");
                Ok(())
            }
            Slot::Unbound => Err(BusError::Unbound),
            Slot::Idle(mut handler) => {
                info!("[bus] starting");
                self.handle.shared.running.send_replace(true);
                let rx = self.handle.open_queue();
                handler.startup().await;
                let task = tokio::spawn(run_event_loop(self.handle.clone(), handler, rx));
                *slot = Slot::Running(task);
                info!("[bus] started");
                Ok(())
            }
        }
    }

    /// Close the queue, stop the loop (pending events are dropped and their
    /// callers released with `EventLoopShutdown`), then stop the services.
    /// A second call while stopped does nothing.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        match std::mem::replace(&mut *slot, Slot::Unbound) {
            Slot::Running(task) => {
                info!("[bus] shutting down");
                self.handle.close_queue();
                self.handle.shared.running.send_replace(false);
                match task.await {
                    Ok(mut handler) => {
                        handler.shutdown().await;
                        *slot = Slot::Idle(handler);
                        info!("[bus] stopped");
                    }
                    Err(e) => error!("[bus] event loop task failed: {e}"),
                }
            }
            other => {
                *slot = other;
                debug!("[bus] event loop is already down");
            }
        }
    }
}

async fn run_event_loop<H: Dispatch>(bus: BusHandle, mut handler: H, mut rx: mpsc::Receiver<Event>) -> H {
    info!("[bus] event loop running");
    let mut running = bus.shared.running.subscribe();

    loop {
        let event = tokio::select! {
            biased;
            _ = stopped(&mut running) => break,
            event = rx.recv() => event,
        };
        let Some(event) = event else {
            // every sender is gone; only happens if a reset forgot to hand
            // over the new receiver
            warn!("[bus] event queue closed under the loop");
            break;
        };

        let kind = event.kind();
        let trace_id = event.trace_id;
        let requested_at = event.requested_at;

        match handler.dispatch(event).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Replace(fresh)) => {
                debug!("[bus] switched to fresh event queue");
                rx = fresh;
            }
            Err(e) => warn!("[bus] error handling {kind} (trace {trace_id}): {e}"),
        }
        bus.notify(kind);

        debug!(
            "[bus] handled {kind} (trace {trace_id}) in {:?}",
            requested_at.elapsed()
        );
    }

    info!("[bus] event loop closed");
    handler
}
