use std::io;

use thiserror::Error;

/// How a bus call can fail. A call always resolves to a value or one of these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("event queue closed")]
    QueueClosed,
    #[error("event queue full")]
    QueueFull,
    #[error("event loop not responding")]
    Timeout,
    #[error("event loop shut down")]
    EventLoopShutdown,
    #[error("{0}")]
    Rejected(String),
    #[error("no handler bound to the bus")]
    Unbound,
}

/// Link failures inside a node actor. Never leaves the actor's retry loop.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("couldn't dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("couldn't send universe {universe} to {address}: {source}")]
    Write {
        address: String,
        universe: u16,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("settings encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Rejected settings changes. The text is what the API caller sees.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid settings: {0}")]
    Invalid(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why the frame generator could not run. It reports a crash and retries.
#[derive(Debug, Error)]
pub enum GraphicsError {
    #[error("invalid frame geometry: {0}")]
    Geometry(String),
    #[error("unknown pattern {0:?}")]
    UnknownPattern(String),
}

/// A single event the dispatch loop could not act on. Logged, never fatal.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("fan-out task failed: {0}")]
    FanOut(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("couldn't read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("couldn't parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Anything that stops the daemon from coming up.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("couldn't start the bus: {0}")]
    Bus(#[from] BusError),
    #[error("runtime error: {0}")]
    Io(#[from] io::Error),
}
