use std::fmt;
use std::time::Instant;

use tokio::sync::oneshot;

use crate::models::{ControllerSettings, Grid, LayoutSettings, RenderSettings, RenderStatus};

/// Reply half of a request/response command. Handlers answer `Err` with a
/// message fit for the API caller; dropping it unanswered resolves the caller
/// with `EventLoopShutdown`.
pub type Responder<T> = oneshot::Sender<Result<T, String>>;

/// Every command the bus serializes, with its typed request and reply channel.
#[derive(Debug)]
pub enum Command {
    // generator
    FrameReady,
    GeneratorCrashed,
    GetGridBounds(Responder<Grid>),
    // api
    FetchRenderSettings(Responder<RenderStatus>),
    SetRenderSettings(RenderSettings, Responder<()>),
    FetchLayoutSettings(Responder<LayoutSettings>),
    SetLayoutSettings(LayoutSettings, Responder<()>),
    FetchNodeSettings(Responder<ControllerSettings>),
    SetNodeSettings(ControllerSettings, Responder<()>),
    BlackoutNodes(Responder<()>),
    ResetApplication(Responder<()>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FrameReady,
    GeneratorCrashed,
    GetGridBounds,
    FetchRenderSettings,
    SetRenderSettings,
    FetchLayoutSettings,
    SetLayoutSettings,
    FetchNodeSettings,
    SetNodeSettings,
    BlackoutNodes,
    ResetApplication,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::FrameReady,
        EventKind::GeneratorCrashed,
        EventKind::GetGridBounds,
        EventKind::FetchRenderSettings,
        EventKind::SetRenderSettings,
        EventKind::FetchLayoutSettings,
        EventKind::SetLayoutSettings,
        EventKind::FetchNodeSettings,
        EventKind::SetNodeSettings,
        EventKind::BlackoutNodes,
        EventKind::ResetApplication,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::FrameReady => "frame ready",
            EventKind::GeneratorCrashed => "generator crashed",
            EventKind::GetGridBounds => "get grid bounds",
            EventKind::FetchRenderSettings => "fetch settings, render",
            EventKind::SetRenderSettings => "set settings, render",
            EventKind::FetchLayoutSettings => "fetch settings, layout",
            EventKind::SetLayoutSettings => "set settings, layout",
            EventKind::FetchNodeSettings => "fetch settings, nodes",
            EventKind::SetNodeSettings => "set settings, nodes",
            EventKind::BlackoutNodes => "blackout nodes",
            EventKind::ResetApplication => "reset application",
        };
        f.write_str(name)
    }
}

impl Command {
    pub fn kind(&self) -> EventKind {
        match self {
            Command::FrameReady => EventKind::FrameReady,
            Command::GeneratorCrashed => EventKind::GeneratorCrashed,
            Command::GetGridBounds(_) => EventKind::GetGridBounds,
            Command::FetchRenderSettings(_) => EventKind::FetchRenderSettings,
            Command::SetRenderSettings(..) => EventKind::SetRenderSettings,
            Command::FetchLayoutSettings(_) => EventKind::FetchLayoutSettings,
            Command::SetLayoutSettings(..) => EventKind::SetLayoutSettings,
            Command::FetchNodeSettings(_) => EventKind::FetchNodeSettings,
            Command::SetNodeSettings(..) => EventKind::SetNodeSettings,
            Command::BlackoutNodes(_) => EventKind::BlackoutNodes,
            Command::ResetApplication(_) => EventKind::ResetApplication,
        }
    }
}

/// A command in flight, stamped when it was enqueued.
#[derive(Debug)]
pub struct Event {
    pub trace_id: u64,
    pub requested_at: Instant,
    pub command: Command,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.command.kind()
    }
}

/// Send a handler's answer back to whoever is waiting. A caller that already
/// gave up (timeout) has dropped its receiver; the late reply is discarded.
pub fn reply<T>(responder: Responder<T>, result: Result<T, String>) {
    let _ = responder.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_indices_are_dense() {
        for (i, kind) in EventKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn command_reports_its_kind() {
        let (tx, _rx) = oneshot::channel();
        assert_eq!(Command::BlackoutNodes(tx).kind(), EventKind::BlackoutNodes);
        assert_eq!(Command::FrameReady.kind(), EventKind::FrameReady);
    }

    #[test]
    fn late_reply_is_discarded_quietly() {
        let (tx, rx) = oneshot::channel::<Result<(), String>>();
        drop(rx);
        reply(tx, Ok(()));
    }
}
