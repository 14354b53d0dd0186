//! Path → operation mapping and the relay semantics of each operation.
//!
//! The file operations (`files/list`, `files/data`) never touch a session
//! and are served directly by `handlers::files`.

use tracing::{debug, info};

use crate::dispatcher::{Payload, PendingResponse, long_poll};
use crate::session::{Peer, Session};

/// Where a request claims to come from, which decides how its identity is
/// derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Mobile,
    Desktop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `mobile/init`: the runtime (re)started; begin a new generation.
    Init,
    /// `mobile/console`: log output for the debugger.
    Console,
    /// `mobile/breakpoint`: a breakpoint was hit; wait for the next command.
    Breakpoint,
    /// `mobile/incoming`: the runtime waits for the next command.
    MobileIncoming,
    /// `desktop/outgoing`: the debugger sends a command.
    DesktopOutgoing,
    /// `desktop/incoming`: the debugger waits for the next event.
    DesktopIncoming,
}

impl Operation {
    pub fn from_path(path: &str) -> Option<Self> {
        let op = match path {
            "/mobile/init" => Self::Init,
            "/mobile/console" => Self::Console,
            "/mobile/breakpoint" => Self::Breakpoint,
            "/mobile/incoming" => Self::MobileIncoming,
            "/desktop/outgoing" => Self::DesktopOutgoing,
            "/desktop/incoming" => Self::DesktopIncoming,
            _ => return None,
        };
        Some(op)
    }

    pub fn origin(&self) -> Origin {
        match self {
            Self::Init | Self::Console | Self::Breakpoint | Self::MobileIncoming => Origin::Mobile,
            Self::DesktopOutgoing | Self::DesktopIncoming => Origin::Desktop,
        }
    }

    /// Apply a relay operation to `session`. All dispatcher mutations happen
    /// under one lock of the session's channels. A session evicted before the
    /// lock was taken is left untouched and the payload handed back.
    pub async fn apply(&self, session: &Session, payload: Payload) -> Reply {
        let mut channels = session.channels().await;
        if channels.is_retired() {
            return Reply::Retired(payload);
        }
        match self {
            Self::Init => {
                info!(target_id = session.target_id(), "Mobile runtime started a new generation");
                channels.replace_mobile();
                let (client, pending) = long_poll();
                channels.mobile.set_client(client);
                channels.desktop.clear_messages();
                channels.desktop.add_message(payload);
                Reply::Hold(Peer::Mobile, pending)
            }
            Self::Console => {
                channels.desktop.add_message(payload);
                Reply::Ack
            }
            Self::Breakpoint => {
                debug!(target_id = session.target_id(), "Breakpoint hit");
                channels.desktop.add_message(payload);
                let (client, pending) = long_poll();
                channels.mobile.set_client(client);
                Reply::Hold(Peer::Mobile, pending)
            }
            Self::MobileIncoming => {
                let (client, pending) = long_poll();
                channels.mobile.set_client(client);
                Reply::Hold(Peer::Mobile, pending)
            }
            Self::DesktopOutgoing => {
                channels.mobile.add_message(payload);
                Reply::Ack
            }
            Self::DesktopIncoming => {
                let (client, pending) = long_poll();
                channels.desktop.set_client(client);
                Reply::Hold(Peer::Desktop, pending)
            }
        }
    }
}

/// What the HTTP layer should do after an operation was applied.
#[derive(Debug)]
pub enum Reply {
    /// Answer immediately with an empty JSON object.
    Ack,
    /// Hold the request open until the named peer's dispatcher completes it.
    Hold(Peer, PendingResponse),
    /// The session was evicted; resolve again and retry with the payload.
    Retired(Payload),
}
