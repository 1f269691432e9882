//! Session state machine shared between the registry and the gateway's
//! session actors.

use serde::{Deserialize, Serialize};

/// Where a session sits in its lifecycle.
///
/// ```text
///             start()            handshake_ok
///   [init] ──────────► [connecting] ──────────► [ready]
///                          │                      │
///                 handshake_fail             transport_err
///                          ▼                      ▼
///                      [failed] ◄──retries──── [degraded]
///                          │      exhausted      │ reconnect_ok
///                          │                     └────► [ready]
///                          │  reconnect()
///                          └──────────────────► [connecting]
///   any state ── stop() ──► [stopped] (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Init,
    Connecting,
    Ready,
    Degraded,
    Failed,
    Stopped,
}

impl SessionState {
    /// Only `ready` and `degraded` sessions contribute entries to the catalog.
    pub fn exposes_inventory(&self) -> bool {
        matches!(self, Self::Ready | Self::Degraded)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_ready_and_degraded_expose_inventory() {
        assert!(SessionState::Ready.exposes_inventory());
        assert!(SessionState::Degraded.exposes_inventory());
        assert!(!SessionState::Init.exposes_inventory());
        assert!(!SessionState::Failed.exposes_inventory());
        assert!(!SessionState::Stopped.exposes_inventory());
    }
}
