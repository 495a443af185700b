//! Smart cube link.
//!
//! [`link::CubeLink`] owns the wireless session with the cube, normalizes
//! decoded [`protocol`] frames into connectivity, move and solved state, and
//! reconnects with [`backoff`] while the operator wants the link up. The
//! radio itself sits behind the [`transport`] traits and only relays
//! frames; [`cipher`] keys each session from the cube's address.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use utoipa::ToSchema;

pub mod backoff;
pub mod cipher;
pub mod link;
pub mod protocol;
pub mod transport;

pub use link::CubeLink;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("no cube transport configured")]
    NoTransport,

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("link idle for {0:?}")]
    ReadTimeout(std::time::Duration),

    #[error("cube link lost")]
    Lost,

    #[error("malformed frame: {0}")]
    Malformed(#[from] protocol::FrameError),

    #[error("bridge protocol error: {0}")]
    Bridge(String),

    #[error("serial port: {0}")]
    Serial(#[from] tokio_serial::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Cube face, in the order the cube reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Face {
    U,
    R,
    F,
    D,
    L,
    B,
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

/// One quarter turn reported by the cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CubeMove {
    pub face: Face,
    pub direction: Direction,

    /// Cube-side move counter, wraps at 16 bits.
    pub serial: u16,
}

impl fmt::Display for CubeMove {
    /// Singmaster notation, e.g. `R` or `U'`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Clockwise => write!(f, "{}", self.face),
            Direction::CounterClockwise => write!(f, "{}'", self.face),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LinkPhase {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Last known state of the cube and its link.
///
/// Written only by the [`CubeLink`] actor.
#[derive(Debug, Clone, Default)]
pub struct CubeLinkState {
    pub phase: LinkPhase,

    /// Last explicit solved/unsolved signal. Survives link loss.
    pub solved: bool,

    pub last_move: Option<CubeMove>,

    /// Battery level in percent, once reported.
    pub battery: Option<u8>,

    pub last_event: Option<Instant>,
}
