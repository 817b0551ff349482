use std::fmt;

use serde::{Deserialize, Serialize};

/// Radio modulation code carried by a station.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Modulation {
    /// Amplitude modulation.
    #[default]
    Am = 0,
    /// Frequency modulation.
    Fm = 1,
    /// Aircraft intercom.
    Intercom = 2,
    /// Radio switched off.
    Disabled = 3,
}

impl Modulation {
    /// Parse the wire/integer code used by the server.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Am),
            1 => Some(Self::Fm),
            2 => Some(Self::Intercom),
            3 => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Integer code used by the server.
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Opaque remote-addressing handle (the server-side client guid).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoutingId(pub String);

impl RoutingId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoutingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote-facing view of one station after its radio settings were applied.
///
/// Produced by the client-sync layer and pushed to the broadcaster so routing
/// and filtering follow the station's current tuning.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ClientDescriptor {
    /// Station index the descriptor belongs to.
    pub station: usize,
    /// Routing id of the blufor-side client.
    pub blufor: RoutingId,
    /// Routing id of the opfor-side client.
    pub opfor: RoutingId,
    /// Tuned frequency in Hz.
    pub frequency: f64,
    /// Tuned modulation.
    pub modulation: Modulation,
}

/// Session-wide link state.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    /// No session link; initial and terminal state.
    #[default]
    Disconnected,
    /// Every client is connected and the broadcaster is running.
    Connected,
    /// Teardown in progress.
    Disconnecting,
}

/// Point-in-time session status for observers.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionStatus {
    /// Target server address.
    pub server: String,
    /// Current link state.
    pub state: LinkState,
    /// `true` once the owning application requested a deliberate shutdown.
    pub quit_requested: bool,
    /// `true` while the broadcaster run loop is active.
    pub broadcasting: bool,
    /// Last disconnect message reported to the application, if any.
    pub last_disconnect: Option<String>,
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}
