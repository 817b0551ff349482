//! Collaborator seams.
//!
//! The transport, authentication and packet framing live behind these traits.
//! Both are shared between the session actor, the broadcaster thread and the
//! station audio producers, so implementations must be `Send + Sync`.

use anyhow::Result;
use sr_music_types::{ClientDescriptor, Modulation, RoutingId};

use crate::events::EventSink;

/// Per-station and session-level client connectivity.
pub trait ClientSync: Send + Sync {
    /// Hand over the sink used by the session-level client and every station
    /// client to report connectivity and coalition changes.
    fn attach(&self, sink: EventSink);

    /// Start connecting every client. Progress is reported through the sink.
    fn connect(&self) -> Result<()>;

    /// Disconnect every client, returning once all of them are down.
    fn disconnect(&self) -> Result<()>;

    /// `true` when the session-level client and all station clients are connected.
    fn all_clients_connected(&self) -> bool;

    /// Apply new radio settings to a station's remote-facing clients.
    fn update_radio_settings(
        &self,
        station: usize,
        frequency: f64,
        modulation: Modulation,
    ) -> Result<ClientDescriptor>;

    /// Current `(blufor, opfor)` routing ids of a station.
    fn routing_ids(&self, station: usize) -> Result<(RoutingId, RoutingId)>;
}

/// Outbound audio transport.
pub trait Broadcaster: Send + Sync {
    /// Hand over the sink used to report the transport's own connectivity.
    fn attach(&self, sink: EventSink);

    /// Transport loop. Blocks until [`Broadcaster::stop`] is called.
    fn run(&self) -> Result<()>;

    /// Ask the transport loop to return.
    fn stop(&self);

    /// Send one audio packet addressed to both coalition clients.
    fn send_packet(&self, blufor: &RoutingId, opfor: &RoutingId, audio: &[u8]) -> Result<()>;

    /// Refresh routing/filtering for a station client.
    fn update_client_radio(&self, client: ClientDescriptor);

    fn set_secure_coalitions(&self, secure: bool);
}
