pub mod cli;
pub mod collab;
pub mod config;
pub mod error;
pub mod events;
pub mod loopback;
pub mod runtime;
pub mod session;
pub mod station;

mod relay;
mod state;

pub use collab::{Broadcaster, ClientSync};
pub use error::SessionError;
pub use events::{ConnectionEvent, EventSink, EventSource, SessionNotice};
pub use session::Session;
pub use sr_music_types::{ClientDescriptor, LinkState, Modulation, RoutingId, SessionStatus};
pub use station::{STATION_COUNT, Station, StationAudio, StationTuning};
