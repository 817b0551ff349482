/// Errors surfaced by session operations.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Station index outside the fixed roster.
    #[error("unknown station {0}")]
    UnknownStation(usize),

    /// Two stations were configured on the same frequency.
    #[error("stations {first} and {second} share frequency {frequency}")]
    DuplicateFrequency {
        first: usize,
        second: usize,
        frequency: f64,
    },

    /// The session actor has shut down.
    #[error("session is closed")]
    Closed,
}
