//! Connectivity events flowing into the session and notices flowing out.
//!
//! Reporters (the session-level client, the station clients and the
//! broadcaster) push typed inputs through an [`EventSink`]; the session actor
//! consumes them one at a time and publishes [`SessionNotice`]s on the
//! [`NoticeBus`].

use std::fmt;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};

use crate::error::SessionError;

/// Which collaborator produced a connectivity event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventSource {
    /// Session-level client owned by client sync.
    Session,
    /// Station client at the given index.
    Station(usize),
    /// The broadcaster transport.
    Broadcaster,
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventSource::Session => f.write_str("session"),
            EventSource::Station(index) => write!(f, "station-{index}"),
            EventSource::Broadcaster => f.write_str("broadcaster"),
        }
    }
}

/// A single connected/disconnected report.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionEvent {
    pub source: EventSource,
    pub connected: bool,
    pub message: String,
}

/// Inputs consumed by the session actor.
#[derive(Debug)]
pub(crate) enum SessionInput {
    Connection(ConnectionEvent),
    SecureCoalitions(bool),
    /// Reply once every earlier input has been handled.
    Flush(Sender<()>),
    Shutdown,
}

/// Cloneable handle collaborators use to report into the session.
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: Sender<SessionInput>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<SessionInput>) -> Self {
        Self { tx }
    }

    /// Report a connectivity change.
    ///
    /// Blocks while the session queue is full.
    pub fn connection(
        &self,
        source: EventSource,
        connected: bool,
        message: impl Into<String>,
    ) -> Result<(), SessionError> {
        let event = ConnectionEvent {
            source,
            connected,
            message: message.into(),
        };
        self.tx
            .send(SessionInput::Connection(event))
            .map_err(|_| SessionError::Closed)
    }

    /// Report a change of the server's secure-coalitions setting.
    pub fn secure_coalitions(&self, secure: bool) -> Result<(), SessionError> {
        self.tx
            .send(SessionInput::SecureCoalitions(secure))
            .map_err(|_| SessionError::Closed)
    }
}

/// Notification delivered to the owning application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionNotice {
    /// Every client connected; broadcasting started.
    Connected,
    /// The session dropped, with the reason reported by the collaborator.
    Disconnected { message: String },
}

impl SessionNotice {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionNotice::Connected)
    }

    /// Message carried by the notice; empty for `Connected`.
    pub fn message(&self) -> &str {
        match self {
            SessionNotice::Connected => "",
            SessionNotice::Disconnected { message } => message,
        }
    }
}

/// Fan-out of session notices to any number of subscribers.
#[derive(Clone, Default)]
pub(crate) struct NoticeBus {
    subscribers: Arc<Mutex<Vec<Sender<SessionNotice>>>>,
}

impl NoticeBus {
    pub(crate) fn subscribe(&self) -> Receiver<SessionNotice> {
        let (tx, rx) = crossbeam_channel::unbounded();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Deliver to every live subscriber, dropping the ones that hung up.
    pub(crate) fn publish(&self, notice: SessionNotice) {
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.send(notice.clone()).is_ok());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_reports_closed_after_receiver_drops() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new(tx);
        assert!(sink.connection(EventSource::Session, true, "").is_ok());
        drop(rx);
        assert_eq!(
            sink.connection(EventSource::Station(1), false, "gone"),
            Err(SessionError::Closed)
        );
        assert_eq!(sink.secure_coalitions(true), Err(SessionError::Closed));
    }

    #[test]
    fn notice_bus_delivers_to_all_and_prunes_dropped() {
        let bus = NoticeBus::default();
        let first = bus.subscribe();
        let second = bus.subscribe();
        drop(second);

        bus.publish(SessionNotice::Connected);
        assert_eq!(first.try_recv(), Ok(SessionNotice::Connected));
        assert_eq!(bus.subscribers.lock().unwrap().len(), 1);
    }

    #[test]
    fn notice_message_is_empty_for_connected() {
        assert_eq!(SessionNotice::Connected.message(), "");
        let notice = SessionNotice::Disconnected {
            message: "timeout".to_string(),
        };
        assert_eq!(notice.message(), "timeout");
        assert!(!notice.is_connected());
    }

    #[test]
    fn event_source_display_names_station() {
        assert_eq!(EventSource::Station(3).to_string(), "station-3");
        assert_eq!(EventSource::Broadcaster.to_string(), "broadcaster");
    }
}
