//! Session coordinator.
//!
//! A single actor thread owns the link state and consumes connectivity events
//! from the session-level client, the four station clients and the
//! broadcaster. It starts the broadcaster loop once every client is up, tears
//! the session down when any of them drops, and tells the application about
//! each transition exactly once.

use std::any::Any;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, Sender};
use sr_music_types::{ClientDescriptor, LinkState, Modulation, SessionStatus};

use crate::collab::{Broadcaster, ClientSync};
use crate::config::{MIN_QUEUE_CAPACITY, SessionOptions};
use crate::error::SessionError;
use crate::events::{ConnectionEvent, EventSink, NoticeBus, SessionInput, SessionNotice};
use crate::relay::Relay;
use crate::state::{SessionState, Transition};
use crate::station::{STATION_COUNT, Station, StationAudio, StationRoster};

/// Message sent when a transition fails part-way.
pub const FAILURE_MESSAGE: &str = "connection failed";

/// One connection attempt to a server.
///
/// Dropping the session stops the actor thread; a new session is built to retry.
pub struct Session {
    server: SocketAddr,
    client_sync: Arc<dyn ClientSync>,
    relay: Relay,
    roster: RwLock<StationRoster>,
    quit: Arc<AtomicBool>,
    status: Arc<Mutex<SessionStatus>>,
    notices: NoticeBus,
    input_tx: Option<Sender<SessionInput>>,
    actor: Option<JoinHandle<()>>,
}

impl Session {
    /// Build the roster, attach the collaborators and start the actor thread.
    pub fn new(
        options: SessionOptions,
        client_sync: Arc<dyn ClientSync>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Result<Self> {
        let roster = StationRoster::new(options.stations)?;
        let queue_capacity = options.queue_capacity.max(MIN_QUEUE_CAPACITY);
        let (input_tx, input_rx) = crossbeam_channel::bounded(queue_capacity);
        let quit = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(SessionStatus {
            server: options.server.to_string(),
            ..SessionStatus::default()
        }));
        let notices = NoticeBus::default();
        let relay = Relay::new(client_sync.clone(), broadcaster.clone());

        let actor = SessionActor {
            server: options.server,
            state: SessionState::default(),
            client_sync: client_sync.clone(),
            broadcaster: broadcaster.clone(),
            relay: relay.clone(),
            quit: quit.clone(),
            status: status.clone(),
            notices: notices.clone(),
            broadcast_thread: None,
            retired_thread: None,
            input_rx,
            pending: VecDeque::new(),
        };
        let handle = thread::Builder::new()
            .name("sr-session".to_string())
            .spawn(move || session_thread_main(actor))
            .context("spawn session thread")?;

        client_sync.attach(EventSink::new(input_tx.clone()));
        broadcaster.attach(EventSink::new(input_tx.clone()));

        tracing::info!(
            server = %options.server,
            queue_capacity,
            "session created"
        );
        Ok(Self {
            server: options.server,
            client_sync,
            relay,
            roster: RwLock::new(roster),
            quit,
            status,
            notices,
            input_tx: Some(input_tx),
            actor: Some(handle),
        })
    }

    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Subscribe to connected/disconnected notices.
    pub fn subscribe(&self) -> Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    /// Ask client sync to connect every client. Failures are logged.
    pub fn connect(&self) {
        if let Err(e) = self.client_sync.connect() {
            tracing::error!(error = %format!("{e:#}"), "failed to connect session");
        }
    }

    /// Ask client sync to disconnect every client. Failures are logged.
    pub fn disconnect(&self) {
        if let Err(e) = self.client_sync.disconnect() {
            tracing::error!(
                error = %format!("{e:#}"),
                "error encountered when disconnecting session"
            );
        }
    }

    /// Mark a deliberate shutdown; later disconnect events are absorbed.
    pub fn set_quit(&self, quit: bool) {
        self.quit.store(quit, Ordering::SeqCst);
    }

    pub fn quit_requested(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SessionStatus {
        let mut status = self
            .status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|err| err.into_inner().clone());
        status.quit_requested = self.quit_requested();
        status
    }

    pub fn is_connected(&self) -> bool {
        self.status().state == LinkState::Connected
    }

    /// Block until every input queued before this call has been handled.
    pub fn flush(&self) -> Result<(), SessionError> {
        let input_tx = self.input_tx.as_ref().ok_or(SessionError::Closed)?;
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        input_tx
            .send(SessionInput::Flush(done_tx))
            .map_err(|_| SessionError::Closed)?;
        done_rx.recv().map_err(|_| SessionError::Closed)
    }

    pub fn stations(&self) -> Vec<Station> {
        self.read_roster().iter().cloned().collect()
    }

    pub fn station(&self, index: usize) -> Result<Station, SessionError> {
        self.read_roster().get(index).cloned()
    }

    /// Return `frequency` if no other station holds it, else the station's
    /// current frequency.
    pub fn verify_unique_frequency(
        &self,
        station: usize,
        frequency: f64,
    ) -> Result<f64, SessionError> {
        self.read_roster().verify_unique_frequency(station, frequency)
    }

    /// Verify, store and propagate new radio settings for a station.
    ///
    /// Returns the frequency that took effect. The roster stays write-locked
    /// until the settings are propagated, so collaborators see tunes of a
    /// station in the order they were stored.
    pub fn tune_station(
        &self,
        station: usize,
        frequency: f64,
        modulation: Modulation,
    ) -> Result<f64> {
        let mut roster = self.roster.write().unwrap_or_else(|err| err.into_inner());
        let effective = roster.retune(station, frequency, modulation)?;
        if effective != frequency {
            tracing::info!(
                station,
                requested = frequency,
                kept = effective,
                "frequency already in use by another station"
            );
        }
        self.relay.update_station_radio(station, effective, modulation)?;
        drop(roster);
        Ok(effective)
    }

    /// Push a station's radio settings to client sync and the broadcaster.
    pub fn update_station_radio(
        &self,
        station: usize,
        frequency: f64,
        modulation: Modulation,
    ) -> Result<ClientDescriptor> {
        self.relay.update_station_radio(station, frequency, modulation)
    }

    /// Forward one audio buffer produced by `station` to the broadcaster.
    pub fn broadcast(&self, station: usize, audio: &[u8]) -> Result<()> {
        self.relay.broadcast(station, audio)
    }

    /// Audio tap for a station's local producer.
    pub fn station_audio(&self, station: usize) -> Result<StationAudio, SessionError> {
        if station >= STATION_COUNT {
            return Err(SessionError::UnknownStation(station));
        }
        Ok(StationAudio::new(station, self.relay.clone()))
    }

    /// Stop the actor thread and wait for it.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(input_tx) = self.input_tx.take() {
            let _ = input_tx.send(SessionInput::Shutdown);
        }
        if let Some(handle) = self.actor.take() {
            if handle.join().is_err() {
                tracing::warn!("session thread panicked");
            }
        }
    }

    fn read_roster(&self) -> std::sync::RwLockReadGuard<'_, StationRoster> {
        self.roster.read().unwrap_or_else(|err| err.into_inner())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the session thread.
struct SessionActor {
    server: SocketAddr,
    state: SessionState,
    client_sync: Arc<dyn ClientSync>,
    broadcaster: Arc<dyn Broadcaster>,
    relay: Relay,
    quit: Arc<AtomicBool>,
    status: Arc<Mutex<SessionStatus>>,
    notices: NoticeBus,
    broadcast_thread: Option<JoinHandle<()>>,
    /// Loop told to stop but not yet joined.
    retired_thread: Option<JoinHandle<()>>,
    input_rx: Receiver<SessionInput>,
    /// Inputs taken off the queue during teardown, handled before new ones.
    pending: VecDeque<SessionInput>,
}

/// Main loop for the session thread.
fn session_thread_main(mut actor: SessionActor) {
    while let Some(input) = actor.next_input() {
        match input {
            SessionInput::Connection(event) => actor.handle_connection(event),
            SessionInput::SecureCoalitions(secure) => {
                actor.relay.secure_coalitions_changed(secure)
            }
            SessionInput::Flush(done) => {
                let _ = done.send(());
            }
            SessionInput::Shutdown => break,
        }
    }
    if actor.broadcast_thread.is_some() {
        actor.stop_broadcaster();
        actor.publish_status(None);
    }
    actor.join_retired();
    tracing::debug!(server = %actor.server, "session thread exiting");
}

impl SessionActor {
    fn next_input(&mut self) -> Option<SessionInput> {
        match self.pending.pop_front() {
            Some(input) => Some(input),
            None => self.input_rx.recv().ok(),
        }
    }

    fn handle_connection(&mut self, event: ConnectionEvent) {
        tracing::debug!(
            source = %event.source,
            connected = event.connected,
            message = %event.message,
            "connection event"
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.apply(&event)));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => panic_message(payload.as_ref()),
        };
        tracing::error!(
            error = %failure,
            source = %event.source,
            "failed to update connection status"
        );
        if self.broadcast_thread.is_some() {
            self.stop_broadcaster();
        }
        self.state.force_disconnected();
        self.publish_status(Some(FAILURE_MESSAGE));
        self.notices.publish(SessionNotice::Disconnected {
            message: FAILURE_MESSAGE.to_string(),
        });
    }

    fn apply(&mut self, event: &ConnectionEvent) -> Result<()> {
        let quit = self.quit.load(Ordering::SeqCst);
        let client_sync = &self.client_sync;
        let transition =
            self.state
                .on_connection_event(event.connected, &event.message, quit, || {
                    client_sync.all_clients_connected()
                });

        match transition {
            Transition::Ignore => {}
            Transition::Connect => {
                self.start_broadcaster()?;
                self.state.mark_connected();
                self.publish_status(None);
                self.notices.publish(SessionNotice::Connected);
                tracing::info!(server = %self.server, "connected to server");
            }
            Transition::Teardown { message } => {
                self.state.mark_disconnecting();
                self.publish_status(None);
                self.stop_broadcaster();
                // Listeners must not see the notice while any client is still up.
                self.disconnect_clients()?;
                self.state.mark_disconnected();
                self.publish_status(Some(&message));
                self.notices.publish(SessionNotice::Disconnected {
                    message: message.clone(),
                });
                tracing::info!(
                    server = %self.server,
                    source = %event.source,
                    reason = %message,
                    "disconnected from server"
                );
            }
            Transition::Report { message } => {
                self.state.mark_reported();
                self.publish_status(Some(&message));
                self.notices.publish(SessionNotice::Disconnected {
                    message: message.clone(),
                });
                tracing::info!(
                    server = %self.server,
                    source = %event.source,
                    reason = %message,
                    "session not connected"
                );
            }
        }
        Ok(())
    }

    /// Run the broadcaster loop on its own thread.
    fn start_broadcaster(&mut self) -> Result<()> {
        self.join_retired();
        let broadcaster = self.broadcaster.clone();
        let handle = thread::Builder::new()
            .name("sr-broadcaster".to_string())
            .spawn(move || {
                if let Err(e) = broadcaster.run() {
                    tracing::warn!(error = %format!("{e:#}"), "broadcaster loop ended with error");
                }
            })
            .context("spawn broadcaster thread")?;
        self.broadcast_thread = Some(handle);
        Ok(())
    }

    /// Tell the broadcaster loop to stop without waiting for it.
    fn stop_broadcaster(&mut self) {
        self.broadcaster.stop();
        if let Some(handle) = self.broadcast_thread.take() {
            self.retired_thread = Some(handle);
        }
    }

    fn join_retired(&mut self) {
        if let Some(previous) = self.retired_thread.take() {
            if previous.join().is_err() {
                tracing::warn!("previous broadcaster thread panicked");
            }
        }
    }

    /// Disconnect every client on a helper thread and wait for it.
    ///
    /// The clients report their drops into the input queue while we wait, so
    /// the queue keeps being drained until the helper is done.
    fn disconnect_clients(&mut self) -> Result<()> {
        let client_sync = self.client_sync.clone();
        let (done_tx, done_rx) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("sr-session-teardown".to_string())
            .spawn(move || {
                if let Err(e) = client_sync.disconnect() {
                    tracing::error!(
                        error = %format!("{e:#}"),
                        "error encountered when disconnecting session"
                    );
                }
                let _ = done_tx.send(());
            })
            .context("spawn teardown thread")?;

        let input_rx = self.input_rx.clone();
        loop {
            crossbeam_channel::select! {
                recv(done_rx) -> _ => break,
                recv(input_rx) -> input => match input {
                    Ok(input) => self.hold_during_teardown(input),
                    Err(_) => break,
                },
            }
        }
        handle
            .join()
            .map_err(|payload| anyhow!("teardown panicked: {}", panic_message(payload.as_ref())))
    }

    /// Park an input that arrived mid-teardown.
    ///
    /// Drops are absorbed: once teardown ends the session is disconnected with
    /// the drop already reported. A drop queued behind a reconnect is kept.
    fn hold_during_teardown(&mut self, input: SessionInput) {
        let reconnect_pending = self.pending.iter().any(|held| {
            matches!(held, SessionInput::Connection(event) if event.connected)
        });
        match input {
            SessionInput::Connection(event) if !event.connected && !reconnect_pending => {
                tracing::debug!(
                    source = %event.source,
                    message = %event.message,
                    "drop absorbed during teardown"
                );
            }
            input => self.pending.push_back(input),
        }
    }

    fn publish_status(&self, disconnect_message: Option<&str>) {
        if let Ok(mut s) = self.status.lock() {
            s.state = self.state.link();
            s.broadcasting = self.broadcast_thread.is_some();
            if let Some(message) = disconnect_message {
                s.last_disconnect = Some(message.to_string());
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic".to_string()
    }
}
