//! In-process collaborators.
//!
//! `LoopbackClientSync` connects instantly and hands out random routing ids;
//! `LoopbackBroadcaster` records every packet instead of sending it. Both write
//! to a shared call log so callers can check ordering across the two.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use sr_music_types::{ClientDescriptor, Modulation, RoutingId};
use uuid::Uuid;

use crate::collab::{Broadcaster, ClientSync};
use crate::error::SessionError;
use crate::events::{EventSink, EventSource};
use crate::station::STATION_COUNT;

/// Ordered record of collaborator calls.
#[derive(Clone, Debug, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    fn push(&self, call: &str) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(call.to_string());
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().map(|calls| calls.clone()).unwrap_or_default()
    }
}

/// Build a client sync and broadcaster that share one call log.
pub fn pair() -> (Arc<LoopbackClientSync>, Arc<LoopbackBroadcaster>) {
    let log = CallLog::default();
    (
        Arc::new(LoopbackClientSync::new(log.clone())),
        Arc::new(LoopbackBroadcaster::new(log)),
    )
}

#[derive(Debug, Default)]
struct Links {
    session: bool,
    stations: [bool; STATION_COUNT],
}

#[derive(Debug)]
pub struct LoopbackClientSync {
    sink: Mutex<Option<EventSink>>,
    links: Mutex<Links>,
    routing: [(RoutingId, RoutingId); STATION_COUNT],
    log: CallLog,
}

impl LoopbackClientSync {
    pub fn new(log: CallLog) -> Self {
        let routing = std::array::from_fn(|_| {
            (
                RoutingId::new(Uuid::new_v4().to_string()),
                RoutingId::new(Uuid::new_v4().to_string()),
            )
        });
        Self {
            sink: Mutex::new(None),
            links: Mutex::new(Links::default()),
            routing,
            log,
        }
    }

    /// Set one client's link flag and report it to the session.
    pub fn report(
        &self,
        source: EventSource,
        connected: bool,
        message: &str,
    ) -> Result<(), SessionError> {
        if let Ok(mut links) = self.links.lock() {
            match source {
                EventSource::Session => links.session = connected,
                EventSource::Station(index) => {
                    if let Some(link) = links.stations.get_mut(index) {
                        *link = connected;
                    }
                }
                EventSource::Broadcaster => {}
            }
        }
        self.with_sink(|sink| sink.connection(source, connected, message))
    }

    pub fn report_secure_coalitions(&self, secure: bool) -> Result<(), SessionError> {
        self.with_sink(|sink| sink.secure_coalitions(secure))
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.snapshot()
    }

    pub fn disconnects(&self) -> usize {
        self.count("client_sync.disconnect")
    }

    fn count(&self, call: &str) -> usize {
        self.log.snapshot().iter().filter(|c| *c == call).count()
    }

    fn with_sink(
        &self,
        f: impl FnOnce(&EventSink) -> Result<(), SessionError>,
    ) -> Result<(), SessionError> {
        let sink = self.sink.lock().ok().and_then(|s| s.clone());
        match sink {
            Some(sink) => f(&sink),
            None => Err(SessionError::Closed),
        }
    }

    fn report_all(&self, connected: bool, message: &str) -> Result<()> {
        self.report(EventSource::Session, connected, message)?;
        for index in 0..STATION_COUNT {
            self.report(EventSource::Station(index), connected, message)?;
        }
        Ok(())
    }
}

impl ClientSync for LoopbackClientSync {
    fn attach(&self, sink: EventSink) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
    }

    fn connect(&self) -> Result<()> {
        self.log.push("client_sync.connect");
        self.report_all(true, "")
    }

    fn disconnect(&self) -> Result<()> {
        self.log.push("client_sync.disconnect");
        self.report_all(false, "disconnected")
    }

    fn all_clients_connected(&self) -> bool {
        self.links
            .lock()
            .map(|links| links.session && links.stations.iter().all(|s| *s))
            .unwrap_or(false)
    }

    fn update_radio_settings(
        &self,
        station: usize,
        frequency: f64,
        modulation: Modulation,
    ) -> Result<ClientDescriptor> {
        self.log.push("client_sync.update_radio_settings");
        let (blufor, opfor) = self.routing_ids(station)?;
        Ok(ClientDescriptor {
            station,
            blufor,
            opfor,
            frequency,
            modulation,
        })
    }

    fn routing_ids(&self, station: usize) -> Result<(RoutingId, RoutingId)> {
        match self.routing.get(station) {
            Some(ids) => Ok(ids.clone()),
            None => bail!(SessionError::UnknownStation(station)),
        }
    }
}

/// One recorded outbound packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub blufor: RoutingId,
    pub opfor: RoutingId,
    pub audio: Vec<u8>,
}

#[derive(Debug, Default)]
struct LoopState {
    runs: usize,
    stops: usize,
    finished: usize,
}

#[derive(Debug)]
pub struct LoopbackBroadcaster {
    sink: Mutex<Option<EventSink>>,
    loop_state: Mutex<LoopState>,
    loop_cv: Condvar,
    packets: Mutex<Vec<Packet>>,
    clients: Mutex<Vec<ClientDescriptor>>,
    secure_coalitions: AtomicBool,
    log: CallLog,
}

impl LoopbackBroadcaster {
    pub fn new(log: CallLog) -> Self {
        Self {
            sink: Mutex::new(None),
            loop_state: Mutex::new(LoopState::default()),
            loop_cv: Condvar::new(),
            packets: Mutex::new(Vec::new()),
            clients: Mutex::new(Vec::new()),
            secure_coalitions: AtomicBool::new(false),
            log,
        }
    }

    /// Report the transport's own connectivity to the session.
    pub fn report(&self, connected: bool, message: &str) -> Result<(), SessionError> {
        let sink = self.sink.lock().ok().and_then(|s| s.clone());
        match sink {
            Some(sink) => sink.connection(EventSource::Broadcaster, connected, message),
            None => Err(SessionError::Closed),
        }
    }

    pub fn runs(&self) -> usize {
        self.loop_state.lock().map(|s| s.runs).unwrap_or(0)
    }

    pub fn stops(&self) -> usize {
        self.loop_state.lock().map(|s| s.stops).unwrap_or(0)
    }

    /// Number of run loops that have returned.
    pub fn finished(&self) -> usize {
        self.loop_state.lock().map(|s| s.finished).unwrap_or(0)
    }

    /// Wait until the run loop has been entered `runs` times.
    pub fn wait_for_runs(&self, runs: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let Ok(mut state) = self.loop_state.lock() else {
            return false;
        };
        while state.runs < runs {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.loop_cv.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return false,
            };
        }
        true
    }

    pub fn packets(&self) -> Vec<Packet> {
        self.packets.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn clients(&self) -> Vec<ClientDescriptor> {
        self.clients.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn secure_coalitions(&self) -> bool {
        self.secure_coalitions.load(Ordering::SeqCst)
    }
}

impl Broadcaster for LoopbackBroadcaster {
    fn attach(&self, sink: EventSink) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
    }

    /// The n-th run returns once `stop` has been called n times, so a stop
    /// that lands before the thread is scheduled is not lost.
    fn run(&self) -> Result<()> {
        self.log.push("broadcaster.run");
        let Ok(mut state) = self.loop_state.lock() else {
            bail!("broadcaster state poisoned");
        };
        state.runs += 1;
        let generation = state.runs;
        self.loop_cv.notify_all();
        while state.stops < generation {
            state = match self.loop_cv.wait(state) {
                Ok(guard) => guard,
                Err(_) => bail!("broadcaster state poisoned"),
            };
        }
        state.finished += 1;
        Ok(())
    }

    fn stop(&self) {
        self.log.push("broadcaster.stop");
        if let Ok(mut state) = self.loop_state.lock() {
            state.stops += 1;
        }
        self.loop_cv.notify_all();
    }

    fn send_packet(&self, blufor: &RoutingId, opfor: &RoutingId, audio: &[u8]) -> Result<()> {
        if let Ok(mut packets) = self.packets.lock() {
            packets.push(Packet {
                blufor: blufor.clone(),
                opfor: opfor.clone(),
                audio: audio.to_vec(),
            });
        }
        Ok(())
    }

    fn update_client_radio(&self, client: ClientDescriptor) {
        self.log.push("broadcaster.update_client_radio");
        if let Ok(mut clients) = self.clients.lock() {
            clients.push(client);
        }
    }

    fn set_secure_coalitions(&self, secure: bool) {
        self.secure_coalitions.store(secure, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_ids_are_distinct_per_station() {
        let (client_sync, _) = pair();
        let mut seen = std::collections::HashSet::new();
        for station in 0..STATION_COUNT {
            let (blufor, opfor) = client_sync.routing_ids(station).unwrap();
            assert!(seen.insert(blufor));
            assert!(seen.insert(opfor));
        }
        assert!(client_sync.routing_ids(STATION_COUNT).is_err());
    }

    #[test]
    fn report_without_session_is_closed() {
        let (client_sync, broadcaster) = pair();
        assert_eq!(
            client_sync.report(EventSource::Session, true, ""),
            Err(SessionError::Closed)
        );
        assert_eq!(broadcaster.report(true, ""), Err(SessionError::Closed));
    }

    #[test]
    fn all_connected_tracks_every_link() {
        let (client_sync, _) = pair();
        let (tx, _rx) = crossbeam_channel::unbounded();
        client_sync.attach(EventSink::new(tx));

        client_sync.connect().unwrap();
        assert!(client_sync.all_clients_connected());
        client_sync
            .report(EventSource::Station(2), false, "timeout")
            .unwrap();
        assert!(!client_sync.all_clients_connected());
    }

    #[test]
    fn stop_before_run_is_not_lost() {
        let (_, broadcaster) = pair();
        broadcaster.stop();
        broadcaster.run().unwrap();
        assert_eq!(broadcaster.runs(), 1);
        assert_eq!(broadcaster.finished(), 1);
        assert!(broadcaster.wait_for_runs(1, Duration::from_millis(10)));
    }
}
