//! Pass-through paths from stations and client sync to the broadcaster.

use std::sync::Arc;

use anyhow::Result;
use sr_music_types::{ClientDescriptor, Modulation};

use crate::collab::{Broadcaster, ClientSync};
use crate::error::SessionError;
use crate::station::STATION_COUNT;

#[derive(Clone)]
pub(crate) struct Relay {
    client_sync: Arc<dyn ClientSync>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl Relay {
    pub(crate) fn new(client_sync: Arc<dyn ClientSync>, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            client_sync,
            broadcaster,
        }
    }

    /// Route one locally produced buffer to the station's coalition clients.
    pub(crate) fn broadcast(&self, station: usize, audio: &[u8]) -> Result<()> {
        check_station(station)?;
        let (blufor, opfor) = self.client_sync.routing_ids(station)?;
        self.broadcaster.send_packet(&blufor, &opfor, audio)
    }

    pub(crate) fn update_station_radio(
        &self,
        station: usize,
        frequency: f64,
        modulation: Modulation,
    ) -> Result<ClientDescriptor> {
        check_station(station)?;
        let client = self
            .client_sync
            .update_radio_settings(station, frequency, modulation)?;
        tracing::debug!(
            station,
            frequency,
            modulation = ?modulation,
            "station radio updated"
        );
        self.broadcaster.update_client_radio(client.clone());
        Ok(client)
    }

    pub(crate) fn secure_coalitions_changed(&self, secure: bool) {
        tracing::debug!(secure, "secure coalitions changed");
        self.broadcaster.set_secure_coalitions(secure);
    }
}

fn check_station(station: usize) -> Result<(), SessionError> {
    if station < STATION_COUNT {
        Ok(())
    } else {
        Err(SessionError::UnknownStation(station))
    }
}
