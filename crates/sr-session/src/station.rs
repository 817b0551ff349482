//! Fixed station roster and frequency uniqueness.

use serde::Deserialize;
use sr_music_types::Modulation;

use crate::error::SessionError;
use crate::relay::Relay;

/// Number of stations in every session.
pub const STATION_COUNT: usize = 4;

/// Frequencies (Hz) used for stations the config leaves untuned.
pub const DEFAULT_FREQUENCIES: [f64; STATION_COUNT] =
    [30_000_000.0, 31_000_000.0, 32_000_000.0, 33_000_000.0];

/// Initial tuning for one station.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct StationTuning {
    pub frequency: f64,
    #[serde(default)]
    pub modulation: Modulation,
}

impl StationTuning {
    pub fn new(frequency: f64, modulation: Modulation) -> Self {
        Self {
            frequency,
            modulation,
        }
    }

    /// Default tuning for each station index.
    pub fn defaults() -> [StationTuning; STATION_COUNT] {
        DEFAULT_FREQUENCIES.map(|frequency| StationTuning::new(frequency, Modulation::Am))
    }
}

/// One local radio station.
#[derive(Clone, Debug, PartialEq)]
pub struct Station {
    pub index: usize,
    pub frequency: f64,
    pub modulation: Modulation,
}

/// The fixed set of stations owned by a session.
#[derive(Clone, Debug)]
pub struct StationRoster {
    stations: [Station; STATION_COUNT],
}

impl Default for StationRoster {
    fn default() -> Self {
        Self::from_tunings_unchecked(StationTuning::defaults())
    }
}

impl StationRoster {
    /// Build a roster, rejecting tunings where two stations share a frequency.
    pub fn new(tunings: [StationTuning; STATION_COUNT]) -> Result<Self, SessionError> {
        for first in 0..STATION_COUNT {
            for second in first + 1..STATION_COUNT {
                if tunings[first].frequency == tunings[second].frequency {
                    return Err(SessionError::DuplicateFrequency {
                        first,
                        second,
                        frequency: tunings[first].frequency,
                    });
                }
            }
        }
        Ok(Self::from_tunings_unchecked(tunings))
    }

    fn from_tunings_unchecked(tunings: [StationTuning; STATION_COUNT]) -> Self {
        let mut index = 0;
        let stations = tunings.map(|tuning| {
            let station = Station {
                index,
                frequency: tuning.frequency,
                modulation: tuning.modulation,
            };
            index += 1;
            station
        });
        Self { stations }
    }

    pub fn get(&self, index: usize) -> Result<&Station, SessionError> {
        self.stations
            .get(index)
            .ok_or(SessionError::UnknownStation(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    /// Check `frequency` against every other station.
    ///
    /// Returns `frequency` when no other station holds it, otherwise the
    /// station's current frequency. Comparison is exact.
    pub fn verify_unique_frequency(
        &self,
        index: usize,
        frequency: f64,
    ) -> Result<f64, SessionError> {
        let current = self.get(index)?.frequency;
        let taken = self
            .stations
            .iter()
            .any(|other| other.index != index && other.frequency == frequency);
        Ok(if taken { current } else { frequency })
    }

    /// Verify and store new settings, returning the frequency that took effect.
    ///
    /// A rejected frequency leaves the station's frequency alone; the
    /// modulation is applied either way.
    pub fn retune(
        &mut self,
        index: usize,
        frequency: f64,
        modulation: Modulation,
    ) -> Result<f64, SessionError> {
        let effective = self.verify_unique_frequency(index, frequency)?;
        let station = &mut self.stations[index];
        station.frequency = effective;
        station.modulation = modulation;
        Ok(effective)
    }
}

/// Audio tap handed to a station's local audio producer.
///
/// Each buffer sent through it is routed to the broadcaster synchronously on
/// the producer's thread.
#[derive(Clone)]
pub struct StationAudio {
    station: usize,
    relay: Relay,
}

impl StationAudio {
    pub(crate) fn new(station: usize, relay: Relay) -> Self {
        Self { station, relay }
    }

    pub fn station(&self) -> usize {
        self.station
    }

    pub fn send(&self, audio: &[u8]) -> anyhow::Result<()> {
        self.relay.broadcast(self.station, audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(frequencies: [f64; STATION_COUNT]) -> StationRoster {
        StationRoster::new(frequencies.map(|f| StationTuning::new(f, Modulation::Am)))
            .expect("unique frequencies")
    }

    #[test]
    fn rejects_frequency_held_by_another_station() {
        let roster = roster([30.0, 31.0, 32.0, 33.0]);
        assert_eq!(roster.verify_unique_frequency(0, 31.0), Ok(30.0));
        assert_eq!(roster.verify_unique_frequency(0, 34.0), Ok(34.0));
    }

    #[test]
    fn every_station_pair_collides() {
        let frequencies = [30.0, 31.0, 32.0, 33.0];
        let roster = roster(frequencies);
        for i in 0..STATION_COUNT {
            for j in 0..STATION_COUNT {
                if i == j {
                    continue;
                }
                assert_eq!(
                    roster.verify_unique_frequency(i, frequencies[j]),
                    Ok(frequencies[i]),
                    "station {i} onto station {j}"
                );
            }
        }
    }

    #[test]
    fn own_frequency_is_accepted() {
        let roster = roster([30.0, 31.0, 32.0, 33.0]);
        assert_eq!(roster.verify_unique_frequency(2, 32.0), Ok(32.0));
    }

    #[test]
    fn comparison_is_exact() {
        let roster = roster([30.0, 31.0, 32.0, 33.0]);
        let near = 31.0 + 1e-9;
        assert_eq!(roster.verify_unique_frequency(0, near), Ok(near));
    }

    #[test]
    fn unknown_station_is_an_error() {
        let roster = StationRoster::default();
        assert_eq!(
            roster.verify_unique_frequency(STATION_COUNT, 1.0),
            Err(SessionError::UnknownStation(STATION_COUNT))
        );
        assert!(roster.get(7).is_err());
    }

    #[test]
    fn new_rejects_duplicate_tunings() {
        let tunings = [30.0, 31.0, 30.0, 33.0].map(|f| StationTuning::new(f, Modulation::Fm));
        assert_eq!(
            StationRoster::new(tunings).unwrap_err(),
            SessionError::DuplicateFrequency {
                first: 0,
                second: 2,
                frequency: 30.0
            }
        );
    }

    #[test]
    fn retune_keeps_frequency_on_collision_but_applies_modulation() {
        let mut roster = roster([30.0, 31.0, 32.0, 33.0]);
        assert_eq!(roster.retune(1, 33.0, Modulation::Fm), Ok(31.0));
        let station = roster.get(1).unwrap();
        assert_eq!(station.frequency, 31.0);
        assert_eq!(station.modulation, Modulation::Fm);

        assert_eq!(roster.retune(1, 40.0, Modulation::Am), Ok(40.0));
        assert_eq!(roster.get(1).unwrap().frequency, 40.0);
    }

    #[test]
    fn default_roster_is_indexed_and_unique() {
        let roster = StationRoster::default();
        let indices = roster.iter().map(|s| s.index).collect::<Vec<_>>();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(StationRoster::new(StationTuning::defaults()).is_ok());
    }
}
