//! Configuration loading and parsing.
//!
//! Defines the session config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::station::{STATION_COUNT, StationRoster, StationTuning};

/// Server used when neither config nor CLI names one.
pub const DEFAULT_SERVER: &str = "127.0.0.1:5002";
/// Default bound of the session input queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
/// Smallest accepted queue bound; teardown enqueues one event per client.
pub const MIN_QUEUE_CAPACITY: usize = 16;

/// Top-level session configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    /// Server address (host:port).
    pub server: Option<String>,
    /// Bound of the session input queue.
    pub event_queue_capacity: Option<usize>,
    /// Initial station tuning, by index.
    pub stations: Option<Vec<StationTuning>>,
}

/// Resolved options a session is built from.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub server: SocketAddr,
    pub stations: [StationTuning; STATION_COUNT],
    pub queue_capacity: usize,
}

impl SessionConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<SessionConfig>(raw)?)
    }
}

/// Parse an optional server address from config.
pub fn server_from_config(cfg: &SessionConfig) -> Result<Option<SocketAddr>> {
    let Some(server) = cfg.server.as_deref() else {
        return Ok(None);
    };
    let addr = server
        .trim()
        .parse()
        .with_context(|| format!("parse server {server}"))?;
    Ok(Some(addr))
}

/// Resolve station tuning, filling unlisted stations with defaults.
pub fn stations_from_config(cfg: &SessionConfig) -> Result<[StationTuning; STATION_COUNT]> {
    let mut tunings = StationTuning::defaults();
    if let Some(stations) = cfg.stations.as_ref() {
        if stations.len() > STATION_COUNT {
            bail!(
                "config lists {} stations; at most {STATION_COUNT} are supported",
                stations.len()
            );
        }
        for (slot, tuning) in tunings.iter_mut().zip(stations) {
            *slot = *tuning;
        }
    }
    StationRoster::new(tunings).context("station frequencies must be unique")?;
    Ok(tunings)
}

/// Queue bound from config, clamped to the minimum.
pub fn queue_capacity_from_config(cfg: &SessionConfig) -> usize {
    cfg.event_queue_capacity
        .unwrap_or(DEFAULT_QUEUE_CAPACITY)
        .max(MIN_QUEUE_CAPACITY)
}

/// Build session options from config plus an optional server override.
pub fn options_from_config(
    cfg: &SessionConfig,
    server_override: Option<SocketAddr>,
) -> Result<SessionOptions> {
    let server = match server_override {
        Some(addr) => addr,
        None => match server_from_config(cfg)? {
            Some(addr) => addr,
            None => DEFAULT_SERVER.parse().context("parse default server")?,
        },
    };
    Ok(SessionOptions {
        server,
        stations: stations_from_config(cfg)?,
        queue_capacity: queue_capacity_from_config(cfg),
    })
}
