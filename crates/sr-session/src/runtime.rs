//! Session runtime helpers.
//!
//! Resolves options from config/CLI, validates the roster, and runs a session
//! over the loopback collaborators.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::config::{self, SessionConfig, SessionOptions};
use crate::events::SessionNotice;
use crate::loopback;
use crate::session::Session;
use crate::station::{STATION_COUNT, StationAudio, StationRoster};

/// Bytes per synthetic audio frame.
const FRAME_BYTES: usize = 160;

/// Load config (explicit path, else `config.toml` next to the binary, else
/// defaults) and apply the server override.
pub fn resolve_options(
    config_path: Option<&Path>,
    server_override: Option<SocketAddr>,
) -> Result<SessionOptions> {
    let cfg = match config_path {
        Some(path) => SessionConfig::load(path)?,
        None => {
            let auto_path = std::env::current_exe()
                .ok()
                .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
            match auto_path {
                Some(path) if path.exists() => {
                    tracing::info!(path = %path.display(), "using config next to binary");
                    SessionConfig::load(&path)?
                }
                _ => SessionConfig::default(),
            }
        }
    };
    config::options_from_config(&cfg, server_override)
}

/// Validate options and print the station roster.
pub fn run_check(options: &SessionOptions) -> Result<()> {
    let roster = StationRoster::new(options.stations)?;
    println!("server: {}", options.server);
    println!("event queue capacity: {}", options.queue_capacity);
    for station in roster.iter() {
        println!(
            "station {}: {:.3} MHz {:?}",
            station.index,
            station.frequency / 1_000_000.0,
            station.modulation
        );
    }
    Ok(())
}

/// Run a session over the loopback collaborators until it disconnects.
///
/// Sends a synthetic frame from every station each `frame_ms` while connected.
/// With `frames` set, disconnects after that many rounds; otherwise runs until
/// Ctrl-C (when `install_ctrlc`) requests a deliberate quit.
pub fn run_simulate(
    options: SessionOptions,
    frame_ms: u64,
    frames: Option<usize>,
    install_ctrlc: bool,
) -> Result<()> {
    let (client_sync, broadcaster) = loopback::pair();
    let session = Session::new(options, client_sync.clone(), broadcaster.clone())?;
    let notices = session.subscribe();

    let (quit_tx, quit_rx) = crossbeam_channel::bounded::<()>(1);
    if install_ctrlc {
        let _ = ctrlc::set_handler(move || {
            let _ = quit_tx.try_send(());
        });
    }

    let taps = (0..STATION_COUNT)
        .map(|station| session.station_audio(station))
        .collect::<Result<Vec<StationAudio>, _>>()?;
    let ticker = crossbeam_channel::tick(Duration::from_millis(frame_ms.max(1)));
    let mut sent = 0usize;

    session.connect();
    loop {
        crossbeam_channel::select! {
            recv(notices) -> notice => match notice {
                Ok(SessionNotice::Connected) => {
                    tracing::info!(server = %session.server(), "simulated session connected");
                }
                Ok(SessionNotice::Disconnected { message }) => {
                    tracing::info!(reason = %message, "simulated session disconnected");
                    break;
                }
                Err(_) => return Err(anyhow!("session notices closed")),
            },
            recv(quit_rx) -> _ => {
                tracing::info!("quit requested");
                session.set_quit(true);
                session.disconnect();
                break;
            }
            recv(ticker) -> _ => {
                if !session.is_connected() {
                    continue;
                }
                for tap in &taps {
                    tap.send(&synthetic_frame(tap.station(), sent))?;
                }
                sent += 1;
                if frames.is_some_and(|limit| sent == limit) {
                    session.disconnect();
                }
            }
        }
    }

    tracing::info!(
        frames = sent,
        packets = broadcaster.packets().len(),
        calls = ?client_sync.calls(),
        "simulation finished"
    );
    session.close();
    Ok(())
}

/// Sawtooth bytes offset per station so frames are distinguishable.
fn synthetic_frame(station: usize, frame: usize) -> Vec<u8> {
    (0..FRAME_BYTES)
        .map(|i| ((i + frame + station * 64) % 256) as u8)
        .collect()
}
