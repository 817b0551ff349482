use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "sr-session", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Optional session config file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Server address override, e.g. 127.0.0.1:5002
    #[arg(long, global = true)]
    pub server: Option<SocketAddr>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the config and print the station roster
    Check,

    /// Run a session against in-process collaborators
    Simulate {
        /// Interval between audio frames per station, in milliseconds
        #[arg(long, default_value_t = 20)]
        frame_ms: u64,

        /// Disconnect after this many frames (runs until Ctrl-C when omitted)
        #[arg(long)]
        frames: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simulate_with_global_flags() {
        let args = Args::try_parse_from([
            "sr-session",
            "simulate",
            "--frames",
            "5",
            "--server",
            "127.0.0.1:6000",
        ])
        .unwrap();
        assert_eq!(args.server, Some("127.0.0.1:6000".parse().unwrap()));
        match args.cmd {
            Command::Simulate { frame_ms, frames } => {
                assert_eq!(frame_ms, 20);
                assert_eq!(frames, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn check_accepts_config_path() {
        let args =
            Args::try_parse_from(["sr-session", "--config", "session.toml", "check"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("session.toml")));
        assert!(matches!(args.cmd, Command::Check));
    }
}
