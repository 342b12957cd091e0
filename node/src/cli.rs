//! # CLI Interface
//!
//! Command-line arguments for `tarjeta-node`, via `clap` derive. One
//! binary, one mode: run a node. Peers to dial are given with repeated
//! `--connect` flags; a bootstrap node simply passes none.

use std::net::SocketAddr;

use clap::Parser;
use tarjeta_protocol::config::{
    DEFAULT_BACKLOG, DEFAULT_HTTP_PORT, DEFAULT_PORT, MAX_INITIAL_CONNECTIONS,
};

/// A tarjeta peer-to-peer node.
///
/// Maintains the block tree, stakes on the principal chain, gossips
/// blocks and transactions, and serves a small REST surface for browsing
/// the ledger.
#[derive(Parser, Debug)]
#[command(name = "tarjeta-node", about = "Tarjeta peer-to-peer node", version)]
pub struct Cli {
    /// TCP port to listen on for peer connections (and the port declared
    /// in our handshake).
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Listen backlog for incoming peer connections.
    #[arg(long, default_value_t = DEFAULT_BACKLOG)]
    pub backlog: u32,

    /// Whether to accept incoming connections. A client-only node can
    /// still dial out and participate fully.
    #[arg(long = "should-listen", default_value_t = true, action = clap::ArgAction::Set)]
    pub should_listen: bool,

    /// Peer to connect to at startup, as `addr:port`. Repeatable.
    #[arg(long = "connect", value_name = "ADDR:PORT")]
    pub connect: Vec<String>,

    /// Port for the REST/metrics HTTP surface.
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Default log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// The initial peer set: parsed, deduplicated against nothing, and
    /// capped. Unparsable entries are reported back for logging.
    pub fn initial_peers(&self) -> (Vec<SocketAddr>, Vec<&str>) {
        let mut peers = Vec::new();
        let mut bad = Vec::new();
        for entry in self.connect.iter().take(MAX_INITIAL_CONNECTIONS) {
            match entry.parse::<SocketAddr>() {
                Ok(addr) => peers.push(addr),
                Err(_) => bad.push(entry.as_str()),
            }
        }
        (peers, bad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_protocol_constants() {
        let cli = Cli::parse_from(["tarjeta-node"]);
        assert_eq!(cli.port, DEFAULT_PORT);
        assert_eq!(cli.backlog, DEFAULT_BACKLOG);
        assert!(cli.should_listen);
        assert!(cli.connect.is_empty());
    }

    #[test]
    fn connect_is_repeatable_and_parsed() {
        let cli = Cli::parse_from([
            "tarjeta-node",
            "--connect",
            "127.0.0.1:1960",
            "--connect",
            "10.0.0.9:1961",
            "--connect",
            "not-an-address",
        ]);
        let (peers, bad) = cli.initial_peers();
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].port(), 1960);
        assert_eq!(bad, vec!["not-an-address"]);
    }

    #[test]
    fn should_listen_takes_an_explicit_value() {
        let cli = Cli::parse_from(["tarjeta-node", "--should-listen", "false"]);
        assert!(!cli.should_listen);
    }

    #[test]
    fn initial_peers_are_capped() {
        let mut args = vec!["tarjeta-node".to_string()];
        for i in 0..(MAX_INITIAL_CONNECTIONS + 10) {
            args.push("--connect".to_string());
            args.push(format!("127.0.0.1:{}", 2000 + i));
        }
        let cli = Cli::parse_from(args);
        let (peers, _) = cli.initial_peers();
        assert_eq!(peers.len(), MAX_INITIAL_CONNECTIONS);
    }
}
