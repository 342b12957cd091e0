//! # Interactive Terminal
//!
//! Single-line commands on stdin:
//!
//! ```text
//! value                          balance of this node's key at the principal
//! public_key                     this node's hex public key
//! send <amount> <recipient-hex>  sign a transfer into the pool and gossip it
//! pool                           pending transactions as JSON
//! ```
//!
//! Anything else prints the usage table. Output goes to stdout; the log
//! stream stays on stderr so the prompt remains readable.

use std::io::Write;
use std::sync::Arc;

use tarjeta_protocol::crypto::PublicKey;
use tarjeta_protocol::network::Node;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

/// Read stdin until EOF or shutdown, dispatching one command per line.
pub async fn run(node: Arc<Node>, mut shutdown: watch::Receiver<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        handle_line(&node, line.trim());
                        prompt();
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

fn prompt() {
    print!(">>> ");
    let _ = std::io::stdout().flush();
}

fn handle_line(node: &Node, line: &str) {
    if line.is_empty() {
        return;
    }
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("value") => println!("{}", node.balance()),
        Some("public_key") => println!("{}", node.public_key_hex()),
        Some("send") => match parse_send(parts.next(), parts.next()) {
            Some((value, recipient)) => {
                let txn = node.submit_transfer(recipient, value);
                println!("{}", txn.hash());
            }
            None => print_usage(),
        },
        Some("pool") => {
            let dump = serde_json::to_string_pretty(&node.pool_json()).unwrap_or_default();
            println!("{dump}");
        }
        _ => print_usage(),
    }
}

/// Parse the `send` arguments: a token amount and a 64-character hex
/// recipient key.
fn parse_send(amount: Option<&str>, recipient: Option<&str>) -> Option<(u64, PublicKey)> {
    let value = amount?.parse::<u64>().ok()?;
    let recipient = recipient?;
    if recipient.len() != 64 {
        return None;
    }
    let key = PublicKey::from_hex(recipient).ok()?;
    Some((value, key))
}

fn print_usage() {
    println!("Use the following commands:");
    println!("   value         print this node's balance at the principal chain");
    println!("   public_key    print this node's public key");
    println!("   send          send <amount> <recipient-hex-64>");
    println!("   pool          dump pending transactions as JSON");
}
