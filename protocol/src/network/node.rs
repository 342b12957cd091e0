//! # Node Orchestrator
//!
//! The single event loop that wires transport to ledger. Socket tasks
//! deliver `NetworkEvent`s into this loop; a resettable deadline drives
//! block authoring; REPL and REST layers only ever read shared state or
//! enqueue transactions. All consensus-state mutation happens here, one
//! event at a time, so every handler observes a consistent tree.
//!
//! ## Behavior
//!
//! - **On connect**: handshake, then request the peer list, the chain
//!   above our principal, and the pending pool.
//! - **On tick** (every `BLOCK_TIME`, restarted on principal extension):
//!   author a block on the principal — unless we already authored a child
//!   there — draining the pool into it, then insert and broadcast.
//! - **On received block**: validate + insert; when a fork overtakes the
//!   principal, walk back to the common ancestor re-adding orphaned
//!   transactions to the pool; then, if we have no sibling child at the
//!   new block's parent, author a competing child from the pool. Our
//!   competing block wins fork choice exactly when its sortition draw
//!   beats the incoming one.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::Tuple;
use crate::config::{BLOCK_TIME, DEFAULT_PORT, VERSION_STRING};
use crate::crypto::{Hash, Keypair, PublicKey};
use crate::ledger::block::Block;
use crate::ledger::chain::{Blockchain, Extension, InsertOutcome};
use crate::ledger::transaction::Transaction;
use crate::network::gossip::{Network, NetworkEvent, PeerId};
use crate::network::mempool::Mempool;
use crate::network::sync;
use crate::network::wire::{Frame, MessageType};

/// Identity-independent node parameters.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// The listen port announced in our handshake.
    pub port: u16,
    /// Version string; peers that disagree are dropped.
    pub version: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            version: VERSION_STRING.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A tarjeta node: creator identity, block tree, pending pool, transport.
pub struct Node {
    keypair: Keypair,
    config: NodeConfig,
    chain: Arc<RwLock<Blockchain>>,
    pool: Arc<Mempool>,
    network: Network,
    next_nonce: AtomicU32,
}

impl Node {
    pub fn new(keypair: Keypair, config: NodeConfig, network: Network) -> Self {
        Self {
            keypair,
            config,
            chain: Arc::new(RwLock::new(Blockchain::new())),
            pool: Arc::new(Mempool::new()),
            network,
            next_nonce: AtomicU32::new(0),
        }
    }

    /// Shared handle to the block tree, for the REST layer.
    pub fn chain(&self) -> Arc<RwLock<Blockchain>> {
        Arc::clone(&self.chain)
    }

    /// Shared handle to the pending pool.
    pub fn pool(&self) -> Arc<Mempool> {
        Arc::clone(&self.pool)
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Drive the node until the event stream closes or shutdown flips.
    ///
    /// Starts by authoring a root block — every node seeds its own tree
    /// and lets fork choice sort out whose root the network converges on.
    pub async fn run(
        &self,
        mut events: mpsc::UnboundedReceiver<NetworkEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut deadline = Instant::now() + BLOCK_TIME;

        if let Some(root) = self.author(None) {
            if self.insert_and_announce(Arc::clone(&root), &mut deadline) {
                info!(hash = %root.hash(), "authored root block");
                self.broadcast_block(&root);
            }
        }

        loop {
            tokio::select! {
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event, &mut deadline),
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.on_tick(&mut deadline);
                    deadline = Instant::now() + BLOCK_TIME;
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("node event loop stopped");
        self.network.shutdown();
    }

    fn handle_event(&self, event: NetworkEvent, deadline: &mut Instant) {
        match event {
            NetworkEvent::Connected { peer } => self.on_connect(peer),
            NetworkEvent::Disconnected { peer } => {
                info!(peer, "peer left");
            }
            NetworkEvent::Frame { peer, frame } => self.on_frame(peer, frame, deadline),
        }
    }

    fn on_frame(&self, peer: PeerId, frame: Frame, deadline: &mut Instant) {
        let Ok(tuple) = Tuple::parse(&frame.payload) else {
            debug!(peer, msg_type = ?frame.msg_type, "undecodable payload dropped");
            return;
        };

        match frame.msg_type {
            MessageType::Handshake => self.on_handshake(peer, &tuple),
            MessageType::PeersRequest => self.on_peers_request(peer),
            MessageType::PeersResponse => self.on_peers_response(&tuple),
            MessageType::BlocksRequest => self.on_blocks_request(peer, &tuple),
            MessageType::BlocksResponse => self.on_blocks_response(&tuple, deadline),
            MessageType::PoolRequest => self.on_pool_request(peer),
            MessageType::PoolResponse => self.on_pool_response(&tuple),
            MessageType::Block => self.handle_incoming_block(&tuple, deadline),
            MessageType::Transaction => self.on_transaction(&tuple),
        }
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Greet a fresh connection and synchronize peers, chain and pool.
    fn on_connect(&self, peer: PeerId) {
        self.network.send(
            peer,
            MessageType::Handshake,
            &sync::encode_handshake(i32::from(self.config.port), &self.config.version),
        );
        self.network
            .send(peer, MessageType::PeersRequest, &sync::encode_empty());

        let base = self
            .chain
            .read()
            .principal()
            .map_or(Hash::ZERO, |p| *p.hash());
        self.network.send(
            peer,
            MessageType::BlocksRequest,
            &sync::encode_blocks_request(&base),
        );
        self.network
            .send(peer, MessageType::PoolRequest, &sync::encode_empty());
    }

    /// Apply the handshake policy: duplicate peers are dropped silently,
    /// version mismatches are dropped loudly, everyone else gets their
    /// declared listen port recorded.
    fn on_handshake(&self, peer: PeerId, tuple: &Tuple) {
        let Some((port, version)) = sync::decode_handshake(tuple) else {
            return;
        };
        let Some(addr) = self.network.peer_addr(peer) else {
            return;
        };

        if self.network.has_peer(&addr.ip().to_string(), port) {
            self.network.disconnect(peer);
            return;
        }
        if version != self.config.version {
            warn!(
                peer,
                theirs = %version,
                ours = %self.config.version,
                "version mismatch, disconnecting"
            );
            self.network.disconnect(peer);
            return;
        }

        self.network.set_peer_port(peer, port);
        info!(addr = %addr.ip(), port, "peer joined");
    }

    fn on_peers_request(&self, peer: PeerId) {
        let peers = self.network.peer_list(peer);
        self.network.send(
            peer,
            MessageType::PeersResponse,
            &sync::encode_peers(peers.into_iter()),
        );
    }

    /// Dial every advertised peer we are not already connected to.
    fn on_peers_response(&self, tuple: &Tuple) {
        let Some(peers) = sync::decode_peers(tuple) else {
            return;
        };
        for (addr, port) in peers {
            if !(1..=i32::from(u16::MAX)).contains(&port) {
                continue;
            }
            if self.network.has_peer(&addr, port) {
                continue;
            }
            let Ok(ip) = addr.parse::<IpAddr>() else {
                continue;
            };
            self.network.connect(SocketAddr::new(ip, port as u16));
        }
    }

    // -----------------------------------------------------------------------
    // Chain & pool synchronization
    // -----------------------------------------------------------------------

    /// Serve our principal chain above the peer's claimed base block.
    fn on_blocks_request(&self, peer: PeerId, tuple: &Tuple) {
        let Some(base) = sync::decode_blocks_request(tuple) else {
            return;
        };
        let payload = sync::encode_blocks_response(self.chain.read().principal(), &base);
        self.network
            .send(peer, MessageType::BlocksResponse, &payload);
    }

    /// A chain download arrives newest-first; apply oldest-first so every
    /// block finds its parent already inserted.
    fn on_blocks_response(&self, tuple: &Tuple, deadline: &mut Instant) {
        for i in (0..tuple.len()).rev() {
            if let Some(block_tuple) = tuple.get_tuple(i) {
                self.handle_incoming_block(block_tuple, deadline);
            }
        }
    }

    fn on_pool_request(&self, peer: PeerId) {
        let payload = sync::encode_pool(&self.pool.snapshot());
        self.network.send(peer, MessageType::PoolResponse, &payload);
    }

    fn on_pool_response(&self, tuple: &Tuple) {
        for i in 0..tuple.len() {
            if let Some(txn_tuple) = tuple.get_tuple(i) {
                self.accept_transaction(txn_tuple);
            }
        }
    }

    fn on_transaction(&self, tuple: &Tuple) {
        self.accept_transaction(tuple);
    }

    fn accept_transaction(&self, tuple: &Tuple) {
        match Transaction::from_tuple(tuple) {
            Ok(txn) => {
                self.pool.add(Arc::new(txn));
            }
            Err(e) => debug!(error = %e, "rejected transaction"),
        }
    }

    // -----------------------------------------------------------------------
    // Blocks: receive, author, extend
    // -----------------------------------------------------------------------

    /// Validate and insert a received block, then try to out-fork it.
    fn handle_incoming_block(&self, tuple: &Tuple, deadline: &mut Instant) {
        let parsed = {
            let chain = self.chain.read();
            Block::from_tuple(tuple, |hash| chain.block(hash))
        };
        let block = match parsed {
            Ok(block) => block,
            Err(e) => {
                debug!(error = %e, "rejected incoming block");
                return;
            }
        };

        if self.insert_and_announce(Arc::clone(&block), deadline) {
            self.try_counter_fork(&block, deadline);
        }
    }

    /// Give ourselves a chance to win the slot: if we have no child at the
    /// incoming block's parent, author a competing sibling from the pool.
    fn try_counter_fork(&self, block: &Arc<Block>, deadline: &mut Instant) {
        let Some(parent) = block.parent().cloned() else {
            return;
        };
        if parent
            .child_with_creator(&self.keypair.public_key())
            .is_some()
        {
            return;
        }
        if let Some(candidate) = self.author(Some(parent)) {
            if self.insert_and_announce(Arc::clone(&candidate), deadline) {
                self.broadcast_block(&candidate);
            }
        }
    }

    /// Authoring tick: extend the principal unless we already did.
    fn on_tick(&self, deadline: &mut Instant) {
        let Some(principal) = self.chain.read().principal().cloned() else {
            return;
        };
        if principal
            .child_with_creator(&self.keypair.public_key())
            .is_some()
        {
            return;
        }
        if let Some(block) = self.author(Some(principal)) {
            if self.insert_and_announce(Arc::clone(&block), deadline) {
                self.broadcast_block(&block);
            }
        }
    }

    /// Build a block from the current pool. On success the confirmed
    /// transactions leave the pool; on failure the pool keeps everything.
    ///
    /// Transactions that already settled on the target chain are weeded
    /// out first — they arrive through pool sync after confirmation, and
    /// including one would (rightly) invalidate the whole block.
    fn author(&self, parent: Option<Arc<Block>>) -> Option<Arc<Block>> {
        let mut candidates = self.pool.snapshot();
        if let Some(tip) = parent.as_deref() {
            let stale: Vec<Hash> = candidates
                .iter()
                .filter(|t| tip.chain_contains_transaction(t.hash()))
                .map(|t| *t.hash())
                .collect();
            if !stale.is_empty() {
                self.pool.remove_hashes(&stale);
                candidates.retain(|t| !stale.contains(t.hash()));
            }
        }
        match Block::create(&self.keypair, parent, candidates) {
            Ok(block) => {
                let confirmed: Vec<Hash> =
                    block.transactions().iter().map(|t| *t.hash()).collect();
                self.pool.remove_hashes(&confirmed);
                Some(block)
            }
            Err(e) => {
                debug!(error = %e, "block authoring failed");
                None
            }
        }
    }

    /// Insert into the tree; on a principal change, run rollback replay
    /// and restart the authoring deadline. Returns false for duplicates.
    fn insert_and_announce(&self, block: Arc<Block>, deadline: &mut Instant) -> bool {
        let outcome = self.chain.write().insert(block);
        match outcome {
            InsertOutcome::Duplicate => false,
            InsertOutcome::Inserted { extension } => {
                if let Some(ext) = extension {
                    self.on_extended(&ext, deadline);
                }
                true
            }
        }
    }

    /// React to a principal change. When the previous leaf is not an
    /// ancestor of the new one, a fork overtook the principal chain: every
    /// block from the old leaf down to the common ancestor is orphaned and
    /// its transactions return to the pool to be confirmed again.
    fn on_extended(&self, ext: &Extension, deadline: &mut Instant) {
        let mut cursor = ext.prev.clone();
        loop {
            if ext.new.has_ancestor(cursor.as_ref()) {
                break;
            }
            let block = cursor.expect("rollback walk passed the root");
            for txn in block.transactions() {
                self.pool.add(Arc::clone(txn));
            }
            cursor = block.parent().cloned();
        }

        info!(
            height = ext.new.height(),
            hash = %ext.new.hash(),
            value = self.balance(),
            "principal chain extended"
        );
        *deadline = Instant::now() + BLOCK_TIME;
    }

    fn broadcast_block(&self, block: &Block) {
        self.network
            .broadcast(MessageType::Block, &block.to_bytes());
    }

    // -----------------------------------------------------------------------
    // Local surface (REPL / REST)
    // -----------------------------------------------------------------------

    /// Our creator account's balance at the principal leaf.
    pub fn balance(&self) -> u64 {
        self.chain
            .read()
            .principal()
            .and_then(|p| p.account(&self.keypair.public_key()))
            .map_or(0, |account| account.value)
    }

    /// Hex form of our creator public key.
    pub fn public_key_hex(&self) -> String {
        self.keypair.public_key().to_hex()
    }

    /// Sign a transfer, enqueue it locally and gossip it. The nonce is a
    /// local counter — its only job is to keep otherwise identical
    /// transfers distinct.
    pub fn submit_transfer(&self, recipient: PublicKey, value: u64) -> Arc<Transaction> {
        let nonce = self.next_nonce.fetch_add(1, Ordering::Relaxed);
        let txn = Arc::new(Transaction::create(&self.keypair, recipient, value, nonce));
        self.pool.add(Arc::clone(&txn));
        self.network
            .broadcast(MessageType::Transaction, &txn.to_bytes());
        txn
    }

    /// The pending pool as a JSON array.
    pub fn pool_json(&self) -> serde_json::Value {
        self.pool.to_json()
    }
}
