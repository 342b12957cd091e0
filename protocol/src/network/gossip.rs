//! # Gossip Transport
//!
//! Framed TCP peer connections with GUID-based flood suppression. The
//! `Network` owns the peer table and the socket tasks; everything it
//! learns is delivered as `NetworkEvent`s through one channel, in arrival
//! order per peer, to whoever runs the orchestrator loop.
//!
//! ## Loop Suppression
//!
//! Broadcast frames carry a random GUID. A bounded FIFO history of
//! recently seen GUIDs decides, on arrival, whether a gossip frame is
//! fresh: a known GUID is dropped without dispatch or reflection, a fresh
//! one is recorded, dispatched, and reflected to every *other* peer
//! exactly once. Unicast frames (GUID zero) are always dispatched and
//! never reflected.
//!
//! ## Broadcast Efficiency
//!
//! A logical broadcast serializes its frame once into an `Arc<[u8]>`; the
//! per-peer write queues share the allocation and it is freed when the
//! last outstanding write completes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::config::MESSAGE_HISTORY_SIZE;
use crate::network::wire::{encode_frame, Frame, FrameDecoder, Guid, MessageType};

/// Opaque peer handle, unique for the lifetime of the process.
pub type PeerId = u64;

/// What the network reports to the orchestrator. Events from one peer
/// arrive in order; events from different peers interleave arbitrarily.
#[derive(Debug)]
pub enum NetworkEvent {
    /// A connection (inbound or outbound) is up.
    Connected { peer: PeerId },
    /// The connection is gone; the peer has been removed from the table.
    Disconnected { peer: PeerId },
    /// A complete, de-duplicated frame arrived.
    Frame { peer: PeerId, frame: Frame },
}

// ---------------------------------------------------------------------------
// MessageHistory
// ---------------------------------------------------------------------------

/// Bounded FIFO of recently seen broadcast GUIDs.
#[derive(Debug)]
pub struct MessageHistory {
    capacity: usize,
    order: VecDeque<Guid>,
    seen: HashSet<Guid>,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    pub fn contains(&self, guid: &Guid) -> bool {
        self.seen.contains(guid)
    }

    /// Record a GUID, evicting the oldest entry once at capacity.
    pub fn record(&mut self, guid: Guid) {
        if !self.seen.insert(guid) {
            return;
        }
        if self.order.len() == self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        self.order.push_back(guid);
    }
}

// ---------------------------------------------------------------------------
// Peer
// ---------------------------------------------------------------------------

struct Peer {
    addr: SocketAddr,
    /// The listen port the peer declared in its handshake; -1 until then.
    declared_port: AtomicI32,
    writer: mpsc::UnboundedSender<Arc<[u8]>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

struct Shared {
    peers: RwLock<HashMap<PeerId, Arc<Peer>>>,
    history: Mutex<MessageHistory>,
    events: mpsc::UnboundedSender<NetworkEvent>,
    next_id: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// The peer-to-peer transport. Cheap to clone; all clones share one peer
/// table and GUID history.
#[derive(Clone)]
pub struct Network {
    shared: Arc<Shared>,
}

impl Network {
    /// Create a network and the event stream its socket tasks feed.
    pub fn new() -> (Network, mpsc::UnboundedReceiver<NetworkEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let network = Network {
            shared: Arc::new(Shared {
                peers: RwLock::new(HashMap::new()),
                history: Mutex::new(MessageHistory::new(MESSAGE_HISTORY_SIZE)),
                events,
                next_id: AtomicU64::new(1),
                listener: Mutex::new(None),
            }),
        };
        (network, rx)
    }

    /// Accept incoming connections on `port` (0 picks an ephemeral port).
    /// Returns the port actually bound.
    pub fn listen(&self, port: u16, backlog: u32) -> std::io::Result<u16> {
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(SocketAddr::from(([0, 0, 0, 0], port)))?;
        let listener = socket.listen(backlog)?;
        let bound = listener.local_addr()?.port();

        let network = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _)) => network.register(stream),
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                    }
                }
            }
        });
        *self.shared.listener.lock() = Some(handle);
        Ok(bound)
    }

    /// Dial a peer. Connection failures are logged, not returned — the
    /// caller finds out through the absence of a `Connected` event.
    pub fn connect(&self, addr: SocketAddr) {
        let network = self.clone();
        tokio::spawn(async move {
            match TcpStream::connect(addr).await {
                Ok(stream) => network.register(stream),
                Err(e) => warn!(%addr, error = %e, "unable to connect to peer"),
            }
        });
    }

    /// Wire a fresh TCP stream into the peer table and spawn its tasks.
    fn register(&self, stream: TcpStream) {
        let addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(e) => {
                warn!(error = %e, "dropping connection without a peer address");
                return;
            }
        };
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (read_half, mut write_half) = stream.into_split();
        let (writer, mut write_rx) = mpsc::unbounded_channel::<Arc<[u8]>>();

        let peer = Arc::new(Peer {
            addr,
            declared_port: AtomicI32::new(-1),
            writer,
            reader: Mutex::new(None),
        });
        self.shared.peers.write().insert(id, Arc::clone(&peer));
        let _ = self.shared.events.send(NetworkEvent::Connected { peer: id });

        // Writer: drains the queue until the sender side disappears
        // (peer removed) or a write fails.
        let writer_net = self.clone();
        tokio::spawn(async move {
            while let Some(chunk) = write_rx.recv().await {
                if let Err(e) = write_half.write_all(&chunk).await {
                    debug!(peer = id, error = %e, "write failed");
                    writer_net.remove_peer(id);
                    break;
                }
            }
        });

        // Reader: feeds the frame decoder until EOF or error.
        let reader_net = self.clone();
        let handle = tokio::spawn(async move {
            reader_net.read_loop(id, read_half).await;
            reader_net.remove_peer(id);
        });
        *peer.reader.lock() = Some(handle);
    }

    async fn read_loop(&self, id: PeerId, mut read_half: OwnedReadHalf) {
        let mut decoder = FrameDecoder::new();
        let mut buf = [0u8; 4096];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    decoder.extend(&buf[..n]);
                    while let Some(frame) = decoder.next_frame() {
                        self.ingest(id, frame);
                    }
                }
                Err(e) => {
                    debug!(peer = id, error = %e, "read failed");
                    break;
                }
            }
        }
    }

    /// Apply loop suppression to a decoded frame and dispatch it.
    ///
    /// Unicasts always dispatch. Gossip frames dispatch once — a GUID
    /// already in the history is dropped silently — and fresh gossip is
    /// reflected to every peer except the one it came from.
    pub(crate) fn ingest(&self, from: PeerId, frame: Frame) {
        if frame.guid.is_null() {
            let _ = self
                .shared
                .events
                .send(NetworkEvent::Frame { peer: from, frame });
            return;
        }

        {
            let mut history = self.shared.history.lock();
            if history.contains(&frame.guid) {
                trace!(peer = from, guid = ?frame.guid, "suppressed gossip echo");
                return;
            }
            history.record(frame.guid);
        }

        let bytes: Arc<[u8]> = encode_frame(&frame.guid, frame.msg_type, &frame.payload).into();
        for (peer_id, peer) in self.shared.peers.read().iter() {
            if *peer_id != from {
                let _ = peer.writer.send(Arc::clone(&bytes));
            }
        }

        let _ = self
            .shared
            .events
            .send(NetworkEvent::Frame { peer: from, frame });
    }

    /// Unicast a payload to one peer (GUID zero).
    pub fn send(&self, peer: PeerId, msg_type: MessageType, payload: &[u8]) {
        let Some(target) = self.shared.peers.read().get(&peer).cloned() else {
            return;
        };
        let bytes: Arc<[u8]> = encode_frame(&Guid::NULL, msg_type, payload).into();
        let _ = target.writer.send(bytes);
    }

    /// Gossip a payload to every peer under a fresh GUID. The GUID is
    /// recorded locally first so our own broadcast cannot echo back in.
    pub fn broadcast(&self, msg_type: MessageType, payload: &[u8]) {
        let guid = Guid::random();
        self.shared.history.lock().record(guid);

        let bytes: Arc<[u8]> = encode_frame(&guid, msg_type, payload).into();
        for peer in self.shared.peers.read().values() {
            let _ = peer.writer.send(Arc::clone(&bytes));
        }
    }

    /// Tear down a peer connection deliberately (handshake rejection).
    pub fn disconnect(&self, peer: PeerId) {
        self.remove_peer(peer);
    }

    /// Remove a peer from the table, stop its tasks, and announce the
    /// disconnect. Idempotent — reader, writer and orchestrator may race
    /// to call it.
    fn remove_peer(&self, id: PeerId) {
        let Some(peer) = self.shared.peers.write().remove(&id) else {
            return;
        };
        if let Some(handle) = peer.reader.lock().take() {
            handle.abort();
        }
        // Dropping the peer drops its write queue sender, which ends the
        // writer task after the queue drains.
        let _ = self
            .shared
            .events
            .send(NetworkEvent::Disconnected { peer: id });
    }

    pub fn peer_count(&self) -> usize {
        self.shared.peers.read().len()
    }

    /// The remote socket address of a connected peer.
    pub fn peer_addr(&self, peer: PeerId) -> Option<SocketAddr> {
        self.shared.peers.read().get(&peer).map(|p| p.addr)
    }

    /// The listen port the peer declared in its handshake; -1 before.
    pub fn peer_port(&self, peer: PeerId) -> Option<i32> {
        self.shared
            .peers
            .read()
            .get(&peer)
            .map(|p| p.declared_port.load(Ordering::Relaxed))
    }

    /// Adopt the peer's declared listen port after a handshake.
    pub fn set_peer_port(&self, peer: PeerId, port: i32) {
        if let Some(p) = self.shared.peers.read().get(&peer) {
            p.declared_port.store(port, Ordering::Relaxed);
        }
    }

    /// Whether some peer's remote address and declared port match —
    /// the duplicate-connection check of the handshake.
    pub fn has_peer(&self, addr: &str, port: i32) -> bool {
        self.shared.peers.read().values().any(|p| {
            p.addr.ip().to_string() == addr && p.declared_port.load(Ordering::Relaxed) == port
        })
    }

    /// `(addr, declared_port)` of every handshaken peer except `exclude`,
    /// for a PEERS_RESPONSE.
    pub fn peer_list(&self, exclude: PeerId) -> Vec<(String, i32)> {
        self.shared
            .peers
            .read()
            .iter()
            .filter(|(id, _)| **id != exclude)
            .filter_map(|(_, p)| {
                let port = p.declared_port.load(Ordering::Relaxed);
                (port > 0).then(|| (p.addr.ip().to_string(), port))
            })
            .collect()
    }

    /// Stop accepting, drop every peer, and end the event stream.
    pub fn shutdown(&self) {
        if let Some(handle) = self.shared.listener.lock().take() {
            handle.abort();
        }
        let ids: Vec<PeerId> = self.shared.peers.read().keys().copied().collect();
        for id in ids {
            self.remove_peer(id);
        }
    }
}
