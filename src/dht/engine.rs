use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info, trace, warn};

use super::config::DhtConfig;
use super::error::DhtError;
use super::message::{DhtMessage, DhtResponse, MessageBody};
use super::node::{parse_compact_nodes, InfoHash, NodeContact, NodeId};
use super::query::QueryKind;
use super::registry::NodeRegistry;
use super::selector::{select_candidates, SelectionLimits};
use super::stats::{DhtStats, StatsSnapshot};
use super::transport::{self, InboundPacket};
use crate::constants::PACKET_CHANNEL_CAPACITY;

/// Newly found peers, keyed by info hash. Each batch holds the new peers
/// from exactly one `get_peers` reply.
pub type PeerBatch = HashMap<InfoHash, Vec<SocketAddr>>;

/// Client-side handle to a running [`DhtEngine`].
#[derive(Debug, Clone)]
pub struct DhtHandle {
    our_id: NodeId,
    local_addr: SocketAddr,
    hints: mpsc::Sender<NodeContact>,
    requests: mpsc::Sender<InfoHash>,
    stats: Arc<DhtStats>,
}

impl DhtHandle {
    pub fn our_id(&self) -> &NodeId {
        &self.our_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Asks the engine to look for more peers. Returns once the request is
    /// queued; results arrive on [`PeerResults`].
    pub async fn request_peers(&self, info_hash: InfoHash) -> Result<(), DhtError> {
        self.requests
            .send(info_hash)
            .await
            .map_err(|_| DhtError::EngineStopped)
    }

    /// Tells the engine about a node it may not know yet, e.g. one learned
    /// from a peer's `PORT` message.
    pub async fn add_node(&self, id: NodeId, addr: SocketAddr) -> Result<(), DhtError> {
        self.hints
            .send(NodeContact::new(id, addr))
            .await
            .map_err(|_| DhtError::EngineStopped)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// Stream of [`PeerBatch`]es.
///
/// The engine waits for room in this channel before it processes anything
/// else, so a consumer that stops reading stalls discovery entirely.
#[derive(Debug)]
pub struct PeerResults {
    rx: mpsc::Receiver<PeerBatch>,
}

impl PeerResults {
    pub async fn recv(&mut self) -> Option<PeerBatch> {
        self.rx.recv().await
    }

    /// Returns [`TryRecvError::Empty`] when no batch is ready and
    /// [`TryRecvError::Disconnected`] once the engine is gone.
    pub fn try_recv(&mut self) -> Result<PeerBatch, TryRecvError> {
        self.rx.try_recv()
    }
}

/// A client-only BEP-5 DHT node.
///
/// The engine owns every piece of mutable DHT state and is driven by a
/// single task: [`DhtEngine::run`]. Clients talk to it through a
/// [`DhtHandle`] and read discoveries from [`PeerResults`]. Outbound packets
/// are sent from detached tasks that never touch engine state.
///
/// The engine never answers queries from other nodes and never announces
/// itself.
///
/// # Examples
///
/// ```no_run
/// use trackerless::dht::{DhtConfig, DhtEngine, NodeId};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (engine, handle, mut results) = DhtEngine::bind(DhtConfig::new(NodeId::generate(), 6881)).await?;
/// tokio::spawn(engine.run());
///
/// let info_hash: NodeId = "e84213a794f3ccd890382a54a64ca68b7e925433".parse()?;
/// handle.request_peers(info_hash).await?;
///
/// while let Some(batch) = results.recv().await {
///     for (info_hash, peers) in batch {
///         println!("{}: {} new peers", info_hash, peers.len());
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct DhtEngine {
    config: DhtConfig,
    socket: Arc<UdpSocket>,
    registry: NodeRegistry,
    peers_seen: HashMap<InfoHash, HashSet<SocketAddr>>,
    expansions_left: HashMap<InfoHash, usize>,
    hints: mpsc::Receiver<NodeContact>,
    requests: mpsc::Receiver<InfoHash>,
    results: mpsc::Sender<PeerBatch>,
    stats: Arc<DhtStats>,
}

impl DhtEngine {
    /// Binds the UDP socket and wires up the channels. Fails with
    /// [`DhtError::InvalidConfig`] if a channel capacity is zero.
    pub async fn bind(config: DhtConfig) -> Result<(Self, DhtHandle, PeerResults), DhtError> {
        if config.command_capacity == 0 {
            return Err(DhtError::InvalidConfig("command_capacity must be at least 1".into()));
        }
        if config.result_capacity == 0 {
            return Err(DhtError::InvalidConfig("result_capacity must be at least 1".into()));
        }

        let socket = transport::listen(config.port).await?;
        let local_addr = socket.local_addr()?;

        info!("DHT node bound to {} with id {}", local_addr, config.node_id);

        let (hints_tx, hints) = mpsc::channel(config.command_capacity);
        let (requests_tx, requests) = mpsc::channel(config.command_capacity);
        let (results, results_rx) = mpsc::channel(config.result_capacity);
        let stats = Arc::new(DhtStats::default());

        let handle = DhtHandle {
            our_id: config.node_id,
            local_addr,
            hints: hints_tx,
            requests: requests_tx,
            stats: Arc::clone(&stats),
        };

        let engine = Self {
            config,
            socket,
            registry: NodeRegistry::new(),
            peers_seen: HashMap::new(),
            expansions_left: HashMap::new(),
            hints,
            requests,
            results,
            stats,
        };

        Ok((engine, handle, PeerResults { rx: results_rx }))
    }

    pub fn our_id(&self) -> &NodeId {
        &self.config.node_id
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DhtError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Number of distinct peers delivered so far for `info_hash`.
    pub fn known_peers(&self, info_hash: &InfoHash) -> usize {
        self.peers_seen.get(info_hash).map_or(0, HashSet::len)
    }

    /// Pings the bootstrap router, then serves until every [`DhtHandle`] is
    /// dropped.
    pub async fn run(mut self) {
        let (packet_tx, mut packets) = mpsc::channel(PACKET_CHANNEL_CAPACITY);
        let reader = transport::spawn_receive_loop(Arc::clone(&self.socket), packet_tx);

        if let Err(e) = self.bootstrap().await {
            warn!("DHT bootstrap failed: {}", e);
        }

        info!("Starting DHT node");
        loop {
            tokio::select! {
                Some(contact) = self.hints.recv() => {
                    self.handle_hint(contact);
                }
                request = self.requests.recv() => match request {
                    Some(info_hash) => self.handle_peers_request(info_hash),
                    None => {
                        info!("All DHT handles dropped, stopping");
                        break;
                    }
                },
                Some(packet) = packets.recv() => {
                    self.handle_packet(packet).await;
                }
            }
        }

        reader.abort();
    }

    async fn bootstrap(&mut self) -> Result<(), DhtError> {
        let Some(router) = self.config.bootstrap_router.clone() else {
            debug!("No bootstrap router configured");
            return Ok(());
        };

        let addr = tokio::net::lookup_host(router.as_str())
            .await?
            .next()
            .ok_or_else(|| DhtError::InvalidAddress(router.clone()))?;

        if !self.registry.contains(&addr) {
            self.stats.node_created();
        }
        let tid = self
            .registry
            .get_or_insert(addr)
            .record_new_query(QueryKind::Ping, None);
        let payload = DhtMessage::ping(tid, &self.config.node_id).encode();

        debug!("Pinging bootstrap router {} ({})", router, addr);
        transport::send(&self.socket, addr, &payload).await?;
        self.stats.ping_sent();
        Ok(())
    }

    /// Registers a node learned from outside the DHT and pings it.
    pub fn handle_hint(&mut self, contact: NodeContact) {
        if !self.registry.insert_contact(contact) {
            trace!("Hinted node {} already known", contact.addr);
            return;
        }
        self.stats.node_created();
        self.send_ping(contact.addr);
    }

    /// Starts a discovery round on behalf of the client and refills the
    /// automatic expansion budget for `info_hash`.
    pub fn handle_peers_request(&mut self, info_hash: InfoHash) {
        debug!("Client asking for more peers for {}", info_hash);
        self.expansions_left
            .insert(info_hash, self.config.max_expansions);
        self.get_peers(info_hash);
        debug!("Reachable nodes: {}", self.registry.reachable_count());
    }

    pub async fn handle_packet(&mut self, packet: InboundPacket) {
        let msg = match DhtMessage::parse(&packet.payload) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("Failed to parse DHT message from {}: {}", packet.from, e);
                return;
            }
        };

        let Some(node) = self.registry.get_mut(&packet.from) else {
            debug!("Contacted by unknown host {}, ignoring", packet.from);
            return;
        };

        let response = match msg.body {
            MessageBody::Response(response) => response,
            MessageBody::Query(query) => {
                debug!("Ignoring {} query from {}", query.method(), packet.from);
                return;
            }
            MessageBody::Error { code, message } => {
                debug!("DHT error {} from {}: {}", code, packet.from, message);
                return;
            }
        };

        if node.id.is_none() {
            node.id = Some(response.id);
        }

        let Some(query) = node.resolve_query(&msg.transaction_id) else {
            self.stats.stale_response();
            debug!(
                "Unknown transaction id {:02x?} from {}",
                &msg.transaction_id[..],
                packet.from
            );
            return;
        };
        self.stats.response_matched();

        match query.kind {
            QueryKind::Ping => {}
            QueryKind::GetPeers => match query.info_hash {
                Some(info_hash) => {
                    self.process_get_peers(packet.from, info_hash, response)
                        .await
                }
                None => debug!("get_peers query without info hash to {}", packet.from),
            },
            QueryKind::FindNode | QueryKind::AnnouncePeer => {
                debug!("Unhandled {} response from {}", query.kind, packet.from);
            }
        }
    }

    /// Delivers new peers to the client and follows node references while
    /// the info hash still has too few peers.
    async fn process_get_peers(&mut self, from: SocketAddr, info_hash: InfoHash, response: DhtResponse) {
        if let Some(values) = response.values {
            let seen = self.peers_seen.entry(info_hash).or_default();
            let peers: Vec<SocketAddr> = values.into_iter().filter(|p| seen.insert(*p)).collect();

            if !peers.is_empty() {
                self.stats.peers_found(peers.len());
                debug!(
                    "{} new peers for {} from {} ({} known)",
                    peers.len(),
                    info_hash,
                    from,
                    self.known_peers(&info_hash)
                );
                self.publish(info_hash, peers).await;
            }
        }

        let Some(nodes) = response.nodes else {
            return;
        };
        let contacts = match parse_compact_nodes(&nodes) {
            Ok(contacts) => contacts,
            Err(e) => {
                debug!("Bad node list from {}: {}", from, e);
                return;
            }
        };

        for contact in contacts {
            trace!("Got node reference {}@{} from {}", contact.id, contact.addr, from);
            if !self.registry.insert_contact(contact) {
                self.stats.duplicate_node();
                continue;
            }
            self.stats.node_created();

            if self.known_peers(&info_hash) < self.config.min_info_hash_peers {
                self.expand(info_hash);
            } else {
                trace!("Enough peers for {}, just saving {}", info_hash, contact.addr);
            }
        }
    }

    fn expand(&mut self, info_hash: InfoHash) {
        let left = self.expansions_left.entry(info_hash).or_insert(0);
        if *left == 0 {
            trace!("Expansion budget for {} spent", info_hash);
            return;
        }
        *left -= 1;
        self.get_peers(info_hash);
    }

    // Awaited on purpose: the result channel is bounded and the client is
    // expected to keep draining it.
    async fn publish(&mut self, info_hash: InfoHash, peers: Vec<SocketAddr>) {
        let mut batch = PeerBatch::with_capacity(1);
        batch.insert(info_hash, peers);
        if self.results.send(batch).await.is_err() {
            warn!("Peer results receiver dropped, discarding peers for {}", info_hash);
        }
    }

    fn limits(&self) -> SelectionLimits {
        SelectionLimits {
            fan_out: self.config.fan_out,
            max_pending_queries: self.config.max_node_pending_queries,
            repeat_query_cooldown: self.config.repeat_query_cooldown,
        }
    }

    /// Sends `get_peers` to the best candidates. Returns how many were asked.
    fn get_peers(&mut self, info_hash: InfoHash) -> usize {
        let targets = match select_candidates(&self.registry, &info_hash, &self.limits(), Instant::now()) {
            Ok(targets) => targets,
            Err(e) => {
                info!("Not searching for {}: {}", info_hash, e);
                return 0;
            }
        };

        for addr in &targets {
            let tid = self
                .registry
                .get_or_insert(*addr)
                .record_new_query(QueryKind::GetPeers, Some(info_hash));
            self.dispatch(*addr, &DhtMessage::get_peers(tid, &self.config.node_id, info_hash));
            self.stats.get_peers_sent();
        }

        debug!("Sent get_peers for {} to {} nodes", info_hash, targets.len());
        targets.len()
    }

    fn send_ping(&mut self, addr: SocketAddr) {
        let tid = self
            .registry
            .get_or_insert(addr)
            .record_new_query(QueryKind::Ping, None);
        self.dispatch(addr, &DhtMessage::ping(tid, &self.config.node_id));
        self.stats.ping_sent();
    }

    fn dispatch(&self, addr: SocketAddr, msg: &DhtMessage) {
        transport::send_detached(Arc::clone(&self.socket), addr, msg.encode());
    }
}
