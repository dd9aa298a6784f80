use super::*;
use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::timeout;

fn id(first: u8) -> NodeId {
    let mut bytes = [0u8; 20];
    bytes[0] = first;
    NodeId(bytes)
}

fn addr(last: u8, port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), port)
}

fn limits() -> SelectionLimits {
    SelectionLimits {
        fan_out: 5,
        max_pending_queries: 5,
        repeat_query_cooldown: Duration::from_secs(30 * 60),
    }
}

// --- distance ---------------------------------------------------------------

#[test]
fn test_hash_distance_xor() {
    let a = [0u8; 20];
    let b = [0xFF; 20];
    assert_eq!(hash_distance(&a, &b).unwrap(), Distance([0xFF; 20]));

    let mut c = [0u8; 20];
    c[19] = 0x0F;
    let mut d = [0u8; 20];
    d[19] = 0xF0;
    assert_eq!(hash_distance(&c, &d).unwrap().as_bytes()[19], 0xFF);
}

#[test]
fn test_hash_distance_self_is_degenerate() {
    let a = [0x41u8; 20];
    assert!(matches!(
        hash_distance(&a, &a),
        Err(DhtError::DegenerateComparison)
    ));
    assert!(matches!(
        id(9).distance(&id(9)),
        Err(DhtError::DegenerateComparison)
    ));
}

#[test]
fn test_hash_distance_invalid_length() {
    let good = [1u8; 20];
    assert!(matches!(
        hash_distance(&good, &[1u8; 19]),
        Err(DhtError::InvalidIdentifier(20, 19))
    ));
    assert!(matches!(
        hash_distance(&[1u8; 21], &good),
        Err(DhtError::InvalidIdentifier(21, 20))
    ));
}

#[test]
fn test_distance_orders_big_endian() {
    let target = [0u8; 20];
    let mut high = [0u8; 20];
    high[0] = 0x01;
    let mut low = [0u8; 20];
    low[19] = 0xFF;

    let d_high = hash_distance(&target, &high).unwrap();
    let d_low = hash_distance(&target, &low).unwrap();
    assert!(d_low < d_high);
}

// --- node ids and contacts --------------------------------------------------

#[test]
fn test_node_id_generate() {
    assert_ne!(NodeId::generate(), NodeId::generate());
}

#[test]
fn test_node_id_from_bytes_invalid() {
    assert!(NodeId::from_bytes(&[1u8; 10]).is_err());
}

#[test]
fn test_node_id_hex() {
    let id: NodeId = "e84213a794f3ccd890382a54a64ca68b7e925433".parse().unwrap();
    assert_eq!(id.0[0], 0xe8);
    assert_eq!(id.to_string(), "e84213a794f3ccd890382a54a64ca68b7e925433");

    assert!("e842".parse::<NodeId>().is_err());
    assert!("zz4213a794f3ccd890382a54a64ca68b7e925433".parse::<NodeId>().is_err());
}

#[test]
fn test_node_contact_compact() {
    let contact = NodeContact::new(NodeId([1u8; 20]), addr(1, 6881));

    let compact = contact.to_compact().unwrap();
    assert_eq!(compact.len(), 26);
    assert_eq!(NodeContact::from_compact(&compact), Some(contact));

    let v6 = NodeContact::new(
        NodeId([1u8; 20]),
        SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), 6881),
    );
    assert!(v6.to_compact().is_none());
}

#[test]
fn test_parse_compact_nodes() {
    let mut data = Vec::new();
    for i in 1..=3 {
        let contact = NodeContact::new(id(i), addr(i, 6881));
        data.extend_from_slice(&contact.to_compact().unwrap());
    }

    let nodes = parse_compact_nodes(&data).unwrap();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[2].addr, addr(3, 6881));

    assert!(matches!(
        parse_compact_nodes(&data[..30]),
        Err(DhtError::MalformedNodeList(30))
    ));
    assert!(parse_compact_nodes(&[]).unwrap().is_empty());
}

#[test]
fn test_compact_peer() {
    let v4 = [192, 168, 1, 1, 0x1A, 0xE1];
    assert_eq!(
        parse_compact_peer(&v4),
        Some("192.168.1.1:6881".parse().unwrap())
    );

    let v6: SocketAddr = "[::1]:51413".parse().unwrap();
    let encoded = encode_compact_peer(&v6);
    assert_eq!(encoded.len(), 18);
    assert_eq!(parse_compact_peer(&encoded), Some(v6));

    assert_eq!(parse_compact_peer(&[1, 2, 3]), None);
}

// --- registry and query tracking --------------------------------------------

#[test]
fn test_record_new_query_ids_are_unique() {
    let mut node = RemoteNode::new(None, addr(1, 6881));

    let tids: Vec<_> = (0..50)
        .map(|_| node.record_new_query(QueryKind::Ping, None))
        .collect();

    let unique: std::collections::HashSet<_> = tids.iter().collect();
    assert_eq!(unique.len(), 50);
    assert_eq!(node.pending_count(), 50);
    assert!(tids.iter().all(|t| t.len() == 2));
}

#[test]
fn test_resolve_query_moves_to_history() {
    let mut node = RemoteNode::new(Some(id(1)), addr(1, 6881));
    let info_hash = id(0xAA);
    let tid = node.record_new_query(QueryKind::GetPeers, Some(info_hash));

    assert!(node.has_pending_get_peers(&info_hash));
    assert!(!node.reachable);
    assert!(node.last_contact.is_none());

    let query = node.resolve_query(&tid).unwrap();
    assert_eq!(query.kind, QueryKind::GetPeers);
    assert_eq!(query.info_hash, Some(info_hash));

    assert_eq!(node.pending_count(), 0);
    assert!(!node.has_pending_get_peers(&info_hash));
    assert!(node.has_past_get_peers(&info_hash));
    assert!(node.reachable);
    assert!(node.last_contact.is_some());
}

#[test]
fn test_resolve_unknown_transaction() {
    let mut node = RemoteNode::new(None, addr(1, 6881));
    node.record_new_query(QueryKind::Ping, None);

    assert!(node.resolve_query(b"zz").is_none());
    assert_eq!(node.pending_count(), 1);
    assert!(!node.reachable);
}

#[test]
fn test_registry_get_or_create() {
    let mut registry = NodeRegistry::new();

    assert!(registry.get_or_create("not an address").is_none());
    assert!(registry.is_empty());

    let node = registry.get_or_create("10.0.0.1:6881").unwrap();
    assert!(node.id.is_none());
    assert!(!node.reachable);

    registry.get_or_create("10.0.0.1:6881").unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.reachable_count(), 0);
}

#[test]
fn test_registry_insert_contact() {
    let mut registry = NodeRegistry::new();
    let contact = NodeContact::new(id(1), addr(1, 6881));

    assert!(registry.insert_contact(contact));
    assert!(!registry.insert_contact(NodeContact::new(id(2), addr(1, 6881))));
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(&contact.addr).unwrap().id, Some(id(1)));
}

// --- candidate selection ----------------------------------------------------

#[test]
fn test_select_no_known_nodes() {
    let registry = NodeRegistry::new();
    let info_hash = NodeId([b'A'; 20]);

    assert!(matches!(
        select_candidates(&registry, &info_hash, &limits(), Instant::now()),
        Err(DhtError::NoKnownNodes)
    ));
}

#[test]
fn test_select_ranks_by_distance() {
    let mut registry = NodeRegistry::new();
    for i in [9u8, 3, 7, 1, 5] {
        registry.insert_contact(NodeContact::new(id(i), addr(i, 6881)));
    }

    let limits = SelectionLimits {
        fan_out: 3,
        ..limits()
    };
    let picked = select_candidates(&registry, &id(0), &limits, Instant::now()).unwrap();
    assert_eq!(picked, vec![addr(1, 6881), addr(3, 6881), addr(5, 6881)]);
}

#[test]
fn test_select_unknown_ids_first() {
    let mut registry = NodeRegistry::new();
    registry.insert_contact(NodeContact::new(id(1), addr(1, 6881)));
    registry.get_or_insert(addr(2, 6881));

    let picked = select_candidates(&registry, &id(0), &limits(), Instant::now()).unwrap();
    assert_eq!(picked, vec![addr(2, 6881), addr(1, 6881)]);
}

#[test]
fn test_sort_by_distance_is_stable() {
    let mut registry = NodeRegistry::new();
    for i in 1..=20u8 {
        registry.insert_contact(NodeContact::new(id(i.wrapping_mul(37)), addr(i, 6881)));
    }
    let target = id(0x55);

    let mut first: Vec<&RemoteNode> = registry.iter().collect();
    let mut second: Vec<&RemoteNode> = registry.iter().collect();
    sort_by_distance(&target, &mut first);
    sort_by_distance(&target, &mut second);

    let first: Vec<_> = first.iter().map(|n| n.addr).collect();
    let second: Vec<_> = second.iter().map(|n| n.addr).collect();
    assert_eq!(first, second);

    let keys: Vec<_> = registry
        .iter()
        .map(|n| rank_key(&target, n.id.as_ref()))
        .collect();
    let mut sorted = keys.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), keys.len());
}

#[test]
fn test_rank_key_target_equal_to_id() {
    let target = id(4);
    assert_eq!(rank_key(&target, Some(&target)), RankKey::Known(Distance::ZERO));
    assert!(rank_key(&target, None) < rank_key(&target, Some(&target)));
}

#[test]
fn test_select_skips_saturated_node() {
    let mut registry = NodeRegistry::new();
    let target = addr(1, 6881);
    registry.insert_contact(NodeContact::new(id(1), target));
    let info_hash = id(0xAA);

    let mut tids = Vec::new();
    for _ in 0..6 {
        tids.push(
            registry
                .get_mut(&target)
                .unwrap()
                .record_new_query(QueryKind::Ping, None),
        );
    }

    let picked = select_candidates(&registry, &info_hash, &limits(), Instant::now()).unwrap();
    assert!(picked.is_empty());

    registry.get_mut(&target).unwrap().resolve_query(&tids[0]);
    let picked = select_candidates(&registry, &info_hash, &limits(), Instant::now()).unwrap();
    assert_eq!(picked, vec![target]);
}

#[test]
fn test_select_skips_pending_get_peers_for_same_hash() {
    let mut registry = NodeRegistry::new();
    let target = addr(1, 6881);
    registry.insert_contact(NodeContact::new(id(1), target));
    let info_hash = id(0xAA);

    registry
        .get_mut(&target)
        .unwrap()
        .record_new_query(QueryKind::GetPeers, Some(info_hash));

    let picked = select_candidates(&registry, &info_hash, &limits(), Instant::now()).unwrap();
    assert!(picked.is_empty());

    let picked = select_candidates(&registry, &id(0xBB), &limits(), Instant::now()).unwrap();
    assert_eq!(picked, vec![target]);
}

#[test]
fn test_select_repeat_query_cooldown() {
    let mut registry = NodeRegistry::new();
    let target = addr(1, 6881);
    registry.insert_contact(NodeContact::new(id(1), target));
    let info_hash = id(0xAA);

    let node = registry.get_mut(&target).unwrap();
    let tid = node.record_new_query(QueryKind::GetPeers, Some(info_hash));
    node.resolve_query(&tid);

    let now = Instant::now();
    let picked = select_candidates(&registry, &info_hash, &limits(), now).unwrap();
    assert!(picked.is_empty());

    let later = now + limits().repeat_query_cooldown + Duration::from_secs(1);
    let picked = select_candidates(&registry, &info_hash, &limits(), later).unwrap();
    assert_eq!(picked, vec![target]);
}

#[test]
fn test_select_fan_out() {
    let mut registry = NodeRegistry::new();
    for i in 1..=20u8 {
        registry.insert_contact(NodeContact::new(id(i), addr(i, 6881)));
    }

    let picked = select_candidates(&registry, &id(0), &limits(), Instant::now()).unwrap();
    assert_eq!(picked.len(), 5);
}

// --- messages ---------------------------------------------------------------

#[test]
fn test_dht_message_ping() {
    let our_id = NodeId::generate();
    let tid = Bytes::from_static(b"aa");

    let parsed = DhtMessage::parse(&DhtMessage::ping(tid.clone(), &our_id).encode()).unwrap();
    assert_eq!(parsed.transaction_id, tid);
    assert_eq!(parsed.kind(), MessageKind::Query);
    assert_eq!(parsed.sender_id, Some(our_id));
    assert_eq!(parsed.body, MessageBody::Query(DhtQuery::Ping));
}

#[test]
fn test_dht_message_get_peers() {
    let our_id = NodeId::generate();
    let info_hash = NodeId([0xAB; 20]);
    let tid = Bytes::from_static(b"cc");

    let encoded = DhtMessage::get_peers(tid.clone(), &our_id, info_hash).encode();
    let parsed = DhtMessage::parse(&encoded).unwrap();

    match parsed.body {
        MessageBody::Query(DhtQuery::GetPeers { info_hash: h }) => assert_eq!(h, info_hash),
        other => panic!("wrong body: {:?}", other),
    }
}

#[test]
fn test_parse_response_with_values_and_nodes() {
    let contact = NodeContact::new(id(3), addr(3, 6881));
    let response = DhtResponse {
        id: id(1),
        token: Some(Bytes::from_static(b"tok")),
        values: Some(vec![addr(7, 1000), addr(8, 2000)]),
        nodes: Some(Bytes::copy_from_slice(&contact.to_compact().unwrap())),
    };

    let encoded = DhtMessage::response(Bytes::from_static(b"dd"), response.clone()).encode();
    let parsed = DhtMessage::parse(&encoded).unwrap();

    assert_eq!(parsed.kind(), MessageKind::Response);
    assert_eq!(parsed.sender_id, Some(id(1)));
    assert_eq!(parsed.body, MessageBody::Response(response));
}

#[test]
fn test_parse_other_query_and_error() {
    let data = b"d1:ad2:id20:abcdefghij0123456789e1:q9:find_node1:t2:aa1:y1:qe";
    let parsed = DhtMessage::parse(data).unwrap();
    assert_eq!(
        parsed.body,
        MessageBody::Query(DhtQuery::Other("find_node".into()))
    );

    let encoded = DhtMessage::error(Bytes::from_static(b"ee"), 203, "Protocol Error").encode();
    let parsed = DhtMessage::parse(&encoded).unwrap();
    assert_eq!(parsed.kind(), MessageKind::Error);
    assert_eq!(
        parsed.body,
        MessageBody::Error {
            code: 203,
            message: "Protocol Error".into()
        }
    );
}

#[test]
fn test_parse_invalid_messages() {
    assert!(matches!(
        DhtMessage::parse(b"not bencode"),
        Err(DhtError::Bencode(_))
    ));
    assert!(matches!(
        DhtMessage::parse(b"d1:t2:aa1:y1:xe"),
        Err(DhtError::InvalidMessage(_))
    ));
    assert!(DhtMessage::parse(b"d1:rd2:id3:abce1:t2:aa1:y1:re").is_err());
}

// --- engine -----------------------------------------------------------------

const WAIT: Duration = Duration::from_secs(5);

async fn test_engine(tune: impl FnOnce(DhtConfig) -> DhtConfig) -> (DhtEngine, DhtHandle, PeerResults) {
    let config = tune(DhtConfig::new(NodeId::generate(), 0).with_bootstrap_router(None));
    DhtEngine::bind(config).await.unwrap()
}

async fn remote() -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    (socket, addr)
}

fn pending_get_peers_tid(engine: &DhtEngine, node: &SocketAddr, info_hash: &InfoHash) -> Bytes {
    engine
        .registry()
        .get(node)
        .unwrap()
        .pending_queries()
        .find(|q| q.is_get_peers_for(info_hash))
        .map(|q| q.transaction_id.clone())
        .unwrap()
}

fn reply(from: SocketAddr, tid: Bytes, response: DhtResponse) -> InboundPacket {
    InboundPacket {
        payload: Bytes::from(DhtMessage::response(tid, response).encode()),
        from,
    }
}

fn peers_response(responder: NodeId, peers: Vec<SocketAddr>) -> DhtResponse {
    DhtResponse {
        values: Some(peers),
        token: Some(Bytes::from_static(b"tok")),
        ..DhtResponse::new(responder)
    }
}

fn nodes_response(responder: NodeId, contacts: &[NodeContact]) -> DhtResponse {
    let compact: Vec<u8> = contacts
        .iter()
        .filter_map(|c| c.to_compact())
        .flatten()
        .collect();
    DhtResponse {
        nodes: Some(Bytes::from(compact)),
        ..DhtResponse::new(responder)
    }
}

async fn recv_message(socket: &UdpSocket) -> DhtMessage {
    let mut buf = vec![0u8; 1500];
    let (n, _) = timeout(WAIT, socket.recv_from(&mut buf))
        .await
        .expect("no datagram")
        .unwrap();
    DhtMessage::parse(&buf[..n]).unwrap()
}

#[tokio::test]
async fn test_engine_no_known_nodes() {
    let (mut engine, handle, mut results) = test_engine(|c| c).await;

    engine.handle_peers_request(NodeId([b'A'; 20]));

    assert!(engine.registry().is_empty());
    assert_eq!(handle.stats().get_peers_sent, 0);
    assert!(matches!(results.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_engine_single_node_gets_one_query() {
    let (mut engine, handle, _results) = test_engine(|c| c).await;
    let (socket, remote_addr) = remote().await;
    let info_hash = id(0xAA);

    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    let ping = recv_message(&socket).await;
    assert_eq!(ping.body, MessageBody::Query(DhtQuery::Ping));

    engine.handle_peers_request(info_hash);
    let query = recv_message(&socket).await;
    assert_eq!(
        query.body,
        MessageBody::Query(DhtQuery::GetPeers { info_hash })
    );
    assert_eq!(query.sender_id, Some(*engine.our_id()));

    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);
    assert_eq!(query.transaction_id, tid);
    assert_ne!(query.transaction_id, ping.transaction_id);
    assert_eq!(handle.stats().get_peers_sent, 1);
    assert_eq!(handle.stats().pings_sent, 1);
}

#[tokio::test]
async fn test_engine_publishes_new_peers_once() {
    let (mut engine, handle, mut results) = test_engine(|c| c.with_result_capacity(4)).await;
    let (_socket, remote_addr) = remote().await;
    let info_hash = id(0xAA);
    let (p1, p2) = (addr(7, 1000), addr(8, 2000));

    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);

    let packet = reply(remote_addr, tid, peers_response(id(1), vec![p1, p2]));
    engine.handle_packet(packet.clone()).await;

    let batch = results.try_recv().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[&info_hash], vec![p1, p2]);
    assert_eq!(engine.known_peers(&info_hash), 2);

    engine.handle_packet(packet).await;
    assert!(matches!(results.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(handle.stats().stale_responses, 1);
    assert_eq!(handle.stats().peers_found, 2);
}

#[tokio::test]
async fn test_engine_dedups_peers_across_responses() {
    let (mut engine, _handle, mut results) = test_engine(|c| {
        c.with_result_capacity(4)
            .with_repeat_query_cooldown(Duration::ZERO)
    })
    .await;
    let (_socket, remote_addr) = remote().await;
    let info_hash = id(0xAA);
    let (p1, p2, p3) = (addr(7, 1000), addr(8, 2000), addr(9, 3000));

    engine.handle_hint(NodeContact::new(id(1), remote_addr));

    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);
    engine
        .handle_packet(reply(remote_addr, tid, peers_response(id(1), vec![p1, p2])))
        .await;
    assert!(results.try_recv().is_ok());

    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);
    engine
        .handle_packet(reply(remote_addr, tid, peers_response(id(1), vec![p2, p1])))
        .await;
    assert!(matches!(results.try_recv(), Err(TryRecvError::Empty)));

    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);
    engine
        .handle_packet(reply(remote_addr, tid, peers_response(id(1), vec![p1, p3, p3])))
        .await;
    let batch = results.try_recv().unwrap();
    assert_eq!(batch[&info_hash], vec![p3]);
}

#[tokio::test]
async fn test_engine_expands_on_new_node() {
    let (mut engine, handle, _results) = test_engine(|c| c).await;
    let (_socket, remote_addr) = remote().await;
    let (_other, other_addr) = remote().await;
    let info_hash = id(0xAA);

    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);

    let learned = NodeContact::new(id(2), other_addr);
    engine
        .handle_packet(reply(remote_addr, tid, nodes_response(id(1), &[learned])))
        .await;

    let node = engine.registry().get(&other_addr).unwrap();
    assert_eq!(node.id, Some(id(2)));
    assert!(node.has_pending_get_peers(&info_hash));
    assert_eq!(handle.stats().get_peers_sent, 2);
}

#[tokio::test]
async fn test_engine_expansion_budget() {
    let (mut engine, _handle, _results) = test_engine(|c| c.with_max_expansions(0)).await;
    let (_socket, remote_addr) = remote().await;
    let info_hash = id(0xAA);

    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);

    let learned = NodeContact::new(id(2), addr(2, 6881));
    engine
        .handle_packet(reply(remote_addr, tid, nodes_response(id(1), &[learned])))
        .await;

    let node = engine.registry().get(&learned.addr).unwrap();
    assert_eq!(node.pending_count(), 0);
}

#[tokio::test]
async fn test_engine_saves_nodes_when_enough_peers() {
    let (mut engine, _handle, mut results) = test_engine(|c| c.with_min_info_hash_peers(1)).await;
    let (_socket, remote_addr) = remote().await;
    let info_hash = id(0xAA);

    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);

    let learned = NodeContact::new(id(2), addr(2, 6881));
    let response = DhtResponse {
        values: Some(vec![addr(7, 1000)]),
        ..nodes_response(id(1), &[learned])
    };
    engine.handle_packet(reply(remote_addr, tid, response)).await;

    assert!(results.try_recv().is_ok());
    assert_eq!(engine.registry().get(&learned.addr).unwrap().pending_count(), 0);
}

#[tokio::test]
async fn test_engine_counts_duplicate_node_references() {
    let (mut engine, handle, _results) = test_engine(|c| c).await;
    let (_socket, remote_addr) = remote().await;
    let info_hash = id(0xAA);

    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);

    let myself = NodeContact::new(id(1), remote_addr);
    engine
        .handle_packet(reply(remote_addr, tid, nodes_response(id(1), &[myself])))
        .await;

    assert_eq!(engine.registry().len(), 1);
    assert_eq!(handle.stats().duplicate_nodes, 1);
}

#[tokio::test]
async fn test_engine_ignores_unknown_sender_and_garbage() {
    let (mut engine, handle, _results) = test_engine(|c| c).await;
    let stranger = addr(99, 6881);

    engine
        .handle_packet(reply(stranger, Bytes::from_static(b"aa"), DhtResponse::new(id(5))))
        .await;
    engine
        .handle_packet(InboundPacket {
            payload: Bytes::from_static(b"\x00garbage"),
            from: stranger,
        })
        .await;

    assert!(engine.registry().is_empty());
    assert_eq!(handle.stats().responses_matched, 0);
}

#[tokio::test]
async fn test_engine_error_reply_keeps_query_pending() {
    let (mut engine, _handle, _results) = test_engine(|c| c).await;
    let (_socket, remote_addr) = remote().await;
    let info_hash = id(0xAA);

    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);

    engine
        .handle_packet(InboundPacket {
            payload: Bytes::from(DhtMessage::error(tid, 202, "Server Error").encode()),
            from: remote_addr,
        })
        .await;

    let node = engine.registry().get(&remote_addr).unwrap();
    assert!(node.has_pending_get_peers(&info_hash));
    assert!(!node.reachable);
}

#[tokio::test]
async fn test_engine_survives_dropped_results() {
    let (mut engine, _handle, results) = test_engine(|c| c).await;
    let (_socket, remote_addr) = remote().await;
    let info_hash = id(0xAA);
    drop(results);

    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    engine.handle_peers_request(info_hash);
    let tid = pending_get_peers_tid(&engine, &remote_addr, &info_hash);
    engine
        .handle_packet(reply(remote_addr, tid, peers_response(id(1), vec![addr(7, 1000)])))
        .await;

    assert_eq!(engine.known_peers(&info_hash), 1);
}

#[tokio::test]
async fn test_handle_after_engine_dropped() {
    let (engine, handle, _results) = test_engine(|c| c).await;
    drop(engine);

    assert!(matches!(
        handle.request_peers(id(1)).await,
        Err(DhtError::EngineStopped)
    ));
    assert!(matches!(
        handle.add_node(id(1), addr(1, 6881)).await,
        Err(DhtError::EngineStopped)
    ));
}

#[tokio::test]
async fn test_try_recv_reports_disconnect() {
    let (engine, _handle, mut results) = test_engine(|c| c).await;

    assert!(matches!(results.try_recv(), Err(TryRecvError::Empty)));
    drop(engine);
    assert!(matches!(
        results.try_recv(),
        Err(TryRecvError::Disconnected)
    ));
}

#[tokio::test]
async fn test_bind_rejects_zero_capacity() {
    let mut config = DhtConfig::new(NodeId::generate(), 0).with_bootstrap_router(None);
    config.command_capacity = 0;
    assert!(matches!(
        DhtEngine::bind(config).await,
        Err(DhtError::InvalidConfig(_))
    ));

    let mut config = DhtConfig::new(NodeId::generate(), 0).with_bootstrap_router(None);
    config.result_capacity = 0;
    assert!(matches!(
        DhtEngine::bind(config).await,
        Err(DhtError::InvalidConfig(_))
    ));

    let config = DhtConfig::new(NodeId::generate(), 0)
        .with_bootstrap_router(None)
        .with_command_capacity(0)
        .with_result_capacity(0);
    assert_eq!(config.command_capacity, 1);
    assert!(DhtEngine::bind(config).await.is_ok());
}

#[tokio::test]
async fn test_engine_ignores_duplicate_hint() {
    let (mut engine, handle, _results) = test_engine(|c| c).await;
    let (_socket, remote_addr) = remote().await;

    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    engine.handle_hint(NodeContact::new(id(1), remote_addr));
    engine.handle_hint(NodeContact::new(id(2), remote_addr));

    assert_eq!(engine.registry().len(), 1);
    assert_eq!(handle.stats().pings_sent, 1);
    assert_eq!(handle.stats().nodes_created, 1);
    assert_eq!(engine.registry().get(&remote_addr).unwrap().pending_count(), 1);
}

#[test]
fn test_receive_errors_transient() {
    use std::io::{Error, ErrorKind};

    assert!(transport::is_transient(&Error::from(ErrorKind::ConnectionReset)));
    assert!(transport::is_transient(&Error::from(ErrorKind::ConnectionRefused)));
    assert!(!transport::is_transient(&Error::from(ErrorKind::NotConnected)));
    assert!(!transport::is_transient(&Error::from(ErrorKind::PermissionDenied)));
}

#[tokio::test]
async fn test_engine_run_bootstrap_and_discovery() {
    let (router, router_addr) = remote().await;
    let router_id = id(0x10);
    let info_hash = id(0xAA);
    let peer = addr(7, 1000);

    let config = DhtConfig::new(NodeId::generate(), 0)
        .with_bootstrap_router(Some(router_addr.to_string()));
    let (engine, handle, mut results) = DhtEngine::bind(config).await.unwrap();
    let engine_addr: SocketAddr = format!("127.0.0.1:{}", handle.local_addr().port())
        .parse()
        .unwrap();
    let task = tokio::spawn(engine.run());

    let ping = recv_message(&router).await;
    assert_eq!(ping.body, MessageBody::Query(DhtQuery::Ping));
    assert_eq!(ping.sender_id, Some(*handle.our_id()));
    let pong = DhtMessage::response(ping.transaction_id, DhtResponse::new(router_id)).encode();
    router.send_to(&pong, engine_addr).await.unwrap();

    handle.request_peers(info_hash).await.unwrap();
    let query = recv_message(&router).await;
    assert_eq!(
        query.body,
        MessageBody::Query(DhtQuery::GetPeers { info_hash })
    );
    let answer =
        DhtMessage::response(query.transaction_id, peers_response(router_id, vec![peer])).encode();
    router.send_to(&answer, engine_addr).await.unwrap();

    let batch = timeout(WAIT, results.recv()).await.unwrap().unwrap();
    assert_eq!(batch[&info_hash], vec![peer]);
    assert_eq!(handle.stats().responses_matched, 2);

    drop(handle);
    timeout(WAIT, task).await.unwrap().unwrap();
}
