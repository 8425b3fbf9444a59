//! Node-to-node synchronization over real sockets

mod common;

use common::{
    assert_silent, fake_peer, mine_reward_block, new_chain, next_message, TEST_TARGET_BITS,
};
use stakecoin::{
    send_message, BlockPayload, BlockStore, Blockchain, Config, InvPayload, Message, OpType,
    Server, VersionPayload, NODE_VERSION,
};
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn config_for(node_addr: &str) -> Config {
    let config = Config::new();
    config.set_node_addr(node_addr);
    config.set_bootstrap_addr(node_addr);
    config
}

#[test]
fn test_inventory_is_fetched_one_block_at_a_time() {
    let (source, owner) = new_chain(BlockStore::temporary().unwrap());
    mine_reward_block(&source, &[&owner]);
    mine_reward_block(&source, &[&owner]);
    let hashes = source.get_block_hashes().unwrap();
    assert_eq!(hashes.len(), 3);

    let receiver =
        Blockchain::create_empty(BlockStore::temporary().unwrap(), TEST_TARGET_BITS).unwrap();
    let server = Server::new(receiver, &config_for("127.0.0.1:1")).unwrap();
    let (peer, peer_addr) = fake_peer();

    server
        .process_message(Message::Inv(InvPayload {
            addr_from: peer_addr.clone(),
            op_type: OpType::Block,
            items: hashes.clone(),
        }))
        .unwrap();

    for (position, expected) in hashes.iter().enumerate() {
        let requested = match next_message(&peer) {
            Message::GetData(payload) => {
                assert_eq!(payload.op_type, OpType::Block);
                payload.id
            }
            other => panic!("expected getdata, got {other:?}"),
        };
        assert_eq!(&requested, expected);
        // only one request is ever outstanding
        assert_silent(&peer);
        assert_eq!(server.get_blocks_in_transit().len(), hashes.len() - position - 1);

        let block = source.get_block(&requested).unwrap().unwrap();
        server
            .process_message(Message::Block(BlockPayload {
                addr_from: peer_addr.clone(),
                block: block.serialize().unwrap(),
            }))
            .unwrap();
    }
    assert_silent(&peer);

    let receiver = server.get_blockchain();
    assert_eq!(receiver.get_best_height().unwrap(), 3);
    assert_eq!(receiver.get_tip_hash(), source.get_tip_hash());
    assert_eq!(receiver.get_block_hashes().unwrap(), hashes);
}

#[test]
fn test_known_blocks_are_not_requested() {
    let (source, owner) = new_chain(BlockStore::temporary().unwrap());
    let genesis = source.get_tip_hash().unwrap();
    let block = mine_reward_block(&source, &[&owner]);

    let receiver =
        Blockchain::create_empty(BlockStore::temporary().unwrap(), TEST_TARGET_BITS).unwrap();
    receiver
        .add_block(&source.get_block(&genesis).unwrap().unwrap())
        .unwrap();
    let server = Server::new(receiver, &config_for("127.0.0.1:1")).unwrap();
    let (peer, peer_addr) = fake_peer();

    server
        .process_message(Message::Inv(InvPayload {
            addr_from: peer_addr,
            op_type: OpType::Block,
            items: source.get_block_hashes().unwrap(),
        }))
        .unwrap();
    match next_message(&peer) {
        Message::GetData(payload) => assert_eq!(payload.id, block.get_hash()),
        other => panic!("expected getdata, got {other:?}"),
    }
    assert!(server.get_blocks_in_transit().is_empty());
}

// Connections are served one at a time without timeouts, so a peer that never
// finishes its frame holds every later connection until it goes away.
#[test]
fn test_stalled_connection_holds_up_the_node() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let node_addr = listener.local_addr().unwrap().to_string();
    let (blockchain, _) = new_chain(BlockStore::temporary().unwrap());
    let server = Arc::new(Server::new(blockchain, &config_for(&node_addr)).unwrap());
    let (peer, peer_addr) = fake_peer();

    let mut stalled = TcpStream::connect(&node_addr).unwrap();
    stalled.write_all(b"vers").unwrap();
    send_message(
        &node_addr,
        &Message::Version(VersionPayload {
            version: NODE_VERSION,
            best_height: 0,
            addr_from: peer_addr,
        }),
    )
    .unwrap();

    let worker = {
        let server = Arc::clone(&server);
        thread::spawn(move || {
            server.serve_one(&listener).unwrap();
            server.serve_one(&listener).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(300));
    assert_silent(&peer);

    drop(stalled);
    worker.join().unwrap();
    match next_message(&peer) {
        Message::Version(payload) => assert_eq!(payload.best_height, 1),
        other => panic!("expected version, got {other:?}"),
    }
}
