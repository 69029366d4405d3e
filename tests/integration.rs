//! Integration tests for etherbone-server.
//!
//! These tests run a server on a loopback UDP socket and talk to it the way
//! an EtherBone host does.

use std::net::SocketAddr;
use std::time::Duration;

use etherbone_server::protocol::{build_probe, build_request, Header, RecordHeader};
use etherbone_server::{Config, ErrorPolicy, EtherboneError, RamRegion, Server};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const TIMEOUT: Duration = Duration::from_secs(5);

fn test_config(policy: ErrorPolicy) -> Config {
    Config {
        mem_base: 0,
        mem_size: 4096,
        udp_port: 0,
        buffer_size: 2048,
        policy,
    }
}

/// Start a server over a zeroed 4 KiB region.
async fn start(policy: ErrorPolicy) -> (SocketAddr, JoinHandle<EtherboneError>) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut server = Server::from_socket(socket, test_config(policy), RamRegion::new(4096)).unwrap();
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(async move { server.run().await });
    (addr, handle)
}

async fn client() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.unwrap()
}

async fn exchange(client: &UdpSocket, addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    client.send_to(request, addr).await.unwrap();
    let mut buf = vec![0u8; 2048];
    let (len, _) = tokio::time::timeout(TIMEOUT, client.recv_from(&mut buf))
        .await
        .expect("no reply")
        .unwrap();
    buf.truncate(len);
    buf
}

/// Test probe discovery.
#[tokio::test]
async fn test_probe_reply() {
    let (addr, _server) = start(ErrorPolicy::Abort).await;
    let client = client().await;

    let reply = exchange(&client, addr, &build_probe()).await;

    assert_eq!(reply.len(), 8);
    let header = Header::decode(&reply).unwrap();
    assert!(header.is_probe_reply());
    assert!(header.is_no_reply());
    assert!(!header.is_probe());
    assert!(header.validate().is_ok());
}

/// Test that burst writes land on consecutive words and read back.
#[tokio::test]
async fn test_burst_write_then_read_back() {
    let (addr, _server) = start(ErrorPolicy::Abort).await;
    let client = client().await;

    let values: Vec<u32> = (0..64).map(|i| 0xA5A5_0000 | i).collect();
    let write = build_request((0x200, &values), (0, &[])).unwrap();
    client.send_to(&write, addr).await.unwrap();

    let addresses: Vec<u32> = (0..64).map(|i| 0x200 + 4 * i).rev().collect();
    let read = build_request((0, &[]), (0x1234_5678, &addresses)).unwrap();
    let reply = exchange(&client, addr, &read).await;

    assert_eq!(reply.len(), 16 + 64 * 4);
    let record = RecordHeader::decode(&reply[8..]).unwrap();
    assert_eq!(record.wcount, 64);
    assert_eq!(record.rcount, 0);
    assert_eq!(&reply[12..16], &[0x12, 0x34, 0x56, 0x78]);

    for (i, chunk) in reply[16..].chunks(4).enumerate() {
        let word = u32::from_be_bytes(chunk.try_into().unwrap());
        assert_eq!(word, values[63 - i]);
    }
}

/// Test that a write-only request gets no reply but a later read sees it.
#[tokio::test]
async fn test_write_gets_no_reply() {
    let (addr, _server) = start(ErrorPolicy::Abort).await;
    let client = client().await;

    let write = build_request((0x10, &[0xDEADBEEF]), (0, &[])).unwrap();
    client.send_to(&write, addr).await.unwrap();

    let mut buf = [0u8; 64];
    let nothing = tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
    assert!(nothing.is_err(), "write-only request must not be answered");

    let reply = exchange(&client, addr, &build_request((0, &[]), (0, &[0x10])).unwrap()).await;
    assert_eq!(reply.len(), 20);
    assert_eq!(&reply[16..20], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

/// Test that padding around the packet is tolerated.
#[tokio::test]
async fn test_padded_datagram() {
    let (addr, _server) = start(ErrorPolicy::Abort).await;
    let client = client().await;

    let mut datagram = vec![0u8; 6];
    datagram.extend_from_slice(&build_probe());
    datagram.extend_from_slice(&[0xEE; 10]);

    let reply = exchange(&client, addr, &datagram).await;
    assert_eq!(&reply, &[0x4E, 0x6F, 0x16, 0x44, 0, 0, 0, 0]);
}

/// Test the continue policy: a bad datagram is dropped and serving goes on.
#[tokio::test]
async fn test_continue_policy_keeps_serving() {
    let (addr, server) = start(ErrorPolicy::Continue).await;
    let client = client().await;

    client.send_to(b"garbage", addr).await.unwrap();

    let mut wrong_version = build_probe();
    wrong_version[2] = 0x21;
    client.send_to(&wrong_version, addr).await.unwrap();

    let out_of_range = build_request((0, &[]), (0, &[0x1_0000])).unwrap();
    client.send_to(&out_of_range, addr).await.unwrap();

    let reply = exchange(&client, addr, &build_probe()).await;
    assert_eq!(reply.len(), 8);
    assert!(!server.is_finished());
}

/// Test the abort policy: a bad datagram ends the loop with its error.
#[tokio::test]
async fn test_abort_policy_terminates() {
    let (addr, server) = start(ErrorPolicy::Abort).await;
    let client = client().await;

    let mut wrong_port_size = build_probe();
    wrong_port_size[3] = 0x48;
    client.send_to(&wrong_port_size, addr).await.unwrap();

    let err = tokio::time::timeout(TIMEOUT, server).await.unwrap().unwrap();
    assert!(matches!(err, EtherboneError::UnsupportedPortSize(8)));
    assert!(!err.is_fatal());
}
