// e2e/timers.rs — TTL expiry and idle-connection eviction against a live
// server.
//
// These tests sleep through real deadlines, so the file stays small; the
// slowest test waits out the 5-second idle timeout.

use std::io::Read;
use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

use minkv::protocol::Response;
use minkv::{Client, Server};

fn start_server() -> (SocketAddrV4, JoinHandle<anyhow::Result<()>>) {
    let mut server =
        Server::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, server.local_port());
    let handle = std::thread::spawn(move || server.run());
    (addr, handle)
}

fn expect(build: impl FnOnce(&mut Response)) -> Vec<u8> {
    let mut out = Response::new();
    build(&mut out);
    out.as_bytes().to_vec()
}

fn int_reply(payload: &[u8]) -> i64 {
    assert_eq!(payload[0], 3, "expected an int reply");
    i64::from_le_bytes(payload[1..9].try_into().unwrap())
}

fn shutdown(client: &mut Client, handle: JoinHandle<anyhow::Result<()>>) {
    client.query(&[b"shutdown"]).expect("shutdown reply");
    handle.join().expect("server thread").expect("clean exit");
}

// ─────────────────────────────────────────────────────────────────────────────
// TTL
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn expired_key_disappears() {
    let (addr, handle) = start_server();
    let mut client = Client::connect(addr).unwrap();

    client.query(&[b"SET", b"k", b"v"]).unwrap();
    let reply = client.query(&[b"EXPIRE", b"k", b"100"]).unwrap();
    assert_eq!(reply, expect(|out| out.int(1)));

    let remaining = int_reply(&client.query(&[b"PTTL", b"k"]).unwrap());
    assert!((0..=100).contains(&remaining), "pttl {remaining} out of range");

    std::thread::sleep(Duration::from_millis(200));
    let reply = client.query(&[b"GET", b"k"]).unwrap();
    assert_eq!(reply, expect(|out| out.nil()));
    let gone = int_reply(&client.query(&[b"PTTL", b"k"]).unwrap());
    assert_eq!(gone, -2);

    shutdown(&mut client, handle);
}

#[test]
fn pttl_reports_missing_and_timerless_keys() {
    let (addr, handle) = start_server();
    let mut client = Client::connect(addr).unwrap();

    assert_eq!(int_reply(&client.query(&[b"PTTL", b"nope"]).unwrap()), -2);
    client.query(&[b"SET", b"k", b"v"]).unwrap();
    assert_eq!(int_reply(&client.query(&[b"PTTL", b"k"]).unwrap()), -1);

    shutdown(&mut client, handle);
}

#[test]
fn negative_ttl_clears_the_timer() {
    let (addr, handle) = start_server();
    let mut client = Client::connect(addr).unwrap();

    client.query(&[b"SET", b"k", b"v"]).unwrap();
    client.query(&[b"EXPIRE", b"k", b"150"]).unwrap();
    assert_eq!(int_reply(&client.query(&[b"EXPIRE", b"k", b"-1"]).unwrap()), 1);
    assert_eq!(int_reply(&client.query(&[b"PTTL", b"k"]).unwrap()), -1);

    // The key survives its original deadline.
    std::thread::sleep(Duration::from_millis(250));
    let reply = client.query(&[b"GET", b"k"]).unwrap();
    assert_eq!(reply, expect(|out| out.str_bytes(b"v")));

    shutdown(&mut client, handle);
}

#[test]
fn expire_on_missing_key_reports_zero() {
    let (addr, handle) = start_server();
    let mut client = Client::connect(addr).unwrap();
    assert_eq!(
        int_reply(&client.query(&[b"EXPIRE", b"ghost", b"100"]).unwrap()),
        0
    );
    shutdown(&mut client, handle);
}

#[test]
fn rearming_a_ttl_moves_the_deadline() {
    let (addr, handle) = start_server();
    let mut client = Client::connect(addr).unwrap();

    client.query(&[b"SET", b"k", b"v"]).unwrap();
    client.query(&[b"EXPIRE", b"k", b"10000"]).unwrap();
    client.query(&[b"EXPIRE", b"k", b"50"]).unwrap();
    std::thread::sleep(Duration::from_millis(150));
    let reply = client.query(&[b"GET", b"k"]).unwrap();
    assert_eq!(reply, expect(|out| out.nil()));

    shutdown(&mut client, handle);
}

// ─────────────────────────────────────────────────────────────────────────────
// Idle eviction
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn silent_connection_is_evicted() {
    let (addr, handle) = start_server();

    let mut idle = TcpStream::connect(addr).unwrap();
    idle.set_read_timeout(Some(Duration::from_secs(8))).unwrap();

    // Say nothing; the server closes us a little after the idle timeout.
    let mut buf = [0u8; 8];
    let n = idle.read(&mut buf).expect("eviction shows up as EOF");
    assert_eq!(n, 0, "server should close an idle connection");

    // An active client on a fresh connection is unaffected.
    let mut client = Client::connect(addr).unwrap();
    client.query(&[b"SET", b"k", b"v"]).unwrap();
    shutdown(&mut client, handle);
}
