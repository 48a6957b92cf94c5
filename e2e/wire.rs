// e2e/wire.rs — wire-level tests against a live server.
//
// Each test binds its own server on an ephemeral loopback port and talks to
// it over real sockets, covering the end-to-end command scenarios, response
// encodings, pipelining order, and protocol-fatal handling.

use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::thread::JoinHandle;

use minkv::protocol::{encode_request, Response, HEADER_LEN};
use minkv::{Client, Server};

fn start_server() -> (SocketAddrV4, JoinHandle<anyhow::Result<()>>) {
    let mut server =
        Server::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0)).expect("bind ephemeral port");
    let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, server.local_port());
    let handle = std::thread::spawn(move || server.run());
    (addr, handle)
}

fn connect(addr: SocketAddrV4) -> Client {
    Client::connect(addr).expect("connect")
}

/// Expected payload bytes for a response, built with the same serializer the
/// server uses.
fn expect(build: impl FnOnce(&mut Response)) -> Vec<u8> {
    let mut out = Response::new();
    build(&mut out);
    out.as_bytes().to_vec()
}

fn shutdown(client: &mut Client, handle: JoinHandle<anyhow::Result<()>>) {
    let reply = client.query(&[b"shutdown"]).expect("shutdown reply");
    assert_eq!(reply, expect(|out| out.str_bytes(b"Server is shutting down...")));
    handle
        .join()
        .expect("server thread")
        .expect("clean server exit");
}

// ─────────────────────────────────────────────────────────────────────────────
// End-to-end command scenarios
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn set_then_get_returns_value() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);

    let reply = client.query(&[b"SET", b"k", b"hello"]).unwrap();
    assert_eq!(reply, expect(|out| out.nil()));

    let reply = client.query(&[b"GET", b"k"]).unwrap();
    assert_eq!(reply, expect(|out| out.str_bytes(b"hello")));

    shutdown(&mut client, handle);
}

#[test]
fn get_missing_returns_nil() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);
    let reply = client.query(&[b"GET", b"missing"]).unwrap();
    assert_eq!(reply, expect(|out| out.nil()));
    shutdown(&mut client, handle);
}

#[test]
fn del_removes_and_reports() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);

    assert_eq!(
        client.query(&[b"SET", b"k", b"x"]).unwrap(),
        expect(|out| out.nil())
    );
    assert_eq!(
        client.query(&[b"DEL", b"k"]).unwrap(),
        expect(|out| out.int(1))
    );
    assert_eq!(
        client.query(&[b"GET", b"k"]).unwrap(),
        expect(|out| out.nil())
    );
    assert_eq!(
        client.query(&[b"DEL", b"k"]).unwrap(),
        expect(|out| out.int(0))
    );

    shutdown(&mut client, handle);
}

#[test]
fn zadd_then_zquery_pages_members() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);

    assert_eq!(
        client.query(&[b"ZADD", b"z", b"1.5", b"alpha"]).unwrap(),
        expect(|out| out.int(1))
    );
    assert_eq!(
        client.query(&[b"ZADD", b"z", b"2.5", b"beta"]).unwrap(),
        expect(|out| out.int(1))
    );

    let reply = client
        .query(&[b"ZQUERY", b"z", b"0", b"", b"0", b"10"])
        .unwrap();
    assert_eq!(
        reply,
        expect(|out| {
            out.arr(4);
            out.str_bytes(b"alpha");
            out.dbl(1.5);
            out.str_bytes(b"beta");
            out.dbl(2.5);
        })
    );

    shutdown(&mut client, handle);
}

#[test]
fn exists_collapses_duplicate_keys() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);

    client.query(&[b"SET", b"a", b"1"]).unwrap();
    let reply = client.query(&[b"EXISTS", b"a", b"a", b"b"]).unwrap();
    assert_eq!(reply, expect(|out| out.int(1)));

    shutdown(&mut client, handle);
}

#[test]
fn zscore_and_zrem_flow() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);

    client.query(&[b"ZADD", b"z", b"3.25", b"m"]).unwrap();
    assert_eq!(
        client.query(&[b"ZSCORE", b"z", b"m"]).unwrap(),
        expect(|out| out.dbl(3.25))
    );
    assert_eq!(
        client.query(&[b"ZSCORE", b"z", b"other"]).unwrap(),
        expect(|out| out.nil())
    );
    assert_eq!(
        client.query(&[b"ZREM", b"z", b"m"]).unwrap(),
        expect(|out| out.int(1))
    );
    assert_eq!(
        client.query(&[b"ZREM", b"z", b"m"]).unwrap(),
        expect(|out| out.int(0))
    );
    // A zset command against a missing key answers nil.
    assert_eq!(
        client.query(&[b"ZREM", b"nosuch", b"m"]).unwrap(),
        expect(|out| out.nil())
    );

    shutdown(&mut client, handle);
}

#[test]
fn keys_lists_the_whole_store() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);

    client.query(&[b"SET", b"one", b"1"]).unwrap();
    client.query(&[b"SET", b"two", b"2"]).unwrap();
    let reply = client.query(&[b"KEYS"]).unwrap();
    // Enumeration order is not specified; check shape and membership.
    assert_eq!(reply[0], 5);
    let mut found = Vec::new();
    let mut pos = 5;
    while pos < reply.len() {
        assert_eq!(reply[pos], 2);
        let len = u32::from_le_bytes(reply[pos + 1..pos + 5].try_into().unwrap()) as usize;
        found.push(reply[pos + 5..pos + 5 + len].to_vec());
        pos += 5 + len;
    }
    found.sort();
    assert_eq!(found, vec![b"one".to_vec(), b"two".to_vec()]);

    shutdown(&mut client, handle);
}

#[test]
fn command_help_is_a_string() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);

    let reply = client.query(&[b"COMMAND"]).unwrap();
    assert_eq!(reply[0], 2);
    let text = String::from_utf8_lossy(&reply[5..]).into_owned();
    assert!(text.contains("zquery"));

    let reply = client.query(&[b"COMMAND", b"LIST"]).unwrap();
    let text = String::from_utf8_lossy(&reply[5..]).into_owned();
    assert!(text.contains("13. shutdown"));

    shutdown(&mut client, handle);
}

#[test]
fn unknown_command_is_reported_not_fatal() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);

    let reply = client.query(&[b"frobnicate"]).unwrap();
    assert_eq!(reply, expect(|out| out.err(1, "Unknown cmd")));

    // The connection is still usable.
    assert_eq!(
        client.query(&[b"SET", b"k", b"v"]).unwrap(),
        expect(|out| out.nil())
    );

    shutdown(&mut client, handle);
}

// ─────────────────────────────────────────────────────────────────────────────
// Pipelining
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn pipelined_requests_answer_in_order() {
    let (addr, handle) = start_server();

    // Hand-roll the frames so all of them leave in a single write call.
    let mut batch = Vec::new();
    let mut requests: Vec<Vec<&[u8]>> = vec![vec![b"SET", b"p", b"0"]];
    for _ in 0..9 {
        requests.push(vec![b"GET", b"p"]);
    }
    for args in &requests {
        let payload = encode_request(args);
        batch.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        batch.extend_from_slice(&payload);
    }

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(&batch).unwrap();

    let mut replies = Vec::new();
    for _ in 0..requests.len() {
        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).unwrap();
        let len = u32::from_le_bytes(header) as usize;
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).unwrap();
        replies.push(payload);
    }

    assert_eq!(replies[0], expect(|out| out.nil()));
    for reply in &replies[1..] {
        assert_eq!(*reply, expect(|out| out.str_bytes(b"0")));
    }

    let mut client = connect(addr);
    shutdown(&mut client, handle);
}

// ─────────────────────────────────────────────────────────────────────────────
// Limits and protocol-fatal errors
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn oversized_response_is_replaced_with_an_error() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);

    // Enough keys that enumerating them overflows one message.
    for n in 0..150 {
        let key = format!("a-rather-long-key-name-padding-{n:04}");
        client.query(&[b"SET", key.as_bytes(), b"v"]).unwrap();
    }
    let reply = client.query(&[b"KEYS"]).unwrap();
    assert_eq!(reply, expect(|out| out.err(2, "response is too big")));

    shutdown(&mut client, handle);
}

#[test]
fn oversized_frame_closes_the_connection() {
    let (addr, handle) = start_server();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.write_all(&8_000u32.to_le_bytes()).unwrap();
    stream.write_all(&[0u8; 64]).unwrap();

    // The server drops the connection without replying.
    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "expected EOF after an oversized frame");

    let mut client = connect(addr);
    shutdown(&mut client, handle);
}

#[test]
fn trailing_garbage_closes_the_connection() {
    let (addr, handle) = start_server();

    let mut payload = encode_request(&[b"GET", b"k"]);
    payload.push(0xaa);
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .write_all(&(payload.len() as u32).to_le_bytes())
        .unwrap();
    stream.write_all(&payload).unwrap();

    let mut buf = [0u8; 16];
    let n = stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "expected EOF after a malformed request");

    let mut client = connect(addr);
    shutdown(&mut client, handle);
}

// ─────────────────────────────────────────────────────────────────────────────
// Shutdown
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn shutdown_answers_then_stops() {
    let (addr, handle) = start_server();
    let mut client = connect(addr);
    client.query(&[b"SET", b"k", b"v"]).unwrap();
    shutdown(&mut client, handle);

    // The listener is gone afterwards. A connect may still win a race on
    // some stacks, but nothing will ever answer.
    if let Ok(mut stream) = TcpStream::connect(addr) {
        let mut buf = [0u8; 1];
        let outcome = stream.read(&mut buf);
        assert!(matches!(outcome, Ok(0) | Err(_)), "server must be gone");
    }
}
