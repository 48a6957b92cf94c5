//! Listener setup and the event loop.
//!
//! Single-threaded and cooperative: one thread owns the keyspace, every
//! connection, and every index, so nothing here takes a lock. The loop
//! parks only in `poll`; all socket I/O is non-blocking.
//!
//! Each iteration rebuilds the poll set (listener plus every connection,
//! armed by state), waits no longer than the nearest timer deadline, runs
//! the state machine for every ready connection, fires timers, and accepts
//! at most one new connection.

use std::net::SocketAddrV4;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::time::Instant;

use anyhow::Context;

use crate::config::{DEFAULT_POLL_TIMEOUT_MS, IDLE_TIMEOUT_MS};
use crate::conn::{Conn, ConnState};
use crate::idle::IdleList;
use crate::keyspace::Keyspace;
use crate::net;

pub struct Server {
    listener: OwnedFd,
    port: u16,
    started: Instant,
    keyspace: Keyspace,
    conns: Vec<Option<Conn>>,
    idle: IdleList,
    running: bool,
}

impl Server {
    /// Bind and listen on `addr`. Fails on socket, bind, or listen errors.
    pub fn bind(addr: SocketAddrV4) -> anyhow::Result<Self> {
        let listener = net::listen_on(addr).with_context(|| format!("listen on {addr}"))?;
        let port = net::local_port(listener.as_fd()).context("getsockname")?;
        Ok(Server {
            listener,
            port,
            started: Instant::now(),
            keyspace: Keyspace::new(),
            conns: Vec::new(),
            idle: IdleList::new(),
            running: true,
        })
    }

    /// Port actually bound, for callers that asked for port 0.
    pub fn local_port(&self) -> u16 {
        self.port
    }

    /// Run until a shutdown request. Poll failures are fatal.
    pub fn run(&mut self) -> anyhow::Result<()> {
        let mut poll_args: Vec<libc::pollfd> = Vec::new();
        while self.running {
            poll_args.clear();
            poll_args.push(libc::pollfd {
                fd: self.listener.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            });
            for conn in self.conns.iter().flatten() {
                poll_args.push(libc::pollfd {
                    fd: conn.fd(),
                    events: conn.poll_events(),
                    revents: 0,
                });
            }

            let timeout_ms = self.next_timer_ms();
            net::poll(&mut poll_args, timeout_ms).context("poll")?;

            for i in 1..poll_args.len() {
                let pfd = poll_args[i];
                if pfd.revents == 0 {
                    continue;
                }
                self.handle_ready(pfd.fd as usize);
            }

            self.process_timers();

            if poll_args[0].revents != 0 {
                self.accept_one();
            }
        }
        self.keyspace.shutdown();
        Ok(())
    }

    fn now_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    /// Refresh the connection's idle position, run its state machine, and
    /// reap it if it ended up closing.
    fn handle_ready(&mut self, fd: usize) {
        let now = self.now_us();
        let Some(conn) = self.conns.get_mut(fd).and_then(|c| c.as_mut()) else {
            return;
        };
        conn.idle_start_us = now;
        self.idle.detach(fd);
        self.idle.push_back(fd);

        if conn.on_io(&mut self.keyspace, now) {
            self.running = false;
        }
        if conn.state == ConnState::Closing {
            self.close_conn(fd);
        }
    }

    /// Time until the nearest idle or TTL deadline, for the poll timeout.
    fn next_timer_ms(&self) -> i32 {
        let now = self.now_us();
        let mut next: Option<u64> = None;
        if let Some(fd) = self.idle.front() {
            if let Some(conn) = self.conns.get(fd).and_then(|c| c.as_ref()) {
                next = Some(conn.idle_start_us + IDLE_TIMEOUT_MS * 1000);
            }
        }
        if let Some(d) = self.keyspace.next_deadline_us() {
            next = Some(next.map_or(d, |n| n.min(d)));
        }
        match next {
            None => DEFAULT_POLL_TIMEOUT_MS as i32,
            Some(deadline) if deadline > now => {
                (((deadline - now) / 1000).min(DEFAULT_POLL_TIMEOUT_MS)) as i32
            }
            Some(_) => 0,
        }
    }

    /// Close connections idle past the timeout, then collect due TTLs.
    fn process_timers(&mut self) {
        let now = self.now_us();
        while let Some(fd) = self.idle.front() {
            let deadline = self
                .conns
                .get(fd)
                .and_then(|c| c.as_ref())
                .map_or(0, |c| c.idle_start_us + IDLE_TIMEOUT_MS * 1000);
            if deadline > now {
                break;
            }
            displaylevel!(2, "removing idle connection: {}\n", fd);
            self.close_conn(fd);
        }
        self.keyspace.expire_pass(now);
    }

    fn close_conn(&mut self, fd: usize) {
        self.idle.detach(fd);
        if let Some(slot) = self.conns.get_mut(fd) {
            // Dropping the connection closes its descriptor.
            slot.take();
        }
    }

    fn accept_one(&mut self) {
        let fd = match net::accept(self.listener.as_fd()) {
            Err(err) => {
                displaylevel!(1, "accept() error: {}\n", err);
                return;
            }
            Ok(None) => return,
            Ok(Some(fd)) => fd,
        };
        let now = self.now_us();
        let conn = Conn::new(fd, now);
        let key = conn.fd() as usize;
        if self.conns.len() <= key {
            self.conns.resize_with(key + 1, || None);
        }
        displaylevel!(3, "accepted connection: {}\n", key);
        self.idle.push_back(key);
        self.conns[key] = Some(conn);
    }
}
