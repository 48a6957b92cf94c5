//! Per-connection state machine.
//!
//! A connection is either reading requests, draining a response, or closing.
//! Reading pulls bytes until the socket would block, then consumes every
//! complete frame already buffered (pipelining) one request at a time: each
//! dispatch serializes its response, the response is drained as far as the
//! socket allows, and only a fully drained connection goes back to
//! consuming buffered requests. Responses therefore leave in request order.
//!
//! Buffers are fixed at one maximum message plus its frame header; a request
//! that cannot fit is a protocol error and closes the connection.

use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

use crate::commands::{self, Action};
use crate::config::MAX_MSG;
use crate::keyspace::Keyspace;
use crate::net::{self, ReadOutcome, WriteOutcome};
use crate::protocol::{self, Response, HEADER_LEN};

const BUF_LEN: usize = HEADER_LEN + MAX_MSG;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ConnState {
    Reading,
    Writing,
    Closing,
}

pub struct Conn {
    fd: OwnedFd,
    pub state: ConnState,
    pub idle_start_us: u64,
    rbuf: Box<[u8]>,
    rlen: usize,
    wbuf: Box<[u8]>,
    wlen: usize,
    wsent: usize,
}

impl Conn {
    pub fn new(fd: OwnedFd, now_us: u64) -> Self {
        Conn {
            fd,
            state: ConnState::Reading,
            idle_start_us: now_us,
            rbuf: vec![0u8; BUF_LEN].into_boxed_slice(),
            rlen: 0,
            wbuf: vec![0u8; BUF_LEN].into_boxed_slice(),
            wlen: 0,
            wsent: 0,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Poll interest for the current state.
    pub fn poll_events(&self) -> i16 {
        let wanted = match self.state {
            ConnState::Reading => libc::POLLIN,
            ConnState::Writing => libc::POLLOUT,
            ConnState::Closing => 0,
        };
        wanted | libc::POLLERR
    }

    /// Advance the state machine after a readiness event. Returns true when
    /// a request asked the server to shut down.
    pub fn on_io(&mut self, ks: &mut Keyspace, now_us: u64) -> bool {
        let mut shutdown = false;
        match self.state {
            ConnState::Reading => while self.fill(ks, now_us, &mut shutdown) {},
            ConnState::Writing => {
                self.flush();
                // A finished drain unblocks any requests that piled up in
                // the read buffer while the response was stuck.
                if self.state == ConnState::Reading {
                    while self.try_one_request(ks, now_us, &mut shutdown) {}
                }
            }
            ConnState::Closing => {}
        }
        shutdown
    }

    /// One read into the buffer, then as many buffered requests as the
    /// socket lets us answer. Returns true while more reading makes sense.
    fn fill(&mut self, ks: &mut Keyspace, now_us: u64, shutdown: &mut bool) -> bool {
        debug_assert!(self.rlen < self.rbuf.len());
        match net::read_nb(self.fd.as_fd(), &mut self.rbuf[self.rlen..]) {
            Err(err) => {
                displaylevel!(1, "read() error on fd {}: {}\n", self.fd(), err);
                self.state = ConnState::Closing;
                false
            }
            Ok(ReadOutcome::WouldBlock) => false,
            Ok(ReadOutcome::Eof) => {
                if self.rlen > 0 {
                    displaylevel!(1, "unexpected EOF on fd {}\n", self.fd());
                } else {
                    displaylevel!(3, "EOF on fd {}\n", self.fd());
                }
                self.state = ConnState::Closing;
                false
            }
            Ok(ReadOutcome::Data(n)) => {
                self.rlen += n;
                debug_assert!(self.rlen <= self.rbuf.len());
                while self.try_one_request(ks, now_us, shutdown) {}
                self.state == ConnState::Reading
            }
        }
    }

    /// Consume one complete frame, if buffered: dispatch it, serialize the
    /// response, and start draining. Returns true when the connection is
    /// ready to consume another buffered frame.
    fn try_one_request(&mut self, ks: &mut Keyspace, now_us: u64, shutdown: &mut bool) -> bool {
        let payload_len = match protocol::frame_len(&self.rbuf[..self.rlen]) {
            Err(err) => {
                displaylevel!(1, "fd {}: {}\n", self.fd(), err);
                self.state = ConnState::Closing;
                return false;
            }
            Ok(None) => return false,
            Ok(Some(len)) => len,
        };

        let cmd = match protocol::parse_request(&self.rbuf[HEADER_LEN..HEADER_LEN + payload_len]) {
            Err(err) => {
                displaylevel!(1, "fd {}: {}\n", self.fd(), err);
                self.state = ConnState::Closing;
                return false;
            }
            Ok(cmd) => cmd,
        };

        let mut out = Response::new();
        if commands::dispatch(&cmd, ks, now_us, &mut out) == Action::Shutdown {
            *shutdown = true;
        }
        out.enforce_size_limit();

        let payload = out.as_bytes();
        protocol::write_le32(&mut self.wbuf, 0, payload.len() as u32);
        self.wbuf[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);
        self.wlen = HEADER_LEN + payload.len();
        self.wsent = 0;

        // Shift the consumed frame out of the read buffer.
        let consumed = HEADER_LEN + payload_len;
        self.rbuf.copy_within(consumed..self.rlen, 0);
        self.rlen -= consumed;

        self.state = ConnState::Writing;
        self.flush();
        self.state == ConnState::Reading
    }

    /// Drain the write buffer as far as the socket allows. A full drain
    /// resets the buffer and returns the connection to reading.
    fn flush(&mut self) {
        loop {
            if self.wsent == self.wlen {
                self.wlen = 0;
                self.wsent = 0;
                self.state = ConnState::Reading;
                return;
            }
            match net::write_nb(self.fd.as_fd(), &self.wbuf[self.wsent..self.wlen]) {
                Err(err) => {
                    displaylevel!(1, "write() error on fd {}: {}\n", self.fd(), err);
                    self.state = ConnState::Closing;
                    return;
                }
                Ok(WriteOutcome::WouldBlock) => return,
                Ok(WriteOutcome::Wrote(n)) => {
                    self.wsent += n;
                    debug_assert!(self.wsent <= self.wlen);
                }
            }
        }
    }
}
