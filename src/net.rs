//! Thin safe wrappers over the libc socket and poll surface.
//!
//! Everything unsafe lives here. The wrappers translate errno into
//! `std::io::Error`, retry `EINTR` in place, and surface `EAGAIN` as a
//! would-block outcome so the event loop can park the descriptor.

use std::io;
use std::net::SocketAddrV4;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

/// Outcome of a non-blocking read.
pub enum ReadOutcome {
    /// `n` bytes were read.
    Data(usize),
    /// The peer closed its end.
    Eof,
    /// Nothing buffered; try again after the next poll.
    WouldBlock,
}

/// Outcome of a non-blocking write.
pub enum WriteOutcome {
    /// `n` bytes were accepted by the kernel.
    Wrote(usize),
    /// The send buffer is full; try again after the next poll.
    WouldBlock,
}

fn last_error() -> io::Error {
    io::Error::last_os_error()
}

/// Put a descriptor into non-blocking mode.
pub fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(last_error());
    }
    let rv = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rv < 0 {
        return Err(last_error());
    }
    Ok(())
}

/// Create a non-blocking TCP listener on `addr` with `SO_REUSEADDR` set and
/// the system's maximum listen backlog.
pub fn listen_on(addr: SocketAddrV4) -> io::Result<OwnedFd> {
    let raw = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM, 0) };
    if raw < 0 {
        return Err(last_error());
    }
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let one: libc::c_int = 1;
    let rv = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rv < 0 {
        return Err(last_error());
    }

    let sockaddr = sockaddr_from(addr);
    let rv = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &sockaddr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rv < 0 {
        return Err(last_error());
    }

    let rv = unsafe { libc::listen(fd.as_raw_fd(), libc::SOMAXCONN) };
    if rv < 0 {
        return Err(last_error());
    }

    set_nonblocking(fd.as_raw_fd())?;
    Ok(fd)
}

/// Port a bound socket actually landed on (meaningful after binding port 0).
pub fn local_port(fd: BorrowedFd<'_>) -> io::Result<u16> {
    let mut sockaddr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let rv = unsafe {
        libc::getsockname(
            fd.as_raw_fd(),
            &mut sockaddr as *mut _ as *mut libc::sockaddr,
            &mut len,
        )
    };
    if rv < 0 {
        return Err(last_error());
    }
    Ok(u16::from_be(sockaddr.sin_port))
}

/// Accept one pending connection, already switched to non-blocking mode.
/// Returns `None` when the accept queue is empty.
pub fn accept(fd: BorrowedFd<'_>) -> io::Result<Option<OwnedFd>> {
    loop {
        let raw = unsafe { libc::accept(fd.as_raw_fd(), std::ptr::null_mut(), std::ptr::null_mut()) };
        if raw >= 0 {
            let conn = unsafe { OwnedFd::from_raw_fd(raw) };
            set_nonblocking(conn.as_raw_fd())?;
            return Ok(Some(conn));
        }
        match last_error() {
            e if e.kind() == io::ErrorKind::Interrupted => continue,
            e if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            e => return Err(e),
        }
    }
}

/// Read into `buf`, retrying `EINTR`.
pub fn read_nb(fd: BorrowedFd<'_>, buf: &mut [u8]) -> io::Result<ReadOutcome> {
    loop {
        let rv = unsafe {
            libc::read(
                fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if rv > 0 {
            return Ok(ReadOutcome::Data(rv as usize));
        }
        if rv == 0 {
            return Ok(ReadOutcome::Eof);
        }
        match last_error() {
            e if e.kind() == io::ErrorKind::Interrupted => continue,
            e if e.kind() == io::ErrorKind::WouldBlock => return Ok(ReadOutcome::WouldBlock),
            e => return Err(e),
        }
    }
}

/// Write from `buf`, retrying `EINTR`.
pub fn write_nb(fd: BorrowedFd<'_>, buf: &[u8]) -> io::Result<WriteOutcome> {
    loop {
        let rv = unsafe {
            libc::write(
                fd.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
            )
        };
        if rv >= 0 {
            return Ok(WriteOutcome::Wrote(rv as usize));
        }
        match last_error() {
            e if e.kind() == io::ErrorKind::Interrupted => continue,
            e if e.kind() == io::ErrorKind::WouldBlock => return Ok(WriteOutcome::WouldBlock),
            e => return Err(e),
        }
    }
}

/// Wait for readiness on `fds`, retrying `EINTR` with the same timeout.
pub fn poll(fds: &mut [libc::pollfd], timeout_ms: i32) -> io::Result<usize> {
    loop {
        let rv = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rv >= 0 {
            return Ok(rv as usize);
        }
        match last_error() {
            e if e.kind() == io::ErrorKind::Interrupted => continue,
            e => return Err(e),
        }
    }
}

fn sockaddr_from(addr: SocketAddrV4) -> libc::sockaddr_in {
    let mut sockaddr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    sockaddr.sin_family = libc::AF_INET as libc::sa_family_t;
    sockaddr.sin_port = addr.port().to_be();
    sockaddr.sin_addr = libc::in_addr {
        s_addr: u32::from(*addr.ip()).to_be(),
    };
    sockaddr
}
