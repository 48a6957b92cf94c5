//! Server binary. No flags, no environment, no configuration file: it
//! binds 0.0.0.0 on the fixed port and runs until a shutdown request.
//!
//! Exit codes: 0 after a clean shutdown, 1 when the socket cannot be set up.

use std::net::{Ipv4Addr, SocketAddrV4};

use minkv::config::DEFAULT_PORT;
use minkv::Server;
use minkv::{display, displaylevel};

fn main() {
    if let Err(err) = run() {
        display!("minkv-server: {err:#}\n");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT);
    let mut server = Server::bind(addr)?;
    displaylevel!(2, "listening on 0.0.0.0:{}\n", server.local_port());
    server.run()
}
