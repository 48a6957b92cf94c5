// e2e/binaries.rs — black-box tests of the compiled binaries.
//
// The server binary takes no arguments and always binds port 1234, so every
// test here serializes on one lock and cleans its server up before
// releasing it.

use std::net::TcpStream;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::time::{Duration, Instant};

static PORT_1234: Mutex<()> = Mutex::new(());

fn server_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_minkv-server"))
}

fn cli_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_minkv-cli"))
}

fn spawn_server() -> Child {
    let child = Command::new(server_bin())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn server binary");
    wait_until_listening();
    child
}

fn wait_until_listening() {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if TcpStream::connect(("127.0.0.1", 1234)).is_ok() {
            return;
        }
        assert!(Instant::now() < deadline, "server never started listening");
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn cli(args: &[&str]) -> String {
    let output = Command::new(cli_bin())
        .args(args)
        .output()
        .expect("run client binary");
    assert!(
        output.status.success(),
        "client failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn cli_round_trip_and_clean_shutdown() {
    let _guard = PORT_1234.lock().unwrap();
    let mut server = spawn_server();

    assert_eq!(cli(&["set", "greeting", "hello"]), "(nil)\n");
    assert_eq!(cli(&["get", "greeting"]), "(str) hello\n");
    assert_eq!(cli(&["zadd", "board", "1.5", "alpha"]), "(int) 1\n");
    assert_eq!(
        cli(&["zquery", "board", "0", "", "0", "10"]),
        "(arr) len=2\n(str) alpha\n(dbl) 1.5\n(arr) end\n"
    );

    let farewell = cli(&["shutdown"]);
    assert_eq!(farewell, "(str) Server is shutting down...\n");

    let status = server.wait().expect("server exit status");
    assert_eq!(status.code(), Some(0), "clean shutdown must exit 0");
}

#[test]
fn second_server_on_the_same_port_dies_with_an_error() {
    let _guard = PORT_1234.lock().unwrap();
    let mut first = spawn_server();

    let second = Command::new(server_bin())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .expect("second server run");
    assert_eq!(second.status.code(), Some(1), "bind failure must exit 1");
    assert!(
        !second.stderr.is_empty(),
        "bind failure must say something on stderr"
    );

    first.kill().expect("stop first server");
    let _ = first.wait();
}
