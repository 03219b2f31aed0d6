#![cfg(all(unix, feature = "cli"))]

use std::path::Path;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const STRUCT_JSON: &str = r#"{"a":"abc","b":"efg","c":{"a":89,"b":true}}"#;
const STRUCT_WIRE: &str = "6\n3\na\n1\n3\nabcb\n1\n3\nefgc\n6\n2\na\n2\n89\nb\n4\ntrue\n";

fn linewire(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_linewire"))
        .args(["--log-level", "error"])
        .args(args)
        .output()
        .expect("linewire should run")
}

fn spawn_server(socket: &Path, extra: &[&str]) -> Child {
    let child = Command::new(env!("CARGO_BIN_EXE_linewire"))
        .args(["--log-level", "error", "--format", "json", "serve"])
        .arg(socket)
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("serve should start");
    wait_for_socket(socket, Duration::from_secs(5));
    child
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while std::os::unix::net::UnixStream::connect(path).is_err() {
        if start.elapsed() >= timeout {
            panic!("socket {} never came up", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn encode_matches_wire_fixture() {
    let output = linewire(&["encode", "--json", STRUCT_JSON]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), STRUCT_WIRE);
}

#[test]
fn encode_decode_and_index_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("payload.bin");
    let path_str = path.to_str().unwrap();

    let output = linewire(&["encode", "--json", STRUCT_JSON, "--out", path_str]);
    assert!(output.status.success());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), STRUCT_WIRE);

    let output = linewire(&["--format", "json", "decode", path_str]);
    assert!(output.status.success());
    assert_eq!(stdout(&output).trim(), STRUCT_JSON);

    let output = linewire(&["--format", "json", "index", path_str]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains(r#"{"name":"a","type":"string","start":10,"end":13}"#));
    assert!(text.contains(r#""children":[{"name":"a","type":"integer""#));
}

#[test]
fn decode_rejects_corrupt_input() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.bin");
    std::fs::write(&path, "6\n1\na\n2\nnot-a-number\n").unwrap();

    let output = linewire(&["decode", path.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("decode failed"));
}

#[test]
fn send_to_missing_socket_fails() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("missing.sock");
    let output = linewire(&["send", socket.to_str().unwrap(), "echo"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("connect failed"));
}

#[test]
fn send_and_serve_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("echo.sock");
    let spool = dir.path().join("spool");
    let spool_str = spool.to_str().unwrap();
    let socket_str = socket.to_str().unwrap();

    let server = spawn_server(&socket, &["--cmd", "echo", "--count", "2", "--spool-dir", spool_str]);

    let output = linewire(&[
        "--format", "json", "send", socket_str, "echo", "--json", r#"{"k":"line\none"}"#,
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains(r#""mode":"mem""#));
    assert!(text.contains(r#""payload":{"k":"line\none"}"#));

    let output = linewire(&[
        "--format", "json", "--spool-dir", spool_str, "send", socket_str, "echo", "--json",
        r#"[1,2,3]"#, "--mode", "file",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let text = stdout(&output);
    assert!(text.contains(r#""mode":"file""#));
    assert!(text.contains(r#""payload":[1,2,3]"#));

    let served = server.wait_with_output().unwrap();
    assert!(served.status.success());
    let log = stdout(&served);
    assert_eq!(log.lines().count(), 2);
    assert!(log.contains(r#""cmd":"echo""#));
    assert!(!socket.exists());
    assert_eq!(std::fs::read_dir(&spool).unwrap().count(), 0);
}

#[test]
fn unknown_command_is_acknowledged_with_void() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("ack.sock");
    let mut server = spawn_server(&socket, &["--cmd", "echo"]);

    let output = linewire(&[
        "--format",
        "json",
        "send",
        socket.to_str().unwrap(),
        "nobody",
        "--json",
        "{}",
    ]);
    let _ = server.kill();
    let _ = server.wait();

    assert!(output.status.success());
    assert!(stdout(&output).contains(r#""payload":null"#));
}
