/// Integration tests for IPC communication
/// These tests check the wire format and drive a real daemon process over its
/// socket
use common::{Command, Response, RotaError};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

#[test]
fn test_command_wire_format() {
    assert_eq!(serde_json::to_string(&Command::Ping).unwrap(), "\"Ping\"");
    assert_eq!(
        serde_json::to_string(&Command::Scroll { forward: false }).unwrap(),
        r#"{"Scroll":{"forward":false}}"#
    );

    let deserialized: Command = serde_json::from_str(r#"{"Scroll":{"forward":true}}"#).unwrap();
    assert!(matches!(deserialized, Command::Scroll { forward: true }));
}

#[test]
fn test_all_commands_roundtrip() {
    let commands = vec![
        Command::Ping,
        Command::Status,
        Command::Change,
        Command::Next,
        Command::Prev,
        Command::Scroll { forward: true },
        Command::Pause,
        Command::Resume,
        Command::TogglePause,
        Command::Reload,
        Command::Favorite,
        Command::Trash,
        Command::Kill,
    ];

    for cmd in commands {
        let json = serde_json::to_string(&cmd).unwrap();
        let _deserialized: Command = serde_json::from_str(&json).unwrap();
    }
}

#[test]
fn test_response_types() {
    let resp = Response::Ok;
    let json = serde_json::to_string(&resp).unwrap();
    let deserialized: Response = serde_json::from_str(&json).unwrap();
    assert!(matches!(deserialized, Response::Ok));

    let resp = Response::Error(RotaError::Config("bad interval".to_string()));
    let json = serde_json::to_string(&resp).unwrap();
    let deserialized: Response = serde_json::from_str(&json).unwrap();
    match deserialized {
        Response::Error(e) => assert_eq!(e.to_string(), "Config error: bad interval"),
        other => panic!("Wrong response type: {:?}", other),
    }
}

/// Kills the daemon if a test fails halfway
struct Daemon(Child);

impl Drop for Daemon {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn send(socket: &Path, command: &Command) -> Response {
    let mut stream = UnixStream::connect(socket).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let json = serde_json::to_string(command).unwrap();
    stream.write_all(json.as_bytes()).unwrap();
    stream.write_all(b"\n").unwrap();

    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).unwrap();
    serde_json::from_str(&line).unwrap()
}

fn wait_for(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(Instant::now() < deadline, "Timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn test_daemon_rotates_and_exits_on_kill() {
    let dir = tempfile::tempdir().unwrap();
    let walls = dir.path().join("walls");
    std::fs::create_dir_all(&walls).unwrap();
    for name in ["a.png", "b.png", "c.png"] {
        image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]))
            .save(walls.join(name))
            .unwrap();
    }

    let state_file = dir.path().join("current");
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[general]
store = "file"
state_file = "{state}"
download_folder = "{root}/dl"
favorites_folder = "{root}/fav"
filter_output = "{root}/out.jpg"

[[source]]
kind = "folder"
location = "{walls}"
"#,
            state = state_file.display(),
            root = dir.path().display(),
            walls = walls.display(),
        ),
    )
    .unwrap();

    let runtime_dir = dir.path().join("run");
    std::fs::create_dir_all(&runtime_dir).unwrap();
    let socket = runtime_dir.join("rota.sock");

    let mut daemon = Daemon(
        std::process::Command::new(env!("CARGO_BIN_EXE_rota"))
            .arg("--config")
            .arg(&config_path)
            .env("XDG_RUNTIME_DIR", &runtime_dir)
            .env("HOME", dir.path())
            .env("XDG_DATA_HOME", dir.path().join("data"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap(),
    );

    wait_for("the socket", || socket.exists());
    assert!(matches!(send(&socket, &Command::Ping), Response::Pong));

    assert!(matches!(send(&socket, &Command::Change), Response::Ok));
    wait_for("the state file", || state_file.exists());
    let current = std::fs::read_to_string(&state_file).unwrap();
    assert!(current.trim().starts_with(&walls.display().to_string()));

    assert!(matches!(send(&socket, &Command::Pause), Response::Ok));
    wait_for("the change to settle", || {
        matches!(send(&socket, &Command::Status), Response::Status(s) if s.current.is_some())
    });
    match send(&socket, &Command::Status) {
        Response::Status(status) => {
            assert!(status.paused);
            assert_eq!(status.current.as_deref(), Some(current.trim()));
            assert_eq!(status.history_len, 1);
        }
        other => panic!("Wrong response type: {:?}", other),
    }

    // Trashed files can be restored from the desktop trash
    assert!(matches!(send(&socket, &Command::Trash), Response::Ok));
    let shown = Path::new(current.trim());
    let name = shown.file_name().unwrap().to_string_lossy().to_string();
    let trash = dir.path().join("data/Trash");
    assert!(!shown.exists());
    assert!(trash.join("files").join(&name).exists());
    let info =
        std::fs::read_to_string(trash.join("info").join(format!("{}.trashinfo", name))).unwrap();
    assert!(info.starts_with("[Trash Info]"));
    assert!(info.contains("Path="));
    assert!(info.contains("DeletionDate="));

    assert!(matches!(send(&socket, &Command::Kill), Response::Ok));
    wait_for("the daemon to exit", || {
        matches!(daemon.0.try_wait(), Ok(Some(_)))
    });
    assert!(!socket.exists());
}
