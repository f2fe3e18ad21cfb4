//! Smoke tests for the airpipe binary.

use assert_cmd::Command;
use pipe_client::{Sender, SessionConfig};
use pipe_relay::{serve, Config, PipeRelay};
use predicates::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

fn airpipe(config_dir: &TempDir) -> Command {
    let config = config_dir.path().join("airpipe.toml");
    if !config.exists() {
        std::fs::write(&config, "").unwrap();
    }
    let mut cmd = Command::cargo_bin("airpipe").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

#[test]
fn help_lists_commands() {
    Command::cargo_bin("airpipe")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("send"))
        .stdout(predicate::str::contains("receive"));
}

#[test]
fn send_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    airpipe(&dir)
        .args(["send", "does-not-exist.bin"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"))
        .stderr(predicate::str::contains("does-not-exist.bin"));
}

#[test]
fn receive_into_missing_dir_fails() {
    let dir = TempDir::new().unwrap();
    airpipe(&dir)
        .arg("receive")
        .arg(dir.path().join("nowhere"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a directory"));
}

#[test]
fn bad_link_fails() {
    let dir = TempDir::new().unwrap();
    airpipe(&dir)
        .args(["receive", "--link", "https://relay.example.com/x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid pairing link"));
}

#[test]
fn broken_config_file_fails() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("airpipe.toml"), "chunk_size = \"big\"\n").unwrap();
    airpipe(&dir)
        .arg("receive")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config file"));
}

#[test]
fn unreachable_relay_fails() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("hello.txt");
    std::fs::write(&file, b"hello").unwrap();

    airpipe(&dir)
        .args(["--relay", "ws://127.0.0.1:1", "send"])
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains("AirPipe - Send"))
        .stdout(predicate::str::contains("File: hello.txt (5 B)"))
        .stderr(predicate::str::contains("Failed to join relay"));
}

#[tokio::test(flavor = "multi_thread")]
async fn receive_joins_sender_link() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Arc::new(PipeRelay::new(Config::default()))));

    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = src.path().join("report.pdf");
    let data: Vec<u8> = (0..300_000).map(|i| (i % 241) as u8).collect();
    std::fs::write(&path, &data).unwrap();

    let mut sender = Sender::new(SessionConfig::generate(&format!("ws://{addr}")).unwrap());
    let link = sender.pairing_link().unwrap().to_url().unwrap();
    sender.connect().await.unwrap();

    let dest_path = dest.path().to_path_buf();
    let cli = tokio::task::spawn_blocking(move || {
        let config_dir = TempDir::new().unwrap();
        airpipe(&config_dir)
            .args(["--timeout", "30", "receive", "--link", &link])
            .arg(&dest_path)
            .timeout(Duration::from_secs(60))
            .assert()
            .success()
            .stdout(predicate::str::contains("✓ Saved:"))
            .stdout(predicate::str::contains("report.pdf"));
    });

    sender.wait_for_peer(Duration::from_secs(30)).await.unwrap();
    sender.send_file(&path, |_, _| {}).await.unwrap();
    sender.close().await;
    cli.await.unwrap();

    assert_eq!(std::fs::read(dest.path().join("report.pdf")).unwrap(), data);
}
