//! End-to-end tests driving the pipelines with in-memory keyboards

use autocorrector::channel::BackoffPolicy;
use autocorrector::keyboard::{typing_events, FedSource, InjectionLog, RecordingInjector};
use autocorrector::pipeline::{run_client, run_daemon, run_standalone, Devices};
use autocorrector::stats::create_shared_stats;
use autocorrector::{Config, KeyEvent, Shutdown};
use crossbeam_channel::Sender;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

fn write_corrections(dir: &Path) -> PathBuf {
    let path = dir.join("corrections.toml");
    std::fs::write(&path, "teh = \"the\"\nrecieve = \"receive\"\n").unwrap();
    path
}

fn test_config(dir: &Path) -> Config {
    Config {
        data_path: dir.join("data"),
        reconnect: BackoffPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
            max_attempts: None,
            jitter: 0.0,
        },
        dictionary_poll_interval: Duration::from_millis(50),
        ..Config::default()
    }
}

fn keyboard() -> (Devices, Sender<KeyEvent>, InjectionLog) {
    let (source, keys) = FedSource::new();
    let (injector, log) = RecordingInjector::new();
    (Devices::new(Box::new(source), Box::new(injector)), keys, log)
}

fn type_text(keys: &Sender<KeyEvent>, text: &str) {
    for event in typing_events(text) {
        keys.send(event).unwrap();
    }
}

/// Keep typing `text`, pausing between attempts, until something is injected.
///
/// Only the latest attempt can be corrected: typing again makes earlier
/// corrections stale.
async fn type_until_corrected(keys: &Sender<KeyEvent>, log: &InjectionLog, text: &str) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while log.text().is_empty() {
        assert!(Instant::now() < deadline, "no correction was typed");
        type_text(keys, text);
        tokio::time::sleep(Duration::from_millis(400)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_standalone_fixes_a_typed_word() {
    let dir = tempfile::tempdir().unwrap();
    let corrections = write_corrections(dir.path());
    let (devices, keys, log) = keyboard();
    let stats = create_shared_stats();
    let shutdown = Shutdown::new();

    let task = tokio::spawn(run_standalone(
        test_config(dir.path()),
        None,
        corrections,
        devices,
        Some(stats.clone()),
        shutdown.clone(),
    ));

    type_text(&keys, "teh ");
    let deadline = Instant::now() + Duration::from_secs(5);
    while log.text() != "the " {
        assert!(Instant::now() < deadline, "correction never typed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown.trigger();
    task.await.unwrap().unwrap();

    assert_eq!(log.backspaces(), 4);
    assert_eq!(log.text(), "the ");
    let snap = stats.stats();
    assert_eq!(snap.keys_pressed, 4);
    assert_eq!(snap.words_checked, 1);
    assert_eq!(snap.words_corrected, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_standalone_honours_pause_in_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let corrections = write_corrections(dir.path());
    let config_path = dir.path().join("config.json");

    let config = Config {
        paused: true,
        ..test_config(dir.path())
    };
    config.save_to(&config_path).unwrap();

    let (devices, keys, log) = keyboard();
    let stats = create_shared_stats();
    let shutdown = Shutdown::new();
    let task = tokio::spawn(run_standalone(
        config.clone(),
        Some(config_path.clone()),
        corrections,
        devices,
        Some(stats.clone()),
        shutdown.clone(),
    ));

    // Paused: the word is still checked and counted, but nothing is typed
    type_text(&keys, "teh ");
    let deadline = Instant::now() + Duration::from_secs(5);
    while stats.stats().words_checked < 1 {
        assert!(Instant::now() < deadline, "word never checked");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    let snap = stats.stats();
    assert_eq!(snap.words_checked, 1);
    assert_eq!(snap.words_corrected, 1);
    assert_eq!(snap.keys_pressed, 4);
    assert!(log.snapshot().is_empty());

    Config {
        paused: false,
        ..config
    }
    .save_to(&config_path)
    .unwrap();
    type_until_corrected(&keys, &log, "recieve ").await;

    shutdown.trigger();
    task.await.unwrap().unwrap();

    let text = log.text();
    let fixes = text.matches("receive ").count();
    assert!(fixes >= 1);
    assert_eq!(text, "receive ".repeat(fixes));
    assert_eq!(log.backspaces(), 8 * fixes);
    assert!(stats.stats().words_corrected > fixes as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_daemon_and_client_correct_together() {
    let dir = tempfile::tempdir().unwrap();
    let corrections = write_corrections(dir.path());
    let socket = dir.path().join("autocorrector.sock");
    let config = test_config(dir.path());

    let (devices, keys, log) = keyboard();
    let daemon_shutdown = Shutdown::new();
    let daemon = tokio::spawn(run_daemon(
        config.clone(),
        socket.clone(),
        None,
        devices,
        daemon_shutdown.clone(),
    ));

    let stats = create_shared_stats();
    let client_shutdown = Shutdown::new();
    let client = tokio::spawn(run_client(
        config,
        None,
        socket,
        corrections,
        Some(stats.clone()),
        client_shutdown.clone(),
    ));

    // Words typed before the client has resumed the daemon are left alone
    type_until_corrected(&keys, &log, "teh ").await;

    daemon_shutdown.trigger();
    daemon.await.unwrap().unwrap();
    client_shutdown.trigger();
    client.await.unwrap().unwrap();

    let text = log.text();
    let fixes = text.matches("the ").count();
    assert!(fixes >= 1);
    assert_eq!(text, "the ".repeat(fixes));
    assert_eq!(log.backspaces(), 4 * fixes);

    let snap = stats.stats();
    assert!(snap.words_corrected >= fixes as u64);
    assert!(snap.words_checked >= snap.words_corrected);
    // Keystrokes are counted by whoever reads the keyboard
    assert_eq!(snap.keys_pressed, 0);
}
