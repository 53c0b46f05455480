//! hand-cli 冒烟测试

use assert_cmd::Command;
use hand_bus::VirtualBus;
use hand_client::FleetBuilder;
use hand_server::{Dispatcher, Server, ServerConfig, StaticFrame};
use predicates::prelude::*;
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

fn hand_cli(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("hand-cli").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

fn start_server(ids: &[u8]) -> (SocketAddr, Arc<AtomicBool>, JoinHandle<()>) {
    let (bus, _handle) = VirtualBus::with_servos(1_000_000, ids);
    let fleet = FleetBuilder::new().motors(ids.len()).build_with(bus).unwrap();
    let server = Server::bind("127.0.0.1:0", Dispatcher::new(fleet, StaticFrame::placeholder()))
        .unwrap()
        .with_config(ServerConfig {
            poll_interval: Duration::from_millis(10),
            io_timeout: Duration::from_secs(2),
        });
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_flag();
    let thread = thread::spawn(move || {
        server.serve().unwrap();
    });
    (addr, shutdown, thread)
}

#[test]
fn test_help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    hand_cli(&dir.path().join("config.toml"))
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("serve")
                .and(predicate::str::contains("call"))
                .and(predicate::str::contains("shell"))
                .and(predicate::str::contains("monitor"))
                .and(predicate::str::contains("scan"))
                .and(predicate::str::contains("config")),
        );
}

#[test]
fn test_config_set_get_check() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hand").join("config.toml");

    hand_cli(&path)
        .args(["config", "set", "--port", "/dev/ttyUSB0", "--motors", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("serial.port = /dev/ttyUSB0"));
    assert!(path.exists());

    hand_cli(&path)
        .args(["config", "set", "--connect", "10.0.0.2:5555"])
        .assert()
        .success();

    hand_cli(&path)
        .args(["config", "get", "serial.port"])
        .assert()
        .success()
        .stdout("/dev/ttyUSB0\n");

    hand_cli(&path)
        .args(["config", "get"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("serial.motors: 5")
                .and(predicate::str::contains("server.connect: 10.0.0.2:5555"))
                .and(predicate::str::contains("serial.baud: (未设置)")),
        );

    hand_cli(&path)
        .args(["config", "check"])
        .assert()
        .success()
        .stdout(predicate::str::contains("配置有效"));
}

#[test]
fn test_config_rejects_bad_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    hand_cli(&path)
        .args(["config", "get", "serial.parity"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("未知配置项"));

    hand_cli(&path).args(["config", "set"]).assert().failure();

    hand_cli(&path)
        .args(["config", "set", "--baud", "9600"])
        .assert()
        .success()
        .stderr(predicate::str::contains("9600"));

    hand_cli(&path)
        .args(["config", "check"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("serial.baud = 9600"));
}

#[test]
fn test_call_against_server() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let frame = dir.path().join("frame.jpg");
    let (addr, shutdown, server) = start_server(&[1, 2]);

    hand_cli(&config)
        .args(["call", "get_voltage()", "--connect", &addr.to_string()])
        .arg("--save-frame")
        .arg(&frame)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[12.0, 12.0] (cam_t: "));
    assert_eq!(std::fs::read(&frame).unwrap(), hand_server::PLACEHOLDER_JPEG);

    hand_cli(&config)
        .args(["call", "reboot()", "--connect", &addr.to_string()])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            "[!]: Wrong Command! 'reboot()' -> unknown command 'reboot'",
        ));

    shutdown.store(true, Ordering::SeqCst);
    server.join().unwrap();
}

#[test]
fn test_connect_address_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    let (addr, shutdown, server) = start_server(&[1]);

    hand_cli(&config)
        .args(["config", "set", "--connect", &addr.to_string()])
        .assert()
        .success();
    hand_cli(&config)
        .args(["call", "none"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[#]: None"));

    shutdown.store(true, Ordering::SeqCst);
    server.join().unwrap();
}

#[test]
fn test_call_unreachable_server() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let dir = tempfile::tempdir().unwrap();
    hand_cli(&dir.path().join("config.toml"))
        .args(["call", "get_torque()", "--connect", &addr.to_string()])
        .args(["--timeout-ms", "500"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("请求失败"));
}

#[test]
fn test_monitor_refreshes() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, shutdown, server) = start_server(&[1, 2]);

    hand_cli(&dir.path().join("config.toml"))
        .args(["monitor", "--connect", &addr.to_string()])
        .args(["--motors", "2", "--tick-ms", "0", "--refreshes", "3"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("[Positions] #1 0.00° - - - | #2 0.00° - - -")
                .and(predicate::str::contains("[Torques] #1 0.00° 0.0% off -")),
        );

    shutdown.store(true, Ordering::SeqCst);
    server.join().unwrap();
}
