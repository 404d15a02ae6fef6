//! Director and high-interaction tests against the in-memory container
//! runtime, with a scripted telnetd standing in for the guest daemon.

use nyx::config::HoneypotConfig;
use nyx::director::Director;
use nyx::server;

use serde_json::Value;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

mod common;

use common::{read_until, recording_collector, test_config, MockRuntime};

const TEMPLATE: &str = "honeytrap";

fn director_with(
    runtime: MockRuntime,
    stop_every: Duration,
    housekeeper_every: Duration,
) -> (Director, Arc<std::sync::Mutex<common::MockState>>) {
    let state = runtime.state();
    let mut config = test_config();
    config.director.enabled = true;
    config.director.template = TEMPLATE.to_string();
    config.director.stop_every = stop_every;
    config.director.housekeeper_every = housekeeper_every;

    let (collector, _) = recording_collector();
    let director = Director::new(&config.director, Arc::new(runtime), collector);
    (director, state)
}

/// Accept loop standing in for the telnetd inside a container. Echoes
/// nothing; connections are just held open.
fn idle_daemon() -> (SocketAddr, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind daemon");
    let addr = listener.local_addr().expect("daemon addr");
    let handle = thread::spawn(move || {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept() {
            held.push(stream);
            if held.len() >= 8 {
                break;
            }
        }
    });
    (addr, handle)
}

#[test]
fn sticky_container_skips_second_clone() {
    let (daemon_addr, _daemon) = idle_daemon();
    let (director, state) = director_with(
        MockRuntime::new(TEMPLATE, "127.0.0.1"),
        Duration::from_secs(60),
        Duration::from_secs(60),
    );

    let remote: SocketAddr = "203.0.113.7:40001".parse().expect("addr");
    let name = Director::container_name(remote.ip());

    let first = director.dial(remote, daemon_addr).expect("first dial");
    drop(first);

    {
        let state = state.lock().expect("state");
        assert_eq!(state.clones, vec![(TEMPLATE.to_string(), name.clone())]);
        assert_eq!(state.starts, 1);
        assert!(state.running.contains(&name));
        // The clone was neutralized for deception.
        let config = state.config.get(&name).expect("clone config");
        assert!(config.contains(&("console.path".to_string(), "none".to_string())));
        assert!(config.contains(&("tty.max".to_string(), "0".to_string())));
        assert!(config.contains(&(
            "cgroup.devices.deny".to_string(),
            "c 5:1 rwm".to_string()
        )));
    }

    // Second connection from the same source: same name, no new clone,
    // no new start.
    let remote_again: SocketAddr = "203.0.113.7:40002".parse().expect("addr");
    let second = director.dial(remote_again, daemon_addr).expect("second dial");
    drop(second);

    let state = state.lock().expect("state");
    assert_eq!(state.clones.len(), 1);
    assert_eq!(state.starts, 1);
    assert!(director.tracks(&name));
}

#[test]
fn different_sources_get_different_containers() {
    let (daemon_addr, _daemon) = idle_daemon();
    let (director, state) = director_with(
        MockRuntime::new(TEMPLATE, "127.0.0.1"),
        Duration::from_secs(60),
        Duration::from_secs(60),
    );

    let a = director
        .dial("203.0.113.7:40001".parse().expect("addr"), daemon_addr)
        .expect("dial a");
    let b = director
        .dial("203.0.113.8:40001".parse().expect("addr"), daemon_addr)
        .expect("dial b");
    drop((a, b));

    let state = state.lock().expect("state");
    assert_eq!(state.clones.len(), 2);
    assert_eq!(director.active_containers().len(), 2);
}

#[test]
fn idle_container_is_reaped_and_recloned() {
    let (daemon_addr, _daemon) = idle_daemon();
    let (director, state) = director_with(
        MockRuntime::new(TEMPLATE, "127.0.0.1"),
        Duration::from_millis(300),
        Duration::from_millis(100),
    );

    let remote: SocketAddr = "203.0.113.7:40001".parse().expect("addr");
    let name = Director::container_name(remote.ip());

    let conn = director.dial(remote, daemon_addr).expect("dial");
    drop(conn);

    // No traffic: the housekeeper stops the container and forgets it.
    let deadline = std::time::Instant::now() + Duration::from_secs(3);
    while director.tracks(&name) {
        assert!(std::time::Instant::now() < deadline, "container never reaped");
        thread::sleep(Duration::from_millis(50));
    }
    {
        let state = state.lock().expect("state");
        assert_eq!(state.stops, 1);
        assert!(!state.running.contains(&name));
        // The disposable clone was discarded with its handle.
        assert!(!state.defined.contains(&name));
    }

    // The next visit starts from a fresh clone.
    let conn = director.dial(remote, daemon_addr).expect("redial");
    drop(conn);
    let state = state.lock().expect("state");
    assert_eq!(state.clones.len(), 2);
    assert_eq!(state.starts, 2);
}

#[test]
fn proxy_traffic_defers_the_reaper() {
    let (daemon_addr, _daemon) = idle_daemon();
    let (director, _state) = director_with(
        MockRuntime::new(TEMPLATE, "127.0.0.1"),
        Duration::from_millis(400),
        Duration::from_millis(100),
    );

    let remote: SocketAddr = "203.0.113.7:40001".parse().expect("addr");
    let name = Director::container_name(remote.ip());

    let mut conn = director.dial(remote, daemon_addr).expect("dial");

    // Keep writing through the instrumented connection past several
    // idle cutoffs; activity must hold the container.
    for _ in 0..8 {
        thread::sleep(Duration::from_millis(150));
        conn.write_all(b"uptime\r\n").expect("write");
        assert!(director.tracks(&name), "reaped despite live traffic");
    }
}

#[test]
fn clone_failure_is_reported_and_record_removed() {
    let (daemon_addr, _daemon) = idle_daemon();
    let runtime = MockRuntime::new(TEMPLATE, "127.0.0.1");
    runtime.state.lock().expect("state").fail_clone = true;
    let (director, _state) = director_with(
        runtime,
        Duration::from_secs(60),
        Duration::from_secs(60),
    );

    let remote: SocketAddr = "203.0.113.7:40001".parse().expect("addr");
    assert!(director.dial(remote, daemon_addr).is_err());
    // The failed record does not linger.
    assert!(director.active_containers().is_empty());
}

#[test]
fn operator_removal_force_closes_connections() {
    let (daemon_addr, _daemon) = idle_daemon();
    let (director, _state) = director_with(
        MockRuntime::new(TEMPLATE, "127.0.0.1"),
        Duration::from_secs(60),
        Duration::from_secs(60),
    );

    let remote: SocketAddr = "203.0.113.7:40001".parse().expect("addr");
    let name = Director::container_name(remote.ip());

    let mut conn = director.dial(remote, daemon_addr).expect("dial");
    assert!(director.remove_client_with_connections(&name));
    assert!(!director.tracks(&name));

    // The tracked socket was shut down; reads observe end-of-stream.
    conn.set_read_timeout(Some(Duration::from_secs(2)))
        .expect("timeout");
    let mut buf = [0u8; 16];
    match conn.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("expected close, read {} bytes", n),
        Err(e) => panic!("expected clean close, got {}", e),
    }

    assert!(!director.remove_client(&name));
}

/// Scripted stand-in for the telnetd inside the template image: walks
/// the fixed auto-login dialogue, then serves a tiny shell whose mount
/// table leaks container artifacts.
fn scripted_container_daemon(listener: TcpListener) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut buf = [0u8; 512];

        // Negotiation ping-pong: our send, their reply, three times.
        stream.write_all(&[255, 253, 0x18, 255, 253, 0x20]).expect("neg 1");
        stream.read(&mut buf).expect("reply 1");
        stream.write_all(&[255, 250, 0x18, 0x01, 255, 240]).expect("neg 2");
        stream.read(&mut buf).expect("reply 2");
        stream.write_all(&[255, 251, 0x01, 255, 251, 0x03]).expect("neg 3");
        stream.read(&mut buf).expect("reply 3");

        // One more negotiation burst, then the login prompt. The pause
        // keeps the two sends in separate reads on the proxy side.
        stream.write_all(&[255, 253, 0x1f]).expect("neg 4");
        thread::sleep(Duration::from_millis(300));
        stream.write_all(b"firmware login: ").expect("login prompt");
        stream.read(&mut buf).expect("username");
        stream.write_all(b"Password: ").expect("password prompt");
        stream.read(&mut buf).expect("password");
        stream
            .write_all(b"\r\nBusyBox v1.16.1 built-in shell (ash)\r\n\r\n~# ")
            .expect("motd");

        // Shell: answer mount-table recon with a leaking line.
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match stream.read(&mut byte) {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
            if byte[0] == b'\n' {
                let command = String::from_utf8_lossy(&line).into_owned();
                line.clear();
                if command.starts_with("cat /proc/mounts") {
                    stream
                        .write_all(
                            b"cgroup /sys/fs/cgroup/freezer cgroup rw,relatime 0 0\ntotal 4\n",
                        )
                        .expect("mounts");
                } else {
                    stream.write_all(b"~# ").expect("prompt");
                }
            } else {
                line.push(byte[0]);
            }
        }
    })
}

#[test]
fn full_high_interaction_session_scrubs_mount_leaks() {
    // The honeypot listens on 127.0.0.1; the fake guest daemon binds the
    // same port number on 127.0.0.2, where the mock runtime says the
    // container lives.
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind honeypot");
    let honeypot_addr = listener.local_addr().expect("honeypot addr");
    let daemon_listener = TcpListener::bind(("127.0.0.2", honeypot_addr.port()))
        .expect("bind guest daemon on 127.0.0.2");
    let daemon = scripted_container_daemon(daemon_listener);

    let (collector, events) = recording_collector();
    let mut config: HoneypotConfig = test_config();
    config.director.enabled = true;
    config.director.template = TEMPLATE.to_string();
    let director = Arc::new(Director::new(
        &config.director,
        Arc::new(MockRuntime::new(TEMPLATE, "127.0.0.2")),
        Arc::clone(&collector),
    ));
    let config = Arc::new(config);

    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        server::handle_connection(stream, config, collector, Some(director))
    });

    let mut client = TcpStream::connect(honeypot_addr).expect("connect");
    let mut preamble = [0u8; 6];
    client.read_exact(&mut preamble).expect("preamble");
    client.write_all(&[255, 251, 34, 255, 253, 1]).expect("negotiate");
    read_until(&mut client, "Username:");

    client.write_all(b"root\nhoney\n").expect("credentials");

    // The container's MOTD arrives through the auto-login forward.
    read_until(&mut client, "BusyBox");

    client.write_all(b"cat /proc/mounts\n").expect("recon");
    let received = read_until(&mut client, "total 4");
    assert!(!received.contains("cgroup"), "leak reached the attacker");

    drop(client);
    let _ = server.join().expect("server thread");
    daemon.join().expect("daemon thread");

    let events = events.lock().expect("events lock").clone();
    let types: Vec<&str> = events.iter().map(|e| e.etype.as_str()).collect();
    assert!(types.contains(&"container-clone"));
    assert!(types.contains(&"container-start"));

    let commands = events
        .iter()
        .find(|e| e.etype == "commands")
        .expect("commands event");
    assert_eq!(
        commands.custom.get("commands"),
        Some(&Value::from(vec!["cat /proc/mounts"]))
    );
    assert_eq!(
        commands.custom.get("container_ip"),
        Some(&Value::from("127.0.0.2"))
    );
}
