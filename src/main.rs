use nyx::config::HoneypotConfig;
use nyx::errors::HoneypotResult;
use nyx::events::{Collector, LogSink};
use nyx::server;

use log::warn;
use std::net::TcpListener;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

/// Nyx entry point
fn main() -> HoneypotResult<()> {
    env_logger::init();

    // Load configuration
    let config = match HoneypotConfig::load_from_file("nyx.conf") {
        Ok(config) => {
            println!("Configuration loaded from nyx.conf");
            config
        }
        Err(e) => {
            eprintln!("Config error: {}", e);
            return Err(e.into());
        }
    };

    print_startup_banner(&config);

    // Wrap config in Arc for sharing between threads
    let config = Arc::new(config);

    let collector = Arc::new(Collector::new(Box::new(LogSink)));

    // High interaction needs a container runtime backend, which embeds
    // through the library seam; the standalone binary always serves the
    // emulated shell.
    if config.director.enabled {
        warn!(
            "director enabled but no container runtime backend is linked; \
             serving the emulated shell"
        );
    }

    // Start the server
    let bind_addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let listener = TcpListener::bind(&bind_addr)?;

    println!("> Nyx listening on {}", bind_addr);
    println!(
        "> Allow-listed credentials: {}",
        config.telnet.credentials.len()
    );
    println!("\nPress Ctrl+C to stop the server\n");

    // Accept connections with proper connection tracking
    let connection_count = Arc::new(AtomicU32::new(0));
    let mut connection_id = 0u32;

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                connection_id += 1;
                let current_connections = connection_count.fetch_add(1, Ordering::Relaxed) + 1;

                // Clone config for this thread
                let config = Arc::clone(&config);

                // Check connection limit
                if current_connections as usize > config.server.max_connections {
                    eprintln!(
                        "!  Connection limit reached ({}/{}), rejecting connection",
                        current_connections, config.server.max_connections
                    );
                    // Attackers get a silent close, never an excuse.
                    drop(stream);
                    connection_count.fetch_sub(1, Ordering::Relaxed);
                    continue;
                }

                let peer_addr = stream
                    .peer_addr()
                    .map_or_else(|_| "unknown".to_string(), |a| a.to_string());
                println!(
                    "> New connection #{} from: {} ({}/{})",
                    connection_id, peer_addr, current_connections, config.server.max_connections
                );

                // Clone the collector and connection counter for this thread
                let collector = Arc::clone(&collector);
                let conn_counter = Arc::clone(&connection_count);

                // Spawn thread to handle connection
                thread::spawn(move || {
                    match server::handle_connection(stream, config, collector, None) {
                        Ok(()) => {
                            let remaining = conn_counter.fetch_sub(1, Ordering::Relaxed) - 1;
                            println!(
                                "> Session {} finished ({} connections remaining)",
                                peer_addr, remaining
                            );
                        }
                        Err(e) => {
                            let remaining = conn_counter.fetch_sub(1, Ordering::Relaxed) - 1;
                            eprintln!(
                                "! Session {} ended: {} ({} connections remaining)",
                                peer_addr, e, remaining
                            );
                        }
                    }
                });
            }

            Err(e) => {
                eprintln!("! Error accepting connection: {}", e);
            }
        }
    }

    Ok(())
}

/// Show server startup configuration in the console log
fn print_startup_banner(config: &HoneypotConfig) {
    println!("> Nyx telnet honeypot");
    println!("> Bind: {}:{}", config.server.bind_address, config.server.port);
    println!("> Max connections: {}", config.server.max_connections);
    println!("> Banners configured: {}", config.telnet.banners.len());
    println!(
        "> Mount-table scrubbing: {}",
        if config.telnet.replace_mounts {
            "Enabled"
        } else {
            "Disabled"
        }
    );
    if config.director.enabled {
        println!(
            "> Director: template '{}', idle cutoff {:?}, housekeeper tick {:?}",
            config.director.template, config.director.stop_every, config.director.housekeeper_every
        );
    } else {
        println!("> Director: Disabled (emulated shell)");
    }
}
