//! Per-connection session orchestration.
//!
//! Walks an accepted connection through the honeypot phases in order:
//! option negotiation, banner, credential collection, then either the
//! emulated shell or the proxied container shell. Every phase boundary
//! updates the session record and emits its event; the session summary
//! is emitted last, whatever phase the connection died in.

use crate::auth;
use crate::config::HoneypotConfig;
use crate::director::{self, Director};
use crate::errors::HoneypotResult;
use crate::events::Collector;
use crate::negotiation;
use crate::proxy;
use crate::session::{Interaction, Session};
use crate::shell;

use log::{debug, error};
use std::io::Write;
use std::net::{IpAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

/// Banner used when none is configured.
pub const DEFAULT_BANNER: &str = "\nUser Access Verification\r\nUsername:";

const BANNER_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle one accepted connection to completion.
pub fn handle_connection(
    mut stream: TcpStream,
    config: Arc<HoneypotConfig>,
    collector: Arc<Collector>,
    director: Option<Arc<Director>>,
) -> HoneypotResult<()> {
    let remote = stream.peer_addr()?;
    let local = stream.local_addr()?;
    let mut session = collector.register_connection(remote, local);

    let result = run_session(
        &mut stream,
        &config,
        &collector,
        director.as_deref(),
        &mut session,
    );

    // When the session ends, log everything that happened.
    session.finish();
    collector.log_interaction(&session);
    collector.log_session(&session);
    result
}

fn run_session(
    stream: &mut TcpStream,
    config: &HoneypotConfig,
    collector: &Collector,
    director: Option<&Director>,
    session: &mut Session,
) -> HoneypotResult<()> {
    // Negotiate linemode and echo. A peer that does not speak telnet
    // drops the session into raw mode; its bytes carry over into auth.
    let carryover = negotiation::negotiate(stream, &mut session.negotiation)?;
    session.raw = !session.negotiation.valid;
    collector.submit_negotiation(session);
    collector.log_negotiation(session);

    let banner = select_banner(&config.telnet.banners, session.local_addr.ip());
    session.banner = banner.to_string();
    debug!(
        "Sending banner {} => {}",
        session.remote_addr, session.local_addr
    );
    stream.set_write_timeout(Some(BANNER_WRITE_TIMEOUT))?;
    if let Err(e) = stream.write_all(banner.as_bytes()) {
        error!(
            "Error writing banner: {} : {} => {}",
            e, session.remote_addr, session.local_addr
        );
        return Err(e.into());
    }
    stream.set_write_timeout(None)?;

    let auth_result = auth::authenticate(
        stream,
        &config.telnet.credentials,
        &config.telnet.root_credentials,
        &session.negotiation,
        &mut session.auth,
        &carryover,
    );
    collector.log_credentials(session);
    auth_result?;

    if !session.auth.success {
        return Ok(());
    }

    let mut interaction = Interaction::default();
    let shell_result = match director {
        Some(director) => {
            high_interaction(stream, director, config, session, &mut interaction)
        }
        None => shell::low_interaction(stream, &session.negotiation, &mut interaction),
    };
    session.interaction = Some(interaction);
    shell_result
}

/// Shell inside the attacker's container: dial, authenticate once, then
/// pump bytes until either side closes.
fn high_interaction(
    stream: &mut TcpStream,
    director: &Director,
    config: &HoneypotConfig,
    session: &Session,
    interaction: &mut Interaction,
) -> HoneypotResult<()> {
    let mut container = director.dial(session.remote_addr, session.local_addr)?;
    director::auto_login(&mut container, stream)?;
    proxy::high_interaction(
        stream,
        container,
        config.telnet.replace_mounts,
        interaction,
    )
}

/// Pick the banner for a listener address: the last octet of the local
/// IP selects one of eight buckets, falling back to the first banner
/// when fewer are configured.
pub fn select_banner(banners: &[String], local_ip: IpAddr) -> &str {
    if banners.is_empty() {
        return DEFAULT_BANNER;
    }

    let octet = match local_ip {
        IpAddr::V4(v4) => v4.octets()[3],
        IpAddr::V6(v6) => v6.octets()[15],
    };
    let index = usize::from(octet / 32);

    banners
        .get(index)
        .unwrap_or(&banners[0])
        .as_str()
}
