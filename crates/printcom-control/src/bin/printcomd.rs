//! Serial-bridge daemon for the prompt protocol.
//!
//! Reads the firmware line stream on stdin, routes out-of-band
//! `// action:` lines into the prompt state machine, emits outbound
//! firmware commands on stdout and serves the control endpoint configured
//! in `host.toml`.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use printcom_control::{ControlEndpoint, ControlFanout, ControlServer, ControlState, FirmwareLink, SendQueue};
use printcom_control::server::ControlAuditEvent;
use printcom_control::HostConfig;
use printcom_protocol::{PromptService, PromptSink};

/// Out-of-band marker firmware puts in front of action commands.
const ACTION_MARKERS: [&str; 2] = ["// action:", "//action:"];

#[derive(Debug, Parser)]
#[command(name = "printcomd", about = "Prompt protocol host daemon")]
struct Cli {
    /// Path to the host configuration file.
    #[arg(long, default_value = "host.toml")]
    config: PathBuf,
}

struct StdoutLink;

impl FirmwareLink for StdoutLink {
    fn send(&mut self, command: &str) -> std::io::Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{command}")?;
        stdout.flush()
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = HostConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_str()))
        .context("invalid log.level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = config.prompt.clone().shared();
    let fanout = Arc::new(ControlFanout::default());
    let sink: Arc<dyn PromptSink> = fanout.clone();
    let service = Arc::new(PromptService::new(settings.clone(), sink));
    let queue = Arc::new(SendQueue::new(Box::new(StdoutLink)));

    let (audit_tx, audit_rx) = mpsc::channel::<ControlAuditEvent>();
    std::thread::Builder::new()
        .name("control-audit".to_string())
        .spawn(move || {
            for event in audit_rx {
                debug!(
                    "control audit: type={} ok={} auth={} error={:?}",
                    event.request_type, event.ok, event.auth_present, event.error
                );
            }
        })
        .context("spawning audit thread")?;

    let endpoint = ControlEndpoint::parse(config.control_endpoint.as_str())?;
    let state = Arc::new(ControlState {
        service: service.clone(),
        settings,
        queue,
        fanout,
        host_name: config.host_name.clone(),
        auth_token: config.control_auth_token.clone(),
        audit_tx: Some(audit_tx),
        started: Instant::now(),
    });
    let server = ControlServer::start(&endpoint, state)?;
    info!(
        "printcomd '{}' serving control on {}",
        config.host_name,
        server.endpoint()
    );

    bridge_firmware_lines(std::io::stdin().lock(), &service);
    info!("firmware stream closed, shutting down");
    Ok(())
}

/// Reads the serial-style line stream and feeds action lines to the
/// protocol core. Firmware bytes are not trusted to be valid UTF-8, so the
/// byte-to-text normalization happens here, at the transport boundary.
fn bridge_firmware_lines(input: impl Read, service: &PromptService) {
    let mut reader = BufReader::new(input);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("firmware stream read failed: {err}");
                break;
            }
        }
        let line = String::from_utf8_lossy(&buffer);
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(action) = strip_action_marker(line) else {
            continue;
        };
        if !service.handle_action_line(action) {
            debug!("ignoring non-prompt action '{action}'");
        }
    }
}

fn strip_action_marker(line: &str) -> Option<&str> {
    ACTION_MARKERS
        .iter()
        .find_map(|marker| line.strip_prefix(marker))
        .map(str::trim)
}
