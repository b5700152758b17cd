//! Control server transport plumbing.

use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener};
#[cfg(unix)]
use std::os::unix::net::UnixListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::{debug, warn};

use printcom_protocol::{PromptNotification, PromptSink};

use crate::error::HostError;
use crate::server::{self, ControlState};

#[derive(Debug, Clone)]
pub enum ControlEndpoint {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl ControlEndpoint {
    pub fn parse(text: &str) -> Result<Self, HostError> {
        if let Some(rest) = text.strip_prefix("tcp://") {
            let addr = rest.parse::<SocketAddr>().map_err(|err| {
                HostError::ControlError(format!("invalid tcp endpoint: {err}").into())
            })?;
            if !addr.ip().is_loopback() {
                return Err(HostError::ControlError(
                    "tcp endpoint must be loopback (use unix:// for local sockets)".into(),
                ));
            }
            return Ok(Self::Tcp(addr));
        }
        #[cfg(unix)]
        if let Some(rest) = text.strip_prefix("unix://") {
            return Ok(Self::Unix(PathBuf::from(rest)));
        }
        Err(HostError::ControlError(
            format!("unsupported endpoint '{text}'").into(),
        ))
    }
}

impl fmt::Display for ControlEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Broadcast side of the remote presentation channel.
///
/// Connections that issue `prompt.subscribe` register their outbound
/// channel here; every prompt notification is serialized once and pushed to
/// all of them. Sends are fire-and-forget into per-connection unbounded
/// channels, so broadcasting never blocks the protocol lock. Dead
/// subscribers are pruned when their channel is gone, and a closing
/// connection unsubscribes itself by token so its writer thread is not
/// kept alive by a registered sender.
#[derive(Default)]
pub struct ControlFanout {
    subscribers: Mutex<Vec<(u64, Sender<String>)>>,
    next_token: AtomicU64,
}

impl ControlFanout {
    pub(crate) fn subscribe(&self, outbound: Sender<String>) -> u64 {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.lock().push((token, outbound));
        token
    }

    pub(crate) fn unsubscribe(&self, token: u64) {
        self.lock().retain(|(existing, _)| *existing != token);
    }

    fn broadcast(&self, line: &str) {
        self.lock()
            .retain(|(_, subscriber)| subscriber.send(line.to_string()).is_ok());
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(u64, Sender<String>)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Per-connection write channel plus the fanout tokens the connection
/// holds. Tokens are released when the connection winds down.
pub(crate) struct ConnectionHandle {
    outbound: Sender<String>,
    subscriptions: Vec<u64>,
}

impl ConnectionHandle {
    pub(crate) fn new(outbound: Sender<String>) -> Self {
        Self {
            outbound,
            subscriptions: Vec::new(),
        }
    }

    pub(crate) fn outbound(&self) -> &Sender<String> {
        &self.outbound
    }

    pub(crate) fn subscribed(&mut self, token: u64) {
        self.subscriptions.push(token);
    }
}

impl PromptSink for ControlFanout {
    fn send(&self, notification: PromptNotification) {
        match serde_json::to_string(&notification) {
            Ok(line) => self.broadcast(&line),
            Err(err) => warn!("failed to serialize prompt notification: {err}"),
        }
    }
}

/// Binds the endpoint and spawns the accept loop. Returns the resolved
/// endpoint (a `tcp://…:0` request comes back with the actual port).
pub(crate) fn spawn_control_server(
    endpoint: &ControlEndpoint,
    state: Arc<ControlState>,
) -> Result<ControlEndpoint, HostError> {
    match endpoint {
        ControlEndpoint::Tcp(addr) => {
            let listener = TcpListener::bind(addr).map_err(|err| {
                HostError::ControlError(format!("failed to bind {addr}: {err}").into())
            })?;
            let resolved = listener.local_addr().map_err(|err| {
                HostError::ControlError(format!("failed to resolve local addr: {err}").into())
            })?;
            spawn_accept_loop("control-accept-tcp", move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            let Ok(write_half) = stream.try_clone() else {
                                continue;
                            };
                            spawn_connection(stream, write_half, state.clone());
                        }
                        Err(err) => warn!("control accept failed: {err}"),
                    }
                }
            })?;
            Ok(ControlEndpoint::Tcp(resolved))
        }
        #[cfg(unix)]
        ControlEndpoint::Unix(path) => {
            if path.exists() {
                std::fs::remove_file(path).map_err(|err| {
                    HostError::ControlError(
                        format!("failed to remove stale socket {}: {err}", path.display()).into(),
                    )
                })?;
            }
            let listener = UnixListener::bind(path).map_err(|err| {
                HostError::ControlError(
                    format!("failed to bind {}: {err}", path.display()).into(),
                )
            })?;
            spawn_accept_loop("control-accept-unix", move || {
                for stream in listener.incoming() {
                    match stream {
                        Ok(stream) => {
                            let Ok(write_half) = stream.try_clone() else {
                                continue;
                            };
                            spawn_connection(stream, write_half, state.clone());
                        }
                        Err(err) => warn!("control accept failed: {err}"),
                    }
                }
            })?;
            Ok(ControlEndpoint::Unix(path.clone()))
        }
    }
}

fn spawn_accept_loop(
    name: &str,
    body: impl FnOnce() + Send + 'static,
) -> Result<(), HostError> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|err| {
            HostError::ControlError(format!("failed to spawn accept loop: {err}").into())
        })?;
    Ok(())
}

fn spawn_connection<R, W>(read_half: R, write_half: W, state: Arc<ControlState>)
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    thread::spawn(move || serve_connection(read_half, write_half, &state));
}

/// One request/response loop per connection. All writes (responses and
/// subscription pushes alike) funnel through a channel into a dedicated
/// writer thread so they never interleave mid-line.
fn serve_connection<R, W>(read_half: R, mut write_half: W, state: &Arc<ControlState>)
where
    R: Read,
    W: Write + Send + 'static,
{
    let (outbound, outbox) = mpsc::channel::<String>();
    let writer = thread::spawn(move || {
        for line in outbox {
            let sent = write_half
                .write_all(line.as_bytes())
                .and_then(|()| write_half.write_all(b"\n"))
                .and_then(|()| write_half.flush());
            if sent.is_err() {
                break;
            }
        }
    });

    let mut conn = ConnectionHandle::new(outbound);
    let reader = BufReader::new(read_half);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        debug!("control request: {line}");
        if let Some(response) = server::handle_request_line(&line, state, &mut conn) {
            if conn.outbound().send(response).is_err() {
                break;
            }
        }
    }
    // Release fanout registrations before dropping the write channel so
    // the writer thread can drain and exit.
    for token in conn.subscriptions.drain(..) {
        state.fanout.unsubscribe(token);
    }
    drop(conn);
    let _ = writer.join();
}
