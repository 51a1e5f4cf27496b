//! Socket lifecycle, accept loop, and service wiring.

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use dictate_core::asr::{AsrAdapter, StubAsr};
use dictate_core::capture::input::CpalAudioInput;
use dictate_core::capture::CaptureService;
use dictate_core::command::CommandBus;
use dictate_core::config::Config;
use dictate_core::llm::LlmRefiner;
use dictate_core::platform::{LinuxClipboard, LinuxNotifier};
use dictate_core::rpc::{self, Decoded, Response};

use crate::dispatch::Dispatcher;

/// Largest single request this server will read off a connection.
const MAX_REQUEST_BYTES: usize = 4096;

/// How long an in-flight connection task gets to finish after `shutdown`
/// notifies before it's forcibly aborted.
const SHUTDOWN_GRACE_PERIOD: std::time::Duration = std::time::Duration::from_secs(2);

pub async fn run(config: Config) -> anyhow::Result<()> {
    let socket_path = config.paths.socket_path.clone();
    let listener = bind_socket(&socket_path)?;
    info!(path = %socket_path.display(), "listening");

    let bus = build_services(&config);
    let shutdown = Arc::new(Notify::new());
    let dispatcher = Arc::new(Dispatcher::new(bus, Arc::clone(&shutdown)));

    let mut connections: JoinSet<()> = JoinSet::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let dispatcher = Arc::clone(&dispatcher);
                        connections.spawn(async move {
                            if let Err(e) = handle_connection(stream, dispatcher).await {
                                warn!("connection error: {e}");
                            }
                        });
                    }
                    Err(e) => error!("accept failed: {e}"),
                }
            }
            _ = shutdown.notified() => {
                info!("shutdown requested over RPC");
                break;
            }
            _ = sigterm.recv() => {
                info!("SIGTERM received");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT received");
                break;
            }
        }
    }

    info!("draining in-flight connections");
    tokio::select! {
        _ = drain(&mut connections) => {}
        _ = tokio::time::sleep(SHUTDOWN_GRACE_PERIOD) => {
            warn!("grace period elapsed, aborting remaining connections");
            connections.abort_all();
            drain(&mut connections).await;
        }
    }

    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

async fn drain(connections: &mut JoinSet<()>) {
    while connections.join_next().await.is_some() {}
}

/// Binds the Unix socket, clearing a stale file left behind by a daemon
/// that died without cleaning up. A file at `path` is only removed after
/// confirming nothing is listening on it.
fn bind_socket(path: &Path) -> anyhow::Result<UnixListener> {
    if path.exists() {
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            anyhow::bail!("another daemon is already listening on {}", path.display());
        }
        debug!(path = %path.display(), "removing stale socket file");
        std::fs::remove_file(path)?;
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(listener)
}

async fn handle_connection(mut stream: UnixStream, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let mut buf = vec![0u8; MAX_REQUEST_BYTES];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Ok(());
    }

    let response = match rpc::decode(&buf[..n]) {
        Decoded::Ok(request) => {
            if request.is_notification() {
                dispatcher.dispatch(&request).await;
                return Ok(());
            }
            dispatcher.dispatch(&request).await
        }
        Decoded::ParseError => Response::failure(None, -32700, "Parse error", None),
        Decoded::InvalidEnvelope(msg) => Response::failure(None, -32600, format!("Invalid Request: {msg}"), None),
    };

    let bytes = rpc::encode(&response);
    stream.write_all(&bytes).await?;
    stream.shutdown().await?;
    Ok(())
}

/// Wires the capture service, ASR adapter, clipboard, notifier, and optional
/// LLM refiner into one command bus, per the loaded configuration.
fn build_services(config: &Config) -> Arc<CommandBus> {
    let input = Arc::new(CpalAudioInput::new(config.audio.clone()));
    let asr = Arc::new(AsrAdapter::new(config.asr.clone(), config.audio.sample_rate, Box::new(StubAsr)));
    let capture = Arc::new(CaptureService::new(
        input,
        config.audio.clone(),
        config.vad.clone(),
        config.asr.clone(),
        asr,
    ));

    let llm: Option<Arc<dyn dictate_core::llm::Refiner>> = if config.llm.api_key.is_some() {
        match LlmRefiner::new(config.llm.clone()) {
            Ok(refiner) => Some(Arc::new(refiner)),
            Err(e) => {
                warn!("LLM refiner disabled, failed to construct: {e}");
                None
            }
        }
    } else {
        None
    };

    let clipboard = Arc::new(LinuxClipboard::detect());
    let notifier = Arc::new(LinuxNotifier);

    Arc::new(CommandBus::new(capture, llm, clipboard, notifier))
}
