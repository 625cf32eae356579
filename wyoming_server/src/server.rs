// Listener, accept loop and per-connection event loop

use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio_util::codec::Framed;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Endpoint;
use crate::error::ServerError;
use crate::handler::{EventHandler, SynthesisContext};
use crate::protocol::WyomingCodec;

#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix { listener: UnixListener, path: PathBuf },
}

/// An accepted client stream.
pub enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Listener {
    pub async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => Ok(Listener::Tcp(TcpListener::bind(addr.as_str()).await?)),
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                remove_stale_socket(path)?;
                let listener = UnixListener::bind(path)?;
                Ok(Listener::Unix {
                    listener,
                    path: path.clone(),
                })
            }
        }
    }

    /// The bound endpoint, with the real port when `:0` was requested.
    pub fn local_endpoint(&self) -> io::Result<Endpoint> {
        match self {
            Listener::Tcp(listener) => Ok(Endpoint::Tcp(listener.local_addr()?.to_string())),
            #[cfg(unix)]
            Listener::Unix { path, .. } => Ok(Endpoint::Unix(path.clone())),
        }
    }

    pub async fn accept(&self) -> io::Result<(Connection, String)> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Failed to set TCP_NODELAY: {e}");
                }
                Ok((Connection::Tcp(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Listener::Unix { listener, path } => {
                let (stream, _) = listener.accept().await?;
                Ok((Connection::Unix(stream), path.display().to_string()))
            }
        }
    }
}

#[cfg(unix)]
impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            if let Err(e) = std::fs::remove_file(&*path) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove socket {}: {e}", path.display());
                }
            }
        }
    }
}

/// A socket file left behind by a previous run; regular files are never
/// touched.
#[cfg(unix)]
fn remove_stale_socket(path: &std::path::Path) -> io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} exists and is not a socket", path.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Read events from one client until it disconnects, answering each in turn.
pub async fn serve_connection<T>(io: T, handler: EventHandler) -> Result<(), ServerError>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let _active = handler.metrics().connection_opened();
    let mut framed = Framed::new(io, WyomingCodec::new());
    while let Some(event) = framed.next().await {
        handler.handle_event(event?, &mut framed).await?;
    }
    Ok(())
}

fn spawn_connection(connection: Connection, peer: String, ctx: Arc<SynthesisContext>) {
    let span = info_span!("connection", id = %Uuid::new_v4(), peer = %peer);
    tokio::spawn(
        async move {
            debug!("Client connected");
            let handler = EventHandler::new(ctx);
            let result = match connection {
                Connection::Tcp(stream) => serve_connection(stream, handler).await,
                #[cfg(unix)]
                Connection::Unix(stream) => serve_connection(stream, handler).await,
            };
            match result {
                Ok(()) => debug!("Client disconnected"),
                Err(e) => warn!("Connection closed: {e}"),
            }
        }
        .instrument(span),
    );
}

/// Accept clients until `shutdown` resolves. Each connection runs on its
/// own task; synthesis across all of them is serialised by the model lock.
pub async fn run_until<F>(listener: Listener, ctx: Arc<SynthesisContext>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping server");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((connection, peer)) => spawn_connection(connection, peer, Arc::clone(&ctx)),
                Err(e) => {
                    warn!("Failed to accept connection: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
        }
    }
}

/// Wait for shutdown signal (SIGINT or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
