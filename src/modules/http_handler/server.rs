//! HTTP listener for shared entries.

use super::client_ip::ClientIpResolver;
use super::dispatcher::{text_response, Dispatcher};
use super::error::{HttpError, HttpResult};
use super::ResponseBody;
use crate::modules::access_control::AccessGate;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

struct ServerState {
    gate: AccessGate,
    dispatcher: Dispatcher,
    client_ip: ClientIpResolver,
}

/// Serves entries by name: `GET /<name>`.
///
/// Every denial, unknown name and internal failure answers 404 so a
/// requester cannot tell them apart.
pub struct HttpServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("addr", &self.addr)
            .field("local_addr", &self.local_addr)
            .field("gate", &self.state.gate)
            .finish_non_exhaustive()
    }
}

impl HttpServer {
    /// Create a server that will listen on `addr`.
    #[must_use]
    pub fn new(
        addr: SocketAddr,
        gate: AccessGate,
        dispatcher: Dispatcher,
        client_ip: ClientIpResolver,
    ) -> Self {
        Self {
            addr,
            state: Arc::new(ServerState {
                gate,
                dispatcher,
                client_ip,
            }),
            shutdown_tx: None,
            local_addr: None,
        }
    }

    /// Bind and start accepting connections. Returns the bound address.
    pub async fn start(&mut self) -> HttpResult<SocketAddr> {
        if self.shutdown_tx.is_some() {
            return Err(HttpError::AlreadyRunning);
        }

        let listener = TcpListener::bind(self.addr)
            .await
            .map_err(|source| HttpError::Bind {
                addr: self.addr,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "HTTP server listening");

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, peer)) => {
                                debug!(%peer, "New connection");

                                let state = Arc::clone(&state);

                                tokio::spawn(async move {
                                    let io = TokioIo::new(stream);

                                    let service = service_fn(move |req| {
                                        let state = Arc::clone(&state);
                                        async move { handle_request(req, peer, &state).await }
                                    });

                                    if let Err(e) = http1::Builder::new()
                                        .serve_connection(io, service)
                                        .await
                                    {
                                        debug!("Connection error: {e}");
                                    }
                                });
                            }
                            Err(e) => {
                                error!("Accept error: {e}");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("HTTP server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Stop accepting connections.
    pub async fn stop(&mut self) -> HttpResult<()> {
        self.local_addr = None;
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
            Ok(())
        } else {
            Err(HttpError::NotRunning)
        }
    }

    /// Check if the server is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// The bound address while running.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// The gate requests go through.
    #[must_use]
    pub fn gate(&self) -> &AccessGate {
        &self.state.gate
    }
}

fn not_found() -> Response<ResponseBody> {
    text_response(StatusCode::NOT_FOUND, "Not Found")
}

/// Entry name addressed by a request path.
fn entry_name(path: &str) -> &str {
    path.trim_matches('/')
}

async fn handle_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    state: &ServerState,
) -> Result<Response<ResponseBody>, Infallible> {
    let name = entry_name(req.uri().path()).to_string();
    let ip = state.client_ip.resolve(peer.ip(), req.headers());

    if name.is_empty() {
        return Ok(not_found());
    }

    let entry = match state.gate.access(&name, ip).await {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            info!(name, %ip, "Denied access");
            return Ok(not_found());
        },
        Err(e) => {
            error!(name, %ip, "Access check failed: {e}");
            return Ok(not_found());
        },
    };

    info!(name, %ip, "Granted access");
    Ok(state.dispatcher.dispatch(&entry, req, ip).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name() {
        assert_eq!(entry_name("/report"), "report");
        assert_eq!(entry_name("/report/"), "report");
        assert_eq!(entry_name("//a.b//"), "a.b");
        assert_eq!(entry_name("/"), "");
    }

    #[tokio::test]
    async fn test_start_stop() {
        use crate::modules::access_control::LookupContext;
        use crate::modules::entry_store::MemoryStore;

        let gate = AccessGate::new(Arc::new(MemoryStore::new()), LookupContext::new());
        let mut server = HttpServer::new(
            "127.0.0.1:0".parse().unwrap(),
            gate,
            Dispatcher::new("/nonexistent"),
            ClientIpResolver::default(),
        );

        assert!(!server.is_running());
        let addr = server.start().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(server.is_running());
        assert!(matches!(server.start().await, Err(HttpError::AlreadyRunning)));

        server.stop().await.unwrap();
        assert!(!server.is_running());
        assert!(matches!(server.stop().await, Err(HttpError::NotRunning)));
    }
}
