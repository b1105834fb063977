//! TCP IPC server for the engine process.
//!
//! One socket is one client session. The server remembers which apps a
//! session connected; if the socket closes while some are still connected,
//! those apps are disconnected on the client's behalf so a crashed client
//! cannot keep the engine alive. Once the engine terminates the listener is
//! closed and no new sessions are admitted.

use super::protocol::{read_frame, write_frame, IpcRequest, IpcResponse};
use crate::config::IpcConfig;
use crate::dispatch::{app_id_param, dispatch};
use crate::error::Result;
use crate::models::Lifecycle;
use crate::service::ControlService;
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// JSON-RPC server error sent to a socket refused at capacity.
const AT_CAPACITY: i32 = -32000;

/// Handle to a running IPC server. Dropping it stops the server.
pub struct IpcServerHandle {
    addr: SocketAddr,
    stop_tx: watch::Sender<bool>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl IpcServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting and close every session.
    ///
    /// Apps connected through a stopped session stay in the ledger; the
    /// process is going away and they did not leave.
    pub fn shutdown(&mut self) {
        let _ = self.stop_tx.send(true);
    }
}

impl Drop for IpcServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The client closed the socket or the transport failed.
    PeerGone,
    /// The server was told to stop.
    Stopped,
}

/// Apps connected through one socket.
#[derive(Debug)]
struct Session {
    peer: SocketAddr,
    apps: BTreeSet<String>,
}

impl Session {
    fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            apps: BTreeSet::new(),
        }
    }

    /// Track membership after a successful call.
    fn record(&mut self, method: &str, app_id: Option<String>) {
        let Some(app_id) = app_id else {
            return;
        };
        match method {
            "connect_app" => {
                self.apps.insert(app_id);
            }
            "disconnect_app" => {
                self.apps.remove(&app_id);
            }
            _ => {}
        }
    }
}

/// IPC server bound to one control service.
pub struct IpcServer {
    service: ControlService,
    sessions: Arc<Semaphore>,
}

impl IpcServer {
    /// Start on an OS-assigned loopback port.
    pub async fn start(service: ControlService) -> Result<IpcServerHandle> {
        Self::bind(service, SocketAddr::from(([127, 0, 0, 1], 0))).await
    }

    /// Start on a specific address.
    pub async fn bind(service: ControlService, addr: SocketAddr) -> Result<IpcServerHandle> {
        Self::listen(service, addr, IpcConfig::MAX_CONNECTIONS).await
    }

    async fn listen(
        service: ControlService,
        addr: SocketAddr,
        capacity: usize,
    ) -> Result<IpcServerHandle> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        info!("IPC server listening on {}", addr);

        let (stop_tx, stop_rx) = watch::channel(false);
        let server = Arc::new(Self {
            service,
            sessions: Arc::new(Semaphore::new(capacity)),
        });
        let task = tokio::spawn(server.accept_loop(listener, stop_rx));

        Ok(IpcServerHandle {
            addr,
            stop_tx,
            task: Some(task),
        })
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener, mut stop_rx: watch::Receiver<bool>) {
        let mut lifecycle = self.service.subscribe();
        if *lifecycle.borrow_and_update() == Lifecycle::Terminated {
            info!("Engine already terminated; IPC server not accepting");
            return;
        }

        loop {
            tokio::select! {
                _ = stop_rx.changed() => {
                    info!("IPC server stopping");
                    break;
                }
                changed = lifecycle.changed() => {
                    if changed.is_err() || *lifecycle.borrow_and_update() == Lifecycle::Terminated {
                        info!("Engine terminated; IPC server closing listener");
                        break;
                    }
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer, stop_rx.clone()),
                    Err(e) => error!("IPC accept error: {}", e),
                }
            }
        }
    }

    fn admit(self: &Arc<Self>, stream: TcpStream, peer: SocketAddr, mut stop_rx: watch::Receiver<bool>) {
        let Ok(permit) = self.sessions.clone().try_acquire_owned() else {
            warn!("Refusing IPC session from {}: server at capacity", peer);
            tokio::spawn(refuse(stream));
            return;
        };

        let server = self.clone();
        tokio::spawn(async move {
            debug!("IPC session opened by {}", peer);
            let mut session = Session::new(peer);
            let end = match server.serve(stream, &mut session, &mut stop_rx).await {
                Ok(end) => end,
                Err(e) => {
                    debug!("IPC session {} failed: {}", peer, e);
                    SessionEnd::PeerGone
                }
            };
            if end == SessionEnd::PeerGone {
                server.release(session).await;
            }
            drop(permit);
        });
    }

    async fn serve(
        &self,
        mut stream: TcpStream,
        session: &mut Session,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd> {
        let (mut reader, mut writer) = stream.split();
        loop {
            let frame = tokio::select! {
                read = read_frame(&mut reader) => match read? {
                    Some(frame) => frame,
                    None => return Ok(SessionEnd::PeerGone),
                },
                _ = stop_rx.changed() => return Ok(SessionEnd::Stopped),
            };

            let response = self.answer(&frame, session).await;
            write_frame(&mut writer, &serde_json::to_vec(&response)?).await?;
        }
    }

    async fn answer(&self, frame: &[u8], session: &mut Session) -> IpcResponse {
        let request: IpcRequest = match serde_json::from_slice(frame) {
            Ok(request) => request,
            Err(e) => return IpcResponse::error(None, -32700, format!("Parse error: {}", e)),
        };
        if request.jsonrpc != "2.0" {
            return IpcResponse::error(
                request.id,
                -32600,
                "Invalid Request: expected jsonrpc 2.0".to_string(),
            );
        }

        let params = request
            .params
            .unwrap_or_else(|| Value::Object(Default::default()));
        let app_id = app_id_param(&params).map(str::to_string);

        match dispatch(&self.service, &request.method, params).await {
            Ok(result) => {
                session.record(&request.method, app_id);
                IpcResponse::success(request.id, result)
            }
            Err(e) => {
                debug!("IPC call {} from {} failed: {}", request.method, session.peer, e);
                IpcResponse::from_error(request.id, &e)
            }
        }
    }

    /// Disconnect apps a closed session left behind.
    async fn release(&self, session: Session) {
        for app_id in &session.apps {
            warn!(
                "IPC session {} closed while {} was connected; disconnecting it",
                session.peer, app_id
            );
            self.service.disconnect_app(app_id).await;
        }
    }
}

async fn refuse(mut stream: TcpStream) {
    let response = IpcResponse::error(
        None,
        AT_CAPACITY,
        format!("IPC server at capacity ({} sessions)", IpcConfig::MAX_CONNECTIONS),
    );
    if let Ok(bytes) = serde_json::to_vec(&response) {
        let (_, mut writer) = stream.split();
        let _ = write_frame(&mut writer, &bytes).await;
    }
}
