//! Local TCP bridge to the control service.
//!
//! Length-prefixed JSON-RPC 2.0 over `127.0.0.1`, for client apps that would
//! rather keep one socket open than poll the HTTP routes.
//!
//! - **Server**: runs inside the engine process, one session per socket
//! - **Client**: used by client apps to call the engine
//! - **Protocol**: framing and JSON-RPC types shared by both

pub mod client;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::{IpcError, IpcRequest, IpcResponse};
pub use server::{IpcServer, IpcServerHandle};
