//! Host-side command channel: socket lifecycle, accept loop, dispatch,
//! and the bridge that moves command execution onto the host's main loop.
//!
//! The intended wiring:
//!
//! ```text
//! CommandServer  ──(CommandCallback)──▶  MainLoopBridge  ──drain()──▶  Dispatcher
//!   (runtime)                              (queue)         (host tick)   (handlers)
//! ```
//!
//! Connection tasks decode requests and park them on the bridge; the host
//! calls [`MainLoopBridge::drain`] from its own tick so handlers always
//! run on the host thread. The transport layer is Unix-only; dispatch and
//! the bridge compile everywhere so handler code stays portable.

pub mod bridge;
pub mod dispatch;
pub mod error;

#[cfg(unix)]
mod connection;
#[cfg(unix)]
pub mod server;
#[cfg(unix)]
pub mod socket;

pub use bridge::{CommandCallback, MainLoopBridge, PendingCommand, Responder};
pub use dispatch::{
    CommandContext, CommandFailure, CommandHandler, CommandOutput, CommandValue, Dispatcher,
    HandlerResult,
};
pub use error::{Result, ServerError};
#[cfg(unix)]
pub use server::{CommandServer, ServerConfig};
#[cfg(unix)]
pub use socket::ChannelSocket;
