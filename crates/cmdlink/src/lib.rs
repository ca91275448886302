//! Drive a long-running host application over a local command channel.
//!
//! cmdlink lets a short-lived CLI invoke named, typed commands inside a
//! long-running host process (typically a graphical editor) over a Unix
//! domain socket, with acknowledged delivery and main-loop execution.
//!
//! # Crate Structure
//!
//! - [`proto`]: wire protocol (handshake, length-prefixed JSON frames,
//!   the ACK byte, channel addressing)
//! - [`client`]: single-use transport client and the retry/launch
//!   orchestrator
//! - [`server`]: host-side server, main-loop bridge, and command
//!   dispatch

/// Re-export wire protocol types.
pub mod proto {
    pub use cmdlink_proto::*;
}

/// Re-export client types.
pub mod client {
    pub use cmdlink_client::*;
}

/// Re-export server types.
pub mod server {
    pub use cmdlink_server::*;
}
