//! Client side of the cmdlink command channel.
//!
//! [`CommandClient`] is a single-use connection: connect (with the
//! handshake) once, then send commands sequentially. Each send is
//! two-phase: the request write and ACK wait run on the caller's
//! timeout, the response wait runs on the handler's clock and answers
//! only to a cancellation token.
//!
//! [`send_with_retry`] layers policy on top: fresh client per attempt,
//! fixed-delay retries, and an optional [`HostLauncher`] to start the
//! host application when nothing is listening.

pub mod client;
pub mod error;
pub mod retry;

pub use client::CommandClient;
pub use error::{ClientError, Result};
pub use retry::{send_with_retry, HostLauncher, RetryPolicy};
