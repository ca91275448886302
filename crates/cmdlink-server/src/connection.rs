//! Per-connection protocol driver.
//!
//! Each accepted stream runs through here: the handshake gate first, then
//! the request loop with its strict ACK-before-response ordering. Nothing
//! in this module executes handler code; requests go out through the
//! server callback and responses come back over a oneshot channel.

use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use cmdlink_proto::{
    decode_request, encode_response, read_handshake, read_message, write_ack, write_handshake,
    write_message, CommandResponse, WireError, PROTOCOL_VERSION,
};

use crate::bridge::{CommandCallback, Responder};

pub(crate) struct ConnContext {
    pub conn_id: u64,
    pub callback: CommandCallback,
    pub handshake_timeout: Duration,
    pub shutdown: CancellationToken,
}

/// Drive one accepted connection until it closes.
pub(crate) async fn serve(mut stream: UnixStream, ctx: ConnContext) {
    match gate(&mut stream, &ctx).await {
        Gate::Accepted => request_loop(&mut stream, &ctx).await,
        Gate::Rejected => {}
    }
}

enum Gate {
    Accepted,
    Rejected,
}

/// Handshake gate. The client speaks first; we echo our own frame only
/// once the magic checks out.
///
/// Wrong magic closes the connection without a reply: the peer is not
/// speaking this protocol at all. A wrong version still gets our frame
/// back before the close, so the peer can name both versions in its
/// error.
async fn gate(stream: &mut UnixStream, ctx: &ConnContext) -> Gate {
    let client_version =
        match tokio::time::timeout(ctx.handshake_timeout, read_handshake(stream)).await {
            Err(_) => {
                warn!(conn = ctx.conn_id, "handshake timed out");
                return Gate::Rejected;
            }
            Ok(Err(WireError::InvalidMagic { got, .. })) => {
                warn!(conn = ctx.conn_id, ?got, "rejecting connection with foreign magic");
                return Gate::Rejected;
            }
            Ok(Err(err)) => {
                debug!(conn = ctx.conn_id, %err, "connection lost during handshake");
                return Gate::Rejected;
            }
            Ok(Ok(version)) => version,
        };

    if client_version != PROTOCOL_VERSION {
        if let Err(err) = write_handshake(stream).await {
            debug!(conn = ctx.conn_id, %err, "failed to answer mismatched handshake");
        }
        warn!(
            conn = ctx.conn_id,
            client = client_version,
            server = PROTOCOL_VERSION,
            "rejecting connection with mismatched protocol version"
        );
        return Gate::Rejected;
    }

    if let Err(err) = write_handshake(stream).await {
        debug!(conn = ctx.conn_id, %err, "failed to answer handshake");
        return Gate::Rejected;
    }
    debug!(conn = ctx.conn_id, "handshake complete");
    Gate::Accepted
}

/// Serve request/response exchanges until the client disconnects, the
/// server shuts down, or the connection misbehaves.
async fn request_loop(stream: &mut UnixStream, ctx: &ConnContext) {
    loop {
        let payload = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => {
                debug!(conn = ctx.conn_id, "server shutting down; closing connection");
                return;
            }
            read = read_message(stream) => match read {
                Ok(payload) => payload,
                Err(WireError::ConnectionClosed { clean: true }) => {
                    debug!(conn = ctx.conn_id, "client disconnected");
                    return;
                }
                Err(err) => {
                    warn!(conn = ctx.conn_id, %err, "dropping connection after read error");
                    return;
                }
            }
        };

        let request = match decode_request(&payload) {
            Ok(request) => request,
            Err(err) => {
                warn!(conn = ctx.conn_id, %err, "dropping connection after malformed request");
                return;
            }
        };
        let command = request.command.clone();
        debug!(conn = ctx.conn_id, command = %command, "received command");

        // Hand the request off before acknowledging: the ACK promises the
        // request has been accepted for execution, not merely read.
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        (ctx.callback)(request, cancel.clone(), Responder::new(tx));

        if let Err(err) = write_ack(stream).await {
            warn!(conn = ctx.conn_id, command = %command, %err, "failed to write ack");
            cancel.cancel();
            return;
        }

        let Some(response) = await_response(stream, ctx, &command, rx, &cancel).await else {
            return;
        };

        // Settle the token before the response leaves, so a handler that
        // checks it after responding sees a consistent state.
        cancel.cancel();

        if let Err(err) = write_response(stream, &command, &response).await {
            warn!(conn = ctx.conn_id, command = %command, %err, "failed to write response");
            return;
        }
        debug!(
            conn = ctx.conn_id,
            command = %command,
            success = response.success,
            "response sent"
        );
    }
}

/// Wait for the host's response while watching the stream for the client
/// going away.
///
/// Readable bytes mid-command are themselves a protocol violation (the
/// client must not pipeline), so any probe outcome ends the connection:
/// EOF is a clean disconnect, data is a violation, an error is a dead
/// peer. All three cancel the command's token. `None` means the
/// connection is done.
async fn await_response(
    stream: &mut UnixStream,
    ctx: &ConnContext,
    command: &str,
    rx: oneshot::Receiver<CommandResponse>,
    cancel: &CancellationToken,
) -> Option<CommandResponse> {
    let mut probe = [0u8; 1];
    tokio::select! {
        biased;
        outcome = rx => Some(match outcome {
            Ok(response) => response,
            Err(_) => {
                warn!(conn = ctx.conn_id, command, "responder dropped without a response");
                CommandResponse::failure(format!(
                    "Command '{command}' was dropped before producing a response"
                ))
            }
        }),
        read = stream.read(&mut probe) => {
            match read {
                Ok(0) => debug!(conn = ctx.conn_id, command, "client disconnected mid-command"),
                Ok(_) => warn!(
                    conn = ctx.conn_id,
                    command,
                    "client sent data before the pending response; closing"
                ),
                Err(err) => debug!(conn = ctx.conn_id, command, %err, "connection lost mid-command"),
            }
            cancel.cancel();
            None
        }
    }
}

/// Encode and write the response, substituting a synthesized failure when
/// the handler's data blows the message cap. Closing the connection here
/// would look like a transport fault to the client; a failure response
/// tells it what actually happened.
async fn write_response(
    stream: &mut UnixStream,
    command: &str,
    response: &CommandResponse,
) -> cmdlink_proto::Result<()> {
    let payload = match encode_response(response) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(command, %err, "response exceeds the message cap; sending failure instead");
            let fallback = CommandResponse::failure(format!(
                "Command '{command}' produced a response exceeding the 1 MiB message cap"
            ));
            encode_response(&fallback)?
        }
    };
    write_message(stream, &payload).await
}
