//! Hand-off between the I/O runtime and the host's main loop.
//!
//! Connection tasks enqueue decoded requests here; the host drains the
//! queue from its own tick (main/UI thread) and the computed responses
//! travel back to the waiting connection tasks over oneshot channels.
//! Handler code therefore always runs on the host's thread, never on
//! the runtime.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cmdlink_proto::{CommandRequest, CommandResponse};

use crate::dispatch::Dispatcher;

/// One-shot reply path back to the connection task that accepted the
/// request. Sending consumes the responder; dropping it unanswered makes
/// the server synthesize a failure response for the client.
#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<CommandResponse>,
}

impl Responder {
    pub fn new(tx: oneshot::Sender<CommandResponse>) -> Self {
        Self { tx }
    }

    /// Deliver the response. Returns it back if the connection task has
    /// already gone away (client disconnected mid-command).
    pub fn send(self, response: CommandResponse) -> Result<(), CommandResponse> {
        self.tx.send(response)
    }
}

/// Invoked by the server once per decoded request, before the ACK is
/// written. Implementations must not block: the intended shape is a
/// cheap enqueue such as [`MainLoopBridge::callback`].
pub type CommandCallback = Arc<dyn Fn(CommandRequest, CancellationToken, Responder) + Send + Sync>;

/// A request parked between runtime receipt and main-loop execution.
pub struct PendingCommand {
    pub request: CommandRequest,
    pub cancel: CancellationToken,
    pub responder: Responder,
}

/// Thread-safe FIFO queue carrying commands from connection tasks to the
/// host tick. Cloning shares the queue.
#[derive(Clone, Default)]
pub struct MainLoopBridge {
    queue: Arc<Mutex<VecDeque<PendingCommand>>>,
}

impl MainLoopBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park one command for the next drain.
    pub fn enqueue(&self, pending: PendingCommand) {
        // A poisoned lock only means another thread panicked mid-push;
        // the VecDeque itself is still structurally sound.
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.push_back(pending);
    }

    /// Commands currently parked.
    pub fn len(&self) -> usize {
        let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The server-side callback that parks every request on this bridge.
    pub fn callback(&self) -> CommandCallback {
        let bridge = self.clone();
        Arc::new(move |request, cancel, responder| {
            debug!(command = %request.command, "queueing command for main loop");
            bridge.enqueue(PendingCommand {
                request,
                cancel,
                responder,
            });
        })
    }

    /// Execute everything parked at the moment of the call, in arrival
    /// order, on the calling thread. Returns how many commands ran.
    ///
    /// Commands enqueued while a drain is running wait for the next
    /// tick; a handler that triggers another command cannot livelock the
    /// host.
    pub fn drain(&self, dispatcher: &Dispatcher) -> usize {
        let batch = {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *queue)
        };

        let count = batch.len();
        for pending in batch {
            let response = dispatcher.dispatch(&pending.request, &pending.cancel);
            if let Err(unsent) = pending.responder.send(response) {
                debug!(
                    command = %pending.request.command,
                    success = unsent.success,
                    "client gone before response could be delivered"
                );
            }
        }
        count
    }
}

impl std::fmt::Debug for MainLoopBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainLoopBridge")
            .field("queued", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{CommandContext, CommandHandler, CommandOutput, CommandValue, HandlerResult};
    use serde_json::json;

    struct EchoBack;

    impl CommandHandler for EchoBack {
        fn name(&self) -> &str {
            "EchoBack"
        }
        fn description(&self) -> &str {
            "returns its payload"
        }
        fn execute(&self, ctx: CommandContext<'_>) -> HandlerResult {
            Ok(CommandOutput::Value(CommandValue::json(json!(
                ctx.request.data
            ))))
        }
    }

    fn park(bridge: &MainLoopBridge, data: &str) -> oneshot::Receiver<CommandResponse> {
        let (tx, rx) = oneshot::channel();
        bridge.enqueue(PendingCommand {
            request: CommandRequest::new("EchoBack", data),
            cancel: CancellationToken::new(),
            responder: Responder::new(tx),
        });
        rx
    }

    #[test]
    fn drain_runs_commands_in_arrival_order() {
        let bridge = MainLoopBridge::new();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EchoBack);

        let first = park(&bridge, "one");
        let second = park(&bridge, "two");
        let third = park(&bridge, "three");
        assert_eq!(bridge.len(), 3);

        assert_eq!(bridge.drain(&dispatcher), 3);
        assert!(bridge.is_empty());

        // Oneshot receipt order mirrors dispatch order.
        for (rx, expected) in [(first, "\"one\""), (second, "\"two\""), (third, "\"three\"")] {
            let response = rx.blocking_recv().unwrap();
            assert!(response.success);
            assert_eq!(response.data, expected);
        }
    }

    #[test]
    fn drain_on_empty_queue_is_zero() {
        let bridge = MainLoopBridge::new();
        let dispatcher = Dispatcher::new();
        assert_eq!(bridge.drain(&dispatcher), 0);
    }

    #[test]
    fn dropped_receiver_does_not_abort_the_batch() {
        let bridge = MainLoopBridge::new();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EchoBack);

        let gone = park(&bridge, "lost");
        drop(gone);
        let kept = park(&bridge, "kept");

        assert_eq!(bridge.drain(&dispatcher), 2);
        let response = kept.blocking_recv().unwrap();
        assert_eq!(response.data, "\"kept\"");
    }

    #[test]
    fn callback_enqueues_onto_the_shared_queue() {
        let bridge = MainLoopBridge::new();
        let callback = bridge.callback();

        let (tx, rx) = oneshot::channel();
        callback(
            CommandRequest::new("EchoBack", "via-callback"),
            CancellationToken::new(),
            Responder::new(tx),
        );
        assert_eq!(bridge.len(), 1);

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(EchoBack);
        bridge.drain(&dispatcher);
        assert_eq!(rx.blocking_recv().unwrap().data, "\"via-callback\"");
    }

    #[test]
    fn commands_enqueued_mid_drain_wait_for_the_next_tick() {
        struct Reenqueue {
            bridge: MainLoopBridge,
        }

        impl CommandHandler for Reenqueue {
            fn name(&self) -> &str {
                "Reenqueue"
            }
            fn description(&self) -> &str {
                "enqueues a follow-up command"
            }
            fn execute(&self, _ctx: CommandContext<'_>) -> HandlerResult {
                let (tx, _rx) = oneshot::channel();
                self.bridge.enqueue(PendingCommand {
                    request: CommandRequest::new("Reenqueue", ""),
                    cancel: CancellationToken::new(),
                    responder: Responder::new(tx),
                });
                Ok(CommandOutput::Done)
            }
        }

        let bridge = MainLoopBridge::new();
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Reenqueue {
            bridge: bridge.clone(),
        });

        let (tx, _rx) = oneshot::channel();
        bridge.enqueue(PendingCommand {
            request: CommandRequest::new("Reenqueue", ""),
            cancel: CancellationToken::new(),
            responder: Responder::new(tx),
        });

        // First drain runs exactly the one parked command; its follow-up
        // lands in the queue for the next tick.
        assert_eq!(bridge.drain(&dispatcher), 1);
        assert_eq!(bridge.len(), 1);
        assert_eq!(bridge.drain(&dispatcher), 1);
    }

    #[test]
    fn responder_send_reports_gone_receiver() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        let responder = Responder::new(tx);
        let response = CommandResponse::success_unit("X");
        assert!(responder.send(response).is_err());
    }
}
