//! Demo host: a stand-in for the long-running application. Serves a
//! channel with a few handlers and drains the bridge from a plain thread
//! the way an editor would from its frame loop.

use crate::cmd::ServeArgs;
use crate::exit::CliResult;

#[cfg(unix)]
pub async fn run(args: ServeArgs) -> CliResult<i32> {
    unix::run(args).await
}

#[cfg(not(unix))]
pub async fn run(_args: ServeArgs) -> CliResult<i32> {
    Err(crate::exit::CliError::new(
        crate::exit::INTERNAL,
        "command channels require Unix domain sockets on this platform",
    ))
}

#[cfg(unix)]
mod unix {
    use std::time::{Duration, Instant};

    use serde::Deserialize;
    use tracing::{info, warn};

    use cmdlink_server::{
        CommandContext, CommandFailure, CommandHandler, CommandOutput, CommandServer, CommandValue,
        Dispatcher, HandlerResult, MainLoopBridge,
    };

    use crate::cmd::{parse_duration, ServeArgs};
    use crate::exit::{server_error, CliResult, SUCCESS};

    pub async fn run(args: ServeArgs) -> CliResult<i32> {
        let tick = parse_duration(&args.tick)?.max(Duration::from_millis(1));

        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Echo);
        dispatcher.register(Ping);
        dispatcher.register(Sleep);

        let bridge = MainLoopBridge::new();
        let server = CommandServer::bind(&args.channel, bridge.callback())
            .map_err(|err| server_error("serve failed", err))?;
        let shutdown = server.shutdown_token();
        info!(
            channel = %args.channel,
            path = %server.local_path().display(),
            "demo host ready"
        );

        let tick_bridge = bridge.clone();
        let tick_stop = shutdown.clone();
        let ticker = std::thread::spawn(move || {
            while !tick_stop.is_cancelled() {
                tick_bridge.drain(&dispatcher);
                std::thread::sleep(tick);
            }
            // Answer anything still parked instead of dropping it.
            tick_bridge.drain(&dispatcher);
        });

        let server_task = tokio::spawn(server.run());

        wait_for_shutdown_signal().await;
        info!("shutting down");
        shutdown.cancel();

        let _ = server_task.await;
        let _ = ticker.join();
        Ok(SUCCESS)
    }

    async fn wait_for_shutdown_signal() {
        use tokio::signal::unix::{signal, SignalKind};

        let ctrl_c = tokio::signal::ctrl_c();
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "could not install SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    /// Returns the request payload parsed as JSON.
    struct Echo;

    impl CommandHandler for Echo {
        fn name(&self) -> &str {
            "Echo"
        }
        fn description(&self) -> &str {
            "Return the request payload parsed as JSON"
        }
        fn execute(&self, ctx: CommandContext<'_>) -> HandlerResult {
            let value: serde_json::Value = serde_json::from_str(&ctx.request.data)
                .map_err(|err| CommandFailure::declared(format!("payload is not JSON: {err}")))?;
            Ok(CommandOutput::Value(CommandValue::json(value)))
        }
    }

    struct Ping;

    impl CommandHandler for Ping {
        fn name(&self) -> &str {
            "Ping"
        }
        fn description(&self) -> &str {
            "Liveness probe"
        }
        fn execute(&self, _ctx: CommandContext<'_>) -> HandlerResult {
            Ok(CommandOutput::Value(
                CommandValue::json(serde_json::Value::String("pong".to_string())).with_text("pong"),
            ))
        }
    }

    /// Sleeps in short slices so a disconnecting client cancels the wait.
    struct Sleep;

    impl CommandHandler for Sleep {
        fn name(&self) -> &str {
            "Sleep"
        }
        fn description(&self) -> &str {
            "Sleep for {\"millis\": n}, observing cancellation"
        }
        fn execute(&self, ctx: CommandContext<'_>) -> HandlerResult {
            #[derive(Deserialize)]
            struct Payload {
                millis: u64,
            }

            let payload: Payload = serde_json::from_str(&ctx.request.data)
                .map_err(|err| CommandFailure::declared(format!("payload is not JSON: {err}")))?;

            let deadline = Instant::now() + Duration::from_millis(payload.millis);
            loop {
                if ctx.cancel.is_cancelled() {
                    return Err(CommandFailure::declared("sleep cancelled"));
                }
                let now = Instant::now();
                if now >= deadline {
                    return Ok(CommandOutput::Done);
                }
                std::thread::sleep((deadline - now).min(Duration::from_millis(10)));
            }
        }
    }

}
