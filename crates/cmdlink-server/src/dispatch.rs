//! Command dispatch: name → handler lookup and the three-outcome result
//! mapping (success, declared failure, fault).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use cmdlink_proto::{CommandRequest, CommandResponse, PayloadFormat};

/// Everything a handler gets to see for one invocation.
pub struct CommandContext<'a> {
    /// The raw request; `request.data` is the handler's payload.
    pub request: &'a CommandRequest,
    /// Fires when the issuing client disconnects (and, for plumbing
    /// determinism, right before the response is written). Long-running
    /// handlers should observe it.
    pub cancel: &'a CancellationToken,
}

/// A typed command result: a JSON value plus an optional preformatted
/// text rendering used when the caller asked for text output.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandValue {
    json: serde_json::Value,
    text: Option<String>,
}

impl CommandValue {
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            json: value,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Render for the wire: text when requested and available, compact
    /// JSON otherwise. The returned format records which path was taken.
    fn render(&self, want: PayloadFormat) -> (String, PayloadFormat) {
        match (want, &self.text) {
            (PayloadFormat::Text, Some(text)) => (text.clone(), PayloadFormat::Text),
            _ => (self.json.to_string(), PayloadFormat::Json),
        }
    }
}

/// Successful handler outcome.
pub enum CommandOutput {
    /// The command has no result data.
    Done,
    /// The command produced a typed result.
    Value(CommandValue),
}

/// Failed handler outcome.
///
/// `Declared` failures are raised deliberately and keep their (partial)
/// result data for diagnostics. `Fault` covers everything unexpected and
/// deliberately carries no data, so internal state never leaks to the
/// caller.
#[derive(Debug)]
pub enum CommandFailure {
    Declared {
        message: String,
        data: Option<CommandValue>,
    },
    Fault {
        message: String,
    },
}

impl CommandFailure {
    pub fn declared(message: impl Into<String>) -> Self {
        CommandFailure::Declared {
            message: message.into(),
            data: None,
        }
    }

    pub fn declared_with(message: impl Into<String>, data: CommandValue) -> Self {
        CommandFailure::Declared {
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        CommandFailure::Fault {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CommandFailure {
    fn from(err: serde_json::Error) -> Self {
        CommandFailure::fault(err.to_string())
    }
}

pub type HandlerResult = std::result::Result<CommandOutput, CommandFailure>;

/// One named command implementation.
pub trait CommandHandler: Send + Sync {
    /// Registered command name, matched case-sensitively.
    fn name(&self) -> &str;

    /// One-line human description, surfaced by host tooling.
    fn description(&self) -> &str;

    fn execute(&self, ctx: CommandContext<'_>) -> HandlerResult;
}

/// Name-keyed handler registry with exactly-once response mapping.
///
/// Built once at construction time; never mutated at runtime. A "reload"
/// is a new `Dispatcher` replacing this one wholesale.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Box<dyn CommandHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared name.
    ///
    /// A duplicate name is a warning, not an error: the first
    /// registration wins and the new one is dropped.
    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        match self.handlers.entry(handler.name().to_string()) {
            Entry::Occupied(entry) => {
                warn!(
                    command = %entry.key(),
                    "duplicate handler registration dropped; first registration wins"
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(Box::new(handler));
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Registered command names, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Execute one request to its response. Never panics: handler panics
    /// are contained and mapped to faults.
    pub fn dispatch(&self, request: &CommandRequest, cancel: &CancellationToken) -> CommandResponse {
        let command = request.command.as_str();
        let Some(handler) = self.handlers.get(command) else {
            debug!(command, "unknown command");
            return CommandResponse::failure(format!("Unknown command '{command}'"));
        };

        let ctx = CommandContext { request, cancel };
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler.execute(ctx)));

        match outcome {
            Ok(Ok(CommandOutput::Done)) => CommandResponse::success_unit(command),
            Ok(Ok(CommandOutput::Value(value))) => {
                let (data, format) = value.render(request.format);
                CommandResponse {
                    success: true,
                    message: format!("Command '{command}' succeeded"),
                    data,
                    format,
                }
            }
            Ok(Err(CommandFailure::Declared { message, data })) => {
                debug!(command, %message, "command reported declared failure");
                let (data, format) = match data {
                    Some(value) => value.render(request.format),
                    None => (String::new(), PayloadFormat::Json),
                };
                CommandResponse {
                    success: false,
                    message,
                    data,
                    format,
                }
            }
            Ok(Err(CommandFailure::Fault { message })) => {
                warn!(command, %message, "command faulted");
                CommandResponse::failure(format!("Command '{command}' failed: {message}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(command, panic = %message, "handler panicked");
                CommandResponse::failure(format!("Command '{command}' failed: {message}"))
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Probe {
        name: &'static str,
        result: fn(CommandContext<'_>) -> HandlerResult,
    }

    impl CommandHandler for Probe {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test probe"
        }
        fn execute(&self, ctx: CommandContext<'_>) -> HandlerResult {
            (self.result)(ctx)
        }
    }

    fn request(command: &str, format: PayloadFormat) -> CommandRequest {
        CommandRequest::new(command, "{}").with_format(format)
    }

    #[test]
    fn unknown_command_names_the_command() {
        let dispatcher = Dispatcher::new();
        let response = dispatcher.dispatch(
            &request("Nope", PayloadFormat::Json),
            &CancellationToken::new(),
        );
        assert!(!response.success);
        assert!(response.message.contains("Nope"), "{}", response.message);
        assert!(response.data.is_empty());
    }

    #[test]
    fn unit_success_uses_generic_message() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "Touch",
            result: |_| Ok(CommandOutput::Done),
        });

        let response = dispatcher.dispatch(
            &request("Touch", PayloadFormat::Json),
            &CancellationToken::new(),
        );
        assert!(response.success);
        assert_eq!(response.message, "Command 'Touch' succeeded");
        assert!(response.data.is_empty());
        assert_eq!(response.format, PayloadFormat::Json);
    }

    #[test]
    fn typed_success_serializes_json() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "State",
            result: |_| Ok(CommandOutput::Value(CommandValue::json(json!({"x": 1})))),
        });

        let response = dispatcher.dispatch(
            &request("State", PayloadFormat::Json),
            &CancellationToken::new(),
        );
        assert!(response.success);
        assert_eq!(response.data, "{\"x\":1}");
        assert_eq!(response.format, PayloadFormat::Json);
    }

    #[test]
    fn typed_success_prefers_text_when_requested() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "State",
            result: |_| {
                Ok(CommandOutput::Value(
                    CommandValue::json(json!({"x": 1})).with_text("x = 1"),
                ))
            },
        });

        let response = dispatcher.dispatch(
            &request("State", PayloadFormat::Text),
            &CancellationToken::new(),
        );
        assert_eq!(response.data, "x = 1");
        assert_eq!(response.format, PayloadFormat::Text);
    }

    #[test]
    fn text_request_without_text_rendering_falls_back_to_json() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "State",
            result: |_| Ok(CommandOutput::Value(CommandValue::json(json!([1, 2])))),
        });

        let response = dispatcher.dispatch(
            &request("State", PayloadFormat::Text),
            &CancellationToken::new(),
        );
        assert_eq!(response.data, "[1,2]");
        assert_eq!(response.format, PayloadFormat::Json);
    }

    #[test]
    fn declared_failure_preserves_partial_data() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "Build",
            result: |_| {
                Err(CommandFailure::declared_with(
                    "3 of 5 targets failed",
                    CommandValue::json(json!({"built": 2})).with_text("built 2 targets"),
                ))
            },
        });

        let json_response = dispatcher.dispatch(
            &request("Build", PayloadFormat::Json),
            &CancellationToken::new(),
        );
        assert!(!json_response.success);
        assert_eq!(json_response.message, "3 of 5 targets failed");
        assert_eq!(json_response.data, "{\"built\":2}");
        assert_eq!(json_response.format, PayloadFormat::Json);

        let text_response = dispatcher.dispatch(
            &request("Build", PayloadFormat::Text),
            &CancellationToken::new(),
        );
        assert_eq!(text_response.data, "built 2 targets");
        assert_eq!(text_response.format, PayloadFormat::Text);
    }

    #[test]
    fn declared_failure_without_data_is_empty_json() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "Build",
            result: |_| Err(CommandFailure::declared("nothing to build")),
        });

        let response = dispatcher.dispatch(
            &request("Build", PayloadFormat::Text),
            &CancellationToken::new(),
        );
        assert!(!response.success);
        assert_eq!(response.message, "nothing to build");
        assert!(response.data.is_empty());
        assert_eq!(response.format, PayloadFormat::Json);
    }

    #[test]
    fn fault_is_wrapped_with_no_data() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "Boom",
            result: |_| Err(CommandFailure::fault("index out of range")),
        });

        let response = dispatcher.dispatch(
            &request("Boom", PayloadFormat::Json),
            &CancellationToken::new(),
        );
        assert!(!response.success);
        assert_eq!(response.message, "Command 'Boom' failed: index out of range");
        assert!(response.data.is_empty());
    }

    #[test]
    fn handler_panic_is_contained() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "Panic",
            result: |_| panic!("boom"),
        });

        let response = dispatcher.dispatch(
            &request("Panic", PayloadFormat::Json),
            &CancellationToken::new(),
        );
        assert!(!response.success);
        assert!(response.message.contains("boom"), "{}", response.message);
        assert!(response.data.is_empty());
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "Same",
            result: |_| Ok(CommandOutput::Value(CommandValue::json(json!("first")))),
        });
        dispatcher.register(Probe {
            name: "Same",
            result: |_| Ok(CommandOutput::Value(CommandValue::json(json!("second")))),
        });

        assert_eq!(dispatcher.len(), 1);
        let response = dispatcher.dispatch(
            &request("Same", PayloadFormat::Json),
            &CancellationToken::new(),
        );
        assert_eq!(response.data, "\"first\"");
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "Echo",
            result: |_| Ok(CommandOutput::Done),
        });

        let response = dispatcher.dispatch(
            &request("echo", PayloadFormat::Json),
            &CancellationToken::new(),
        );
        assert!(!response.success);
        assert!(response.message.contains("echo"));
    }

    #[test]
    fn handler_sees_request_and_token() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(Probe {
            name: "Inspect",
            result: |ctx| {
                if ctx.cancel.is_cancelled() {
                    return Err(CommandFailure::declared("already cancelled"));
                }
                Ok(CommandOutput::Value(CommandValue::json(
                    json!({"data": ctx.request.data, "cwd": ctx.request.cwd}),
                )))
            },
        });

        let request = CommandRequest::new("Inspect", "payload").with_cwd("/work");
        let response = dispatcher.dispatch(&request, &CancellationToken::new());
        assert!(response.success);
        assert!(response.data.contains("payload"));
        assert!(response.data.contains("/work"));

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let response = dispatcher.dispatch(&request, &cancelled);
        assert!(!response.success);
        assert_eq!(response.message, "already cancelled");
    }
}
