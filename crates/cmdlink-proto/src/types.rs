use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Requested rendering of response data.
///
/// On the wire this is the exact string `"json"` or `"text"`. Deserialization
/// is deliberately lossy: any other inbound string maps to [`PayloadFormat::Json`],
/// matching the dispatch rule that everything except a supported text request
/// falls back to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadFormat {
    #[default]
    Json,
    Text,
}

impl PayloadFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadFormat::Json => "json",
            PayloadFormat::Text => "text",
        }
    }
}

impl std::fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for PayloadFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for PayloadFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "text" => PayloadFormat::Text,
            _ => PayloadFormat::Json,
        })
    }
}

/// A single command invocation sent by the client.
///
/// `data` is an opaque payload (typically serialized JSON) the target handler
/// interprets; the transport never looks inside it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandRequest {
    /// Registered handler name, matched case-sensitively.
    pub command: String,
    /// Opaque handler payload.
    pub data: String,
    /// Requested rendering of the response data.
    pub format: PayloadFormat,
    /// Working directory of the issuing process.
    pub cwd: String,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            data: data.into(),
            format: PayloadFormat::Json,
            cwd: String::new(),
        }
    }

    pub fn with_format(mut self, format: PayloadFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = cwd.into();
        self
    }
}

/// The single result produced for an accepted [`CommandRequest`].
///
/// `data` is either a JSON document string or a preformatted text blob;
/// `format` records which.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
    pub data: String,
    pub format: PayloadFormat,
}

impl CommandResponse {
    /// Success envelope for a command that produced no result data.
    pub fn success_unit(command: &str) -> Self {
        Self {
            success: true,
            message: format!("Command '{command}' succeeded"),
            data: String::new(),
            format: PayloadFormat::Json,
        }
    }

    /// Failure envelope with no attached data.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: String::new(),
            format: PayloadFormat::Json,
        }
    }
}
