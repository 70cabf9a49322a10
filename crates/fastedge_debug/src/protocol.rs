//! Debug Adapter Protocol messages and wire framing
//!
//! Message types come from the `dap` crate. Every message is a json object preceded
//! by a `Content-Length` header block,
//! see <https://microsoft.github.io/debug-adapter-protocol/overview>.

use std::collections::HashMap;

pub use dap::events::{Event, ExitedEventBody, OutputEventBody};
pub use dap::prelude::{Command, Request, Response, ResponseBody};
pub use dap::responses::ResponseMessage;
pub use dap::types::{Message, OutputEventCategory};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CONTENT_LENGTH: &str = "Content-Length:";

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Missing Content-Length header")]
    MissingContentLength,
    #[error("Invalid Content-Length header: {0}")]
    InvalidContentLength(String),
    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
    #[error("Request without a seq or command: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A request as received from the client.
///
/// The command name is kept apart from the parsed request, it is echoed in the
/// response even when the request is not one the `dap` crate understands.
#[derive(Debug)]
pub struct ClientRequest {
    pub seq: i64,
    pub command: String,
    pub request: Result<Request, serde_json::Error>,
}

impl ClientRequest {
    /// Builds a request the way a client would send it
    pub fn new(seq: i64, command: impl Into<String>, arguments: Option<Value>) -> Self {
        let command = command.into();
        let mut value = json!({ "seq": seq, "type": "request", "command": command });
        if let Some(arguments) = arguments {
            value["arguments"] = arguments;
        }
        Self {
            seq,
            command,
            request: serde_json::from_value(value),
        }
    }

    /// # Errors
    ///
    /// This function will return an error if the message has no `seq` or `command`
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let (Some(seq), Some(command)) = (
            value.get("seq").and_then(Value::as_i64),
            value.get("command").and_then(Value::as_str),
        ) else {
            return Err(ProtocolError::InvalidRequest(value.to_string()));
        };
        let command = command.to_string();
        Ok(Self {
            seq,
            command,
            request: serde_json::from_value(value),
        })
    }

    /// Successful response carrying `body`
    pub fn success(&self, body: ResponseBody) -> OutgoingMessage {
        OutgoingMessage::Response {
            command: self.command.clone(),
            response: Response {
                request_seq: self.seq,
                success: true,
                body: Some(body),
                error: None,
                message: None,
            },
        }
    }

    pub fn error(&self, message: impl Into<String>) -> OutgoingMessage {
        let message = message.into();
        OutgoingMessage::Response {
            command: self.command.clone(),
            response: Response {
                request_seq: self.seq,
                success: false,
                body: None,
                error: Some(Message {
                    id: 0,
                    format: message.clone(),
                    variables: HashMap::new(),
                    send_telemetry: None,
                    show_user: None,
                    url: None,
                    url_label: None,
                }),
                message: Some(ResponseMessage::Error(message)),
            },
        }
    }
}

/// Text of a failed response
pub fn error_message(response: &Response) -> Option<String> {
    match &response.message {
        Some(ResponseMessage::Error(message)) => Some(message.clone()),
        _ => response.error.as_ref().map(|e| e.format.clone()),
    }
}

pub fn output_event(category: OutputEventCategory, output: impl Into<String>) -> Event {
    Event::Output(OutputEventBody {
        category: Some(category),
        output: output.into(),
        ..Default::default()
    })
}

pub fn exited_event(exit_code: i64) -> Event {
    Event::Exited(ExitedEventBody { exit_code })
}

pub fn terminated_event() -> Event {
    Event::Terminated(None)
}

/// Messages that can be sent to the client
#[derive(Debug)]
pub enum OutgoingMessage {
    Response { command: String, response: Response },
    Event(Event),
}

impl OutgoingMessage {
    /// Serializes the message with the envelope fields, `seq` is assigned by the writer
    ///
    /// # Errors
    ///
    /// This function will return an error if the message can not be serialized
    pub fn to_json(&self, seq: i64) -> Result<Value, serde_json::Error> {
        let mut value = match self {
            OutgoingMessage::Response { command, response } => {
                let mut value = serde_json::to_value(response)?;
                value["type"] = json!("response");
                value["command"] = json!(command);
                value
            }
            OutgoingMessage::Event(event) => {
                let mut value = serde_json::to_value(event)?;
                value["type"] = json!("event");
                value
            }
        };
        value["seq"] = json!(seq);
        Ok(value)
    }

    /// `true` for a response to `command`
    pub fn is_response_to(&self, command: &str) -> bool {
        matches!(self, OutgoingMessage::Response { command: c, .. } if c == command)
    }
}

impl From<Event> for OutgoingMessage {
    fn from(event: Event) -> Self {
        OutgoingMessage::Event(event)
    }
}

/// Reads one framed request, `Ok(None)` on a clean end of stream
///
/// # Errors
///
/// This function will return an error on malformed headers or payloads
pub async fn read_message<R>(reader: &mut R) -> Result<Option<ClientRequest>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let header = line.trim_end_matches(['\r', '\n']);

        if header.is_empty() {
            // headers may be preceded by stray blank lines
            if content_length.is_some() {
                break;
            }
            continue;
        }

        if let Some(len) = header.strip_prefix(CONTENT_LENGTH) {
            let len = len.trim();
            content_length = Some(
                len.parse()
                    .map_err(|_| ProtocolError::InvalidContentLength(len.to_string()))?,
            );
        }
    }

    let length = content_length.ok_or(ProtocolError::MissingContentLength)?;
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;

    let value: Value = serde_json::from_slice(&body)?;
    ClientRequest::from_value(value).map(Some)
}

/// Writes one framed message and flushes
///
/// # Errors
///
/// This function will return an error if the writer fails
pub async fn write_message<W>(writer: &mut W, message: &Value) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_string(message)?;
    let framed = format!("{CONTENT_LENGTH} {}\r\n\r\n{payload}", payload.len());
    writer.write_all(framed.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
