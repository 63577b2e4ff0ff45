use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::{ExternalObject, FamilyRef, IdentityTag};

use crate::actions::ActionInput;
use crate::error::{io_err, BridgeError};

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum BridgeRequest {
    Ping,
    GetFamilyNames,
    GetTypeNames {
        family: FamilyRef,
    },
    GetParameters {
        family: FamilyRef,
        type_name: String,
    },
    CreateOrModify {
        objects: Vec<ExternalObject>,
        identity: IdentityTag,
    },
    GetDocumentName,
    Action {
        input: ActionInput,
    },
    Stop,
}

impl BridgeRequest {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeRequest::Ping => "ping",
            BridgeRequest::GetFamilyNames => "get_family_names",
            BridgeRequest::GetTypeNames { .. } => "get_type_names",
            BridgeRequest::GetParameters { .. } => "get_parameters",
            BridgeRequest::CreateOrModify { .. } => "create_or_modify",
            BridgeRequest::GetDocumentName => "get_document_name",
            BridgeRequest::Action { .. } => "action",
            BridgeRequest::Stop => "stop",
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    pub fn into_data(self) -> Result<Value, BridgeError> {
        if self.ok {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(BridgeError::Protocol(
                self.error
                    .unwrap_or_else(|| "unknown host error".to_string()),
            ))
        }
    }
}

/// Send one JSON request to `socket` and read one response.
///
/// `timeout` bounds each read and write on the stream.
pub fn send_request(
    socket: &Path,
    request: &BridgeRequest,
    timeout: Option<Duration>,
) -> Result<BridgeResponse, BridgeError> {
    if !socket.exists() {
        return Err(BridgeError::HostNotRunning {
            socket: socket.to_path_buf(),
        });
    }

    let mut stream = UnixStream::connect(socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            BridgeError::HostNotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })?;
    stream
        .set_read_timeout(timeout)
        .map_err(|e| io_err(socket, e))?;
    stream
        .set_write_timeout(timeout)
        .map_err(|e| io_err(socket, e))?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(socket, e))?;
    stream.flush().map_err(|e| io_err(socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(socket, e))?;
    if read == 0 {
        return Err(BridgeError::Protocol(
            "host closed connection before responding".to_string(),
        ));
    }

    let response: BridgeResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}
