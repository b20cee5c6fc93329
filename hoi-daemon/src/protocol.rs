//! JSON newline-delimited protocol between hoictl and hoid.
//!
//! One request per line, one response per line, over a local unix stream
//! socket. Every call returns a boolean-or-payload plus an error.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use hoi_core::domain::DomainDirective;

use crate::error::{io_err, DaemonError};

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub cmd: String,
    /// Absolute path to the project root; required by all project-scoped
    /// commands.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Domain directive to merge; required by `domain`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainDirective>,
    /// Absolute path to the archive target; required by `dump`. May be
    /// outside the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl Request {
    pub fn new(cmd: &str) -> Request {
        Request {
            cmd: cmd.to_string(),
            path: None,
            domain: None,
            target: None,
        }
    }

    pub fn with_path(cmd: &str, path: impl Into<String>) -> Request {
        Request {
            cmd: cmd.to_string(),
            path: Some(path.into()),
            domain: None,
            target: None,
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: Value) -> Response {
        Response {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Response {
        Response {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Unwraps the payload, turning a daemon-side error into an error here.
    pub fn into_data(self) -> Result<Value, DaemonError> {
        if self.ok {
            return Ok(self.data.unwrap_or(Value::Null));
        }
        Err(DaemonError::Protocol(
            self.error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

/// Sends one request to the daemon socket and reads one response.
pub fn send_request(socket: &Path, request: &Request) -> Result<Response, DaemonError> {
    let mut stream = UnixStream::connect(socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.to_path_buf(),
            }
        } else {
            io_err(socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(socket, e))?;
    stream.flush().map_err(|e| io_err(socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(|e| io_err(socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: Response = serde_json::from_str(line.trim_end())?;
    Ok(response)
}
