//! Remote-call surface: newline-delimited JSON requests and responses over TCP.
//!
//! One request per line, one response per line, as many requests per
//! connection as the caller likes. Errors are answered on the wire and never
//! take the server down.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::buffer::DEFAULT_FONT_SIZE;
use crate::error::{ErrorKind, ScreenError};
use crate::location::Location;
use crate::screen::Screen;
use crate::shutdown::{ShutdownFlag, wait_until_set};

/// Longest request line the server accepts, newline excluded.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// A call from a producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    RegisterBuffer {
        name: String,
        /// Location name, case-insensitive.
        location: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        font_size: Option<u32>,
    },
    UnregisterBuffer {
        name: String,
    },
    UpdateRow {
        buffer: String,
        row: String,
        content: String,
    },
    ClearBuffer {
        buffer: String,
    },
    Reset,
}

/// The answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Error { kind: ErrorKind, message: String },
}

impl From<Result<(), ScreenError>> for Response {
    fn from(result: Result<(), ScreenError>) -> Self {
        match result {
            Ok(()) => Response::Ok,
            Err(err) => Response::Error {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

/// Error returned to a client when the server answered with an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl std::error::Error for RemoteError {}

/// Applies one request to the screen.
pub fn handle(screen: &Screen, request: Request) -> Response {
    match request {
        Request::RegisterBuffer {
            name,
            location,
            font_size,
        } => location
            .parse::<Location>()
            .and_then(|location| {
                screen.register_buffer(
                    &name,
                    location,
                    font_size.unwrap_or(DEFAULT_FONT_SIZE),
                )
            })
            .into(),
        Request::UnregisterBuffer { name } => {
            screen.unregister_buffer(&name);
            Response::Ok
        }
        Request::UpdateRow {
            buffer,
            row,
            content,
        } => screen.update_row(&buffer, &row, &content).into(),
        Request::ClearBuffer { buffer } => screen.clear_buffer(&buffer).into(),
        Request::Reset => {
            screen.reset();
            Response::Ok
        }
    }
}

/// Decodes and applies one request line.
pub fn handle_line(screen: &Screen, line: &str) -> Response {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => {
            debug!(?request, "remote call");
            handle(screen, request)
        }
        Err(err) => bad_request(format!("invalid request: {err}")),
    }
}

fn bad_request(message: String) -> Response {
    Response::Error {
        kind: ErrorKind::BadRequest,
        message,
    }
}

/// Accepts connections until `shutdown` is set. Failed accepts are logged and
/// retried after `shutdown_poll`.
pub async fn serve<F>(
    listener: TcpListener,
    screen: Arc<Screen>,
    shutdown: Arc<F>,
    shutdown_poll: Duration,
) where
    F: ShutdownFlag + ?Sized,
{
    loop {
        tokio::select! {
            () = wait_until_set(shutdown.as_ref(), shutdown_poll) => {
                info!("remote-call server stopping");
                return;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!("failed to accept remote-call connection: {err}");
                        tokio::time::sleep(shutdown_poll).await;
                        continue;
                    }
                };
                debug!(%peer, "remote-call connection");
                let screen = Arc::clone(&screen);
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, &screen).await {
                        warn!(%peer, "remote-call connection error: {err:#}");
                    }
                });
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, screen: &Screen) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_REQUEST_BYTES as u64 + 1)
            .read_until(b'\n', &mut line)
            .await
            .context("read request")?;
        if read == 0 {
            break;
        }

        let response = if line.len() > MAX_REQUEST_BYTES && line.last() != Some(&b'\n') {
            skip_line(&mut reader).await.context("read request")?;
            bad_request(format!("request line exceeds {MAX_REQUEST_BYTES} bytes"))
        } else {
            match std::str::from_utf8(&line) {
                Ok(text) if text.trim().is_empty() => continue,
                Ok(text) => handle_line(screen, text),
                Err(err) => bad_request(format!("request is not valid UTF-8: {err}")),
            }
        };

        if let Response::Error { kind, message } = &response {
            debug!(%kind, "remote call failed: {message}");
        }
        let mut body = serde_json::to_string(&response).context("serialize response")?;
        body.push('\n');
        writer
            .write_all(body.as_bytes())
            .await
            .context("write response")?;
    }

    Ok(())
}

/// Consumes input up to and including the next newline.
async fn skip_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut scratch = Vec::new();
    loop {
        scratch.clear();
        let read = (&mut *reader)
            .take(MAX_REQUEST_BYTES as u64)
            .read_until(b'\n', &mut scratch)
            .await?;
        if read == 0 || scratch.last() == Some(&b'\n') {
            return Ok(());
        }
    }
}

/// Client side of the remote-call protocol.
pub struct RpcClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl RpcClient {
    /// Connects to a server.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .context("connect to inky server")?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    /// Sends one request and waits for its response.
    ///
    /// # Errors
    /// Returns an error on I/O failure or an undecodable response. Error
    /// responses are returned as `Ok(Response::Error { .. })`.
    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        let mut body = serde_json::to_string(request).context("serialize request")?;
        body.push('\n');
        self.writer
            .write_all(body.as_bytes())
            .await
            .context("send request")?;

        let Some(line) = self.lines.next_line().await.context("read response")? else {
            bail!("server closed the connection");
        };
        serde_json::from_str(&line).context("parse response")
    }

    async fn call_checked(&mut self, request: Request) -> Result<()> {
        match self.call(&request).await? {
            Response::Ok => Ok(()),
            Response::Error { kind, message } => Err(RemoteError { kind, message }.into()),
        }
    }

    /// # Errors
    /// Returns an error on I/O failure or a remote error.
    pub async fn register_buffer(
        &mut self,
        name: &str,
        location: &str,
        font_size: Option<u32>,
    ) -> Result<()> {
        self.call_checked(Request::RegisterBuffer {
            name: name.to_string(),
            location: location.to_string(),
            font_size,
        })
        .await
    }

    /// # Errors
    /// Returns an error on I/O failure.
    pub async fn unregister_buffer(&mut self, name: &str) -> Result<()> {
        self.call_checked(Request::UnregisterBuffer {
            name: name.to_string(),
        })
        .await
    }

    /// # Errors
    /// Returns an error on I/O failure or a remote error.
    pub async fn update_row(&mut self, buffer: &str, row: &str, content: &str) -> Result<()> {
        self.call_checked(Request::UpdateRow {
            buffer: buffer.to_string(),
            row: row.to_string(),
            content: content.to_string(),
        })
        .await
    }

    /// # Errors
    /// Returns an error on I/O failure or a remote error.
    pub async fn clear_buffer(&mut self, buffer: &str) -> Result<()> {
        self.call_checked(Request::ClearBuffer {
            buffer: buffer.to_string(),
        })
        .await
    }

    /// # Errors
    /// Returns an error on I/O failure.
    pub async fn reset(&mut self) -> Result<()> {
        self.call_checked(Request::Reset).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::LocalFlag;

    #[test]
    fn test_request_wire_format() {
        let request: Request = serde_json::from_str(
            r#"{"method":"register_buffer","name":"nodes","location":"LowerLeft"}"#,
        )
        .unwrap();
        assert_eq!(
            request,
            Request::RegisterBuffer {
                name: "nodes".to_string(),
                location: "LowerLeft".to_string(),
                font_size: None,
            }
        );

        let reset: Request = serde_json::from_str(r#"{"method":"reset"}"#).unwrap();
        assert_eq!(reset, Request::Reset);
    }

    #[test]
    fn test_response_wire_format() {
        assert_eq!(
            serde_json::to_string(&Response::Ok).unwrap(),
            r#"{"status":"ok"}"#
        );
        let err = Response::from(Err(ScreenError::UnregisteredBuffer("x".to_string())));
        assert_eq!(
            serde_json::to_string(&err).unwrap(),
            r#"{"status":"error","kind":"unregistered_buffer","message":"buffer 'x' is not registered"}"#
        );
    }

    #[test]
    fn test_handle_maps_errors_to_kinds() {
        let screen = Screen::new();

        let bad_location = handle_line(
            &screen,
            r#"{"method":"register_buffer","name":"a","location":"nowhere"}"#,
        );
        assert!(matches!(
            bad_location,
            Response::Error {
                kind: ErrorKind::InvalidArgument,
                ..
            }
        ));

        assert_eq!(
            handle_line(&screen, r#"{"method":"register_buffer","name":"a","location":"center"}"#),
            Response::Ok
        );
        let conflict = handle_line(
            &screen,
            r#"{"method":"register_buffer","name":"b","location":"CENTER"}"#,
        );
        assert!(matches!(
            conflict,
            Response::Error {
                kind: ErrorKind::LocationConflict,
                ..
            }
        ));

        let garbage = handle_line(&screen, "{not json");
        assert!(matches!(
            garbage,
            Response::Error {
                kind: ErrorKind::BadRequest,
                ..
            }
        ));
    }

    #[test]
    fn test_handle_register_uses_default_font_size() {
        let screen = Screen::new();
        handle(
            &screen,
            Request::RegisterBuffer {
                name: "time".to_string(),
                location: "upperleft".to_string(),
                font_size: None,
            },
        );
        let snapshot = screen.render();
        assert_eq!(
            snapshot.get(Location::UpperLeft).unwrap().font_size,
            DEFAULT_FONT_SIZE
        );
    }

    #[tokio::test]
    async fn test_client_and_server_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let screen = Arc::new(Screen::new());
        let shutdown = Arc::new(LocalFlag::new());
        let server = tokio::spawn(serve(
            listener,
            Arc::clone(&screen),
            Arc::clone(&shutdown),
            Duration::from_millis(10),
        ));

        let mut client = RpcClient::connect(addr).await.unwrap();
        client.register_buffer("nodes", "lowerleft", None).await.unwrap();
        client.update_row("nodes", "pi-2", "Offline").await.unwrap();
        client.update_row("nodes", "pi-1", "Ready").await.unwrap();

        let err = client.register_buffer("b2", "lowerleft", None).await.unwrap_err();
        let remote = err.downcast_ref::<RemoteError>().unwrap();
        assert_eq!(remote.kind, ErrorKind::LocationConflict);

        let err = client.clear_buffer("missing").await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<RemoteError>().unwrap().kind,
            ErrorKind::UnregisteredBuffer
        );

        assert_eq!(
            screen.render().get(Location::LowerLeft).unwrap().content,
            "Ready\nOffline\n"
        );

        client.reset().await.unwrap();
        assert!(screen.render().is_empty());

        shutdown.set().unwrap();
        server.await.unwrap();
    }

    async fn read_response(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Response {
        let line = lines.next_line().await.unwrap().expect("response line");
        serde_json::from_str(&line).unwrap()
    }

    #[tokio::test]
    async fn test_malformed_lines_get_bad_request_and_keep_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(LocalFlag::new());
        let server = tokio::spawn(serve(
            listener,
            Arc::new(Screen::new()),
            Arc::clone(&shutdown),
            Duration::from_millis(10),
        ));

        let (reader, mut writer) = TcpStream::connect(addr).await.unwrap().into_split();
        let mut lines = BufReader::new(reader).lines();

        writer
            .write_all(b"{\"method\":\"reset\",\"x\":\"\xff\xfe\"}\n")
            .await
            .unwrap();
        assert!(matches!(
            read_response(&mut lines).await,
            Response::Error {
                kind: ErrorKind::BadRequest,
                ..
            }
        ));

        let mut oversized = vec![b'a'; MAX_REQUEST_BYTES + 10];
        oversized.push(b'\n');
        writer.write_all(&oversized).await.unwrap();
        assert!(matches!(
            read_response(&mut lines).await,
            Response::Error {
                kind: ErrorKind::BadRequest,
                ..
            }
        ));

        writer.write_all(b"{\"method\":\"reset\"}\n").await.unwrap();
        assert_eq!(read_response(&mut lines).await, Response::Ok);

        shutdown.set().unwrap();
        server.await.unwrap();
    }
}
