//! Plugin socket server.
//!
//! Speaks the small subset of HTTP/1.1 the Docker daemon uses for plugin
//! calls: `POST` with a `Content-Length` body, persistent connections, one
//! request in flight per connection. Each request is handed to the
//! [`Driver`] on tokio's blocking pool.

use std::future::Future;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::constants::{MAX_HEADER_LINE, MAX_REQUEST_BODY, PLUGIN_CONTENT_TYPE};
use crate::driver::{Driver, Reply};

/// One parsed plugin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
    /// Client asked for the connection to be closed after this request.
    pub close: bool,
}

/// A request that could not be parsed; answered, then the connection closes.
#[derive(Debug)]
struct BadRequest {
    status: u16,
    message: String,
}

impl BadRequest {
    fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Bind the plugin socket, replacing a stale socket file left by a previous
/// run. Anything at `path` that is not a socket is left alone and the bind
/// fails.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            warn!(path = %path.display(), "removing stale plugin socket");
            std::fs::remove_file(path)?;
        }
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a socket", path.display()),
            ));
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    UnixListener::bind(path)
}

/// Removes the socket file when dropped.
#[derive(Debug)]
pub struct SocketGuard {
    path: PathBuf,
}

impl SocketGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed plugin socket"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "couldn't remove plugin socket"),
        }
    }
}

/// Accept connections until `shutdown` resolves.
pub async fn serve(
    listener: UnixListener,
    driver: Arc<Driver>,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("plugin server shutting down");
                break;
            }
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        continue;
                    }
                };

                let driver = driver.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, driver).await {
                        debug!(error = %e, "connection ended with error");
                    }
                });
            }
        }
    }

    Ok(())
}

/// Serve requests on one connection until the peer hangs up, asks to close,
/// or sends something unparseable.
pub async fn handle_connection<S>(stream: S, driver: Arc<Driver>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    loop {
        let request = match read_request(&mut reader).await? {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(bad) => {
                warn!(status = bad.status, message = %bad.message, "rejecting malformed request");
                let reply = Reply {
                    status: bad.status,
                    body: serde_json::json!({ "Err": bad.message }).to_string().into_bytes(),
                };
                write_reply(&mut writer, &reply, true).await?;
                return Ok(());
            }
        };

        let reply = if request.method != "POST" {
            Reply {
                status: 405,
                body: serde_json::json!({ "Err": format!("method {} not allowed", request.method) })
                    .to_string()
                    .into_bytes(),
            }
        } else {
            dispatch(&driver, request.path, request.body).await
        };

        write_reply(&mut writer, &reply, request.close).await?;
        if request.close {
            return Ok(());
        }
    }
}

async fn dispatch(driver: &Arc<Driver>, path: String, body: Vec<u8>) -> Reply {
    debug!(endpoint = %path, bytes = body.len(), "plugin request");

    let driver = driver.clone();
    match tokio::task::spawn_blocking(move || driver.handle(&path, &body)).await {
        Ok(reply) => reply,
        Err(e) => {
            error!(error = %e, "request handler panicked");
            Reply {
                status: 500,
                body: serde_json::json!({ "Err": "internal error" }).to_string().into_bytes(),
            }
        }
    }
}

/// Read one request. `Ok(Ok(None))` is a clean end of stream between
/// requests; the inner `Err` is a protocol error to answer.
async fn read_request<R>(reader: &mut R) -> io::Result<Result<Option<Request>, BadRequest>>
where
    R: AsyncBufRead + Unpin,
{
    let Some(request_line) = read_line(reader).await? else {
        return Ok(Ok(None));
    };
    let request_line = match request_line {
        Ok(line) => line,
        Err(bad) => return Ok(Err(bad)),
    };

    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Ok(Err(BadRequest::new(400, "malformed request line")));
    };
    if !version.starts_with("HTTP/1.") {
        return Ok(Err(BadRequest::new(505, format!("unsupported protocol {version}"))));
    }

    let mut content_length: Option<usize> = None;
    let mut close = version == "HTTP/1.0";
    loop {
        let line = match read_line(reader).await? {
            Some(Ok(line)) => line,
            Some(Err(bad)) => return Ok(Err(bad)),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside request headers",
                ));
            }
        };
        if line.is_empty() {
            break;
        }

        let Some((name, value)) = line.split_once(':') else {
            return Ok(Err(BadRequest::new(400, format!("malformed header {line:?}"))));
        };
        let value = value.trim();
        match name.trim().to_ascii_lowercase().as_str() {
            "content-length" => match value.parse::<usize>() {
                Ok(n) if content_length.is_some_and(|seen| seen != n) => {
                    return Ok(Err(BadRequest::new(400, "conflicting Content-Length headers")));
                }
                Ok(n) if n <= MAX_REQUEST_BODY => content_length = Some(n),
                Ok(_) => return Ok(Err(BadRequest::new(413, "request body too large"))),
                Err(_) => return Ok(Err(BadRequest::new(400, "invalid Content-Length"))),
            },
            "transfer-encoding" if !value.eq_ignore_ascii_case("identity") => {
                return Ok(Err(BadRequest::new(411, "chunked bodies are not supported")));
            }
            "connection" => {
                if value.eq_ignore_ascii_case("close") {
                    close = true;
                } else if value.eq_ignore_ascii_case("keep-alive") {
                    close = false;
                }
            }
            _ => {}
        }
    }

    let mut body = vec![0u8; content_length.unwrap_or(0)];
    reader.read_exact(&mut body).await?;

    // the query string carries nothing the plugin API uses
    let path = target.split('?').next().unwrap_or(target).to_string();

    Ok(Ok(Some(Request {
        method: method.to_string(),
        path,
        body,
        close,
    })))
}

/// Read one CRLF- or LF-terminated line without its terminator.
/// `None` means end of stream before any byte.
async fn read_line<R>(reader: &mut R) -> io::Result<Option<Result<String, BadRequest>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = (&mut *reader)
        .take(MAX_HEADER_LINE as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;
    if read == 0 {
        return Ok(None);
    }
    if !buf.ends_with(b"\n") {
        if buf.len() > MAX_HEADER_LINE {
            return Ok(Some(Err(BadRequest::new(431, "header line too long"))));
        }
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed mid-line",
        ));
    }

    buf.pop();
    if buf.ends_with(b"\r") {
        buf.pop();
    }

    Ok(Some(
        String::from_utf8(buf).map_err(|_| BadRequest::new(400, "header is not valid UTF-8")),
    ))
}

async fn write_reply<W>(writer: &mut W, reply: &Reply, close: bool) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n",
        reply.status,
        reason_phrase(reply.status),
        PLUGIN_CONTENT_TYPE,
        reply.body.len(),
    );
    if close {
        head.push_str("Connection: close\r\n");
    }
    head.push_str("\r\n");

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&reply.body).await?;
    writer.flush().await
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}
