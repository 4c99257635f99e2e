//! Local HTTP listener that receives the authorization redirect
use crate::callback::{CallbackParams, CallbackStatus};
use crate::error::{AuthError, Result};
use log::{debug, warn};
use reqwest::Url;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

/// How long a login waits for the browser to come back
pub const DEFAULT_REDIRECT_TIMEOUT: Duration = Duration::from_secs(300);

/// Bound on receiving the request head of a single connection
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener bound to the host, port and path of the redirect URI
pub struct CallbackServer {
    listener: TcpListener,
    callback_path: String,
}

impl CallbackServer {
    pub async fn bind(redirect_uri: &str) -> Result<Self> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::InvalidConfig(format!("redirect URI: {}", e)))?;
        let host = url
            .host_str()
            .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| AuthError::InvalidConfig("redirect URI has no host".into()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| AuthError::InvalidConfig("redirect URI has no port".into()))?;

        let listener = TcpListener::bind((host.as_str(), port)).await?;
        debug!("Listening for the redirect on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            callback_path: url.path().to_string(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for a request on the callback path
    ///
    /// Requests for any other path are answered with 404 and skipped.
    pub async fn accept(&self, timeout: Duration) -> Result<PendingRedirect> {
        match tokio::time::timeout(timeout, self.next_redirect()).await {
            Ok(redirect) => redirect,
            Err(_) => Err(AuthError::IoError(io::Error::new(
                io::ErrorKind::TimedOut,
                "timed out waiting for the authorization redirect",
            ))),
        }
    }

    /// Connections are read concurrently, so an idle socket (such as a
    /// browser preconnect) cannot hold up the redirect behind it.
    async fn next_redirect(&self) -> Result<PendingRedirect> {
        let mut requests = JoinSet::new();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted?;
                    requests.spawn(read_callback(stream, peer, self.callback_path.clone()));
                }
                Some(joined) = requests.join_next() => {
                    if let Ok(Some(redirect)) = joined {
                        return Ok(redirect);
                    }
                }
            }
        }
    }
}

/// Read one connection; anything but a request for `callback_path` is
/// answered or dropped here.
async fn read_callback(
    mut stream: TcpStream,
    peer: SocketAddr,
    callback_path: String,
) -> Option<PendingRedirect> {
    let target = match tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_target(&mut stream)).await {
        Ok(Ok(target)) => target,
        Ok(Err(e)) => {
            warn!("Dropping malformed request from {}: {}", peer, e);
            return None;
        }
        Err(_) => {
            debug!("Dropping idle connection from {}", peer);
            return None;
        }
    };

    if request_path(&target).as_deref() == Some(callback_path.as_str()) {
        return Some(PendingRedirect {
            stream,
            params: CallbackParams::parse(&target),
        });
    }

    debug!("Not found: {}", target);
    if let Err(e) = write_response(&mut stream, "404 Not Found", &page("Not found", "")).await {
        warn!("Failed to answer {}: {}", peer, e);
    }
    None
}

/// A received redirect whose browser tab is still waiting for an answer
#[derive(Debug)]
pub struct PendingRedirect {
    stream: TcpStream,
    params: CallbackParams,
}

impl PendingRedirect {
    pub fn params(&self) -> &CallbackParams {
        &self.params
    }

    /// Show the final status in the browser tab
    pub async fn respond(mut self, status: &CallbackStatus) -> Result<()> {
        let body = match status {
            CallbackStatus::Completed => page(
                "Signed in",
                "You can close this window and return to the terminal.",
            ),
            CallbackStatus::Failed { message } => page("Sign-in failed", message),
            CallbackStatus::Processing => page("Completing sign-in", "Check the terminal."),
        };
        write_response(&mut self.stream, "200 OK", &body).await?;
        Ok(())
    }
}

/// Read the request line and discard the headers
async fn read_request_target(stream: &mut TcpStream) -> io::Result<String> {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header).await? == 0 || header.trim().is_empty() {
            break;
        }
    }

    // GET /callback?code=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(_method), Some(target)) => Ok(target.to_string()),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid request line",
        )),
    }
}

fn request_path(target: &str) -> Option<String> {
    Url::parse("http://localhost/")
        .and_then(|base| base.join(target))
        .ok()
        .map(|url| url.path().to_string())
}

async fn write_response(stream: &mut TcpStream, status_line: &str, body: &str) -> io::Result<()> {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_line,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

fn page(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, Arial, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: #121212;
            color: #ffffff;
        }}
        h1 {{ color: #1db954; }}
    </style>
</head>
<body>
    <div>
        <h1>{title}</h1>
        <p>{message}</p>
    </div>
</body>
</html>"#,
        title = escape_html(title),
        message = escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
