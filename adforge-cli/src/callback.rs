//! One-shot listener for the login redirect.
//!
//! The platform redirects the browser to the configured redirect URI with
//! either `code` and `state` or `error` parameters. The listener answers
//! the first request on the redirect path and hands the parameters back;
//! verifying `state` is left to the session.

use anyhow::{Context, Result, bail};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

const SUCCESS_PAGE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Login received</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Login failed</h1>\
    <p>The platform returned an error. See the terminal for details.</p></body></html>";

const NOT_FOUND_PAGE: &[u8] = b"HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n";

/// Parameters carried by the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Extract the parameters from a full redirect URL.
    pub fn from_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned());
            match key.as_ref() {
                "code" => params.code = value,
                "state" => params.state = value,
                "error" => params.error = value,
                "error_description" => params.error_description = value,
                _ => {}
            }
        }
        params
    }

    /// Parse a redirect URL pasted by the user.
    pub fn parse(redirect: &str) -> Result<Self> {
        let url = Url::parse(redirect.trim()).context("Not a valid redirect URL")?;
        let params = Self::from_url(&url);
        if params.code.is_none() && params.error.is_none() {
            bail!("Redirect URL has neither a code nor an error parameter");
        }
        Ok(params)
    }
}

/// Wait for the browser to hit `redirect_uri` and return its parameters.
pub async fn listen_for_callback(redirect_uri: &str) -> Result<CallbackParams> {
    let redirect = Url::parse(redirect_uri)
        .with_context(|| format!("Invalid redirect URI {}", redirect_uri))?;
    let host = redirect.host_str().unwrap_or("127.0.0.1");
    let port = redirect
        .port_or_known_default()
        .context("Redirect URI has no port")?;
    let addr = format!("{}:{}", host, port);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!("Listening for login redirect on {}", addr);

    loop {
        let (mut socket, _) = listener
            .accept()
            .await
            .context("Failed to accept connection")?;

        let mut buffer = [0; 8192];
        let n = socket
            .read(&mut buffer)
            .await
            .context("Failed to read request")?;
        let request = String::from_utf8_lossy(&buffer[..n]);

        let Some(target) = request_target(&request) else {
            let _ = socket.write_all(NOT_FOUND_PAGE).await;
            continue;
        };

        let Ok(url) = redirect.join(target) else {
            let _ = socket.write_all(NOT_FOUND_PAGE).await;
            continue;
        };

        if url.path() != redirect.path() {
            tracing::debug!("Ignoring request for {}", url.path());
            let _ = socket.write_all(NOT_FOUND_PAGE).await;
            continue;
        }

        let params = CallbackParams::from_url(&url);
        let page = if params.code.is_some() {
            SUCCESS_PAGE
        } else {
            FAILURE_PAGE
        };
        let _ = socket.write_all(page).await;
        return Ok(params);
    }
}

/// The request target of an HTTP request line (`GET /path?query HTTP/1.1`).
fn request_target(request: &str) -> Option<&str> {
    let line = request.lines().next()?;
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Some(target),
        _ => None,
    }
}
