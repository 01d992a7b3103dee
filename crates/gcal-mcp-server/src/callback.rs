//! OAuth redirect handling.
//!
//! Google sends the browser back to the client's redirect target with
//! `?code=...`. When that target is `http://localhost:<port>/...` we listen
//! there and catch the code ourselves; otherwise the user pastes it, either
//! bare or as the whole redirect URL.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;
use url::Url;

use crate::error::{CliError, CliResult};

/// How long `auth login` waits for the browser.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

const SUCCESS_PAGE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Google Calendar access granted</h1>\
    <p>You can close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
    <html><body><h1>Authorization failed</h1>\
    <p>Check the terminal for details.</p></body></html>";

const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Pulls the authorization code out of user input.
///
/// Accepts a bare code or a redirect URL carrying `code` (or `error`).
pub fn extract_code(input: &str) -> Result<String, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("authorization code is empty".to_string());
    }

    let Ok(url) = Url::parse(input) else {
        return Ok(input.to_string());
    };

    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "error" => return Err(format!("authorization denied: {}", value)),
            _ => {}
        }
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| "redirect URL carries no authorization code".to_string())
}

/// Returns the `redirect_uri` parameter of an authorization URL.
pub fn redirect_of(auth_url: &str) -> Option<String> {
    let url = Url::parse(auth_url).ok()?;
    url.query_pairs()
        .find(|(key, _)| key == "redirect_uri")
        .map(|(_, value)| value.into_owned())
}

/// Where a loopback redirect lands on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopbackTarget {
    /// Port to listen on.
    pub port: u16,
    /// Request path the browser is sent to.
    pub path: String,
}

impl LoopbackTarget {
    /// Recognizes `http://localhost:<port>/path` and `http://127.0.0.1:<port>/path`.
    ///
    /// A redirect without an explicit port is not listened for.
    pub fn from_redirect(redirect_uri: &str) -> Option<Self> {
        let url = Url::parse(redirect_uri).ok()?;
        if url.scheme() != "http" {
            return None;
        }
        if !matches!(url.host_str()?, "localhost" | "127.0.0.1") {
            return None;
        }
        Some(Self {
            port: url.port()?,
            path: url.path().to_string(),
        })
    }

    /// Binds the listener.
    pub async fn bind(&self) -> CliResult<TcpListener> {
        let listener = TcpListener::bind(("127.0.0.1", self.port)).await?;
        debug!(port = self.port, "listening for OAuth redirect");
        Ok(listener)
    }
}

/// Waits for the browser redirect and returns the authorization code.
pub async fn wait_for_code(listener: &TcpListener, path: &str, timeout: Duration) -> CliResult<String> {
    tokio::time::timeout(timeout, accept_code(listener, path))
        .await
        .map_err(|_| CliError::callback("timed out waiting for the browser redirect"))?
}

async fn accept_code(listener: &TcpListener, path: &str) -> CliResult<String> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "redirect connection");
        if let Some(result) = handle_callback(stream, path).await {
            return result;
        }
    }
}

/// Answers one request; `None` means it was not the redirect.
async fn handle_callback(mut stream: TcpStream, path: &str) -> Option<CliResult<String>> {
    let (reader, mut writer) = stream.split();
    let mut reader = BufReader::new(reader);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.is_err() {
        return None;
    }
    // Read past the headers before answering.
    let mut header = String::new();
    while let Ok(n) = reader.read_line(&mut header).await {
        if n == 0 || header.trim().is_empty() {
            break;
        }
        header.clear();
    }

    let Some(target) = callback_target(&request_line, path) else {
        let _ = writer.write_all(NOT_FOUND.as_bytes()).await;
        return None;
    };

    let result = extract_code(&format!("http://localhost{}", target)).map_err(CliError::callback);
    let page = if result.is_ok() { SUCCESS_PAGE } else { FAILURE_PAGE };
    let _ = writer.write_all(page.as_bytes()).await;
    let _ = writer.shutdown().await;
    Some(result)
}

/// Returns the request target when the line is `GET <path>[?query] ...`.
fn callback_target<'a>(request_line: &'a str, path: &str) -> Option<&'a str> {
    let mut parts = request_line.split_whitespace();
    if parts.next()? != "GET" {
        return None;
    }
    let target = parts.next()?;
    let requested = target.split('?').next().unwrap_or(target);
    let expected = if path.is_empty() { "/" } else { path };
    (expected == "/" || requested == expected).then_some(target)
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;

    #[test]
    fn codes_from_urls_and_bare_input() {
        assert_eq!(extract_code("  4/0AbCd-ef ").unwrap(), "4/0AbCd-ef");
        assert_eq!(
            extract_code("http://localhost:3500/oauth2callback?code=4%2F0AbC&scope=x").unwrap(),
            "4/0AbC"
        );
        assert!(extract_code("").is_err());
        assert!(
            extract_code("http://localhost/?error=access_denied")
                .unwrap_err()
                .contains("access_denied")
        );
        assert!(extract_code("http://localhost/?state=x").is_err());
    }

    #[test]
    fn loopback_targets() {
        assert_eq!(
            LoopbackTarget::from_redirect("http://localhost:3500/oauth2callback"),
            Some(LoopbackTarget {
                port: 3500,
                path: "/oauth2callback".into()
            })
        );
        assert!(LoopbackTarget::from_redirect("http://localhost").is_none());
        assert!(LoopbackTarget::from_redirect("https://example.com:8443/cb").is_none());
        assert!(LoopbackTarget::from_redirect("urn:ietf:wg:oauth:2.0:oob").is_none());
    }

    #[test]
    fn redirect_is_read_from_auth_url() {
        let url = "https://accounts.google.com/o/oauth2/v2/auth?client_id=x\
                   &redirect_uri=http%3A%2F%2Flocalhost%3A3500%2Fcb&response_type=code";
        assert_eq!(redirect_of(url).as_deref(), Some("http://localhost:3500/cb"));
    }

    #[test]
    fn request_lines() {
        assert_eq!(
            callback_target("GET /cb?code=1 HTTP/1.1\r\n", "/cb"),
            Some("/cb?code=1")
        );
        assert_eq!(callback_target("GET /favicon.ico HTTP/1.1\r\n", "/cb"), None);
        assert_eq!(callback_target("POST /cb HTTP/1.1\r\n", "/cb"), None);
        assert_eq!(callback_target("GET /?code=1 HTTP/1.1\r\n", "/"), Some("/?code=1"));
    }

    async fn send(port: u16, request: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn listener_skips_stray_requests() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let waiter =
            tokio::spawn(async move { wait_for_code(&listener, "/cb", Duration::from_secs(5)).await });

        let favicon = send(port, "GET /favicon.ico HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(favicon.starts_with("HTTP/1.1 404"));
        let page = send(port, "GET /cb?code=4%2Fabc&scope=s HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
        assert!(page.starts_with("HTTP/1.1 200"));

        assert_eq!(waiter.await.unwrap().unwrap(), "4/abc");
    }

    #[tokio::test]
    async fn listener_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let err = wait_for_code(&listener, "/cb", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
