//! Webhook participant log.
//!
//! Each registration is POSTed as JSON to a configured URL. The session loop
//! is synchronous, so [`ExternalLog::append`] only spawns the request on the
//! tokio runtime and returns; failures are logged when the request finishes.
//! [`ExternalLog::flush`] waits for the requests still running at shutdown.

use std::time::Duration;

use booth_core::{BoothError, ExternalLog, Registration};
use reqwest::Client;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{LedgerError, Result};

/// Timeout for a single webhook request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for posts in flight.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Posts registrations to an HTTP endpoint.
#[derive(Debug)]
pub struct WebhookLog {
    url: String,
    client: Client,
    handle: Handle,
    in_flight: Vec<JoinHandle<()>>,
    flush_timeout: Duration,
}

impl WebhookLog {
    /// Creates a webhook log posting to `url` from tasks on `handle`.
    pub fn new(url: impl Into<String>, handle: Handle) -> Result<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(LedgerError::InvalidUrl(url));
        }

        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            url,
            client,
            handle,
            in_flight: Vec::new(),
            flush_timeout: FLUSH_TIMEOUT,
        })
    }

    /// Sets how long [`ExternalLog::flush`] waits for posts in flight.
    #[must_use]
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Number of posts that have not finished yet.
    pub fn in_flight(&mut self) -> usize {
        self.in_flight.retain(|task| !task.is_finished());
        self.in_flight.len()
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts `registration` and waits for a successful status.
    pub async fn post(&self, registration: &Registration) -> Result<()> {
        post_registration(&self.client, &self.url, registration).await
    }
}

async fn post_registration(client: &Client, url: &str, registration: &Registration) -> Result<()> {
    client
        .post(url)
        .json(registration)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

impl ExternalLog for WebhookLog {
    fn append(&mut self, registration: &Registration) -> booth_core::Result<()> {
        let client = self.client.clone();
        let url = self.url.clone();
        let registration = registration.clone();

        self.in_flight.retain(|task| !task.is_finished());
        let task = self.handle.spawn(async move {
            match post_registration(&client, &url, &registration).await {
                Ok(()) => debug!(token = %registration.token, "Registration posted to webhook"),
                Err(e) => warn!(
                    token = %registration.token,
                    url = %url,
                    error = %e,
                    "Webhook append failed"
                ),
            }
        });
        self.in_flight.push(task);
        Ok(())
    }

    /// Blocks until every post in flight finishes or the flush timeout runs
    /// out. Must not be called from inside an async task.
    fn flush(&mut self) -> booth_core::Result<()> {
        let pending = self.in_flight();
        if pending == 0 {
            return Ok(());
        }

        info!(pending, "Waiting for webhook posts to finish");
        let tasks = std::mem::take(&mut self.in_flight);
        let waited = self.handle.block_on(tokio::time::timeout(self.flush_timeout, async {
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "Webhook post task failed");
                }
            }
        }));

        waited.map_err(|_| {
            BoothError::log_append(
                "webhook",
                format!(
                    "posts still pending after {}ms",
                    self.flush_timeout.as_millis()
                ),
            )
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use super::*;

    /// Accepts one HTTP request, replies with `status`, and hands back the
    /// request text.
    async fn one_shot_server(status: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !String::from_utf8_lossy(&request).contains("\"registeredAt\"") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&request).into_owned());
        });

        (url, rx)
    }

    #[test]
    fn test_rejects_non_http_url() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let err = WebhookLog::new("ftp://example.com/hook", runtime.handle().clone()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_post_sends_registration_json() {
        let (url, request) = one_shot_server("200 OK").await;
        let log = WebhookLog::new(&url, Handle::current()).unwrap();

        log.post(&Registration::new("Ada", "042")).await.unwrap();

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /hook"));
        assert!(request.contains(r#""name":"Ada""#));
        assert!(request.contains(r#""token":"042""#));
    }

    #[tokio::test]
    async fn test_post_error_status() {
        let (url, _request) = one_shot_server("500 Internal Server Error").await;
        let log = WebhookLog::new(&url, Handle::current()).unwrap();

        let err = log.post(&Registration::new("Ada", "042")).await.unwrap_err();
        assert!(matches!(err, LedgerError::Http(_)));
    }

    #[tokio::test]
    async fn test_append_returns_immediately() {
        let (url, request) = one_shot_server("200 OK").await;
        let mut log = WebhookLog::new(&url, Handle::current()).unwrap();

        log.append(&Registration::new("Grace", "917")).unwrap();

        let request = request.await.unwrap();
        assert!(request.contains(r#""name":"Grace""#));
    }

    #[test]
    fn test_flush_waits_for_pending_post() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (url, request) = runtime.block_on(one_shot_server("200 OK"));
        let mut log = WebhookLog::new(&url, runtime.handle().clone()).unwrap();

        log.append(&Registration::new("Ada", "042")).unwrap();
        log.flush().unwrap();

        assert_eq!(log.in_flight(), 0);
        let request = runtime.block_on(request).unwrap();
        assert!(request.contains(r#""name":"Ada""#));
    }

    #[test]
    fn test_flush_gives_up_on_silent_endpoint() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        // Accepts the connection but never answers
        let listener = runtime
            .block_on(TcpListener::bind("127.0.0.1:0"))
            .unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        runtime.spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let mut log = WebhookLog::new(&url, runtime.handle().clone())
            .unwrap()
            .with_flush_timeout(Duration::from_millis(200));
        log.append(&Registration::new("Ada", "042")).unwrap();

        let err = log.flush().unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_flush_without_posts_is_noop() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut log = WebhookLog::new("http://127.0.0.1:9/hook", runtime.handle().clone()).unwrap();
        assert!(log.flush().is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_does_not_fail_append() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        drop(listener);

        let mut log = WebhookLog::new(&url, Handle::current()).unwrap();
        assert!(log.append(&Registration::new("Ada", "042")).is_ok());
    }
}
