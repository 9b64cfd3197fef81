//! Response listener
//!
//! Opens the session's event stream and waits for the first human reply,
//! racing it against a deadline, caller cancellation and periodic reminders.
//! Exactly one terminal outcome is produced per call.

use crate::error::ListenError;
use crate::event::{decode_line, Event};
use futures_util::TryStreamExt;
use reqwest::{header, RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

/// Longest accepted stream line, newline included
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Called once with the reply that ended the wait
pub type EventHandler<'a> = Box<dyn FnMut(&Event) + Send + 'a>;

/// Called on each reminder tick with (elapsed, remaining)
pub type ReminderHandler<'a> = Box<dyn FnMut(Duration, Duration) + Send + 'a>;

/// Configuration for one listen call
pub struct ListenOptions<'a> {
    pub timeout: Duration,
    /// `None` or zero disables reminders
    pub reminder_interval: Option<Duration>,
    pub on_event: Option<EventHandler<'a>>,
    pub on_reminder: Option<ReminderHandler<'a>>,
}

impl<'a> ListenOptions<'a> {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            reminder_interval: None,
            on_event: None,
            on_reminder: None,
        }
    }

    pub fn reminder_every(mut self, interval: Duration) -> Self {
        self.reminder_interval = Some(interval);
        self
    }

    pub fn on_event(mut self, handler: impl FnMut(&Event) + Send + 'a) -> Self {
        self.on_event = Some(Box::new(handler));
        self
    }

    pub fn on_reminder(mut self, handler: impl FnMut(Duration, Duration) + Send + 'a) -> Self {
        self.on_reminder = Some(Box::new(handler));
        self
    }

    /// Reminder period, only when there is someone to remind
    fn reminder_period(&self) -> Option<Duration> {
        match (self.reminder_interval, &self.on_reminder) {
            (Some(interval), Some(_)) if !interval.is_zero() => Some(interval),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ListenOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenOptions")
            .field("timeout", &self.timeout)
            .field("reminder_interval", &self.reminder_interval)
            .field("on_event", &self.on_event.is_some())
            .field("on_reminder", &self.on_reminder.is_some())
            .finish()
    }
}

/// Listens on a session's event stream for the human reply
#[derive(Debug, Clone)]
pub struct Listener {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl Listener {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        // No request timeout: the stream is long-lived and bounded by ListenOptions
        Self::with_client(base_url, api_key, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, api_key: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        }
    }

    pub fn events_url(&self, session_id: &str) -> String {
        format!("{}/api/events/{}", self.base_url, session_id)
    }

    /// Wait for the first deliverable reply on `session_id`.
    ///
    /// Resolves to the event, or to exactly one of `Unauthorized`,
    /// `Transport`, `StreamClosed`, `Timeout` or `Cancelled`. When a
    /// reply and a terminal condition are both ready, cancellation wins,
    /// then the deadline, then the reply; reminder ticks never preempt any
    /// of them. A zero timeout resolves to `Timeout` without connecting.
    pub async fn listen(
        &self,
        cancel: CancellationToken,
        session_id: &str,
        mut options: ListenOptions<'_>,
    ) -> Result<Event, ListenError> {
        let start = Instant::now();
        if options.timeout.is_zero() {
            return Err(ListenError::Timeout(options.timeout));
        }

        let request = self
            .http
            .get(self.events_url(session_id))
            .header(header::ACCEPT, "text/event-stream")
            .header("X-API-Key", &self.api_key)
            .header(header::CACHE_CONTROL, "no-cache");

        // Single slot: the reader never blocks on send, even after we return
        let (tx, mut outcome) = oneshot::channel();
        let _reader = AbortOnDrop(tokio::spawn(async move {
            let _ = tx.send(read_stream(request).await);
        }));

        let mut ticker = options.reminder_period().map(|period| {
            let mut ticker = time::interval_at(start + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        let deadline = time::sleep_until(start + options.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return Err(ListenError::Cancelled),

                _ = &mut deadline => return Err(ListenError::Timeout(options.timeout)),

                result = &mut outcome => {
                    let event = match result {
                        Ok(result) => result?,
                        Err(_) => {
                            return Err(ListenError::Transport(
                                "event reader stopped unexpectedly".to_string(),
                            ))
                        }
                    };
                    if let Some(on_event) = options.on_event.as_mut() {
                        on_event(&event);
                    }
                    return Ok(event);
                }

                _ = next_tick(&mut ticker) => {
                    let elapsed = start.elapsed();
                    let remaining = options.timeout.saturating_sub(elapsed);
                    if let Some(on_reminder) = options.on_reminder.as_mut() {
                        on_reminder(elapsed, remaining);
                    }
                }
            }
        }
    }
}

/// Aborting the reader drops the response and tears down the connection,
/// which is the only way to unblock a pending read
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Connect and read lines until the first deliverable record
async fn read_stream(request: RequestBuilder) -> Result<Event, ListenError> {
    let response = request
        .send()
        .await
        .map_err(|e| ListenError::Transport(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ListenError::Unauthorized);
    }
    if !status.is_success() {
        return Err(ListenError::Transport(format!("API error: {}", status)));
    }

    let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
    let mut reader = StreamReader::new(body);
    let mut line = Vec::new();

    loop {
        line.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64 + 1)
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| ListenError::Transport(e.to_string()))?;
        if read == 0 {
            break;
        }
        if line.len() > MAX_LINE_BYTES && !line.ends_with(b"\n") {
            return Err(ListenError::Transport(format!(
                "event line exceeds {} bytes",
                MAX_LINE_BYTES
            )));
        }

        let raw = line.strip_suffix(b"\n").unwrap_or(&line);
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        // Invalid UTF-8 is replaced, not fatal; the record is judged on its JSON
        if let Some(event) = decode_line(&String::from_utf8_lossy(raw)) {
            return Ok(event);
        }
    }

    Err(ListenError::StreamClosed)
}
