//! Output formatting for the message lifecycle
//!
//! Every method writes to the sink it is given, so the binary can choose
//! stdout or stderr and tests can capture into a buffer.

use crate::api::Channel;
use crate::config::OutputFormat;
use crate::event::{format_timestamp, Event};
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::io::{self, Write};
use std::time::Duration;

const RULE: &str = "────────────────────────────────────────";

/// Renders lifecycle events in the configured format
#[derive(Debug, Clone, Copy)]
pub struct Formatter {
    format: OutputFormat,
    quiet: bool,
}

impl Formatter {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Confirmation that the message went out
    pub fn message_sent(
        &self,
        w: &mut dyn Write,
        channel: Channel,
        session_id: &str,
        message_id: &str,
        message_len: usize,
        timeout: Duration,
        waiting: bool,
    ) -> io::Result<()> {
        if self.quiet {
            return writeln!(w, "Session: {}", session_id);
        }

        match self.format {
            OutputFormat::Json => json_output(
                w,
                json!({
                    "event": "message_sent",
                    "status": 200,
                    "channel": channel.to_string(),
                    "session": session_id,
                    "message_id": message_id,
                    "message_length": message_len,
                    "timeout": format_duration(timeout),
                    "sent_at": now_rfc3339(),
                    "awaiting_response": waiting,
                }),
            ),
            OutputFormat::Human => {
                writeln!(w, "200 OK - Message sent via {}", channel)?;
                writeln!(w, "Session: {}", session_id)
            }
            OutputFormat::Llm => {
                writeln!(w, "═══ AFK MESSAGE SENT ═══")?;
                writeln!(w, "Status: 200 OK")?;
                writeln!(w, "Channel: {}", channel)?;
                writeln!(w, "Session: {}", session_id)?;
                writeln!(w, "Sent: {}", now_rfc3339())?;
                if waiting {
                    writeln!(w, "Timeout: {}", format_duration(timeout))?;
                }
                writeln!(w, "Message-Length: {} chars", message_len)?;
                if waiting {
                    writeln!(w)?;
                    writeln!(w, "Awaiting response...")?;
                }
                Ok(())
            }
        }
    }

    /// Shown once before connecting to the event stream (human format only)
    pub fn waiting_start(&self, w: &mut dyn Write, timeout: Duration) -> io::Result<()> {
        if self.quiet || self.format != OutputFormat::Human {
            return Ok(());
        }
        writeln!(w)?;
        writeln!(w, "Waiting for response (timeout: {})...", format_duration(timeout))?;
        writeln!(w, "Press Ctrl+C to cancel")?;
        writeln!(w)
    }

    /// Reminder tick while waiting
    pub fn waiting(
        &self,
        w: &mut dyn Write,
        session_id: &str,
        elapsed: Duration,
        remaining: Duration,
    ) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => json_output(
                w,
                json!({
                    "event": "waiting",
                    "session": session_id,
                    "elapsed": format_duration(elapsed),
                    "remaining": format_duration(remaining),
                }),
            ),
            OutputFormat::Human => writeln!(
                w,
                "\n[{} elapsed, {} remaining] Still waiting for response...",
                format_duration(elapsed),
                format_duration(remaining)
            ),
            OutputFormat::Llm => {
                writeln!(w)?;
                writeln!(w, "═══ AFK WAITING ═══")?;
                writeln!(w, "Session: {}", session_id)?;
                writeln!(
                    w,
                    "Elapsed: {} | Remaining: {}",
                    format_duration(elapsed),
                    format_duration(remaining)
                )?;
                writeln!(w, "Status: No response yet")?;
                writeln!(w)?;
                writeln!(w, "<instruction>")?;
                writeln!(w, "You are waiting for human input. You may continue other work")?;
                writeln!(w, "if possible, or wait for the response.")?;
                writeln!(w, "</instruction>")
            }
        }
    }

    /// The human's reply
    pub fn response(
        &self,
        w: &mut dyn Write,
        session_id: &str,
        event: &Event,
        sent_via: Channel,
        wait_time: Duration,
    ) -> io::Result<()> {
        if self.quiet {
            return writeln!(w, "{}", event.content);
        }

        let channel = reply_channel(&event.from, sent_via);
        match self.format {
            OutputFormat::Json => json_output(
                w,
                json!({
                    "event": "response",
                    "session": session_id,
                    "from": event.from,
                    "channel": channel,
                    "content": event.content,
                    "wait_time": format_duration(wait_time),
                    "received_at": now_rfc3339(),
                }),
            ),
            OutputFormat::Human => {
                writeln!(w)?;
                writeln!(w, "{}", RULE)?;
                writeln!(
                    w,
                    "[{}] Response from {}:",
                    format_timestamp(event.timestamp),
                    event.from
                )?;
                writeln!(w)?;
                writeln!(w, "{}", event.content)?;
                writeln!(w)?;
                writeln!(w, "{}", RULE)?;
                writeln!(w)?;
                writeln!(w, "Response received. Exiting.")
            }
            OutputFormat::Llm => {
                writeln!(w)?;
                writeln!(w, "═══ AFK RESPONSE ═══")?;
                writeln!(w, "Session: {}", session_id)?;
                writeln!(w, "From: {}", event.from)?;
                writeln!(w, "Channel: {}", channel)?;
                writeln!(w, "Received: {}", now_rfc3339())?;
                writeln!(w, "Wait-Time: {}", format_duration(wait_time))?;
                writeln!(w)?;
                writeln!(w, "<response>")?;
                writeln!(w, "{}", event.content)?;
                writeln!(w, "</response>")
            }
        }
    }

    pub fn timeout(&self, w: &mut dyn Write, session_id: &str, elapsed: Duration) -> io::Result<()> {
        if self.quiet {
            return writeln!(w, "TIMEOUT");
        }

        match self.format {
            OutputFormat::Json => json_output(
                w,
                json!({
                    "event": "timeout",
                    "session": session_id,
                    "elapsed": format_duration(elapsed),
                }),
            ),
            OutputFormat::Human => writeln!(
                w,
                "\n408 Timeout: No response within {}",
                format_duration(elapsed)
            ),
            OutputFormat::Llm => {
                writeln!(w)?;
                writeln!(w, "═══ AFK TIMEOUT ═══")?;
                writeln!(w, "Session: {}", session_id)?;
                writeln!(w, "Elapsed: {}", format_duration(elapsed))?;
                writeln!(w, "Status: No response")?;
                writeln!(w)?;
                writeln!(w, "<instruction>")?;
                writeln!(w, "Developer did not respond. Consider: retry with different")?;
                writeln!(w, "wording, proceed with your best judgment, or ask again later.")?;
                writeln!(w, "</instruction>")
            }
        }
    }

    pub fn cancelled(&self, w: &mut dyn Write) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }

        match self.format {
            OutputFormat::Json => json_output(w, json!({ "event": "cancelled" })),
            OutputFormat::Human => writeln!(w, "\nCancelled. Exiting."),
            OutputFormat::Llm => {
                writeln!(w)?;
                writeln!(w, "═══ AFK CANCELLED ═══")?;
                writeln!(w, "Status: User cancelled")
            }
        }
    }

    /// Failure report; `session_id` may be empty when nothing was sent
    pub fn error(
        &self,
        w: &mut dyn Write,
        status: u16,
        message: &str,
        session_id: &str,
    ) -> io::Result<()> {
        if self.quiet {
            return writeln!(w, "{} {}", status, message);
        }

        match self.format {
            OutputFormat::Json => json_output(
                w,
                json!({
                    "event": "error",
                    "status": status,
                    "error": message,
                    "session": session_id,
                }),
            ),
            OutputFormat::Human => writeln!(w, "{} Error: {}", status, message),
            OutputFormat::Llm => {
                writeln!(w, "═══ AFK ERROR ═══")?;
                writeln!(w, "Status: {}", status)?;
                writeln!(w, "Error: {}", message)?;
                if !session_id.is_empty() {
                    writeln!(w, "Session: {}", session_id)?;
                }
                writeln!(w)?;
                writeln!(w, "<instruction>")?;
                writeln!(w, "Message failed to send. Run 'afk status' to diagnose.")?;
                writeln!(w, "</instruction>")
            }
        }
    }
}

/// Web replies are labelled as such; everything else came back on the send channel
pub fn reply_channel(from: &str, sent_via: Channel) -> String {
    if from == "web" {
        "Web".to_string()
    } else {
        sent_via.to_string()
    }
}

/// Compact duration: `1h30m`, `5m10s`, `42s`
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);

    if hours > 0 {
        if mins > 0 {
            format!("{}h{}m", hours, mins)
        } else {
            format!("{}h", hours)
        }
    } else if mins > 0 {
        if secs > 0 {
            format!("{}m{}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    } else {
        format!("{}s", secs)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn json_output(w: &mut dyn Write, value: Value) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, &value)?;
    writeln!(w)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut dyn Write) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn reply(from: &str, content: &str) -> Event {
        Event {
            kind: "message".to_string(),
            session_id: "afk-1".to_string(),
            from: from.to_string(),
            content: content.to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m");
        assert_eq!(format_duration(Duration::from_secs(310)), "5m10s");
        assert_eq!(format_duration(Duration::from_secs(3600)), "1h");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_millis(900)), "0s");
    }

    #[test]
    fn test_reply_channel() {
        assert_eq!(reply_channel("web", Channel::Sms), "Web");
        assert_eq!(reply_channel("+15551234567", Channel::Sms), "SMS");
        assert_eq!(reply_channel("+15551234567", Channel::WhatsApp), "WhatsApp");
    }

    #[test]
    fn test_llm_response_wraps_content() {
        let f = Formatter::new(OutputFormat::Llm, false);
        let out = render(|w| {
            f.response(w, "afk-1", &reply("web", "Use Redis"), Channel::Sms, Duration::from_secs(65))
        });
        assert!(out.contains("═══ AFK RESPONSE ═══"));
        assert!(out.contains("Channel: Web"));
        assert!(out.contains("Wait-Time: 1m5s"));
        assert!(out.contains("<response>\nUse Redis\n</response>"));
    }

    #[test]
    fn test_quiet_response_is_content_only() {
        let f = Formatter::new(OutputFormat::Llm, true);
        let out = render(|w| {
            f.response(w, "afk-1", &reply("web", "yes"), Channel::Sms, Duration::ZERO)
        });
        assert_eq!(out, "yes\n");
    }

    #[test]
    fn test_json_waiting() {
        let f = Formatter::new(OutputFormat::Json, false);
        let out = render(|w| {
            f.waiting(w, "afk-1", Duration::from_secs(900), Duration::from_secs(2700))
        });
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["event"], "waiting");
        assert_eq!(value["elapsed"], "15m");
        assert_eq!(value["remaining"], "45m");
    }

    #[test]
    fn test_json_message_sent() {
        let f = Formatter::new(OutputFormat::Json, false);
        let out = render(|w| {
            f.message_sent(w, Channel::WhatsApp, "afk-1", "msg-9", 12, Duration::from_secs(3600), true)
        });
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["channel"], "WhatsApp");
        assert_eq!(value["message_length"], 12);
        assert_eq!(value["timeout"], "1h");
        assert_eq!(value["awaiting_response"], true);
    }

    #[test]
    fn test_llm_message_sent_no_wait_omits_timeout() {
        let f = Formatter::new(OutputFormat::Llm, false);
        let out = render(|w| {
            f.message_sent(w, Channel::Sms, "afk-1", "", 5, Duration::from_secs(3600), false)
        });
        assert!(!out.contains("Timeout:"));
        assert!(!out.contains("Awaiting response"));
        assert!(out.contains("Message-Length: 5 chars"));
    }

    #[test]
    fn test_waiting_start_human_only() {
        let llm = Formatter::new(OutputFormat::Llm, false);
        assert!(render(|w| llm.waiting_start(w, Duration::from_secs(60))).is_empty());

        let human = Formatter::new(OutputFormat::Human, false);
        let out = render(|w| human.waiting_start(w, Duration::from_secs(60)));
        assert!(out.contains("timeout: 1m"));
    }

    #[test]
    fn test_human_timeout() {
        let f = Formatter::new(OutputFormat::Human, false);
        let out = render(|w| f.timeout(w, "afk-1", Duration::from_secs(1800)));
        assert_eq!(out, "\n408 Timeout: No response within 30m\n");
    }

    #[test]
    fn test_error_without_session() {
        let f = Formatter::new(OutputFormat::Llm, false);
        let out = render(|w| f.error(w, 500, "boom", ""));
        assert!(out.contains("Status: 500"));
        assert!(!out.contains("Session:"));
    }

    #[test]
    fn test_quiet_cancelled_silent() {
        let f = Formatter::new(OutputFormat::Human, true);
        assert!(render(|w| f.cancelled(w)).is_empty());
    }
}
