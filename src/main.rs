//! afk - Away From Keyboard messenger for AI agents
//!
//! Sends a message over SMS or WhatsApp, then waits for the human's reply.

use afk::api::{ApiClient, Channel};
use afk::config::{self, parse_duration, Config, OutputFormat};
use afk::error::ListenError;
use afk::listener::{ListenOptions, Listener};
use afk::output::Formatter;
use clap::{Args, Parser, Subcommand};
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_SUCCESS: u8 = 0;
const EXIT_BAD_ARGS: u8 = 1;
const EXIT_API_ERROR: u8 = 2;
const EXIT_TIMEOUT: u8 = 3;
const EXIT_SEND_FAILED: u8 = 4;

const AFTER_HELP: &str = "\
CONFIGURATION:
  Credentials are read from ~/.afk/config.json:
    {
      \"api_key\": \"cb_test_...\",
      \"api_url\": \"https://chatbridge.net\",
      \"sys_name\": \"Claude Code\",
      \"reminder_interval\": \"15m\",
      \"format\": \"llm\"
    }
  AFK_API_KEY and AFK_API_URL override the file.

EXIT CODES:
  0 - Success (message sent, response received if waiting, or cancelled)
  1 - Invalid arguments or configuration error
  2 - API connection failed
  3 - Timeout waiting for response
  4 - Message send failed";

/// afk - notify a developer over SMS/WhatsApp and wait for the reply
#[derive(Parser)]
#[command(name = "afk", version)]
#[command(about = "Away From Keyboard messenger for AI agents")]
#[command(after_help = AFTER_HELP)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    send: SendArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Check configuration, API health and key validity
    Status,
}

#[derive(Args)]
struct SendArgs {
    /// Send message via SMS
    #[arg(long)]
    sms: bool,

    /// Send message via WhatsApp
    #[arg(long)]
    whatsapp: bool,

    /// Message content
    #[arg(long)]
    msg: Option<String>,

    /// Send message and exit without waiting
    #[arg(long = "no-wait")]
    no_wait: bool,

    /// How long to wait for a response (e.g. 30m, 2h)
    #[arg(long, default_value = "1h", value_parser = parse_duration_arg)]
    timeout: Duration,

    /// Reminder interval while waiting (e.g. 15m, 0 to disable)
    #[arg(long)]
    reminder: Option<String>,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Minimal output (just response content)
    #[arg(short, long)]
    quiet: bool,
}

impl SendArgs {
    fn is_empty(&self) -> bool {
        !self.sms && !self.whatsapp && self.msg.is_none()
    }
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries agent-facing output; diagnostics go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(EXIT_BAD_ARGS)
            } else {
                ExitCode::from(EXIT_SUCCESS)
            };
        }
    };

    let code = match cli.command {
        Some(Commands::Status) => cmd_status().await,
        None if cli.send.is_empty() => {
            let _ = <Cli as clap::CommandFactory>::command().print_help();
            EXIT_SUCCESS
        }
        None => cmd_send(cli.send).await,
    };

    ExitCode::from(code)
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_send(args: SendArgs) -> u8 {
    let channel = match (args.sms, args.whatsapp) {
        (true, false) => Channel::Sms,
        (false, true) => Channel::WhatsApp,
        (false, false) => {
            eprintln!("400 Bad Request: Must specify --sms or --whatsapp");
            eprintln!("Run 'afk -h' for usage");
            return EXIT_BAD_ARGS;
        }
        (true, true) => {
            eprintln!("400 Bad Request: Cannot use both --sms and --whatsapp");
            return EXIT_BAD_ARGS;
        }
    };

    let message = match args.msg.as_deref() {
        Some(m) if !m.is_empty() => m,
        _ => {
            eprintln!("400 Bad Request: --msg is required");
            return EXIT_BAD_ARGS;
        }
    };

    let mut config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("401 Unauthorized: {}", e);
            return EXIT_BAD_ARGS;
        }
    };

    if let Some(format) = args.format {
        config.format = format;
    }
    if let Some(reminder) = args.reminder {
        config.reminder_interval = reminder;
    }

    let reminder = match config.reminder() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("400 Bad Request: Invalid reminder interval: {}", e);
            return EXIT_BAD_ARGS;
        }
    };

    let out = Formatter::new(config.format, args.quiet);

    let client = match ApiClient::new(&config.api_url, &config.api_key) {
        Ok(c) => c,
        Err(e) => {
            emit(out.error(&mut report_sink(&out), 500, &e.to_string(), ""));
            return EXIT_SEND_FAILED;
        }
    };

    let sent = match channel {
        Channel::Sms => client.send_sms(message).await,
        Channel::WhatsApp => client.send_whatsapp(message, &config.sys_name).await,
    };

    let sent = match sent {
        Ok(r) => r,
        Err(e) => {
            emit(out.error(&mut report_sink(&out), 500, &e.to_string(), ""));
            return EXIT_SEND_FAILED;
        }
    };

    // The server always assigns the session
    let session_id = sent.session_id.unwrap_or_default();
    if session_id.is_empty() {
        emit(out.error(&mut report_sink(&out), 500, "Server did not return session ID", ""));
        return EXIT_SEND_FAILED;
    }
    let message_id = sent.message_id.unwrap_or_default();

    emit(out.message_sent(
        &mut io::stdout(),
        channel,
        &session_id,
        &message_id,
        message.chars().count(),
        args.timeout,
        !args.no_wait,
    ));

    if args.no_wait {
        return EXIT_SUCCESS;
    }

    emit(out.waiting_start(&mut io::stdout(), args.timeout));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let start = Instant::now();
    let listener = Listener::new(&config.api_url, &config.api_key);

    let mut options = ListenOptions::new(args.timeout)
        .on_event(|event| {
            emit(out.response(&mut io::stdout(), &session_id, event, channel, start.elapsed()));
        })
        .on_reminder(|elapsed, remaining| {
            emit(out.waiting(&mut io::stdout(), &session_id, elapsed, remaining));
        });
    if let Some(interval) = reminder {
        options = options.reminder_every(interval);
    }

    info!("Waiting for reply on session {}", session_id);
    match listener.listen(cancel, &session_id, options).await {
        Ok(event) => {
            debug!("Reply from {} ({} chars)", event.from, event.content.len());
            EXIT_SUCCESS
        }
        Err(ListenError::Timeout(timeout)) => {
            emit(out.timeout(&mut report_sink(&out), &session_id, timeout));
            EXIT_TIMEOUT
        }
        Err(ListenError::Cancelled) => {
            emit(out.cancelled(&mut io::stdout()));
            EXIT_SUCCESS
        }
        Err(e) => {
            let status = if e == ListenError::Unauthorized { 401 } else { 503 };
            emit(out.error(&mut report_sink(&out), status, &e.to_string(), &session_id));
            EXIT_API_ERROR
        }
    }
}

async fn cmd_status() -> u8 {
    println!("ChatBridge Status");
    println!("=================");
    println!();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            println!("Credentials: {} ✗ Not configured", config::display_path());
            println!();
            println!("Create the config file or set {} ({})", config::ENV_API_KEY, e);
            return EXIT_BAD_ARGS;
        }
    };

    println!("Credentials: {} ✓", config::display_path());
    print!("API: {} ", config.api_url);
    let _ = io::stdout().flush();

    let client = match ApiClient::new(&config.api_url, &config.api_key) {
        Ok(c) => c,
        Err(e) => {
            println!("✗ Offline");
            eprintln!("  Error: {}", e);
            return EXIT_API_ERROR;
        }
    };

    if let Err(e) = client.health().await {
        println!("✗ Offline");
        eprintln!("  Error: {}", e);
        return EXIT_API_ERROR;
    }
    println!("✓ Online");

    print!("API Key: ");
    let _ = io::stdout().flush();
    if let Err(e) = client.validate_key().await {
        println!("✗ Invalid");
        eprintln!("  Error: {}", e);
        return EXIT_API_ERROR;
    }
    println!("✓ Valid ({})", config.masked_key());

    println!();
    println!("Ready to send messages.");
    EXIT_SUCCESS
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Cancel the wait on Ctrl-C or SIGTERM
async fn cancel_on_signal(cancel: CancellationToken) {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    cancel.cancel();
}

/// Failure reports go to stderr, except JSON where stdout carries every record
fn report_sink(out: &Formatter) -> Box<dyn Write> {
    match out.format() {
        OutputFormat::Json => Box::new(io::stdout()),
        _ => Box::new(io::stderr()),
    }
}

fn emit(result: io::Result<()>) {
    if let Err(e) = result {
        warn!("Failed to write output: {}", e);
    }
}
