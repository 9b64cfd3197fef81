//! afk - Away From Keyboard messenger
//!
//! Sends a notification to a human through the ChatBridge relay (SMS or
//! WhatsApp) and waits for the reply on the session's server-sent event stream.

pub mod api;
pub mod config;
pub mod error;
pub mod event;
pub mod listener;
pub mod output;

pub use error::{Error, ListenError, Result};
pub use event::Event;
pub use listener::{ListenOptions, Listener};
