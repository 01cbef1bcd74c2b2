//! # Filetail
//!
//! Filetail follows a growing file the way `tail -F` does: it polls the file at a fixed interval and hands every newly
//! appended line to a listener, surviving the file going missing, being truncated or being replaced by logrotate.
//!
//! * `Tailer` that watches one path and reports events to a `TailerListener`. It does not own a thread, you decide
//! where its blocking `run` executes.
//!
//! ```rust no_run
//! # use std::time::Duration;
//! # use filetail::{Tailer, TailerConfig, TailerHandle, TailerListener};
//! struct FirstLines {
//!     handle: Option<TailerHandle>,
//!     seen: usize,
//! }
//!
//! impl TailerListener for FirstLines {
//!     fn on_init(&mut self, handle: &TailerHandle) {
//!         self.handle = Some(handle.clone());
//!     }
//!
//!     fn on_new_line(&mut self, line: String) {
//!         println!("{line}");
//!         self.seen += 1;
//!         if self.seen == 10 {
//!             // listener may stop its own tailer
//!             if let Some(handle) = &self.handle {
//!                 handle.stop();
//!             }
//!         }
//!     }
//! }
//!
//! let config = TailerConfig::new("/var/log/mail.log").poll_interval(Duration::from_millis(200));
//! let mut tailer = Tailer::with_config(config, FirstLines { handle: None, seen: 0 })?;
//! tailer.run();
//! # Ok::<(), filetail::TailerError>(())
//! ```
//!
//! * `TailerConfig` with defaults for everything but the path, deserializable with serde so it can live in your
//! application's config file.
//!
//! * `LineBuffer` that splits arbitrary byte chunks into complete lines, keeping unterminated tails for later.
//!
//! ```rust
//! # use filetail::LineBuffer;
//! let mut buffer = LineBuffer::new();
//! let mut lines = vec![];
//! buffer.push(b"first\nsec", |line| lines.push(line));
//! buffer.push(b"ond\n", |line| lines.push(line));
//! assert_eq!(lines, vec!["first", "second"]);
//! ```
//!
//! Diagnostics are emitted through `tracing`, install a subscriber to see them.

mod config;
mod error;
pub mod identity;
mod lines;
mod listener;
mod tailer;

pub use config::{TailerConfig, DEFAULT_BUFFER_SIZE, DEFAULT_POLL_INTERVAL_MS, MAX_BUFFER_SIZE};
pub use error::TailerError;
pub use identity::FileIdentity;
pub use lines::LineBuffer;
pub use listener::{TailerHandle, TailerListener};
pub use tailer::Tailer;
