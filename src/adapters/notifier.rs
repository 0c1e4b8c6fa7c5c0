//! User-facing progress notices.
//!
//! The pipeline only ever talks to [`Notifier`]; the host decides how a
//! notice is shown. Two stock implementations are provided: one that
//! routes notices into tracing, one that prints to stderr for the CLI.

use std::time::Duration;

use super::{NoticeDuration, NoticeHandle, Notifier};

/// How long a finished-document notice stays up
pub const RESULT_NOTICE: NoticeDuration = NoticeDuration::Timed(Duration::from_secs(4));

/// Notifier that logs every notice through tracing
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

struct TracingNotice {
    message: String,
}

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, duration: NoticeDuration) -> Box<dyn NoticeHandle> {
        tracing::info!(?duration, "{}", message);
        Box::new(TracingNotice {
            message: message.to_string(),
        })
    }
}

impl NoticeHandle for TracingNotice {
    fn update_message(&mut self, message: &str) {
        if self.message != message {
            tracing::info!("{}", message);
            self.message = message.to_string();
        }
    }

    fn dismiss(self: Box<Self>) {
        tracing::trace!(message = %self.message, "Notice dismissed");
    }
}

/// Notifier that prints notices to stderr
#[derive(Debug, Default, Clone)]
pub struct ConsoleNotifier;

struct ConsoleNotice {
    persistent: bool,
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, message: &str, duration: NoticeDuration) -> Box<dyn NoticeHandle> {
        eprintln!("{}", message);
        Box::new(ConsoleNotice {
            persistent: matches!(duration, NoticeDuration::Persistent),
        })
    }
}

impl NoticeHandle for ConsoleNotice {
    fn update_message(&mut self, message: &str) {
        eprintln!("{}", message);
    }

    fn dismiss(self: Box<Self>) {
        // Timed notices have nothing to clear on a terminal
        if self.persistent {
            eprintln!();
        }
    }
}
