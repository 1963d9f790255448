//! Notification dispatch
//!
//! Bin alerts and assignment notices are queued on a bounded channel and
//! mailed by a background worker. Nothing here can fail the transition that
//! produced the notice.

mod dispatcher;
mod mailer;

use serde::Serialize;
use thiserror::Error;

pub use dispatcher::{Notice, NotificationDispatcher};
pub use mailer::{HttpMailer, LogMailer, Mailer};

/// Notification errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Mail relay request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Mail relay rejected message: HTTP {0}")]
    Rejected(u16),
}

/// Outgoing email
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}
