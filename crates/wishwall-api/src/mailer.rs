//! Contributor invite delivery.
//!
//! Inviting a contributor hands an [`InviteEmail`] to the configured
//! [`InviteMailer`] on the blocking pool. Delivery is best effort: the
//! invite is already stored and its token is valid whether or not the
//! message goes out, so failures are only logged.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct InviteEmail {
    pub to_email: String,
    pub wall_title: String,
    pub unique_url: String,
    pub passcode: String,
    pub invite_token: String,
    /// Link that opens the contributor page with the token pre-filled
    pub contribute_url: String,
}

impl InviteEmail {
    pub fn subject(&self) -> String {
        format!("Invitation to contribute to {}", self.wall_title)
    }

    pub fn body(&self) -> String {
        format!(
            "You've been invited to add your wishes and greetings to {title}.\n\n\
             Wall URL: {url}\n\
             Passcode: {passcode}\n\n\
             Start contributing: {link}\n\
             Or use this invite token: {token}\n",
            title = self.wall_title,
            url = self.unique_url,
            passcode = self.passcode,
            link = self.contribute_url,
            token = self.invite_token,
        )
    }
}

pub fn contribute_url(frontend_url: &str, invite_token: &str) -> String {
    format!("{}/contribute?token={}", frontend_url.trim_end_matches('/'), invite_token)
}

/// Invite delivery abstraction.
pub trait InviteMailer: Send + Sync {
    /// Deliver the invite or return why it could not be sent.
    fn send_invite(&self, email: &InviteEmail) -> Result<()>;
}

/// Default sender: logs the invite instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogMailer;

impl InviteMailer for LogMailer {
    fn send_invite(&self, email: &InviteEmail) -> Result<()> {
        info!(
            to_email = %email.to_email,
            wall = %email.wall_title,
            contribute_url = %email.contribute_url,
            "invite email send stub"
        );
        debug!(subject = %email.subject(), body = %email.body(), "invite email content");
        Ok(())
    }
}

/// Fire-and-forget delivery on the blocking pool.
pub fn dispatch_invite(mailer: Arc<dyn InviteMailer>, email: InviteEmail) {
    tokio::task::spawn_blocking(move || {
        if let Err(e) = mailer.send_invite(&email) {
            warn!("Failed to send invite email to {}: {:#}", email.to_email, e);
        }
    });
}
