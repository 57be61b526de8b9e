//! Outbound email. Only the welcome message exists; delivery is delegated to a
//! `Mailer` implementation, and the default one just logs what would be sent.

use anyhow::{anyhow, Result};
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    UserWelcome,
}

impl Template {
    pub fn name(&self) -> &'static str {
        match self {
            Template::UserWelcome => "user_welcome",
        }
    }
}

/// A rendered message ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub plain_body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, recipient: &str, template: Template, data: &Value) -> Result<()>;
}

pub fn render(sender: &str, recipient: &str, template: Template, data: &Value) -> Result<Message> {
    match template {
        Template::UserWelcome => {
            let user_id = data.get("userID").and_then(Value::as_i64).ok_or_else(|| anyhow!("welcome mail needs userID"))?;
            let token = data.get("activationToken").and_then(Value::as_str).ok_or_else(|| anyhow!("welcome mail needs activationToken"))?;
            let plain_body = format!(
                "Hi,\n\nThanks for signing up for a Marquee account. We're excited to have you on board!\n\n\
                 For future reference, your user ID number is {}.\n\n\
                 Please send a request to the `PUT /v1/users/activated` endpoint with the following JSON body to activate your account:\n\n\
                 {{\"token\": \"{}\"}}\n\n\
                 Please note that this is a one-time use token and it will expire in 3 days.\n\nThanks,\n\nThe Marquee Team\n",
                user_id, token
            );
            Ok(Message { sender: sender.to_string(), recipient: recipient.to_string(), subject: "Welcome to Marquee!".into(), plain_body })
        }
    }
}

/// Renders and logs; nothing leaves the process.
#[derive(Debug, Clone)]
pub struct LogMailer {
    sender: String,
}

impl LogMailer {
    pub fn new(sender: impl Into<String>) -> Self { Self { sender: sender.into() } }
}

impl Mailer for LogMailer {
    fn send(&self, recipient: &str, template: Template, data: &Value) -> Result<()> {
        let msg = render(&self.sender, recipient, template, data)?;
        info!(target: "mailer", from = %msg.sender, to = %msg.recipient, subject = %msg.subject, template = template.name(), "email queued");
        Ok(())
    }
}
