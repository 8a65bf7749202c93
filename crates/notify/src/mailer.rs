use std::sync::Mutex;

/// A rendered message, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub subject: String,
    pub body: String,
}

/// Delivery seam. Implementations enqueue or send; they should be quick and
/// must not panic — dispatch treats a failure as a logged, dropped message.
pub trait Mailer: Send + Sync {
    fn send(&self, recipient: &str, message: &EmailMessage) -> anyhow::Result<()>;
}

/// Test mailer that records instead of sending.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, EmailMessage)>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, EmailMessage)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, recipient: &str, message: &EmailMessage) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("recording mailer poisoned"))?
            .push((recipient.to_string(), message.clone()));
        Ok(())
    }
}
