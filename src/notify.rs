use chrono::Utc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::Notification;

pub fn notification(
    user_id: Uuid,
    title: &str,
    message: impl Into<String>,
    kind: &str,
    related_id: Option<Uuid>,
) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        user_id,
        title: title.to_string(),
        message: message.into(),
        kind: kind.to_string(),
        related_id,
        is_read: false,
        created_at: Utc::now(),
    }
}

/// Real-time delivery of notifications that are already committed.
///
/// Delivery is best-effort: failures are logged and never surface to the
/// operation that produced the notification.
#[derive(Clone, Debug)]
pub enum Notifier {
    /// Logs each notification; used when no push endpoint is configured.
    Log,
    /// POSTs each notification as JSON to `url`.
    Webhook { client: reqwest::Client, url: String },
}

impl Notifier {
    pub fn webhook(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Notifier::Webhook { client, url: url.into() })
    }

    pub async fn push(&self, n: &Notification) {
        match self {
            Notifier::Log => {
                tracing::info!(user_id=%n.user_id, kind=%n.kind, title=%n.title, "notification");
            }
            Notifier::Webhook { client, url } => {
                let sent = client
                    .post(url)
                    .json(n)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status());
                if let Err(e) = sent {
                    tracing::warn!(error=%e, user_id=%n.user_id, "notification push failed");
                }
            }
        }
    }

    pub async fn push_all(&self, ns: &[Notification]) {
        for n in ns {
            self.push(n).await;
        }
    }
}
