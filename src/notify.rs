//! Fire-and-forget notifications
//!
//! High-value events (take-profit fills, treasury moves) go out through a
//! webhook; everything here is best-effort and never raises to the caller.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Notification capability
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification. Failures are logged and swallowed.
    async fn send(&self, title: &str, message: &str);
}

/// Webhook notifier configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Webhook endpoint URL
    #[serde(default)]
    pub url: String,
    /// Master switch
    #[serde(default)]
    pub enabled: bool,
    /// Minimum seconds between repeats of the same title
    #[serde(default = "default_rate_limit_secs")]
    pub rate_limit_secs: u64,
}

fn default_rate_limit_secs() -> u64 {
    60
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            enabled: false,
            rate_limit_secs: default_rate_limit_secs(),
        }
    }
}

/// Markdown webhook payload
#[derive(Debug, Serialize)]
struct WebhookMessage {
    msgtype: &'static str,
    markdown: MarkdownContent,
}

#[derive(Debug, Serialize)]
struct MarkdownContent {
    content: String,
}

/// Posts markdown messages to a webhook endpoint, rate-limited per title
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: reqwest::Client,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl WebhookNotifier {
    /// Create a new notifier
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Record a send attempt for `title`; false while the window is still open
    async fn check_rate_limit(&self, title: &str) -> bool {
        let mut times = self.last_sent.lock().await;
        let now = Instant::now();
        let window = Duration::from_secs(self.config.rate_limit_secs);

        if let Some(last) = times.get(title) {
            if now.duration_since(*last) < window {
                return false;
            }
        }

        times.insert(title.to_string(), now);
        true
    }

    fn build_content(title: &str, message: &str) -> String {
        let now = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        format!("## {title}\n\n**time**: {now}\n\n{message}")
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, title: &str, message: &str) {
        if !self.config.enabled {
            return;
        }

        if !self.check_rate_limit(title).await {
            debug!("Notification suppressed by rate limit: {title}");
            return;
        }

        let payload = WebhookMessage {
            msgtype: "markdown",
            markdown: MarkdownContent {
                content: Self::build_content(title, message),
            },
        };

        match self.client.post(&self.config.url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("Notification delivered: {title}");
            }
            Ok(resp) => warn!("Webhook returned {}: {title}", resp.status()),
            Err(e) => warn!("Webhook delivery failed: {e}"),
        }
    }
}

/// Notifier that drops everything (tests, dry runs)
#[derive(Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _title: &str, _message: &str) {}
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Recording notifier for asserting on emitted events.
pub mod mock {
    use super::*;

    #[derive(Default)]
    pub struct RecordingNotifier {
        pub events: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn event_count(&self) -> usize {
            self.events.lock().await.len()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, title: &str, message: &str) {
            self.events
                .lock()
                .await
                .push((title.to_string(), message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_notifier_is_a_noop() {
        let notifier = WebhookNotifier::new(WebhookConfig::default());
        // No endpoint configured; must return without attempting delivery
        notifier.send("title", "message").await;
    }

    #[tokio::test]
    async fn test_rate_limit_suppresses_repeats() {
        let notifier = WebhookNotifier::new(WebhookConfig {
            url: "http://localhost".into(),
            enabled: true,
            rate_limit_secs: 3600,
        });

        assert!(notifier.check_rate_limit("redeem").await);
        assert!(!notifier.check_rate_limit("redeem").await);
        // Distinct titles rate-limit independently
        assert!(notifier.check_rate_limit("deposit").await);
    }

    #[tokio::test]
    async fn test_recording_notifier_captures_events() {
        let notifier = mock::RecordingNotifier::new();
        notifier.send("a", "b").await;

        let events = notifier.events.lock().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "a");
    }
}
