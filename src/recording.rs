use crate::chatwoot::MessagingApi;
use crate::chatwoot_types::NewMessage;
use crate::utils::format_duration;

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Posts finished call recordings back into the conversation thread.
#[derive(Clone)]
pub struct RecordingRelay {
    messaging: Arc<dyn MessagingApi>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl RecordingRelay {
    pub fn new(messaging: Arc<dyn MessagingApi>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            messaging,
            max_attempts,
            retry_delay,
        }
    }

    /// Returns whether any attempt succeeded. Exhaustion is only logged.
    pub async fn post_recording(
        &self,
        conversation_id: u64,
        recording_url: &str,
        duration_seconds: u64,
    ) -> bool {
        let message = NewMessage::private_note(recording_note(recording_url, duration_seconds));
        for attempt in 1..=self.max_attempts {
            match self.messaging.post_message(conversation_id, &message).await {
                Ok(()) => {
                    info!(conversation_id, attempt, "recording posted to conversation");
                    return true;
                }
                Err(e) => {
                    warn!(conversation_id, attempt, error = %e, "failed to post recording");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        error!(conversation_id, recording_url, "all attempts to post recording failed");
        false
    }
}

pub fn recording_note(recording_url: &str, duration_seconds: u64) -> String {
    format!(
        "**Call recording: [Download Recording]({recording_url})\nDuration: {}**",
        format_duration(duration_seconds)
    )
}

/// Twilio sends `RecordingDuration` as a decimal string; anything unparsable counts as zero.
pub fn parse_duration(raw: Option<&str>) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(0)
}
