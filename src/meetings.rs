use crate::dyte::MeetingApi;
use crate::dyte_types::{NewMeeting, NewParticipant, NewWebhook, Webhook, PARTICIPANT_JOINED};
use crate::error::{handle_error, AppError};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const HOST_PRESET: &str = "group_call_host";

/// Lifecycle of the single-use "participant joined" subscription of one meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinSubscription {
    Registered { webhook_id: String },
    Consumed,
}

/// What consuming a join subscription amounted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumption {
    /// The subscription was deleted by this call (or was already gone upstream).
    Deleted,
    /// A previous event already consumed it; the caller must not repeat side effects.
    AlreadyConsumed,
    /// No matching subscription could be found.
    NotFound,
}

/// Creates meeting rooms, adds agents to them, and owns their join-webhook subscriptions.
#[derive(Clone)]
pub struct MeetingBroker {
    api: Arc<dyn MeetingApi>,
    app_url: String,
    subscriptions: Arc<DashMap<String, (JoinSubscription, Instant)>>,
}

impl MeetingBroker {
    pub fn new(api: Arc<dyn MeetingApi>, app_url: String) -> Self {
        Self {
            api,
            app_url,
            subscriptions: Arc::new(DashMap::new()),
        }
    }

    pub async fn create_meeting(&self, title: &str) -> Result<String, AppError> {
        let meeting = self.api.create_meeting(&NewMeeting::titled(title)).await?;
        info!(meeting_id=%meeting.id, "created meeting");
        Ok(meeting.id)
    }

    /// Add a participant and return the auth token they join with.
    pub async fn add_participant(
        &self,
        meeting_id: &str,
        name: &str,
        external_id: &str,
        preset: &str,
    ) -> Result<String, AppError> {
        let participant = self
            .api
            .add_participant(
                meeting_id,
                &NewParticipant {
                    name: name.to_string(),
                    preset_name: preset.to_string(),
                    custom_participant_id: external_id.to_string(),
                },
            )
            .await?;
        Ok(participant.token)
    }

    pub fn build_join_link(&self, meeting_id: &str, join_token: &str) -> String {
        format!(
            "{}/v2/meeting?id={meeting_id}&authToken={join_token}",
            self.app_url
        )
    }

    pub async fn register_join_webhook(
        &self,
        meeting_id: &str,
        name: &str,
        callback_url: &str,
    ) -> Result<String, AppError> {
        let webhook = self
            .api
            .create_webhook(&NewWebhook {
                name: name.to_string(),
                url: callback_url.to_string(),
                events: vec![PARTICIPANT_JOINED.to_string()],
            })
            .await?;
        debug!(meeting_id, webhook_id=%webhook.id, "registered join webhook");
        self.subscriptions.insert(
            meeting_id.to_string(),
            (
                JoinSubscription::Registered {
                    webhook_id: webhook.id.clone(),
                },
                Instant::now(),
            ),
        );
        Ok(webhook.id)
    }

    /// Delete a subscription. Returns false when it was already gone upstream.
    pub async fn delete_webhook(&self, webhook_id: &str) -> Result<bool, AppError> {
        match self.api.delete_webhook(webhook_id).await {
            Ok(()) => Ok(true),
            Err(AppError::NotFound(_)) => {
                debug!(webhook_id, "webhook already deleted");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Rediscover a subscription whose id was not kept locally.
    pub async fn find_webhook_by_url_prefix(
        &self,
        url_prefix: &str,
        scope_fragment: &str,
    ) -> Result<Option<Webhook>, AppError> {
        Ok(self
            .api
            .list_webhooks()
            .await?
            .into_iter()
            .find(|webhook| {
                webhook.url.starts_with(url_prefix) && webhook.url.contains(scope_fragment)
            }))
    }

    pub fn is_consumed(&self, meeting_id: &str) -> bool {
        self.subscriptions
            .get(meeting_id)
            .is_some_and(|entry| entry.0 == JoinSubscription::Consumed)
    }

    /// Mark the join subscription of `meeting_id` consumed and delete it upstream, exactly once.
    ///
    /// Without a remembered id the subscription is looked up by `url_prefix` and
    /// `scope_fragment`. Upstream failures are logged; the subscription stays consumed locally.
    pub async fn consume_join_webhook(
        &self,
        meeting_id: Option<&str>,
        url_prefix: &str,
        scope_fragment: &str,
    ) -> Consumption {
        let previous = meeting_id.and_then(|id| {
            self.subscriptions
                .insert(id.to_string(), (JoinSubscription::Consumed, Instant::now()))
                .map(|(state, _)| state)
        });

        let webhook_id = match previous {
            Some(JoinSubscription::Consumed) => return Consumption::AlreadyConsumed,
            Some(JoinSubscription::Registered { webhook_id }) => webhook_id,
            None => match self.find_webhook_by_url_prefix(url_prefix, scope_fragment).await {
                Ok(Some(webhook)) => webhook.id,
                Ok(None) => {
                    debug!(scope_fragment, "no join webhook left to delete");
                    return Consumption::NotFound;
                }
                Err(e) => {
                    handle_error("failed to list meeting webhooks", e);
                    return Consumption::NotFound;
                }
            },
        };

        match self.delete_webhook(&webhook_id).await {
            Ok(_) => info!(webhook_id, "deleted join webhook"),
            Err(e) => warn!(webhook_id, error = %e, "failed to delete join webhook"),
        }
        Consumption::Deleted
    }

    /// Forget subscription records older than `ttl`.
    pub fn purge_older_than(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let before = self.subscriptions.len();
        self.subscriptions
            .retain(|_, (_, touched)| now.duration_since(*touched) < ttl);
        before.saturating_sub(self.subscriptions.len())
    }
}
