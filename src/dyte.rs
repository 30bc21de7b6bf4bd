use crate::config::DyteConfig;
use crate::dyte_types::{
    Envelope, Meeting, NewMeeting, NewParticipant, NewWebhook, Participant, Webhook,
};
use crate::error::AppError;
use crate::utils::{decode_json, ensure_success};

use async_trait::async_trait;

const PROVIDER: &str = "dyte";

/// Meeting, participant and webhook-subscription operations on the video provider.
#[async_trait]
pub trait MeetingApi: Send + Sync {
    async fn create_meeting(&self, meeting: &NewMeeting) -> Result<Meeting, AppError>;

    async fn add_participant(
        &self,
        meeting_id: &str,
        participant: &NewParticipant,
    ) -> Result<Participant, AppError>;

    async fn create_webhook(&self, webhook: &NewWebhook) -> Result<Webhook, AppError>;

    async fn list_webhooks(&self) -> Result<Vec<Webhook>, AppError>;

    /// Fails with `AppError::NotFound` when the subscription no longer exists.
    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), AppError>;
}

pub struct DyteClient {
    http_client: reqwest::Client,
    config: DyteConfig,
}

impl DyteClient {
    pub fn new(http_client: reqwest::Client, config: DyteConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.config.api_url, path))
            .basic_auth(&self.config.org_id, Some(&self.config.api_key))
    }
}

fn transport(e: reqwest::Error) -> AppError {
    AppError::upstream(PROVIDER, e)
}

#[async_trait]
impl MeetingApi for DyteClient {
    async fn create_meeting(&self, meeting: &NewMeeting) -> Result<Meeting, AppError> {
        let resp = self
            .request(reqwest::Method::POST, "/meetings")
            .json(meeting)
            .send()
            .await
            .map_err(transport)?;
        let created: Envelope<Meeting> = decode_json(PROVIDER, "create meeting", resp).await?;
        Ok(created.data)
    }

    async fn add_participant(
        &self,
        meeting_id: &str,
        participant: &NewParticipant,
    ) -> Result<Participant, AppError> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/meetings/{meeting_id}/participants"),
            )
            .json(participant)
            .send()
            .await
            .map_err(transport)?;
        let added: Envelope<Participant> = decode_json(PROVIDER, "add participant", resp).await?;
        Ok(added.data)
    }

    async fn create_webhook(&self, webhook: &NewWebhook) -> Result<Webhook, AppError> {
        let resp = self
            .request(reqwest::Method::POST, "/webhooks")
            .json(webhook)
            .send()
            .await
            .map_err(transport)?;
        let created: Envelope<Webhook> = decode_json(PROVIDER, "create webhook", resp).await?;
        Ok(created.data)
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>, AppError> {
        let resp = self
            .request(reqwest::Method::GET, "/webhooks")
            .send()
            .await
            .map_err(transport)?;
        let listed: Envelope<Vec<Webhook>> = decode_json(PROVIDER, "list webhooks", resp).await?;
        if !listed.success {
            return Err(AppError::upstream(PROVIDER, "list webhooks: success=false"));
        }
        Ok(listed.data)
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), AppError> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/webhooks/{webhook_id}"))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(PROVIDER, &format!("webhook {webhook_id}"), resp).await?;
        Ok(())
    }
}
