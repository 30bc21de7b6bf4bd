use crate::config::TwilioConfig;
use crate::error::AppError;
use crate::twilio_types::{CallResource, OutboundCallRequest, RecordingResource};
use crate::utils::decode_json;

use async_trait::async_trait;
use tracing::{debug, error};

const PROVIDER: &str = "twilio";

/// Call-control operations the orchestrator needs from the telephony provider.
#[async_trait]
pub trait TelephonyApi: Send + Sync {
    async fn place_call(&self, request: &OutboundCallRequest) -> Result<CallResource, AppError>;

    async fn fetch_call(&self, call_sid: &str) -> Result<CallResource, AppError>;

    /// Start recording a live call; Twilio posts to `callback_url` once the recording is ready.
    async fn create_recording(
        &self,
        call_sid: &str,
        callback_url: &str,
    ) -> Result<RecordingResource, AppError>;
}

pub struct TwilioClient {
    http_client: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioClient {
    pub fn new(http_client: reqwest::Client, config: TwilioConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn account_url(&self, path: &str) -> String {
        format!(
            "{}/Accounts/{}{}",
            self.config.api_url, self.config.account_sid, path
        )
    }
}

#[async_trait]
impl TelephonyApi for TwilioClient {
    async fn place_call(&self, request: &OutboundCallRequest) -> Result<CallResource, AppError> {
        let resp = self
            .http_client
            .post(self.account_url("/Calls.json"))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&request.form())
            .send()
            .await
            .map_err(|e| {
                error!(error=%e, "failed to send call request to twilio");
                AppError::upstream(PROVIDER, e)
            })?;
        let call: CallResource = decode_json(PROVIDER, "create call", resp).await?;
        debug!(call_sid=%call.sid, to=%request.to, "twilio call created");
        Ok(call)
    }

    async fn fetch_call(&self, call_sid: &str) -> Result<CallResource, AppError> {
        let resp = self
            .http_client
            .get(self.account_url(&format!("/Calls/{call_sid}.json")))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .send()
            .await
            .map_err(|e| AppError::upstream(PROVIDER, e))?;
        decode_json(PROVIDER, "fetch call", resp).await
    }

    async fn create_recording(
        &self,
        call_sid: &str,
        callback_url: &str,
    ) -> Result<RecordingResource, AppError> {
        let form = [
            ("RecordingStatusCallback", callback_url),
            ("RecordingStatusCallbackEvent", "completed"),
        ];
        let resp = self
            .http_client
            .post(self.account_url(&format!("/Calls/{call_sid}/Recordings.json")))
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::upstream(PROVIDER, e))?;
        decode_json(PROVIDER, "create recording", resp).await
    }
}
