use crate::chatwoot_types::{
    Agent, Contact, ConversationDetails, ConversationRef, CreatedContact, Inbox, NewContact,
    NewConversation, NewMessage, Payload,
};
use crate::config::ChatwootConfig;
use crate::error::AppError;
use crate::utils::{decode_json, ensure_success};

use async_trait::async_trait;
use tracing::trace;

const PROVIDER: &str = "chatwoot";

/// Conversation, contact and agent operations on the support messaging platform.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn list_inboxes(&self) -> Result<Vec<Inbox>, AppError>;

    async fn list_inbox_agents(&self, inbox_id: u64) -> Result<Vec<Agent>, AppError>;

    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, AppError>;

    async fn create_contact(&self, contact: &NewContact) -> Result<CreatedContact, AppError>;

    /// Conversations of a contact, most recent first.
    async fn list_contact_conversations(
        &self,
        contact_id: u64,
    ) -> Result<Vec<ConversationRef>, AppError>;

    async fn create_conversation(
        &self,
        conversation: &NewConversation,
    ) -> Result<ConversationRef, AppError>;

    async fn get_conversation(&self, conversation_id: u64)
        -> Result<ConversationDetails, AppError>;

    async fn post_message(&self, conversation_id: u64, message: &NewMessage)
        -> Result<(), AppError>;
}

pub struct ChatwootClient {
    http_client: reqwest::Client,
    config: ChatwootConfig,
}

impl ChatwootClient {
    pub fn new(http_client: reqwest::Client, config: ChatwootConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/v1/accounts/{}{}",
            self.config.instance_url, self.config.account_id, path
        )
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(self.url(path))
            .header("api_access_token", &self.config.access_token)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http_client
            .post(self.url(path))
            .header("api_access_token", &self.config.access_token)
    }
}

fn transport(e: reqwest::Error) -> AppError {
    AppError::upstream(PROVIDER, e)
}

#[async_trait]
impl MessagingApi for ChatwootClient {
    async fn list_inboxes(&self) -> Result<Vec<Inbox>, AppError> {
        let resp = self.get("/inboxes").send().await.map_err(transport)?;
        let inboxes: Payload<Vec<Inbox>> = decode_json(PROVIDER, "list inboxes", resp).await?;
        Ok(inboxes.payload)
    }

    async fn list_inbox_agents(&self, inbox_id: u64) -> Result<Vec<Agent>, AppError> {
        let resp = self
            .get(&format!("/inbox_members/{inbox_id}"))
            .send()
            .await
            .map_err(transport)?;
        let agents: Payload<Vec<Agent>> = decode_json(PROVIDER, "list inbox agents", resp).await?;
        trace!(inbox_id, count = agents.payload.len(), "fetched inbox agents");
        Ok(agents.payload)
    }

    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, AppError> {
        let resp = self
            .get("/contacts/search")
            .query(&[("q", query)])
            .send()
            .await
            .map_err(transport)?;
        let contacts: Payload<Vec<Contact>> =
            decode_json(PROVIDER, "search contacts", resp).await?;
        Ok(contacts.payload)
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<CreatedContact, AppError> {
        let resp = self
            .post("/contacts")
            .json(contact)
            .send()
            .await
            .map_err(transport)?;
        let created: Payload<CreatedContact> =
            decode_json(PROVIDER, "create contact", resp).await?;
        Ok(created.payload)
    }

    async fn list_contact_conversations(
        &self,
        contact_id: u64,
    ) -> Result<Vec<ConversationRef>, AppError> {
        let resp = self
            .get(&format!("/contacts/{contact_id}/conversations"))
            .send()
            .await
            .map_err(transport)?;
        let conversations: Payload<Vec<ConversationRef>> =
            decode_json(PROVIDER, "list contact conversations", resp).await?;
        Ok(conversations.payload)
    }

    async fn create_conversation(
        &self,
        conversation: &NewConversation,
    ) -> Result<ConversationRef, AppError> {
        let resp = self
            .post("/conversations")
            .json(conversation)
            .send()
            .await
            .map_err(transport)?;
        decode_json(PROVIDER, "create conversation", resp).await
    }

    async fn get_conversation(
        &self,
        conversation_id: u64,
    ) -> Result<ConversationDetails, AppError> {
        let resp = self
            .get(&format!("/conversations/{conversation_id}"))
            .send()
            .await
            .map_err(transport)?;
        decode_json(PROVIDER, "get conversation", resp).await
    }

    async fn post_message(
        &self,
        conversation_id: u64,
        message: &NewMessage,
    ) -> Result<(), AppError> {
        let resp = self
            .post(&format!("/conversations/{conversation_id}/messages"))
            .json(message)
            .send()
            .await
            .map_err(transport)?;
        ensure_success(PROVIDER, "post message", resp).await?;
        Ok(())
    }
}
