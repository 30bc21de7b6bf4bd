use crate::chatwoot::MessagingApi;
use crate::chatwoot_types::{NewContact, NewConversation};
use crate::error::AppError;

use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConversation {
    pub contact_id: u64,
    pub conversation_id: u64,
    pub source_id: String,
}

/// Finds or creates the contact and conversation a caller's phone number belongs to.
///
/// Any failing step aborts the resolution; nothing is retried here.
#[derive(Clone)]
pub struct ConversationResolver {
    messaging: Arc<dyn MessagingApi>,
}

impl ConversationResolver {
    pub fn new(messaging: Arc<dyn MessagingApi>) -> Self {
        Self { messaging }
    }

    pub async fn resolve(
        &self,
        phone_number: &str,
        inbox_id: u64,
    ) -> Result<ResolvedConversation, AppError> {
        let existing = self
            .messaging
            .search_contacts(phone_number)
            .await?
            .into_iter()
            .next();

        let (contact_id, source_id, conversation_id) = match existing {
            Some(contact) => {
                let source_id = contact
                    .contact_inboxes
                    .first()
                    .map(|inbox| inbox.source_id.clone())
                    .ok_or_else(|| {
                        AppError::upstream(
                            "chatwoot",
                            format!("contact {} has no contact inboxes", contact.id),
                        )
                    })?;
                let conversation_id = self
                    .messaging
                    .list_contact_conversations(contact.id)
                    .await?
                    .first()
                    .map(|conversation| conversation.id);
                debug!(contact_id = contact.id, ?conversation_id, "reusing existing contact");
                (contact.id, source_id, conversation_id)
            }
            None => {
                let created = self
                    .messaging
                    .create_contact(&NewContact {
                        name: phone_number.to_string(),
                        phone_number: phone_number.to_string(),
                        inbox_id,
                    })
                    .await?;
                info!(contact_id = created.contact.id, "created contact for caller");
                (created.contact.id, created.contact_inbox.source_id, None)
            }
        };

        let conversation_id = match conversation_id {
            Some(id) => id,
            None => {
                let created = self
                    .messaging
                    .create_conversation(&NewConversation {
                        source_id: source_id.clone(),
                        inbox_id,
                        contact_id,
                        status: "open",
                    })
                    .await?;
                info!(conversation_id = created.id, contact_id, "created conversation");
                created.id
            }
        };

        Ok(ResolvedConversation {
            contact_id,
            conversation_id,
            source_id,
        })
    }
}
