use serde::{Deserialize, Serialize};

/// Most list endpoints wrap their results in `{"payload": [...]}`.
#[derive(Deserialize, Debug)]
pub struct Payload<T> {
    pub payload: T,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Inbox {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityStatus {
    Online,
    Busy,
    Offline,
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Agent {
    pub id: u64,
    #[serde(default)]
    pub available_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub availability_status: AvailabilityStatus,
}

impl Agent {
    pub fn display_name(&self) -> String {
        self.available_name
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("Agent {}", self.id))
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct ContactInbox {
    pub source_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Contact {
    pub id: u64,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub contact_inboxes: Vec<ContactInbox>,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewContact {
    pub name: String,
    pub phone_number: String,
    pub inbox_id: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreatedContactId {
    pub id: u64,
}

#[derive(Deserialize, Debug, Clone)]
pub struct CreatedContact {
    pub contact: CreatedContactId,
    pub contact_inbox: ContactInbox,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ConversationRef {
    pub id: u64,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewConversation {
    pub source_id: String,
    pub inbox_id: u64,
    pub contact_id: u64,
    pub status: &'static str,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ConversationSender {
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ConversationMeta {
    #[serde(default)]
    pub sender: ConversationSender,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ConversationDetails {
    pub id: u64,
    #[serde(default)]
    pub meta: ConversationMeta,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Incoming,
    Outgoing,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub content: String,
    pub message_type: MessageType,
    #[serde(rename = "private")]
    pub is_private: bool,
}

impl NewMessage {
    /// A note only agents see, used for call status and recordings.
    pub fn private_note(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Outgoing,
            is_private: true,
        }
    }

    pub fn incoming(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Incoming,
            is_private: false,
        }
    }
}

/// `message_created` webhook delivered by Chatwoot when an agent posts into a conversation.
#[derive(Deserialize, Debug, Default)]
pub struct MessageCreatedEvent {
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub content_attributes: Option<ContentAttributes>,
    #[serde(default)]
    pub conversation: Option<ConversationRef>,
    #[serde(default)]
    pub sender: Option<EventSender>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ContentAttributes {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<MeetingAttachment>,
}

#[derive(Deserialize, Debug, Default)]
pub struct MeetingAttachment {
    #[serde(default)]
    pub meeting_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EventSender {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl MessageCreatedEvent {
    /// True for an agent's outgoing message carrying a Dyte meeting attachment.
    pub fn is_meeting_link(&self) -> bool {
        self.message_type.as_deref() == Some("outgoing")
            && self.content_attributes.as_ref().is_some_and(|attrs| {
                attrs.kind.as_deref() == Some("dyte")
                    && attrs
                        .data
                        .as_ref()
                        .and_then(|data| data.meeting_id.as_deref())
                        .is_some_and(|id| !id.is_empty())
            })
    }
}
