//! In-memory provider fakes shared by unit and router tests.

use crate::chatwoot::MessagingApi;
use crate::chatwoot_types::{
    Agent, AvailabilityStatus, Contact, ContactInbox, ConversationDetails, ConversationMeta,
    ConversationRef, ConversationSender, CreatedContact, CreatedContactId, Inbox, NewContact,
    NewConversation, NewMessage,
};
use crate::config::{ChatwootConfig, Config, DyteConfig, TwilioConfig};
use crate::dedup::InMemoryDedupStore;
use crate::dyte::MeetingApi;
use crate::dyte_types::{Meeting, NewMeeting, NewParticipant, NewWebhook, Participant, Webhook};
use crate::error::AppError;
use crate::orchestrator::CallOrchestrator;
use crate::twilio::TelephonyApi;
use crate::twilio_types::{CallResource, CallStatus, OutboundCallRequest, RecordingResource};
use crate::types::AppState;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

pub const AUTH_TOKEN: &str = "test-auth-token";

pub fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        server_url: "https://bridge.example.com".to_string(),
        hold_music_url: "https://cdn.example.com/hold.mp3".to_string(),
        twilio: TwilioConfig {
            api_url: "https://api.twilio.test/2010-04-01".to_string(),
            account_sid: "AC123".to_string(),
            auth_token: AUTH_TOKEN.to_string(),
            phone_number: "+15550009999".to_string(),
            validate_signatures: true,
        },
        chatwoot: ChatwootConfig {
            instance_url: "https://chat.example.com".to_string(),
            account_id: "1".to_string(),
            access_token: "cw-token".to_string(),
        },
        dyte: DyteConfig {
            api_url: "https://api.dyte.test/v2".to_string(),
            app_url: "https://app.dyte.io".to_string(),
            org_id: "org".to_string(),
            api_key: "key".to_string(),
            sip_username: "sip-user".to_string(),
            sip_password: "sip-pass".to_string(),
            sip_domain: "sip.dyte.io".to_string(),
        },
    }
}

fn unavailable(provider: &'static str) -> AppError {
    AppError::upstream(provider, "503 Service Unavailable")
}

struct MessagingState {
    inboxes: Vec<Inbox>,
    agents: Vec<Agent>,
    online_after: Option<u32>,
    agent_lookups: u32,
    contacts: Vec<Contact>,
    conversations: HashMap<u64, Vec<u64>>,
    conversation_phones: HashMap<u64, String>,
    next_id: u64,
    contacts_created: u32,
    conversations_created: u32,
    fail_search: bool,
    failing_posts: u32,
    post_attempts: u32,
    messages: Vec<(u64, NewMessage)>,
}

pub struct FakeMessaging {
    state: Mutex<MessagingState>,
}

impl Default for FakeMessaging {
    fn default() -> Self {
        Self {
            state: Mutex::new(MessagingState {
                inboxes: vec![Inbox {
                    id: 1,
                    name: Some("Phone".to_string()),
                }],
                agents: Vec::new(),
                online_after: None,
                agent_lookups: 0,
                contacts: Vec::new(),
                conversations: HashMap::new(),
                conversation_phones: HashMap::new(),
                next_id: 100,
                contacts_created: 0,
                conversations_created: 0,
                fail_search: false,
                failing_posts: 0,
                post_attempts: 0,
                messages: Vec::new(),
            }),
        }
    }
}

impl FakeMessaging {
    pub fn agent(id: u64, name: &str, status: &str) -> Agent {
        Agent {
            id,
            available_name: Some(name.to_string()),
            name: None,
            availability_status: serde_json::from_value(serde_json::json!(status))
                .unwrap_or(AvailabilityStatus::Unknown),
        }
    }

    pub fn set_agents(&self, agents: Vec<Agent>) {
        self.state.lock().unwrap().agents = agents;
    }

    pub fn set_inboxes(&self, inboxes: Vec<Inbox>) {
        self.state.lock().unwrap().inboxes = inboxes;
    }

    /// From the `n`th lookup on every agent reports online.
    pub fn agents_online_after(&self, n: u32) {
        self.state.lock().unwrap().online_after = Some(n);
    }

    pub fn agent_lookups(&self) -> u32 {
        self.state.lock().unwrap().agent_lookups
    }

    pub fn seed_contact(&self, phone_number: &str, source_id: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.contacts.push(Contact {
            id,
            phone_number: Some(phone_number.to_string()),
            contact_inboxes: vec![ContactInbox {
                source_id: source_id.to_string(),
            }],
        });
        id
    }

    /// A conversation whose contact is reachable at `phone_number`.
    pub fn seed_conversation(&self, conversation_id: u64, phone_number: &str) {
        self.state
            .lock()
            .unwrap()
            .conversation_phones
            .insert(conversation_id, phone_number.to_string());
    }

    pub fn contacts_created(&self) -> u32 {
        self.state.lock().unwrap().contacts_created
    }

    pub fn conversations_created(&self) -> u32 {
        self.state.lock().unwrap().conversations_created
    }

    pub fn fail_contact_search(&self) {
        self.state.lock().unwrap().fail_search = true;
    }

    pub fn fail_next_posts(&self, n: u32) {
        self.state.lock().unwrap().failing_posts = n;
    }

    pub fn post_attempts(&self) -> u32 {
        self.state.lock().unwrap().post_attempts
    }

    pub fn messages_for(&self, conversation_id: u64) -> Vec<NewMessage> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|(id, _)| *id == conversation_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn all_messages(&self) -> Vec<(u64, NewMessage)> {
        self.state.lock().unwrap().messages.clone()
    }
}

#[async_trait]
impl MessagingApi for FakeMessaging {
    async fn list_inboxes(&self) -> Result<Vec<Inbox>, AppError> {
        Ok(self.state.lock().unwrap().inboxes.clone())
    }

    async fn list_inbox_agents(&self, _inbox_id: u64) -> Result<Vec<Agent>, AppError> {
        let mut state = self.state.lock().unwrap();
        state.agent_lookups += 1;
        let online = state
            .online_after
            .is_some_and(|n| state.agent_lookups >= n);
        Ok(state
            .agents
            .iter()
            .cloned()
            .map(|mut agent| {
                if online {
                    agent.availability_status = AvailabilityStatus::Online;
                }
                agent
            })
            .collect())
    }

    async fn search_contacts(&self, query: &str) -> Result<Vec<Contact>, AppError> {
        let state = self.state.lock().unwrap();
        if state.fail_search {
            return Err(unavailable("chatwoot"));
        }
        Ok(state
            .contacts
            .iter()
            .filter(|contact| contact.phone_number.as_deref() == Some(query))
            .cloned()
            .collect())
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<CreatedContact, AppError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        let source_id = format!("src-{id}");
        state.contacts.push(Contact {
            id,
            phone_number: Some(contact.phone_number.clone()),
            contact_inboxes: vec![ContactInbox {
                source_id: source_id.clone(),
            }],
        });
        state.contacts_created += 1;
        Ok(CreatedContact {
            contact: CreatedContactId { id },
            contact_inbox: ContactInbox { source_id },
        })
    }

    async fn list_contact_conversations(
        &self,
        contact_id: u64,
    ) -> Result<Vec<ConversationRef>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .conversations
            .get(&contact_id)
            .map(|ids| ids.iter().rev().map(|id| ConversationRef { id: *id }).collect())
            .unwrap_or_default())
    }

    async fn create_conversation(
        &self,
        conversation: &NewConversation,
    ) -> Result<ConversationRef, AppError> {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state
            .conversations
            .entry(conversation.contact_id)
            .or_default()
            .push(id);
        let phone = state
            .contacts
            .iter()
            .find(|contact| contact.id == conversation.contact_id)
            .and_then(|contact| contact.phone_number.clone());
        if let Some(phone) = phone {
            state.conversation_phones.insert(id, phone);
        }
        state.conversations_created += 1;
        Ok(ConversationRef { id })
    }

    async fn get_conversation(
        &self,
        conversation_id: u64,
    ) -> Result<ConversationDetails, AppError> {
        let state = self.state.lock().unwrap();
        let phone_number = state
            .conversation_phones
            .get(&conversation_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("conversation {conversation_id}")))?;
        Ok(ConversationDetails {
            id: conversation_id,
            meta: ConversationMeta {
                sender: ConversationSender {
                    phone_number: Some(phone_number),
                },
            },
        })
    }

    async fn post_message(
        &self,
        conversation_id: u64,
        message: &NewMessage,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        state.post_attempts += 1;
        if state.failing_posts > 0 {
            state.failing_posts -= 1;
            return Err(unavailable("chatwoot"));
        }
        state.messages.push((conversation_id, message.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct MeetingsState {
    meetings: Vec<String>,
    participants: Vec<(String, NewParticipant)>,
    webhooks: Vec<Webhook>,
    next_id: u32,
    webhook_deletes: u32,
    fail_meetings: bool,
    fail_webhooks: bool,
}

#[derive(Default)]
pub struct FakeMeetings {
    state: Mutex<MeetingsState>,
}

impl FakeMeetings {
    pub fn meetings_created(&self) -> usize {
        self.state.lock().unwrap().meetings.len()
    }

    pub fn participants(&self) -> Vec<(String, NewParticipant)> {
        self.state.lock().unwrap().participants.clone()
    }

    pub fn webhooks(&self) -> Vec<Webhook> {
        self.state.lock().unwrap().webhooks.clone()
    }

    pub fn webhook_deletes(&self) -> u32 {
        self.state.lock().unwrap().webhook_deletes
    }

    pub fn seed_webhook(&self, id: &str, url: &str) {
        self.state.lock().unwrap().webhooks.push(Webhook {
            id: id.to_string(),
            url: url.to_string(),
            name: None,
            events: vec![crate::dyte_types::PARTICIPANT_JOINED.to_string()],
        });
    }

    pub fn fail_meeting_creation(&self) {
        self.state.lock().unwrap().fail_meetings = true;
    }

    pub fn fail_webhook_registration(&self) {
        self.state.lock().unwrap().fail_webhooks = true;
    }
}

#[async_trait]
impl MeetingApi for FakeMeetings {
    async fn create_meeting(&self, _meeting: &NewMeeting) -> Result<Meeting, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_meetings {
            return Err(unavailable("dyte"));
        }
        state.next_id += 1;
        let id = format!("m-{}", state.next_id);
        state.meetings.push(id.clone());
        Ok(Meeting { id })
    }

    async fn add_participant(
        &self,
        meeting_id: &str,
        participant: &NewParticipant,
    ) -> Result<Participant, AppError> {
        let mut state = self.state.lock().unwrap();
        state
            .participants
            .push((meeting_id.to_string(), participant.clone()));
        Ok(Participant {
            id: Some(format!("p-{}", state.participants.len())),
            token: format!("tok-{meeting_id}"),
        })
    }

    async fn create_webhook(&self, webhook: &NewWebhook) -> Result<Webhook, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_webhooks {
            return Err(unavailable("dyte"));
        }
        state.next_id += 1;
        let created = Webhook {
            id: format!("wh-{}", state.next_id),
            url: webhook.url.clone(),
            name: Some(webhook.name.clone()),
            events: webhook.events.clone(),
        };
        state.webhooks.push(created.clone());
        Ok(created)
    }

    async fn list_webhooks(&self) -> Result<Vec<Webhook>, AppError> {
        Ok(self.state.lock().unwrap().webhooks.clone())
    }

    async fn delete_webhook(&self, webhook_id: &str) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        let before = state.webhooks.len();
        state.webhooks.retain(|webhook| webhook.id != webhook_id);
        if state.webhooks.len() == before {
            return Err(AppError::NotFound(format!("webhook {webhook_id}")));
        }
        state.webhook_deletes += 1;
        Ok(())
    }
}

#[derive(Default)]
struct TelephonyState {
    placed: Vec<OutboundCallRequest>,
    recordings: Vec<(String, String)>,
    statuses: BTreeMap<String, CallStatus>,
    fail_calls: bool,
    fail_recordings: bool,
}

#[derive(Default)]
pub struct FakeTelephony {
    state: Mutex<TelephonyState>,
}

impl FakeTelephony {
    pub fn placed_calls(&self) -> Vec<OutboundCallRequest> {
        self.state.lock().unwrap().placed.clone()
    }

    /// `(call_sid, callback_url)` of every recording started.
    pub fn recordings(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().recordings.clone()
    }

    pub fn set_call_status(&self, call_sid: &str, status: CallStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(call_sid.to_string(), status);
    }

    pub fn fail_calls(&self) {
        self.state.lock().unwrap().fail_calls = true;
    }

    pub fn fail_recordings(&self) {
        self.state.lock().unwrap().fail_recordings = true;
    }

    pub fn recover_recordings(&self) {
        self.state.lock().unwrap().fail_recordings = false;
    }
}

#[async_trait]
impl TelephonyApi for FakeTelephony {
    async fn place_call(&self, request: &OutboundCallRequest) -> Result<CallResource, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_calls {
            return Err(unavailable("twilio"));
        }
        state.placed.push(request.clone());
        let sid = format!("CAout{}", state.placed.len());
        state.statuses.insert(sid.clone(), CallStatus::Queued);
        Ok(CallResource {
            sid,
            status: CallStatus::Queued,
        })
    }

    async fn fetch_call(&self, call_sid: &str) -> Result<CallResource, AppError> {
        let state = self.state.lock().unwrap();
        let status = state
            .statuses
            .get(call_sid)
            .copied()
            .ok_or_else(|| AppError::NotFound(format!("call {call_sid}")))?;
        Ok(CallResource {
            sid: call_sid.to_string(),
            status,
        })
    }

    async fn create_recording(
        &self,
        call_sid: &str,
        callback_url: &str,
    ) -> Result<RecordingResource, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_recordings {
            return Err(unavailable("twilio"));
        }
        state
            .recordings
            .push((call_sid.to_string(), callback_url.to_string()));
        Ok(RecordingResource {
            sid: format!("RE{}", state.recordings.len()),
        })
    }
}

/// An orchestrator wired to fresh fakes.
pub struct Harness {
    pub config: Arc<Config>,
    pub dedup: Arc<InMemoryDedupStore>,
    pub telephony: Arc<FakeTelephony>,
    pub messaging: Arc<FakeMessaging>,
    pub meetings: Arc<FakeMeetings>,
    pub orchestrator: CallOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        let config = Arc::new(test_config());
        let dedup = Arc::new(InMemoryDedupStore::new());
        let telephony = Arc::new(FakeTelephony::default());
        let messaging = Arc::new(FakeMessaging::default());
        let meetings = Arc::new(FakeMeetings::default());
        let orchestrator = CallOrchestrator::new(
            config.clone(),
            dedup.clone(),
            telephony.clone(),
            messaging.clone(),
            meetings.clone(),
        );
        Self {
            config,
            dedup,
            telephony,
            messaging,
            meetings,
            orchestrator,
        }
    }

    pub fn app_state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            config: self.config.clone(),
            orchestrator: self.orchestrator.clone(),
        })
    }
}
