use crate::agents::AgentLocator;
use crate::call_state::{CallPhase, CallSession, CallSessions};
use crate::chatwoot::MessagingApi;
use crate::chatwoot_types::{Agent, MessageCreatedEvent, NewMessage};
use crate::config::Config;
use crate::consts::*;
use crate::conversations::ConversationResolver;
use crate::dedup::{keys, DedupStore};
use crate::dyte::MeetingApi;
use crate::dyte_types::MeetingEvent;
use crate::error::{handle_error, AppError};
use crate::meetings::{Consumption, MeetingBroker, HOST_PRESET};
use crate::paths;
use crate::recording::{parse_duration, RecordingRelay};
use crate::twilio::TelephonyApi;
use crate::twilio_types::{CallStatus, OutboundCallRequest, Response};

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of a meeting "participant joined" delivery.
#[derive(Debug)]
pub enum JoinOutcome {
    /// Not a participant-joined event.
    Ignored,
    /// Replay of an event whose side effects already ran.
    Duplicate,
    /// Inbound flow: recording is armed after the settle delay.
    RecordingScheduled(JoinHandle<bool>),
    /// Outbound flow: the customer leg was placed.
    CallPlaced { call_sid: String },
}

#[derive(Debug)]
pub enum OutboundRequestOutcome {
    /// Not an agent meeting-link message.
    Ignored,
    AwaitingAgent { meeting_id: String },
}

#[derive(Debug)]
pub struct StatusOutcome {
    pub message: &'static str,
    pub duplicate: bool,
    pub phase: Option<CallPhase>,
    /// Set when a completed call carried a recording to forward.
    pub relay: Option<JoinHandle<bool>>,
}

/// Drives both call flows from the webhooks of the three providers.
///
/// The orchestrator holds no per-request state of its own. Everything shared between concurrent
/// deliveries goes through the dedup store, the call sessions and the meeting broker's
/// subscription records.
#[derive(Clone)]
pub struct CallOrchestrator {
    config: Arc<Config>,
    dedup: Arc<dyn DedupStore>,
    sessions: CallSessions,
    telephony: Arc<dyn TelephonyApi>,
    messaging: Arc<dyn MessagingApi>,
    agents: AgentLocator,
    conversations: ConversationResolver,
    meetings: MeetingBroker,
    relay: RecordingRelay,
}

impl CallOrchestrator {
    pub fn new(
        config: Arc<Config>,
        dedup: Arc<dyn DedupStore>,
        telephony: Arc<dyn TelephonyApi>,
        messaging: Arc<dyn MessagingApi>,
        meeting_api: Arc<dyn MeetingApi>,
    ) -> Self {
        let meetings = MeetingBroker::new(meeting_api, config.dyte.app_url.clone());
        Self {
            agents: AgentLocator::new(messaging.clone(), AGENT_MAX_ATTEMPTS, AGENT_POLL_INTERVAL),
            conversations: ConversationResolver::new(messaging.clone()),
            relay: RecordingRelay::new(messaging.clone(), RELAY_MAX_ATTEMPTS, RELAY_RETRY_DELAY),
            sessions: CallSessions::new(SESSION_TTL),
            meetings,
            config,
            dedup,
            telephony,
            messaging,
        }
    }

    pub fn dedup(&self) -> Arc<dyn DedupStore> {
        self.dedup.clone()
    }

    pub fn sessions(&self) -> &CallSessions {
        &self.sessions
    }

    pub fn meetings(&self) -> &MeetingBroker {
        &self.meetings
    }

    fn sip_uri(&self, meeting_id: &str) -> String {
        format!("sip:{meeting_id}@{}", self.config.dyte.sip_domain)
    }

    fn dial_meeting(&self, twiml: &mut Response, meeting_id: &str) {
        twiml.dial_sip(
            self.sip_uri(meeting_id),
            self.config.dyte.sip_username.clone(),
            self.config.dyte.sip_password.clone(),
        );
    }

    async fn notify(&self, conversation_id: u64, message: NewMessage) {
        if let Err(e) = self.messaging.post_message(conversation_id, &message).await {
            handle_error("failed to post message to conversation", e);
        }
    }

    /// Voice response for a new inbound call. Always well formed: any failure on the way turns
    /// into a spoken apology.
    pub async fn handle_inbound_call(&self, from: &str, call_sid: &str) -> Response {
        info!(from, call_sid, "incoming call");
        let mut twiml = Response::default();
        twiml.say(GREETING).pause(1).say(PLEASE_HOLD).pause(1);

        if let Err(e) = self.route_inbound_call(from, call_sid, &mut twiml).await {
            error!(error = %e, call_sid, "failed to route inbound call");
            twiml.pause(1).say(TECHNICAL_DIFFICULTIES);
        }
        twiml
    }

    async fn route_inbound_call(
        &self,
        from: &str,
        call_sid: &str,
        twiml: &mut Response,
    ) -> Result<(), AppError> {
        let inbox_id = self.agents.find_inbox().await?;
        let agent = match self.agents.find_available_agent(inbox_id).await {
            Some(agent) => agent,
            None => {
                twiml.pause(1).say(ALL_AGENTS_BUSY);
                let hold_music = self.config.hold_music_url.as_str();
                let waited = self
                    .agents
                    .wait_for_agent(from, inbox_id, |_| {
                        twiml.pause(1).say(AGENTS_STILL_BUSY).play(hold_music).pause(5);
                    })
                    .await;
                match waited {
                    Ok(agent) => agent,
                    Err(e) => {
                        warn!(error = %e, from, "giving up on finding an agent");
                        twiml.pause(1).say(NO_AGENT_APOLOGY);
                        return Ok(());
                    }
                }
            }
        };
        self.bridge_caller_to_agent(from, call_sid, inbox_id, &agent, twiml)
            .await
    }

    /// Resolve the conversation, open a meeting for the agent, and bridge the caller into it.
    async fn bridge_caller_to_agent(
        &self,
        from: &str,
        call_sid: &str,
        inbox_id: u64,
        agent: &Agent,
        twiml: &mut Response,
    ) -> Result<(), AppError> {
        let agent_name = agent.display_name();
        let resolved = self.conversations.resolve(from, inbox_id).await?;
        let conversation_id = resolved.conversation_id;

        let meeting_id = self
            .meetings
            .create_meeting(&format!("Meeting for : {from}"))
            .await?;
        let token = self
            .meetings
            .add_participant(&meeting_id, &agent_name, &agent.id.to_string(), HOST_PRESET)
            .await?;
        let link = self.meetings.build_join_link(&meeting_id, &token);

        self.notify(
            conversation_id,
            NewMessage::incoming(format!(
                "Incoming call from {from}. Join the call here: {link}"
            )),
        )
        .await;

        twiml.pause(3).say(AGENT_SHORTLY);
        self.dial_meeting(twiml, &meeting_id);

        let conversation = conversation_id.to_string();
        let callback = self.config.callback_url(
            paths::AGENT_JOINED,
            &[
                ("conversationId", conversation.as_str()),
                ("callSid", call_sid),
                ("meetingId", meeting_id.as_str()),
            ],
        );
        if let Err(e) = self
            .meetings
            .register_join_webhook(
                &meeting_id,
                &format!("{agent_name} join Webhook for {from}"),
                &callback,
            )
            .await
        {
            handle_error("failed to register agent join webhook", e);
        }

        self.sessions.insert(CallSession {
            call_sid: call_sid.to_string(),
            conversation_id,
            meeting_id: Some(meeting_id),
            customer_number: Some(from.to_string()),
            phase: CallPhase::Connected,
        });
        Ok(())
    }

    /// The agent joined the meeting of an inbound call: retire the join subscription and arm
    /// recording once the bridge has settled.
    pub async fn handle_agent_joined(
        &self,
        conversation_id: u64,
        call_sid: &str,
        meeting_id: Option<&str>,
        event: &MeetingEvent,
    ) -> JoinOutcome {
        if !event.is_participant_joined() {
            debug!(event = ?event.event, "ignoring meeting event");
            return JoinOutcome::Ignored;
        }
        if event.concerns_other_meeting(meeting_id) {
            debug!(
                call_sid,
                meeting_id,
                event_meeting = event.meeting_id(),
                "join in another meeting"
            );
            return JoinOutcome::Ignored;
        }
        let meeting_id = meeting_id
            .or_else(|| event.meeting_id())
            .map(str::to_string);
        if meeting_id
            .as_deref()
            .is_some_and(|id| self.meetings.is_consumed(id))
        {
            debug!(call_sid, "join subscription already consumed");
            return JoinOutcome::Duplicate;
        }
        if !self
            .dedup
            .try_acquire(&keys::agent_joined(call_sid), EVENT_DEDUP_TTL)
        {
            return JoinOutcome::Duplicate;
        }

        let prefix = format!("{}?", self.config.callback_url(paths::AGENT_JOINED, &[]));
        let scope = format!("conversationId={conversation_id}&callSid={call_sid}");
        match self
            .meetings
            .consume_join_webhook(meeting_id.as_deref(), &prefix, &scope)
            .await
        {
            Consumption::AlreadyConsumed => return JoinOutcome::Duplicate,
            Consumption::NotFound
                if self.sessions.phase(call_sid) == Some(CallPhase::RecordingArmed) =>
            {
                debug!(call_sid, "recording already armed for this call");
                return JoinOutcome::Duplicate;
            }
            _ => {}
        }

        info!(call_sid, conversation_id, "agent joined; arming recording after settle delay");
        let this = self.clone();
        let call_sid = call_sid.to_string();
        JoinOutcome::RecordingScheduled(tokio::spawn(async move {
            tokio::time::sleep(RECORDING_SETTLE_DELAY).await;
            this.arm_recording_if_connected(conversation_id, &call_sid)
                .await
        }))
    }

    async fn arm_recording_if_connected(&self, conversation_id: u64, call_sid: &str) -> bool {
        if let Some(phase) = self.sessions.phase(call_sid) {
            if !phase.is_live() {
                info!(call_sid, ?phase, "call no longer connected; not recording");
                return false;
            }
        }
        match self.telephony.fetch_call(call_sid).await {
            Ok(call) if call.status == CallStatus::InProgress => {
                self.arm_recording(conversation_id, call_sid).await
            }
            Ok(call) => {
                info!(call_sid, status = ?call.status, "call is not in progress; not recording");
                false
            }
            Err(e) => {
                handle_error("failed to fetch call before recording", e);
                false
            }
        }
    }

    /// Start recording a call at most once. Failures are logged and swallowed.
    async fn arm_recording(&self, conversation_id: u64, call_sid: &str) -> bool {
        let key = keys::recording_start(call_sid);
        if !self.dedup.try_acquire(&key, RECORDING_DEDUP_TTL) {
            debug!(call_sid, "recording already requested");
            return false;
        }
        let conversation = conversation_id.to_string();
        let callback = self.config.callback_url(
            paths::RECORDING_STATUS,
            &[("conversationId", conversation.as_str())],
        );
        match self.telephony.create_recording(call_sid, &callback).await {
            Ok(recording) => {
                info!(call_sid, recording_sid=%recording.sid, "recording started");
                self.sessions.mark_recording_armed(call_sid);
                true
            }
            Err(e) => {
                self.dedup.release(&key);
                handle_error("failed to start recording", e);
                false
            }
        }
    }

    /// An agent posted a meeting link into a conversation: open our own meeting for the
    /// outbound call and wait for the agent to join it.
    pub async fn handle_outbound_request(
        &self,
        event: &MessageCreatedEvent,
    ) -> Result<OutboundRequestOutcome, AppError> {
        if !event.is_meeting_link() {
            return Ok(OutboundRequestOutcome::Ignored);
        }
        let conversation_id = event
            .conversation
            .as_ref()
            .map(|c| c.id)
            .ok_or_else(|| AppError::Validation("conversation id not found".to_string()))?;
        let sender = event.sender.clone().unwrap_or_default();
        let agent_name = sender.name.unwrap_or_else(|| "Agent".to_string());
        let agent_id = sender.id.map(|id| id.to_string()).unwrap_or_default();

        let customer_number = match self.messaging.get_conversation(conversation_id).await {
            Ok(conversation) => conversation.meta.sender.phone_number,
            Err(e) => {
                handle_error("failed to fetch conversation contact", e);
                None
            }
        }
        .filter(|number| !number.is_empty())
        .ok_or_else(|| AppError::Validation("No customer number found".to_string()))?;

        let key = keys::outbound_request(&customer_number);
        if !self.dedup.try_acquire(&key, OUTBOUND_REQUEST_DEDUP_TTL) {
            info!(customer_number, "outbound call already in progress");
            return Err(AppError::Duplicate(
                "Outbound call already in progress".to_string(),
            ));
        }

        match self
            .open_outbound_meeting(conversation_id, &customer_number, &agent_name, &agent_id)
            .await
        {
            Ok(meeting_id) => Ok(OutboundRequestOutcome::AwaitingAgent { meeting_id }),
            Err(e) => {
                self.dedup.release(&key);
                Err(e)
            }
        }
    }

    async fn open_outbound_meeting(
        &self,
        conversation_id: u64,
        customer_number: &str,
        agent_name: &str,
        agent_id: &str,
    ) -> Result<String, AppError> {
        let meeting_id = self
            .meetings
            .create_meeting(&format!("Outbound call to {customer_number}"))
            .await?;
        let token = self
            .meetings
            .add_participant(&meeting_id, agent_name, agent_id, HOST_PRESET)
            .await?;
        let link = self.meetings.build_join_link(&meeting_id, &token);

        let link_key = keys::meeting_link(conversation_id);
        if self.dedup.try_acquire(&link_key, MEETING_LINK_DEDUP_TTL) {
            let message = NewMessage::private_note(format!("**[Join the call here]({link})**"));
            if let Err(e) = self.messaging.post_message(conversation_id, &message).await {
                self.dedup.release(&link_key);
                handle_error("failed to send meeting link to agent", e);
            }
        } else {
            debug!(conversation_id, "meeting link already sent");
        }

        let conversation = conversation_id.to_string();
        let callback = self.config.callback_url(
            paths::AGENT_JOINED_OUTBOUND,
            &[
                ("customerNumber", customer_number),
                ("conversationId", conversation.as_str()),
                ("meetingId", meeting_id.as_str()),
            ],
        );
        self.meetings
            .register_join_webhook(
                &meeting_id,
                &format!("{agent_name} created outbound call webhook for {customer_number}"),
                &callback,
            )
            .await?;
        info!(meeting_id, customer_number, "waiting for agent to join");
        Ok(meeting_id)
    }

    /// The agent joined the outbound meeting: dial the customer into it.
    pub async fn handle_agent_joined_outbound(
        &self,
        customer_number: &str,
        conversation_id: u64,
        meeting_id: &str,
        event: Option<&MeetingEvent>,
    ) -> Result<JoinOutcome, AppError> {
        if event.is_some_and(|e| e.event.is_some() && !e.is_participant_joined()) {
            return Ok(JoinOutcome::Ignored);
        }
        if event.is_some_and(|e| e.concerns_other_meeting(Some(meeting_id))) {
            debug!(meeting_id, "join in another meeting");
            return Ok(JoinOutcome::Ignored);
        }
        if self.meetings.is_consumed(meeting_id) {
            debug!(meeting_id, "join subscription already consumed");
            return Ok(JoinOutcome::Duplicate);
        }
        let key = keys::outbound_call(customer_number);
        if !self.dedup.try_acquire(&key, OUTBOUND_CALL_DEDUP_TTL) {
            info!(customer_number, "call already initiated recently");
            return Err(AppError::Duplicate(
                "Call already initiated recently".to_string(),
            ));
        }

        let call_sid = match self
            .initiate_outbound_call(customer_number, conversation_id, meeting_id)
            .await
        {
            Ok(call_sid) => call_sid,
            Err(e) => {
                self.dedup.release(&key);
                return Err(e);
            }
        };

        let prefix = format!(
            "{}?",
            self.config.callback_url(paths::AGENT_JOINED_OUTBOUND, &[])
        );
        let scope = format!("conversationId={conversation_id}&");
        self.meetings
            .consume_join_webhook(Some(meeting_id), &prefix, &scope)
            .await;
        Ok(JoinOutcome::CallPlaced { call_sid })
    }

    /// Place the customer leg of an outbound call; Twilio fetches its instructions from the
    /// connect endpoint once answered.
    pub async fn initiate_outbound_call(
        &self,
        customer_number: &str,
        conversation_id: u64,
        meeting_id: &str,
    ) -> Result<String, AppError> {
        let conversation = conversation_id.to_string();
        let request = OutboundCallRequest {
            to: customer_number.to_string(),
            from: self.config.twilio.phone_number.clone(),
            url: self.config.callback_url(
                paths::CONNECT_OUTBOUND,
                &[
                    ("conversationId", conversation.as_str()),
                    ("meetingId", meeting_id),
                    ("customerNumber", customer_number),
                ],
            ),
            status_callback: self.config.callback_url(
                paths::CALL_STATUS,
                &[
                    ("conversationId", conversation.as_str()),
                    ("meetingId", meeting_id),
                ],
            ),
            status_callback_events: vec!["initiated", "ringing", "answered", "completed"],
        };
        let call = self.telephony.place_call(&request).await?;
        info!(call_sid=%call.sid, customer_number, "outbound call initiated");
        self.sessions.insert(CallSession {
            call_sid: call.sid.clone(),
            conversation_id,
            meeting_id: Some(meeting_id.to_string()),
            customer_number: Some(customer_number.to_string()),
            phase: CallPhase::Initiated,
        });
        Ok(call.sid)
    }

    pub fn connect_outbound_call_to_meeting(&self, meeting_id: &str) -> Response {
        let mut twiml = Response::default();
        self.dial_meeting(&mut twiml, meeting_id);
        twiml
    }

    /// Apply a telephony status callback. Never fails: unknown statuses produce a generic note,
    /// provider failures are logged.
    pub async fn handle_call_status(
        &self,
        conversation_id: u64,
        meeting_id: Option<&str>,
        call_sid: &str,
        raw_status: &str,
        recording_url: Option<&str>,
        recording_duration: Option<&str>,
    ) -> StatusOutcome {
        let status = CallStatus::from(raw_status);
        let message = status_message(status);
        let status_key = raw_status.trim().to_ascii_lowercase();
        if !self
            .dedup
            .try_acquire(&keys::call_status(call_sid, &status_key), EVENT_DEDUP_TTL)
        {
            return StatusOutcome {
                message,
                duplicate: true,
                phase: self.sessions.phase(call_sid),
                relay: None,
            };
        }

        let change = self
            .sessions
            .apply_status(call_sid, conversation_id, meeting_id, status);
        info!(call_sid, raw_status, previous = ?change.previous, message, "call status");

        // A connected leg without a recording retries on every redelivered answer.
        if change.needs_recording() {
            self.arm_recording(conversation_id, call_sid).await;
        }

        self.notify(conversation_id, NewMessage::private_note(message))
            .await;

        let relay = match (status, recording_url) {
            (CallStatus::Completed, Some(url)) if !url.is_empty() => {
                let this = self.clone();
                let url = url.to_string();
                let duration = parse_duration(recording_duration);
                Some(tokio::spawn(async move {
                    this.relay_recording(conversation_id, &url, duration).await
                }))
            }
            _ => None,
        };

        StatusOutcome {
            message,
            duplicate: false,
            phase: self.sessions.phase(call_sid),
            relay,
        }
    }

    /// A recording finished: post it to the conversation.
    pub async fn handle_recording_status(
        &self,
        conversation_id: u64,
        recording_url: &str,
        recording_duration: Option<&str>,
    ) -> bool {
        self.relay_recording(conversation_id, recording_url, parse_duration(recording_duration))
            .await
    }

    /// Post a recording once, even when both the status and the recording callback carry it.
    async fn relay_recording(&self, conversation_id: u64, url: &str, duration: u64) -> bool {
        let key = keys::recording_post(url);
        if !self.dedup.try_acquire(&key, RECORDING_DEDUP_TTL) {
            debug!(url, "recording already relayed");
            return true;
        }
        let saved = self.relay.post_recording(conversation_id, url, duration).await;
        if !saved {
            self.dedup.release(&key);
        }
        saved
    }
}

pub fn status_message(status: CallStatus) -> &'static str {
    match status {
        CallStatus::Queued => "The call is queued",
        CallStatus::Initiated => "Twilio has dialed the call",
        CallStatus::Ringing => "The destination number has started ringing",
        CallStatus::InProgress => "The call has been connected and is currently active",
        CallStatus::Busy => "Twilio dialed the number but received a busy response",
        CallStatus::NoAnswer => "Twilio dialed the number but no one answered before the timeout",
        CallStatus::Canceled => "Twilio call was canceled",
        CallStatus::Completed => "Outbound call ended.",
        CallStatus::Failed => "Call failed",
        CallStatus::Unknown => "Unknown call status",
    }
}
