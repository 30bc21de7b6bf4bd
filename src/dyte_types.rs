use serde::{Deserialize, Serialize};

pub const PARTICIPANT_JOINED: &str = "meeting.participantJoined";

/// Dyte v2 wraps every response body in `{"success": bool, "data": ...}`.
#[derive(Deserialize, Debug)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: T,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewMeeting {
    pub title: String,
    pub preferred_region: &'static str,
    pub record_on_start: bool,
    pub live_stream_on_start: bool,
}

impl NewMeeting {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            preferred_region: "us-east-1",
            record_on_start: false,
            live_stream_on_start: false,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Meeting {
    pub id: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewParticipant {
    pub name: String,
    pub preset_name: String,
    pub custom_participant_id: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Participant {
    #[serde(default)]
    pub id: Option<String>,
    pub token: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct NewWebhook {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub events: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct EventMeeting {
    #[serde(default)]
    pub id: Option<String>,
}

/// Body Dyte posts to a registered webhook URL.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct MeetingEvent {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub meeting: Option<EventMeeting>,
    #[serde(default)]
    pub participant: Option<serde_json::Value>,
}

impl MeetingEvent {
    pub fn is_participant_joined(&self) -> bool {
        self.event.as_deref() == Some(PARTICIPANT_JOINED)
    }

    pub fn meeting_id(&self) -> Option<&str> {
        self.meeting.as_ref().and_then(|m| m.id.as_deref())
    }

    /// Webhooks are org-wide, so a subscription also hears joins in other meetings.
    pub fn concerns_other_meeting(&self, meeting_id: Option<&str>) -> bool {
        match (self.meeting_id(), meeting_id) {
            (Some(event_meeting), Some(expected)) => event_meeting != expected,
            _ => false,
        }
    }
}
