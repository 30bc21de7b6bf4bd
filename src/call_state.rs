use crate::twilio_types::CallStatus;

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Phase of one call leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Created,
    Initiated,
    Ringing,
    Connected,
    RecordingArmed,
    Completed,
    Failed,
    Canceled,
    NoAnswer,
    Busy,
}

impl CallPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallPhase::Completed
                | CallPhase::Failed
                | CallPhase::Canceled
                | CallPhase::NoAnswer
                | CallPhase::Busy
        )
    }

    /// True once the leg is bridged and still up.
    pub fn is_live(self) -> bool {
        matches!(self, CallPhase::Connected | CallPhase::RecordingArmed)
    }

    fn rank(self) -> u8 {
        match self {
            CallPhase::Created => 0,
            CallPhase::Initiated => 1,
            CallPhase::Ringing => 2,
            CallPhase::Connected => 3,
            CallPhase::RecordingArmed => 4,
            _ => 5,
        }
    }

    /// Phase a provider status moves this leg to, or `None` when the status is unknown,
    /// stale (arrived out of order), or the leg already ended.
    pub fn next(self, status: CallStatus) -> Option<CallPhase> {
        if self.is_terminal() {
            return None;
        }
        let target = match status {
            CallStatus::Queued | CallStatus::Initiated => CallPhase::Initiated,
            CallStatus::Ringing => CallPhase::Ringing,
            CallStatus::InProgress => CallPhase::Connected,
            CallStatus::Completed => CallPhase::Completed,
            CallStatus::Failed => CallPhase::Failed,
            // Only a leg that never connected can be canceled, unanswered or busy.
            CallStatus::Canceled | CallStatus::NoAnswer | CallStatus::Busy
                if self.rank() >= CallPhase::Connected.rank() =>
            {
                return None
            }
            CallStatus::Canceled => CallPhase::Canceled,
            CallStatus::NoAnswer => CallPhase::NoAnswer,
            CallStatus::Busy => CallPhase::Busy,
            CallStatus::Unknown => return None,
        };
        if target.is_terminal() || target.rank() > self.rank() {
            Some(target)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub call_sid: String,
    pub conversation_id: u64,
    pub meeting_id: Option<String>,
    pub customer_number: Option<String>,
    pub phase: CallPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseChange {
    pub previous: CallPhase,
    pub current: CallPhase,
}

impl PhaseChange {
    /// Connected but not yet recording.
    pub fn needs_recording(&self) -> bool {
        self.current == CallPhase::Connected
    }
}

/// Ephemeral per-call state keyed by call sid. Entries expire `ttl` after their last update.
#[derive(Clone)]
pub struct CallSessions {
    sessions: Arc<DashMap<String, (CallSession, Instant)>>,
    ttl: Duration,
}

impl CallSessions {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn insert(&self, session: CallSession) {
        trace!(call_sid=%session.call_sid, phase=?session.phase, "tracking call session");
        self.sessions
            .insert(session.call_sid.clone(), (session, Instant::now()));
    }

    pub fn get(&self, call_sid: &str) -> Option<CallSession> {
        let now = Instant::now();
        self.sessions
            .get(call_sid)
            .filter(|entry| now.duration_since(entry.1) < self.ttl)
            .map(|entry| entry.0.clone())
    }

    pub fn phase(&self, call_sid: &str) -> Option<CallPhase> {
        self.get(call_sid).map(|session| session.phase)
    }

    /// Apply a provider status, creating the session on first sight.
    pub fn apply_status(
        &self,
        call_sid: &str,
        conversation_id: u64,
        meeting_id: Option<&str>,
        status: CallStatus,
    ) -> PhaseChange {
        let now = Instant::now();
        let mut entry = self.sessions.entry(call_sid.to_string()).or_insert_with(|| {
            (
                CallSession {
                    call_sid: call_sid.to_string(),
                    conversation_id,
                    meeting_id: meeting_id.map(str::to_string),
                    customer_number: None,
                    phase: CallPhase::Created,
                },
                now,
            )
        });
        let (session, touched) = entry.value_mut();
        if now.duration_since(*touched) >= self.ttl {
            session.phase = CallPhase::Created;
        }
        let previous = session.phase;
        if let Some(next) = previous.next(status) {
            session.phase = next;
        }
        *touched = now;
        debug!(call_sid, ?status, ?previous, current=?session.phase, "call status applied");
        PhaseChange {
            previous,
            current: session.phase,
        }
    }

    /// Mark recording armed, only while the leg is connected.
    pub fn mark_recording_armed(&self, call_sid: &str) -> bool {
        match self.sessions.get_mut(call_sid) {
            Some(mut entry) if entry.0.phase == CallPhase::Connected => {
                entry.0.phase = CallPhase::RecordingArmed;
                entry.1 = Instant::now();
                true
            }
            _ => false,
        }
    }

    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, (_, touched)| now.duration_since(*touched) < self.ttl);
        before.saturating_sub(self.sessions.len())
    }
}
