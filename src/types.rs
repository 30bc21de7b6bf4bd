use crate::config::Config;
use crate::orchestrator::CallOrchestrator;

use serde::Deserialize;
use std::sync::Arc;

pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: CallOrchestrator,
}

/// Correlation parameters this service puts on the callback URLs it hands to providers.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CallbackQuery {
    pub conversation_id: Option<String>,
    pub call_sid: Option<String>,
    pub meeting_id: Option<String>,
    pub customer_number: Option<String>,
}

/// Body of the internal outbound-call trigger. `conversationId` may be sent as a number or a
/// string.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OutboundCallTrigger {
    pub customer_number: Option<String>,
    pub conversation_id: Option<serde_json::Value>,
    pub meeting_id: Option<String>,
}
