use crate::chatwoot_types::MessageCreatedEvent;
use crate::consts::{SIGNATURE_APOLOGY, UNABLE_TO_PROCESS};
use crate::dyte_types::MeetingEvent;
use crate::error::AppError;
use crate::orchestrator::{JoinOutcome, OutboundRequestOutcome};
use crate::twilio_types::{
    FailurePayload, InboundCallPayload, RecordingCallbackPayload, Response, StatusCallbackPayload,
};
use crate::types::{AppState, CallbackQuery, OutboundCallTrigger};
use crate::utils::validate_twilio_signature;

use axum::{
    extract::{rejection::QueryRejection, OriginalUri, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response as HttpResponse},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

const SIGNATURE_HEADER: &str = "x-twilio-signature";

fn twiml_response(status: StatusCode, twiml: Response) -> HttpResponse {
    let twiml = twiml.into_twiml();
    trace!("twiml: '{}'", twiml);
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/xml"),
    );
    (status, headers, twiml).into_response()
}

fn spoken_apology(status: StatusCode, message: &str) -> HttpResponse {
    let mut twiml = Response::default();
    twiml.say(message);
    twiml_response(status, twiml)
}

fn success(mut body: Value) -> HttpResponse {
    if let Some(fields) = body.as_object_mut() {
        fields.insert("success".to_string(), Value::Bool(true));
    }
    (StatusCode::OK, Json(body)).into_response()
}

/// Decode a Twilio form body into its typed payload plus the raw parameters the signature
/// covers.
fn parse_form<T: DeserializeOwned>(body: &str) -> Result<(T, BTreeMap<String, String>), AppError> {
    let params = serde_urlencoded::from_str::<BTreeMap<String, String>>(body)
        .map_err(|e| AppError::Validation(format!("malformed form body: {e}")))?;
    let payload = serde_urlencoded::from_str::<T>(body)
        .map_err(|e| AppError::Validation(format!("malformed form body: {e}")))?;
    Ok((payload, params))
}

fn parse_json<T: DeserializeOwned + Default>(body: &str) -> Result<T, AppError> {
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(body).map_err(|e| AppError::Validation(format!("malformed JSON body: {e}")))
}

/// Twilio signs the public URL it called; behind a proxy that is `server_url` plus the path
/// and query we received.
fn verify_twilio_request(
    app_state: &AppState,
    uri: &Uri,
    headers: &HeaderMap,
    params: &BTreeMap<String, String>,
) -> Result<(), AppError> {
    let twilio = &app_state.config.twilio;
    if !twilio.validate_signatures {
        return Ok(());
    }
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    let url = format!("{}{}", app_state.config.server_url, path_and_query);
    if validate_twilio_signature(&twilio.auth_token, signature, &url, params) {
        Ok(())
    } else {
        warn!(url, "rejected request with invalid twilio signature");
        Err(AppError::InvalidSignature)
    }
}

/// Callback parameters we put in the URL ourselves. A mangled query becomes a validation error
/// instead of axum's plain-text rejection.
fn callback_query(
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<CallbackQuery, AppError> {
    query
        .map(|Query(query)| query)
        .map_err(|e| AppError::Validation(format!("malformed query string: {e}")))
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, AppError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{name} is required")))
}

fn conversation_id(raw: Option<&str>) -> Result<u64, AppError> {
    required(raw, "conversationId")?
        .parse()
        .map_err(|_| AppError::Validation("conversationId must be numeric".to_string()))
}

fn json_conversation_id(raw: Option<&Value>) -> Result<u64, AppError> {
    match raw {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| AppError::Validation("conversationId must be numeric".to_string())),
        Some(Value::String(s)) => conversation_id(Some(s.as_str())),
        _ => Err(AppError::Validation("conversationId is required".to_string())),
    }
}

pub async fn inbound_call(
    State(app_state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: String,
) -> HttpResponse {
    let span = info_span!("inbound_call", request_id = %Uuid::new_v4());
    async move {
        let (payload, params) = match parse_form::<InboundCallPayload>(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error=%e, "failed to deserialize inbound call payload");
                return spoken_apology(StatusCode::BAD_REQUEST, UNABLE_TO_PROCESS);
            }
        };
        if let Err(e) = verify_twilio_request(&app_state, &uri, &headers, &params) {
            return spoken_apology(e.status_code(), SIGNATURE_APOLOGY);
        }
        let (from, call_sid) = match (
            required(payload.from.as_deref(), "From"),
            required(payload.call_sid.as_deref(), "CallSid"),
        ) {
            (Ok(from), Ok(call_sid)) => (from, call_sid),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error=%e, "inbound call without caller");
                return spoken_apology(StatusCode::BAD_REQUEST, UNABLE_TO_PROCESS);
            }
        };
        let twiml = app_state
            .orchestrator
            .handle_inbound_call(from, call_sid)
            .await;
        twiml_response(StatusCode::OK, twiml)
    }
    .instrument(span)
    .await
}

pub async fn connect_outbound_call_to_meeting(
    State(app_state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    headers: HeaderMap,
    body: String,
) -> HttpResponse {
    let span = info_span!("connect_outbound_call", request_id = %Uuid::new_v4());
    async move {
        let params = match parse_form::<BTreeMap<String, String>>(&body) {
            Ok((params, _)) => params,
            Err(e) => {
                error!(error=%e, "failed to deserialize connect payload");
                return spoken_apology(StatusCode::BAD_REQUEST, UNABLE_TO_PROCESS);
            }
        };
        if let Err(e) = verify_twilio_request(&app_state, &uri, &headers, &params) {
            return spoken_apology(e.status_code(), SIGNATURE_APOLOGY);
        }
        let query = match callback_query(query) {
            Ok(query) => query,
            Err(e) => {
                warn!(error=%e, "connect request with malformed query");
                return spoken_apology(e.status_code(), UNABLE_TO_PROCESS);
            }
        };
        let meeting_id = match required(query.meeting_id.as_deref(), "meetingId") {
            Ok(meeting_id) => meeting_id,
            Err(e) => {
                warn!(error=%e, "connect request without meeting");
                return spoken_apology(StatusCode::BAD_REQUEST, UNABLE_TO_PROCESS);
            }
        };
        info!(meeting_id, customer_number = ?query.customer_number, "connecting callee to meeting");
        let twiml = app_state
            .orchestrator
            .connect_outbound_call_to_meeting(meeting_id);
        twiml_response(StatusCode::OK, twiml)
    }
    .instrument(span)
    .await
}

pub async fn call_status(
    State(app_state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    headers: HeaderMap,
    body: String,
) -> Result<HttpResponse, AppError> {
    let span = info_span!("call_status", request_id = %Uuid::new_v4());
    async move {
        let (payload, params) = parse_form::<StatusCallbackPayload>(&body)?;
        verify_twilio_request(&app_state, &uri, &headers, &params)?;
        let query = callback_query(query)?;
        let conversation_id = conversation_id(query.conversation_id.as_deref())?;
        let call_sid = required(payload.call_sid.as_deref(), "CallSid")?;

        let outcome = app_state
            .orchestrator
            .handle_call_status(
                conversation_id,
                query.meeting_id.as_deref(),
                call_sid,
                payload.call_status.as_deref().unwrap_or_default(),
                payload.recording_url.as_deref(),
                payload.recording_duration.as_deref(),
            )
            .await;
        Ok::<_, AppError>(success(json!({
            "message": outcome.message,
            "duplicate": outcome.duplicate,
        })))
    }
    .instrument(span)
    .await
}

pub async fn twilio_failure(
    State(app_state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: String,
) -> HttpResponse {
    let span = info_span!("twilio_failure", request_id = %Uuid::new_v4());
    async move {
        let (payload, params) = match parse_form::<FailurePayload>(&body) {
            Ok(parsed) => parsed,
            Err(e) => {
                error!(error=%e, "failed to deserialize failure payload");
                return spoken_apology(StatusCode::BAD_REQUEST, UNABLE_TO_PROCESS);
            }
        };
        if let Err(e) = verify_twilio_request(&app_state, &uri, &headers, &params) {
            return spoken_apology(e.status_code(), SIGNATURE_APOLOGY);
        }
        error!(
            call_sid = ?payload.call_sid,
            call_status = ?payload.call_status,
            error_code = ?payload.error_code,
            error_url = ?payload.error_url,
            error_message = ?payload.error_message,
            from = ?payload.from,
            to = ?payload.to,
            "twilio reported a call failure"
        );
        spoken_apology(StatusCode::OK, UNABLE_TO_PROCESS)
    }
    .instrument(span)
    .await
}

pub async fn recording_status(
    State(app_state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    headers: HeaderMap,
    body: String,
) -> Result<HttpResponse, AppError> {
    let span = info_span!("recording_status", request_id = %Uuid::new_v4());
    async move {
        let (payload, params) = parse_form::<RecordingCallbackPayload>(&body)?;
        verify_twilio_request(&app_state, &uri, &headers, &params)?;
        let query = callback_query(query)?;
        let conversation_id = conversation_id(query.conversation_id.as_deref())?;
        let recording_url = required(payload.recording_url.as_deref(), "RecordingUrl")?;
        debug!(recording_sid = ?payload.recording_sid, call_sid = ?payload.call_sid, "recording ready");

        let saved = app_state
            .orchestrator
            .handle_recording_status(
                conversation_id,
                recording_url,
                payload.recording_duration.as_deref(),
            )
            .await;
        if !saved {
            return Err(AppError::upstream(
                "chatwoot",
                "recording could not be posted to the conversation",
            ));
        }
        Ok::<_, AppError>(success(json!({ "message": "Recording saved" })))
    }
    .instrument(span)
    .await
}

pub async fn agent_joined(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    body: String,
) -> Result<HttpResponse, AppError> {
    let span = info_span!("agent_joined", request_id = %Uuid::new_v4());
    async move {
        let query = callback_query(query)?;
        let event: MeetingEvent = parse_json(&body)?;
        let conversation_id = conversation_id(query.conversation_id.as_deref())?;
        let call_sid = required(query.call_sid.as_deref(), "callSid")?;

        let outcome = app_state
            .orchestrator
            .handle_agent_joined(conversation_id, call_sid, query.meeting_id.as_deref(), &event)
            .await;
        Ok::<_, AppError>(match outcome {
            JoinOutcome::Ignored => success(json!({ "ignored": true })),
            JoinOutcome::Duplicate => success(json!({ "duplicate": true })),
            // Recording is armed in the background once the bridge settles.
            _ => success(json!({ "message": "Agent joined" })),
        })
    }
    .instrument(span)
    .await
}

pub async fn agent_joined_outbound(
    State(app_state): State<Arc<AppState>>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
    body: String,
) -> Result<HttpResponse, AppError> {
    let span = info_span!("agent_joined_outbound", request_id = %Uuid::new_v4());
    async move {
        let query = callback_query(query)?;
        let event: Option<MeetingEvent> = parse_json(&body)?;
        let customer_number = required(query.customer_number.as_deref(), "customerNumber")?;
        let conversation_id = conversation_id(query.conversation_id.as_deref())?;
        let meeting_id = required(query.meeting_id.as_deref(), "meetingId")?;

        let outcome = app_state
            .orchestrator
            .handle_agent_joined_outbound(
                customer_number,
                conversation_id,
                meeting_id,
                event.as_ref(),
            )
            .await?;
        Ok::<_, AppError>(match outcome {
            JoinOutcome::CallPlaced { call_sid } => success(json!({
                "message": "Outbound call initiated",
                "callSid": call_sid,
            })),
            JoinOutcome::Duplicate => success(json!({ "duplicate": true })),
            _ => success(json!({ "ignored": true })),
        })
    }
    .instrument(span)
    .await
}

pub async fn listen_chatwoot(
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> Result<HttpResponse, AppError> {
    let span = info_span!("listen_chatwoot", request_id = %Uuid::new_v4());
    async move {
        let event: MessageCreatedEvent = parse_json(&body)?;
        match app_state.orchestrator.handle_outbound_request(&event).await? {
            OutboundRequestOutcome::Ignored => Ok::<_, AppError>(success(json!({ "ignored": true }))),
            OutboundRequestOutcome::AwaitingAgent { meeting_id } => Ok(success(json!({
                "message": "Waiting for agent to join the meeting",
                "meetingId": meeting_id,
            }))),
        }
    }
    .instrument(span)
    .await
}

pub async fn initiate_outbound_call(
    State(app_state): State<Arc<AppState>>,
    body: String,
) -> Result<HttpResponse, AppError> {
    let span = info_span!("initiate_outbound_call", request_id = %Uuid::new_v4());
    async move {
        let trigger: OutboundCallTrigger = serde_json::from_str(&body)
            .map_err(|e| AppError::Validation(format!("malformed JSON body: {e}")))?;
        let customer_number = required(trigger.customer_number.as_deref(), "customerNumber")?;
        let conversation_id = json_conversation_id(trigger.conversation_id.as_ref())?;
        let meeting_id = required(trigger.meeting_id.as_deref(), "meetingId")?;

        let call_sid = app_state
            .orchestrator
            .initiate_outbound_call(customer_number, conversation_id, meeting_id)
            .await?;
        Ok::<_, AppError>(success(json!({
            "message": "Outbound call initiated",
            "callSid": call_sid,
        })))
    }
    .instrument(span)
    .await
}
