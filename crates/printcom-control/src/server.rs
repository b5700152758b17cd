//! Control server request handling (JSON line IPC).

use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;
use smol_str::SmolStr;
use tracing::warn;

use printcom_protocol::{AnswerPolicy, PromptService, PromptSettings, SharedPromptSettings};

use crate::error::HostError;
use crate::queue::SendQueue;
use crate::transport::{self, ConnectionHandle, ControlEndpoint, ControlFanout};

/// Shared state behind the control endpoint.
pub struct ControlState {
    pub service: Arc<PromptService>,
    pub settings: SharedPromptSettings,
    pub queue: Arc<SendQueue>,
    pub fanout: Arc<ControlFanout>,
    pub host_name: SmolStr,
    pub auth_token: Option<SmolStr>,
    pub audit_tx: Option<Sender<ControlAuditEvent>>,
    pub started: Instant,
}

#[derive(Debug, Clone)]
pub struct ControlAuditEvent {
    pub timestamp_ms: u128,
    pub request_id: u64,
    pub request_type: SmolStr,
    pub ok: bool,
    pub error: Option<SmolStr>,
    pub auth_present: bool,
}

#[derive(Debug)]
pub struct ControlServer {
    endpoint: ControlEndpoint,
    state: Arc<ControlState>,
}

impl std::fmt::Debug for ControlState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlState")
            .field("host_name", &self.host_name)
            .finish_non_exhaustive()
    }
}

impl ControlServer {
    /// Binds the endpoint and starts serving. The returned server reports
    /// the resolved endpoint (useful with `tcp://127.0.0.1:0`).
    pub fn start(
        endpoint: &ControlEndpoint,
        state: Arc<ControlState>,
    ) -> Result<Self, HostError> {
        let resolved = transport::spawn_control_server(endpoint, state.clone())?;
        Ok(Self {
            endpoint: resolved,
            state,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &ControlEndpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn state(&self) -> Arc<ControlState> {
        self.state.clone()
    }
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    id: u64,
    #[serde(rename = "type")]
    r#type: String,
    params: Option<serde_json::Value>,
    auth: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ControlResponse {
    id: u64,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

impl ControlResponse {
    fn ok(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
            code: None,
        }
    }

    fn error(id: u64, error: String) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(error),
            code: None,
        }
    }

    fn error_with_class(id: u64, error: String, code: &'static str) -> Self {
        Self {
            code: Some(code),
            ..Self::error(id, error)
        }
    }
}

pub(crate) fn handle_request_line(
    line: &str,
    state: &Arc<ControlState>,
    conn: &mut ConnectionHandle,
) -> Option<String> {
    let response = match serde_json::from_str::<serde_json::Value>(line) {
        Ok(value) => handle_request_value(value, state, conn),
        Err(err) => {
            ControlResponse::error_with_class(0, format!("invalid request: {err}"), "bad-request")
        }
    };
    serde_json::to_string(&response).ok()
}

pub(crate) fn handle_request_value(
    value: serde_json::Value,
    state: &Arc<ControlState>,
    conn: &mut ConnectionHandle,
) -> ControlResponse {
    let request: ControlRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(err) => {
            let response =
                ControlResponse::error_with_class(0, format!("invalid request: {err}"), "bad-request");
            record_audit(state, 0, SmolStr::new_static("invalid"), &response, false);
            return response;
        }
    };
    if let Some(expected) = state.auth_token.as_deref() {
        if request.auth.as_deref() != Some(expected) {
            let response =
                ControlResponse::error_with_class(request.id, "unauthorized".into(), "unauthorized");
            record_audit(
                state,
                request.id,
                SmolStr::new(request.r#type.as_str()),
                &response,
                request.auth.is_some(),
            );
            return response;
        }
    }
    let response = match request.r#type.as_str() {
        "status" => handle_status(request.id, state),
        "prompt.get" => handle_prompt_get(request.id, state),
        "prompt.select" => handle_prompt_select(request.id, request.params.as_ref(), state),
        "prompt.subscribe" => {
            let token = state.fanout.subscribe(conn.outbound().clone());
            conn.subscribed(token);
            ControlResponse::ok(request.id, json!({ "subscribed": true }))
        }
        "config.get" => handle_config_get(request.id, state),
        "config.set" => handle_config_set(request.id, request.params.as_ref(), state),
        _ => ControlResponse::error(request.id, "unsupported request".into()),
    };
    record_audit(
        state,
        request.id,
        SmolStr::new(request.r#type.as_str()),
        &response,
        request.auth.is_some(),
    );
    response
}

fn record_audit(
    state: &ControlState,
    request_id: u64,
    request_type: SmolStr,
    response: &ControlResponse,
    auth_present: bool,
) {
    let Some(sender) = &state.audit_tx else {
        return;
    };
    let timestamp_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let event = ControlAuditEvent {
        timestamp_ms,
        request_id,
        request_type,
        ok: response.ok,
        error: response.error.as_ref().map(SmolStr::new),
        auth_present,
    };
    let _ = sender.send(event);
}

fn handle_status(id: u64, state: &ControlState) -> ControlResponse {
    let (present, shown) = state.service.prompt_state();
    let prompt_state = match (present, shown) {
        (false, _) => "idle",
        (true, false) => "prompt-pending",
        (true, true) => "prompt-active",
    };
    let settings = state.service.settings_snapshot();
    ControlResponse::ok(
        id,
        json!({
            "host": state.host_name.as_str(),
            "uptime_ms": u64::try_from(state.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "state": prompt_state,
            "prompt": { "present": present, "shown": shown },
            "queue": {
                "pending": state.queue.pending(),
                "paused": state.queue.is_paused(),
            },
            "settings": settings_json(&settings),
        }),
    )
}

fn handle_prompt_get(id: u64, state: &ControlState) -> ControlResponse {
    match state.service.snapshot() {
        Some(snapshot) => ControlResponse::ok(
            id,
            json!({ "text": snapshot.text, "choices": snapshot.choices }),
        ),
        None => ControlResponse::ok(id, json!({})),
    }
}

fn handle_prompt_select(
    id: u64,
    params: Option<&serde_json::Value>,
    state: &ControlState,
) -> ControlResponse {
    let Some(choice) = params.and_then(|params| params.get("choice")) else {
        return ControlResponse::error_with_class(id, "missing params.choice".into(), "bad-request");
    };
    let selection = match state.service.select(choice) {
        Ok(selection) => selection,
        Err(err) => return ControlResponse::error_with_class(id, err.to_string(), err.wire_class()),
    };
    // Queue under the same settings the selection was validated against.
    let policy = selection.settings.emergency_policy();
    let command = selection.command;
    match state.queue.enqueue(&command, &policy) {
        Ok(outcome) => ControlResponse::ok(
            id,
            json!({ "command": command, "dispatch": outcome.as_str() }),
        ),
        Err(err) => {
            warn!("failed to transmit '{command}': {err}");
            ControlResponse::error(id, format!("failed to transmit '{command}': {err}"))
        }
    }
}

fn handle_config_get(id: u64, state: &ControlState) -> ControlResponse {
    let settings = state.service.settings_snapshot();
    ControlResponse::ok(id, settings_json(&settings))
}

fn handle_config_set(
    id: u64,
    params: Option<&serde_json::Value>,
    state: &ControlState,
) -> ControlResponse {
    let Some(params) = params else {
        return ControlResponse::error_with_class(id, "missing params".into(), "bad-request");
    };
    let mut settings = state
        .settings
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    // Apply to a staging copy so a rejected field leaves the live
    // settings untouched.
    let mut staged = settings.clone();
    if let Some(command) = params.get("command") {
        let Some(command) = command.as_str() else {
            return ControlResponse::error_with_class(id, "command must be a string".into(), "bad-request");
        };
        if let Err(err) = staged.set_command(command) {
            return ControlResponse::error_with_class(id, err.to_string(), "bad-request");
        }
    }
    if let Some(enabled) = params.get("enable_emergency_sending") {
        let Some(enabled) = enabled.as_bool() else {
            return ControlResponse::error_with_class(
                id,
                "enable_emergency_sending must be a bool".into(),
                "bad-request",
            );
        };
        staged.enable_emergency_sending = enabled;
    }
    if let Some(policy) = params.get("answer_policy") {
        let Some(policy) = policy.as_str() else {
            return ControlResponse::error_with_class(id, "answer_policy must be a string".into(), "bad-request");
        };
        match AnswerPolicy::parse(policy) {
            Ok(parsed) => staged.answer_policy = parsed,
            Err(err) => {
                return ControlResponse::error_with_class(id, err.to_string(), "bad-request")
            }
        }
    }
    *settings = staged;
    ControlResponse::ok(id, settings_json(&settings))
}

fn settings_json(settings: &PromptSettings) -> serde_json::Value {
    json!({
        "command": settings.command.as_str(),
        "enable_emergency_sending": settings.enable_emergency_sending,
        "answer_policy": settings.answer_policy,
    })
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use serde_json::json;

    use printcom_protocol::{PromptService, PromptSettings, PromptSink};

    use crate::queue::{FirmwareLink, SendQueue};
    use crate::transport::{ConnectionHandle, ControlFanout};

    use super::{handle_request_value, ControlState};

    #[derive(Clone, Default)]
    struct RecordingLink {
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl FirmwareLink for RecordingLink {
        fn send(&mut self, command: &str) -> io::Result<()> {
            self.sent.lock().unwrap().push(command.to_string());
            Ok(())
        }
    }

    fn state_with_token(auth_token: Option<&str>) -> (Arc<ControlState>, RecordingLink) {
        let link = RecordingLink::default();
        let settings = PromptSettings::default().shared();
        let fanout = Arc::new(ControlFanout::default());
        let sink: Arc<dyn PromptSink> = fanout.clone();
        let service = Arc::new(PromptService::new(settings.clone(), sink));
        let state = Arc::new(ControlState {
            service,
            settings,
            queue: Arc::new(SendQueue::new(Box::new(link.clone()))),
            fanout,
            host_name: "bench-printer".into(),
            auth_token: auth_token.map(Into::into),
            audit_tx: None,
            started: Instant::now(),
        });
        (state, link)
    }

    fn request(
        state: &Arc<ControlState>,
        value: serde_json::Value,
    ) -> serde_json::Value {
        let (outbound, _outbox) = mpsc::channel();
        let mut conn = ConnectionHandle::new(outbound);
        let response = handle_request_value(value, state, &mut conn);
        serde_json::to_value(&response).unwrap()
    }

    fn show_prompt(state: &Arc<ControlState>) {
        for line in [
            "prompt_begin Proceed?",
            "prompt_choice Yes",
            "prompt_choice No",
            "prompt_show",
        ] {
            state.service.handle_action_line(line);
        }
    }

    #[test]
    fn status_reports_prompt_and_queue_state() {
        let (state, _link) = state_with_token(None);
        let response = request(&state, json!({"id": 1, "type": "status"}));
        assert_eq!(response["ok"], json!(true));
        assert_eq!(response["result"]["state"], json!("idle"));

        show_prompt(&state);
        let response = request(&state, json!({"id": 2, "type": "status"}));
        assert_eq!(response["result"]["state"], json!("prompt-active"));
        assert_eq!(response["result"]["prompt"]["present"], json!(true));
        assert_eq!(response["result"]["settings"]["command"], json!("M876"));
    }

    #[test]
    fn prompt_get_returns_snapshot_or_empty_object() {
        let (state, _link) = state_with_token(None);
        let response = request(&state, json!({"id": 1, "type": "prompt.get"}));
        assert_eq!(response["result"], json!({}));

        show_prompt(&state);
        let response = request(&state, json!({"id": 2, "type": "prompt.get"}));
        assert_eq!(response["result"]["text"], json!("Proceed?"));
        assert_eq!(response["result"]["choices"], json!(["Yes", "No"]));
    }

    #[test]
    fn select_answers_and_transmits_the_command() {
        let (state, link) = state_with_token(None);
        show_prompt(&state);
        let response = request(
            &state,
            json!({"id": 3, "type": "prompt.select", "params": {"choice": 1}}),
        );
        assert_eq!(response["ok"], json!(true));
        assert_eq!(response["result"]["command"], json!("M876 S1"));
        assert_eq!(response["result"]["dispatch"], json!("sent"));
        assert_eq!(*link.sent.lock().unwrap(), ["M876 S1"]);
    }

    #[test]
    fn select_error_classes_reach_the_wire() {
        let (state, _link) = state_with_token(None);
        let response = request(
            &state,
            json!({"id": 1, "type": "prompt.select", "params": {"choice": 0}}),
        );
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["code"], json!("conflict"));

        show_prompt(&state);
        let response = request(
            &state,
            json!({"id": 2, "type": "prompt.select", "params": {"choice": 9}}),
        );
        assert_eq!(response["code"], json!("bad-request"));
        let response = request(
            &state,
            json!({"id": 3, "type": "prompt.select", "params": {"choice": "1"}}),
        );
        assert_eq!(response["code"], json!("bad-request"));
        let response = request(&state, json!({"id": 4, "type": "prompt.select"}));
        assert_eq!(response["code"], json!("bad-request"));
    }

    #[test]
    fn forced_answer_bypasses_a_paused_queue() {
        let (state, link) = state_with_token(None);
        state
            .settings
            .lock()
            .unwrap()
            .enable_emergency_sending = true;
        state.queue.pause();
        show_prompt(&state);
        let response = request(
            &state,
            json!({"id": 1, "type": "prompt.select", "params": {"choice": 0}}),
        );
        assert_eq!(response["result"]["dispatch"], json!("force-sent"));
        assert_eq!(*link.sent.lock().unwrap(), ["M876 S0"]);
    }

    #[test]
    fn auth_token_gates_every_request() {
        let (state, _link) = state_with_token(Some("secret"));
        let response = request(&state, json!({"id": 1, "type": "status"}));
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["code"], json!("unauthorized"));

        let response = request(
            &state,
            json!({"id": 2, "type": "status", "auth": "wrong"}),
        );
        assert_eq!(response["code"], json!("unauthorized"));

        let response = request(
            &state,
            json!({"id": 3, "type": "status", "auth": "secret"}),
        );
        assert_eq!(response["ok"], json!(true));
    }

    #[test]
    fn config_set_applies_live() {
        let (state, link) = state_with_token(None);
        let response = request(
            &state,
            json!({"id": 1, "type": "config.set", "params": {
                "command": "M900",
                "enable_emergency_sending": true,
                "answer_policy": "require-active",
            }}),
        );
        assert_eq!(response["result"]["command"], json!("M900"));
        assert_eq!(response["result"]["answer_policy"], json!("require-active"));

        show_prompt(&state);
        let response = request(
            &state,
            json!({"id": 2, "type": "prompt.select", "params": {"choice": 0}}),
        );
        assert_eq!(response["result"]["command"], json!("M900 S0"));
        assert_eq!(response["result"]["dispatch"], json!("force-sent"));
        assert_eq!(*link.sent.lock().unwrap(), ["M900 S0"]);
    }

    #[test]
    fn config_set_rejects_bad_values() {
        let (state, _link) = state_with_token(None);
        for params in [
            json!({"command": 7}),
            json!({"command": "M876 S0"}),
            json!({"enable_emergency_sending": "yes"}),
            json!({"answer_policy": "whenever"}),
        ] {
            let response = request(
                &state,
                json!({"id": 1, "type": "config.set", "params": params}),
            );
            assert_eq!(response["ok"], json!(false), "params should fail");
            assert_eq!(response["code"], json!("bad-request"));
        }
    }

    #[test]
    fn config_set_is_all_or_nothing() {
        let (state, _link) = state_with_token(None);
        let response = request(
            &state,
            json!({"id": 1, "type": "config.set", "params": {
                "command": "M900",
                "enable_emergency_sending": "yes",
            }}),
        );
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["code"], json!("bad-request"));

        // The valid field must not have been applied either.
        let settings = state.settings.lock().unwrap().clone();
        assert_eq!(settings, PromptSettings::default());
    }

    #[test]
    fn unsupported_requests_fail_cleanly() {
        let (state, _link) = state_with_token(None);
        let response = request(&state, json!({"id": 9, "type": "firmware.flash"}));
        assert_eq!(response["ok"], json!(false));
        assert_eq!(response["error"], json!("unsupported request"));
    }
}
