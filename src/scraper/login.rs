//! Multi-step login flow.
//!
//! The platform's login is a scripted challenge/response protocol: every
//! step POSTs the previous flow token plus one subtask input to
//! `onboarding/task.json`, and the server's answer names the next subtask.
//! The whole run executes under the owning session's login lock, so two
//! callers can never interleave steps of the same session.

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ScrapeError;

use super::cookies::{GUEST_TOKEN_COOKIE, SessionCookie};
use super::session::{XSession, API_BASE_URL, BASE_URL};

const ONBOARDING_TASK_PATH: &str = "/1.1/onboarding/task.json";

/// Delay range between flow steps; a fixed cadence is a bot signature.
const STEP_DELAY_MIN_MS: u64 = 500;
const STEP_DELAY_MAX_MS: u64 = 1500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlowState {
    InitPrivateApi,
    JsInstrumentation,
    EnterUserIdentifier,
    EnterAlternateIdentifier,
    EnterPassword,
    AccountDuplicationCheck,
    TwoFactorAuthChallenge,
    Acid,
    LoginSuccess,
    LoggedIn,
    DenyLogin,
    Unknown,
}

/// Map a server-issued subtask id onto the next state. Ids we cannot
/// answer land in `Unknown`, which terminates the flow with an error.
pub fn state_for_subtask(subtask_id: &str) -> LoginFlowState {
    match subtask_id {
        "LoginJsInstrumentationSubtask" => LoginFlowState::JsInstrumentation,
        "LoginEnterUserIdentifierSSO" => LoginFlowState::EnterUserIdentifier,
        "LoginEnterAlternateIdentifierSubtask" => LoginFlowState::EnterAlternateIdentifier,
        "LoginEnterPassword" => LoginFlowState::EnterPassword,
        "AccountDuplicationCheck" => LoginFlowState::AccountDuplicationCheck,
        "LoginTwoFactorAuthChallenge" => LoginFlowState::TwoFactorAuthChallenge,
        "LoginAcid" => LoginFlowState::Acid,
        "LoginSuccessSubtask" => LoginFlowState::LoginSuccess,
        "DenyLoginSubtask" => LoginFlowState::DenyLogin,
        _ => LoginFlowState::Unknown,
    }
}

#[derive(Debug, Default, Deserialize)]
struct FlowResponse {
    #[serde(default)]
    errors: Vec<FlowError>,
    #[serde(default)]
    flow_token: String,
    #[serde(default)]
    subtasks: Vec<FlowSubtask>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct FlowSubtask {
    #[serde(default)]
    subtask_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct GuestTokenResponse {
    #[serde(default)]
    guest_token: String,
}

/// One login attempt over a session's transport. Holds the per-attempt
/// guest token separately from the session's durable cookie state.
pub(crate) struct LoginFlow<'a> {
    session: &'a XSession,
    guest_token: Option<String>,
}

impl<'a> LoginFlow<'a> {
    pub(crate) fn new(session: &'a XSession) -> Self {
        Self {
            session,
            guest_token: None,
        }
    }

    /// Drive the state machine to `LoggedIn` or a terminal failure.
    pub(crate) async fn run(mut self) -> Result<(), ScrapeError> {
        let mut state = LoginFlowState::InitPrivateApi;
        let mut flow_token = String::new();
        let mut last_subtask = String::new();

        loop {
            debug!(state = ?state, "login flow step");
            match state {
                LoginFlowState::InitPrivateApi => {
                    self.seed_web_state().await?;
                    let (token, subtask) = self.execute_flow(init_flow_payload(), true).await?;
                    flow_token = token;
                    state = state_for_subtask(&subtask);
                    last_subtask = subtask;
                }
                LoginFlowState::JsInstrumentation => {
                    let payload = subtask_payload(
                        &flow_token,
                        "LoginJsInstrumentationSubtask",
                        json!({"js_instrumentation": {"link": "next_link"}}),
                    );
                    let (token, subtask) = self.execute_flow(payload, false).await?;
                    flow_token = token;
                    state = state_for_subtask(&subtask);
                    last_subtask = subtask;
                }
                LoginFlowState::EnterUserIdentifier => {
                    let username = &self.session.credentials().username;
                    let payload = subtask_payload(
                        &flow_token,
                        "LoginEnterUserIdentifierSSO",
                        json!({
                            "settings_list": {
                                "setting_responses": [{
                                    "key": "user_identifier",
                                    "response_data": {"text_data": {"result": username}},
                                }],
                                "link": "next_link",
                            }
                        }),
                    );
                    let (token, subtask) = self.execute_flow(payload, false).await?;
                    flow_token = token;
                    state = state_for_subtask(&subtask);
                    last_subtask = subtask;
                }
                LoginFlowState::EnterAlternateIdentifier => {
                    let email = &self.session.credentials().email;
                    let payload = subtask_payload(
                        &flow_token,
                        "LoginEnterAlternateIdentifierSubtask",
                        json!({"enter_text": {"text": email, "link": "next_link"}}),
                    );
                    let (token, subtask) = self.execute_flow(payload, false).await?;
                    flow_token = token;
                    state = state_for_subtask(&subtask);
                    last_subtask = subtask;
                }
                LoginFlowState::EnterPassword => {
                    let password = &self.session.credentials().password;
                    let payload = subtask_payload(
                        &flow_token,
                        "LoginEnterPassword",
                        json!({"enter_password": {"password": password, "link": "next_link"}}),
                    );
                    let (token, subtask) = self.execute_flow(payload, false).await?;
                    flow_token = token;
                    state = state_for_subtask(&subtask);
                    last_subtask = subtask;
                }
                LoginFlowState::AccountDuplicationCheck => {
                    let payload = subtask_payload(
                        &flow_token,
                        "AccountDuplicationCheck",
                        json!({"check_logged_in_account": {"link": "AccountDuplicationCheck_false"}}),
                    );
                    let (token, subtask) = self.execute_flow(payload, false).await?;
                    flow_token = token;
                    state = state_for_subtask(&subtask);
                    last_subtask = subtask;
                }
                LoginFlowState::TwoFactorAuthChallenge => {
                    let payload = subtask_payload(
                        &flow_token,
                        "LoginTwoFactorAuthChallenge",
                        Value::Null,
                    );
                    let (token, subtask) = self.execute_flow(payload, false).await?;
                    flow_token = token;
                    state = state_for_subtask(&subtask);
                    last_subtask = subtask;
                }
                LoginFlowState::Acid => {
                    let email = &self.session.credentials().email;
                    let payload = subtask_payload(
                        &flow_token,
                        "LoginAcid",
                        json!({"enter_text": {"text": email, "link": "next_link"}}),
                    );
                    let (token, subtask) = self.execute_flow(payload, false).await?;
                    flow_token = token;
                    state = state_for_subtask(&subtask);
                    last_subtask = subtask;
                }
                LoginFlowState::LoginSuccess => {
                    let payload = json!({
                        "flow_token": flow_token,
                        "subtask_inputs": [],
                    });
                    self.execute_flow(payload, false).await?;
                    state = LoginFlowState::LoggedIn;
                }
                LoginFlowState::LoggedIn => {
                    let key = self.session.credentials().key();
                    let snapshot = self.session.jar().snapshot();
                    self.session
                        .cookie_repository()
                        .save(&key, &snapshot)
                        .await
                        .map_err(|err| ScrapeError::Cookies(err.into()))?;
                    return Ok(());
                }
                LoginFlowState::DenyLogin => {
                    warn!("server denied the login flow");
                    return Err(ScrapeError::LoginDenied);
                }
                LoginFlowState::Unknown => {
                    return Err(ScrapeError::UnknownSubtask(last_subtask));
                }
            }

            let jitter_ms = rand::thread_rng().gen_range(STEP_DELAY_MIN_MS..STEP_DELAY_MAX_MS);
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
        }
    }

    /// The calls a browser makes before the login form submits anything:
    /// the login page itself (cookie seeding), a guest token when none is
    /// cached, and the hashflags metadata fetch whose body is discarded.
    async fn seed_web_state(&mut self) -> Result<(), ScrapeError> {
        let headers = self.flow_headers("GET", "/i/flow/login")?;
        let response = self
            .session
            .execute(
                self.session
                    .client()
                    .get(format!("{BASE_URL}/i/flow/login"))
                    .headers(headers),
            )
            .await?;
        let _ = response.bytes().await;

        if self.session.jar().get(GUEST_TOKEN_COOKIE).is_none() {
            let token = self.request_guest_token().await?;
            self.session.jar().set(SessionCookie {
                name: GUEST_TOKEN_COOKIE.to_owned(),
                value: token.clone(),
                domain: ".x.com".to_owned(),
            });
            self.guest_token = Some(token);
        } else {
            self.guest_token = self.session.jar().get(GUEST_TOKEN_COOKIE);
        }

        self.request_hashflags().await?;
        Ok(())
    }

    async fn request_guest_token(&self) -> Result<String, ScrapeError> {
        let headers = self.flow_headers("POST", "/1.1/guest/activate.json")?;
        let response: GuestTokenResponse = self
            .session
            .execute_json(
                self.session
                    .client()
                    .post(format!("{API_BASE_URL}/1.1/guest/activate.json"))
                    .headers(headers),
            )
            .await?;
        Ok(response.guest_token)
    }

    async fn request_hashflags(&self) -> Result<(), ScrapeError> {
        let headers = self.flow_headers("GET", "/1.1/hashflags.json")?;
        let response = self
            .session
            .execute(
                self.session
                    .client()
                    .get(format!("{API_BASE_URL}/1.1/hashflags.json"))
                    .headers(headers),
            )
            .await?;
        let _ = response.bytes().await;
        Ok(())
    }

    async fn execute_flow(
        &mut self,
        payload: Value,
        first: bool,
    ) -> Result<(String, String), ScrapeError> {
        let url = if first {
            format!("{API_BASE_URL}{ONBOARDING_TASK_PATH}?flow_name=login")
        } else {
            format!("{API_BASE_URL}{ONBOARDING_TASK_PATH}")
        };

        let headers = self.flow_headers("POST", ONBOARDING_TASK_PATH)?;
        let response: FlowResponse = self
            .session
            .execute_json(self.session.client().post(url).headers(headers).json(&payload))
            .await?;

        if let Some(error) = response.errors.first() {
            return Err(ScrapeError::Flow {
                code: error.code,
                message: error.message.clone(),
            });
        }

        let subtask_id = response
            .subtasks
            .first()
            .map(|s| s.subtask_id.clone())
            .unwrap_or_default();

        debug!(subtask = %subtask_id, "flow task answered");
        Ok((response.flow_token, subtask_id))
    }

    fn flow_headers(
        &self,
        method: &str,
        path: &str,
    ) -> Result<reqwest::header::HeaderMap, ScrapeError> {
        let mut headers = self.session.request_headers(method, path)?;
        if let Some(token) = &self.guest_token {
            if let Ok(value) = reqwest::header::HeaderValue::from_str(token) {
                headers.insert("x-guest-token", value);
            }
        }
        headers.insert(
            "x-twitter-active-user",
            reqwest::header::HeaderValue::from_static("yes"),
        );
        headers.insert(
            "priority",
            reqwest::header::HeaderValue::from_static("u=1, i"),
        );
        Ok(headers)
    }
}

fn subtask_payload(flow_token: &str, subtask_id: &str, input: Value) -> Value {
    let mut subtask = json!({"subtask_id": subtask_id});
    if let (Some(subtask_map), Some(input_map)) = (subtask.as_object_mut(), input.as_object()) {
        for (key, value) in input_map {
            subtask_map.insert(key.clone(), value.clone());
        }
    }
    json!({
        "flow_token": flow_token,
        "subtask_inputs": [subtask],
    })
}

fn init_flow_payload() -> Value {
    json!({
        "input_flow_data": {
            "flow_context": {
                "debug_overrides": {},
                "start_location": {"location": "splash_screen"},
            }
        },
        "subtask_versions": {
            "action_list": 2,
            "alert_dialog": 1,
            "app_download_cta": 1,
            "check_logged_in_account": 1,
            "choice_selection": 3,
            "contacts_live_sync_permission_prompt": 0,
            "cta": 7,
            "email_verification": 2,
            "end_flow": 1,
            "enter_date": 1,
            "enter_email": 2,
            "enter_password": 5,
            "enter_phone": 2,
            "enter_recaptcha": 1,
            "enter_text": 5,
            "enter_username": 2,
            "generic_urt": 3,
            "in_app_notification": 1,
            "interest_picker": 3,
            "js_instrumentation": 1,
            "menu_dialog": 1,
            "notifications_permission_prompt": 2,
            "open_account": 2,
            "open_home_timeline": 1,
            "open_link": 1,
            "phone_verification": 4,
            "privacy_options": 1,
            "security_key": 3,
            "select_avatar": 4,
            "select_banner": 2,
            "settings_list": 7,
            "show_code": 1,
            "sign_up": 2,
            "sign_up_review": 4,
            "tweet_selection_urt": 1,
            "update_users": 1,
            "upload_media": 1,
            "user_recommendations_list": 4,
            "user_recommendations_urt": 1,
            "wait_spinner": 3,
            "web_modal": 1,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtask_ids_map_to_states() {
        assert_eq!(
            state_for_subtask("LoginEnterPassword"),
            LoginFlowState::EnterPassword
        );
        assert_eq!(
            state_for_subtask("LoginSuccessSubtask"),
            LoginFlowState::LoginSuccess
        );
        assert_eq!(
            state_for_subtask("DenyLoginSubtask"),
            LoginFlowState::DenyLogin
        );
        assert_eq!(
            state_for_subtask("SomeFutureSubtask"),
            LoginFlowState::Unknown
        );
        assert_eq!(state_for_subtask(""), LoginFlowState::Unknown);
    }

    #[test]
    fn subtask_payload_embeds_id_and_input() {
        let payload = subtask_payload(
            "token-1",
            "LoginEnterPassword",
            json!({"enter_password": {"password": "hunter2", "link": "next_link"}}),
        );

        assert_eq!(payload["flow_token"], "token-1");
        let subtask = &payload["subtask_inputs"][0];
        assert_eq!(subtask["subtask_id"], "LoginEnterPassword");
        assert_eq!(subtask["enter_password"]["password"], "hunter2");
    }

    #[test]
    fn bare_subtask_payload_has_only_the_id() {
        let payload = subtask_payload("t", "LoginTwoFactorAuthChallenge", Value::Null);
        let subtask = &payload["subtask_inputs"][0];
        assert_eq!(subtask["subtask_id"], "LoginTwoFactorAuthChallenge");
        assert_eq!(subtask.as_object().unwrap().len(), 1);
    }

    #[test]
    fn init_payload_carries_flow_context_and_versions() {
        let payload = init_flow_payload();
        assert_eq!(
            payload["input_flow_data"]["flow_context"]["start_location"]["location"],
            "splash_screen"
        );
        assert_eq!(payload["subtask_versions"]["enter_password"], 5);
        assert!(payload.get("flow_token").is_none());
    }

    #[test]
    fn flow_response_decodes_error_lists() {
        let response: FlowResponse = serde_json::from_str(
            r#"{"errors":[{"code":399,"message":"wrong password"}],"flow_token":"t2","subtasks":[]}"#,
        )
        .unwrap();
        assert_eq!(response.errors[0].code, 399);
        assert_eq!(response.errors[0].message, "wrong password");
    }
}
