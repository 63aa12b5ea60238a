use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    self, InstallationInfo, LocationStatus, ScheduleDto, TokenResponse, UserAccount, V1Location,
    V1Session, CLIENT_AUTHORIZATION, DEFAULT_AUTH_URL, DEFAULT_V1_BASE_URL, DEFAULT_V2_BASE_URL,
    V1_SESSION_LIFETIME_SECS,
};
use crate::remote::Remote;
use crate::types::*;
use crate::{Error, Result};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpRemoteBuilder {
    username: String,
    password: String,
    auth_url: String,
    v2_base_url: String,
    v1_base_url: String,
    timeout: Duration,
    log_mode: Option<MessageLogMode>,
    log_path: Option<PathBuf>,
}

impl HttpRemoteBuilder {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            v2_base_url: DEFAULT_V2_BASE_URL.to_string(),
            v1_base_url: DEFAULT_V1_BASE_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into();
        self
    }

    pub fn v2_base_url(mut self, url: impl Into<String>) -> Self {
        self.v2_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn v1_base_url(mut self, url: impl Into<String>) -> Self {
        self.v1_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Per-request HTTP timeout. The hub applies its own deadline on top.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<HttpRemote> {
        let http = reqwest::Client::builder().timeout(self.timeout).build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, path)?)),
            _ => None,
        };

        Ok(HttpRemote {
            http,
            username: self.username,
            password: self.password,
            auth_url: self.auth_url,
            v2_base_url: self.v2_base_url,
            v1_base_url: self.v1_base_url,
            account: Mutex::new(None),
            v1_session: Mutex::new(None),
            logger,
        })
    }
}

#[derive(Debug, Clone)]
struct Account {
    access_token: String,
    user_id: String,
}

#[derive(Debug, Clone)]
struct V1State {
    session_id: String,
    user_id: i64,
    opened: Instant,
}

#[derive(Clone, Copy)]
enum Payload<'a> {
    Empty,
    Json(&'a Value),
    Form(&'a Value),
}

/// `Remote` over the vendor's web APIs.
pub struct HttpRemote {
    http: reqwest::Client,
    username: String,
    password: String,
    auth_url: String,
    v2_base_url: String,
    v1_base_url: String,
    account: Mutex<Option<Account>>,
    v1_session: Mutex<Option<V1State>>,
    logger: Option<Mutex<MessageLogger>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HttpRemote {
    pub fn builder(username: impl Into<String>, password: impl Into<String>) -> HttpRemoteBuilder {
        HttpRemoteBuilder::new(username, password)
    }

    fn log(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger {
            f(&mut lock(logger));
        }
    }

    /// Send one request, log both directions, and classify the HTTP status.
    async fn exchange(
        &self,
        request: RequestBuilder,
        method: &str,
        path: &str,
        payload: Payload<'_>,
    ) -> Result<Value> {
        let id = Uuid::new_v4();
        let logged_body = match payload {
            Payload::Empty => None,
            Payload::Json(b) | Payload::Form(b) => Some(b),
        };
        self.log(|l| l.log_request(id, method, path, logged_body));

        let request = match payload {
            Payload::Empty => request,
            Payload::Json(b) => request.json(b),
            Payload::Form(b) => request.form(b),
        };
        trace!(%method, %path, "sending");
        let response = request.header(ACCEPT, "application/json").send().await?;
        let status = response.status();
        let http_error = response.error_for_status_ref().err();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        self.log(|l| l.log_response(id, method, path, status.as_u16(), &body));
        debug!(%method, %path, status = status.as_u16(), "response");

        if status.is_success() {
            return Ok(body);
        }
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::Authentication(format!("{method} {path}: HTTP {status}"))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                Error::TransientFetch(format!("{method} {path}: rate limited"))
            }
            s if s.is_server_error() => Error::TransientFetch(format!("{method} {path}: HTTP {s}")),
            _ => match http_error {
                Some(e) => Error::Http(e),
                None => Error::MalformedResponse(format!("{method} {path}: HTTP {status}")),
            },
        })
    }

    fn account(&self) -> Result<Account> {
        lock(&self.account)
            .clone()
            .ok_or_else(|| Error::Authentication("not logged in".to_string()))
    }

    async fn get_v2<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let account = self.account()?;
        let request = self
            .http
            .get(format!("{}{path}", self.v2_base_url))
            .bearer_auth(&account.access_token);
        let body = self.exchange(request, "GET", path, Payload::Empty).await?;
        decode(path, body)
    }

    async fn put_v2(&self, path: &str, body: &Value) -> Result<()> {
        let account = self.account()?;
        let request = self
            .http
            .put(format!("{}{path}", self.v2_base_url))
            .bearer_auth(&account.access_token);
        self.exchange(request, "PUT", path, Payload::Json(body))
            .await
            .map(|_| ())
    }

    async fn v1_login(&self) -> Result<V1State> {
        let cached = lock(&self.v1_session).clone();
        if let Some(state) = cached
            && state.opened.elapsed() < Duration::from_secs(V1_SESSION_LIFETIME_SECS)
        {
            return Ok(state);
        }
        let path = "/Session";
        let body = protocol::v1_session_body(&self.username, &self.password);
        let request = self.http.post(format!("{}{path}", self.v1_base_url));
        let response = self.exchange(request, "POST", path, Payload::Json(&body)).await?;
        let session: V1Session = decode(path, response)?;
        let state = V1State {
            session_id: session.session_id,
            user_id: session.user_info.user_id,
            opened: Instant::now(),
        };
        *lock(&self.v1_session) = Some(state.clone());
        Ok(state)
    }

    async fn v1_temperatures(&self) -> Result<Vec<PreciseTemperature>> {
        let session = self.v1_login().await?;
        let path = format!("/locations?userId={}&allData=True", session.user_id);
        let request = self
            .http
            .get(format!("{}{path}", self.v1_base_url))
            .header("sessionId", &session.session_id);
        let body = self.exchange(request, "GET", &path, Payload::Empty).await?;
        let locations: Vec<V1Location> = decode(&path, body)?;
        Ok(locations
            .iter()
            .flat_map(V1Location::precise_temperatures)
            .collect())
    }
}

fn decode<T: DeserializeOwned>(path: &str, body: Value) -> Result<T> {
    serde_json::from_value(body).map_err(|e| Error::MalformedResponse(format!("{path}: {e}")))
}

/// The token endpoint answers bad credentials with a plain 400.
fn credentials_rejected(e: Error) -> Error {
    match e {
        Error::Http(ref inner) if inner.status().is_some_and(|s| s.is_client_error()) => {
            Error::Authentication(e.to_string())
        }
        other => other,
    }
}

impl Remote for HttpRemote {
    async fn reauthenticate(&self) -> Result<Session> {
        debug!("logging in");
        let form = protocol::token_form(&self.username, &self.password);
        let request = self
            .http
            .post(&self.auth_url)
            .header(AUTHORIZATION, CLIENT_AUTHORIZATION);
        let body = self
            .exchange(request, "POST", "/Auth/OAuth/Token", Payload::Form(&form))
            .await
            .map_err(credentials_rejected)?;
        let token: TokenResponse = decode("/Auth/OAuth/Token", body)?;

        let path = "/userAccount";
        let request = self
            .http
            .get(format!("{}{path}", self.v2_base_url))
            .bearer_auth(&token.access_token);
        let body = self.exchange(request, "GET", path, Payload::Empty).await?;
        let user: UserAccount = decode(path, body)?;

        *lock(&self.account) = Some(Account {
            access_token: token.access_token,
            user_id: user.user_id,
        });
        Ok(Session {
            lifetime: Duration::from_secs(token.expires_in),
        })
    }

    async fn fetch_installations(&self) -> Result<Vec<Topology>> {
        let user_id = self.account()?.user_id;
        let path = format!("/location/installationInfo?userId={user_id}&includeTemperatureControlSystems=True");
        let installations: Vec<InstallationInfo> = self.get_v2(&path).await?;
        installations
            .into_iter()
            .map(InstallationInfo::into_topology)
            .collect()
    }

    async fn fetch_status(&self, location_id: &str) -> Result<Status> {
        let path = format!("/location/{location_id}/status?includeTemperatureControlSystems=True");
        let status: LocationStatus = self.get_v2(&path).await?;
        status.into_status()
    }

    async fn fetch_zone_schedule(&self, zone_id: &ZoneId) -> Result<Schedule> {
        let path = format!("/temperatureZone/{zone_id}/schedule");
        let schedule: ScheduleDto = self.get_v2(&path).await?;
        schedule.into_schedule()
    }

    async fn fetch_precise_temperatures(&self) -> Result<Vec<PreciseTemperature>> {
        match self.v1_temperatures().await {
            Ok(temperatures) => Ok(temperatures),
            Err(e) => {
                *lock(&self.v1_session) = None;
                Err(Error::PrecisionUnavailable(e.to_string()))
            }
        }
    }

    async fn apply_controller_mode(&self, system_id: &str, mode: ControllerMode) -> Result<()> {
        let path = format!("/temperatureControlSystem/{system_id}/mode");
        self.put_v2(&path, &protocol::system_mode_body(mode)).await
    }

    async fn apply_zone_override(
        &self,
        zone_id: &ZoneId,
        temperature: Temperature,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let path = format!("/temperatureZone/{zone_id}/heatSetpoint");
        self.put_v2(&path, &protocol::heat_setpoint_body(temperature, until))
            .await
    }

    async fn clear_zone_override(&self, zone_id: &ZoneId) -> Result<()> {
        let path = format!("/temperatureZone/{zone_id}/heatSetpoint");
        self.put_v2(&path, &protocol::cancel_override_body()).await
    }

    async fn apply_dhw_state(
        &self,
        dhw_id: &str,
        state: Option<DhwState>,
        mode: SetpointMode,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let path = format!("/domesticHotWater/{dhw_id}/state");
        self.put_v2(&path, &protocol::dhw_state_body(state, mode, until))
            .await
    }
}
