//! Wire shapes of the vendor's two web APIs and their mapping onto the domain types.
//!
//! v2 (`/WebAPI/emea/api/v1`) carries topology, status, schedules and commands.
//! v1 (`/WebAPI/api`) is used only for its finer-grained zone temperatures.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_AUTH_URL: &str = "https://tccna.honeywell.com/Auth/OAuth/Token";
pub const DEFAULT_V2_BASE_URL: &str = "https://tccna.honeywell.com/WebAPI/emea/api/v1";
pub const DEFAULT_V1_BASE_URL: &str = "https://tccna.honeywell.com/WebAPI/api";

/// Public client credentials of the vendor's own app, sent as HTTP basic auth.
pub const CLIENT_AUTHORIZATION: &str = "Basic NGEyMzEwODktZDJiNi00MWJkLWE1ZWItMTZhMGE0MjJiOTk5OjFhMTVjZGI4LTQyZGUtNDA3Yi1hZGQwLTA1OWY5MmM1MzBjYg==";
pub const V1_APPLICATION_ID: &str = "91db1612-73fd-4500-91b2-e63b069b185c";
const OAUTH_SCOPE: &str = "EMEA-V1-Basic EMEA-V1-Anonymous EMEA-V1-Get-Current-User-Account";

/// v1 reports this indoor temperature for a sensor that is not available.
pub const V1_TEMPERATURE_UNAVAILABLE: f64 = 128.0;

/// v1 sessions are not refreshed explicitly; the vendor expires them after 15 minutes idle.
pub const V1_SESSION_LIFETIME_SECS: u64 = 15 * 60;

pub fn token_form(username: &str, password: &str) -> Value {
    json!({
        "grant_type": "password",
        "scope": OAUTH_SCOPE,
        "Username": username,
        "Password": password,
    })
}

pub fn v1_session_body(username: &str, password: &str) -> Value {
    json!({
        "Username": username,
        "Password": password,
        "ApplicationId": V1_APPLICATION_ID,
    })
}

pub fn system_mode_body(mode: ControllerMode) -> Value {
    json!({
        "SystemMode": mode.as_vendor_str(),
        "TimeUntil": null,
        "Permanent": true,
    })
}

pub fn heat_setpoint_body(temperature: Temperature, until: Option<DateTime<Utc>>) -> Value {
    let mode = match until {
        Some(_) => SetpointMode::TemporaryOverride,
        None => SetpointMode::PermanentOverride,
    };
    json!({
        "HeatSetpointValue": temperature.celsius(),
        "SetpointMode": mode.as_vendor_str(),
        "TimeUntil": until.map(format_until),
    })
}

pub fn cancel_override_body() -> Value {
    json!({
        "HeatSetpointValue": 0.0,
        "SetpointMode": SetpointMode::FollowSchedule.as_vendor_str(),
        "TimeUntil": null,
    })
}

pub fn dhw_state_body(
    state: Option<DhwState>,
    mode: SetpointMode,
    until: Option<DateTime<Utc>>,
) -> Value {
    json!({
        "State": state.map_or("", |s| s.as_vendor_str()),
        "Mode": mode.as_vendor_str(),
        "UntilTime": until.map(format_until),
    })
}

fn format_until(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationInfo {
    pub location_info: LocationInfo,
    #[serde(default)]
    pub gateways: Vec<GatewayInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInfo {
    pub location_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayInfo {
    #[serde(default)]
    pub temperature_control_systems: Vec<SystemInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub system_id: String,
    #[serde(default)]
    pub zones: Vec<ZoneInfo>,
    pub dhw: Option<DhwInfo>,
    #[serde(default)]
    pub allowed_system_modes: Vec<AllowedSystemMode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedSystemMode {
    pub system_mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInfo {
    pub zone_id: String,
    pub name: String,
    pub setpoint_capabilities: SetpointCapabilities,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetpointCapabilities {
    pub min_heat_setpoint: f64,
    pub max_heat_setpoint: f64,
    #[serde(default = "default_resolution")]
    pub value_resolution: f64,
    #[serde(default)]
    pub allowed_setpoint_modes: Vec<String>,
}

fn default_resolution() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhwInfo {
    pub dhw_id: String,
    pub dhw_state_capabilities_response: Option<DhwCapabilities>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhwCapabilities {
    #[serde(default)]
    pub allowed_modes: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationStatus {
    #[serde(default)]
    pub gateways: Vec<GatewayStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    #[serde(default)]
    pub temperature_control_systems: Vec<SystemStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub system_id: String,
    #[serde(default)]
    pub zones: Vec<ZoneStatusDto>,
    pub dhw: Option<DhwStatusDto>,
    pub system_mode_status: SystemModeStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemModeStatus {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemperatureStatus {
    pub temperature: Option<f64>,
    #[serde(default)]
    pub is_available: bool,
}

impl TemperatureStatus {
    fn reading(&self) -> Option<Temperature> {
        self.temperature
            .filter(|_| self.is_available)
            .map(Temperature::from_celsius)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneStatusDto {
    pub zone_id: String,
    pub temperature_status: TemperatureStatus,
    pub setpoint_status: SetpointStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetpointStatus {
    pub target_heat_temperature: f64,
    pub setpoint_mode: String,
    pub until: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DhwStatusDto {
    pub dhw_id: String,
    pub temperature_status: TemperatureStatus,
    pub state_status: StateStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStatus {
    pub state: String,
    pub mode: String,
    pub until: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDto {
    #[serde(default)]
    pub daily_schedules: Vec<DailySchedule>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySchedule {
    pub day_of_week: String,
    #[serde(default)]
    pub switchpoints: Vec<SwitchpointDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchpointDto {
    pub heat_setpoint: f64,
    pub time_of_day: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V1Session {
    pub session_id: String,
    pub user_info: V1UserInfo,
}

#[derive(Debug, Deserialize)]
pub struct V1UserInfo {
    #[serde(rename = "userID")]
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct V1Location {
    #[serde(default)]
    pub devices: Vec<V1Device>,
}

#[derive(Debug, Deserialize)]
pub struct V1Device {
    #[serde(rename = "deviceID")]
    pub device_id: i64,
    pub thermostat: Option<V1Thermostat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V1Thermostat {
    pub indoor_temperature: f64,
}

fn malformed(msg: impl Into<String>) -> Error {
    Error::MalformedResponse(msg.into())
}

fn setpoint_mode(s: &str) -> Result<SetpointMode> {
    SetpointMode::from_vendor_str(s).ok_or_else(|| malformed(format!("unknown setpoint mode {s:?}")))
}

/// Accepts RFC 3339 and the vendor's zone-less `YYYY-MM-DDTHH:MM:SS` (taken as UTC).
fn parse_until(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let Some(s) = s else {
        return Ok(None);
    };
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(Some(t.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .map(|t| Some(t.and_utc()))
        .map_err(|_| malformed(format!("unparseable time {s:?}")))
}

impl InstallationInfo {
    /// The first temperature control system of the location; the vendor app shows no other.
    pub fn into_topology(self) -> Result<Topology> {
        let location_id = self.location_info.location_id;
        let system = self
            .gateways
            .into_iter()
            .flat_map(|g| g.temperature_control_systems)
            .next()
            .ok_or_else(|| malformed(format!("location {location_id} has no control system")))?;

        let allowed_modes = system
            .allowed_system_modes
            .iter()
            .filter_map(|m| ControllerMode::from_vendor_str(&m.system_mode))
            .collect();

        let zones = system
            .zones
            .into_iter()
            .map(|z| {
                let caps = z.setpoint_capabilities;
                Ok(ZoneDescriptor {
                    id: ZoneId::new(z.zone_id),
                    name: z.name,
                    min_temp: Temperature::from_celsius(caps.min_heat_setpoint),
                    max_temp: Temperature::from_celsius(caps.max_heat_setpoint),
                    step: caps.value_resolution,
                    allowed_modes: caps
                        .allowed_setpoint_modes
                        .iter()
                        .map(|m| setpoint_mode(m))
                        .collect::<Result<_>>()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let dhw = system
            .dhw
            .map(|d| {
                let allowed_modes = d
                    .dhw_state_capabilities_response
                    .map(|c| c.allowed_modes)
                    .unwrap_or_default()
                    .iter()
                    .map(|m| setpoint_mode(m))
                    .collect::<Result<_>>()?;
                Ok::<_, Error>(DhwDescriptor {
                    id: d.dhw_id,
                    allowed_modes,
                })
            })
            .transpose()?;

        Ok(Topology {
            location_id,
            location_name: self.location_info.name,
            system_id: system.system_id,
            allowed_modes,
            zones,
            dhw,
        })
    }
}

impl LocationStatus {
    pub fn into_status(self) -> Result<Status> {
        let system = self
            .gateways
            .into_iter()
            .flat_map(|g| g.temperature_control_systems)
            .next()
            .ok_or_else(|| malformed("status has no control system"))?;

        let mode = ControllerMode::from_vendor_str(&system.system_mode_status.mode).ok_or_else(|| {
            malformed(format!("unknown system mode {:?}", system.system_mode_status.mode))
        })?;

        let zones = system
            .zones
            .into_iter()
            .map(|z| {
                Ok(ZoneStatus {
                    id: ZoneId::new(z.zone_id),
                    current: z.temperature_status.reading(),
                    target: Temperature::from_celsius(z.setpoint_status.target_heat_temperature),
                    setpoint_mode: setpoint_mode(&z.setpoint_status.setpoint_mode)?,
                    until: parse_until(z.setpoint_status.until.as_deref())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let dhw = system
            .dhw
            .map(|d| {
                let state = DhwState::from_vendor_str(&d.state_status.state).ok_or_else(|| {
                    malformed(format!("unknown hot water state {:?}", d.state_status.state))
                })?;
                Ok::<_, Error>(DhwStatus {
                    id: d.dhw_id,
                    state,
                    mode: setpoint_mode(&d.state_status.mode)?,
                    current: d.temperature_status.reading(),
                    until: parse_until(d.state_status.until.as_deref())?,
                })
            })
            .transpose()?;

        Ok(Status {
            system_id: system.system_id,
            mode,
            zones,
            dhw,
        })
    }
}

impl ScheduleDto {
    pub fn into_schedule(self) -> Result<Schedule> {
        let mut schedule = Schedule::new();
        for day in self.daily_schedules {
            let weekday: Weekday = day
                .day_of_week
                .parse()
                .map_err(|_| malformed(format!("unknown weekday {:?}", day.day_of_week)))?;
            let points = day
                .switchpoints
                .into_iter()
                .map(|p| {
                    let time = NaiveTime::parse_from_str(&p.time_of_day, "%H:%M:%S")
                        .map_err(|_| malformed(format!("bad switchpoint time {:?}", p.time_of_day)))?;
                    Ok(Switchpoint::new(time, Temperature::from_celsius(p.heat_setpoint)))
                })
                .collect::<Result<Vec<_>>>()?;
            schedule.set_day(weekday, points);
        }
        Ok(schedule)
    }
}

impl V1Location {
    /// Device ids in v1 are the zone ids of v2.
    pub fn precise_temperatures(&self) -> Vec<PreciseTemperature> {
        self.devices
            .iter()
            .filter_map(|d| {
                let thermostat = d.thermostat.as_ref()?;
                let t = thermostat.indoor_temperature;
                Some(PreciseTemperature {
                    zone_id: ZoneId::new(d.device_id.to_string()),
                    temperature: (t < V1_TEMPERATURE_UNAVAILABLE).then(|| Temperature::from_celsius(t)),
                })
            })
            .collect()
    }
}
