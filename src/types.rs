use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc, Weekday};

/// Temperature in degrees Celsius.
/// evohome reports and accepts Celsius only; zones step in 0.5 increments by default.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Temperature(f64);

impl Temperature {
    /// Safety floor the controller applies for frost protection and open-window cutouts.
    pub const FROST_PROTECT: Temperature = Temperature(5.0);
    /// Setpoint assumed for every zone while the controller is `Away`.
    pub const AWAY: Temperature = Temperature(10.0);

    pub fn from_celsius(c: f64) -> Self {
        Self(c)
    }

    pub fn celsius(&self) -> f64 {
        self.0
    }

    /// Shift by `delta` degrees.
    pub fn offset(&self, delta: f64) -> Self {
        Self(self.0 + delta)
    }

    /// Round to the nearest multiple of `step` (a zone's value resolution).
    pub fn round_to(&self, step: f64) -> Self {
        if step <= 0.0 {
            return *self;
        }
        let per_degree = 1.0 / step;
        Self((self.0 * per_degree).round() / per_degree)
    }

    /// Equality within a hundredth of a degree; reported values are decimal fractions.
    pub fn approx_eq(&self, other: Temperature) -> bool {
        (self.0 - other.0).abs() < 0.01
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ZoneId(String);

impl ZoneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ZoneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Operating mode of the controller (temperature control system).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerMode {
    Auto,
    AutoWithEco,
    Away,
    DayOff,
    HeatingOff,
    Custom,
    /// Resets every zone to its schedule, then behaves as `Auto`.
    Reset,
}

impl ControllerMode {
    pub const ALL: [ControllerMode; 7] = [
        ControllerMode::Auto,
        ControllerMode::AutoWithEco,
        ControllerMode::Away,
        ControllerMode::DayOff,
        ControllerMode::HeatingOff,
        ControllerMode::Custom,
        ControllerMode::Reset,
    ];

    pub fn as_vendor_str(&self) -> &'static str {
        match self {
            ControllerMode::Auto => "Auto",
            ControllerMode::AutoWithEco => "AutoWithEco",
            ControllerMode::Away => "Away",
            ControllerMode::DayOff => "DayOff",
            ControllerMode::HeatingOff => "HeatingOff",
            ControllerMode::Custom => "Custom",
            ControllerMode::Reset => "AutoWithReset",
        }
    }

    pub fn from_vendor_str(s: &str) -> Option<Self> {
        match s {
            "Auto" => Some(ControllerMode::Auto),
            "AutoWithEco" => Some(ControllerMode::AutoWithEco),
            "Away" => Some(ControllerMode::Away),
            "DayOff" => Some(ControllerMode::DayOff),
            "HeatingOff" => Some(ControllerMode::HeatingOff),
            "Custom" => Some(ControllerMode::Custom),
            "AutoWithReset" => Some(ControllerMode::Reset),
            _ => None,
        }
    }
}

impl fmt::Display for ControllerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_vendor_str())
    }
}

/// Per-zone (and DHW) override state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetpointMode {
    FollowSchedule,
    TemporaryOverride,
    PermanentOverride,
}

impl SetpointMode {
    pub fn as_vendor_str(&self) -> &'static str {
        match self {
            SetpointMode::FollowSchedule => "FollowSchedule",
            SetpointMode::TemporaryOverride => "TemporaryOverride",
            SetpointMode::PermanentOverride => "PermanentOverride",
        }
    }

    pub fn from_vendor_str(s: &str) -> Option<Self> {
        match s {
            "FollowSchedule" => Some(SetpointMode::FollowSchedule),
            "TemporaryOverride" => Some(SetpointMode::TemporaryOverride),
            "PermanentOverride" => Some(SetpointMode::PermanentOverride),
            _ => None,
        }
    }
}

impl fmt::Display for SetpointMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_vendor_str())
    }
}

/// Displayed state of a zone. Richer than anything the vendor reports directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneState {
    Auto,
    AutoWithEco,
    Away,
    DayOff,
    Custom,
    FrostProtect,
    OpenWindow,
    TemporaryOverride,
    PermanentOverride,
}

impl ZoneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneState::Auto => "Auto",
            ZoneState::AutoWithEco => "AutoWithEco",
            ZoneState::Away => "Away",
            ZoneState::DayOff => "DayOff",
            ZoneState::Custom => "Custom",
            ZoneState::FrostProtect => "FrostProtect",
            ZoneState::OpenWindow => "OpenWindow",
            ZoneState::TemporaryOverride => "TemporaryOverride",
            ZoneState::PermanentOverride => "PermanentOverride",
        }
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhwState {
    On,
    Off,
}

impl DhwState {
    pub fn as_vendor_str(&self) -> &'static str {
        match self {
            DhwState::On => "On",
            DhwState::Off => "Off",
        }
    }

    pub fn from_vendor_str(s: &str) -> Option<Self> {
        match s {
            "On" => Some(DhwState::On),
            "Off" => Some(DhwState::Off),
            _ => None,
        }
    }
}

impl fmt::Display for DhwState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_vendor_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneDescriptor {
    pub id: ZoneId,
    pub name: String,
    pub min_temp: Temperature,
    pub max_temp: Temperature,
    /// Setpoint resolution in degrees.
    pub step: f64,
    pub allowed_modes: Vec<SetpointMode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DhwDescriptor {
    pub id: String,
    pub allowed_modes: Vec<SetpointMode>,
}

/// Installation layout. Replaced wholesale on every full refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub location_id: String,
    pub location_name: String,
    pub system_id: String,
    pub allowed_modes: Vec<ControllerMode>,
    pub zones: Vec<ZoneDescriptor>,
    pub dhw: Option<DhwDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneStatus {
    pub id: ZoneId,
    /// `None` when the zone's sensor is unavailable.
    pub current: Option<Temperature>,
    pub target: Temperature,
    pub setpoint_mode: SetpointMode,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DhwStatus {
    pub id: String,
    pub state: DhwState,
    pub mode: SetpointMode,
    pub current: Option<Temperature>,
    pub until: Option<DateTime<Utc>>,
}

/// Temperatures and modes, replaced on every status refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub system_id: String,
    pub mode: ControllerMode,
    pub zones: Vec<ZoneStatus>,
    pub dhw: Option<DhwStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Switchpoint {
    pub time: NaiveTime,
    pub temperature: Temperature,
}

impl Switchpoint {
    pub fn new(time: NaiveTime, temperature: Temperature) -> Self {
        Self { time, temperature }
    }
}

/// Weekly heating schedule of one zone: per weekday, switchpoints ordered by time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schedule {
    days: [Vec<Switchpoint>; 7],
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the switchpoints of `day`. Input order does not matter.
    pub fn with_day(mut self, day: Weekday, points: Vec<Switchpoint>) -> Self {
        self.set_day(day, points);
        self
    }

    pub fn set_day(&mut self, day: Weekday, mut points: Vec<Switchpoint>) {
        points.sort_by_key(|p| p.time);
        self.days[day.num_days_from_monday() as usize] = points;
    }

    pub fn day(&self, day: Weekday) -> &[Switchpoint] {
        &self.days[day.num_days_from_monday() as usize]
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(Vec::is_empty)
    }
}

/// Result of a successful (re-)authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    /// How long the credential stays valid from the moment it was issued.
    pub lifetime: Duration,
}

/// A zone temperature from the finer-grained secondary source.
#[derive(Debug, Clone, PartialEq)]
pub struct PreciseTemperature {
    pub zone_id: ZoneId,
    pub temperature: Option<Temperature>,
}
