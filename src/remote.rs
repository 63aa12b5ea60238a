use std::future::Future;

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::{Error, Result};

/// The vendor service, as seen by the hub.
///
/// Every call may fail on its own; the hub wraps each one in its request timeout.
/// `HttpRemote` is the bundled implementation.
pub trait Remote: Send + Sync {
    /// Establish or renew the session. Credential rejection must map to
    /// `Error::Authentication`.
    fn reauthenticate(&self) -> impl Future<Output = Result<Session>> + Send;

    /// One topology per installation (location) on the account.
    fn fetch_installations(&self) -> impl Future<Output = Result<Vec<Topology>>> + Send;

    fn fetch_status(&self, location_id: &str) -> impl Future<Output = Result<Status>> + Send;

    fn fetch_zone_schedule(&self, zone_id: &ZoneId) -> impl Future<Output = Result<Schedule>> + Send;

    /// Finer-grained zone temperatures from a secondary source, if the remote has one.
    fn fetch_precise_temperatures(
        &self,
    ) -> impl Future<Output = Result<Vec<PreciseTemperature>>> + Send {
        async {
            Err(Error::PrecisionUnavailable(
                "remote has no high-precision source".to_string(),
            ))
        }
    }

    /// `ControllerMode::Reset` must be sent as the vendor's resume-schedule mode.
    fn apply_controller_mode(
        &self,
        system_id: &str,
        mode: ControllerMode,
    ) -> impl Future<Output = Result<()>> + Send;

    /// `until = None` overrides permanently.
    fn apply_zone_override(
        &self,
        zone_id: &ZoneId,
        temperature: Temperature,
        until: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn clear_zone_override(&self, zone_id: &ZoneId) -> impl Future<Output = Result<()>> + Send;

    /// `state` is `None` when returning to the schedule.
    fn apply_dhw_state(
        &self,
        dhw_id: &str,
        state: Option<DhwState>,
        mode: SetpointMode,
        until: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<()>> + Send;
}
