//! Zone-level consequences of a controller mode change, applied to the cached status
//! before the remote controller has propagated the change itself.

use chrono::NaiveDateTime;
use tracing::{debug, warn};

use crate::cache::Snapshot;
use crate::config::Config;
use crate::schedule::{next_saturday, temperature_at};
use crate::types::*;
use crate::Result;

/// Degrees subtracted from the scheduled setpoint in `AutoWithEco`.
pub const ECO_OFFSET: f64 = 3.0;

/// Rewrite `status.zones` for a switch to `mode`.
///
/// `snapshot` supplies topology and schedules; `previous` is the controller mode before
/// the switch; `now` is local wall-clock time at the installation.
///
/// Zones in `PermanentOverride` keep their setting unless `mode` is `Reset`. A zone
/// whose schedule lookup fails keeps its current target; it still follows the schedule.
pub fn cascade(
    status: &mut Status,
    snapshot: &Snapshot,
    config: &Config,
    mode: ControllerMode,
    previous: ControllerMode,
    now: NaiveDateTime,
) {
    if mode == ControllerMode::Custom {
        debug!("custom mode, targets unknown until next poll");
        return;
    }

    for zone in &mut status.zones {
        if zone.setpoint_mode == SetpointMode::PermanentOverride && mode != ControllerMode::Reset {
            debug!(zone = %zone.id, "permanent override kept");
            continue;
        }
        zone.setpoint_mode = SetpointMode::FollowSchedule;
        zone.until = None;

        match target_for(snapshot, config, mode, previous, zone, now) {
            Ok(Some(target)) => {
                debug!(zone = %zone.id, %target, "assumed target");
                zone.target = target;
            }
            Ok(None) => {}
            Err(e) => warn!(zone = %zone.id, error = %e, "keeping target, schedule lookup failed"),
        }
    }
}

fn target_for(
    snapshot: &Snapshot,
    config: &Config,
    mode: ControllerMode,
    previous: ControllerMode,
    zone: &ZoneStatus,
    now: NaiveDateTime,
) -> Result<Option<Temperature>> {
    let scheduled = |at: NaiveDateTime| -> Result<Option<Temperature>> {
        if !config.schedules() {
            return Ok(None);
        }
        temperature_at(snapshot, &zone.id, at).map(Some)
    };

    match mode {
        ControllerMode::Reset | ControllerMode::Auto => scheduled(now),
        ControllerMode::AutoWithEco => {
            if config.schedules() {
                return Ok(scheduled(now)?.map(|t| t.offset(-ECO_OFFSET)));
            }
            // without schedules the reported target is the best base, unless it is
            // already an eco target
            if previous == ControllerMode::AutoWithEco {
                Ok(None)
            } else {
                Ok(Some(zone.target.offset(-ECO_OFFSET)))
            }
        }
        ControllerMode::DayOff => scheduled(next_saturday(now)),
        ControllerMode::Away => Ok(config.schedules().then_some(Temperature::AWAY)),
        ControllerMode::HeatingOff => Ok(config.schedules().then_some(Temperature::FROST_PROTECT)),
        ControllerMode::Custom => Ok(None),
    }
}
