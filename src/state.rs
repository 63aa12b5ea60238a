//! Display state derivation. Pure functions of a snapshot and the configuration.

use tracing::trace;

use crate::cache::Snapshot;
use crate::config::Config;
use crate::types::*;
use crate::Result;

/// Controller state is its mode, except that `Reset` settles into `Auto`.
pub fn controller_state(snapshot: &Snapshot) -> ControllerMode {
    match snapshot.controller_mode() {
        ControllerMode::Reset => ControllerMode::Auto,
        mode => mode,
    }
}

/// Derived state of a zone, highest precedence first:
///
/// 1. with heuristics on, controller `Away` / `HeatingOff` win outright;
/// 2. a target at the frost-protect floor is `FrostProtect` under `HeatingOff`,
///    otherwise an open-window cutout;
/// 3. a zone following its schedule takes the controller's mode;
/// 4. anything else shows the zone's own override.
pub fn zone_state(snapshot: &Snapshot, config: &Config, zone_id: &ZoneId) -> Result<ZoneState> {
    let zone = snapshot.zone(zone_id)?;
    let mode = snapshot.controller_mode();

    if config.heuristics() {
        match mode {
            ControllerMode::Away => return Ok(ZoneState::Away),
            ControllerMode::HeatingOff => return Ok(ZoneState::FrostProtect),
            _ => {}
        }
    }

    if zone.status.target.approx_eq(Temperature::FROST_PROTECT) {
        if mode == ControllerMode::HeatingOff {
            return Ok(ZoneState::FrostProtect);
        }
        trace!(zone = %zone_id, "target at frost floor outside HeatingOff, assuming open window");
        return Ok(ZoneState::OpenWindow);
    }

    let state = match zone.status.setpoint_mode {
        SetpointMode::FollowSchedule => mode_as_zone_state(mode),
        SetpointMode::TemporaryOverride => ZoneState::TemporaryOverride,
        SetpointMode::PermanentOverride => ZoneState::PermanentOverride,
    };
    Ok(state)
}

fn mode_as_zone_state(mode: ControllerMode) -> ZoneState {
    match mode {
        ControllerMode::Auto | ControllerMode::Reset => ZoneState::Auto,
        ControllerMode::AutoWithEco => ZoneState::AutoWithEco,
        ControllerMode::Away => ZoneState::Away,
        ControllerMode::DayOff => ZoneState::DayOff,
        ControllerMode::Custom => ZoneState::Custom,
        ControllerMode::HeatingOff => ZoneState::FrostProtect,
    }
}

/// Hot water is reported off while the controller is `Away` (heuristics on);
/// otherwise its reported state is used verbatim.
pub fn dhw_state(snapshot: &Snapshot, config: &Config) -> Result<DhwState> {
    let (_, status) = snapshot.dhw()?;
    if config.heuristics() && snapshot.controller_mode() == ControllerMode::Away {
        return Ok(DhwState::Off);
    }
    Ok(status.state)
}
