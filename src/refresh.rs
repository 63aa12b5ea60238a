//! Refresh planning: three expiry clocks reduced to one decision per tick.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::cache::RefreshClock;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Too soon since the last status fetch.
    Skip,
    /// Status only.
    Status,
    /// Topology (and schedules, if enabled), then status. Session still valid.
    Topology,
    /// Re-authenticate, then topology (and schedules), then status.
    Full,
}

pub fn plan(clock: &RefreshClock, now: DateTime<Utc>, has_topology: bool, config: &Config) -> Refresh {
    if let Some(expires) = clock.status_expires_at
        && now < expires
    {
        return Refresh::Skip;
    }

    match clock.session_expires_at {
        Some(expires) if now <= expires => {}
        _ => return Refresh::Full,
    }

    if !has_topology || topology_stale(clock, now, config) {
        return Refresh::Topology;
    }

    Refresh::Status
}

fn topology_stale(clock: &RefreshClock, now: DateTime<Utc>, config: &Config) -> bool {
    match (config.topology_refresh_interval(), clock.last_topology_refresh) {
        (Some(interval), Some(last)) => now >= after(last, interval),
        (_, None) => true,
        (None, Some(_)) => false,
    }
}

/// Record a successful status fetch.
pub(crate) fn status_refreshed(clock: &mut RefreshClock, now: DateTime<Utc>, config: &Config) {
    clock.last_status_refresh = Some(now);
    clock.status_expires_at = Some(after(now, config.scan_interval()));
}

/// Record a successful re-authentication. The session is treated as expiring one
/// scan interval plus the safety margin before it actually does, so the last poll
/// inside a session never runs on a dead credential.
///
/// A new session also owes a topology fetch: until one succeeds, `plan` keeps
/// answering `Topology`.
pub(crate) fn session_renewed(
    clock: &mut RefreshClock,
    now: DateTime<Utc>,
    lifetime: Duration,
    config: &Config,
) {
    let usable = lifetime
        .saturating_sub(config.session_margin())
        .saturating_sub(config.scan_interval());
    clock.session_expires_at = Some(after(now, usable));
    clock.last_topology_refresh = None;
}

pub(crate) fn topology_refreshed(clock: &mut RefreshClock, now: DateTime<Utc>) {
    clock.last_topology_refresh = Some(now);
}

fn after(t: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(d)
        .ok()
        .and_then(|d| t.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn cfg() -> Config {
        Config::builder()
            .scan_interval(Duration::from_secs(300))
            .session_margin(Duration::from_secs(120))
            .build()
    }

    fn fresh_clock(config: &Config) -> RefreshClock {
        let mut clock = RefreshClock::default();
        session_renewed(&mut clock, at(0), Duration::from_secs(3600), config);
        topology_refreshed(&mut clock, at(0));
        status_refreshed(&mut clock, at(0), config);
        clock
    }

    #[test]
    fn first_tick_is_full() {
        assert_eq!(plan(&RefreshClock::default(), at(0), false, &cfg()), Refresh::Full);
    }

    #[test]
    fn within_scan_interval_is_skipped() {
        let config = cfg();
        let clock = fresh_clock(&config);
        assert_eq!(plan(&clock, at(10), true, &config), Refresh::Skip);
        assert_eq!(plan(&clock, at(299), true, &config), Refresh::Skip);
        assert_eq!(plan(&clock, at(300), true, &config), Refresh::Status);
    }

    #[test]
    fn session_expiry_leaves_margin_and_one_interval() {
        let config = cfg();
        let clock = fresh_clock(&config);
        // 3600 - 120 - 300
        assert_eq!(clock.session_expires_at, Some(at(3180)));
        assert_eq!(plan(&clock, at(3180), true, &config), Refresh::Status);
        assert_eq!(plan(&clock, at(3181), true, &config), Refresh::Full);
    }

    #[test]
    fn renewed_session_without_topology_fetch_plans_topology() {
        let config = cfg();
        let mut clock = fresh_clock(&config);
        session_renewed(&mut clock, at(3200), Duration::from_secs(3600), &config);
        assert_eq!(clock.last_topology_refresh, None);
        assert_eq!(plan(&clock, at(3201), true, &config), Refresh::Topology);

        topology_refreshed(&mut clock, at(3201));
        status_refreshed(&mut clock, at(3201), &config);
        assert_eq!(plan(&clock, at(3501), true, &config), Refresh::Status);
    }

    #[test]
    fn missing_topology_refetched_without_reauth() {
        let config = cfg();
        let clock = fresh_clock(&config);
        assert_eq!(plan(&clock, at(600), false, &config), Refresh::Topology);
    }

    #[test]
    fn stale_topology_when_interval_configured() {
        let config = Config::builder()
            .scan_interval(Duration::from_secs(300))
            .topology_refresh_interval(Duration::from_secs(900))
            .build();
        let mut clock = fresh_clock(&config);
        clock.session_expires_at = Some(at(100_000));
        assert_eq!(plan(&clock, at(600), true, &config), Refresh::Status);
        assert_eq!(plan(&clock, at(900), true, &config), Refresh::Topology);
    }
}
