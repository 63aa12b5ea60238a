use std::time::Duration;

pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(300);
pub const MIN_SCAN_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_SESSION_MARGIN: Duration = Duration::from_secs(120);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Startup settings of a hub. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    scan_interval: Duration,
    session_margin: Duration,
    request_timeout: Duration,
    topology_refresh_interval: Option<Duration>,
    schedules: bool,
    heuristics: bool,
    high_precision: bool,
    location_index: usize,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Minimum time between status polls, always a whole number of minutes.
    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub fn session_margin(&self) -> Duration {
        self.session_margin
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn topology_refresh_interval(&self) -> Option<Duration> {
        self.topology_refresh_interval
    }

    /// Whether zone schedules are fetched and used for optimistic targets.
    pub fn schedules(&self) -> bool {
        self.schedules
    }

    /// Whether controller-wide modes (Away, HeatingOff) override derived zone/DHW state.
    pub fn heuristics(&self) -> bool {
        self.heuristics
    }

    pub fn high_precision(&self) -> bool {
        self.high_precision
    }

    /// Which installation to bind to when the account has several.
    pub fn location_index(&self) -> usize {
        self.location_index
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::default().build()
    }
}

pub struct ConfigBuilder {
    scan_interval: Duration,
    session_margin: Duration,
    request_timeout: Duration,
    topology_refresh_interval: Option<Duration>,
    schedules: bool,
    heuristics: bool,
    high_precision: bool,
    location_index: usize,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            scan_interval: DEFAULT_SCAN_INTERVAL,
            session_margin: DEFAULT_SESSION_MARGIN,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            topology_refresh_interval: None,
            schedules: false,
            heuristics: false,
            high_precision: false,
            location_index: 0,
        }
    }
}

impl ConfigBuilder {
    pub fn scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn session_margin(mut self, margin: Duration) -> Self {
        self.session_margin = margin;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn topology_refresh_interval(mut self, interval: Duration) -> Self {
        self.topology_refresh_interval = Some(interval);
        self
    }

    pub fn schedules(mut self, enabled: bool) -> Self {
        self.schedules = enabled;
        self
    }

    pub fn heuristics(mut self, enabled: bool) -> Self {
        self.heuristics = enabled;
        self
    }

    pub fn high_precision(mut self, enabled: bool) -> Self {
        self.high_precision = enabled;
        self
    }

    pub fn location_index(mut self, index: usize) -> Self {
        self.location_index = index;
        self
    }

    pub fn build(self) -> Config {
        Config {
            scan_interval: round_up_to_minute(self.scan_interval).max(MIN_SCAN_INTERVAL),
            session_margin: self.session_margin,
            request_timeout: self.request_timeout,
            topology_refresh_interval: self.topology_refresh_interval,
            schedules: self.schedules,
            heuristics: self.heuristics,
            high_precision: self.high_precision,
            location_index: self.location_index,
        }
    }
}

fn round_up_to_minute(d: Duration) -> Duration {
    let secs = d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0));
    Duration::from_secs(secs.div_ceil(60).saturating_mul(60))
}
