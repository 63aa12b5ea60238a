use std::fmt;

use crate::types::ZoneId;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Io(std::io::Error),
    /// Credentials rejected or session could not be established. Fatal.
    Authentication(String),
    /// Remote service unreachable or temporarily failing; retried on the next tick.
    TransientFetch(String),
    /// Remote data did not have the expected shape; the previous snapshot is kept.
    MalformedResponse(String),
    ZoneNotFound(ZoneId),
    ScheduleNotFound(ZoneId),
    DhwNotFound,
    InstallationNotFound(usize),
    /// The secondary high-precision temperature source failed.
    PrecisionUnavailable(String),
    InvalidSetpoint {
        zone_id: ZoneId,
        value: f64,
        min: f64,
        max: f64,
    },
    InvalidMode(String),
    /// No refresh has succeeded yet, so there is nothing to read or mutate.
    NoSnapshot,
    Timeout,
}

impl Error {
    /// Failures that should simply be retried on the next tick.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::TransientFetch(_) | Error::Timeout => true,
            Error::Http(e) => match e.status() {
                Some(status) => status.is_server_error() || status.as_u16() == 429,
                None => true,
            },
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Authentication(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Authentication(msg) => write!(f, "authentication failed: {msg}"),
            Error::TransientFetch(msg) => write!(f, "transient fetch failure: {msg}"),
            Error::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
            Error::ZoneNotFound(id) => write!(f, "zone not found: {id}"),
            Error::ScheduleNotFound(id) => write!(f, "no schedule loaded for zone {id}"),
            Error::DhwNotFound => write!(f, "installation has no hot water unit"),
            Error::InstallationNotFound(idx) => write!(f, "no installation at index {idx}"),
            Error::PrecisionUnavailable(msg) => {
                write!(f, "high-precision temperatures unavailable: {msg}")
            }
            Error::InvalidSetpoint {
                zone_id,
                value,
                min,
                max,
            } => write!(
                f,
                "setpoint {value} out of range for zone {zone_id} ({min}..={max})"
            ),
            Error::InvalidMode(mode) => write!(f, "invalid mode: {mode}"),
            Error::NoSnapshot => write!(f, "no state fetched yet"),
            Error::Timeout => write!(f, "remote call timed out"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(Error::Timeout.is_transient());
        assert!(Error::TransientFetch("503".into()).is_transient());
        assert!(!Error::MalformedResponse("x".into()).is_transient());
        assert!(Error::Authentication("bad password".into()).is_fatal());
        assert!(!Error::Timeout.is_fatal());
    }

    #[test]
    fn display_names_zone() {
        let err = Error::ScheduleNotFound(ZoneId::new("3432521"));
        assert_eq!(err.to_string(), "no schedule loaded for zone 3432521");
    }
}
