use std::fmt;

/// Rate-limit signal raised by the transport: the server told us to wait
/// before retrying the same call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimit {
    FloodWait { seconds: Option<u64> },
    SlowMode { seconds: Option<u64> },
    RetryAfter { seconds: Option<u64> },
}

impl RateLimit {
    /// Server-requested wait; an absent or zero value means one second.
    pub fn wait_seconds(&self) -> u64 {
        let seconds = match self {
            RateLimit::FloodWait { seconds }
            | RateLimit::SlowMode { seconds }
            | RateLimit::RetryAfter { seconds } => *seconds,
        };
        match seconds {
            Some(0) | None => 1,
            Some(s) => s,
        }
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, seconds) = match self {
            RateLimit::FloodWait { seconds } => ("FloodWait", seconds),
            RateLimit::SlowMode { seconds } => ("SlowMode", seconds),
            RateLimit::RetryAfter { seconds } => ("RetryAfter", seconds),
        };
        match seconds {
            Some(s) => write!(f, "{name} {s}s"),
            None => f.write_str(name),
        }
    }
}

/// Core error type.
///
/// The transport adapter maps its specific errors into this type so the
/// routing core can tell rate limiting apart from real failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("startup error: {0}")]
    Startup(String),

    #[error("cannot resolve {reference}: {reason}")]
    Resolution { reference: String, reason: String },

    #[error("rate limited: {0}")]
    RateLimited(RateLimit),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_zero_wait_defaults_to_one_second() {
        assert_eq!(RateLimit::FloodWait { seconds: None }.wait_seconds(), 1);
        assert_eq!(RateLimit::SlowMode { seconds: Some(0) }.wait_seconds(), 1);
        assert_eq!(RateLimit::RetryAfter { seconds: Some(30) }.wait_seconds(), 30);
    }

    #[test]
    fn rate_limit_display_names_the_signal() {
        let s = RateLimit::FloodWait { seconds: Some(7) }.to_string();
        assert_eq!(s, "FloodWait 7s");
        assert_eq!(RateLimit::RetryAfter { seconds: None }.to_string(), "RetryAfter");
    }
}
