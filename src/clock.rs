// Shasplit backup engine.

//! The per-invocation clock source.
//!
//! The core engine never calls into the system clock directly: ingest takes
//! a timestamp as a plain string argument (see [crate::ingest::ingest]) so
//! that tests can pin it and so a crash between "capture timestamp" and
//! "commit instance" is never attributed to the wrong moment. [Clock] is the
//! seam a caller plugs a real or fixed time source into, the same way
//! [crate::lvm::Snapshotter] extracts the LVM subprocess glue: a narrow
//! trait, a real implementation, and a fake for tests.

use time::macros::format_description;
use time::OffsetDateTime;

/// Supplies the timestamp a new instance is keyed by.
pub trait Clock {
    /// Capture "now" as `YYYY-MM-DDThh:mm:ss` in local time, second
    /// granularity, matching the format [crate::validate::validate_timestamp]
    /// accepts.
    fn now_timestamp(&self) -> String;
}

/// Reads the real system clock, in the local timezone when available.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_timestamp(&self) -> String {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        format_timestamp(now)
    }
}

fn format_timestamp(t: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    t.format(&format)
        .expect("a calendar date always formats to YYYY-MM-DDThh:mm:ss")
}

/// A fixed timestamp, for deterministic tests.
#[derive(Debug, Clone)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now_timestamp(&self) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate_timestamp;

    #[test]
    fn system_clock_produces_valid_timestamp() {
        let ts = SystemClock.now_timestamp();
        validate_timestamp(&ts).unwrap();
    }

    #[test]
    fn fixed_clock_returns_its_value() {
        let clock = FixedClock("2021-01-02T03:04:05".to_string());
        assert_eq!(clock.now_timestamp(), "2021-01-02T03:04:05");
    }
}
