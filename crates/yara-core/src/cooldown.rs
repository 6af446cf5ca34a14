//! Cooldown Gate
//!
//! "Has at least `cooldown` elapsed since `last_at`?" Every timed action in the
//! economy goes through this check. The boundary is inclusive: an action at
//! exactly `last_at + cooldown` is permitted.

use std::time::Duration;

use crate::error::{Result, YaraError};
use crate::types::Timestamp;

fn cooldown_secs(cooldown: Duration) -> i64 {
    i64::try_from(cooldown.as_secs()).unwrap_or(i64::MAX)
}

/// True if `last_at` is absent or `now - last_at >= cooldown`
pub fn is_ready(last_at: Option<Timestamp>, cooldown: Duration, now: Timestamp) -> bool {
    match last_at {
        None => true,
        Some(last) => now.saturating_sub(last) >= cooldown_secs(cooldown),
    }
}

/// Instant at which the gate opens, `None` if it has never been closed
pub fn ready_at(last_at: Option<Timestamp>, cooldown: Duration) -> Option<Timestamp> {
    last_at.map(|last| opens_at(last, cooldown))
}

/// When a gate last used at `last` opens again, saturating at `Timestamp::MAX`
pub fn opens_at(last: Timestamp, cooldown: Duration) -> Timestamp {
    last.saturating_add(cooldown_secs(cooldown))
}

/// Fail with [`YaraError::NotReady`] while the gate is closed
pub fn ensure_ready(last_at: Option<Timestamp>, cooldown: Duration, now: Timestamp) -> Result<()> {
    if is_ready(last_at, cooldown, now) {
        return Ok(());
    }
    Err(YaraError::NotReady {
        ready_at: ready_at(last_at, cooldown).unwrap_or(now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EIGHT_HOURS: Duration = Duration::from_secs(8 * 3_600);

    #[test]
    fn test_never_used_is_ready() {
        assert!(is_ready(None, EIGHT_HOURS, 0));
        assert_eq!(ready_at(None, EIGHT_HOURS), None);
    }

    #[test]
    fn test_boundary_is_inclusive() {
        assert!(!is_ready(Some(0), EIGHT_HOURS, 8 * 3_600 - 1));
        assert!(is_ready(Some(0), EIGHT_HOURS, 8 * 3_600));
    }

    #[test]
    fn test_clock_behind_last_use_is_not_ready() {
        assert!(!is_ready(Some(1_000), Duration::from_secs(60), 900));
    }

    #[test]
    fn test_ensure_ready_reports_opening_time() {
        let err = ensure_ready(Some(100), Duration::from_secs(60), 120).unwrap_err();
        assert_eq!(err, YaraError::NotReady { ready_at: 160 });
        assert!(ensure_ready(Some(100), Duration::from_secs(60), 160).is_ok());
    }

    #[test]
    fn test_huge_cooldown_saturates() {
        let forever = Duration::from_secs(u64::MAX);
        assert_eq!(opens_at(100, forever), Timestamp::MAX);
        assert!(!is_ready(Some(100), forever, Timestamp::MAX - 1));
    }

    proptest! {
        #[test]
        fn prop_ready_matches_elapsed(last in 0i64..1_000_000, elapsed in 0i64..100_000, secs in 0u64..100_000) {
            let ready = is_ready(Some(last), Duration::from_secs(secs), last + elapsed);
            prop_assert_eq!(ready, elapsed >= secs as i64);
        }
    }
}
