//! Platform services consumed by the engine.

use std::sync::OnceLock;
use std::time::Instant;

/// Host platform abstraction.
pub trait Platform: Send + Sync {
    /// Monotonic time in nanoseconds with the highest precision available.
    fn system_time_ns(&self) -> u64;

    /// [`Platform::system_time_ns`] in milliseconds
    #[allow(clippy::cast_precision_loss)]
    fn system_time_ms(&self) -> f64 {
        self.system_time_ns() as f64 / crate::constants::NS_PER_MS
    }
}

/// Steady clock measured from the first use in this process
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPlatform;

fn process_epoch() -> Instant {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    *EPOCH.get_or_init(Instant::now)
}

impl Platform for SystemPlatform {
    #[allow(clippy::cast_possible_truncation)]
    fn system_time_ns(&self) -> u64 {
        process_epoch().elapsed().as_nanos() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_time_is_monotonic() {
        let platform = SystemPlatform;
        let a = platform.system_time_ns();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = platform.system_time_ns();
        assert!(b > a);
        assert!(platform.system_time_ms() >= 2.0);
    }
}
