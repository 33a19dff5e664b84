//! Maps `Box<dyn Error>` from device trait boundaries to typed `PoolError`.
//!
//! The traits in `pool_traits` use `Box<dyn Error + Send + Sync>` so that any
//! driver can plug in; this module converts those to our typed error enum, with
//! an optional feature-gated path for `pool_hardware::HwError` downcasting.

use crate::error::PoolError;

/// Map a trait-boundary error to a typed `PoolError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> PoolError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<pool_hardware::error::HwError>() {
            return match hw {
                pool_hardware::error::HwError::Timeout => PoolError::Timeout,
                other => PoolError::HardwareFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        PoolError::Timeout
    } else {
        PoolError::Hardware(s)
    }
}

/// Log a failed actuator command. Device faults never reach the state machine.
pub(crate) fn log_device(device: &'static str, result: Result<(), pool_traits::DeviceError>) {
    if let Err(e) = result {
        let err = map_hw_error(e.as_ref());
        tracing::warn!(device, error = %err, "device command failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Plain(&'static str);

    impl std::fmt::Display for Plain {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for Plain {}

    #[test]
    fn timeout_string_maps_to_timeout() {
        assert!(matches!(map_hw_error(&Plain("serial Timeout")), PoolError::Timeout));
    }

    #[test]
    fn other_string_maps_to_hardware() {
        match map_hw_error(&Plain("bus fault")) {
            PoolError::Hardware(msg) => assert_eq!(msg, "bus fault"),
            other => panic!("expected Hardware, got {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn hw_error_is_downcast() {
        let e = pool_hardware::error::HwError::NoReading("tank");
        match map_hw_error(&e) {
            PoolError::HardwareFault(msg) => assert!(msg.contains("tank")),
            other => panic!("expected HardwareFault, got {other:?}"),
        }
        assert!(matches!(
            map_hw_error(&pool_hardware::error::HwError::Timeout),
            PoolError::Timeout
        ));
    }
}
