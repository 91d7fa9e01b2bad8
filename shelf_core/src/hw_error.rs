//! Maps `Box<dyn Error>` from trait boundaries to typed `NodeError`.
//!
//! The traits in `shelf_traits` use `Box<dyn Error + Send + Sync>` for maximum
//! flexibility; this module converts those to our typed error enum, with an
//! optional feature-gated path for `shelf_hardware::HwError` downcasting.

use crate::error::NodeError;

/// Map a trait-boundary error to a typed `NodeError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> NodeError {
    // Feature-gated: try to downcast to HwError for precise mapping
    #[cfg(feature = "hardware-errors")]
    {
        use shelf_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout => NodeError::Timeout,
                HwError::Storage(msg) => NodeError::Storage(msg.clone()),
                HwError::Session(msg) => NodeError::BrokerConnect(msg.clone()),
                other => NodeError::HardwareFault(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        NodeError::Timeout
    } else {
        NodeError::Hardware(s)
    }
}
