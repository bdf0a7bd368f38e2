//! Timeout classes derived from a ping baseline.

use std::time::Duration;

use crate::config::TimeoutConfig;

/// Kind of operation being bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallClass {
    /// A single RPC round-trip.
    Request,
    /// Acquiring a circuit, opening streams and transport handshakes.
    Handshake,
}

/// Timeouts for every call class, scaled from one ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub ping: Duration,
    pub request_multiplier: u32,
    pub handshake_multiplier: u32,
}

impl TimeoutPolicy {
    pub fn new(ping: Duration) -> Self {
        Self {
            ping,
            request_multiplier: 3,
            handshake_multiplier: 9,
        }
    }

    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn for_class(&self, class: CallClass) -> Duration {
        let multiplier = match class {
            CallClass::Request => self.request_multiplier,
            CallClass::Handshake => self.handshake_multiplier,
        };
        self.ping.checked_mul(multiplier).unwrap_or(Duration::MAX)
    }

    pub fn request(&self) -> Duration {
        self.for_class(CallClass::Request)
    }

    pub fn handshake(&self) -> Duration {
        self.for_class(CallClass::Handshake)
    }
}

impl From<&TimeoutConfig> for TimeoutPolicy {
    fn from(config: &TimeoutConfig) -> Self {
        Self {
            ping: config.ping(),
            request_multiplier: config.request_multiplier,
            handshake_multiplier: config.handshake_multiplier,
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from(&TimeoutConfig::default())
    }
}
