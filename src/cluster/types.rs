//! Peer-related types

use serde::Serialize;

/// Health of a peer as seen by this node's broadcaster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum PeerState {
    /// Deliveries are succeeding
    Healthy = 0,
    /// Recent deliveries failed, still targeted by broadcasts
    Suspect = 1,
    /// Excluded from broadcasts, only probed periodically
    Down = 2,
}

impl From<u8> for PeerState {
    fn from(value: u8) -> Self {
        match value {
            0 => PeerState::Healthy,
            1 => PeerState::Suspect,
            _ => PeerState::Down,
        }
    }
}

impl PeerState {
    /// Whether broadcasts target a peer in this state
    pub fn is_active(self) -> bool {
        self != PeerState::Down
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PeerState::Healthy => "healthy",
            PeerState::Suspect => "suspect",
            PeerState::Down => "down",
        }
    }
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a configured peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerNode {
    pub id: String,
    pub base_url: String,
    pub state: PeerState,
    pub consecutive_failures: u32,
    /// Last delivery or probe attempt (ms since epoch)
    pub last_attempt: Option<i64>,
    /// Last successful delivery or probe (ms since epoch)
    pub last_success: Option<i64>,
}

/// Failure counts at which a peer changes state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    /// HEALTHY -> SUSPECT
    pub suspect_threshold: u32,
    /// SUSPECT -> DOWN
    pub down_threshold: u32,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            suspect_threshold: 3,
            down_threshold: 10,
        }
    }
}

impl HealthThresholds {
    /// State implied by a consecutive failure count
    pub fn state_for(&self, consecutive_failures: u32) -> PeerState {
        if consecutive_failures >= self.down_threshold {
            PeerState::Down
        } else if consecutive_failures >= self.suspect_threshold {
            PeerState::Suspect
        } else {
            PeerState::Healthy
        }
    }
}

/// Get current time in milliseconds since epoch
pub fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_for_thresholds() {
        let thresholds = HealthThresholds::default();
        assert_eq!(thresholds.state_for(0), PeerState::Healthy);
        assert_eq!(thresholds.state_for(2), PeerState::Healthy);
        assert_eq!(thresholds.state_for(3), PeerState::Suspect);
        assert_eq!(thresholds.state_for(9), PeerState::Suspect);
        assert_eq!(thresholds.state_for(10), PeerState::Down);
    }

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [PeerState::Healthy, PeerState::Suspect, PeerState::Down] {
            assert_eq!(PeerState::from(state as u8), state);
        }
        assert!(PeerState::Suspect.is_active());
        assert!(!PeerState::Down.is_active());
    }

    #[test]
    fn test_state_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&PeerState::Suspect).unwrap(), "\"SUSPECT\"");
    }
}
