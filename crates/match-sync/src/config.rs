use crate::error::MatchError;
use std::time::Duration;

/// Configuration for the match engine and client sessions.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Period of the local display timer. Default: 100ms.
    pub tick_interval: Duration,
    /// Credit the time control's increment to the mover on each confirmed
    /// move. Default: false (increment is stored but not applied).
    pub credit_increment: bool,
    /// Let sessions end the match with a timeout when the side to move
    /// runs out of time. Default: true.
    pub flag_fall: bool,
}

impl MatchConfig {
    /// Validate configuration values.
    ///
    /// Checks:
    /// - `tick_interval > 0` (a zero-period interval panics in tokio)
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.tick_interval.is_zero() {
            return Err(MatchError::InvalidConfig {
                reason: "tick_interval must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            credit_increment: false,
            flag_fall: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = MatchConfig::default();
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert!(!config.credit_increment);
        assert!(config.flag_fall);
    }

    #[test]
    fn default_config_is_valid() {
        MatchConfig::default().validate().unwrap();
    }

    #[test]
    fn validate_zero_tick_interval() {
        let config = MatchConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("tick_interval"), "got: {msg}");
    }
}
