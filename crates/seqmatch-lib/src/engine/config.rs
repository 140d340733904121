//! Run configuration for the pair-discovery engine.

use crate::constants::{DEFAULT_HIT_CAPACITY, MAX_TAU};

/// How the edit-distance threshold is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TauMode {
    /// Derive tau from the median unpadded length after preprocessing:
    /// 8 when the median exceeds 160, otherwise `2 + median / 30`.
    Auto,
    /// Use a fixed threshold.
    Fixed(u32),
}

/// Configuration parameters for a pair-discovery run
#[derive(Debug, Clone)]
pub struct MatchConfiguration {
    /// Edit-distance threshold, fixed or derived from the input
    pub tau: TauMode,

    /// Worker budget: number of concurrent worker threads (and the fan-out
    /// budget of the preprocessing sort)
    pub threads: usize,

    /// Progress reporting
    pub verbose: bool,

    /// Capacity of each hit-tower level; a query with more neighbors at
    /// one distance than this is reported as an incomplete search
    pub hit_capacity: usize,
}

impl Default for MatchConfiguration {
    fn default() -> Self {
        Self {
            tau: TauMode::Auto,
            threads: 1,
            verbose: false,
            hit_capacity: DEFAULT_HIT_CAPACITY,
        }
    }
}

impl MatchConfiguration {
    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.threads == 0 {
            return Err("threads must be at least 1".to_string());
        }
        if let TauMode::Fixed(tau) = self.tau {
            if tau as usize > MAX_TAU {
                return Err(format!(
                    "tau must be at most {}, got tau={}",
                    MAX_TAU, tau
                ));
            }
        }
        if self.hit_capacity == 0 {
            return Err("hit_capacity must be at least 1".to_string());
        }
        Ok(())
    }

    /// Resolve the effective tau given the median unpadded length.
    pub fn resolve_tau(&self, median: usize) -> usize {
        match self.tau {
            TauMode::Fixed(tau) => tau as usize,
            TauMode::Auto => {
                if median > 160 {
                    8
                } else {
                    2 + median / 30
                }
            }
        }
    }

    /// Log configuration parameters via tracing
    pub fn print(&self) {
        tracing::info!("Match Configuration:");
        match self.tau {
            TauMode::Auto => tracing::info!("  tau = auto"),
            TauMode::Fixed(tau) => tracing::info!("  tau = {}", tau),
        }
        tracing::info!("  threads = {}", self.threads);
        tracing::debug!("  hit_capacity = {}", self.hit_capacity);
        tracing::debug!("  verbose = {}", self.verbose);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MatchConfiguration::default();
        assert_eq!(config.tau, TauMode::Auto);
        assert_eq!(config.threads, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_threads() {
        let config = MatchConfiguration {
            threads: 0,
            ..MatchConfiguration::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_tau_above_max() {
        let config = MatchConfiguration {
            tau: TauMode::Fixed(MAX_TAU as u32 + 1),
            ..MatchConfiguration::default()
        };
        assert!(config.validate().is_err());

        let config = MatchConfiguration {
            tau: TauMode::Fixed(MAX_TAU as u32),
            ..MatchConfiguration::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auto_tau_formula() {
        let config = MatchConfiguration::default();
        assert_eq!(config.resolve_tau(20), 2);
        assert_eq!(config.resolve_tau(30), 3);
        assert_eq!(config.resolve_tau(160), 7);
        assert_eq!(config.resolve_tau(161), 8);
    }

    #[test]
    fn test_fixed_tau_ignores_median() {
        let config = MatchConfiguration {
            tau: TauMode::Fixed(3),
            ..MatchConfiguration::default()
        };
        assert_eq!(config.resolve_tau(500), 3);
    }
}
