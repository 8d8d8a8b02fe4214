use std::time::Duration;

/// Shared sender/receiver window and retransmission parameters.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub window_size: u32,
    pub timeout: Duration,
    pub max_fin_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            window_size: 100,
            timeout: Duration::from_secs(8),
            max_fin_retries: 5,
        }
    }
}

/// Fault-injection parameters for the intermediary relay.
#[derive(Debug, Clone, Copy)]
pub struct IntermediaryConfig {
    pub drop_prob: f64,
    pub delay_range: (Duration, Duration),
    pub corrupt_prob: f64,
}

impl Default for IntermediaryConfig {
    fn default() -> Self {
        IntermediaryConfig {
            drop_prob: 0.0,
            delay_range: (Duration::ZERO, Duration::ZERO),
            corrupt_prob: 0.0,
        }
    }
}

impl IntermediaryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.drop_prob) {
            return Err("drop probability must be between 0 and 1".into());
        }
        if !(0.0..=1.0).contains(&self.corrupt_prob) {
            return Err("corrupt probability must be between 0 and 1".into());
        }
        if self.delay_range.0 > self.delay_range.1 {
            return Err("delay range minimum must not exceed maximum".into());
        }
        Ok(())
    }
}
