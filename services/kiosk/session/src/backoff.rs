//! Exponential reconnect backoff with symmetric jitter.
//!
//! `delay = min(base * multiplier^attempt, max)`, then moved uniformly within
//! `delay ± delay * jitter` and clamped to zero. The functions here are pure;
//! randomness comes from the caller's RNG so results are reproducible with a
//! seeded generator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

use crate::config::BackoffConfig;

/// Jitter-free delay for `attempt` (0-based), capped at `config.max`
pub fn capped_delay(attempt: u32, config: &BackoffConfig) -> Duration {
    duration_from_ms(capped_delay_ms(attempt, config))
}

/// Saturates at `Duration::MAX` for delays a `Duration` cannot hold
fn duration_from_ms(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX)
}

fn capped_delay_ms(attempt: u32, config: &BackoffConfig) -> f64 {
    let base_ms = config.base.as_secs_f64() * 1000.0;
    let max_ms = config.max.as_secs_f64() * 1000.0;
    if base_ms <= 0.0 {
        return 0.0;
    }

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = base_ms * config.multiplier.powi(exponent);
    if raw.is_finite() {
        raw.min(max_ms)
    } else {
        max_ms
    }
}

/// Delay before retry `attempt` (0-based), jittered with `rng`
pub fn next_delay<R: Rng + ?Sized>(attempt: u32, config: &BackoffConfig, rng: &mut R) -> Duration {
    let cap = capped_delay_ms(attempt, config);
    let spread = cap * config.jitter;

    let jittered = if spread > 0.0 && spread.is_finite() {
        cap + rng.gen_range(-spread..=spread)
    } else {
        cap
    };

    let ms = if jittered.is_finite() { jittered.max(0.0) } else { 0.0 };
    duration_from_ms(ms)
}

/// Backoff calculator owning its random source
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    rng: StdRng,
}

impl Backoff {
    /// Create a calculator seeded from the OS
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a calculator with a fixed seed
    pub fn with_seed(config: BackoffConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Delay before retry `attempt` (0-based)
    pub fn next_delay(&mut self, attempt: u32) -> Duration {
        next_delay(attempt, &self.config, &mut self.rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_config() -> BackoffConfig {
        BackoffConfig {
            base: Duration::from_millis(1000),
            max: Duration::from_millis(30_000),
            multiplier: 1.5,
            jitter: 0.1,
        }
    }

    fn within_jitter(delay: Duration, attempt: u32, config: &BackoffConfig) -> bool {
        let cap = capped_delay_ms(attempt, config);
        let ms = delay.as_secs_f64() * 1000.0;
        // f64 -> Duration conversion rounds to whole nanoseconds
        let slack = 1e-5;
        ms >= cap * (1.0 - config.jitter) - slack && ms <= cap * (1.0 + config.jitter) + slack
    }

    #[test]
    fn test_attempt_five_example() {
        let config = example_config();
        assert!((capped_delay_ms(5, &config) - 7593.75).abs() < 1e-9);

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            let ms = next_delay(5, &config, &mut rng).as_secs_f64() * 1000.0;
            assert!(ms >= 6834.375 - 1e-5, "delay {} below range", ms);
            assert!(ms <= 8353.125 + 1e-5, "delay {} above range", ms);
        }
    }

    #[test]
    fn test_attempt_zero_is_base_plus_jitter() {
        let config = example_config();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..1000 {
            let delay = next_delay(0, &config, &mut rng);
            assert!(delay >= Duration::from_millis(900));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_delay_always_within_bounds() {
        let configs = [
            example_config(),
            BackoffConfig {
                base: Duration::from_millis(250),
                max: Duration::from_secs(10),
                multiplier: 2.0,
                jitter: 1.0,
            },
            BackoffConfig {
                base: Duration::from_millis(500),
                max: Duration::from_millis(500),
                multiplier: 1.0,
                jitter: 0.0,
            },
        ];

        for (seed, config) in configs.iter().enumerate() {
            let mut rng = StdRng::seed_from_u64(seed as u64);
            for attempt in 0..200 {
                let delay = next_delay(attempt, config, &mut rng);
                assert!(
                    within_jitter(delay, attempt, config),
                    "attempt {} delay {:?} outside jitter range",
                    attempt,
                    delay
                );
            }
        }
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = example_config();
        assert_eq!(capped_delay(20, &config), Duration::from_millis(30_000));
        assert_eq!(capped_delay(u32::MAX, &config), Duration::from_millis(30_000));

        let mut rng = StdRng::seed_from_u64(7);
        let delay = next_delay(u32::MAX, &config, &mut rng);
        assert!(delay <= Duration::from_millis(33_000));
        assert!(delay >= Duration::from_millis(27_000));
    }

    #[test]
    fn test_unbounded_max_saturates() {
        let config = BackoffConfig {
            base: Duration::from_secs(1),
            max: Duration::MAX,
            multiplier: 2.0,
            jitter: 1.0,
        };
        assert!(config.validate().is_ok());

        let mut backoff = Backoff::with_seed(config.clone(), 11);
        for attempt in (0..200).chain([u32::MAX]) {
            let delay = backoff.next_delay(attempt);
            assert!(delay <= Duration::MAX);
            assert!(capped_delay(attempt, &config) <= Duration::MAX);
        }
        assert_eq!(capped_delay(u32::MAX, &config), Duration::MAX);
    }

    #[test]
    fn test_zero_base_yields_zero() {
        let config = BackoffConfig {
            base: Duration::ZERO,
            ..example_config()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(next_delay(3, &config, &mut rng), Duration::ZERO);
    }

    #[test]
    fn test_seeded_backoff_is_deterministic() {
        let mut a = Backoff::with_seed(example_config(), 42);
        let mut b = Backoff::with_seed(example_config(), 42);
        for attempt in 0..10 {
            assert_eq!(a.next_delay(attempt), b.next_delay(attempt));
        }
    }
}
