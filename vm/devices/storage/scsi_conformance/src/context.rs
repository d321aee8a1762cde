// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per-run test state.

use crate::config::TestConfig;
use crate::gate::Guard;
use crate::outcome::Verdict;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Generates reservation keys. Keys are unique only within one run.
#[derive(Debug, Clone)]
pub struct KeyGenerator(StdRng);

impl KeyGenerator {
    pub fn from_seed(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    /// Seeds from the wall clock and process id.
    pub fn from_environment() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let seed = u64::from(std::process::id()) ^ now.as_secs() ^ u64::from(now.subsec_micros());
        Self::from_seed(seed)
    }

    /// Returns a nonzero key. Zero means "no key" on the wire.
    pub fn next_key(&mut self) -> u64 {
        loop {
            let key = self.0.gen::<u64>();
            if key != 0 {
                break key;
            }
        }
    }
}

/// Carries the run's configuration and key generator through every
/// operation.
#[derive(Debug, Clone)]
pub struct TestContext {
    pub config: TestConfig,
    keys: KeyGenerator,
}

impl TestContext {
    pub fn new(config: TestConfig, entropy: u64) -> Self {
        Self {
            config,
            keys: KeyGenerator::from_seed(entropy),
        }
    }

    pub fn from_environment(config: TestConfig) -> Self {
        Self {
            config,
            keys: KeyGenerator::from_environment(),
        }
    }

    pub fn random_key(&mut self) -> u64 {
        self.keys.next_key()
    }

    /// Runs the skip gate for `guards` against this run's configuration.
    pub fn require(&self, guards: &[Guard]) -> Verdict {
        crate::gate::require(&self.config, guards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_keys_repeat() {
        let mut a = TestContext::new(TestConfig::default(), 42);
        let mut b = TestContext::new(TestConfig::default(), 42);
        let ka: Vec<_> = (0..8).map(|_| a.random_key()).collect();
        let kb: Vec<_> = (0..8).map(|_| b.random_key()).collect();
        assert_eq!(ka, kb);
        assert!(ka.iter().all(|&k| k != 0));
    }

    #[test]
    fn keys_differ_within_run() {
        let mut keys = KeyGenerator::from_seed(7);
        let first = keys.next_key();
        assert_ne!(first, keys.next_key());
    }
}
