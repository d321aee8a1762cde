// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End to end tests of the verb pipeline against the simulated unit.

mod copy_tests;
mod media_tests;
mod pr_tests;
mod unit_tests;

use crate::config::TestConfig;
use crate::context::TestContext;
use crate::device::ScsiDevice;
use crate::test_helpers::init_tracing;
use crate::test_helpers::SimConfig;
use crate::test_helpers::SimTarget;
use crate::verbs;

const ENTROPY: u64 = 0x5c51_7e57;

struct Harness {
    sim: SimTarget,
    ctx: TestContext,
    sd: ScsiDevice,
}

impl Harness {
    /// Logs in as the first initiator and probes the unit.
    fn new(sim_config: SimConfig, config: TestConfig) -> Self {
        init_tracing();
        let sim = SimTarget::new(sim_config);
        let mut sd = sim.device(&config.initiator_name1);
        let mut ctx = TestContext::new(config, ENTROPY);
        verbs::probe(&mut ctx, &mut sd).unwrap();
        Self { sim, ctx, sd }
    }

    /// A second session, as the second initiator.
    fn second(&self) -> ScsiDevice {
        self.sim.device(&self.ctx.config.initiator_name2)
    }

    fn block_size(&self) -> usize {
        self.ctx.config.block_size as usize
    }

    /// `blocks` blocks filled with `byte`.
    fn fill(&self, blocks: usize, byte: u8) -> Vec<u8> {
        vec![byte; blocks * self.block_size()]
    }

    /// `blocks` blocks of a pattern that differs between blocks.
    fn pattern(&self, blocks: usize, seed: u8) -> Vec<u8> {
        let block_size = self.block_size();
        (0..blocks * block_size)
            .map(|i| {
                let block = (i / block_size) as u8;
                (i as u8).wrapping_mul(31).wrapping_add(seed ^ block)
            })
            .collect()
    }
}

fn destructive() -> TestConfig {
    TestConfig {
        data_loss: true,
        ..Default::default()
    }
}
