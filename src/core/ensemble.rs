//! Several independent reservoirs driven by the same input.
//!
//! ```text
//! input ──┬──► reservoir[0] ──► out_0 ─┐
//!         ├──► reservoir[1] ──► out_1 ──┼──► concat
//!         └──► reservoir[2] ──► out_2 ─┘
//! ```
//!
//! Members share no mutable state, so they may run concurrently.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::config::ReservoirConfig;
use crate::error::{ConfigError, Result};
use crate::prng::Prng;
use crate::reservoir::{ExecutionTier, Reservoir};

#[derive(Debug, Clone)]
pub struct ReservoirEnsemble {
    members: Vec<Reservoir>,
    input_count: usize,
    tier: ExecutionTier,
}

impl ReservoirEnsemble {
    /// Builds one member per config. Member `i` gets `ensemble_id = i` and its
    /// own seed drawn from a generator seeded with `base_seed`.
    pub fn new(configs: Vec<ReservoirConfig>, base_seed: u64) -> Result<Self> {
        let Some(first) = configs.first() else {
            return Err(ConfigError::InvalidCount {
                field: "ensemble.members",
                value: 0,
                min: 1,
            });
        };
        let input_count = first.input.input_count;

        let mut seeds = Prng::new(base_seed);
        let mut members = Vec::with_capacity(configs.len());
        for (i, mut config) in configs.into_iter().enumerate() {
            if config.input.input_count != input_count {
                return Err(ConfigError::DimensionMismatch {
                    field: "input.input_count",
                    expected: input_count,
                    found: config.input.input_count,
                });
            }
            config.ensemble_id = i;
            members.push(Reservoir::with_seed(config, seeds.next_u64())?);
        }

        tracing::debug!(members = members.len(), input_count, "reservoir ensemble built");

        Ok(Self {
            members,
            input_count,
            tier: ExecutionTier::default(),
        })
    }

    pub fn members(&self) -> &[Reservoir] {
        &self.members
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_len(&self) -> usize {
        self.members.iter().map(Reservoir::output_len).sum()
    }

    pub fn predictor_len(&self) -> usize {
        self.members.iter().map(Reservoir::predictor_len).sum()
    }

    /// Tier used to run members against each other. Each member's own
    /// per-neuron tier is set on the member.
    pub fn set_execution_tier(&mut self, tier: ExecutionTier) {
        self.tier = tier;
    }

    pub fn effective_execution_tier(&self) -> ExecutionTier {
        self.tier.effective()
    }

    /// Runs one cycle on every member; `output` receives their outputs
    /// concatenated in member order.
    pub fn compute(&mut self, input: &[f64], output: &mut [f64], collect_statistics: bool) {
        debug_assert_eq!(output.len(), self.output_len(), "output buffer length");
        let mut slices = Vec::with_capacity(self.members.len());
        let mut rest = output;
        for m in &self.members {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(m.output_len());
            slices.push(head);
            rest = tail;
        }

        match self.effective_execution_tier() {
            ExecutionTier::Scalar => {
                for (m, out) in self.members.iter_mut().zip(slices) {
                    m.compute(input, out, collect_statistics);
                }
            }
            ExecutionTier::Parallel => self.compute_parallel(input, slices, collect_statistics),
        }
    }

    #[cfg(feature = "parallel")]
    fn compute_parallel(&mut self, input: &[f64], slices: Vec<&mut [f64]>, collect: bool) {
        self.members
            .par_iter_mut()
            .zip(slices.into_par_iter())
            .for_each(|(m, out)| m.compute(input, out, collect));
    }

    #[cfg(not(feature = "parallel"))]
    fn compute_parallel(&mut self, input: &[f64], slices: Vec<&mut [f64]>, collect: bool) {
        for (m, out) in self.members.iter_mut().zip(slices) {
            m.compute(input, out, collect);
        }
    }

    pub fn step(&mut self, input: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.output_len()];
        self.compute(input, &mut out, false);
        out
    }

    /// Every member's predictor features, concatenated in member order.
    pub fn predictors(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.predictor_len());
        for m in &self.members {
            out.extend(m.predictors());
        }
        out
    }

    pub fn set_feedback(&mut self, member: usize, values: &[f64]) {
        self.members[member].set_feedback(values);
    }

    pub fn reset(&mut self) {
        for m in &mut self.members {
            m.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InputSettings, TopologySettings};

    fn configs() -> Vec<ReservoirConfig> {
        vec![
            ReservoirConfig::with_size(10),
            ReservoirConfig::with_size(7).with_augmented_states(true),
            ReservoirConfig::with_size(5).with_topology(TopologySettings::Ring {
                bidirectional: true,
                self_density: 0.0,
                inter_density: 0.2,
            }),
        ]
    }

    #[test]
    fn output_is_concatenation_of_members() {
        let mut ens = ReservoirEnsemble::new(configs(), 42).unwrap();
        assert_eq!(ens.output_len(), 10 + 14 + 5);
        assert_eq!(ens.predictor_len(), (10 + 7 + 5) * 2);

        let mut seeds = Prng::new(42);
        let mut solo: Vec<Reservoir> = configs()
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.ensemble_id = i;
                Reservoir::with_seed(c, seeds.next_u64()).unwrap()
            })
            .collect();

        for t in 0..5 {
            let x = [(t as f64 * 0.4).sin()];
            let joined = ens.step(&x);
            let expected: Vec<f64> = solo.iter_mut().flat_map(|r| r.step(&x)).collect();
            assert_eq!(joined, expected);
        }
        assert_eq!(ens.predictors().len(), ens.predictor_len());
    }

    #[test]
    fn members_get_distinct_ids_and_seeds() {
        let ens = ReservoirEnsemble::new(
            vec![ReservoirConfig::with_size(20), ReservoirConfig::with_size(20)],
            1,
        )
        .unwrap();
        let a = &ens.members()[0];
        let b = &ens.members()[1];
        assert_eq!(a.neurons()[0].location().ensemble_id, 0);
        assert_eq!(b.neurons()[0].location().ensemble_id, 1);
        assert_ne!(a.connections(), b.connections());
    }

    #[test]
    fn mismatched_input_counts_rejected() {
        let two_inputs = ReservoirConfig::with_size(5).with_input(InputSettings {
            input_count: 2,
            ..InputSettings::default()
        });
        let err = ReservoirEnsemble::new(vec![ReservoirConfig::with_size(5), two_inputs], 1)
            .unwrap_err();
        assert!(matches!(err, ConfigError::DimensionMismatch { .. }));
        assert!(ReservoirEnsemble::new(Vec::new(), 1).is_err());
    }

    #[test]
    fn parallel_members_match_scalar_members() {
        let mut scalar = ReservoirEnsemble::new(configs(), 9).unwrap();
        let mut parallel = ReservoirEnsemble::new(configs(), 9).unwrap();
        parallel.set_execution_tier(ExecutionTier::Parallel);
        for t in 0..10 {
            let x = [(t as f64 * 0.25).cos()];
            assert_eq!(scalar.step(&x), parallel.step(&x));
        }
        scalar.reset();
        assert_eq!(scalar.members()[0].cycles(), 0);
    }
}
