//! The reservoir: neurons, fixed wiring, and the synchronous update cycle.
//!
//! One [`Reservoir::compute`] call runs, in order:
//! 1. the input projector takes the new input vector
//! 2. every neuron snapshots its state into the previous-state slot
//! 3. every neuron is restimulated and recomputed (in parallel under
//!    [`ExecutionTier::Parallel`]), writing its analog signal to the output
//! 4. the context unit is updated from the post-update states
//! 5. every predictor engine is fed its neuron's signal and firing flag
//!
//! Step 3 reads only the snapshot taken in step 2 and writes only the
//! neuron's own slot, so the two tiers produce identical output.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::activation::Activation;
use crate::config::{ActivationSettings, ReservoirConfig};
use crate::context::ContextUnit;
use crate::error::Result;
use crate::feedback::FeedbackInjector;
use crate::input::InputProjector;
use crate::neuron::{AnalogParams, Neuron, NeuronLocation};
use crate::predictor::{PredictorEngine, PredictorPlan};
use crate::prng::Prng;
use crate::stats::{BasicStats, ReservoirStats};
use crate::topology::{self, Connections};

/// Execution tier for the per-neuron update.
///
/// - `Scalar`: single-threaded (default, works everywhere)
/// - `Parallel`: multi-threaded via rayon (requires `parallel` feature)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ExecutionTier {
    #[default]
    Scalar,
    Parallel,
}

impl ExecutionTier {
    /// The tier that will actually run, given the compiled features.
    pub fn effective(self) -> ExecutionTier {
        match self {
            ExecutionTier::Scalar => ExecutionTier::Scalar,
            ExecutionTier::Parallel => {
                #[cfg(feature = "parallel")]
                {
                    ExecutionTier::Parallel
                }
                #[cfg(not(feature = "parallel"))]
                {
                    ExecutionTier::Scalar
                }
            }
        }
    }
}

/// Read-only view shared by every neuron task within one cycle.
struct CycleInputs<'a> {
    connections: &'a Connections,
    input: &'a InputProjector,
    context: Option<&'a ContextUnit>,
    feedback: Option<&'a FeedbackInjector>,
    previous: &'a [f64],
}

impl CycleInputs<'_> {
    /// Restimulates and recomputes neuron `i`; returns its analog signal.
    #[inline]
    fn update(&self, i: usize, neuron: &mut Neuron, collect_statistics: bool) -> f64 {
        let mut recurrent = self.connections.weighted_sum(i, self.previous);
        if let Some(ctx) = self.context {
            recurrent += ctx.contribution(i);
        }
        if let Some(fb) = self.feedback {
            recurrent += fb.contribution(i);
        }
        neuron.new_stimulation(self.input.signal(i), recurrent);
        neuron.recompute(collect_statistics);
        neuron.analog_signal()
    }
}

#[derive(Debug, Clone)]
pub struct Reservoir {
    config: ReservoirConfig,
    neurons: Vec<Neuron>,
    engines: Vec<PredictorEngine>,
    predictors_per_neuron: usize,
    connections: Connections,
    input: InputProjector,
    context: Option<ContextUnit>,
    feedback: Option<FeedbackInjector>,
    /// Snapshot of every neuron's state taken at the start of a cycle.
    previous: Vec<f64>,
    cycles: u64,
    tier: ExecutionTier,
}

impl Reservoir {
    /// Builds the whole reservoir from `config`, drawing all randomness from
    /// `rng` in a fixed order: neuron biases, retainments, topology, input
    /// wiring, context unit, feedback wiring.
    pub fn new(config: ReservoirConfig, rng: &mut Prng) -> Result<Self> {
        config.validate()?;
        let n = config.neuron_count;
        let plan = PredictorPlan::new(config.predictors)?;

        let biases: Vec<f64> = (0..n).map(|_| config.neuron_bias.sample(rng)).collect();
        let mut neurons = Vec::with_capacity(n);
        for (i, &bias) in biases.iter().enumerate() {
            let location = NeuronLocation::in_cube(config.ensemble_id, config.group_id, i, n);
            let neuron = match config.activation {
                ActivationSettings::Analog {
                    function,
                    retainment_density,
                    retainment_min,
                    retainment_max,
                    firing_threshold,
                    history_depth,
                } => {
                    let retained = retainment_density > 0.0 && rng.next_f64() < retainment_density;
                    let retainment = if retained {
                        rng.gen_range_f64(retainment_min, retainment_max)
                    } else {
                        0.0
                    };
                    let params = AnalogParams {
                        retainment,
                        firing_threshold,
                        history_depth,
                    };
                    Neuron::hidden(location, bias, Activation::Analog(function), Some(params))?
                }
                ActivationSettings::Spiking { model } => {
                    Neuron::hidden(location, bias, Activation::spiking(model), None)?
                }
            };
            neurons.push(neuron);
        }

        let connections = topology::build(&config.topology, n, &config.internal_weights, rng)?;
        let input = InputProjector::new(&config.input, n, config.ensemble_id, config.group_id, rng)?;
        let context = match &config.context {
            Some(settings) => {
                let location = NeuronLocation::in_cube(config.ensemble_id, config.group_id, n, n + 1);
                Some(ContextUnit::new(settings, n, location, rng)?)
            }
            None => None,
        };
        let feedback = match &config.feedback {
            Some(settings) => Some(FeedbackInjector::new(settings, n, rng)?),
            None => None,
        };

        let engines = vec![PredictorEngine::new(&plan); n];

        tracing::debug!(
            neurons = n,
            connections = connections.len(),
            family = config.activation_family().name(),
            predictors_per_neuron = plan.count(),
            context = context.is_some(),
            feedback = feedback.is_some(),
            "reservoir built"
        );

        Ok(Self {
            predictors_per_neuron: plan.count(),
            config,
            neurons,
            engines,
            connections,
            input,
            context,
            feedback,
            previous: vec![0.0; n],
            cycles: 0,
            tier: ExecutionTier::default(),
        })
    }

    pub fn with_seed(config: ReservoirConfig, seed: u64) -> Result<Self> {
        let mut rng = Prng::new(seed);
        Self::new(config, &mut rng)
    }

    pub fn config(&self) -> &ReservoirConfig {
        &self.config
    }

    pub fn neuron_count(&self) -> usize {
        self.neurons.len()
    }

    /// Length of the buffer [`Reservoir::compute`] writes.
    pub fn output_len(&self) -> usize {
        self.config.output_len()
    }

    pub fn predictors_per_neuron(&self) -> usize {
        self.predictors_per_neuron
    }

    /// Length of the predictor feature vector.
    pub fn predictor_len(&self) -> usize {
        self.neurons.len() * self.predictors_per_neuron
    }

    pub fn connections(&self) -> &Connections {
        &self.connections
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    pub fn input_projector(&self) -> &InputProjector {
        &self.input
    }

    pub fn context(&self) -> Option<&ContextUnit> {
        self.context.as_ref()
    }

    pub fn feedback(&self) -> Option<&FeedbackInjector> {
        self.feedback.as_ref()
    }

    pub fn predictor_engines(&self) -> &[PredictorEngine] {
        &self.engines
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn set_execution_tier(&mut self, tier: ExecutionTier) {
        self.tier = tier;
    }

    pub fn execution_tier(&self) -> ExecutionTier {
        self.tier
    }

    /// Returns the tier that will actually be used, accounting for the
    /// `parallel` feature gate.
    pub fn effective_execution_tier(&self) -> ExecutionTier {
        self.tier.effective()
    }

    /// Sets the prior outputs injected on the next cycle. Ignored when the
    /// reservoir has no feedback injector.
    pub fn set_feedback(&mut self, values: &[f64]) {
        if let Some(fb) = &mut self.feedback {
            fb.set_feedback(values);
        }
    }

    /// Runs one cycle. `output` must be [`Reservoir::output_len`] long.
    pub fn compute(&mut self, input: &[f64], output: &mut [f64], collect_statistics: bool) {
        let n = self.neurons.len();
        debug_assert_eq!(output.len(), self.output_len(), "output buffer length");

        self.input.update(input, collect_statistics);

        for (neuron, prev) in self.neurons.iter_mut().zip(self.previous.iter_mut()) {
            neuron.snapshot();
            *prev = neuron.previous_state();
        }

        let (signals, squares) = output.split_at_mut(n);
        match self.effective_execution_tier() {
            ExecutionTier::Scalar => self.update_neurons_scalar(signals, collect_statistics),
            ExecutionTier::Parallel => self.update_neurons_parallel(signals, collect_statistics),
        }
        if self.config.augmented_states {
            for (sq, &s) in squares.iter_mut().zip(signals.iter()) {
                *sq = s * s;
            }
        }

        if let Some(ctx) = &mut self.context {
            ctx.update(&self.neurons, collect_statistics);
        }

        for (engine, neuron) in self.engines.iter_mut().zip(&self.neurons) {
            engine.update(neuron.analog_signal(), neuron.is_firing());
        }

        self.cycles += 1;
    }

    /// Allocating variant of [`Reservoir::compute`].
    pub fn step(&mut self, input: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.output_len()];
        self.compute(input, &mut out, false);
        out
    }

    fn update_neurons_scalar(&mut self, signals: &mut [f64], collect_statistics: bool) {
        let shared = CycleInputs {
            connections: &self.connections,
            input: &self.input,
            context: self.context.as_ref(),
            feedback: self.feedback.as_ref(),
            previous: &self.previous,
        };
        for (i, (neuron, slot)) in self.neurons.iter_mut().zip(signals.iter_mut()).enumerate() {
            *slot = shared.update(i, neuron, collect_statistics);
        }
    }

    /// Parallel per-neuron update using rayon.
    #[cfg(feature = "parallel")]
    fn update_neurons_parallel(&mut self, signals: &mut [f64], collect_statistics: bool) {
        let shared = CycleInputs {
            connections: &self.connections,
            input: &self.input,
            context: self.context.as_ref(),
            feedback: self.feedback.as_ref(),
            previous: &self.previous,
        };
        self.neurons
            .par_iter_mut()
            .zip(signals.par_iter_mut())
            .enumerate()
            .for_each(|(i, (neuron, slot))| {
                *slot = shared.update(i, neuron, collect_statistics);
            });
    }

    #[cfg(not(feature = "parallel"))]
    fn update_neurons_parallel(&mut self, signals: &mut [f64], collect_statistics: bool) {
        self.update_neurons_scalar(signals, collect_statistics);
    }

    /// Writes every neuron's enabled predictor features, neuron-major.
    pub fn copy_predictors(&self, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.predictor_len(), "predictor buffer length");
        if self.predictors_per_neuron == 0 {
            return;
        }
        for (chunk, engine) in out
            .chunks_exact_mut(self.predictors_per_neuron)
            .zip(&self.engines)
        {
            engine.copy_features(chunk);
        }
    }

    pub fn predictors(&self) -> Vec<f64> {
        let mut out = vec![0.0; self.predictor_len()];
        self.copy_predictors(&mut out);
        out
    }

    /// Restores every neuron, the context unit, every predictor engine and
    /// the feedback values to their just-constructed state. Wiring is kept.
    pub fn reset(&mut self) {
        for n in &mut self.neurons {
            n.reset(true);
        }
        for e in &mut self.engines {
            e.reset();
        }
        self.input.reset();
        if let Some(ctx) = &mut self.context {
            ctx.reset();
        }
        if let Some(fb) = &mut self.feedback {
            fb.reset();
        }
        self.previous.fill(0.0);
        self.cycles = 0;
    }

    pub fn stats(&self) -> ReservoirStats {
        let n = self.neurons.len();
        let firing = self.neurons.iter().filter(|x| x.is_firing()).count();
        ReservoirStats {
            cycles: self.cycles,
            connection_count: self.connections.len(),
            states: BasicStats::from_samples(self.neurons.iter().map(Neuron::state)),
            analog_signals: BasicStats::from_samples(self.neurons.iter().map(Neuron::analog_signal)),
            firing_rate: if n == 0 { 0.0 } else { firing as f64 / n as f64 },
            neurons: self.neurons.iter().map(|x| x.statistics().clone()).collect(),
            context_state_rms: self.context.as_ref().map(|c| c.state_stats().rms()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::{AnalogFunction, SpikingModel};
    use crate::config::{
        ContextSettings, FeedbackSettings, InputSettings, TopologySettings, WeightRange,
    };
    use crate::predictor::{
        FadingSumSettings, FiringWindowSettings, MovingAverageSettings, PredictorKind,
        PredictorSettings, WindowWeighting,
    };

    fn sine(cycle: usize) -> f64 {
        (cycle as f64 * 0.3).sin()
    }

    fn rich_config() -> ReservoirConfig {
        ReservoirConfig::with_size(40)
            .with_topology(TopologySettings::Ring {
                bidirectional: true,
                self_density: 0.2,
                inter_density: 0.05,
            })
            .with_activation(ActivationSettings::Analog {
                function: AnalogFunction::Tanh,
                retainment_density: 0.5,
                retainment_min: 0.1,
                retainment_max: 0.6,
                firing_threshold: 0.01,
                history_depth: 3,
            })
            .with_neuron_bias(WeightRange::symmetric(0.1))
            .with_context(ContextSettings::default())
            .with_feedback(FeedbackSettings {
                output_count: 2,
                density: 0.3,
                weights: WeightRange::symmetric(0.5),
            })
            .with_augmented_states(true)
            .with_predictors(PredictorSettings {
                activation_moving_avg: Some(MovingAverageSettings {
                    window: 5,
                    leakage: 1,
                    weighting: WindowWeighting::Exponential,
                }),
                firing_count: Some(FiringWindowSettings { window: 8 }),
                ..PredictorSettings::all()
            })
    }

    fn run(r: &mut Reservoir, cycles: usize) -> Vec<Vec<f64>> {
        (0..cycles)
            .map(|t| {
                r.set_feedback(&[sine(t + 1), -sine(t)]);
                let mut out = vec![0.0; r.output_len()];
                r.compute(&[sine(t)], &mut out, true);
                let mut row = out;
                row.extend(r.predictors());
                row
            })
            .collect()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = ReservoirConfig::with_size(0);
        assert!(Reservoir::with_seed(cfg, 1).is_err());
    }

    #[test]
    fn bias_only_reservoir_sits_at_a_fixed_point() {
        let cfg = ReservoirConfig::with_size(10)
            .with_internal_weights(WeightRange::ZERO)
            .with_neuron_bias(WeightRange::constant(0.3))
            .with_input(InputSettings {
                weights: WeightRange::ZERO,
                ..InputSettings::default()
            });
        let mut r = Reservoir::with_seed(cfg, 5).unwrap();
        let expected = AnalogFunction::Tanh.compute(0.3);
        for _ in 0..5 {
            r.step(&[0.0]);
            for n in r.neurons() {
                assert_eq!(n.state(), expected);
            }
        }
    }

    #[test]
    fn four_neuron_scenario_zero_internal_weights() {
        let cfg = ReservoirConfig::with_size(4)
            .with_topology(TopologySettings::Random { density: 1.0 })
            .with_activation(ActivationSettings::analog(AnalogFunction::Logistic))
            .with_internal_weights(WeightRange::ZERO)
            .with_input(InputSettings {
                weights: WeightRange::constant(1.0),
                ..InputSettings::default()
            });
        let mut r = Reservoir::with_seed(cfg, 17).unwrap();
        let f = |x: f64| AnalogFunction::Logistic.compute(x);

        let first = r.step(&[1.0]);
        assert!(first.iter().all(|&s| s == f(1.0)), "{first:?}");
        let second = r.step(&[1.0]);
        assert!(second.iter().all(|&s| s == f(1.0)), "{second:?}");
    }

    #[test]
    fn four_neuron_scenario_seeded_internal_weights() {
        let cfg = ReservoirConfig::with_size(4)
            .with_topology(TopologySettings::Random { density: 1.0 })
            .with_activation(ActivationSettings::analog(AnalogFunction::Logistic))
            .with_internal_weights(WeightRange::symmetric(0.4))
            .with_input(InputSettings {
                weights: WeightRange::constant(1.0),
                ..InputSettings::default()
            });
        let mut r = Reservoir::with_seed(cfg, 17).unwrap();
        let f = |x: f64| AnalogFunction::Logistic.compute(x);

        let first = r.step(&[1.0]);
        assert!(first.iter().all(|&s| s == f(1.0)));

        let second = r.step(&[1.0]);
        for (i, &s) in second.iter().enumerate() {
            let recurrent: f64 = r.connections().incoming(i).map(|(_, w)| w * f(1.0)).sum();
            let expected = f((recurrent + 1.0).clamp(-1.0, 1.0));
            assert!((s - expected).abs() < 1e-12, "neuron {i}: {s} vs {expected}");
        }
    }

    #[test]
    fn augmented_half_is_the_square_of_the_first() {
        let mut r = Reservoir::with_seed(rich_config(), 3).unwrap();
        let n = r.neuron_count();
        assert_eq!(r.output_len(), 2 * n);
        for t in 0..20 {
            let out = r.step(&[sine(t)]);
            for i in 0..n {
                assert_eq!(out[n + i], out[i] * out[i]);
            }
        }
    }

    #[test]
    fn reset_matches_fresh_construction() {
        let mut fresh = Reservoir::with_seed(rich_config(), 99).unwrap();
        let expected = run(&mut fresh, 30);

        let mut reused = Reservoir::with_seed(rich_config(), 99).unwrap();
        run(&mut reused, 17);
        reused.reset();
        assert_eq!(reused.cycles(), 0);
        assert_eq!(run(&mut reused, 30), expected);
    }

    #[test]
    fn same_seed_same_outputs() {
        let mut a = Reservoir::with_seed(rich_config(), 8).unwrap();
        let mut b = Reservoir::with_seed(rich_config(), 8).unwrap();
        assert_eq!(run(&mut a, 10), run(&mut b, 10));
    }

    #[test]
    fn scalar_and_parallel_tiers_agree() {
        let mut scalar = Reservoir::with_seed(rich_config(), 4).unwrap();
        let mut parallel = Reservoir::with_seed(rich_config(), 4).unwrap();
        parallel.set_execution_tier(ExecutionTier::Parallel);
        #[cfg(feature = "parallel")]
        assert_eq!(parallel.effective_execution_tier(), ExecutionTier::Parallel);
        #[cfg(not(feature = "parallel"))]
        assert_eq!(parallel.effective_execution_tier(), ExecutionTier::Scalar);
        assert_eq!(run(&mut scalar, 25), run(&mut parallel, 25));
    }

    #[test]
    fn activation_predictor_echoes_the_signal() {
        let cfg = ReservoirConfig::with_size(12).with_predictors(PredictorSettings {
            activation_fading_sum: Some(FadingSumSettings { strength: 0.2 }),
            firing_count: Some(FiringWindowSettings { window: 4 }),
            ..PredictorSettings::default()
        });
        let mut r = Reservoir::with_seed(cfg, 6).unwrap();
        let per = r.predictors_per_neuron();
        assert_eq!(per, 4);
        assert_eq!(r.predictor_len(), 12 * per);
        for t in 0..10 {
            let out = r.step(&[sine(t)]);
            let p = r.predictors();
            for i in 0..12 {
                let engine = &r.predictor_engines()[i];
                assert_eq!(p[i * per], out[i]);
                assert_eq!(engine.value(PredictorKind::Activation), out[i]);
                assert_eq!(engine.value(PredictorKind::ActivationSquare), out[i] * out[i]);
                let count = engine.firing_count() as usize;
                assert!(count <= 4.min(t + 1));
                assert_eq!(count as u32, (engine.firing_bits() & 0xF).count_ones());
            }
        }
    }

    #[test]
    fn spiking_reservoir_emits_unit_signals() {
        let cfg = ReservoirConfig::with_size(30)
            .with_activation(ActivationSettings::spiking(SpikingModel::izhikevich()))
            .with_internal_weights(WeightRange::symmetric(1.0))
            .with_neuron_bias(WeightRange::constant(0.5));
        let mut r = Reservoir::with_seed(cfg, 2).unwrap();
        let mut fired = 0usize;
        for t in 0..100 {
            let out = r.step(&[sine(t)]);
            assert!(out.iter().all(|s| (0.0..=1.0).contains(s)));
            fired += r.neurons().iter().filter(|n| n.is_firing()).count();
            for n in r.neurons() {
                assert!(n.state() == 0.0 || n.state() == 1.0);
            }
        }
        assert!(fired > 0);
    }

    #[test]
    fn context_reads_previous_cycle_state() {
        let cfg = ReservoirConfig::with_size(6)
            .with_internal_weights(WeightRange::ZERO)
            .with_input(InputSettings {
                weights: WeightRange::constant(1.0),
                ..InputSettings::default()
            })
            .with_context(ContextSettings {
                in_weights: WeightRange::constant(0.5),
                out_weights: WeightRange::constant(1.0),
                feedback_density: 1.0,
                ..ContextSettings::default()
            });
        let mut r = Reservoir::with_seed(cfg, 1).unwrap();
        let tanh = |x: f64| x.tanh();

        // Cycle 1: context still at 0, neurons see only the input.
        let first = r.step(&[0.2]);
        let s1 = tanh(0.2);
        assert!(first.iter().all(|&s| (s - (s1 + 1.0) / 2.0).abs() < 1e-12));
        let ctx = tanh(6.0 * 0.5 * s1);
        assert!((r.context().unwrap().state() - ctx).abs() < 1e-12);

        // Cycle 2: neurons see the context state produced in cycle 1.
        r.step(&[0.2]);
        let s2 = tanh((0.2 + ctx).clamp(-1.0, 1.0));
        for n in r.neurons() {
            assert!((n.state() - s2).abs() < 1e-12);
        }
    }

    #[test]
    fn stats_report_context_sentinel() {
        let mut plain = Reservoir::with_seed(ReservoirConfig::with_size(8), 1).unwrap();
        plain.step(&[0.5]);
        let s = plain.stats();
        assert_eq!(s.cycles, 1);
        assert_eq!(s.neurons.len(), 8);
        assert!(s.context_state_rms.is_none());

        let mut with_ctx = Reservoir::with_seed(rich_config(), 1).unwrap();
        let mut out = vec![0.0; with_ctx.output_len()];
        with_ctx.set_feedback(&[0.0, 0.0]);
        with_ctx.compute(&[0.5], &mut out, true);
        let s = with_ctx.stats();
        assert!(s.context_state_rms.is_some());
        assert_eq!(s.neurons[0].total_stimulus.count, 1);
        assert!(s.states.min <= s.states.max);
    }
}
