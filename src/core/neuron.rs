use std::collections::VecDeque;

use crate::activation::{Activation, ActivationFamily, AnalogFunction, Interval, SpikingActivation};
use crate::config::ActivationSettings;
use crate::error::{ConfigError, Result};
use crate::stats::NeuronStatistics;

/// Where a neuron sits. Informational only; dynamics never read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeuronLocation {
    pub ensemble_id: usize,
    pub index: usize,
    pub group_id: usize,
    pub coordinates: [i32; 3],
}

impl NeuronLocation {
    /// Places `index` on a cube just large enough for `neuron_count` neurons.
    pub fn in_cube(ensemble_id: usize, group_id: usize, index: usize, neuron_count: usize) -> Self {
        let mut side = 1usize;
        while side * side * side < neuron_count {
            side += 1;
        }
        let coordinates = [
            (index % side) as i32,
            ((index / side) % side) as i32,
            (index / (side * side)) as i32,
        ];
        Self {
            ensemble_id,
            index,
            group_id,
            coordinates,
        }
    }
}

/// Analog-only neuron parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogParams {
    /// Leaky-integration coefficient in [0, 1); 0 means no retainment.
    pub retainment: f64,
    pub firing_threshold: f64,
    /// 0 compares against the previous signal; otherwise the FIFO depth (>= 2).
    pub history_depth: usize,
}

impl Default for AnalogParams {
    fn default() -> Self {
        Self {
            retainment: 0.0,
            firing_threshold: ActivationSettings::DEFAULT_FIRING_THRESHOLD,
            history_depth: 0,
        }
    }
}

const NEUTRAL_REFERENCE: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
enum Dynamics {
    Input {
        value_range: Interval,
    },
    Analog {
        function: AnalogFunction,
        params: AnalogParams,
        history: VecDeque<f64>,
        last_signal: f64,
    },
    Spiking(SpikingActivation),
}

impl Dynamics {
    fn reset(&mut self) {
        match self {
            Dynamics::Input { .. } => {}
            Dynamics::Analog {
                function,
                history,
                last_signal,
                ..
            } => {
                history.clear();
                *last_signal = function.output_range().rescale_to_unit(0.0);
            }
            Dynamics::Spiking(s) => s.reset(),
        }
    }
}

/// One reservoir (or input) neuron.
///
/// Per cycle the owner calls [`Neuron::snapshot`] for every neuron first, then
/// [`Neuron::new_stimulation`] and [`Neuron::recompute`]. Peers only ever read
/// `previous_state`, which is not touched between the snapshot and the next one.
#[derive(Debug, Clone, PartialEq)]
pub struct Neuron {
    location: NeuronLocation,
    bias: f64,
    dynamics: Dynamics,

    state: f64,
    previous_state: f64,
    analog_signal: f64,
    spiking_signal: f64,

    spike_leak: u64,
    after_first_spike: bool,

    external_stimulus: f64,
    recurrent_stimulus: f64,
    total_stimulus: f64,

    stats: NeuronStatistics,
}

impl Neuron {
    /// An input neuron: passes its clamped stimulus through unchanged.
    pub fn input(location: NeuronLocation, value_range: Interval) -> Self {
        Self::with_dynamics(location, 0.0, Dynamics::Input { value_range })
    }

    /// A hidden neuron.
    ///
    /// `analog` must be `Some` exactly when `activation` is analog.
    pub fn hidden(
        location: NeuronLocation,
        bias: f64,
        activation: Activation,
        analog: Option<AnalogParams>,
    ) -> Result<Self> {
        let dynamics = match (activation, analog) {
            (Activation::Analog(function), Some(params)) => {
                let mut d = Dynamics::Analog {
                    function,
                    params,
                    history: VecDeque::with_capacity(params.history_depth),
                    last_signal: 0.0,
                };
                d.reset();
                d
            }
            (Activation::Spiking(s), None) => Dynamics::Spiking(s),
            (Activation::Spiking(_), Some(_)) => {
                return Err(ConfigError::ActivationMismatch {
                    expected: "analog",
                    found: "spiking",
                })
            }
            (Activation::Analog(_), None) => {
                return Err(ConfigError::ActivationMismatch {
                    expected: "spiking",
                    found: "analog",
                })
            }
        };
        Ok(Self::with_dynamics(location, bias, dynamics))
    }

    fn with_dynamics(location: NeuronLocation, bias: f64, dynamics: Dynamics) -> Self {
        Self {
            location,
            bias,
            dynamics,
            state: 0.0,
            previous_state: 0.0,
            analog_signal: 0.0,
            spiking_signal: 0.0,
            spike_leak: 0,
            after_first_spike: false,
            external_stimulus: 0.0,
            recurrent_stimulus: 0.0,
            total_stimulus: 0.0,
            stats: NeuronStatistics::default(),
        }
    }

    pub fn reset(&mut self, clear_statistics: bool) {
        self.dynamics.reset();
        self.state = 0.0;
        self.previous_state = 0.0;
        self.analog_signal = 0.0;
        self.spiking_signal = 0.0;
        self.spike_leak = 0;
        self.after_first_spike = false;
        self.external_stimulus = 0.0;
        self.recurrent_stimulus = 0.0;
        self.total_stimulus = 0.0;
        if clear_statistics {
            self.stats.reset();
        }
    }

    /// Copies the current state into the previous-state slot.
    #[inline]
    pub fn snapshot(&mut self) {
        self.previous_state = self.state;
    }

    #[inline]
    pub fn new_stimulation(&mut self, external: f64, recurrent: f64) {
        self.external_stimulus = external;
        self.recurrent_stimulus = recurrent;
        self.total_stimulus = (external + recurrent + self.bias).clamp(-1.0, 1.0);
    }

    pub fn recompute(&mut self, collect_statistics: bool) {
        let activation = match &mut self.dynamics {
            Dynamics::Input { value_range } => {
                self.state = value_range.clamp(self.external_stimulus);
                let signal = value_range.rescale_to_unit(self.external_stimulus);
                self.analog_signal = signal;
                self.spiking_signal = signal;
                self.state
            }
            Dynamics::Spiking(s) => {
                let spike = s.compute(self.total_stimulus);
                self.analog_signal = s.internal_range().rescale_to_unit(s.internal_state());
                self.spiking_signal = spike;
                self.state = spike;
                s.internal_state()
            }
            Dynamics::Analog {
                function,
                params,
                history,
                last_signal,
            } => {
                let raw = function.compute(self.total_stimulus);
                let r = params.retainment;
                self.state = r * self.state + (1.0 - r) * raw;
                let normalized = function.output_range().rescale_to_unit(self.state);

                let reference = if params.history_depth == 0 {
                    *last_signal
                } else {
                    let reference = if history.len() == params.history_depth {
                        history.pop_front().unwrap_or(NEUTRAL_REFERENCE)
                    } else {
                        NEUTRAL_REFERENCE
                    };
                    history.push_back(normalized);
                    reference
                };
                *last_signal = normalized;

                self.analog_signal = normalized;
                self.spiking_signal = if normalized - reference > params.firing_threshold {
                    1.0
                } else {
                    0.0
                };
                raw
            }
        };

        if self.spiking_signal >= 1.0 {
            self.spike_leak = 0;
            self.after_first_spike = true;
        } else {
            self.spike_leak = self.spike_leak.saturating_add(1);
        }

        if collect_statistics {
            self.stats.external_stimulus.push(self.external_stimulus);
            self.stats.recurrent_stimulus.push(self.recurrent_stimulus);
            self.stats.total_stimulus.push(self.total_stimulus);
            self.stats.activation.push(activation);
            self.stats.analog_signal.push(self.analog_signal);
            self.stats.spiking_signal.push(self.spiking_signal);
        }
    }

    pub fn location(&self) -> &NeuronLocation {
        &self.location
    }

    pub fn bias(&self) -> f64 {
        self.bias
    }

    pub fn is_input(&self) -> bool {
        matches!(self.dynamics, Dynamics::Input { .. })
    }

    /// Activation family of a hidden neuron; input neurons report analog.
    pub fn family(&self) -> ActivationFamily {
        match self.dynamics {
            Dynamics::Spiking(_) => ActivationFamily::Spiking,
            Dynamics::Input { .. } | Dynamics::Analog { .. } => ActivationFamily::Analog,
        }
    }

    #[inline]
    pub fn state(&self) -> f64 {
        self.state
    }

    #[inline]
    pub fn previous_state(&self) -> f64 {
        self.previous_state
    }

    #[inline]
    pub fn analog_signal(&self) -> f64 {
        self.analog_signal
    }

    #[inline]
    pub fn spiking_signal(&self) -> f64 {
        self.spiking_signal
    }

    #[inline]
    pub fn is_firing(&self) -> bool {
        self.spiking_signal >= 1.0
    }

    /// Cycles since the last spike.
    pub fn spike_leak(&self) -> u64 {
        self.spike_leak
    }

    pub fn after_first_spike(&self) -> bool {
        self.after_first_spike
    }

    pub fn total_stimulus(&self) -> f64 {
        self.total_stimulus
    }

    pub fn statistics(&self) -> &NeuronStatistics {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::SpikingModel;

    fn analog(function: AnalogFunction, params: AnalogParams) -> Neuron {
        Neuron::hidden(
            NeuronLocation::default(),
            0.0,
            Activation::Analog(function),
            Some(params),
        )
        .unwrap()
    }

    #[test]
    fn mismatched_parameters_are_rejected() {
        let spiking = Neuron::hidden(
            NeuronLocation::default(),
            0.0,
            Activation::spiking(SpikingModel::default()),
            Some(AnalogParams::default()),
        );
        assert!(matches!(
            spiking,
            Err(ConfigError::ActivationMismatch { .. })
        ));

        let analog = Neuron::hidden(
            NeuronLocation::default(),
            0.0,
            Activation::Analog(AnalogFunction::Tanh),
            None,
        );
        assert!(analog.is_err());
    }

    #[test]
    fn total_stimulus_is_clamped() {
        let mut n = Neuron::hidden(
            NeuronLocation::default(),
            0.5,
            Activation::Analog(AnalogFunction::Tanh),
            Some(AnalogParams::default()),
        )
        .unwrap();
        n.new_stimulation(0.9, 0.4);
        assert_eq!(n.total_stimulus(), 1.0);
        n.new_stimulation(-3.0, 0.0);
        assert_eq!(n.total_stimulus(), -1.0);
    }

    #[test]
    fn analog_without_retainment_follows_activation() {
        let mut n = analog(AnalogFunction::Logistic, AnalogParams::default());
        n.new_stimulation(0.3, 0.2);
        n.recompute(false);
        let expected = 1.0 / (1.0 + (-0.5f64).exp());
        assert_eq!(n.state(), expected);
        // Logistic output range is already [0, 1].
        assert_eq!(n.analog_signal(), expected);
    }

    #[test]
    fn retainment_blends_old_and_new_state() {
        let params = AnalogParams {
            retainment: 0.75,
            ..AnalogParams::default()
        };
        let mut n = analog(AnalogFunction::Identity, params);
        n.new_stimulation(0.8, 0.0);
        n.recompute(false);
        assert!((n.state() - 0.2).abs() < 1e-12);
        n.recompute(false);
        assert!((n.state() - (0.75 * 0.2 + 0.25 * 0.8)).abs() < 1e-12);
    }

    #[test]
    fn analog_fires_on_rising_signal() {
        let mut n = analog(AnalogFunction::Tanh, AnalogParams::default());
        n.new_stimulation(0.5, 0.0);
        n.recompute(false);
        assert!(n.is_firing());
        assert_eq!(n.spike_leak(), 0);
        assert!(n.after_first_spike());

        // Same stimulus: signal flat, no firing.
        n.recompute(false);
        assert!(!n.is_firing());
        assert_eq!(n.spike_leak(), 1);
    }

    #[test]
    fn history_queue_uses_neutral_reference_until_full() {
        let params = AnalogParams {
            retainment: 0.0,
            firing_threshold: 0.1,
            history_depth: 2,
        };
        let mut n = analog(AnalogFunction::Tanh, params);
        // Signal ~0.5: not above neutral 0.5 by the threshold.
        n.new_stimulation(0.0, 0.0);
        n.recompute(false);
        assert!(!n.is_firing());
        n.recompute(false);
        assert!(!n.is_firing());
        // Queue full now; reference is the signal from two cycles back (0.5).
        n.new_stimulation(1.0, 0.0);
        n.recompute(false);
        assert!(n.is_firing());
    }

    #[test]
    fn spiking_neuron_state_is_its_spike() {
        let mut n = Neuron::hidden(
            NeuronLocation::default(),
            0.0,
            Activation::spiking(SpikingModel::leaky_integrate_and_fire()),
            None,
        )
        .unwrap();
        assert_eq!(n.family(), ActivationFamily::Spiking);
        let mut spikes = 0;
        for _ in 0..40 {
            n.new_stimulation(1.0, 0.0);
            n.recompute(false);
            assert!(n.state() == 0.0 || n.state() == 1.0);
            assert!((0.0..=1.0).contains(&n.analog_signal()));
            if n.is_firing() {
                spikes += 1;
                assert_eq!(n.analog_signal(), 1.0);
            }
        }
        assert!(spikes > 0);
    }

    #[test]
    fn input_neuron_rescales_from_value_range() {
        let mut n = Neuron::input(NeuronLocation::default(), Interval::new(0.0, 10.0));
        n.new_stimulation(2.5, 0.0);
        n.recompute(false);
        assert_eq!(n.state(), 2.5);
        assert_eq!(n.spiking_signal(), 0.25);
        assert!(n.is_input());
    }

    #[test]
    fn statistics_collected_only_on_request() {
        let mut n = analog(AnalogFunction::Tanh, AnalogParams::default());
        n.new_stimulation(0.2, 0.1);
        n.recompute(false);
        assert!(n.statistics().total_stimulus.is_empty());
        n.recompute(true);
        assert_eq!(n.statistics().total_stimulus.count, 1);
        n.reset(false);
        assert_eq!(n.statistics().total_stimulus.count, 1);
        n.reset(true);
        assert!(n.statistics().total_stimulus.is_empty());
    }

    #[test]
    fn reset_matches_fresh_neuron() {
        let fresh = analog(
            AnalogFunction::Tanh,
            AnalogParams {
                retainment: 0.3,
                firing_threshold: 0.01,
                history_depth: 3,
            },
        );
        let mut n = fresh.clone();
        for i in 0..10 {
            n.snapshot();
            n.new_stimulation(i as f64 * 0.1, -0.05);
            n.recompute(true);
        }
        n.reset(true);
        assert_eq!(n, fresh);
    }

    #[test]
    fn cube_coordinates_cover_the_index() {
        let loc = NeuronLocation::in_cube(0, 0, 26, 27);
        assert_eq!(loc.coordinates, [2, 2, 2]);
        let loc = NeuronLocation::in_cube(0, 0, 4, 27);
        assert_eq!(loc.coordinates, [1, 1, 0]);
    }
}
