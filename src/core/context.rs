use crate::activation::Activation;
use crate::config::{ContextActivation, ContextSettings};
use crate::error::Result;
use crate::neuron::{AnalogParams, Neuron, NeuronLocation};
use crate::prng::Prng;
use crate::stats::BasicStats;

/// A single auxiliary neuron that reads every hidden neuron and feeds its
/// state back into a sparse subset of them.
///
/// Neurons read the context state from the previous cycle, while the context
/// itself is updated from the states they just produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextUnit {
    neuron: Neuron,
    in_weights: Vec<f64>,
    /// Zero for neurons outside the feedback subset.
    out_weights: Vec<f64>,
    target_count: usize,
    state_stats: BasicStats,
}

impl ContextUnit {
    pub fn new(
        settings: &ContextSettings,
        neuron_count: usize,
        location: NeuronLocation,
        rng: &mut Prng,
    ) -> Result<Self> {
        settings.validate()?;
        let neuron = match settings.activation {
            ContextActivation::Analog(f) => Neuron::hidden(
                location,
                0.0,
                Activation::Analog(f),
                Some(AnalogParams::default()),
            )?,
            ContextActivation::Spiking(model) => {
                Neuron::hidden(location, 0.0, Activation::spiking(model), None)?
            }
        };

        let in_weights = (0..neuron_count)
            .map(|_| settings.in_weights.sample(rng))
            .collect();

        let target_count =
            ((neuron_count as f64 * settings.feedback_density).round() as usize).min(neuron_count);
        let mut out_weights = vec![0.0; neuron_count];
        let order = rng.permutation(neuron_count);
        for &target in order.iter().take(target_count) {
            out_weights[target] = settings.out_weights.sample(rng);
        }

        tracing::debug!(targets = target_count, "context unit wired");

        Ok(Self {
            neuron,
            in_weights,
            out_weights,
            target_count,
            state_stats: BasicStats::new(),
        })
    }

    pub fn neuron(&self) -> &Neuron {
        &self.neuron
    }

    pub fn state(&self) -> f64 {
        self.neuron.state()
    }

    pub fn target_count(&self) -> usize {
        self.target_count
    }

    /// Context state over every update since construction or reset.
    pub fn state_stats(&self) -> &BasicStats {
        &self.state_stats
    }

    pub fn in_weights(&self) -> &[f64] {
        &self.in_weights
    }

    pub fn out_weights(&self) -> &[f64] {
        &self.out_weights
    }

    /// Recurrent contribution to neuron `i` from the current context state.
    #[inline]
    pub fn contribution(&self, neuron: usize) -> f64 {
        self.out_weights[neuron] * self.neuron.state()
    }

    /// Recomputes from the current states of all hidden neurons.
    pub fn update(&mut self, neurons: &[Neuron], collect_statistics: bool) {
        debug_assert_eq!(neurons.len(), self.in_weights.len());
        let stimulus: f64 = neurons
            .iter()
            .zip(&self.in_weights)
            .map(|(n, w)| w * n.state())
            .sum();
        self.neuron.snapshot();
        self.neuron.new_stimulation(stimulus, 0.0);
        self.neuron.recompute(collect_statistics);
        self.state_stats.push(self.neuron.state());
    }

    pub fn reset(&mut self) {
        self.neuron.reset(true);
        self.state_stats.reset();
    }
}
