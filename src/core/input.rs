use crate::config::InputSettings;
use crate::error::Result;
use crate::neuron::{Neuron, NeuronLocation};
use crate::prng::Prng;

/// Sparse projection of the external input vector onto reservoir neurons.
///
/// Each channel is an input [`Neuron`]; its state (the clamped raw value) is
/// what gets projected.
#[derive(Debug, Clone, PartialEq)]
pub struct InputProjector {
    neurons: Vec<Neuron>,
    neurons_per_input: usize,
    bias: Vec<f64>,
    /// Per reservoir neuron: `(channel, weight)` of every input edge.
    incoming: Vec<Vec<(usize, f64)>>,
}

impl InputProjector {
    pub fn new(
        settings: &InputSettings,
        neuron_count: usize,
        ensemble_id: usize,
        group_id: usize,
        rng: &mut Prng,
    ) -> Result<Self> {
        settings.validate()?;
        let neurons_per_input = ((neuron_count as f64 * settings.density).round() as usize)
            .clamp(1, neuron_count.max(1));

        let mut incoming = vec![Vec::new(); neuron_count];
        for channel in 0..settings.input_count {
            let order = rng.permutation(neuron_count);
            for &target in order.iter().take(neurons_per_input) {
                let weight = settings.weights.sample(rng);
                incoming[target].push((channel, weight));
            }
        }
        let bias = (0..neuron_count)
            .map(|_| settings.bias.sample(rng))
            .collect();

        let neurons = (0..settings.input_count)
            .map(|c| {
                let location =
                    NeuronLocation::in_cube(ensemble_id, group_id, c, settings.input_count);
                Neuron::input(location, settings.value_range)
            })
            .collect();

        tracing::debug!(
            inputs = settings.input_count,
            neurons_per_input,
            "input projector wired"
        );

        Ok(Self {
            neurons,
            neurons_per_input,
            bias,
            incoming,
        })
    }

    pub fn input_count(&self) -> usize {
        self.neurons.len()
    }

    pub fn neurons_per_input(&self) -> usize {
        self.neurons_per_input
    }

    pub fn bias(&self, neuron: usize) -> f64 {
        self.bias[neuron]
    }

    pub fn incoming(&self, neuron: usize) -> &[(usize, f64)] {
        &self.incoming[neuron]
    }

    pub fn input_neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    /// Feeds a new input vector into the channel neurons.
    pub fn update(&mut self, values: &[f64], collect_statistics: bool) {
        debug_assert_eq!(values.len(), self.neurons.len(), "input vector length");
        for (neuron, &v) in self.neurons.iter_mut().zip(values) {
            neuron.snapshot();
            neuron.new_stimulation(v, 0.0);
            neuron.recompute(collect_statistics);
        }
    }

    /// `bias[i] + Σ weight · input` over neuron `i`'s input edges.
    #[inline]
    pub fn signal(&self, neuron: usize) -> f64 {
        let mut sum = self.bias[neuron];
        for &(channel, weight) in &self.incoming[neuron] {
            sum += weight * self.neurons[channel].state();
        }
        sum
    }

    pub fn reset(&mut self) {
        for n in &mut self.neurons {
            n.reset(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WeightRange;

    fn projector(settings: InputSettings, n: usize, seed: u64) -> InputProjector {
        let mut rng = Prng::new(seed);
        InputProjector::new(&settings, n, 0, 0, &mut rng).unwrap()
    }

    #[test]
    fn every_channel_reaches_its_share_of_neurons() {
        let settings = InputSettings {
            input_count: 3,
            density: 0.25,
            ..InputSettings::default()
        };
        let p = projector(settings, 40, 4);
        assert_eq!(p.neurons_per_input(), 10);
        for channel in 0..3 {
            let wired = (0..40)
                .filter(|&i| p.incoming(i).iter().any(|&(c, _)| c == channel))
                .count();
            assert_eq!(wired, 10);
        }
    }

    #[test]
    fn tiny_density_still_wires_one_neuron() {
        let settings = InputSettings {
            density: 0.001,
            ..InputSettings::default()
        };
        let p = projector(settings, 10, 4);
        assert_eq!(p.neurons_per_input(), 1);
    }

    #[test]
    fn signal_is_bias_plus_weighted_inputs() {
        let settings = InputSettings {
            input_count: 2,
            density: 1.0,
            weights: WeightRange::constant(0.5),
            bias: WeightRange::constant(0.1),
            ..InputSettings::default()
        };
        let mut p = projector(settings, 5, 8);
        p.update(&[0.4, -0.2], false);
        for i in 0..5 {
            assert!((p.signal(i) - (0.1 + 0.5 * 0.4 - 0.5 * 0.2)).abs() < 1e-12);
        }
    }

    #[test]
    fn out_of_range_inputs_are_clamped() {
        let settings = InputSettings {
            weights: WeightRange::constant(1.0),
            ..InputSettings::default()
        };
        let mut p = projector(settings, 3, 8);
        p.update(&[5.0], false);
        assert_eq!(p.input_neurons()[0].state(), 1.0);
        assert_eq!(p.signal(0), 1.0);
    }

    #[test]
    fn reset_restores_fresh_projector() {
        let fresh = projector(InputSettings::default(), 6, 12);
        let mut p = fresh.clone();
        p.update(&[0.7], true);
        p.reset();
        assert_eq!(p, fresh);
    }
}
