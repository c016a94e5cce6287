use crate::config::FeedbackSettings;
use crate::error::Result;
use crate::prng::Prng;

/// Re-injects externally supplied prior outputs into the reservoir.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackInjector {
    values: Vec<f64>,
    wires_per_output: usize,
    /// Per reservoir neuron: `(output, weight)` of every feedback edge.
    incoming: Vec<Vec<(usize, f64)>>,
}

impl FeedbackInjector {
    pub fn new(settings: &FeedbackSettings, neuron_count: usize, rng: &mut Prng) -> Result<Self> {
        settings.validate()?;
        let wires_per_output =
            ((neuron_count as f64 * settings.density).round() as usize).min(neuron_count);

        let mut incoming = vec![Vec::new(); neuron_count];
        for output in 0..settings.output_count {
            let order = rng.permutation(neuron_count);
            for &target in order.iter().take(wires_per_output) {
                incoming[target].push((output, settings.weights.sample(rng)));
            }
        }

        tracing::debug!(
            outputs = settings.output_count,
            wires_per_output,
            "feedback injector wired"
        );

        Ok(Self {
            values: vec![0.0; settings.output_count],
            wires_per_output,
            incoming,
        })
    }

    pub fn output_count(&self) -> usize {
        self.values.len()
    }

    pub fn wires_per_output(&self) -> usize {
        self.wires_per_output
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn incoming(&self, neuron: usize) -> &[(usize, f64)] {
        &self.incoming[neuron]
    }

    /// Stores the prior outputs used by the next cycle.
    pub fn set_feedback(&mut self, values: &[f64]) {
        debug_assert_eq!(values.len(), self.values.len(), "feedback vector length");
        self.values.copy_from_slice(values);
    }

    #[inline]
    pub fn contribution(&self, neuron: usize) -> f64 {
        self.incoming[neuron]
            .iter()
            .map(|&(output, weight)| weight * self.values[output])
            .sum()
    }

    pub fn reset(&mut self) {
        self.values.fill(0.0);
    }
}
