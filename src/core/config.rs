#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::activation::{ActivationFamily, AnalogFunction, Interval, SpikingModel};
use crate::error::{check_below_one, check_density, check_range, ConfigError, Result};
use crate::predictor::PredictorSettings;
use crate::prng::Prng;

/// Uniform weight distribution over `[min, max)`.
///
/// `min == max` yields that constant (the generator is still advanced, so the
/// draw order does not depend on the weights chosen).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeightRange {
    pub min: f64,
    pub max: f64,
}

impl WeightRange {
    pub const ZERO: WeightRange = WeightRange { min: 0.0, max: 0.0 };

    /// Uniform in `(-scale, +scale)`.
    pub fn symmetric(scale: f64) -> Self {
        Self {
            min: -scale,
            max: scale,
        }
    }

    pub fn constant(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    #[inline]
    pub fn sample(&self, rng: &mut Prng) -> f64 {
        rng.gen_range_f64(self.min, self.max)
    }

    pub fn validate(&self, field: &'static str) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ConfigError::OutOfRange {
                field,
                value: if self.min.is_finite() { self.max } else { self.min },
                expected: "finite bounds",
            });
        }
        if self.min > self.max {
            return Err(ConfigError::OutOfRange {
                field,
                value: self.min,
                expected: "min <= max",
            });
        }
        Ok(())
    }
}

/// Internal connectivity family.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TopologySettings {
    /// `round(N² · density)` random directed edges.
    Random { density: f64 },
    /// Base cycle plus optional self-connections and random inter-connections.
    Ring {
        bidirectional: bool,
        self_density: f64,
        inter_density: f64,
    },
    /// Horizontal ring, vertical twist of stride `floor(sqrt(N))`, optional
    /// self-connections.
    DoublyTwistedToroidal { self_density: f64 },
}

impl Default for TopologySettings {
    fn default() -> Self {
        TopologySettings::Random { density: 0.1 }
    }
}

impl TopologySettings {
    pub fn validate(&self) -> Result<()> {
        match *self {
            TopologySettings::Random { density } => check_density("topology.density", density),
            TopologySettings::Ring {
                self_density,
                inter_density,
                ..
            } => {
                check_density("topology.self_density", self_density)?;
                check_density("topology.inter_density", inter_density)
            }
            TopologySettings::DoublyTwistedToroidal { self_density } => {
                check_density("topology.self_density", self_density)
            }
        }
    }
}

/// Hidden neuron activation family and its family-specific parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActivationSettings {
    Analog {
        function: AnalogFunction,
        /// Fraction of neurons that get a nonzero retainment.
        retainment_density: f64,
        retainment_min: f64,
        retainment_max: f64,
        /// Rise of the normalized signal over its reference that counts as firing.
        firing_threshold: f64,
        /// 0 compares against the previous signal; >= 2 uses a FIFO of that depth.
        history_depth: usize,
    },
    Spiking {
        model: SpikingModel,
    },
}

impl Default for ActivationSettings {
    fn default() -> Self {
        ActivationSettings::analog(AnalogFunction::Tanh)
    }
}

impl ActivationSettings {
    pub const DEFAULT_FIRING_THRESHOLD: f64 = 0.00125;

    /// Analog activation without retainment.
    pub fn analog(function: AnalogFunction) -> Self {
        ActivationSettings::Analog {
            function,
            retainment_density: 0.0,
            retainment_min: 0.0,
            retainment_max: 0.0,
            firing_threshold: Self::DEFAULT_FIRING_THRESHOLD,
            history_depth: 0,
        }
    }

    pub fn spiking(model: SpikingModel) -> Self {
        ActivationSettings::Spiking { model }
    }

    pub fn validate(&self, prefix: &'static str) -> Result<()> {
        match *self {
            ActivationSettings::Analog {
                retainment_density,
                retainment_min,
                retainment_max,
                firing_threshold,
                history_depth,
                ..
            } => {
                check_density(prefix, retainment_density)?;
                check_below_one(prefix, retainment_min, 0.0, "[0, 1)")?;
                check_below_one(prefix, retainment_max, retainment_min, "[min, 1)")?;
                check_range(prefix, firing_threshold, 0.0, 1.0, "[0, 1]")?;
                if history_depth == 1 {
                    return Err(ConfigError::InvalidCount {
                        field: prefix,
                        value: history_depth,
                        min: 2,
                    });
                }
                Ok(())
            }
            ActivationSettings::Spiking { model } => {
                let range = model.internal_range();
                if !(range.span() > 0.0) {
                    return Err(ConfigError::OutOfRange {
                        field: prefix,
                        value: range.span(),
                        expected: "threshold above reset/resting potential",
                    });
                }
                Ok(())
            }
        }
    }
}

/// External input wiring.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InputSettings {
    pub input_count: usize,
    /// Fraction of reservoir neurons each input channel is wired to.
    pub density: f64,
    pub weights: WeightRange,
    pub bias: WeightRange,
    /// Declared range of raw input values.
    pub value_range: Interval,
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            input_count: 1,
            density: 1.0,
            weights: WeightRange::symmetric(1.0),
            bias: WeightRange::ZERO,
            value_range: Interval::SYMMETRIC,
        }
    }
}

impl InputSettings {
    pub fn validate(&self) -> Result<()> {
        if self.input_count < 1 {
            return Err(ConfigError::InvalidCount {
                field: "input.input_count",
                value: self.input_count,
                min: 1,
            });
        }
        check_density("input.density", self.density)?;
        self.weights.validate("input.weights")?;
        self.bias.validate("input.bias")?;
        if !(self.value_range.min < self.value_range.max) {
            return Err(ConfigError::OutOfRange {
                field: "input.value_range",
                value: self.value_range.min,
                expected: "min < max",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContextActivation {
    Analog(AnalogFunction),
    Spiking(SpikingModel),
}

/// Optional context unit.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContextSettings {
    pub activation: ContextActivation,
    pub in_weights: WeightRange,
    pub out_weights: WeightRange,
    /// Fraction of neurons receiving the context signal.
    pub feedback_density: f64,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            activation: ContextActivation::Analog(AnalogFunction::Tanh),
            in_weights: WeightRange::symmetric(0.05),
            out_weights: WeightRange::symmetric(1.0),
            feedback_density: 0.5,
        }
    }
}

impl ContextSettings {
    pub fn validate(&self) -> Result<()> {
        self.in_weights.validate("context.in_weights")?;
        self.out_weights.validate("context.out_weights")?;
        check_density("context.feedback_density", self.feedback_density)?;
        if let ContextActivation::Spiking(model) = self.activation {
            ActivationSettings::Spiking { model }.validate("context.activation")?;
        }
        Ok(())
    }
}

/// Optional injection of prior outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeedbackSettings {
    pub output_count: usize,
    /// Fraction of neurons each output channel is wired to.
    pub density: f64,
    pub weights: WeightRange,
}

impl FeedbackSettings {
    pub fn validate(&self) -> Result<()> {
        if self.output_count < 1 {
            return Err(ConfigError::InvalidCount {
                field: "feedback.output_count",
                value: self.output_count,
                min: 1,
            });
        }
        check_density("feedback.density", self.density)?;
        self.weights.validate("feedback.weights")
    }
}

/// Immutable description of one reservoir.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReservoirConfig {
    pub neuron_count: usize,

    // Informational location tags copied into every neuron.
    pub ensemble_id: usize,
    pub group_id: usize,

    pub topology: TopologySettings,
    pub internal_weights: WeightRange,
    pub neuron_bias: WeightRange,
    pub activation: ActivationSettings,

    pub input: InputSettings,
    pub context: Option<ContextSettings>,
    pub feedback: Option<FeedbackSettings>,

    /// Append each neuron's squared analog signal to the output vector.
    pub augmented_states: bool,
    pub predictors: PredictorSettings,
}

impl Default for ReservoirConfig {
    /// 100 tanh neurons, 10% random connectivity, one input channel.
    fn default() -> Self {
        Self {
            neuron_count: 100,
            ensemble_id: 0,
            group_id: 0,
            topology: TopologySettings::default(),
            internal_weights: WeightRange::symmetric(0.5),
            neuron_bias: WeightRange::ZERO,
            activation: ActivationSettings::default(),
            input: InputSettings::default(),
            context: None,
            feedback: None,
            augmented_states: false,
            predictors: PredictorSettings::default(),
        }
    }
}

impl ReservoirConfig {
    pub fn with_size(neuron_count: usize) -> Self {
        Self {
            neuron_count,
            ..Default::default()
        }
    }

    pub fn with_topology(mut self, topology: TopologySettings) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_activation(mut self, activation: ActivationSettings) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_input(mut self, input: InputSettings) -> Self {
        self.input = input;
        self
    }

    pub fn with_internal_weights(mut self, weights: WeightRange) -> Self {
        self.internal_weights = weights;
        self
    }

    pub fn with_neuron_bias(mut self, bias: WeightRange) -> Self {
        self.neuron_bias = bias;
        self
    }

    pub fn with_context(mut self, context: ContextSettings) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_feedback(mut self, feedback: FeedbackSettings) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn with_augmented_states(mut self, enabled: bool) -> Self {
        self.augmented_states = enabled;
        self
    }

    pub fn with_predictors(mut self, predictors: PredictorSettings) -> Self {
        self.predictors = predictors;
        self
    }

    /// Validate the configuration, naming the offending field on failure.
    pub fn validate(&self) -> Result<()> {
        if self.neuron_count < 1 {
            return Err(ConfigError::InvalidCount {
                field: "neuron_count",
                value: self.neuron_count,
                min: 1,
            });
        }
        self.topology.validate()?;
        self.internal_weights.validate("internal_weights")?;
        self.neuron_bias.validate("neuron_bias")?;
        self.activation.validate("activation")?;
        self.input.validate()?;
        if let Some(ctx) = &self.context {
            ctx.validate()?;
        }
        if let Some(fb) = &self.feedback {
            fb.validate()?;
        }
        self.predictors.validate()
    }

    pub fn activation_family(&self) -> ActivationFamily {
        match self.activation {
            ActivationSettings::Analog { .. } => ActivationFamily::Analog,
            ActivationSettings::Spiking { .. } => ActivationFamily::Spiking,
        }
    }

    /// Length of the per-cycle state output vector.
    pub fn output_len(&self) -> usize {
        if self.augmented_states {
            2 * self.neuron_count
        } else {
            self.neuron_count
        }
    }
}
