//! Activation functions for hidden neurons.
//!
//! Two families:
//! - analog: a stateless squashing function of the total stimulus
//! - spiking: a stateful membrane model that emits 0/1 spikes
//!
//! Both report the interval their continuous output lives in, so the neuron
//! can rescale it into the [0, 1] analog signal.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Closed numeric interval.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interval {
    pub min: f64,
    pub max: f64,
}

impl Interval {
    pub const UNIT: Interval = Interval { min: 0.0, max: 1.0 };
    pub const SYMMETRIC: Interval = Interval {
        min: -1.0,
        max: 1.0,
    };

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    #[inline]
    pub fn clamp(&self, x: f64) -> f64 {
        x.clamp(self.min, self.max)
    }

    /// Linear map from this interval onto [0, 1], clamped.
    #[inline]
    pub fn rescale_to_unit(&self, x: f64) -> f64 {
        ((x - self.min) / self.span()).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ActivationFamily {
    Analog,
    Spiking,
}

impl ActivationFamily {
    pub fn name(self) -> &'static str {
        match self {
            ActivationFamily::Analog => "analog",
            ActivationFamily::Spiking => "spiking",
        }
    }
}

/// Stateless analog activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AnalogFunction {
    #[default]
    Tanh,
    Logistic,
    /// `x / (1 + |x|)`
    Elliot,
    Identity,
}

impl AnalogFunction {
    #[inline]
    pub fn compute(self, x: f64) -> f64 {
        match self {
            AnalogFunction::Tanh => x.tanh(),
            AnalogFunction::Logistic => 1.0 / (1.0 + (-x).exp()),
            AnalogFunction::Elliot => x / (1.0 + x.abs()),
            AnalogFunction::Identity => x.clamp(-1.0, 1.0),
        }
    }

    pub fn output_range(self) -> Interval {
        match self {
            AnalogFunction::Logistic => Interval::UNIT,
            AnalogFunction::Tanh | AnalogFunction::Elliot | AnalogFunction::Identity => {
                Interval::SYMMETRIC
            }
        }
    }
}

/// Parameters of a spiking membrane model.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpikingModel {
    /// Leaky integrate-and-fire, Euler step of one cycle.
    ///
    /// `v += (-(v - resting) + resistance * I) / membrane_time_scale`, where
    /// `I = stimulus * stimulation_coef`.
    LeakyIntegrateAndFire {
        resting_potential: f64,
        reset_potential: f64,
        firing_threshold: f64,
        refractory_periods: u32,
        membrane_time_scale: f64,
        resistance: f64,
        stimulation_coef: f64,
    },
    /// Izhikevich (2003) simple model, two half-steps per cycle.
    Izhikevich {
        a: f64,
        b: f64,
        c: f64,
        d: f64,
        stimulation_coef: f64,
    },
}

impl SpikingModel {
    pub const IZHIKEVICH_PEAK: f64 = 30.0;

    pub fn leaky_integrate_and_fire() -> Self {
        SpikingModel::LeakyIntegrateAndFire {
            resting_potential: -70.0,
            reset_potential: -75.0,
            firing_threshold: -50.0,
            refractory_periods: 1,
            membrane_time_scale: 8.0,
            resistance: 15.0,
            stimulation_coef: 2.0,
        }
    }

    /// Regular-spiking cortical parameters.
    pub fn izhikevich() -> Self {
        SpikingModel::Izhikevich {
            a: 0.02,
            b: 0.2,
            c: -65.0,
            d: 8.0,
            stimulation_coef: 15.0,
        }
    }

    /// Interval the membrane potential is rescaled from.
    pub fn internal_range(&self) -> Interval {
        match *self {
            SpikingModel::LeakyIntegrateAndFire {
                resting_potential,
                reset_potential,
                firing_threshold,
                ..
            } => Interval::new(resting_potential.min(reset_potential), firing_threshold),
            SpikingModel::Izhikevich { c, .. } => Interval::new(c - 15.0, Self::IZHIKEVICH_PEAK),
        }
    }

    fn initial_membrane(&self) -> (f64, f64) {
        match *self {
            SpikingModel::LeakyIntegrateAndFire {
                resting_potential, ..
            } => (resting_potential, 0.0),
            SpikingModel::Izhikevich { b, c, .. } => (c, b * c),
        }
    }
}

impl Default for SpikingModel {
    fn default() -> Self {
        Self::leaky_integrate_and_fire()
    }
}

/// A spiking model together with its per-neuron membrane state.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikingActivation {
    model: SpikingModel,
    membrane: f64,
    recovery: f64,
    refractory_left: u32,
    // Potential reported for the analog view; the pre-reset peak on a spike.
    reported: f64,
}

impl SpikingActivation {
    pub fn new(model: SpikingModel) -> Self {
        let (membrane, recovery) = model.initial_membrane();
        Self {
            model,
            membrane,
            recovery,
            refractory_left: 0,
            reported: membrane,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.model);
    }

    /// Membrane potential as seen by the analog view.
    #[inline]
    pub fn internal_state(&self) -> f64 {
        self.reported
    }

    #[inline]
    pub fn internal_range(&self) -> Interval {
        self.model.internal_range()
    }

    /// Advances the membrane by one cycle. Returns 1.0 on a spike, else 0.0.
    pub fn compute(&mut self, stimulus: f64) -> f64 {
        match self.model {
            SpikingModel::LeakyIntegrateAndFire {
                resting_potential,
                reset_potential,
                firing_threshold,
                refractory_periods,
                membrane_time_scale,
                resistance,
                stimulation_coef,
            } => {
                if self.refractory_left > 0 {
                    self.refractory_left -= 1;
                    self.membrane = reset_potential;
                    self.reported = reset_potential;
                    return 0.0;
                }
                let current = stimulus * stimulation_coef;
                self.membrane += (-(self.membrane - resting_potential) + resistance * current)
                    / membrane_time_scale;
                if self.membrane >= firing_threshold {
                    self.reported = firing_threshold;
                    self.membrane = reset_potential;
                    self.refractory_left = refractory_periods;
                    1.0
                } else {
                    self.reported = self.membrane;
                    0.0
                }
            }
            SpikingModel::Izhikevich {
                a,
                b,
                c,
                d,
                stimulation_coef,
            } => {
                let current = stimulus * stimulation_coef;
                let mut v = self.membrane;
                let u = self.recovery;
                for _ in 0..2 {
                    v += 0.5 * (0.04 * v * v + 5.0 * v + 140.0 - u + current);
                }
                self.recovery = u + a * (b * v - u);
                if v >= SpikingModel::IZHIKEVICH_PEAK {
                    self.reported = SpikingModel::IZHIKEVICH_PEAK;
                    self.membrane = c;
                    self.recovery += d;
                    1.0
                } else {
                    self.membrane = v;
                    self.reported = v;
                    0.0
                }
            }
        }
    }
}

/// Per-neuron activation: a tagged variant instead of a runtime type check.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    Analog(AnalogFunction),
    Spiking(SpikingActivation),
}

impl Activation {
    pub fn spiking(model: SpikingModel) -> Self {
        Activation::Spiking(SpikingActivation::new(model))
    }
}
