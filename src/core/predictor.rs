//! Per-neuron temporal feature extraction ("predictors").
//!
//! Every hidden neuron owns a [`PredictorEngine`] that is fed the neuron's
//! analog signal and firing flag once per cycle and maintains a fixed set of
//! derived features, all updated incrementally in O(1) amortized time
//! (moving averages are O(window) on the cycles they actually update).

use std::collections::VecDeque;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{check_below_one, ConfigError, Result};

/// Maximum window of the bit-packed firing history.
pub const MAX_FIRING_WINDOW: usize = 64;
/// Maximum window of an exponentially weighted moving average.
pub const MAX_EXPONENTIAL_WINDOW: usize = 64;
/// Maximum window of a linearly weighted moving average.
pub const MAX_LINEAR_WINDOW: usize = 10240;
/// Maximum window of an unweighted moving average.
pub const MAX_UNWEIGHTED_WINDOW: usize = 10240;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum PredictorKind {
    Activation,
    ActivationSquare,
    ActivationFadingSum,
    ActivationMovingAvg,
    FiringFadingSum,
    FiringMovingAvg,
    FiringCount,
    FiringBinPattern,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WindowWeighting {
    /// `exp(-(W - 1 - i))`, newest sample weighs 1.
    Exponential,
    /// `i + 1`, newest sample weighs W.
    Linear,
    #[default]
    Unweighted,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FadingSumSettings {
    /// Decay per cycle in [0, 1): `sum = sum * (1 - strength) + x`.
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MovingAverageSettings {
    pub window: usize,
    /// Cycles skipped between window updates.
    pub leakage: usize,
    pub weighting: WindowWeighting,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FiringWindowSettings {
    pub window: usize,
}

/// Which predictors are enabled, with their parameters.
///
/// Enabled predictors are emitted in the order of [`PredictorKind`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PredictorSettings {
    pub activation: bool,
    pub activation_square: bool,
    pub activation_fading_sum: Option<FadingSumSettings>,
    pub activation_moving_avg: Option<MovingAverageSettings>,
    pub firing_fading_sum: Option<FadingSumSettings>,
    pub firing_moving_avg: Option<MovingAverageSettings>,
    pub firing_count: Option<FiringWindowSettings>,
    pub firing_bin_pattern: Option<FiringWindowSettings>,
}

impl Default for PredictorSettings {
    fn default() -> Self {
        Self {
            activation: true,
            activation_square: true,
            activation_fading_sum: None,
            activation_moving_avg: None,
            firing_fading_sum: None,
            firing_moving_avg: None,
            firing_count: None,
            firing_bin_pattern: None,
        }
    }
}

impl PredictorSettings {
    /// No predictors at all.
    pub fn none() -> Self {
        Self {
            activation: false,
            activation_square: false,
            ..Self::default()
        }
    }

    /// Every predictor, with moderate windows.
    pub fn all() -> Self {
        let avg = MovingAverageSettings {
            window: 8,
            leakage: 0,
            weighting: WindowWeighting::Linear,
        };
        Self {
            activation: true,
            activation_square: true,
            activation_fading_sum: Some(FadingSumSettings { strength: 0.005 }),
            activation_moving_avg: Some(avg),
            firing_fading_sum: Some(FadingSumSettings { strength: 0.005 }),
            firing_moving_avg: Some(avg),
            firing_count: Some(FiringWindowSettings { window: 16 }),
            firing_bin_pattern: Some(FiringWindowSettings { window: 8 }),
        }
    }

    pub fn enabled(&self) -> Vec<PredictorKind> {
        let mut kinds = Vec::with_capacity(8);
        if self.activation {
            kinds.push(PredictorKind::Activation);
        }
        if self.activation_square {
            kinds.push(PredictorKind::ActivationSquare);
        }
        if self.activation_fading_sum.is_some() {
            kinds.push(PredictorKind::ActivationFadingSum);
        }
        if self.activation_moving_avg.is_some() {
            kinds.push(PredictorKind::ActivationMovingAvg);
        }
        if self.firing_fading_sum.is_some() {
            kinds.push(PredictorKind::FiringFadingSum);
        }
        if self.firing_moving_avg.is_some() {
            kinds.push(PredictorKind::FiringMovingAvg);
        }
        if self.firing_count.is_some() {
            kinds.push(PredictorKind::FiringCount);
        }
        if self.firing_bin_pattern.is_some() {
            kinds.push(PredictorKind::FiringBinPattern);
        }
        kinds
    }

    pub fn count(&self) -> usize {
        self.enabled().len()
    }

    pub fn validate(&self) -> Result<()> {
        for (field, fading) in [
            ("predictors.activation_fading_sum", self.activation_fading_sum),
            ("predictors.firing_fading_sum", self.firing_fading_sum),
        ] {
            if let Some(f) = fading {
                check_below_one(field, f.strength, 0.0, "[0, 1)")?;
            }
        }
        for (field, avg) in [
            ("activation_moving_avg", self.activation_moving_avg),
            ("firing_moving_avg", self.firing_moving_avg),
        ] {
            if let Some(a) = avg {
                validate_moving_average(field, &a)?;
            }
        }
        for (field, firing) in [
            ("firing_count", self.firing_count),
            ("firing_bin_pattern", self.firing_bin_pattern),
        ] {
            if let Some(f) = firing {
                check_window(field, f.window, MAX_FIRING_WINDOW)?;
            }
        }
        Ok(())
    }
}

fn check_window(predictor: &'static str, window: usize, max: usize) -> Result<()> {
    if window < 1 {
        return Err(ConfigError::InvalidCount {
            field: predictor,
            value: window,
            min: 1,
        });
    }
    if window > max {
        return Err(ConfigError::WindowTooLarge {
            predictor,
            window,
            max,
        });
    }
    Ok(())
}

fn validate_moving_average(predictor: &'static str, s: &MovingAverageSettings) -> Result<()> {
    let max = match s.weighting {
        WindowWeighting::Exponential => MAX_EXPONENTIAL_WINDOW,
        WindowWeighting::Linear => MAX_LINEAR_WINDOW,
        WindowWeighting::Unweighted => MAX_UNWEIGHTED_WINDOW,
    };
    check_window(predictor, s.window, max)
}

fn weight_cache(window: usize, weighting: WindowWeighting) -> Arc<[f64]> {
    (0..window)
        .map(|i| match weighting {
            WindowWeighting::Exponential => (-((window - 1 - i) as f64)).exp(),
            WindowWeighting::Linear => (i + 1) as f64,
            WindowWeighting::Unweighted => 1.0,
        })
        .collect()
}

/// Validated predictor settings plus shared weight caches.
///
/// Built once per reservoir; every engine clones the (cheap) `Arc`s.
#[derive(Debug, Clone)]
pub struct PredictorPlan {
    settings: PredictorSettings,
    kinds: Vec<PredictorKind>,
    activation_weights: Option<Arc<[f64]>>,
    firing_weights: Option<Arc<[f64]>>,
}

impl PredictorPlan {
    pub fn new(settings: PredictorSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            kinds: settings.enabled(),
            activation_weights: settings
                .activation_moving_avg
                .map(|s| weight_cache(s.window, s.weighting)),
            firing_weights: settings
                .firing_moving_avg
                .map(|s| weight_cache(s.window, s.weighting)),
        })
    }

    pub fn count(&self) -> usize {
        self.kinds.len()
    }
}

/// Down-sampled, weighted moving average over a bounded ring buffer.
#[derive(Debug, Clone, PartialEq)]
struct MovingWindow {
    samples: VecDeque<f64>,
    weights: Arc<[f64]>,
    leakage: usize,
    countdown: usize,
    value: f64,
}

impl MovingWindow {
    fn new(settings: &MovingAverageSettings, weights: Arc<[f64]>) -> Self {
        Self {
            samples: VecDeque::with_capacity(settings.window),
            weights,
            leakage: settings.leakage,
            countdown: 0,
            value: 0.0,
        }
    }

    fn reset(&mut self) {
        self.samples.clear();
        self.countdown = 0;
        self.value = 0.0;
    }

    fn update(&mut self, x: f64) {
        if self.countdown > 0 {
            self.countdown -= 1;
            return;
        }
        self.countdown = self.leakage;

        let window = self.weights.len();
        if self.samples.len() == window {
            self.samples.pop_front();
        }
        self.samples.push_back(x);

        // Align the newest sample with the heaviest weight.
        let offset = window - self.samples.len();
        let mut acc = 0.0;
        let mut norm = 0.0;
        for (x, w) in self.samples.iter().zip(&self.weights[offset..]) {
            acc += w * x;
            norm += w;
        }
        self.value = acc / norm;
    }
}

/// Bit-packed firing history; the newest bit is bit 0.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct FiringRegister {
    bits: u64,
    cycles: u64,
}

/// Running count of 1-bits among the newest `window` firing flags.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FiringCounter {
    decrement_mask: u64,
    count: u32,
}

impl FiringCounter {
    fn new(window: usize) -> Self {
        Self {
            decrement_mask: 1u64 << (window - 1),
            count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictorEngine {
    kinds: Vec<PredictorKind>,
    activation_strength: f64,
    firing_strength: f64,
    pattern_window: usize,

    last_activation: f64,
    activation_fading: f64,
    firing_fading: f64,
    activation_window: Option<MovingWindow>,
    firing_window: Option<MovingWindow>,
    register: FiringRegister,
    counter: Option<FiringCounter>,
}

impl PredictorEngine {
    pub fn new(plan: &PredictorPlan) -> Self {
        let s = &plan.settings;
        Self {
            kinds: plan.kinds.clone(),
            activation_strength: s.activation_fading_sum.map_or(0.0, |f| f.strength),
            firing_strength: s.firing_fading_sum.map_or(0.0, |f| f.strength),
            pattern_window: s.firing_bin_pattern.map_or(0, |f| f.window),
            last_activation: 0.0,
            activation_fading: 0.0,
            firing_fading: 0.0,
            activation_window: s
                .activation_moving_avg
                .zip(plan.activation_weights.clone())
                .map(|(a, w)| MovingWindow::new(&a, w)),
            firing_window: s
                .firing_moving_avg
                .zip(plan.firing_weights.clone())
                .map(|(a, w)| MovingWindow::new(&a, w)),
            register: FiringRegister::default(),
            counter: s.firing_count.map(|f| FiringCounter::new(f.window)),
        }
    }

    pub fn reset(&mut self) {
        self.last_activation = 0.0;
        self.activation_fading = 0.0;
        self.firing_fading = 0.0;
        if let Some(w) = &mut self.activation_window {
            w.reset();
        }
        if let Some(w) = &mut self.firing_window {
            w.reset();
        }
        self.register = FiringRegister::default();
        if let Some(c) = &mut self.counter {
            c.count = 0;
        }
    }

    pub fn count(&self) -> usize {
        self.kinds.len()
    }

    pub fn update(&mut self, activation: f64, fired: bool) {
        let bit = if fired { 1.0 } else { 0.0 };

        self.last_activation = activation;
        self.activation_fading = self.activation_fading * (1.0 - self.activation_strength) + activation;
        self.firing_fading = self.firing_fading * (1.0 - self.firing_strength) + bit;

        if let Some(w) = &mut self.activation_window {
            w.update(activation);
        }
        if let Some(w) = &mut self.firing_window {
            w.update(bit);
        }

        if let Some(c) = &mut self.counter {
            if self.register.bits & c.decrement_mask != 0 {
                c.count -= 1;
            }
            if fired {
                c.count += 1;
            }
        }
        self.register.bits = (self.register.bits << 1) | fired as u64;
        self.register.cycles = self.register.cycles.saturating_add(1);
    }

    pub fn firing_count(&self) -> u32 {
        self.counter.map_or(0, |c| c.count)
    }

    /// Raw firing history, newest bit in bit 0.
    pub fn firing_bits(&self) -> u64 {
        self.register.bits
    }

    /// The newest `window` firing bits as an integer, oldest in bit 0.
    ///
    /// Until `window` cycles have run only `cycles` bits exist, so the newest
    /// bit sits at bit `cycles - 1`; from then on it is always bit `window - 1`.
    pub fn firing_bin_pattern(&self) -> u64 {
        let n = (self.register.cycles.min(self.pattern_window as u64)) as u32;
        if n == 0 {
            return 0;
        }
        let low = if n == 64 {
            self.register.bits
        } else {
            self.register.bits & ((1u64 << n) - 1)
        };
        low.reverse_bits() >> (64 - n)
    }

    pub fn value(&self, kind: PredictorKind) -> f64 {
        match kind {
            PredictorKind::Activation => self.last_activation,
            PredictorKind::ActivationSquare => self.last_activation * self.last_activation,
            PredictorKind::ActivationFadingSum => self.activation_fading,
            PredictorKind::ActivationMovingAvg => {
                self.activation_window.as_ref().map_or(0.0, |w| w.value)
            }
            PredictorKind::FiringFadingSum => self.firing_fading,
            PredictorKind::FiringMovingAvg => self.firing_window.as_ref().map_or(0.0, |w| w.value),
            PredictorKind::FiringCount => self.firing_count() as f64,
            PredictorKind::FiringBinPattern => self.firing_bin_pattern() as f64,
        }
    }

    /// Writes the enabled features, in plan order, into `out`.
    pub fn copy_features(&self, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.kinds.len());
        for (slot, &kind) in out.iter_mut().zip(&self.kinds) {
            *slot = self.value(kind);
        }
    }
}
