/// Incremental descriptive statistics over a stream of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicStats {
    pub count: u64,
    pub sum: f64,
    pub sum_sq: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for BasicStats {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicStats {
    pub const fn new() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            sum_sq: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn from_samples<I: IntoIterator<Item = f64>>(samples: I) -> Self {
        let mut s = Self::new();
        for x in samples {
            s.push(x);
        }
        s
    }

    #[inline]
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        self.sum += x;
        self.sum_sq += x * x;
        if x < self.min {
            self.min = x;
        }
        if x > self.max {
            self.max = x;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.sum_sq / self.count as f64).sqrt()
        }
    }

    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let m = self.mean();
        (self.sum_sq / self.count as f64 - m * m).max(0.0)
    }
}

/// Running per-neuron statistics, accumulated only when requested.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NeuronStatistics {
    pub external_stimulus: BasicStats,
    pub recurrent_stimulus: BasicStats,
    pub total_stimulus: BasicStats,
    pub activation: BasicStats,
    pub analog_signal: BasicStats,
    pub spiking_signal: BasicStats,
}

impl NeuronStatistics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// On-demand statistics snapshot of a reservoir.
#[derive(Debug, Clone)]
pub struct ReservoirStats {
    pub cycles: u64,
    pub connection_count: usize,
    /// Current neuron states (min/max/RMS over neurons).
    pub states: BasicStats,
    pub analog_signals: BasicStats,
    /// Fraction of neurons that fired in the last cycle.
    pub firing_rate: f64,
    pub neurons: Vec<NeuronStatistics>,
    /// `None` when the reservoir has no context unit.
    pub context_state_rms: Option<f64>,
}
