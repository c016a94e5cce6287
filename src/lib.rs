//! # reservoir
//!
//! The core of a reservoir-computing model: a pool of sparsely and randomly
//! interconnected neurons, analog or spiking, stepped synchronously over an
//! input time series. Every cycle it emits a fixed-length state vector plus
//! per-neuron predictor features for an external readout.
//!
//! ## Quick Start
//!
//! ```
//! use reservoir::prelude::*;
//!
//! let cfg = ReservoirConfig::with_size(64)
//!     .with_topology(TopologySettings::Random { density: 0.1 });
//! let mut res = Reservoir::with_seed(cfg, 42).unwrap();
//!
//! let mut out = vec![0.0; res.output_len()];
//! for t in 0..10 {
//!     res.compute(&[(t as f64 * 0.2).sin()], &mut out, false);
//! }
//! let features = res.predictors();
//! assert_eq!(features.len(), res.predictor_len());
//! ```
//!
//! ## Feature Flags
//!
//! - `serde` (default): serialization of every configuration type
//! - `parallel`: multi-threaded neuron updates via rayon
//!
//! ## Modules
//!
//! - [`reservoir`]: the orchestrator and its update cycle
//! - [`topology`]: Random, Ring and doubly twisted toroidal wiring
//! - [`neuron`]: input and hidden neurons
//! - [`predictor`]: per-neuron temporal features
//! - [`ensemble`]: several reservoirs fed the same input

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/error.rs"]
pub mod error;

#[path = "core/activation.rs"]
pub mod activation;

#[path = "core/stats.rs"]
pub mod stats;

#[path = "core/predictor.rs"]
pub mod predictor;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/neuron.rs"]
pub mod neuron;

#[path = "core/topology.rs"]
pub mod topology;

#[path = "core/input.rs"]
pub mod input;

#[path = "core/context.rs"]
pub mod context;

#[path = "core/feedback.rs"]
pub mod feedback;

#[path = "core/reservoir.rs"]
pub mod reservoir;

#[path = "core/ensemble.rs"]
pub mod ensemble;

/// Prelude module for convenient imports.
///
/// ```
/// use reservoir::prelude::*;
/// ```
pub mod prelude {
    pub use crate::activation::{ActivationFamily, AnalogFunction, Interval, SpikingModel};
    pub use crate::config::{
        ActivationSettings, ContextActivation, ContextSettings, FeedbackSettings, InputSettings,
        ReservoirConfig, TopologySettings, WeightRange,
    };
    pub use crate::ensemble::ReservoirEnsemble;
    pub use crate::error::{ConfigError, Result};
    pub use crate::predictor::{
        FadingSumSettings, FiringWindowSettings, MovingAverageSettings, PredictorKind,
        PredictorSettings, WindowWeighting,
    };
    pub use crate::prng::Prng;
    pub use crate::reservoir::{ExecutionTier, Reservoir};
    pub use crate::stats::{BasicStats, ReservoirStats};
}
