//! Internal connectivity of a reservoir.
//!
//! Edges are drawn once from an explicitly passed [`Prng`] and stored in CSR
//! form grouped by target: neuron `i` receives from
//! `sources[offsets[i]..offsets[i + 1]]`. Nothing here changes after
//! construction.

use std::collections::HashSet;

use crate::config::{TopologySettings, WeightRange};
use crate::error::{ConfigError, Result};
use crate::prng::{IndexSampler, Prng};

/// Incoming edges of every neuron, grouped by target.
#[derive(Debug, Clone, PartialEq)]
pub struct Connections {
    /// Source neuron of each edge.
    pub sources: Vec<usize>,
    /// Parallel array of edge weights.
    pub weights: Vec<f64>,
    /// Target `i` owns edges at `[offsets[i]..offsets[i + 1])`.
    /// Length = neuron_count + 1.
    pub offsets: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    target: usize,
    source: usize,
    weight: f64,
}

impl Connections {
    /// Groups edges by target, keeping draw order within each target.
    fn from_edges(neuron_count: usize, edges: &[Edge]) -> Self {
        let mut offsets = vec![0usize; neuron_count + 1];
        for e in edges {
            offsets[e.target + 1] += 1;
        }
        for i in 0..neuron_count {
            offsets[i + 1] += offsets[i];
        }

        let mut cursor = offsets.clone();
        let mut sources = vec![0usize; edges.len()];
        let mut weights = vec![0.0f64; edges.len()];
        for e in edges {
            let slot = cursor[e.target];
            sources[slot] = e.source;
            weights[slot] = e.weight;
            cursor[e.target] += 1;
        }

        Self {
            sources,
            weights,
            offsets,
        }
    }

    pub fn neuron_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Total number of edges, parallel edges included.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn in_degree(&self, target: usize) -> usize {
        self.offsets[target + 1] - self.offsets[target]
    }

    /// `(source, weight)` pairs feeding `target`.
    pub fn incoming(&self, target: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.offsets[target]..self.offsets[target + 1];
        self.sources[range.clone()]
            .iter()
            .copied()
            .zip(self.weights[range].iter().copied())
    }

    /// `Σ weight · previous[source]` over the edges feeding `target`.
    #[inline]
    pub fn weighted_sum(&self, target: usize, previous: &[f64]) -> f64 {
        let start = self.offsets[target];
        let end = self.offsets[target + 1];
        let mut sum = 0.0;
        for idx in start..end {
            sum += self.weights[idx] * previous[self.sources[idx]];
        }
        sum
    }
}

/// Edge list under construction, with optional duplicate tracking.
struct EdgeBuilder<'a> {
    edges: Vec<Edge>,
    present: HashSet<(usize, usize)>,
    weights: &'a WeightRange,
}

impl<'a> EdgeBuilder<'a> {
    fn new(weights: &'a WeightRange) -> Self {
        Self {
            edges: Vec::new(),
            present: HashSet::new(),
            weights,
        }
    }

    fn contains(&self, target: usize, source: usize) -> bool {
        self.present.contains(&(target, source))
    }

    /// Adds an edge; with `avoid_duplicates` an existing pair is skipped.
    /// Returns whether the edge was added.
    fn connect(
        &mut self,
        target: usize,
        source: usize,
        avoid_duplicates: bool,
        rng: &mut Prng,
    ) -> bool {
        if avoid_duplicates && self.contains(target, source) {
            return false;
        }
        let weight = self.weights.sample(rng);
        self.present.insert((target, source));
        self.edges.push(Edge {
            target,
            source,
            weight,
        });
        true
    }

    fn finish(self, neuron_count: usize) -> Connections {
        Connections::from_edges(neuron_count, &self.edges)
    }
}

#[inline]
fn rounded(x: f64) -> usize {
    x.round() as usize
}

/// Builds the internal connections for `neuron_count` neurons.
pub fn build(
    settings: &TopologySettings,
    neuron_count: usize,
    weights: &WeightRange,
    rng: &mut Prng,
) -> Result<Connections> {
    settings.validate()?;
    let n = neuron_count;
    let mut b = EdgeBuilder::new(weights);

    match *settings {
        TopologySettings::Random { density } => {
            let count = rounded((n * n) as f64 * density);
            let mut sampler = IndexSampler::new(n * n);
            for _ in 0..count {
                let Some(idx) = sampler.draw(rng) else { break };
                b.connect(idx / n, idx % n, false, rng);
            }
            tracing::debug!(neurons = n, edges = b.edges.len(), "random topology");
        }
        TopologySettings::Ring {
            bidirectional,
            self_density,
            inter_density,
        } => {
            ring(&mut b, n, false, rng);
            if bidirectional {
                ring(&mut b, n, true, rng);
            }
            let base = b.edges.len();
            self_connections(&mut b, n, self_density, rng);
            let selfs = b.edges.len() - base;
            inter_connections(&mut b, n, inter_density, rng)?;
            tracing::debug!(
                neurons = n,
                base,
                self_connections = selfs,
                inter_connections = b.edges.len() - base - selfs,
                "ring topology"
            );
        }
        TopologySettings::DoublyTwistedToroidal { self_density } => {
            ring(&mut b, n, false, rng);
            vertical_twist(&mut b, n, rng);
            let base = b.edges.len();
            self_connections(&mut b, n, self_density, rng);
            tracing::debug!(
                neurons = n,
                base,
                self_connections = b.edges.len() - base,
                "doubly twisted toroidal topology"
            );
        }
    }

    Ok(b.finish(n))
}

/// Each neuron receives from its predecessor (or successor).
fn ring(b: &mut EdgeBuilder<'_>, n: usize, successor: bool, rng: &mut Prng) {
    for i in 0..n {
        let source = if successor { (i + 1) % n } else { (i + n - 1) % n };
        b.connect(i, source, false, rng);
    }
}

/// Neuron `i` feeds `i + step`, `step = floor(sqrt(n))`, wrapping into the
/// first column when it runs off the end.
fn vertical_twist(b: &mut EdgeBuilder<'_>, n: usize, rng: &mut Prng) {
    let step = ((n as f64).sqrt().floor() as usize).max(1);
    for i in 0..n {
        let mut target = i + step;
        if target > n - 1 {
            target = match (i % step).checked_sub(1) {
                Some(t) => t,
                None => step - 1,
            };
        }
        b.connect(target, i, false, rng);
    }
}

/// Self-loops on a random `round(n * density)` subset. Not duplicate-checked:
/// when the base edges already hold a loop (n = 1, or a DTT twist landing on
/// itself) the extra loop is still added, so the count is exact.
fn self_connections(b: &mut EdgeBuilder<'_>, n: usize, density: f64, rng: &mut Prng) {
    let count = rounded(n as f64 * density);
    let order = rng.permutation(n);
    for &i in order.iter().take(count) {
        b.connect(i, i, false, rng);
    }
}

/// Random off-diagonal edges, skipping pairs that already exist.
fn inter_connections(
    b: &mut EdgeBuilder<'_>,
    n: usize,
    density: f64,
    rng: &mut Prng,
) -> Result<()> {
    let slots = n * n.saturating_sub(1);
    let count = rounded(slots as f64 * density);
    if count == 0 {
        return Ok(());
    }
    let taken = b.present.iter().filter(|(t, s)| t != s).count();
    let available = slots - taken;
    if count > available {
        return Err(ConfigError::TooManyConnections {
            field: "topology.inter_density",
            requested: count,
            available,
        });
    }

    let mut sampler = IndexSampler::new(slots);
    let mut added = 0;
    while added < count {
        let Some(idx) = sampler.draw(rng) else { break };
        let target = idx / (n - 1);
        let r = idx % (n - 1);
        let source = if r >= target { r + 1 } else { r };
        if b.connect(target, source, true, rng) {
            added += 1;
        }
    }
    Ok(())
}
