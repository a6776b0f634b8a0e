//! Sample-indexed exponential decay.

/// Exponential policy state: `rate = base_rate * base^(-samples/gamma)`.
///
/// `samples` accumulates processed samples across all updates of the run,
/// so the decay is tied to data seen, not to wall-clock epochs.
#[derive(Debug, Clone, PartialEq)]
pub struct Exponential {
    /// Initial learning rate.
    pub base_rate: f32,
    /// Decay base.
    pub base: f32,
    /// Sample count over which the rate decays by one factor of `base`.
    pub gamma: f32,
    /// Samples processed so far.
    pub samples: u64,
}

impl Exponential {
    /// Rate at the current sample index.
    pub fn rate_now(&self) -> f32 {
        self.base_rate * self.base.powf(-(self.samples as f32) / self.gamma)
    }
}
