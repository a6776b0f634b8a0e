//! Pre-declared per-epoch rate list.

/// List policy state: one rate per epoch, in order. Training ends when the
/// list runs out; an epoch index past the end holds the last rate (reached
/// when the minimum-epoch bound forces extra epochs, or when a resumed
/// run's offset already sits past the end).
#[derive(Debug, Clone, PartialEq)]
pub struct RateList {
    pub rates: Vec<f32>,
}

impl RateList {
    /// Rate for the zero-based in-run epoch.
    pub fn rate_for_epoch(&self, epoch: usize) -> f32 {
        let last = self.rates.len() - 1;
        self.rates[epoch.min(last)]
    }
}
