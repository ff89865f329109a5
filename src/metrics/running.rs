use serde::Serialize;

/// Running minimum / maximum / mean for one measurement family.
/// Serialized straight into the JSON snapshot and the SSE feed.
///
/// The mean is a decaying average: every new sample is averaged against the
/// previous mean with `(mean + sample) / 2`, so recent samples weigh more
/// than a cumulative average would give them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunningStat {
    pub minimum: u64,
    pub maximum: u64,
    pub mean: u64,
}

impl RunningStat {
    /// All-zero placeholder used before any samples are folded in.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Fold one sample into the family.
    ///
    /// `first` must be true for the very first observation of the owning
    /// counter set; that sample seeds all three values instead of being
    /// averaged against zero.
    pub fn fold(&mut self, sample: u64, first: bool) {
        if first {
            self.minimum = sample;
            self.maximum = sample;
            self.mean = sample;
            return;
        }

        if sample > self.maximum {
            self.maximum = sample;
        }
        if sample < self.minimum {
            self.minimum = sample;
        }
        self.mean = half_sum(self.mean, sample);
    }
}

/// `(a + b) / 2` truncating, without overflowing on large operands.
fn half_sum(a: u64, b: u64) -> u64 {
    a / 2 + b / 2 + (a % 2 + b % 2) / 2
}
