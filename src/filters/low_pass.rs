use crate::{Error, Result};

/// First-order low-pass filter over a scalar
#[derive(Debug, Clone, PartialEq)]
pub struct LowPassFilter {
    alpha: f32,
    previous: Option<f32>,
}

impl Default for LowPassFilter {
    fn default() -> Self {
        Self { alpha: 1.0, previous: None }
    }
}

impl LowPassFilter {
    /// Create a new first-order low-pass filter
    ///
    /// # Panics
    ///
    /// Panics if alpha is not in the range (0, 1]
    #[must_use]
    pub fn new(alpha: f32) -> Self {
        assert!(alpha > 0.0 && alpha <= 1.0, "Alpha must be in (0, 1]");
        Self { alpha, previous: None }
    }

    /// Change the smoothing factor, keeping the current output
    ///
    /// # Errors
    ///
    /// Returns an error if alpha is not in the range (0, 1]; the filter is unchanged.
    pub fn reconfigure(&mut self, alpha: f32) -> Result<()> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::InvalidConfiguration(format!(
                "Low-pass alpha must be in (0, 1], got {alpha}"
            )));
        }
        self.alpha = alpha;
        Ok(())
    }

    /// Whether at least one value has been filtered
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.previous.is_some()
    }

    /// Smoothing factor
    #[must_use]
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Filter `value`; the first value passes through and seeds the state.
    pub fn update(&mut self, value: f32) -> f32 {
        let filtered = match self.previous {
            Some(last) => self.alpha.mul_add(value - last, last),
            None => value,
        };
        self.previous = Some(filtered);
        filtered
    }

    /// Forget the state, keep alpha
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
