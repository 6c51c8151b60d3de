//! Color distance

/// Default channel weights (red, green, blue) of [`DistanceMetric::Weighted`]
///
/// Green counts most and red least, roughly following the eye's
/// sensitivity.
pub const DEFAULT_WEIGHTS: [f32; 3] = [2.0, 4.0, 3.0];

/// Squared RGB distance used to pick the nearest palette entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DistanceMetric {
    /// `wr·Δr² + wg·Δg² + wb·Δb²`
    Weighted([f32; 3]),
    /// "Red mean" approximation: weights `2 + r̄/256`, `4`, `2 + (255 − r̄)/256`
    /// where `r̄` is the mean red of both colors
    RedMean,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::Weighted(DEFAULT_WEIGHTS)
    }
}

impl DistanceMetric {
    pub fn distance(&self, a: [u8; 3], b: [u8; 3]) -> f32 {
        let dr = a[0] as f32 - b[0] as f32;
        let dg = a[1] as f32 - b[1] as f32;
        let db = a[2] as f32 - b[2] as f32;
        let [wr, wg, wb] = self.weights_at(a[0], b[0]);
        wr * dr * dr + wg * dg * dg + wb * db * db
    }

    fn weights_at(&self, r1: u8, r2: u8) -> [f32; 3] {
        match self {
            DistanceMetric::Weighted(w) => *w,
            DistanceMetric::RedMean => {
                let mean = (r1 as f32 + r2 as f32) / 2.0;
                [2.0 + mean / 256.0, 4.0, 2.0 + (255.0 - mean) / 256.0]
            }
        }
    }

    /// Smallest and largest weight each channel can take
    pub(crate) fn weight_bounds(&self) -> ([f32; 3], [f32; 3]) {
        match self {
            DistanceMetric::Weighted(w) => (*w, *w),
            DistanceMetric::RedMean => ([2.0, 4.0, 2.0], [2.0 + 255.0 / 256.0, 4.0, 2.0 + 255.0 / 256.0]),
        }
    }

    /// Weights must be finite and non-negative
    pub fn is_valid(&self) -> bool {
        match self {
            DistanceMetric::Weighted(w) => w.iter().all(|x| x.is_finite() && *x >= 0.0),
            DistanceMetric::RedMean => true,
        }
    }
}
