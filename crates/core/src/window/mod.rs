use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

/// Tapering function applied to each analysis block before the transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    #[default]
    Hann,
    Hamming,
    Blackman,
    /// No tapering at all.
    Rectangular,
}

impl WindowKind {
    /// Symmetric window coefficient for `index` in a table of `len` entries.
    pub fn coefficient(self, index: usize, len: usize) -> f32 {
        if len <= 1 {
            return 1.0;
        }

        let phase = (2.0 * PI * index as f32) / (len as f32 - 1.0);
        match self {
            Self::Hann => 0.5 - 0.5 * phase.cos(),
            Self::Hamming => 0.54 - 0.46 * phase.cos(),
            Self::Blackman => 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos(),
            Self::Rectangular => 1.0,
        }
    }

    /// Fills `table` with the coefficients of this window.
    pub fn fill(self, table: &mut [f32]) {
        let len = table.len();
        for (index, value) in table.iter_mut().enumerate() {
            *value = self.coefficient(index, len);
        }
    }
}
