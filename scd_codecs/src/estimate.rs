//! Histogram-driven choice of the LSB/MSB split.
//!
//! Low bits that behave like noise are cheaper sent raw; high bits cluster
//! around a mode and are cheap as comma codes. Starting from zero raw bits,
//! the histogram is folded one bit at a time until the estimated size stops
//! improving.

use crate::comma::{code_len, wrapped_delta, OUTLIER_COST};

/// One counter per possible 16-bit pixel value.
pub const HISTOGRAM_BUCKETS: usize = 1 << 16;

/// Pixel-value histogram at a given LSB granularity.
pub struct Histogram {
    counts: Box<[u32]>,
    len: usize,
    lsb_count: u8,
}

impl Histogram {
    pub fn build(pixels: &[u16]) -> Self {
        let mut counts = vec![0u32; HISTOGRAM_BUCKETS].into_boxed_slice();
        for &p in pixels {
            counts[p as usize] += 1;
        }
        Self {
            counts,
            len: HISTOGRAM_BUCKETS,
            lsb_count: 0,
        }
    }

    /// Low bits currently folded away.
    pub fn lsb_count(&self) -> u8 {
        self.lsb_count
    }

    /// Live buckets, indexed by MSB value at the current granularity.
    pub fn buckets(&self) -> &[u32] {
        &self.counts[..self.len]
    }

    /// Most populated bucket; the lowest value wins a tie.
    pub fn mode(&self) -> u16 {
        let mut best = 0;
        for (i, &count) in self.buckets().iter().enumerate() {
            if count > self.counts[best] {
                best = i;
            }
        }
        best as u16
    }

    /// Estimated compressed size in bits when coding against `mode`.
    pub fn cost_bits(&self, mode: u16) -> u64 {
        let lsb = self.lsb_count as u64;
        self.buckets()
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(value, &count)| {
                let delta = wrapped_delta(value as u32, mode as u32);
                let code = code_len(delta).unwrap_or(OUTLIER_COST) as u64;
                count as u64 * (lsb + code)
            })
            .sum()
    }

    /// Drop one more least-significant bit by summing adjacent buckets.
    pub fn fold(&mut self) {
        if self.lsb_count >= 16 {
            return;
        }
        let half = self.len / 2;
        for i in 0..half {
            self.counts[i] = self.counts[2 * i] + self.counts[2 * i + 1];
        }
        self.len = half;
        self.lsb_count += 1;
    }
}

/// Outcome of the parameter search for one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub lsb_count: u8,
    /// Modal MSB value at `lsb_count` granularity.
    pub mode: u16,
    pub estimated_bits: u64,
    pub pixels: u64,
    /// Histogram granularities evaluated (at most 17).
    pub iterations: u32,
}

impl Estimate {
    /// Estimated size in 16-bit elements.
    pub fn estimated_elements(&self) -> f64 {
        self.estimated_bits as f64 / 16.0
    }

    /// True when the estimate beats storing the pixels raw.
    pub fn is_useful(&self) -> bool {
        self.estimated_bits < self.pixels * 16
    }
}

/// Choose `(lsb_count, mode)` for `pixels`.
///
/// With `force_bits` the search is skipped and the mode is taken at that
/// granularity (clamped to 16).
pub fn estimate(pixels: &[u16], force_bits: Option<u8>) -> Estimate {
    let mut hist = Histogram::build(pixels);
    let pixels = pixels.len() as u64;

    if let Some(bits) = force_bits {
        for _ in 0..bits.min(16) {
            hist.fold();
        }
        let mode = hist.mode();
        return Estimate {
            lsb_count: hist.lsb_count(),
            mode,
            estimated_bits: hist.cost_bits(mode),
            pixels,
            iterations: 1,
        };
    }

    let mode = hist.mode();
    let mut best = Estimate {
        lsb_count: 0,
        mode,
        estimated_bits: hist.cost_bits(mode),
        pixels,
        iterations: 1,
    };
    while hist.lsb_count() < 16 {
        hist.fold();
        best.iterations += 1;
        let mode = hist.mode();
        let bits = hist.cost_bits(mode);
        if bits >= best.estimated_bits {
            break;
        }
        best.lsb_count = hist.lsb_count();
        best.mode = mode;
        best.estimated_bits = bits;
    }
    best
}
