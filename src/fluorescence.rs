//! Photosystem II (PSII) Fv/Fm from a fluorescence frame sequence.
//!
//! Frame 0 is the dark reference and frame 1 the minimum
//! fluorescence `Fmin`. `Fmax` is the frame holding the brightest
//! single pixel of the sequence.

use ndarray::{Array2, Zip};

use crate::error::{Error, Result};

/// Index of the frame whose maximum pixel is the largest of the
/// sequence. Ties go to the earliest frame.
pub fn fmax_index(frames: &[Array2<u8>]) -> Option<usize> {
    let mut best: Option<(usize, u8)> = None;
    for (idx, frame) in frames.iter().enumerate() {
        let peak = frame.iter().copied().max().unwrap_or(0);
        match best {
            Some((_, b)) if b >= peak => {}
            _ => best = Some((idx, peak)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// `(Fmax - Fmin) / Fmax` per pixel. Undefined or out-of-range
/// ratios (division by zero, `Fmin > Fmax`) become `0.0`.
pub fn fv_fm(fmin: &Array2<u8>, fmax: &Array2<u8>) -> Result<Array2<f64>> {
    if fmin.dim() != fmax.dim() {
        return Err(Error::Calibration(format!(
            "frame shapes differ: Fmin {:?}, Fmax {:?}",
            fmin.dim(),
            fmax.dim()
        )));
    }
    let mut out = Array2::zeros(fmax.dim());
    Zip::from(&mut out)
        .and(fmin)
        .and(fmax)
        .for_each(|o, &min, &max| {
            // widen before subtracting; u8 would wrap for min > max
            let fv = f64::from(max) - f64::from(min);
            let ratio = fv / f64::from(max);
            *o = if ratio.is_finite() && (0.0..=1.0).contains(&ratio) {
                ratio
            } else {
                0.0
            };
        });
    Ok(out)
}

/// Fv/Fm grid of a dark-adapted sequence.
#[derive(Debug, Clone)]
pub struct FvFmResult {
    pub fmax_index: usize,
    pub fv_fm: Array2<f64>,
}

pub fn analyze_sequence(frames: &[Array2<u8>]) -> Result<FvFmResult> {
    if frames.len() < 2 {
        return Err(Error::Calibration(format!(
            "need at least 2 fluorescence frames, found {}",
            frames.len()
        )));
    }
    let idx = fmax_index(frames).unwrap_or(0);
    Ok(FvFmResult {
        fmax_index: idx,
        fv_fm: fv_fm(&frames[1], &frames[idx])?,
    })
}

/// Equal-width histogram spanning the data range; the last bin is
/// closed on the right.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub edges: Vec<f64>,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn from_values<'a, I>(values: I, bins: usize) -> Self
    where
        I: IntoIterator<Item = &'a f64> + Clone,
    {
        let bins = bins.max(1);
        let (mut lo, mut hi) = values
            .clone()
            .into_iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if lo > hi {
            lo = 0.;
            hi = 1.;
        } else if lo == hi {
            lo -= 0.5;
            hi += 0.5;
        }

        let width = (hi - lo) / bins as f64;
        let edges = (0..=bins).map(|i| lo + width * i as f64).collect();
        let mut counts = vec![0u64; bins];
        for &v in values {
            let bin = (((v - lo) / width) as usize).min(bins - 1);
            counts[bin] += 1;
        }
        Histogram { edges, counts }
    }

    pub fn centers(&self) -> impl Iterator<Item = f64> + '_ {
        self.edges.windows(2).map(|w| (w[0] + w[1]) / 2.)
    }
}
