//! Notch Filter Stage
//!
//! Band-rejection of a signal chunk around a center frequency, applied
//! zero-phase (forward then backward) so filtered windows stay aligned with
//! their neighbours. Two designs are available:
//! - `QFactor`: second-order IIR notch, rejected bandwidth `center / Q`
//! - `BandEdges`: Butterworth band-stop between explicit band edges,
//!   clamped to `[0, Nyquist]`
//!
//! The Butterworth designer is shared with the noise synthesizer.

use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{LadderError, Result};

/// Default Butterworth order for band-edge notches
pub const DEFAULT_BAND_STOP_ORDER: usize = 2;

/// Edges closer than this fraction of Nyquist count as touching the boundary
const EDGE_EPSILON: f64 = 1e-6;

// ============================================================================
// Notch design selection
// ============================================================================

/// How the notch around the target frequency is designed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotchDesign {
    /// IIR notch; the width argument is the quality factor
    #[default]
    QFactor,
    /// Butterworth band-stop; the width argument is the band in Hz
    BandEdges {
        #[serde(default = "default_band_stop_order")]
        order: usize,
    },
}

fn default_band_stop_order() -> usize {
    DEFAULT_BAND_STOP_ORDER
}

impl NotchDesign {
    /// Width argument for [`notch`] derived from a quality factor
    ///
    /// Band-edge designs reject `center / q` Hz.
    pub fn width_from_q(&self, center_hz: f64, q: f64) -> f64 {
        match self {
            NotchDesign::QFactor => q,
            NotchDesign::BandEdges { .. } => center_hz / q,
        }
    }
}

// ============================================================================
// Biquad sections
// ============================================================================

/// Normalized second-order section
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Biquad {
    /// Gain at 0 Hz
    pub fn dc_gain(&self) -> f64 {
        let den = 1.0 + self.a1 + self.a2;
        if den.abs() < 1e-12 {
            return 0.0;
        }
        (self.b0 + self.b1 + self.b2) / den
    }

    /// Transposed direct form II state for a constant unit input
    fn unit_step_state(&self) -> [f64; 2] {
        let y = self.dc_gain();
        [y - self.b0, self.b2 - self.a2 * y]
    }
}

/// Second-order IIR notch (the classic `iirnotch` design)
///
/// The -3 dB rejected band is `center_hz / q` wide.
pub fn iir_notch(center_hz: f64, q: f64, sample_rate: f64) -> Result<Biquad> {
    let nyquist = sample_rate / 2.0;
    if !(center_hz > 0.0 && center_hz < nyquist) {
        return Err(LadderError::DegenerateFilterWindow {
            center_hz,
            reason: format!("center must lie inside (0, {:.1}) Hz", nyquist),
        });
    }
    if !(q > 0.0 && q.is_finite()) {
        return Err(LadderError::DegenerateFilterWindow {
            center_hz,
            reason: format!("quality factor {} is not positive", q),
        });
    }

    let w0 = 2.0 * PI * center_hz / sample_rate;
    let bw = w0 / q;
    // -3 dB band edges: beta = sqrt(1 - gb^2) / gb * tan(bw / 2) with gb = 1/sqrt(2)
    let beta = (bw / 2.0).tan();
    let gain = 1.0 / (1.0 + beta);
    let cos_w0 = w0.cos();

    Ok(Biquad {
        b0: gain,
        b1: -2.0 * gain * cos_w0,
        b2: gain,
        a1: -2.0 * gain * cos_w0,
        a2: 2.0 * gain - 1.0,
    })
}

// ============================================================================
// Butterworth design
// ============================================================================

/// Butterworth response shape with edge frequencies in Hz
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ButterKind {
    LowPass(f64),
    HighPass(f64),
    BandPass(f64, f64),
    BandStop(f64, f64),
}

/// Design a digital Butterworth filter as cascaded biquads
///
/// Analog prototype, frequency transform, then bilinear transform with
/// pre-warped edges. Band designs have `2 * order` poles.
pub fn butterworth(order: usize, kind: ButterKind, sample_rate: f64) -> Result<Vec<Biquad>> {
    let nyquist = sample_rate / 2.0;
    let check = |f: f64| -> Result<f64> {
        if f > 0.0 && f < nyquist {
            // fs = 2 design space, edges normalized to Nyquist
            Ok(4.0 * (PI * (f / nyquist) / 2.0).tan())
        } else {
            Err(LadderError::DegenerateFilterWindow {
                center_hz: f,
                reason: format!("edge must lie inside (0, {:.1}) Hz", nyquist),
            })
        }
    };

    if order == 0 {
        return Err(LadderError::InvalidParameter {
            name: "order".to_string(),
            value: "0".to_string(),
            expected: "at least 1".to_string(),
        });
    }

    let n = order as i32;
    let prototype: Vec<Complex64> = (0..n)
        .map(|k| {
            let m = (-n + 1 + 2 * k) as f64;
            -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64))
        })
        .collect();
    let minus_prod =
        |roots: &[Complex64]| roots.iter().fold(Complex64::new(1.0, 0.0), |acc, r| acc * -*r);

    let (zeros, poles, gain) = match kind {
        ButterKind::LowPass(f) => {
            let wo = check(f)?;
            let poles: Vec<Complex64> = prototype.iter().map(|p| *p * wo).collect();
            (Vec::new(), poles, wo.powi(n))
        }
        ButterKind::HighPass(f) => {
            let wo = check(f)?;
            let gain = (Complex64::new(1.0, 0.0) / minus_prod(prototype.as_slice())).re;
            let poles: Vec<Complex64> = prototype.iter().map(|p| wo / *p).collect();
            (vec![Complex64::new(0.0, 0.0); order], poles, gain)
        }
        ButterKind::BandPass(lo, hi) | ButterKind::BandStop(lo, hi) => {
            let wl = check(lo)?;
            let wh = check(hi)?;
            if wl >= wh {
                return Err(LadderError::DegenerateFilterWindow {
                    center_hz: (lo + hi) / 2.0,
                    reason: format!("empty band {:.1}..{:.1} Hz", lo, hi),
                });
            }
            let bw = wh - wl;
            let wo = (wl * wh).sqrt();
            let split = |p: Complex64| {
                let root = (p * p - wo * wo).sqrt();
                [p + root, p - root]
            };

            if let ButterKind::BandPass(..) = kind {
                let poles: Vec<Complex64> = prototype
                    .iter()
                    .flat_map(|p| split(*p * (bw / 2.0)))
                    .collect();
                (vec![Complex64::new(0.0, 0.0); order], poles, bw.powi(n))
            } else {
                let gain = (Complex64::new(1.0, 0.0) / minus_prod(prototype.as_slice())).re;
                let poles: Vec<Complex64> = prototype
                    .iter()
                    .flat_map(|p| split((bw / 2.0) / *p))
                    .collect();
                let mut zeros = vec![Complex64::new(0.0, wo); order];
                zeros.extend(vec![Complex64::new(0.0, -wo); order]);
                (zeros, poles, gain)
            }
        }
    };

    let (zeros, poles, gain) = bilinear(zeros, poles, gain);
    Ok(into_sections(&zeros, &poles, gain))
}

/// Bilinear transform of an analog zpk system (fs = 2 design space)
fn bilinear(
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    gain: f64,
) -> (Vec<Complex64>, Vec<Complex64>, f64) {
    let fs2 = Complex64::new(4.0, 0.0);
    let num = zeros.iter().fold(Complex64::new(1.0, 0.0), |acc, z| acc * (fs2 - *z));
    let den = poles.iter().fold(Complex64::new(1.0, 0.0), |acc, p| acc * (fs2 - *p));

    let mut z_d: Vec<Complex64> = zeros.iter().map(|z| (fs2 + *z) / (fs2 - *z)).collect();
    let p_d: Vec<Complex64> = poles.iter().map(|p| (fs2 + *p) / (fs2 - *p)).collect();
    // Zeros at infinity map to Nyquist
    z_d.extend(vec![Complex64::new(-1.0, 0.0); poles.len() - zeros.len()]);

    (z_d, p_d, gain * (num / den).re)
}

/// Group roots into real quadratic factors `[1, c1, c2]`
fn quadratic_factors(roots: &[Complex64]) -> Vec<[f64; 2]> {
    let mut factors = Vec::new();
    let mut reals = Vec::new();

    for r in roots {
        let tol = 1e-9 * r.norm().max(1.0);
        if r.im > tol {
            factors.push([-2.0 * r.re, r.norm_sqr()]);
        } else if r.im.abs() <= tol {
            reals.push(r.re);
        }
        // negative-imaginary roots are the conjugates already counted
    }

    for pair in reals.chunks(2) {
        match pair {
            [r1, r2] => factors.push([-(r1 + r2), r1 * r2]),
            [r] => factors.push([-r, 0.0]),
            _ => unreachable!(),
        }
    }

    factors
}

fn into_sections(zeros: &[Complex64], poles: &[Complex64], gain: f64) -> Vec<Biquad> {
    let num = quadratic_factors(zeros);
    let den = quadratic_factors(poles);
    let count = num.len().max(den.len());

    (0..count)
        .map(|i| {
            let b = num.get(i).copied().unwrap_or([0.0, 0.0]);
            let a = den.get(i).copied().unwrap_or([0.0, 0.0]);
            let k = if i == 0 { gain } else { 1.0 };
            Biquad {
                b0: k,
                b1: k * b[0],
                b2: k * b[1],
                a1: a[0],
                a2: a[1],
            }
        })
        .collect()
}

// ============================================================================
// Zero-phase application
// ============================================================================

/// Run a biquad cascade over `x` with transposed direct form II state
fn sosfilt(sections: &[Biquad], x: &mut [f64], initial: &[[f64; 2]], x0: f64) {
    for (section, zi) in sections.iter().zip(initial) {
        let mut s1 = zi[0] * x0;
        let mut s2 = zi[1] * x0;
        for sample in x.iter_mut() {
            let input = *sample;
            let y = section.b0 * input + s1;
            s1 = section.b1 * input - section.a1 * y + s2;
            s2 = section.b2 * input - section.a2 * y;
            *sample = y;
        }
    }
}

/// Steady-state initial conditions of the cascade for a unit step
fn cascade_initial_state(sections: &[Biquad]) -> Vec<[f64; 2]> {
    let mut scale = 1.0;
    sections
        .iter()
        .map(|s| {
            let [z1, z2] = s.unit_step_state();
            let zi = [z1 * scale, z2 * scale];
            scale *= s.dc_gain();
            zi
        })
        .collect()
}

/// Forward-backward filtering with odd-reflection edge padding
///
/// Output has zero phase and the same length as the input.
pub fn filtfilt(sections: &[Biquad], input: &[f32]) -> Vec<f32> {
    let n = input.len();
    if n == 0 || sections.is_empty() {
        return input.to_vec();
    }

    let taps = 2 * sections.len() + 1;
    let pad = (3 * taps).min(n - 1);
    let first = input[0] as f64;
    let last = input[n - 1] as f64;

    let mut ext = Vec::with_capacity(n + 2 * pad);
    ext.extend((1..=pad).rev().map(|i| 2.0 * first - input[i] as f64));
    ext.extend(input.iter().map(|&s| s as f64));
    ext.extend((1..=pad).map(|i| 2.0 * last - input[n - 1 - i] as f64));

    let zi = cascade_initial_state(sections);

    let x0 = ext[0];
    sosfilt(sections, &mut ext, &zi, x0);

    ext.reverse();
    let x0 = ext[0];
    sosfilt(sections, &mut ext, &zi, x0);
    ext.reverse();

    ext[pad..pad + n].iter().map(|&s| s as f32).collect()
}

// ============================================================================
// Band edge helpers
// ============================================================================

/// Interior band edges after clamping `center ± width/2` to `[0, Nyquist]`
///
/// An edge that touches 0 or Nyquist is returned as `None`. A band that
/// touches both is degenerate.
pub fn clamp_band(
    center_hz: f64,
    width_hz: f64,
    sample_rate: f64,
) -> Result<(Option<f64>, Option<f64>)> {
    let nyquist = sample_rate / 2.0;
    if !(center_hz.is_finite() && width_hz > 0.0 && width_hz.is_finite()) {
        return Err(LadderError::DegenerateFilterWindow {
            center_hz,
            reason: format!("band width {} Hz is not positive", width_hz),
        });
    }

    let eps = nyquist * EDGE_EPSILON;
    let low = (center_hz - width_hz / 2.0).clamp(0.0, nyquist);
    let high = (center_hz + width_hz / 2.0).clamp(0.0, nyquist);

    let low = (low > eps && low < nyquist - eps).then_some(low);
    let high = (high > eps && high < nyquist - eps).then_some(high);

    match (low, high) {
        (None, None) => Err(LadderError::DegenerateFilterWindow {
            center_hz,
            reason: format!("band {:.1} Hz wide covers 0..{:.1} Hz", width_hz, nyquist),
        }),
        edges => Ok(edges),
    }
}

// ============================================================================
// Notch entry point
// ============================================================================

/// Band-rejected copy of `chunk`
///
/// `width` is the quality factor for [`NotchDesign::QFactor`] and the band
/// width in Hz for [`NotchDesign::BandEdges`]. Empty chunks come back
/// unchanged without designing a filter.
///
/// # Example
/// ```
/// use notchladder::dsp::{notch, NotchDesign};
///
/// let chunk: Vec<f32> = (0..800)
///     .map(|i| (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / 8000.0).sin())
///     .collect();
/// let filtered = notch(&chunk, 1000.0, 30.0, 8000, NotchDesign::QFactor).unwrap();
/// assert_eq!(filtered.len(), chunk.len());
/// assert!(notch(&[], 1000.0, 30.0, 8000, NotchDesign::QFactor).unwrap().is_empty());
/// ```
pub fn notch(
    chunk: &[f32],
    center_hz: f64,
    width: f64,
    sample_rate: u32,
    design: NotchDesign,
) -> Result<Vec<f32>> {
    if chunk.is_empty() {
        return Ok(Vec::new());
    }

    let fs = sample_rate as f64;
    let sections = match design {
        NotchDesign::QFactor => vec![iir_notch(center_hz, width, fs)?],
        NotchDesign::BandEdges { order } => {
            let kind = match clamp_band(center_hz, width, fs)? {
                (Some(low), Some(high)) => ButterKind::BandStop(low, high),
                // One-sided rejection once an edge is clamped
                (None, Some(high)) => ButterKind::HighPass(high),
                (Some(low), None) => ButterKind::LowPass(low),
                (None, None) => unreachable!("clamp_band rejects empty bands"),
            };
            butterworth(order, kind, fs)?
        }
    };

    let filtered = filtfilt(&sections, chunk);
    if filtered.iter().any(|s| !s.is_finite()) {
        return Err(LadderError::DegenerateFilterWindow {
            center_hz,
            reason: "filter output is not finite".to_string(),
        });
    }

    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine(freq: f64, sample_rate: f64, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin() as f32)
            .collect()
    }

    fn middle_rms(x: &[f32]) -> f64 {
        let mid = &x[x.len() / 4..3 * x.len() / 4];
        (mid.iter().map(|&s| (s as f64).powi(2)).sum::<f64>() / mid.len() as f64).sqrt()
    }

    #[test]
    fn test_iir_notch_coefficients() {
        // scipy.signal.iirnotch(0.25, 30) at fs = 2
        let c = iir_notch(1000.0, 30.0, 8000.0).unwrap();
        assert_relative_eq!(c.b0, 0.98707844, epsilon = 1e-6);
        assert_relative_eq!(c.b1, -1.39593971, epsilon = 1e-6);
        assert_relative_eq!(c.a2, 0.97415687, epsilon = 1e-6);
        assert_relative_eq!(c.dc_gain(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_iir_notch_rejects_out_of_range_center() {
        assert!(matches!(
            iir_notch(4000.0, 30.0, 8000.0),
            Err(LadderError::DegenerateFilterWindow { .. })
        ));
        assert!(iir_notch(0.0, 30.0, 8000.0).is_err());
        assert!(iir_notch(1000.0, 0.0, 8000.0).is_err());
    }

    #[test]
    fn test_notch_attenuates_center() {
        let x = sine(1000.0, 8000.0, 8000);
        let y = notch(&x, 1000.0, 30.0, 8000, NotchDesign::QFactor).unwrap();
        assert!(middle_rms(&y) < 0.01 * middle_rms(&x));
    }

    #[test]
    fn test_notch_passes_distant_tone() {
        let x = sine(250.0, 8000.0, 8000);
        let y = notch(&x, 1000.0, 30.0, 8000, NotchDesign::QFactor).unwrap();
        assert_relative_eq!(middle_rms(&y), middle_rms(&x), max_relative = 0.01);
    }

    #[test]
    fn test_zero_phase_keeps_alignment() {
        // A zero-phase filter does not shift a passband tone
        let x = sine(200.0, 8000.0, 4000);
        let y = notch(&x, 2000.0, 5.0, 8000, NotchDesign::QFactor).unwrap();
        for i in 1000..3000 {
            assert!((x[i] - y[i]).abs() < 0.02, "sample {} drifted", i);
        }
    }

    #[test]
    fn test_empty_chunk_is_untouched() {
        // Even an impossible design is never built for empty input
        let out = notch(&[], 1e9, -1.0, 8000, NotchDesign::QFactor).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_single_sample_chunk() {
        let out = notch(&[0.5], 1000.0, 30.0, 8000, NotchDesign::QFactor).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_finite());
    }

    #[test]
    fn test_band_stop_attenuates_center() {
        let x = sine(1000.0, 8000.0, 8000);
        let design = NotchDesign::BandEdges { order: 2 };
        let y = notch(&x, 1000.0, 200.0, 8000, design).unwrap();
        assert!(middle_rms(&y) < 0.1 * middle_rms(&x));

        let far = sine(300.0, 8000.0, 8000);
        let y = notch(&far, 1000.0, 200.0, 8000, design).unwrap();
        assert_relative_eq!(middle_rms(&y), middle_rms(&far), max_relative = 0.02);
    }

    #[test]
    fn test_band_stop_degrades_to_low_pass_at_nyquist() {
        // 3800 +/- 400 crosses Nyquist (4000): only the lower edge remains
        let design = NotchDesign::BandEdges { order: 2 };
        let high = sine(3900.0, 8000.0, 8000);
        let y = notch(&high, 3800.0, 800.0, 8000, design).unwrap();
        assert!(middle_rms(&y) < 0.1 * middle_rms(&high));

        let low = sine(500.0, 8000.0, 8000);
        let y = notch(&low, 3800.0, 800.0, 8000, design).unwrap();
        assert_relative_eq!(middle_rms(&y), middle_rms(&low), max_relative = 0.02);
    }

    #[test]
    fn test_band_stop_above_nyquist_is_degenerate() {
        let design = NotchDesign::BandEdges { order: 2 };
        let x = sine(100.0, 1000.0, 100);
        let result = notch(&x, 9000.0, 300.0, 1000, design);
        assert!(matches!(
            result,
            Err(LadderError::DegenerateFilterWindow { .. })
        ));
    }

    #[test]
    fn test_clamp_band() {
        assert_eq!(
            clamp_band(1000.0, 200.0, 8000.0).unwrap(),
            (Some(900.0), Some(1100.0))
        );
        assert_eq!(clamp_band(50.0, 200.0, 8000.0).unwrap(), (None, Some(150.0)));
        assert_eq!(clamp_band(3950.0, 200.0, 8000.0).unwrap(), (Some(3850.0), None));
        assert!(clamp_band(2000.0, 9000.0, 8000.0).is_err());
        assert!(clamp_band(1000.0, 0.0, 8000.0).is_err());
        // Bands entirely outside [0, Nyquist] lose both edges
        assert!(clamp_band(5000.0, 200.0, 8000.0).is_err());
        assert!(clamp_band(-500.0, 200.0, 8000.0).is_err());
    }

    #[test]
    fn test_butterworth_low_pass_dc_gain() {
        let sections = butterworth(3, ButterKind::LowPass(1000.0), 8000.0).unwrap();
        assert_eq!(sections.len(), 2);
        let dc: f64 = sections.iter().map(Biquad::dc_gain).product();
        assert_relative_eq!(dc, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_butterworth_band_pass_blocks_dc() {
        let sections = butterworth(4, ButterKind::BandPass(900.0, 1100.0), 8000.0).unwrap();
        assert_eq!(sections.len(), 4);
        let dc: f64 = sections.iter().map(Biquad::dc_gain).product();
        assert!(dc.abs() < 1e-9);
    }

    #[test]
    fn test_butterworth_band_stop_passes_dc() {
        let sections = butterworth(2, ButterKind::BandStop(900.0, 1100.0), 8000.0).unwrap();
        assert_eq!(sections.len(), 2);
        let dc: f64 = sections.iter().map(Biquad::dc_gain).product();
        assert_relative_eq!(dc, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_width_from_q() {
        assert_eq!(NotchDesign::QFactor.width_from_q(9000.0, 30.0), 30.0);
        assert_eq!(
            NotchDesign::BandEdges { order: 2 }.width_from_q(9000.0, 30.0),
            300.0
        );
    }
}
