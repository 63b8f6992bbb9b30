// ============================================================
//  dsp.rs — Traitement du signal audio
//
//  - Corrélation croisée circulaire par FFT (rustfft)
//  - Filtre passe-haut, RMS
//  - Mixage mono, rééchantillonnage linéaire
// ============================================================

use rustfft::{FftPlanner, num_complex::Complex};
use std::f32::consts::PI;

use crate::error::SyncError;

/// Résultat brut d'une corrélation : décalage en échantillons et pic normalisé.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    pub lag: i64,
    pub confidence: f32,
}

// ─── Corrélation croisée circulaire ──────────────────────────────────────────
//
// xcorr = ifft(conj(fft(ref)) * fft(cap)), les deux signaux étant complétés
// par des zéros jusqu'à 2n pour que la corrélation circulaire ne replie pas.
// Un décalage positif signifie que `capture` est en retard sur `reference`.

pub fn cross_correlate(reference: &[f32], capture: &[f32]) -> Result<Correlation, SyncError> {
    let energy_ref = energy(reference);
    let energy_cap = energy(capture);
    if energy_ref <= f64::EPSILON || energy_cap <= f64::EPSILON {
        return Err(SyncError::SilentSignal);
    }

    let n = reference.len().max(capture.len());
    let size = 2 * n;

    let mut planner = FftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut a = zero_padded(reference, size);
    let mut b = zero_padded(capture, size);
    forward.process(&mut a);
    forward.process(&mut b);

    let mut product: Vec<Complex<f32>> = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| x.conj() * y)
        .collect();
    inverse.process(&mut product);

    // rustfft ne normalise pas : l'aller-retour multiplie par `size`
    let (index, peak) = product
        .iter()
        .enumerate()
        .map(|(i, c)| (i, c.re / size as f32))
        .fold((0usize, 0.0f32), |best, (i, v)| {
            if v.abs() > best.1.abs() { (i, v) } else { best }
        });

    let lag = if index < n {
        index as i64
    } else {
        index as i64 - size as i64
    };
    let confidence = (peak.abs() as f64 / (energy_ref * energy_cap).sqrt()).min(1.0) as f32;

    Ok(Correlation { lag, confidence })
}

fn zero_padded(samples: &[f32], size: usize) -> Vec<Complex<f32>> {
    let mut buf = vec![Complex::new(0.0, 0.0); size];
    for (slot, &s) in buf.iter_mut().zip(samples) {
        slot.re = s;
    }
    buf
}

fn energy(samples: &[f32]) -> f64 {
    samples.iter().map(|&x| x as f64 * x as f64).sum()
}

// ─── Filtre passe-haut (IIR 1er ordre) ───────────────────────────────────────
//
// Élimine le ronflement ambiant capté par le micro (ventilateurs, vibrations)
// avant la corrélation. Cutoff par défaut : 30 Hz.

pub fn highpass_filter(samples: &[f32], cutoff_hz: f32, sample_rate: u32) -> Vec<f32> {
    if cutoff_hz <= 0.0 {
        return samples.to_vec();
    }
    let alpha = 1.0 / (1.0 + 2.0 * PI * cutoff_hz / sample_rate as f32);
    let mut out = Vec::with_capacity(samples.len());
    let mut prev_in = 0.0f32;
    let mut prev_out = 0.0f32;

    for &x in samples {
        let y = alpha * (prev_out + x - prev_in);
        prev_in = x;
        prev_out = y;
        out.push(y);
    }
    out
}

// ─── RMS ─────────────────────────────────────────────────────────────────────

pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|x| x * x).sum();
    (sum / samples.len() as f32).sqrt()
}

// ─── Mixage multicanal → mono ────────────────────────────────────────────────

pub fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

// ─── Rééchantillonnage linéaire ──────────────────────────────────────────────

pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * to_rate as u64 / from_rate as u64) as usize;
    let step = from_rate as f64 / to_rate as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let i0 = (pos.floor() as usize).min(last);
            let i1 = (i0 + 1).min(last);
            let frac = (pos - i0 as f64) as f32;
            samples[i0] * (1.0 - frac) + samples[i1] * frac
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    fn noise(len: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect()
    }

    #[test]
    fn finds_delayed_capture() {
        let reference = noise(4_000, 1);
        let mut capture = vec![0.0; 250];
        capture.extend_from_slice(&reference[..4_000 - 250]);

        let c = cross_correlate(&reference, &capture).unwrap();
        assert_eq!(c.lag, 250);
        assert!(c.confidence > 0.9, "confidence {}", c.confidence);
    }

    #[test]
    fn finds_early_capture() {
        let reference = noise(4_000, 2);
        let capture = reference[100..].to_vec();

        let c = cross_correlate(&reference, &capture).unwrap();
        assert_eq!(c.lag, -100);
        assert!(c.confidence > 0.9);
    }

    #[test]
    fn identical_signals_have_full_confidence() {
        let signal = noise(1_024, 3);
        let c = cross_correlate(&signal, &signal).unwrap();
        assert_eq!(c.lag, 0);
        assert!((c.confidence - 1.0).abs() < 1e-3);
    }

    #[test]
    fn unrelated_noise_has_low_confidence() {
        let c = cross_correlate(&noise(8_000, 4), &noise(8_000, 5)).unwrap();
        assert!(c.confidence < 0.2, "confidence {}", c.confidence);
    }

    #[test]
    fn silence_is_rejected() {
        let silent = vec![0.0; 512];
        assert!(matches!(
            cross_correlate(&noise(512, 6), &silent),
            Err(SyncError::SilentSignal)
        ));
        assert!(matches!(cross_correlate(&[], &[]), Err(SyncError::SilentSignal)));
    }

    #[test]
    fn highpass_removes_dc() {
        let dc = vec![0.5f32; 48_000];
        let out = highpass_filter(&dc, 30.0, 48_000);
        assert!(out[47_999].abs() < 1e-3);
        assert_eq!(highpass_filter(&dc, 0.0, 48_000), dc);
    }

    #[test]
    fn rms_of_square_wave() {
        let square: Vec<f32> = (0..100).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        assert!((compute_rms(&square) - 0.5).abs() < 1e-6);
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn downmix_averages_frames() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.25, -0.25], 1), vec![0.25, -0.25]);
    }

    #[test]
    fn resample_changes_length_and_interpolates() {
        let ramp: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let up = resample_linear(&ramp, 24_000, 48_000);
        assert_eq!(up.len(), 200);
        assert!((up[1] - 0.5).abs() < 1e-6);

        let down = resample_linear(&ramp, 48_000, 24_000);
        assert_eq!(down.len(), 50);
        assert_eq!(down[10], 20.0);
    }
}
