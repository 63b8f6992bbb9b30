// ============================================================
//  audiosync.rs — Mesure du décalage (get_lag)
//
//  La capture du micro démarre dès l'appel ; la chanson doit
//  être lancée en arrière-plan juste après. La corrélation est
//  tentée sur des fenêtres croissantes (3, 6, 9, 12, 15 s) et
//  s'arrête à la première dont la confiance est suffisante.
// ============================================================

use anyhow::Result;
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::{
    capture::{Capture, CaptureBuffer},
    config::SyncConfig,
    dsp,
    error::SyncError,
    reference,
};

const POLL_STEP: Duration = Duration::from_millis(50);
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Capacité de mesure du décalage, vue comme une boîte noire par la CLI.
pub trait LagDetector {
    type Output: fmt::Display;

    fn get_lag(&self, song: &str) -> Result<Self::Output>;
}

/// Décalage mesuré entre la référence et l'audio capturé.
/// Positif : la capture est en retard sur la référence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lag {
    pub samples: i64,
    pub sample_rate: u32,
    pub confidence: f32,
}

impl Lag {
    pub fn millis(&self) -> f64 {
        self.samples as f64 * 1000.0 / self.sample_rate as f64
    }
}

impl fmt::Display for Lag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.millis())
    }
}

// ─── Implémentation par défaut : micro + bibliothèque WAV ────────────────────

pub struct AudioSync {
    config: SyncConfig,
}

impl AudioSync {
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(AudioSync { config })
    }
}

impl LagDetector for AudioSync {
    type Output = Lag;

    fn get_lag(&self, song: &str) -> Result<Lag> {
        // Référence cherchée avant d'ouvrir le micro : échec rapide si absente
        let path = reference::locate(&self.config.library, song)?;

        let capture = Capture::start(self.config.device.as_deref(), self.config.sample_rate)?;
        let reference = reference::load(
            &path,
            capture.sample_rate(),
            self.config.max_interval_secs(),
        )?;

        let lag = measure(&reference, &capture, &self.config)?;
        log::info!(
            "décalage {:.2} ms (confiance {:.2}) sur « {} »",
            lag.millis(),
            lag.confidence,
            capture.device_name()
        );
        Ok(lag)
    }
}

/// Boucle des fenêtres : attend que la capture soit assez longue,
/// corrèle, et rend le premier résultat suffisamment fiable.
pub fn measure<C: CaptureBuffer + ?Sized>(
    reference: &[f32],
    capture: &C,
    config: &SyncConfig,
) -> Result<Lag, SyncError> {
    let rate = capture.sample_rate();
    let total = config.intervals_secs.len();
    let mut best = 0.0f32;

    for (i, &secs) in config.intervals_secs.iter().enumerate() {
        let frames = secs as usize * rate as usize;
        wait_for(capture, frames)?;

        let recorded = dsp::highpass_filter(&capture.snapshot(frames), config.highpass_hz, rate);
        let expected = dsp::highpass_filter(
            &reference[..frames.min(reference.len())],
            config.highpass_hz,
            rate,
        );

        let correlation = match dsp::cross_correlate(&expected, &recorded) {
            Ok(c) => c,
            Err(SyncError::SilentSignal) => {
                log::warn!("fenêtre {}/{} ({} s) : signal silencieux, ignorée", i + 1, total, secs);
                continue;
            }
            Err(e) => return Err(e),
        };

        let lag = Lag {
            samples: correlation.lag,
            sample_rate: rate,
            confidence: correlation.confidence,
        };
        log::debug!(
            "fenêtre {}/{} ({} s) : décalage={:.2} ms confiance={:.3} rms={:.4}",
            i + 1,
            total,
            secs,
            lag.millis(),
            lag.confidence,
            dsp::compute_rms(&recorded)
        );

        if lag.confidence >= config.min_confidence {
            return Ok(lag);
        }
        best = best.max(lag.confidence);
    }

    Err(SyncError::NoConfidentLag {
        best,
        required: config.min_confidence,
    })
}

/// Attend que la capture contienne `frames` échantillons.
/// Échoue si le buffer cesse de grossir pendant `STALL_TIMEOUT`.
fn wait_for<C: CaptureBuffer + ?Sized>(capture: &C, frames: usize) -> Result<(), SyncError> {
    let mut last_len = capture.available();
    let mut last_growth = Instant::now();

    while last_len < frames {
        thread::sleep(POLL_STEP);
        let len = capture.available();
        if len > last_len {
            last_len = len;
            last_growth = Instant::now();
        } else if last_growth.elapsed() >= STALL_TIMEOUT {
            return Err(SyncError::CaptureStalled { needed: frames, got: len });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::cell::Cell;

    const RATE: u32 = 8_000;

    /// Capture déjà entièrement enregistrée ; compte les lectures.
    struct Recorded {
        samples: Vec<f32>,
        snapshots: Cell<usize>,
    }

    impl Recorded {
        fn new(samples: Vec<f32>) -> Self {
            Recorded { samples, snapshots: Cell::new(0) }
        }
    }

    impl CaptureBuffer for Recorded {
        fn sample_rate(&self) -> u32 {
            RATE
        }
        fn available(&self) -> usize {
            self.samples.len()
        }
        fn snapshot(&self, n: usize) -> Vec<f32> {
            self.snapshots.set(self.snapshots.get() + 1);
            self.samples[..n.min(self.samples.len())].to_vec()
        }
    }

    fn noise(len: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen_range(-0.5..0.5)).collect()
    }

    fn config(intervals: Vec<u32>, min_confidence: f32) -> SyncConfig {
        SyncConfig {
            sample_rate: RATE,
            intervals_secs: intervals,
            min_confidence,
            ..Default::default()
        }
    }

    #[test]
    fn first_confident_interval_wins() {
        let reference = noise(RATE as usize * 2, 10);
        let mut background = vec![0.0; 400];
        background.extend_from_slice(&reference);
        let capture = Recorded::new(background);

        let lag = measure(&reference, &capture, &config(vec![1, 2], 0.5)).unwrap();
        assert_eq!(lag.samples, 400);
        assert_eq!(lag.millis(), 50.0);
        assert_eq!(capture.snapshots.get(), 1);
    }

    #[test]
    fn uncorrelated_background_is_not_confident() {
        let reference = noise(RATE as usize * 2, 11);
        let capture = Recorded::new(noise(RATE as usize * 2, 12));

        let err = measure(&reference, &capture, &config(vec![1, 2], 0.5)).unwrap_err();
        match err {
            SyncError::NoConfidentLag { best, required } => {
                assert!(best < 0.5);
                assert_eq!(required, 0.5);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(capture.snapshots.get(), 2);
    }

    #[test]
    fn silent_interval_is_skipped() {
        // première seconde silencieuse, la chanson démarre ensuite
        let reference = noise(RATE as usize * 3, 13);
        let mut background = vec![0.0; RATE as usize];
        background.extend_from_slice(&reference[..RATE as usize * 2]);
        let capture = Recorded::new(background);

        let lag = measure(&reference, &capture, &config(vec![1, 3], 0.3)).unwrap();
        assert_eq!(lag.samples, RATE as i64);
        assert_eq!(capture.snapshots.get(), 2);
    }

    #[test]
    fn short_capture_stalls() {
        let reference = noise(RATE as usize, 14);
        let capture = Recorded::new(reference[..100].to_vec());

        let err = measure(&reference, &capture, &config(vec![1], 0.5)).unwrap_err();
        assert!(matches!(err, SyncError::CaptureStalled { needed: 8_000, got: 100 }));
    }

    #[test]
    fn lag_displays_milliseconds() {
        let lag = Lag { samples: -24, sample_rate: 48_000, confidence: 0.9 };
        assert_eq!(lag.to_string(), "-0.50");
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        assert!(AudioSync::new(config(vec![], 0.5)).is_err());
        assert!(AudioSync::new(SyncConfig::default()).is_ok());
    }
}
