// ============================================================
//  config.rs — Paramètres de la mesure
//
//  Remplis depuis la ligne de commande (ou l'environnement),
//  validés avant le premier accès au périphérique audio.
// ============================================================

use std::path::PathBuf;

use crate::error::SyncError;

pub const SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_INTERVALS: [u32; 5] = [3, 6, 9, 12, 15];
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;
pub const DEFAULT_HIGHPASS_HZ: f32 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Dossier contenant les enregistrements de référence (`<titre>.wav`).
    pub library: PathBuf,
    pub sample_rate: u32,
    /// Quantité d'audio (secondes) accumulée avant chaque tentative.
    pub intervals_secs: Vec<u32>,
    pub min_confidence: f32,
    pub highpass_hz: f32,
    /// Sous-chaîne du nom du micro ; `None` → périphérique par défaut.
    pub device: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            library: PathBuf::from("."),
            sample_rate: SAMPLE_RATE,
            intervals_secs: DEFAULT_INTERVALS.to_vec(),
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            highpass_hz: DEFAULT_HIGHPASS_HZ,
            device: None,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.intervals_secs.is_empty() {
            return Err(SyncError::InvalidConfig("au moins une fenêtre est requise".into()));
        }
        if self.intervals_secs.contains(&0) {
            return Err(SyncError::InvalidConfig("les fenêtres doivent être positives".into()));
        }
        if self.intervals_secs.windows(2).any(|w| w[0] >= w[1]) {
            return Err(SyncError::InvalidConfig(
                "les fenêtres doivent être strictement croissantes".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(SyncError::InvalidConfig(format!(
                "confiance minimale {} hors de [0, 1]",
                self.min_confidence
            )));
        }
        if !self.highpass_hz.is_finite() || self.highpass_hz < 0.0 {
            return Err(SyncError::InvalidConfig(format!(
                "coupure passe-haut de {} Hz inutilisable",
                self.highpass_hz
            )));
        }
        if self.sample_rate == 0 {
            return Err(SyncError::InvalidConfig("le taux d'échantillonnage doit être positif".into()));
        }
        Ok(())
    }

    /// Durée de la plus longue fenêtre, soit ce qu'il faut garder de la référence.
    pub fn max_interval_secs(&self) -> u32 {
        self.intervals_secs.iter().copied().max().unwrap_or(0)
    }
}

/// Lit une liste de secondes séparées par des virgules (« 3,6,9 »).
pub fn parse_intervals(text: &str) -> Result<Vec<u32>, SyncError> {
    text.split(',')
        .map(|part| part.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|_| {
            SyncError::InvalidConfig(format!(
                "fenêtres « {text} » : liste de secondes séparées par des virgules attendue"
            ))
        })
}

pub fn parse_confidence(text: &str) -> Result<f32, SyncError> {
    text.trim().parse::<f32>().map_err(|_| {
        SyncError::InvalidConfig(format!("confiance minimale « {text} » : nombre attendu"))
    })
}
