// ============================================================
//  error.rs — Erreurs de la mesure de décalage
// ============================================================

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("aucun enregistrement de référence pour « {song} » dans {}", .library.display())]
    ReferenceNotFound { song: String, library: PathBuf },

    #[error("l'enregistrement de référence {} ne contient aucun échantillon", .0.display())]
    EmptyReference(PathBuf),

    #[error("décodage de la référence impossible : {0}")]
    Wav(#[from] hound::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("signal silencieux, rien à corréler")]
    SilentSignal,

    #[error("capture bloquée à {got} échantillons sur {needed} ; le micro est-il actif ?")]
    CaptureStalled { needed: usize, got: usize },

    #[error("aucune fenêtre n'atteint la confiance minimale ({required:.2}) ; meilleure : {best:.2}")]
    NoConfidentLag { best: f32, required: f32 },

    #[error("configuration invalide : {0}")]
    InvalidConfig(String),
}
