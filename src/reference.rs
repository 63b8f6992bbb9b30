// ============================================================
//  reference.rs — Enregistrement de référence de la chanson
//
//  Les références sont des fichiers `<titre>.wav` rangés dans
//  un dossier « bibliothèque ». Le titre n'est jamais concaténé
//  à un chemin : on parcourt le dossier et on compare les noms.
// ============================================================

use std::fs;
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};

use crate::dsp;
use crate::error::SyncError;

/// Trouve le WAV dont le nom (sans extension) correspond au titre.
/// Une correspondance exacte l'emporte sur une correspondance sans casse.
pub fn locate(library: &Path, song: &str) -> Result<PathBuf, SyncError> {
    let song = song.trim();
    let mut candidates: Vec<PathBuf> = fs::read_dir(library)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_wav(p))
        .collect();
    candidates.sort();

    let stem = |p: &PathBuf| {
        p.file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_owned)
            .unwrap_or_default()
    };

    candidates
        .iter()
        .find(|p| stem(p) == song)
        .or_else(|| candidates.iter().find(|p| stem(p).eq_ignore_ascii_case(song)))
        .cloned()
        .ok_or_else(|| SyncError::ReferenceNotFound {
            song: song.to_string(),
            library: library.to_path_buf(),
        })
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}

/// Décode le WAV en mono f32 au taux `sample_rate`, limité à `max_secs` secondes.
pub fn load(path: &Path, sample_rate: u32, max_secs: u32) -> Result<Vec<f32>, SyncError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;
    let limit = max_secs as usize * spec.sample_rate as usize * channels;

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .take(limit)
            .collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .take(limit)
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mono = dsp::downmix(&interleaved, channels);
    let mut samples = dsp::resample_linear(&mono, spec.sample_rate, sample_rate);
    samples.truncate(max_secs as usize * sample_rate as usize);

    if samples.is_empty() {
        return Err(SyncError::EmptyReference(path.to_path_buf()));
    }

    log::info!(
        "référence {} : {} Hz, {} canal(aux), {} échantillons gardés",
        path.display(),
        spec.sample_rate,
        channels,
        samples.len()
    );
    Ok(samples)
}
