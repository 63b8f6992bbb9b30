// ============================================================
//  capture.rs — Enregistrement de l'audio d'arrière-plan via cpal
//
//  - Capture continue depuis le micro (par défaut ou choisi par nom)
//  - Conversion f32 + mixage mono dans un buffer partagé
//  - Support : WASAPI (Windows), CoreAudio (macOS), ALSA (Linux)
// ============================================================

use anyhow::{Context, Result, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SampleRate, SizedSample, StreamConfig};
use std::sync::{Arc, Mutex};

use crate::dsp;

/// Source d'échantillons mono qui grossit pendant la mesure.
pub trait CaptureBuffer {
    fn sample_rate(&self) -> u32;
    /// Nombre d'échantillons enregistrés jusqu'ici.
    fn available(&self) -> usize;
    /// Copie des `n` premiers échantillons (moins s'il n'y en a pas assez).
    fn snapshot(&self, n: usize) -> Vec<f32>;
}

/// Enregistrement en cours ; s'arrête quand la valeur est détruite.
pub struct Capture {
    _stream: cpal::Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    device_name: String,
}

impl Capture {
    /// Ouvre le périphérique d'entrée et démarre l'enregistrement immédiatement.
    /// `device` : sous-chaîne du nom du micro, sinon périphérique par défaut.
    pub fn start(device: Option<&str>, sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let input_device = match device {
            Some(wanted) => host
                .input_devices()
                .context("Impossible de lister les périphériques d'entrée")?
                .find(|d| d.name().map(|n| n.contains(wanted)).unwrap_or(false))
                .with_context(|| format!("Aucun périphérique d'entrée ne correspond à « {wanted} »"))?,
            None => host
                .default_input_device()
                .context("Aucun microphone disponible. Branchez un micro et réessayez.")?,
        };
        let device_name = input_device.name().unwrap_or_else(|_| "Inconnu".into());

        let (in_config, format) = find_input_config(&input_device, SampleRate(sample_rate))
            .context("Aucune configuration d'entrée utilisable")?;

        let buffer: Arc<Mutex<Vec<f32>>> = Arc::new(Mutex::new(Vec::new()));

        // Le callback dépend du format natif : tout est converti en f32
        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&input_device, &in_config, &buffer),
            SampleFormat::I16 => build_stream::<i16>(&input_device, &in_config, &buffer),
            SampleFormat::U16 => build_stream::<u16>(&input_device, &in_config, &buffer),
            SampleFormat::I32 => build_stream::<i32>(&input_device, &in_config, &buffer),
            SampleFormat::U8 => build_stream::<u8>(&input_device, &in_config, &buffer),
            other => bail!("Format d'échantillon non pris en charge : {other}"),
        }
        .with_context(|| format!("Impossible d'ouvrir le flux d'entrée sur {device_name}"))?;

        stream.play().context("Impossible de démarrer l'enregistrement")?;

        log::info!(
            "enregistrement depuis « {} » : {} Hz, {} canal(aux), {}",
            device_name,
            in_config.sample_rate.0,
            in_config.channels,
            format
        );

        Ok(Capture {
            _stream: stream,
            buffer,
            sample_rate: in_config.sample_rate.0,
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl CaptureBuffer for Capture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn available(&self) -> usize {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn snapshot(&self, n: usize) -> Vec<f32> {
        let buf = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buf[..n.min(buf.len())].to_vec()
    }
}

// ─── Utilitaires internes ─────────────────────────────────────────────────────

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    buffer: &Arc<Mutex<Vec<f32>>>,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let buf_clone = Arc::clone(buffer);

    device.build_input_stream(
        config,
        move |data: &[T], _| {
            let mono = to_mono(data, channels);
            let mut buf = buf_clone.lock().unwrap_or_else(|e| e.into_inner());
            buf.extend_from_slice(&mono);
        },
        |e| log::warn!("Erreur entrée audio : {}", e),
        None,
    )
}

/// Convertit un bloc entrelacé dans n'importe quel format en mono f32.
fn to_mono<T>(data: &[T], channels: usize) -> Vec<f32>
where
    T: Sample,
    f32: FromSample<T>,
{
    let samples: Vec<f32> = data.iter().map(|&s| s.to_sample::<f32>()).collect();
    dsp::downmix(&samples, channels)
}

/// Cherche une config au taux voulu sur le micro, en F32 de préférence,
/// sinon dans n'importe quel format ; en dernier recours la config par défaut.
fn find_input_config(
    device: &cpal::Device,
    desired_rate: SampleRate,
) -> Result<(StreamConfig, SampleFormat)> {
    let at_rate: Vec<_> = device
        .supported_input_configs()?
        .filter(|s| s.min_sample_rate() <= desired_rate && s.max_sample_rate() >= desired_rate)
        .collect();

    let chosen = at_rate
        .iter()
        .find(|s| s.sample_format() == SampleFormat::F32)
        .or_else(|| at_rate.first());

    if let Some(supported) = chosen {
        let config = StreamConfig {
            channels: supported.channels().min(2),
            sample_rate: desired_rate,
            buffer_size: cpal::BufferSize::Default,
        };
        return Ok((config, supported.sample_format()));
    }

    let conf = device.default_input_config()?;
    log::warn!(
        "pas d'entrée à {} Hz, utilisation de la config par défaut ({} Hz, {})",
        desired_rate.0,
        conf.sample_rate().0,
        conf.sample_format()
    );
    Ok((conf.config(), conf.sample_format()))
}

/// Noms des périphériques d'entrée disponibles.
pub fn input_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let names = host
        .input_devices()
        .context("Impossible de lister les périphériques d'entrée")?
        .map(|d| d.name().unwrap_or_else(|_| "Inconnu".into()))
        .collect();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i16_frames_are_converted_and_downmixed() {
        let stereo: [i16; 4] = [i16::MAX, i16::MAX, i16::MIN, 0];
        let mono = to_mono(&stereo, 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 1.0).abs() < 1e-3);
        assert!((mono[1] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn u16_midpoint_is_silence() {
        let mono = to_mono(&[32_768u16, 0, u16::MAX], 1);
        assert!(mono[0].abs() < 1e-6);
        assert!((mono[1] + 1.0).abs() < 1e-6);
        assert!((mono[2] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn f32_frames_pass_through() {
        assert_eq!(to_mono(&[0.25f32, -0.75], 1), vec![0.25, -0.75]);
    }
}
