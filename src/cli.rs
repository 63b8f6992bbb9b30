// ============================================================
//  cli.rs — Ligne de commande
//
//  Un seul argument positionnel : le titre de la chanson.
//  Les options configurent la mesure et ne comptent pas
//  dans le nombre d'arguments.
// ============================================================

use anyhow::Result;
use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use crate::{
    audiosync::LagDetector,
    config::{self, DEFAULT_HIGHPASS_HZ, SAMPLE_RATE, SyncConfig},
    error::SyncError,
};

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Mesure le décalage d'une chanson jouée en arrière-plan")]
pub struct Cli {
    /// Titre de la chanson ; un seul est attendu
    #[arg(value_name = "SONG_NAME", allow_hyphen_values = true)]
    pub songs: Vec<String>,

    /// Dossier des enregistrements de référence (<titre>.wav)
    #[arg(long, env = "AUDIOSYNC_LIBRARY", default_value = ".")]
    pub library: PathBuf,

    /// Micro à utiliser (sous-chaîne de son nom)
    #[arg(long, env = "AUDIOSYNC_DEVICE")]
    pub device: Option<String>,

    // Gardés en texte : une valeur invalide venue de l'environnement ne doit
    // pas empêcher l'affichage de l'aide, elle est rejetée après l'arité.

    /// Secondes d'audio accumulées avant chaque corrélation (liste séparée par des virgules)
    #[arg(long, env = "AUDIOSYNC_INTERVALS", default_value = "3,6,9,12,15")]
    pub intervals: String,

    /// Pic de corrélation normalisé minimal pour accepter un résultat
    #[arg(long, env = "AUDIOSYNC_MIN_CONFIDENCE", default_value = "0.5")]
    pub min_confidence: String,

    /// Coupure du passe-haut avant corrélation, en Hz (0 le désactive)
    #[arg(long, default_value_t = DEFAULT_HIGHPASS_HZ)]
    pub highpass: f32,

    /// Liste les micros disponibles puis quitte
    #[arg(long)]
    pub list_devices: bool,

    /// Journal plus détaillé sur stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Le titre, si et seulement si un seul argument positionnel a été donné.
    pub fn song(&self) -> Option<&str> {
        match self.songs.as_slice() {
            [song] => Some(song.as_str()),
            _ => None,
        }
    }

    pub fn sync_config(&self) -> Result<SyncConfig, SyncError> {
        Ok(SyncConfig {
            library: self.library.clone(),
            sample_rate: SAMPLE_RATE,
            intervals_secs: config::parse_intervals(&self.intervals)?,
            min_confidence: config::parse_confidence(&self.min_confidence)?,
            highpass_hz: self.highpass,
            device: self.device.clone(),
        })
    }

    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

/// Nom du programme pour l'aide ; argv[0] peut ne pas être de l'UTF-8.
pub fn program_name(argv0: Option<OsString>) -> String {
    argv0
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audiosync-lag".into())
}

pub fn usage(program: &str) -> String {
    format!(
        "Usage: {program} \"SONG_NAME\"\n\
         After running audiosync.get_lag, start playing the song in the background."
    )
}

/// Contrôle l'arité, puis délègue à la mesure et affiche son résultat.
/// Une mauvaise arité n'est pas une erreur : l'aide est affichée et rien n'est lancé.
pub fn run<D, F, W>(program: &str, cli: &Cli, out: &mut W, build: F) -> Result<()>
where
    D: LagDetector,
    F: FnOnce(SyncConfig) -> Result<D>,
    W: Write,
{
    let Some(song) = cli.song() else {
        writeln!(out, "{}", usage(program))?;
        return Ok(());
    };

    let detector = build(cli.sync_config()?)?;

    // La chanson doit démarrer en arrière-plan après cette ligne
    writeln!(out, "Running audiosync.get_lag")?;
    out.flush()?;

    let ret = detector.get_lag(song)?;
    writeln!(out, "Returned value: {}", ret)?;
    Ok(())
}
