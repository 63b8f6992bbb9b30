// ============================================================
//  audiosync-lag — Décalage d'une chanson jouée en arrière-plan
//
//  Dépendances :
//    cpal     — capture audio cross-platform
//    rustfft  — FFT rapide O(n log n)
//    hound    — lecture des WAV de référence
//    clap     — ligne de commande
// ============================================================

mod audiosync;
mod capture;
mod cli;
mod config;
mod dsp;
mod error;
mod reference;

use anyhow::Result;
use clap::Parser;
use std::io;

use audiosync::AudioSync;
use cli::Cli;

fn main() -> Result<()> {
    let program = cli::program_name(std::env::args_os().next());
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_filter()))
        .init();

    if cli.list_devices {
        for name in capture::input_device_names()? {
            println!("{name}");
        }
        return Ok(());
    }

    let stdout = io::stdout();
    cli::run(&program, &cli, &mut stdout.lock(), AudioSync::new)
}
