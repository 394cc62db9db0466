mod audio;
#[cfg(target_os = "linux")]
mod tun;

use acoustic_ip_core::{RxWorker, TxWorker};
use audio::{CpalAudioSink, CpalAudioSource};
use clap::Parser;
use log::{error, info};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
#[cfg(target_os = "linux")]
use tun::LinuxTun;

#[derive(Parser)]
#[command(name = "acoustic-ip")]
#[command(about = "Carries IP packets over a speaker/microphone link using acoustic FSK")]
#[command(version)]
struct Cli {
    /// TUN interface name to create or bind
    #[arg(value_name = "IFACE", default_value = "tun0")]
    iface: String,
}

#[cfg(not(target_os = "linux"))]
fn main() -> ExitCode {
    env_logger::init();
    error!("acoustic-ip requires a Linux TUN device and only runs on Linux");
    ExitCode::FAILURE
}

#[cfg(target_os = "linux")]
fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let tx_tun = match LinuxTun::open(&cli.iface) {
        Ok(tun) => tun,
        Err(err) => {
            error!("failed to open TUN interface {:?}: {err}", cli.iface);
            return ExitCode::FAILURE;
        }
    };
    let rx_tun = match tx_tun.try_clone() {
        Ok(tun) => tun,
        Err(err) => {
            error!("failed to duplicate TUN handle for receive worker: {err}");
            return ExitCode::FAILURE;
        }
    };

    let (sink, _sink_stream) = match CpalAudioSink::open() {
        Ok(opened) => opened,
        Err(err) => {
            error!("failed to open audio output device: {err}");
            return ExitCode::FAILURE;
        }
    };
    let (source, _source_stream) = match CpalAudioSource::open() {
        Ok(opened) => opened,
        Err(err) => {
            error!("failed to open audio input device: {err}");
            return ExitCode::FAILURE;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let ctrlc_running = running.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        info!("received interrupt, shutting down");
        ctrlc_running.store(false, Ordering::SeqCst);
    }) {
        error!("failed to install Ctrl-C handler: {err}");
        return ExitCode::FAILURE;
    }

    info!("bridging {:?} to the default audio device", cli.iface);

    let tx_running = running.clone();
    let tx_handle = thread::spawn(move || {
        let mut worker = TxWorker::new(tx_tun, sink);
        worker.run(&tx_running);
    });

    let rx_running = running.clone();
    let rx_handle = thread::spawn(move || {
        let mut worker = RxWorker::new(rx_tun, source);
        worker.run(&rx_running);
    });

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_secs(1));
    }

    if tx_handle.join().is_err() {
        error!("transmit worker thread panicked");
    }
    if rx_handle.join().is_err() {
        error!("receive worker thread panicked");
    }

    ExitCode::SUCCESS
}
