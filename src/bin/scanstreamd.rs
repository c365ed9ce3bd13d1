//! scanstreamd - live scanning pipeline daemon
//!
//! Runs the full pipeline against the configured camera device:
//! 1. Captures frames into the single-slot frame buffer
//! 2. Runs barcode detection with at most one call in flight
//! 3. Pumps detection events on this thread (the designated callback context)
//! 4. Logs workflow transitions and detected barcodes
//!
//! Stops on Ctrl-C, or after --max-detections distinct barcodes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};

use anyhow::Result;
use clap::Parser;

use scanstream::{ScanSession, ScanstreamConfig, WorkflowState};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON config file.
    #[arg(long, env = "SCANSTREAM_CONFIG")]
    config: Option<PathBuf>,
    /// Exit after this many distinct detected barcodes (0 = run until Ctrl-C).
    #[arg(long, default_value_t = 0)]
    max_detections: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = ScanstreamConfig::load_from(args.config.as_deref())?;
    log::info!(
        "scanstreamd {} starting: device={} {}x{}@{}fps",
        env!("CARGO_PKG_VERSION"),
        config.camera.device,
        config.camera.width,
        config.camera.height,
        config.camera.target_fps
    );

    let mut session = ScanSession::new(config.camera.clone());

    session.workflow().subscribe_state(|state| {
        log::info!("workflow state: {:?}", state);
    });

    let detections = Arc::new(AtomicU64::new(0));
    {
        let detections = detections.clone();
        session.workflow().subscribe_detected(move |barcode| {
            let n = detections.fetch_add(1, Ordering::SeqCst) + 1;
            log::info!(
                "detected barcode #{}: {} ({:?})",
                n,
                barcode.raw_value,
                barcode.format
            );
        });
    }

    session.resume()?;

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!("scanstreamd running (Ctrl-C to stop)");
    loop {
        // Wait for one event, then drain whatever else is already queued so
        // the loop reacts to the freshest state.
        session.pump(config.pump_timeout);
        session.pump_pending();
        if rx.try_recv().is_ok() {
            log::info!("shutdown signal received");
            break;
        }
        if args.max_detections > 0 && detections.load(Ordering::SeqCst) >= args.max_detections {
            log::info!("reached {} detections, exiting", args.max_detections);
            break;
        }
        // Entering Detected freezes the preview; a daemon has no user to
        // dismiss the result, so go back to scanning.
        if session.workflow().workflow_state() == WorkflowState::Detected {
            session.resume()?;
        }
    }

    session.pause();
    session.close();
    log::info!(
        "scanstreamd stopped after {} detections",
        detections.load(Ordering::SeqCst)
    );
    Ok(())
}
