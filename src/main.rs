use chrono::Local;
use evomal::param;
use evomal::run;
use flexi_logger::{FileSpec, Logger, WriteMode};
use log::{error, info, warn};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn main() {
    let param_file = std::env::args().nth(1).unwrap_or_else(|| "param.yaml".to_string());

    let param = match param::get(param_file.clone()) {
        Ok(param) => param,
        Err(e) => {
            eprintln!("Cannot load parameters from {}: {}", param_file, e);
            process::exit(1);
        }
    };

    let logger = if !param.general.log_base.is_empty() {
        let timestamp = Local::now().format("%Y-%m-%d_%H-%M-%S").to_string();
        Logger::try_with_str(&param.general.log_level).map(|logger| {
            logger
                .log_to_file(
                    FileSpec::default()
                        .basename(&param.general.log_base)
                        .discriminant(timestamp)
                        .suffix(&param.general.log_suffix)
                        .suppress_timestamp(),
                )
                .write_mode(WriteMode::BufferAndFlush)
        })
    } else {
        Logger::try_with_str(&param.general.log_level).map(|logger| logger.log_to_stderr())
    };

    // keep the handle alive so buffered lines are flushed on exit
    let logger_handle = match logger.and_then(|logger| logger.start()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Cannot start logger: {}", e);
            process::exit(1);
        }
    };

    info!("evomal v{}", evomal::version());

    // Ctrl-C and SIGTERM stop the search at the end of the current generation
    let running = Arc::new(AtomicBool::new(true));
    match Signals::new([SIGINT, SIGTERM]) {
        Ok(mut signals) => {
            let running = Arc::clone(&running);
            thread::spawn(move || {
                for signal in signals.forever() {
                    warn!("Signal {} received, stopping after the current generation...", signal);
                    running.store(false, Ordering::Relaxed);
                }
            });
        }
        Err(e) => error!("Cannot register signal handlers: {}", e),
    }

    let outcome = run(&param, running);

    match outcome {
        Ok(result) => {
            println!("{}", result.display_results());
            if !param.general.save_exp.is_empty() {
                if let Err(e) = result.save_report(&param.general.save_exp) {
                    error!("Failed to save report: {}", e);
                }
            }
        }
        Err(e) => {
            error!("Pipeline failed: {}", e);
            logger_handle.flush();
            process::exit(1);
        }
    }
}
