//! `imgshuttle` binary entry point.

// This binary's whole job is printing a run summary to the user.
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;
mod config;
mod error;
mod orchestrator;

use imgshuttle_core::CancelToken;

pub use error::{Error, Result};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("imgshuttle panicked: {panic_info}");
    }));

    let exit_code = run().await;
    std::process::exit(exit_code);
}

/// Ctrl-C only requests cancellation; it never drops `real_main`'s
/// future out from under it. That would abort whatever blob/manifest
/// operations happen to be in flight, which spec.md §5 says must be
/// allowed to complete ("on cancel, in-flight operations are allowed to
/// complete; no new operations start").
async fn run() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cancel = CancelToken::new();
    let watcher = tokio::spawn(watch_ctrl_c(cancel.clone()));

    let exit_code = match real_main(cancel).await {
        Ok(()) => 0,
        Err(err) => {
            if !err.is_cancelled() {
                eprintln!("imgshuttle: {err}");
            }
            err.exit_code()
        }
    };
    watcher.abort();
    exit_code
}

async fn watch_ctrl_c(cancel: CancelToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("imgshuttle: cancellation requested, finishing in-flight operations");
        cancel.cancel();
    }
}

async fn real_main(cancel: CancelToken) -> Result<()> {
    let args = cli::parse();
    let config = args.into_config()?;
    let summary = orchestrator::run(config, cancel).await?;

    println!("copied {} image(s)", summary.images_copied);
    if !summary.skipped.is_empty() {
        println!("skipped {} non-distributable blob(s)", summary.skipped.len());
    }
    if let Some(path) = &summary.lock_output_written_to {
        println!("lock output written to {path}");
    }

    Ok(())
}
