//! `Knit` build executor

// Modules
mod logger;

// Imports
use {
	clap::Parser,
	futures::future,
	knit::{AppError, Args, ExitResult},
};

#[tokio::main]
async fn main() -> ExitResult {
	// Initialize the logger
	logger::init();

	// Get all args
	let args = Args::parse();
	tracing::trace!(?args, "Arguments");

	// Note: On interruption we exit right away, dropping all running commands
	tokio::select! {
		res = knit::run(args) => res.into(),
		() = self::interrupted() => ExitResult::Err(AppError::Interrupted),
	}
}

/// Waits until we're interrupted
async fn interrupted() {
	let ctrl_c = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			tracing::warn!(?err, "Unable to listen for ctrl-c");
			future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				let _: Option<()> = signal.recv().await;
			},
			Err(err) => {
				tracing::warn!(?err, "Unable to listen for termination");
				future::pending::<()>().await;
			},
		}
	};
	#[cfg(not(unix))]
	let terminate = future::pending::<()>();

	tokio::select! {
		() = ctrl_c => (),
		() = terminate => (),
	}
}
