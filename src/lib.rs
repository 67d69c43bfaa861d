//! `Knit` build executor

// Lints
#![allow(
	clippy::print_stdout,
	clippy::print_stderr,
	reason = "We're a binary that should talk to the user"
)]

// Modules
mod args;
mod build;
mod build_log;
mod depfile;
mod dirty;
mod error;
mod fs;
mod graph;
mod lexer;
mod parser;
mod scope;
mod session;
mod template;
mod util;

// Exports
pub use self::{
	args::{Args, Command},
	error::{AppError, ExitResult},
};

// Imports
use {
	self::session::Session,
	std::{path::Path, thread},
};

/// Default build file
pub const DEFAULT_BUILD_FILE: &str = "build.ninja";

pub async fn run(args: Args) -> Result<(), AppError> {
	let root = args.dir.as_deref().unwrap_or_else(|| Path::new("."));
	let build_file = args.build_file.as_deref().unwrap_or(DEFAULT_BUILD_FILE);
	tracing::debug!(?root, ?build_file, "Found build file");

	let command = args.command.unwrap_or(Command::Build { targets: vec![] });
	match command {
		Command::Build { targets } => {
			// Get the max number of jobs we can execute at once
			let jobs = match args.jobs {
				Some(0) => {
					tracing::warn!("Cannot use 0 jobs, defaulting to 1");
					1
				},
				Some(jobs) => jobs,
				None => thread::available_parallelism()
					.map_err(AppError::get_default_jobs())?
					.into(),
			};
			tracing::debug!(?jobs, "Concurrent jobs");

			let mut session = Session::load(root, build_file).await?;
			session.build(&targets, jobs, args.verbose).await
		},

		Command::Targets { all } => {
			let session = Session::load(root, build_file).await?;
			for (path, rule) in session.targets(all) {
				println!("{path}: {rule}");
			}

			Ok(())
		},

		Command::Clean { targets } => {
			let session = Session::load(root, build_file).await?;
			let removed = session.clean(&targets).await?;
			println!("Cleaning... {removed} files.");

			Ok(())
		},

		Command::Commands { targets } => {
			let session = Session::load(root, build_file).await?;
			for command in session.commands(&targets)? {
				println!("{command}");
			}

			Ok(())
		},

		Command::Version => {
			println!("{}", env!("CARGO_PKG_VERSION"));
			Ok(())
		},
	}
}
