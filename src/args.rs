//! Cli manager

// Imports
use std::path::PathBuf;

/// Data from the command line
#[derive(PartialEq, Eq, Clone, Default, Debug)]
#[derive(clap::Parser)]
#[clap(author, version, about)]
pub struct Args {
	/// Directory to run the build in.
	///
	/// All paths in the build file are relative to it.
	/// Defaults to the current directory.
	#[clap(long = "dir", short = 'C', global = true)]
	pub dir: Option<PathBuf>,

	/// Build file, relative to the build directory.
	///
	/// Defaults to `build.ninja`
	#[clap(long = "file", short = 'f', global = true)]
	pub build_file: Option<String>,

	/// Number of concurrent jobs.
	///
	/// Defaults to available parallelism
	#[clap(long = "jobs", short = 'j', global = true)]
	pub jobs: Option<usize>,

	/// Prints full commands instead of their descriptions
	#[clap(long = "verbose", short = 'v', global = true)]
	pub verbose: bool,

	/// Command to run.
	///
	/// Defaults to building the default targets
	#[clap(subcommand)]
	pub command: Option<Command>,
}

/// Command
#[derive(PartialEq, Eq, Clone, Debug)]
#[derive(clap::Subcommand)]
pub enum Command {
	/// Builds targets
	Build {
		/// All targets to build.
		///
		/// If empty, uses default targets.
		targets: Vec<String>,
	},

	/// Lists targets
	Targets {
		/// Lists all outputs, instead of just root outputs
		#[clap(long = "all")]
		all: bool,
	},

	/// Removes built files
	Clean {
		/// Targets to clean.
		///
		/// If empty, cleans everything.
		targets: Vec<String>,
	},

	/// Lists the commands needed to build targets
	Commands {
		/// Targets to list the commands of.
		///
		/// If empty, uses default targets.
		targets: Vec<String>,
	},

	/// Prints the version
	Version,
}
