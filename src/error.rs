//! Errors

// Imports
use {
	crate::lexer::{LexError, TokenKind},
	itertools::Itertools,
	std::{
		error::Error as StdError,
		fmt,
		io,
		path::PathBuf,
		process::{ExitCode, Termination},
	},
};

/// App error
///
/// Error that will be bubbled up to main when a fatal error occurs
#[derive(Debug, thiserror::Error)]
pub enum AppError {
	/// Read file
	#[error("Unable to read file {file_path:?}")]
	ReadFile {
		/// File we failed to read
		file_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Syntax error in a build file
	#[error("{}:{line}:{column}: {kind}", .file_path.display())]
	Syntax {
		/// Build file
		file_path: PathBuf,

		/// Line (1-based)
		line: usize,

		/// Column (1-based)
		column: usize,

		/// Kind
		kind: SyntaxError,
	},

	/// Dependency cycle
	#[error("Dependency cycle: {}", .cycle.join(" -> "))]
	DependencyCycle {
		/// All paths in the cycle, the first and last being the same
		cycle: Vec<String>,
	},

	/// Stat file
	#[error("Unable to stat {file_path:?}")]
	StatFile {
		/// File we failed to stat
		file_path: String,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Missing inputs
	#[error("{}", .missing.iter().join("\n"))]
	MissingInputs {
		/// All missing inputs
		missing: Vec<MissingInput>,
	},

	/// Dependency file missing `:`
	#[error("Dependency file {dep_file_path:?} was missing a `:`")]
	DepFileMissingColon {
		/// Dep file path
		dep_file_path: PathBuf,
	},

	/// Dependency file missing edge output
	#[error("Dependency file {dep_file_path:?} has output {dep_output:?}, expected one of {edge_outputs:?}")]
	DepFileMissingOutputs {
		/// Dep file path
		dep_file_path: PathBuf,

		/// Edge outputs
		edge_outputs: Vec<String>,

		/// Dependency output
		dep_output: String,
	},

	/// Unknown target
	#[error("Unknown target {target:?}")]
	UnknownTarget {
		/// Target
		target: String,
	},

	/// Get default jobs
	#[error("Unable to query system for available parallelism for default number of jobs")]
	GetDefaultJobs {
		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Build failed
	#[error("Build failed: {failed} command(s) failed")]
	BuildFailed {
		/// Number of failed commands
		failed: usize,
	},

	/// Open build log
	#[error("Unable to open build log {log_path:?}")]
	OpenBuildLog {
		/// Build log path
		log_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Write build log
	#[error("Unable to write to build log {log_path:?}")]
	WriteBuildLog {
		/// Build log path
		log_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Remove file
	#[error("Unable to remove {file_path:?}")]
	RemoveFile {
		/// File we failed to remove
		file_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Create directory
	#[error("Unable to create directory {dir_path:?}")]
	CreateDir {
		/// Directory we failed to create
		dir_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Write file
	#[error("Unable to write file {file_path:?}")]
	WriteFile {
		/// File we failed to write
		file_path: PathBuf,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Spawn command
	#[error("Unable to spawn {command:?}")]
	SpawnCommand {
		/// Command we failed to spawn
		command: String,

		/// Underlying error
		#[source]
		err: io::Error,
	},

	/// Interrupted
	#[error("Interrupted")]
	Interrupted,
}

/// Error shortcuts
///
/// These are functions that return functions to pass to `.map_err` to
/// specify a certain error.
impl AppError {
	pub fn read_file(file_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::ReadFile {
			file_path: file_path.into(),
			err,
		}
	}

	pub fn syntax(file_path: impl Into<PathBuf>) -> impl FnOnce(LexError) -> Self {
		move |err| Self::Syntax {
			file_path: file_path.into(),
			line:      err.loc.line,
			column:    err.loc.column,
			kind:      err.kind,
		}
	}

	pub fn stat_file(file_path: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::StatFile {
			file_path: file_path.into(),
			err,
		}
	}

	pub fn get_default_jobs() -> impl FnOnce(io::Error) -> Self {
		move |err| Self::GetDefaultJobs { err }
	}

	pub fn open_build_log(log_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::OpenBuildLog {
			log_path: log_path.into(),
			err,
		}
	}

	pub fn write_build_log(log_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::WriteBuildLog {
			log_path: log_path.into(),
			err,
		}
	}

	pub fn remove_file(file_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::RemoveFile {
			file_path: file_path.into(),
			err,
		}
	}

	pub fn create_dir(dir_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::CreateDir {
			dir_path: dir_path.into(),
			err,
		}
	}

	pub fn write_file(file_path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::WriteFile {
			file_path: file_path.into(),
			err,
		}
	}

	pub fn spawn_command(command: impl Into<String>) -> impl FnOnce(io::Error) -> Self {
		move |err| Self::SpawnCommand {
			command: command.into(),
			err,
		}
	}
}

impl AppError {
	/// Returns an object that can be used for a pretty `Display` of this error,
	/// including all of it's sources.
	pub fn pretty(&self) -> PrettyDisplay<'_> {
		PrettyDisplay { err: self }
	}
}

/// Pretty display for [`AppError`]
#[derive(Debug)]
pub struct PrettyDisplay<'a> {
	/// Error
	err: &'a AppError,
}

impl fmt::Display for PrettyDisplay<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.err)?;

		let mut source = self.err.source();
		while let Some(err) = source {
			write!(f, "\n  caused by: {err}")?;
			source = err.source();
		}

		Ok(())
	}
}

/// Syntax error kind
#[derive(PartialEq, Eq, Clone, Debug, thiserror::Error)]
pub enum SyntaxError {
	/// Unexpected character
	#[error("Unexpected character {ch:?}")]
	UnexpectedChar {
		/// Character
		ch: char,
	},

	/// Unexpected token
	#[error("Expected {expected}, found {found}")]
	UnexpectedToken {
		/// What was expected
		expected: &'static str,

		/// What was found
		found: TokenKind,
	},

	/// Expected an identifier
	#[error("Expected identifier")]
	ExpectedIdent,

	/// Unexpected indentation
	#[error("Unexpected indentation")]
	UnexpectedIndent,

	/// Bad `$`-escape
	#[error("Bad $-escape (literal $ must be written as $$)")]
	BadEscape,

	/// Unterminated `${`
	#[error("Expected closing `}}` for variable reference")]
	UnterminatedBrace,

	/// Unknown rule
	#[error("Unknown build rule {name:?}")]
	UnknownRule {
		/// Rule name
		name: String,
	},

	/// Duplicate rule
	#[error("Duplicate rule {name:?}")]
	DuplicateRule {
		/// Rule name
		name: String,
	},

	/// Rule without a command
	#[error("Expected `command =` line in rule {name:?}")]
	MissingCommand {
		/// Rule name
		name: String,
	},

	/// Unexpected variable in a block
	#[error("Unexpected variable {name:?}")]
	UnexpectedVariable {
		/// Variable name
		name: String,
	},

	/// Unknown pool
	#[error("Unknown pool name {name:?}")]
	UnknownPool {
		/// Pool name
		name: String,
	},

	/// Duplicate pool
	#[error("Duplicate pool {name:?}")]
	DuplicatePool {
		/// Pool name
		name: String,
	},

	/// Pool without a depth
	#[error("Expected `depth =` line in pool {name:?}")]
	MissingPoolDepth {
		/// Pool name
		name: String,
	},

	/// Invalid pool depth
	#[error("Invalid pool depth {value:?}")]
	InvalidPoolDepth {
		/// Depth, as written
		value: String,
	},

	/// Multiple edges produce the same output
	#[error("Multiple rules generate {path:?}")]
	MultipleProducers {
		/// Output path
		path: String,
	},

	/// Build statement without outputs
	#[error("Expected at least one output path")]
	MissingOutputs,

	/// Path evaluated to the empty string
	#[error("Empty path")]
	EmptyPath,

	/// `default` without targets
	#[error("Expected target name")]
	ExpectedTarget,
}

/// A missing input
#[derive(Clone, Debug)]
pub struct MissingInput {
	/// Missing path
	pub path: String,

	/// Dependent that required it, if any
	pub needed_by: Option<String>,
}

impl fmt::Display for MissingInput {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.needed_by {
			Some(needed_by) => write!(
				f,
				"{:?}, needed by {needed_by:?}, is missing and no known rule can make it",
				self.path
			),
			None => write!(f, "{:?} is missing and no known rule can make it", self.path),
		}
	}
}

/// Exit result
#[derive(Debug)]
pub enum ExitResult {
	/// Success
	Ok,

	/// Failure
	Err(AppError),
}

impl From<Result<(), AppError>> for ExitResult {
	fn from(res: Result<(), AppError>) -> Self {
		match res {
			Ok(()) => Self::Ok,
			Err(err) => Self::Err(err),
		}
	}
}

impl Termination for ExitResult {
	fn report(self) -> ExitCode {
		match self {
			Self::Ok => ExitCode::SUCCESS,
			Self::Err(err) => {
				tracing::error!(err=%err.pretty(), "Exiting with error");
				ExitCode::FAILURE
			},
		}
	}
}
