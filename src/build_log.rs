//! Build log

// Imports
use {
	crate::error::AppError,
	std::{
		collections::HashMap,
		fmt,
		io,
		path::{Path, PathBuf},
	},
	tokio::{fs, io::AsyncWriteExt},
};

/// Build log entry
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct LogEntry {
	/// Command start time, in nanoseconds since the epoch
	pub start: u64,

	/// Command end time, in nanoseconds since the epoch
	pub end: u64,

	/// Recorded output modification time, in nanoseconds since the epoch
	pub mtime: u64,

	/// Command hash
	pub command_hash: u64,
}

/// A log line
struct LogLine<'a> {
	/// Output path
	path: &'a str,

	/// Entry
	entry: &'a LogEntry,
}

impl fmt::Display for LogLine<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let LogEntry {
			start,
			end,
			mtime,
			command_hash,
		} = self.entry;
		writeln!(f, "{start} {end} {mtime} {} {command_hash:x}", self.path)
	}
}

/// Build log.
///
/// Records, for each output, the hash of the command that last built it and
/// it's modification time afterwards.
#[derive(Debug)]
pub struct BuildLog {
	/// Entries, by output path
	entries: HashMap<String, LogEntry>,

	/// Log path, if backed by a file
	log_path: Option<PathBuf>,

	/// Log file, once opened for writing
	file: Option<fs::File>,

	/// If the existing log file should be replaced when first written to
	recreate: bool,
}

impl BuildLog {
	/// Log file name, in the build directory
	pub const FILE_NAME: &'static str = ".ninja_log";
	/// Log file header
	const HEADER: &'static str = "# knit log v1";

	/// Creates an empty, in-memory, build log
	pub fn new() -> Self {
		Self {
			entries:  HashMap::new(),
			log_path: None,
			file:     None,
			recreate: false,
		}
	}

	/// Loads the build log at `log_path`.
	///
	/// A missing or unreadable log is treated as empty.
	pub async fn load(log_path: impl Into<PathBuf>) -> Self {
		let log_path = log_path.into();

		let mut recreate = false;
		let entries = match fs::read_to_string(&log_path).await {
			Ok(contents) => match contents.lines().next() {
				Some(Self::HEADER) => Self::parse(&log_path, &contents),
				None => HashMap::new(),
				Some(header) => {
					tracing::warn!(?log_path, ?header, "Build log has unknown header, ignoring it");
					recreate = true;
					HashMap::new()
				},
			},
			Err(err) if err.kind() == io::ErrorKind::NotFound => HashMap::new(),
			Err(err) => {
				let err = AppError::read_file(&log_path)(err);
				tracing::warn!(err=%err.pretty(), "Unable to read build log, ignoring it");
				recreate = true;
				HashMap::new()
			},
		};
		tracing::debug!(?log_path, entries = entries.len(), "Loaded build log");

		Self {
			entries,
			log_path: Some(log_path),
			file: None,
			recreate,
		}
	}

	/// Parses all entries of a log
	fn parse(log_path: &Path, contents: &str) -> HashMap<String, LogEntry> {
		let mut entries = HashMap::new();
		for (idx, line) in contents.lines().enumerate().skip(1) {
			if line.trim().is_empty() {
				continue;
			}

			match Self::parse_line(line) {
				// Note: Later entries override earlier ones
				Some((path, entry)) => {
					let _: Option<LogEntry> = entries.insert(path.to_owned(), entry);
				},
				None => tracing::warn!(?log_path, line = idx + 1, "Ignoring malformed build log line"),
			}
		}

		entries
	}

	/// Parses a single log line
	fn parse_line(line: &str) -> Option<(&str, LogEntry)> {
		let mut fields = line.splitn(4, ' ');
		let start = fields.next()?.parse().ok()?;
		let end = fields.next()?.parse().ok()?;
		let mtime = fields.next()?.parse().ok()?;
		let (path, command_hash) = fields.next()?.rsplit_once(' ')?;
		let command_hash = u64::from_str_radix(command_hash, 16).ok()?;
		if path.is_empty() {
			return None;
		}

		let entry = LogEntry {
			start,
			end,
			mtime,
			command_hash,
		};
		Some((path, entry))
	}

	/// Returns the entry of an output
	pub fn query_output(&self, path: &str) -> Option<&LogEntry> {
		self.entries.get(path)
	}

	/// Records an entry for an output, appending it to the log file
	pub async fn record(&mut self, path: &str, entry: LogEntry) -> Result<(), AppError> {
		let _: Option<LogEntry> = self.entries.insert(path.to_owned(), entry);

		let Some(log_path) = &self.log_path else {
			return Ok(());
		};
		let file = match &mut self.file {
			Some(file) => file,
			slot @ None => {
				let mut file = fs::OpenOptions::new()
					.create(true)
					.append(!self.recreate)
					.write(true)
					.truncate(self.recreate)
					.open(log_path)
					.await
					.map_err(AppError::open_build_log(log_path))?;

				let len = file
					.metadata()
					.await
					.map_err(AppError::open_build_log(log_path))?
					.len();
				if len == 0 {
					file.write_all(format!("{}\n", Self::HEADER).as_bytes())
						.await
						.map_err(AppError::write_build_log(log_path))?;
				}

				slot.insert(file)
			},
		};

		let line = LogLine { path, entry: &entry }.to_string();
		file.write_all(line.as_bytes())
			.await
			.map_err(AppError::write_build_log(log_path))?;
		file.flush().await.map_err(AppError::write_build_log(log_path))?;

		Ok(())
	}
}

impl Default for BuildLog {
	fn default() -> Self {
		Self::new()
	}
}
