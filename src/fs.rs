//! File system

// Imports
use {
	filetime::FileTime,
	std::{
		fs,
		io,
		path::{Path, PathBuf},
		time::{Duration, SystemTime},
	},
};

/// Existence of a file
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
pub enum Existence {
	/// Not yet checked
	#[default]
	Unknown,

	/// Missing
	Missing,

	/// Exists
	Exists,
}

/// File status
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Stat {
	/// Existence
	pub existence: Existence,

	/// Modification time, if the file exists
	pub mtime: Option<SystemTime>,
}

impl Stat {
	/// Status of a missing file
	pub const MISSING: Self = Self {
		existence: Existence::Missing,
		mtime:     None,
	};

	/// Status of an existing file
	pub const fn exists(mtime: SystemTime) -> Self {
		Self {
			existence: Existence::Exists,
			mtime:     Some(mtime),
		}
	}
}

/// File system.
///
/// All paths are build paths, relative to the build root.
pub trait FileSystem: Send + Sync {
	/// Retrieves the status of a file.
	///
	/// A missing file is *not* an error.
	fn stat(&self, path: &str) -> Result<Stat, io::Error>;

	/// Reads a file
	fn read_file(&self, path: &str) -> Result<Vec<u8>, io::Error>;
}

/// Real file system, rooted at a directory
#[derive(Clone, Debug)]
pub struct RealFileSystem {
	/// Root directory
	root: PathBuf,
}

impl RealFileSystem {
	/// Creates a new file system rooted at `root`
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	/// Returns the root directory
	pub fn root(&self) -> &Path {
		&self.root
	}

	/// Resolves a build path against the root
	pub fn resolve(&self, path: &str) -> PathBuf {
		self.root.join(path)
	}
}

impl FileSystem for RealFileSystem {
	fn stat(&self, path: &str) -> Result<Stat, io::Error> {
		match fs::metadata(self.resolve(path)) {
			Ok(metadata) => Ok(Stat::exists(self::file_modified_time(&metadata))),
			Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Stat::MISSING),
			Err(err) => Err(err),
		}
	}

	fn read_file(&self, path: &str) -> Result<Vec<u8>, io::Error> {
		fs::read(self.resolve(path))
	}
}

/// Returns the file modified time
pub fn file_modified_time(metadata: &fs::Metadata) -> SystemTime {
	let file_time = FileTime::from_last_modification_time(metadata);

	// Note: Files from before the epoch are treated as being *at* the epoch,
	//       they're older than anything we'd compare them with anyway.
	match u64::try_from(file_time.unix_seconds()) {
		Ok(secs) => SystemTime::UNIX_EPOCH + Duration::new(secs, file_time.nanoseconds()),
		Err(_) => SystemTime::UNIX_EPOCH,
	}
}

/// In-memory file system
#[cfg(test)]
#[derive(Default, Debug)]
pub struct MemoryFileSystem {
	/// Files, with their modification time (in seconds) and contents
	files: std::sync::Mutex<std::collections::HashMap<String, (u64, Vec<u8>)>>,
}

#[cfg(test)]
impl MemoryFileSystem {
	/// Creates an empty file system
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates or replaces a file
	pub fn write(&self, path: &str, mtime_secs: u64, contents: &str) {
		let _: Option<_> = self
			.files
			.lock()
			.expect("Poisoned")
			.insert(path.to_owned(), (mtime_secs, contents.as_bytes().to_vec()));
	}

	/// Removes a file
	pub fn remove(&self, path: &str) {
		let _: Option<_> = self.files.lock().expect("Poisoned").remove(path);
	}
}

#[cfg(test)]
impl FileSystem for MemoryFileSystem {
	fn stat(&self, path: &str) -> Result<Stat, io::Error> {
		let files = self.files.lock().expect("Poisoned");
		Ok(files.get(path).map_or(Stat::MISSING, |&(mtime_secs, _)| {
			Stat::exists(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs))
		}))
	}

	fn read_file(&self, path: &str) -> Result<Vec<u8>, io::Error> {
		let files = self.files.lock().expect("Poisoned");
		files
			.get(path)
			.map(|(_, contents)| contents.clone())
			.ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
	}
}
