//! Utilities for all integration tests

// Lints
#![allow(
	dead_code,
	reason = "This module is used from many tests, which might not use everything"
)]

// Imports
use {
	anyhow::Context,
	knit::{AppError, Args, Command},
	std::{fs, path::Path},
	tempdir::TempDir,
};

/// Creates a directory with a build file and all `files`
pub fn with_files(build_file: &str, files: &[(&str, &str)]) -> Result<TempDir, anyhow::Error> {
	let temp_dir = TempDir::new("knit").context("Unable to create temporary directory")?;
	self::write(temp_dir.path(), knit::DEFAULT_BUILD_FILE, build_file)?;
	for &(path, contents) in files {
		self::write(temp_dir.path(), path, contents)?;
	}

	Ok(temp_dir)
}

/// Writes a file inside of `dir`, creating any parent directories
pub fn write(dir: &Path, path: &str, contents: &str) -> Result<(), anyhow::Error> {
	let path = dir.join(path);
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).with_context(|| format!("Unable to create {parent:?}"))?;
	}
	fs::write(&path, contents).with_context(|| format!("Unable to write {path:?}"))
}

/// Reads a file inside of `dir`
pub fn read(dir: &Path, path: &str) -> Result<String, anyhow::Error> {
	let path = dir.join(path);
	fs::read_to_string(&path).with_context(|| format!("Unable to read {path:?}"))
}

/// Returns if a file inside of `dir` exists
pub fn exists(dir: &Path, path: &str) -> Result<bool, anyhow::Error> {
	let path = dir.join(path);
	path.try_exists()
		.with_context(|| format!("Unable to check if {path:?} exists"))
}

/// Runs `command` in `dir`
pub async fn run(dir: &Path, command: Command) -> Result<(), AppError> {
	let args = Args {
		dir: Some(dir.to_path_buf()),
		jobs: Some(4),
		command: Some(command),
		..Args::default()
	};
	tracing::info!(?args, "Arguments");
	knit::run(args).await
}

/// Builds `targets` in `dir`
pub async fn build(dir: &Path, targets: &[&str]) -> Result<(), AppError> {
	let targets = targets.iter().copied().map(str::to_owned).collect();
	self::run(dir, Command::Build { targets }).await
}
