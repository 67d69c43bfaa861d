//! Build worker

// Imports
use {
	crate::{error::AppError, graph::EdgeId, util},
	std::{
		io,
		path::PathBuf,
		process::{ExitStatus, Stdio},
		time::SystemTime,
	},
	tokio::{fs, process::Command, sync::mpsc},
};

/// Response file
#[derive(Clone, Debug)]
pub struct Rspfile {
	/// Path
	pub path: PathBuf,

	/// Contents
	pub contents: String,
}

/// Job for a worker
#[derive(Clone, Debug)]
pub struct Job {
	/// Edge
	pub edge: EdgeId,

	/// Command
	pub command: String,

	/// Directory to run the command in
	pub root: PathBuf,

	/// Outputs, to create their parent directories
	pub outputs: Vec<PathBuf>,

	/// Response file
	pub rspfile: Option<Rspfile>,

	/// If the command has direct access to the console
	pub console: bool,
}

/// Command output
#[derive(Debug)]
pub struct JobOutput {
	/// Exit status
	pub status: ExitStatus,

	/// Captured stdout, followed by the captured stderr
	pub output: Vec<u8>,
}

/// Result of a job
#[derive(Debug)]
pub struct JobResult {
	/// Edge
	pub edge: EdgeId,

	/// Start time
	pub start: SystemTime,

	/// End time
	pub end: SystemTime,

	/// Output
	pub output: Result<JobOutput, AppError>,
}

/// Runs a job, sending it's result through `result_tx`
pub async fn run(job: Job, result_tx: mpsc::UnboundedSender<JobResult>) {
	let start = SystemTime::now();
	let output = util::try_measure_async(self::exec(&job)).await;
	let (end, output) = match output {
		Ok((duration, output)) => {
			tracing::debug!(command=?job.command, ?duration, "Ran command");
			(start + duration, Ok(output))
		},
		Err(err) => (SystemTime::now(), Err(err)),
	};

	// Note: If the coordinator is gone, there's nobody to report to
	if result_tx
		.send(JobResult {
			edge: job.edge,
			start,
			end,
			output,
		})
		.is_err()
	{
		tracing::debug!(command=?job.command, "Coordinator quit before job finished");
	}
}

/// Executes a job
async fn exec(job: &Job) -> Result<JobOutput, AppError> {
	for output in &job.outputs {
		if let Some(parent) = output.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(AppError::create_dir(parent))?;
		}
	}

	if let Some(rspfile) = &job.rspfile {
		fs::write(&rspfile.path, &rspfile.contents)
			.await
			.map_err(AppError::write_file(&rspfile.path))?;
	}

	let mut cmd = Command::new("sh");
	cmd.arg("-c")
		.arg(&job.command)
		.current_dir(&job.root)
		.kill_on_drop(true);

	let output = match job.console {
		true => cmd
			.status()
			.await
			.map(|status| JobOutput { status, output: vec![] }),
		false => cmd.stdin(Stdio::null()).output().await.map(|output| {
			let mut combined = output.stdout;
			combined.extend(output.stderr);
			JobOutput {
				status: output.status,
				output: combined,
			}
		}),
	};

	if let Some(rspfile) = &job.rspfile {
		match fs::remove_file(&rspfile.path).await {
			Ok(()) => (),
			Err(err) if err.kind() == io::ErrorKind::NotFound => (),
			Err(err) => {
				let err = AppError::remove_file(&rspfile.path)(err);
				tracing::warn!(err=%err.pretty(), "Unable to remove response file");
			},
		}
	}

	output.map_err(AppError::spawn_command(&job.command))
}
