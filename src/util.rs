//! Utilities

// Imports
use {
	futures::Future,
	pin_project::pin_project,
	std::{
		pin::Pin,
		task,
		time::{Duration, Instant, SystemTime},
	},
};

/// Measures the duration of a fallible future
pub async fn try_measure_async<F: Future<Output = Result<T, E>>, T, E>(fut: F) -> Result<(Duration, T), E> {
	/// Wrapper future for measuring the future
	#[pin_project]
	struct Wrapper<F> {
		/// Future
		#[pin]
		fut: F,

		/// Start time
		start: Option<Instant>,
	}

	impl<F: Future<Output = Result<T, E>>, T, E> Future for Wrapper<F> {
		type Output = Result<(Duration, T), E>;

		fn poll(self: Pin<&mut Self>, cx: &mut task::Context<'_>) -> task::Poll<Self::Output> {
			let mut this = self.project();
			let start = this.start.get_or_insert_with(Instant::now);

			this.fut
				.as_mut()
				.poll(cx)
				.map(|res| res.map(|value| (start.elapsed(), value)))
		}
	}

	Wrapper { fut, start: None }.await
}

/// Canonicalizes a build path.
///
/// This is purely lexical: `.` components and repeated separators are removed,
/// and `dir/..` pairs are folded. Leading `..` components are kept.
pub fn canonicalize_path(path: &str) -> String {
	let is_absolute = path.starts_with('/');

	let mut cmpts = Vec::<&str>::new();
	for cmpt in path.split('/') {
		match cmpt {
			"" | "." => (),
			".." => match cmpts.last() {
				Some(&last) if last != ".." => {
					let _: Option<&str> = cmpts.pop();
				},
				// Note: `/..` is just `/`
				_ if is_absolute => (),
				_ => cmpts.push(cmpt),
			},
			_ => cmpts.push(cmpt),
		}
	}

	let joined = cmpts.join("/");
	match (is_absolute, joined.is_empty()) {
		(true, _) => format!("/{joined}"),
		(false, true) => ".".to_owned(),
		(false, false) => joined,
	}
}

/// Hashes a command line.
///
/// Uses `MurmurHash64A`, the same hash ninja logs, so that hashes are stable
/// across runs and platforms.
pub fn hash_command(command: &str) -> u64 {
	const SEED: u64 = 0xDECA_FBAD_DECA_FBAD;
	const M: u64 = 0xC6A4_A793_5BD1_E995;
	const R: u32 = 47;

	let data = command.as_bytes();
	let mut h = SEED ^ (data.len() as u64).wrapping_mul(M);

	let mut chunks = data.chunks_exact(8);
	for chunk in chunks.by_ref() {
		let mut bytes = [0; 8];
		bytes.copy_from_slice(chunk);
		let mut k = u64::from_le_bytes(bytes);
		k = k.wrapping_mul(M);
		k ^= k >> R;
		k = k.wrapping_mul(M);
		h ^= k;
		h = h.wrapping_mul(M);
	}

	let rest = chunks.remainder();
	if !rest.is_empty() {
		for (idx, &byte) in rest.iter().enumerate().rev() {
			h ^= u64::from(byte) << (8 * idx);
		}
		h = h.wrapping_mul(M);
	}

	h ^= h >> R;
	h = h.wrapping_mul(M);
	h ^= h >> R;

	h
}

/// Returns the number of nanoseconds since the unix epoch of `time`.
///
/// Times before the epoch are clamped to `0`, and times too far in the
/// future to `u64::MAX`.
pub fn unix_nanos(time: SystemTime) -> u64 {
	time.duration_since(SystemTime::UNIX_EPOCH)
		.map_or(0, |duration| u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
}
