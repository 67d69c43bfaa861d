//! Scheduling

// Lints
#![expect(clippy::tests_outside_test_module, reason = "We're an integration test")]

// Modules
mod util;

// Imports
use {anyhow::Context, knit::AppError};

/// Edges in a pool of depth 1 never run at the same time.
///
/// Each command fails if another one is holding the lock file.
#[tokio::test]
#[tracing_test::traced_test]
async fn pool_depth() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files(
		"pool serial
  depth = 1
rule guarded
  command = test ! -e lock && touch lock && sleep 0.1 && rm lock && touch $out
  pool = serial
build a: guarded
build b: guarded
build c: guarded
",
		&[],
	)?;
	let dir = temp_dir.path();

	util::build(dir, &[]).await.context("Unable to build")?;
	for output in ["a", "b", "c"] {
		assert!(util::exists(dir, output)?, "Missing output {output:?}");
	}

	Ok(())
}

/// After a failure, no new commands are started, but running ones finish.
///
/// This works by having the following tree:
///
/// ```no_compile
/// a -> b
///  \-> c1 -> c2
/// ```
///
/// Where `b` fails after 100ms, while `c2` is still running. `c2` should
/// finish, but `c1` should never start.
#[tokio::test]
#[tracing_test::traced_test]
async fn failure_drains() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files(
		"rule touch
  command = touch $out
rule fail
  command = sleep 0.1 && false
rule slow
  command = sleep 0.3 && touch $out
build a: touch b c1
build b: fail
build c1: touch c2
build c2: slow
",
		&[],
	)?;
	let dir = temp_dir.path();

	match util::build(dir, &["a"]).await {
		Err(AppError::BuildFailed { failed }) => assert_eq!(failed, 1),
		res => anyhow::bail!("Expected build failure, found {res:?}"),
	}

	assert!(util::exists(dir, "c2")?);
	assert!(!util::exists(dir, "c1")?);
	assert!(!util::exists(dir, "b")?);
	assert!(!util::exists(dir, "a")?);

	Ok(())
}

/// Order-only inputs are built first, but don't cause rebuilds
#[tokio::test]
#[tracing_test::traced_test]
async fn order_only() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files(
		"rule touch
  command = touch $out && echo $out >> count
rule check
  command = test -e gen.h && touch $out && echo $out >> count
build gen.h: touch
build out: check in.c || gen.h
",
		&[("in.c", "")],
	)?;
	let dir = temp_dir.path();

	util::build(dir, &["out"]).await.context("Unable to build")?;
	assert_eq!(util::read(dir, "count")?, "gen.h\nout\n");

	util::build(dir, &["out"]).await.context("Unable to build")?;
	assert_eq!(util::read(dir, "count")?, "gen.h\nout\n");

	Ok(())
}
