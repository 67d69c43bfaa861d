//! Errors

// Lints
#![expect(clippy::tests_outside_test_module, reason = "We're an integration test")]

// Modules
mod util;

// Imports
use knit::AppError;

/// Cycles are reported along their path
#[tokio::test]
#[tracing_test::traced_test]
async fn cycle() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files(
		"rule cat\n  command = cat $in > $out\nbuild a: cat b\nbuild b: cat a\n",
		&[],
	)?;

	match util::build(temp_dir.path(), &["a"]).await {
		Err(AppError::DependencyCycle { cycle }) => assert_eq!(cycle, ["a", "b", "a"]),
		res => anyhow::bail!("Expected cycle, found {res:?}"),
	}

	Ok(())
}

/// Missing sources fail before running anything
#[tokio::test]
#[tracing_test::traced_test]
async fn missing_input() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files(
		"rule cat\n  command = cat $in > $out\nbuild gen: cat\nbuild out: cat missing.txt gen\n",
		&[],
	)?;
	let dir = temp_dir.path();

	match util::build(dir, &["out"]).await {
		Err(AppError::MissingInputs { missing }) => {
			assert_eq!(missing.len(), 1);
			assert_eq!(missing[0].path, "missing.txt");
			assert_eq!(missing[0].needed_by.as_deref(), Some("out"));
		},
		res => anyhow::bail!("Expected missing input, found {res:?}"),
	}
	assert!(!util::exists(dir, "gen")?);

	Ok(())
}

/// Unknown targets are rejected
#[tokio::test]
#[tracing_test::traced_test]
async fn unknown_target() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files("rule cat\n  command = cat $in > $out\nbuild out: cat\n", &[])?;

	match util::build(temp_dir.path(), &["other"]).await {
		Err(AppError::UnknownTarget { target }) => assert_eq!(target, "other"),
		res => anyhow::bail!("Expected unknown target, found {res:?}"),
	}

	Ok(())
}

/// Syntax errors report their location
#[tokio::test]
#[tracing_test::traced_test]
async fn syntax_error() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files("build out: missing\n", &[])?;

	match util::build(temp_dir.path(), &[]).await {
		Err(err @ AppError::Syntax { .. }) => {
			assert_eq!(err.to_string(), "build.ninja:1:12: Unknown build rule \"missing\"");
		},
		res => anyhow::bail!("Expected syntax error, found {res:?}"),
	}

	Ok(())
}

/// A missing build file is reported
#[tokio::test]
#[tracing_test::traced_test]
async fn missing_build_file() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files("", &[])?;
	std::fs::remove_file(temp_dir.path().join(knit::DEFAULT_BUILD_FILE))?;

	match util::build(temp_dir.path(), &[]).await {
		Err(AppError::ReadFile { .. }) => (),
		res => anyhow::bail!("Expected read error, found {res:?}"),
	}

	Ok(())
}
