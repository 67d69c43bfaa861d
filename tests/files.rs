//! Included files and subcommands

// Lints
#![expect(clippy::tests_outside_test_module, reason = "We're an integration test")]

// Modules
mod util;

// Imports
use {anyhow::Context, knit::Command};

/// `include` shares it's scope, while `subninja` gets a child scope
#[tokio::test]
#[tracing_test::traced_test]
async fn include_and_subninja() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files(
		"flag = root
rule write
  command = echo $flag > $out
include inc.ninja
subninja sub/build.ninja
build root.txt: write
",
		&[
			("inc.ninja", "flag = included\n"),
			("sub/build.ninja", "flag = sub\nbuild sub.txt: write\n"),
		],
	)?;
	let dir = temp_dir.path();

	util::build(dir, &[]).await.context("Unable to build")?;
	assert_eq!(util::read(dir, "root.txt")?, "included\n");
	assert_eq!(util::read(dir, "sub.txt")?, "sub\n");

	Ok(())
}

/// Depfile dependencies that no longer exist re-run the edge instead of failing
#[tokio::test]
#[tracing_test::traced_test]
async fn removed_depfile_dependency() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files(
		"rule cc
  command = cat $in > $out && echo \"$out: $in $$(cat deps.txt)\" > $out.d
  depfile = $out.d
build out.o: cc in.c
",
		&[("in.c", "in\n"), ("header.h", ""), ("deps.txt", "header.h\n")],
	)?;
	let dir = temp_dir.path();

	util::build(dir, &[]).await.context("Unable to build")?;
	assert_eq!(util::read(dir, "out.o.d")?, "out.o: in.c header.h\n");

	std::fs::remove_file(dir.join("header.h")).context("Unable to remove header")?;
	util::write(dir, "deps.txt", "")?;

	util::build(dir, &[]).await.context("Unable to rebuild")?;
	assert_eq!(util::read(dir, "out.o.d")?, "out.o: in.c \n");

	util::build(dir, &[]).await.context("Unable to build after rebuild")?;

	Ok(())
}

/// `clean` removes built files, but not sources or generator outputs
#[tokio::test]
#[tracing_test::traced_test]
async fn clean() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files(
		"rule cp
  command = cp $in $out
  depfile = $out.d
rule regen
  command = touch $out
  generator = 1
build a: cp src
build b: cp a
build gen: regen
",
		&[("src", ""), ("a.d", "a: src\n")],
	)?;
	let dir = temp_dir.path();

	util::build(dir, &[]).await.context("Unable to build")?;
	for output in ["a", "b", "gen"] {
		assert!(util::exists(dir, output)?, "Missing output {output:?}");
	}

	// Cleaning a target only cleans what it needs
	util::run(dir, Command::Clean {
		targets: vec!["a".to_owned()],
	})
	.await
	.context("Unable to clean")?;
	assert!(!util::exists(dir, "a")?);
	assert!(!util::exists(dir, "a.d")?);
	assert!(util::exists(dir, "b")?);

	util::run(dir, Command::Clean { targets: vec![] })
		.await
		.context("Unable to clean")?;
	assert!(!util::exists(dir, "b")?);
	assert!(util::exists(dir, "gen")?);
	assert!(util::exists(dir, "src")?);

	Ok(())
}

/// Listing subcommands only need a valid build file
#[tokio::test]
#[tracing_test::traced_test]
async fn listings() -> Result<(), anyhow::Error> {
	let temp_dir = util::with_files("rule cp\n  command = cp $in $out\nbuild a: cp src\nbuild b: cp a\n", &[])?;
	let dir = temp_dir.path();

	util::run(dir, Command::Targets { all: true })
		.await
		.context("Unable to list targets")?;
	util::run(dir, Command::Commands { targets: vec![] })
		.await
		.context("Unable to list commands")?;
	util::run(dir, Command::Version).await.context("Unable to print version")?;

	match util::run(dir, Command::Commands {
		targets: vec!["missing".to_owned()],
	})
	.await
	{
		Err(knit::AppError::UnknownTarget { .. }) => Ok(()),
		res => anyhow::bail!("Expected unknown target, found {res:?}"),
	}
}
