#![allow(clippy::cargo_common_metadata)]

use clap::{Parser, Subcommand};
use color_eyre::Result;
use xshell::{cmd, Shell};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Fmt,
    Check,
    Clippy,
    /// Build the browser package into `library/pkg`
    Build,
    /// Native unit tests, then the wasm suite in headless browsers
    Test,
    Doc,
    PreCommit,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let sh = Shell::new()?;

    match cli.command {
        Command::Fmt => fmt(&sh)?,
        Command::Check => check(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Build => build(&sh)?,
        Command::Test => test(&sh)?,
        Command::Doc => doc(&sh)?,
        Command::PreCommit => pre_commit(&sh)?,
    };

    Ok(())
}

fn fmt(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo +nightly fmt").run()?)
}

fn check(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo check --all-targets --all-features --workspace").run()?;
    Ok(cmd!(
        sh,
        "cargo check --package robot-stream --target wasm32-unknown-unknown"
    )
    .run()?)
}

fn clippy(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo clippy --all-targets --all-features --workspace").run()?)
}

fn build(sh: &Shell) -> Result<()> {
    sh.change_dir(project_root::get_project_root()?.join("library/"));
    Ok(cmd!(sh, "wasm-pack build --target web").run()?)
}

fn test(sh: &Shell) -> Result<()> {
    cmd!(sh, "cargo test --workspace").run()?;

    let current_dir = sh.current_dir();
    sh.change_dir(project_root::get_project_root()?.join("library/"));
    cmd!(sh, "wasm-pack test --headless --firefox").run()?;
    cmd!(sh, "wasm-pack test --headless --chrome").run()?;
    sh.change_dir(current_dir);
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    Ok(cmd!(sh, "cargo doc --no-deps --all-features").run()?)
}

fn pre_commit(sh: &Shell) -> Result<()> {
    for cmd in [fmt, check, clippy, test, doc] {
        cmd(sh)?;
    }
    Ok(())
}
