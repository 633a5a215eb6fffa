use anyhow::{
    Context,
    Result,
    ensure,
};
use clap::{
    Parser,
    Subcommand,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    process::Command,
};

const HARDHAT_CONFIG: &str = "hardhat.config.cjs";

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Proof of Tap helper tasks (compile contracts, refresh ABI, clippy, tests)",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the Solidity contracts with hardhat to refresh artifacts
    Contracts,
    /// Recompile contracts and recheck generated_abi against the new artifacts
    Abi {
        /// Skip the hardhat compile step
        #[arg(long)]
        skip_contracts: bool,
    },
    /// Run clippy for the entire workspace with warnings-as-errors
    Clippy,
    /// Run every workspace test suite
    Test {
        /// Skip the hardhat compile step
        #[arg(long)]
        skip_contracts: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let root = repo_root()?;

    match cli.command {
        Commands::Contracts => compile_contracts(&root)?,
        Commands::Abi { skip_contracts } => {
            if !skip_contracts {
                compile_contracts(&root)?;
            }
            check_generated_abi(&root)?;
        }
        Commands::Clippy => run_clippy(&root)?,
        Commands::Test { skip_contracts } => {
            if !skip_contracts {
                compile_contracts(&root)?;
            }
            run_tests(&root)?;
        }
    }

    Ok(())
}

fn repo_root() -> Result<PathBuf> {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(Path::to_path_buf)
        .context("xtask has no parent directory")
}

fn compile_contracts(root: &Path) -> Result<()> {
    let config = root.join(HARDHAT_CONFIG);
    ensure!(
        config.exists(),
        "missing hardhat project ({} not found)",
        config.display()
    );
    let mut cmd = Command::new("npx");
    cmd.arg("hardhat").arg("compile").current_dir(root);
    run_command(cmd, "npx hardhat compile")
}

fn check_generated_abi(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("check")
        .arg("-p")
        .arg("generated_abi")
        .arg("--quiet")
        .current_dir(root);
    run_command(cmd, "cargo check -p generated_abi")
}

fn run_clippy(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("clippy")
        .arg("--workspace")
        .arg("--all-targets")
        .arg("--all-features")
        .arg("--")
        .arg("-D")
        .arg("warnings")
        .current_dir(root);
    run_command(cmd, "cargo clippy")
}

fn run_tests(root: &Path) -> Result<()> {
    let mut cmd = Command::new("cargo");
    cmd.arg("test")
        .arg("--workspace")
        .arg("--all-features")
        .current_dir(root);
    run_command(cmd, "cargo test --workspace")
}

fn run_command(mut cmd: Command, label: &str) -> Result<()> {
    println!("Running: {label}");
    let status = cmd
        .status()
        .with_context(|| format!("failed to run {label}"))?;
    ensure!(status.success(), "{label} failed with status {status}");
    Ok(())
}
