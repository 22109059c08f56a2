use anyhow::{Context, Result};
use blockbox_core::{Container, ContainerConfig, DEFAULT_BLOCK_SIZE, Session};
use clap::{ArgAction, Parser, Subcommand};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod output;
mod shell;

use output::{
    CopyInOutput, CopyOutOutput, ImportOutput, InitOutput, LsOutput, OutputWriter, RmOutput,
    StatOutput, VerifyOutput, listing_text, problem_text,
};

/// Blockbox - A single-file container with block-level deduplication
#[derive(Parser)]
#[command(name = "blockbox")]
#[command(about = "Single-file container with block-level deduplication", long_about = None)]
#[command(version)]
struct Cli {
    /// Container file (defaults to BLOCKBOX_CONTAINER env var or ./container.bin)
    #[arg(short, long, global = true)]
    container: Option<PathBuf>,

    /// Block size in bytes, used only when the container is created
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty container
    Init,

    /// Store a host file at a container path
    CopyIn {
        /// Host file to read
        src: PathBuf,

        /// Container path, e.g. \docs\a.txt
        dest: String,
    },

    /// Copy a stored file to the host
    CopyOut {
        /// Container path
        src: String,

        /// Host destination ('-' for stdout)
        dest: String,
    },

    /// Remove a stored file
    Rm {
        /// Container path
        path: String,
    },

    /// List a container directory
    Ls {
        /// Directory path (defaults to the root)
        dir: Option<String>,
    },

    /// Show file, block, and space statistics
    Stat,

    /// Check block hashes and reference counts
    Verify,

    /// Recursively store a host directory, honoring .gitignore
    Import {
        /// Host directory to read
        dir: PathBuf,
    },

    /// Start an interactive shell
    Shell,
}

/// Exit code when `verify` finds problems.
const EXIT_VERIFY_FAILED: u8 = 2;

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Determine container path: CLI arg > BLOCKBOX_CONTAINER env var > ./container.bin default
    let path = cli
        .container
        .clone()
        .or_else(|| std::env::var("BLOCKBOX_CONTAINER").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./container.bin"));

    let output = OutputWriter::new(cli.json);
    let config = ContainerConfig::with_block_size(cli.block_size);

    match run(cli.command, &path, config, &output) {
        Ok(0) => {}
        Ok(code) => std::process::exit(code.into()),
        Err(err) => {
            output.write_error(&err, 1);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn run(command: Commands, path: &Path, config: ContainerConfig, output: &OutputWriter) -> Result<u8> {
    match command {
        Commands::Init => cmd_init(path, config, output),
        Commands::CopyIn { src, dest } => cmd_copy_in(path, config, &src, &dest, output),
        Commands::CopyOut { src, dest } => cmd_copy_out(path, &src, &dest, output),
        Commands::Rm { path: target } => cmd_rm(path, &target, output),
        Commands::Ls { dir } => cmd_ls(path, dir.as_deref(), output),
        Commands::Stat => cmd_stat(path, output),
        Commands::Verify => cmd_verify(path, output),
        Commands::Import { dir } => cmd_import(path, config, &dir, output),
        Commands::Shell => cmd_shell(path, config),
    }
}

fn open(path: &Path) -> Result<Container> {
    Container::open(path).with_context(|| format!("Failed to open container at {}", path.display()))
}

fn open_or_create(path: &Path, config: ContainerConfig) -> Result<Container> {
    Container::open_or_create(path, config)
        .with_context(|| format!("Failed to open container at {}", path.display()))
}

fn cmd_init(path: &Path, config: ContainerConfig, output: &OutputWriter) -> Result<u8> {
    let container = Container::create(path, config)
        .with_context(|| format!("Failed to initialize container at {}", path.display()))?;

    let data = InitOutput {
        success: true,
        result_code: 0,
        container: path.display().to_string(),
        block_size: container.block_size(),
    };
    output.write(&data, || {
        format!(
            "Initialized container at {}\nBlock size: {} bytes\n",
            path.display(),
            container.block_size()
        )
    })?;
    Ok(0)
}

fn cmd_copy_in(
    path: &Path,
    config: ContainerConfig,
    src: &Path,
    dest: &str,
    output: &OutputWriter,
) -> Result<u8> {
    let mut container = open_or_create(path, config)?;
    container
        .ingest_file(src, dest)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), dest))?;
    let size = container.size_of(dest).unwrap_or(0);

    let data = CopyInOutput {
        success: true,
        result_code: 0,
        source: src.display().to_string(),
        path: dest.to_string(),
        size,
    };
    output.write(&data, || {
        format!("Copied {} to {} ({} bytes)\n", src.display(), dest, size)
    })?;
    Ok(0)
}

fn cmd_copy_out(path: &Path, src: &str, dest: &str, output: &OutputWriter) -> Result<u8> {
    let container = open(path)?;

    if dest == "-" {
        let stdout = io::stdout();
        let handle = BufWriter::new(stdout.lock());
        container
            .extract(src, handle)
            .with_context(|| format!("Failed to output {}", src))?;
        return Ok(0);
    }

    let size = container
        .extract_to_file(src, Path::new(dest))
        .with_context(|| format!("Failed to copy {} to {}", src, dest))?;

    let data = CopyOutOutput {
        success: true,
        result_code: 0,
        path: src.to_string(),
        destination: dest.to_string(),
        size,
    };
    output.write(&data, || format!("Copied {} to {} ({} bytes)\n", src, dest, size))?;
    Ok(0)
}

fn cmd_rm(path: &Path, target: &str, output: &OutputWriter) -> Result<u8> {
    let mut container = open(path)?;
    container
        .remove(target)
        .with_context(|| format!("Failed to remove {}", target))?;

    let data = RmOutput {
        success: true,
        result_code: 0,
        path: target.to_string(),
    };
    output.write(&data, || format!("Removed {}\n", target))?;
    Ok(0)
}

fn cmd_ls(path: &Path, dir: Option<&str>, output: &OutputWriter) -> Result<u8> {
    let session = Session::new(open(path)?);
    let listing = session
        .list_at(dir.unwrap_or("\\"))
        .with_context(|| format!("Failed to list {}", dir.unwrap_or("\\")))?;

    let text = listing_text(&listing);
    let data = LsOutput {
        success: true,
        result_code: 0,
        listing,
    };
    output.write(&data, || text)?;
    Ok(0)
}

fn cmd_stat(path: &Path, output: &OutputWriter) -> Result<u8> {
    let container = open(path)?;
    let stats = container.stats();

    let text = format!(
        "Container: {}\nBlock size: {} bytes\nFiles: {}\nBlocks: {}\nLogical size: {} bytes\nStored size: {} bytes\nDedup ratio: {:.2}\n",
        path.display(),
        stats.block_size,
        stats.files,
        stats.blocks,
        stats.logical_bytes,
        stats.stored_bytes,
        stats.dedup_ratio
    );
    let data = StatOutput {
        success: true,
        result_code: 0,
        container: path.display().to_string(),
        stats,
    };
    output.write(&data, || text)?;
    Ok(0)
}

fn cmd_verify(path: &Path, output: &OutputWriter) -> Result<u8> {
    let container = open(path)?;
    let report = container.verify();
    let code = if report.is_ok() { 0 } else { EXIT_VERIFY_FAILED };

    let mut text = format!(
        "Checked {} files and {} blocks\n",
        report.files_checked, report.blocks_checked
    );
    if report.is_ok() {
        text.push_str("No problems found\n");
    } else {
        for problem in &report.problems {
            text.push_str(&format!("  {}\n", problem_text(problem)));
        }
        text.push_str(&format!("{} problems found\n", report.problems.len()));
    }

    let data = VerifyOutput {
        success: report.is_ok(),
        result_code: code,
        report,
    };
    output.write(&data, || text)?;
    Ok(code)
}

fn cmd_import(
    path: &Path,
    config: ContainerConfig,
    dir: &Path,
    output: &OutputWriter,
) -> Result<u8> {
    let mut session = Session::new(open_or_create(path, config)?);
    let destination = session.cwd();

    let stats = session
        .import_dir(dir)
        .with_context(|| format!("Failed to import {}", dir.display()))?;

    let data = ImportOutput {
        success: true,
        result_code: 0,
        source: dir.display().to_string(),
        destination: destination.clone(),
        files: stats.files,
        bytes: stats.bytes,
    };
    output.write(&data, || {
        format!(
            "Imported {} files ({} bytes) from {} into {}\n",
            stats.files,
            stats.bytes,
            dir.display(),
            destination
        )
    })?;
    Ok(0)
}

fn cmd_shell(path: &Path, config: ContainerConfig) -> Result<u8> {
    let mut session = Session::new(open_or_create(path, config)?);

    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        println!("Container {} (type 'help' for commands)", path.display());
    }

    let stdin = io::stdin();
    let stdout = io::stdout();
    shell::run(&mut session, stdin.lock(), stdout.lock(), interactive)?;
    io::stdout().flush()?;
    Ok(0)
}
