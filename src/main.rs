// src/main.rs

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use mypkg::build_info;
use mypkg::config::Config;
use mypkg::fetch::HttpFetcher;
use mypkg::lifecycle;
use mypkg::package::{PackageDescription, scaffold};
use mypkg::shell::ShellRunner;
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "mypkg")]
#[command(author, version, about = "Build source tarballs into packages and install them", long_about = None)]
struct Cli {
    /// Config file (default: ~/.mypkg.yaml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Install root directory
    #[arg(short, long, global = true, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Package database directory
    #[arg(short, long, global = true, value_name = "DIR")]
    db_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a package archive from a description file
    ///
    /// Macros usable as a whole setup/build/install line:
    ///   $configure     ./configure ${CONF_OPTS}
    ///   $make          make -j${NBJOBS-1} ${MAKE_OPTS}
    ///   $make_install  make install DESTDIR=${INSTALL_DIR-${prefix}} ${MAKE_INSTALL_OPTS}
    #[command(verbatim_doc_comment)]
    Build {
        /// Path to the YAML description
        description: PathBuf,
        /// Where to write the archive (overrides outputDir)
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
    },
    /// Print a starter description file
    ///
    /// Without --sha256, a given --uri is fetched and its checksum computed.
    Fetch {
        /// Package name
        name: String,
        #[arg(long)]
        uri: Option<String>,
        #[arg(long)]
        sha256: Option<String>,
        #[arg(long = "version", value_name = "VERSION", default_value = "")]
        pkg_version: String,
        #[arg(long, default_value = "")]
        release: String,
    },
    /// Install a package archive
    Install {
        /// Path to name-version-release.<archival>.<compression>
        archive: PathBuf,
    },
    /// Remove an installed package
    Remove {
        /// Package name, or name-version-release when several are installed
        name: String,
    },
    /// List installed packages
    List,
    /// Show version, toolchain, build date and platform
    Version,
    /// Generate shell completion scripts
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "mypkg", &mut io::stdout());
        return Ok(());
    }
    if let Commands::Version = cli.command {
        print!("{}", build_info::describe());
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(root) = cli.root {
        config.root = root;
    }
    if let Some(db_dir) = cli.db_dir {
        config.db_dir = db_dir;
    }
    config.validate()?;

    match cli.command {
        Commands::Build {
            description,
            output_dir,
        } => {
            if let Some(output_dir) = output_dir {
                config.output_dir = output_dir;
            }
            let description = PackageDescription::load(&description)?;
            let fetcher = HttpFetcher::new()?;
            let report = lifecycle::build(&config, &description, &fetcher, &ShellRunner::new())
                .with_context(|| format!("Failed to build {}", description.name))?;

            println!("Built {}", report.identity);
            println!("  Archive: {}", report.archive.display());
            println!("  Files: {}", report.manifest.len());
        }
        Commands::Fetch {
            name,
            uri,
            sha256,
            pkg_version,
            release,
        } => {
            let sha256 = match (sha256, uri.as_deref()) {
                (Some(sha256), _) => sha256,
                (None, Some(uri)) => {
                    info!("Computing checksum of {}", uri);
                    lifecycle::source_checksum(&config, &HttpFetcher::new()?, uri)?
                }
                (None, None) => String::new(),
            };
            print!(
                "{}",
                scaffold(&name, &pkg_version, &release, uri.as_deref().unwrap_or(""), &sha256)
            );
        }
        Commands::Install { archive } => {
            let report = lifecycle::install(&config, &archive)
                .with_context(|| format!("Failed to install {}", archive.display()))?;

            println!("Installed {}", report.identity);
            println!("  Files: {}", report.manifest.len());
            if !report.removed_files.is_empty() {
                println!(
                    "  Deleted {} file(s) that failed verification:",
                    report.removed_files.len()
                );
                for failure in &report.removed_files {
                    println!("    {}", failure.location.display());
                }
            }
        }
        Commands::Remove { name } => {
            let report = lifecycle::remove(&config, &name)
                .with_context(|| format!("Failed to remove {}", name))?;

            println!("Removed {}", report.identity);
            println!("  Files removed: {}", report.deleted.len());
            println!("  Directories pruned: {}", report.pruned_dirs.len());
            for (path, reason) in &report.failed {
                println!("  Could not delete {}: {}", path.display(), reason);
            }
        }
        Commands::List => {
            let installed = lifecycle::list(&config)?;
            if installed.is_empty() {
                println!("No packages installed.");
                return Ok(());
            }

            let rows: Vec<[&str; 3]> = installed
                .iter()
                .map(|id| [id.name.as_str(), id.version.as_str(), id.release.as_str()])
                .collect();
            let header = ["Name", "Version", "Release"];
            let mut widths = header.map(str::len);
            for row in &rows {
                for (width, cell) in widths.iter_mut().zip(row) {
                    *width = (*width).max(cell.len());
                }
            }

            let print_row = |cells: [&str; 3]| {
                println!(
                    "{:<w0$}   {:<w1$}   {}",
                    cells[0],
                    cells[1],
                    cells[2],
                    w0 = widths[0],
                    w1 = widths[1]
                );
            };
            print_row(header);
            print_row(["----", "-------", "-------"]);
            for row in rows {
                print_row(row);
            }
        }
        Commands::Version | Commands::Completions { .. } => {}
    }

    Ok(())
}
