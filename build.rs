// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command as Process;
use std::time::{SystemTime, UNIX_EPOCH};

fn build_cli() -> Command {
    Command::new("mypkg")
        .version(env!("CARGO_PKG_VERSION"))
        .author("mypkg Contributors")
        .about("Build source tarballs into packages and install them")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Config file (default: ~/.mypkg.yaml)"),
        )
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .global(true)
                .help("Install root directory"),
        )
        .arg(
            Arg::new("db_dir")
                .short('d')
                .long("db-dir")
                .value_name("DIR")
                .global(true)
                .help("Package database directory"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level unless RUST_LOG says otherwise"),
        )
        .subcommand(
            Command::new("build")
                .about("Build a package archive from a description file")
                .arg(
                    Arg::new("description")
                        .required(true)
                        .help("Path to the YAML description"),
                )
                .arg(
                    Arg::new("output_dir")
                        .short('o')
                        .long("output-dir")
                        .value_name("DIR")
                        .help("Where to write the archive (overrides outputDir)"),
                ),
        )
        .subcommand(
            Command::new("fetch")
                .about("Print a starter description file")
                .arg(Arg::new("name").required(true).help("Package name"))
                .arg(Arg::new("uri").long("uri").help("Source URI"))
                .arg(
                    Arg::new("sha256")
                        .long("sha256")
                        .help("Source checksum (computed from --uri when omitted)"),
                )
                .arg(Arg::new("version").long("version").help("Package version"))
                .arg(Arg::new("release").long("release").help("Package release")),
        )
        .subcommand(
            Command::new("install")
                .about("Install a package archive")
                .arg(
                    Arg::new("archive")
                        .required(true)
                        .help("Path to name-version-release.<archival>.<compression>"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove an installed package")
                .arg(
                    Arg::new("name")
                        .required(true)
                        .help("Package name, or name-version-release when several are installed"),
                ),
        )
        .subcommand(Command::new("list").about("List installed packages"))
        .subcommand(
            Command::new("version").about("Show version, toolchain, build date and platform"),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

/// `YYYY-MM-DD` for a count of days since 1970-01-01 (proleptic Gregorian)
fn civil_date(days: i64) -> String {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    format!("{:04}-{:02}-{:02}", year, month, day)
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    // Toolchain and build date for `mypkg version`
    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let rustc_version = Process::new(rustc)
        .arg("--version")
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=MYPKG_RUSTC_VERSION={}", rustc_version);

    let epoch_secs = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0)
        });
    println!(
        "cargo:rustc-env=MYPKG_BUILD_DATE={}",
        civil_date(epoch_secs.div_euclid(86_400))
    );

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("mypkg.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");
}
