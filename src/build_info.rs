// src/build_info.rs

//! What `mypkg version` reports

use std::env::consts;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// `rustc --version` of the compiler that built this binary
pub const TOOLCHAIN: &str = env!("MYPKG_RUSTC_VERSION");
pub const BUILD_DATE: &str = env!("MYPKG_BUILD_DATE");

/// Multi-line version report: version, toolchain, build date, OS/arch
pub fn describe() -> String {
    format!(
        "mypkg {}\n  Toolchain: {}\n  Built: {}\n  Platform: {}/{}\n",
        VERSION,
        TOOLCHAIN,
        BUILD_DATE,
        consts::OS,
        consts::ARCH
    )
}
