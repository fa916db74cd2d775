// src/manifest/file_type.rs

use std::fmt;
use std::path::{Component, Path};
use std::str::FromStr;

/// Role of an installed file, derived from where it lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Data,
    Executable,
    Library,
    Header,
    Doc,
    Info,
    Man,
    LocaleData,
    Config,
}

impl FileType {
    pub fn as_str(&self) -> &str {
        match self {
            FileType::Data => "data",
            FileType::Executable => "executable",
            FileType::Library => "library",
            FileType::Header => "header",
            FileType::Doc => "doc",
            FileType::Info => "info",
            FileType::Man => "man",
            FileType::LocaleData => "localedata",
            FileType::Config => "config",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "data" => Ok(FileType::Data),
            "executable" => Ok(FileType::Executable),
            "library" => Ok(FileType::Library),
            "header" => Ok(FileType::Header),
            "doc" => Ok(FileType::Doc),
            "info" => Ok(FileType::Info),
            "man" => Ok(FileType::Man),
            "localedata" => Ok(FileType::LocaleData),
            "config" => Ok(FileType::Config),
            _ => Err(format!("Invalid file type: {}", s)),
        }
    }
}

/// Directories whose `.pc` files get the staging root scrubbed
pub(crate) const PKGCONFIG_DIRS: [&str; 3] = ["lib/pkgconfig", "lib64/pkgconfig", "lib32/pkgconfig"];

/// Well-known locations, relative to the install prefix
const FILE_TYPE_PREFIXES: &[(&str, FileType)] = &[
    ("lib/pkgconfig", FileType::Data),
    ("lib64/pkgconfig", FileType::Data),
    ("lib32/pkgconfig", FileType::Data),
    ("libexec", FileType::Executable),
    ("bin", FileType::Executable),
    ("sbin", FileType::Executable),
    ("lib", FileType::Library),
    ("lib64", FileType::Library),
    ("lib32", FileType::Library),
    ("share/info", FileType::Info),
    ("share/man", FileType::Man),
    ("share/doc", FileType::Doc),
    ("share/help", FileType::Doc),
    ("share/gtk-doc", FileType::Doc),
    ("share/locale", FileType::LocaleData),
    ("include", FileType::Header),
    ("etc", FileType::Config),
];

/// Classify a path relative to the install prefix
///
/// Matching is by whole path components, and the longest matching prefix
/// wins, so `lib/pkgconfig/x.pc` is data while `lib/libx.so` is a library.
pub fn classify(relative: &Path) -> FileType {
    let relative = strip_root(relative);

    FILE_TYPE_PREFIXES
        .iter()
        .filter(|(prefix, _)| relative.starts_with(prefix))
        .max_by_key(|(prefix, _)| Path::new(prefix).components().count())
        .map(|(_, file_type)| *file_type)
        .unwrap_or(FileType::Data)
}

/// Whether a prefix-relative path sits in a pkg-config directory
pub(crate) fn is_pkgconfig(relative: &Path) -> bool {
    let relative = strip_root(relative);
    PKGCONFIG_DIRS.iter().any(|dir| relative.starts_with(dir))
}

fn strip_root(path: &Path) -> &Path {
    let mut components = path.components();
    while let Some(Component::RootDir | Component::CurDir) = components.clone().next() {
        components.next();
    }
    components.as_path()
}
