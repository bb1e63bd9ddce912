//! Source location resolution
//!
//! Call sites are captured where the log call is written (macros,
//! `#[track_caller]` entry points, or `tracing` metadata). The resolver only
//! keeps call sites that belong to the application itself; framework and
//! dependency frames yield no location.

use crate::model::SourceLocation;
use std::path::{Path, PathBuf};

/// Path fragments identifying dependency and toolchain sources.
const LIBRARY_MARKERS: &[&str] = &[
    "/.cargo/registry/",
    "/.cargo/git/",
    "/rustc/",
    "\\.cargo\\registry\\",
    "\\.cargo\\git\\",
];

/// A captured call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CallSite {
    /// Source file as reported by the compiler
    pub file: &'static str,
    /// Line number
    pub line: u32,
    /// Enclosing function or module path, when known
    pub function: Option<&'static str>,
}

impl CallSite {
    /// Create a call site with a function name.
    pub const fn new(file: &'static str, line: u32, function: &'static str) -> Self {
        Self {
            file,
            line,
            function: Some(function),
        }
    }

    /// Capture the caller's location.
    ///
    /// Only file and line are available this way.
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
            function: None,
        }
    }

    /// Build a call site from `tracing` event metadata.
    pub fn from_metadata(metadata: &'static tracing::Metadata<'static>) -> Option<Self> {
        Some(Self {
            file: metadata.file()?,
            line: metadata.line()?,
            function: metadata.module_path(),
        })
    }
}

/// Decides which call sites lie in the application's source tree.
#[derive(Clone, Debug, Default)]
pub struct SourceResolver {
    roots: Vec<PathBuf>,
}

impl SourceResolver {
    /// Create a resolver for the given application source roots.
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            roots: roots.into_iter().collect(),
        }
    }

    /// Configured application roots
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Return the first application call site, innermost first.
    pub fn resolve<I>(&self, candidates: I) -> Option<SourceLocation>
    where
        I: IntoIterator<Item = CallSite>,
    {
        candidates.into_iter().find_map(|site| {
            self.application_path(site.file).map(|file| SourceLocation {
                file,
                line: site.line,
                function: site.function.map(String::from),
            })
        })
    }

    /// Map a file to its application-relative path, or `None` for library code.
    fn application_path(&self, file: &str) -> Option<String> {
        if LIBRARY_MARKERS.iter().any(|marker| file.contains(marker)) {
            return None;
        }

        let path = Path::new(file);
        for root in &self.roots {
            if let Ok(relative) = path.strip_prefix(root) {
                let relative = relative.to_string_lossy();
                let relative = relative.trim_start_matches(|c: char| c == '/' || c == '\\');
                return Some(relative.to_string());
            }
        }

        // `file!()` is relative for crates built from the local workspace
        if path.is_relative() {
            return Some(file.to_string());
        }

        None
    }
}
