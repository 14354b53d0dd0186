pub mod breakpoints;
pub mod catalog;

pub use breakpoints::{Breakpoint, BreakpointSource, NoBreakpoints, StatementScanner};
pub use catalog::FileCatalog;

use std::path::{Path, PathBuf};

/// Resolve `relative` against `root`, following symlinks. Returns `None` if
/// the result does not exist, is not a regular file, or lands outside
/// `root`.
pub fn resolve_within(root: &Path, relative: &str) -> Option<PathBuf> {
    let canonical_root = root.canonicalize().ok()?;
    let requested = Path::new(relative.trim_start_matches('/'));
    if requested.is_absolute() {
        return None;
    }

    let canonical_target = canonical_root.join(requested).canonicalize().ok()?;
    if !canonical_target.starts_with(&canonical_root) || !canonical_target.is_file() {
        return None;
    }
    Some(canonical_target)
}
