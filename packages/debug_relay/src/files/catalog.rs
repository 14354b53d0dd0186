use ignore::WalkBuilder;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Enumerates the debuggable files under a root directory.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
    extensions: Vec<String>,
}

impl FileCatalog {
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>) -> Self {
        Self {
            root: root.into(),
            extensions,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative, `/`-separated paths of every matching file, sorted.
    /// Hidden and git-ignored files are skipped, as are symlinks leading
    /// out of the root.
    pub fn list(&self) -> Vec<String> {
        let canonical_root = match self.root.canonicalize() {
            Ok(p) => p,
            Err(e) => {
                warn!("Cannot read files root {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        let walker = WalkBuilder::new(&canonical_root)
            .hidden(true)
            .git_ignore(true)
            .git_exclude(true)
            .follow_links(true)
            .max_depth(Some(25))
            .build();

        let mut files: Vec<String> = walker
            .flatten()
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .filter(|entry| self.matches_extension(entry.path()))
            .filter(|entry| {
                // Symlinks are followed, but only targets inside the root are
                // servable by /files/data.
                entry
                    .path()
                    .canonicalize()
                    .is_ok_and(|target| target.starts_with(&canonical_root))
            })
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&canonical_root).ok()?;
                Some(to_slash(relative))
            })
            .collect();

        files.sort();
        files
    }

    fn matches_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
    }
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
