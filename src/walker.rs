//! Corpus walker.
//!
//! Enumerates every document file under the corpus root, depth-first and
//! sorted by file name within each directory, so repeated walks over an
//! unchanged tree yield the same sequence. The walk is lazy: paths are
//! produced as directories are read.
//!
//! A missing root is an empty corpus. Unreadable subtrees are skipped and the
//! walk continues with their siblings.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CorpusConfig;

#[derive(Debug, Clone)]
pub struct CorpusWalker {
    root: PathBuf,
    suffix: String,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl CorpusWalker {
    /// Walker over `root` matching files that end in `.{extension}`.
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root: root.into(),
            suffix: format!(".{}", extension.trim_start_matches('.')),
            exclude: GlobSet::empty(),
            follow_symlinks: false,
        }
    }

    pub fn from_config(config: &CorpusConfig) -> Result<Self> {
        let mut walker = Self::new(&config.root, &config.extension);
        walker.exclude = build_globset(&config.exclude_globs)?;
        walker.follow_symlinks = config.follow_symlinks;
        Ok(walker)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily yield the full path of every document under the root.
    ///
    /// Each call starts a fresh traversal.
    pub fn documents(&self) -> impl Iterator<Item = PathBuf> + '_ {
        let walker = self.root.is_dir().then(|| {
            WalkDir::new(&self.root)
                .min_depth(1)
                .follow_links(self.follow_symlinks)
                .sort_by_file_name()
        });

        walker
            .into_iter()
            .flatten()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable corpus entry");
                    None
                }
            })
            // Symlinked files count even when links are not followed into directories.
            .filter(|entry| {
                entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
            })
            .filter(move |entry| entry.file_name().to_string_lossy().ends_with(&self.suffix))
            .filter(move |entry| {
                let relative = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
                !self.exclude.is_match(relative)
            })
            .map(|entry| entry.into_path())
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
