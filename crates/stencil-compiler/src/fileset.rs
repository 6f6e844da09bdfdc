//! Declarative template selection.
//!
//! A [`FileSet`] is a base directory plus include/exclude glob patterns. It
//! resolves to the sorted list of matching files, relative to the base
//! directory and `/`-separated on every platform.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use serde::Deserialize;

use crate::error::{BuildError, Result};

/// Patterns every file set excludes: VCS metadata, OS droppings and editor
/// backup or lock files
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "**/*~",
    "**/#*#",
    "**/.#*",
    "**/%*%",
    "**/._*",
    "**/.DS_Store",
    "**/.git/**",
    "**/.gitignore",
    "**/.gitattributes",
    "**/.gitmodules",
    "**/.hg/**",
    "**/.svn/**",
    "**/CVS/**",
    "**/.cvsignore",
    "**/SCCS/**",
    "**/vssver.scc",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Files matched by one rule set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFiles {
    /// Absolute base directory
    pub base_dir: PathBuf,
    /// Paths relative to `base_dir`, in compile order
    pub files: Vec<String>,
}

/// Anything that can produce a list of templates to compile
pub trait FileSelection {
    fn select(&self) -> Result<SelectedFiles>;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSet {
    pub dir: PathBuf,
    #[serde(default, rename = "include")]
    pub includes: Vec<String>,
    #[serde(default, rename = "exclude")]
    pub excludes: Vec<String>,
}

impl FileSet {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.includes.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.excludes.push(pattern.into());
        self
    }

    /// Resolve a relative base directory against `root`
    pub fn rebased(mut self, root: &Path) -> Self {
        if self.dir.is_relative() {
            self.dir = root.join(&self.dir);
        }
        self
    }

    fn matcher(&self) -> Result<Matcher> {
        let compile = |kind: &str, pattern: &str| {
            Pattern::new(pattern.trim_start_matches('/'))
                .map_err(|e| BuildError::selection(&self.dir, format!("bad {kind} pattern '{pattern}': {e}")))
        };

        let includes = if self.includes.is_empty() {
            vec![compile("include", "**/*")?]
        } else {
            self.includes
                .iter()
                .map(|p| compile("include", p.as_str()))
                .collect::<Result<_>>()?
        };
        let excludes = self
            .excludes
            .iter()
            .map(String::as_str)
            .chain(DEFAULT_EXCLUDES.iter().copied())
            .map(|p| compile("exclude", p))
            .collect::<Result<_>>()?;

        Ok(Matcher { includes, excludes })
    }
}

impl FileSelection for FileSet {
    fn select(&self) -> Result<SelectedFiles> {
        if !self.dir.is_dir() {
            return Err(BuildError::selection(&self.dir, "base directory does not exist"));
        }
        let base_dir = self.dir.canonicalize()?;
        let matcher = self.matcher()?;

        let mut files = BTreeSet::new();
        collect(&base_dir, &base_dir, &matcher, &mut files)?;

        Ok(SelectedFiles {
            base_dir,
            files: files.into_iter().collect(),
        })
    }
}

struct Matcher {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl Matcher {
    fn selects(&self, name: &str) -> bool {
        self.includes.iter().any(|p| p.matches_with(name, MATCH_OPTIONS))
            && !self.excludes.iter().any(|p| p.matches_with(name, MATCH_OPTIONS))
    }
}

/// Walk `dir` and add every selected regular file below `base`
fn collect(base: &Path, dir: &Path, matcher: &Matcher, files: &mut BTreeSet<String>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect(base, &path, matcher, files)?;
            continue;
        }
        if !path.is_file() {
            continue;
        }

        match relative_name(base, &path) {
            Ok(name) if matcher.selects(&name) => {
                files.insert(name);
            }
            Err(lossy) if matcher.selects(&lossy) => {
                return Err(BuildError::selection(
                    base,
                    format!("path is not valid UTF-8: {lossy}"),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}

/// `/`-separated path of `path` below `base`. A name that is not valid
/// UTF-8 comes back lossily converted as the error.
fn relative_name(base: &Path, path: &Path) -> std::result::Result<String, String> {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let parts: Vec<&OsStr> = relative.components().map(|c| c.as_os_str()).collect();
    match parts.iter().map(|p| p.to_str()).collect::<Option<Vec<&str>>>() {
        Some(parts) => Ok(parts.join("/")),
        None => Err(parts.iter().map(|p| p.to_string_lossy()).collect::<Vec<_>>().join("/")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(root: &Path, name: &str) {
        let path = root.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_select_with_includes_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "index.tpl",
            "partners/acme/home.tpl",
            "partners/globex/home.tpl",
            "partners/globex/notes.txt",
            "legacy/old.tpl",
            "index.tpl~",
        ] {
            touch(dir.path(), name);
        }

        let selected = FileSet::new(dir.path())
            .include("**/*.tpl")
            .exclude("legacy/**")
            .select()
            .unwrap();

        assert_eq!(selected.base_dir, dir.path().canonicalize().unwrap());
        assert_eq!(
            selected.files,
            vec!["index.tpl", "partners/acme/home.tpl", "partners/globex/home.tpl"]
        );
    }

    #[test]
    fn test_default_include_and_vcs_exclude() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.tpl");
        touch(dir.path(), "sub/b.tpl");
        touch(dir.path(), ".git/config");

        let selected = FileSet::new(dir.path()).select().unwrap();
        assert_eq!(selected.files, vec!["a.tpl", "sub/b.tpl"]);
    }

    #[test]
    fn test_overlapping_includes_are_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.tpl");

        let selected = FileSet::new(dir.path())
            .include("*.tpl")
            .include("**/*.tpl")
            .select()
            .unwrap();
        assert_eq!(selected.files, vec!["a.tpl"]);
    }

    #[test]
    fn test_default_excludes_skip_os_and_editor_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "page.tpl",
            "page.tpl~",
            ".DS_Store",
            "sub/._page.tpl",
            "sub/#page.tpl#",
            "sub/.#page.tpl",
            "sub/%page.tpl%",
            ".hg/store/data",
        ] {
            touch(dir.path(), name);
        }

        let selected = FileSet::new(dir.path()).select().unwrap();
        assert_eq!(selected.files, vec!["page.tpl"]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_name_fails_selection() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "partners/acme/ok.tpl");
        let bad = dir.path().join("partners/acme").join(OsStr::from_bytes(b"caf\xe9.tpl"));
        std::fs::write(&bad, "").unwrap();

        let err = FileSet::new(dir.path()).include("**/*.tpl").select().unwrap_err();
        assert!(matches!(
            err,
            BuildError::Selection { ref message, .. } if message.contains("not valid UTF-8")
        ));

        // an excluded name is never looked at
        let selected = FileSet::new(dir.path())
            .include("**/*.tpl")
            .exclude("partners/acme/caf*")
            .select()
            .unwrap();
        assert_eq!(selected.files, vec!["partners/acme/ok.tpl"]);
    }

    #[test]
    fn test_missing_base_dir() {
        let err = FileSet::new("/nonexistent/templates").select().unwrap_err();
        assert!(matches!(err, BuildError::Selection { .. }));
    }

    #[test]
    fn test_rebased() {
        let set = FileSet::new("templates").rebased(Path::new("/project"));
        assert_eq!(set.dir, PathBuf::from("/project/templates"));
        let set = FileSet::new("/abs").rebased(Path::new("/project"));
        assert_eq!(set.dir, PathBuf::from("/abs"));
    }
}
