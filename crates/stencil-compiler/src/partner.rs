//! Partner resolution.
//!
//! Every compiled artifact belongs to exactly one partner. In expansion mode
//! the partner comes from iterating the [`PartnerSet`]; otherwise it is read
//! from a `partners/<name>/` segment of the template's relative path.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BuildError, Result};

/// Identity of the implicit partner that owns shared templates
pub const CORE_PARTNER: &str = "core";

static PARTNER_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|/)partners/([a-z0-9-]+)/").unwrap());

/// Compile identity of a partner. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompileId(String);

impl CompileId {
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() { None } else { Some(Self(id)) }
    }

    pub fn core() -> Self {
        Self(CORE_PARTNER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CompileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extract the partner from a path like `site/partners/acme-1/page.tpl`
pub fn identity_from_path(name: &str) -> Option<CompileId> {
    let normalized = name.replace('\\', "/");
    PARTNER_SEGMENT
        .captures(&normalized)
        .and_then(|caps| CompileId::new(&caps[1]))
}

/// How each template gets its compile identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityStrategy {
    /// Every template is compiled for this partner
    Fixed(CompileId),
    /// The partner is taken from the template's path
    PathDerived,
}

impl IdentityStrategy {
    pub fn resolve(&self, name: &str) -> Result<CompileId> {
        match self {
            IdentityStrategy::Fixed(id) => Ok(id.clone()),
            IdentityStrategy::PathDerived => identity_from_path(name).ok_or_else(|| BuildError::Unresolved {
                file: name.to_string(),
            }),
        }
    }
}

/// Ordered partners for an expansion run: `core` first, then each
/// non-hidden entry of the partners directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerSet(Vec<CompileId>);

impl PartnerSet {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut partners = vec![CompileId::core()];
        partners.extend(
            entries
                .into_iter()
                .map(Into::into)
                .filter(|name| !name.starts_with('.'))
                .filter_map(CompileId::new),
        );
        Self(partners)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompileId> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(CompileId::as_str).collect()
    }
}

/// Lists the raw entries of the partners directory
pub trait PartnerSource {
    fn entries(&self, dir: &Path) -> Result<Vec<String>>;
}

/// Reads partner names from the filesystem, sorted by name
#[derive(Debug, Clone, Copy, Default)]
pub struct FsPartnerSource;

impl PartnerSource for FsPartnerSource {
    fn entries(&self, dir: &Path) -> Result<Vec<String>> {
        let listing_error = |source| BuildError::PartnerListing {
            path: dir.to_path_buf(),
            source,
        };

        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(listing_error)? {
            let entry = entry.map_err(listing_error)?;
            let name = entry.file_name().into_string().map_err(|name| {
                listing_error(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("partner name {name:?} is not valid UTF-8"),
                ))
            })?;
            names.push(name);
        }
        names.sort();
        Ok(names)
    }
}
