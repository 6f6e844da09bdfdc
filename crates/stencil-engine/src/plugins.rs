//! Plugin resolution.
//!
//! Templates may use modifiers (`{$x|upper}`), functions (`{cycle}`) and
//! blocks (`{capture}...{/capture}`). Each name must resolve either to a
//! built-in or to a file in one of the configured plugin directories named
//! `<kind>.<name>.<ext>`, e.g. `modifier.money.php` or `function.menu.js`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Modifier,
    Function,
    Block,
}

impl PluginKind {
    pub fn prefix(self) -> &'static str {
        match self {
            PluginKind::Modifier => "modifier",
            PluginKind::Function => "function",
            PluginKind::Block => "block",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "modifier" => Some(PluginKind::Modifier),
            "function" => Some(PluginKind::Function),
            "block" => Some(PluginKind::Block),
            _ => None,
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

const BUILTIN_MODIFIERS: &[&str] = &[
    "escape",
    "upper",
    "lower",
    "default",
    "truncate",
    "trim",
    "nl2br",
    "date_format",
    "cat",
    "replace",
    "count",
];

const BUILTIN_FUNCTIONS: &[&str] = &["cycle", "counter"];

const BUILTIN_BLOCKS: &[&str] = &["capture", "strip"];

/// Where a plugin was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOrigin {
    Builtin,
    File(PathBuf),
}

/// Registry of known plugins. First registration of a name wins, so
/// built-ins shadow plugin files and earlier directories shadow later ones.
#[derive(Debug, Clone)]
pub struct PluginRegistry {
    entries: BTreeMap<(PluginKind, String), PluginOrigin>,
}

impl PluginRegistry {
    /// Registry holding only the built-in plugins
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        let builtins = [
            (PluginKind::Modifier, BUILTIN_MODIFIERS),
            (PluginKind::Function, BUILTIN_FUNCTIONS),
            (PluginKind::Block, BUILTIN_BLOCKS),
        ];
        for (kind, names) in builtins {
            for name in names {
                entries.insert((kind, name.to_string()), PluginOrigin::Builtin);
            }
        }
        Self { entries }
    }

    /// Register every plugin file found directly in `dir`.
    ///
    /// A missing directory is not an error; it contributes no plugins.
    /// Returns the number of newly registered plugins.
    pub fn scan_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            tracing::debug!("Plugin directory {} does not exist, skipping", dir.display());
            return Ok(0);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        files.sort();

        let mut added = 0;
        for path in files {
            if !path.is_file() {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((kind, name)) = parse_plugin_file_name(file_name) else {
                continue;
            };
            if let std::collections::btree_map::Entry::Vacant(slot) = self.entries.entry((kind, name.to_string())) {
                slot.insert(PluginOrigin::File(path.clone()));
                added += 1;
            }
        }

        tracing::debug!("Registered {} plugin(s) from {}", added, dir.display());
        Ok(added)
    }

    pub fn lookup(&self, kind: PluginKind, name: &str) -> Option<&PluginOrigin> {
        self.entries.get(&(kind, name.to_string()))
    }

    pub fn is_block(&self, name: &str) -> bool {
        self.lookup(PluginKind::Block, name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// `modifier.money.php` -> (Modifier, "money")
fn parse_plugin_file_name(file_name: &str) -> Option<(PluginKind, &str)> {
    let mut parts = file_name.splitn(3, '.');
    let kind = PluginKind::from_prefix(parts.next()?)?;
    let name = parts.next()?;
    // the extension is required but not interpreted
    parts.next()?;
    if name.is_empty() {
        return None;
    }
    Some((kind, name))
}
