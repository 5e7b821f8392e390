//! Embedded Terraform and Ansible asset trees.
//!
//! The tables are generated by `build.rs` from the `assets/` directory, so the
//! binary carries every definition, playbook, and helper script it needs and
//! never reads them from the source checkout at run time.

/// Name of the Terraform binary, marked executable when bundled.
pub const TERRAFORM_BINARY: &str = "terraform";

/// Kind of a bundled entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AssetKind {
    /// A directory to create.
    Dir,
    /// A file and its contents.
    File(&'static [u8]),
}

/// One path in an [`AssetBundle`], relative to the bundle root and always
/// `/`-separated.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AssetEntry {
    /// Relative path of the entry.
    pub path: &'static str,
    /// Whether the entry is a directory or a file.
    pub kind: AssetKind,
}

impl AssetEntry {
    /// Declares a directory entry.
    #[must_use]
    pub const fn dir(path: &'static str) -> Self {
        Self {
            path,
            kind: AssetKind::Dir,
        }
    }

    /// Declares a file entry.
    #[must_use]
    pub const fn file(path: &'static str, contents: &'static [u8]) -> Self {
        Self {
            path,
            kind: AssetKind::File(contents),
        }
    }
}

/// Immutable tree of files materialised into a sandbox before an engine runs.
///
/// Entries are ordered so that every directory precedes its children.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AssetBundle {
    name: &'static str,
    entries: &'static [AssetEntry],
    engine_root: Option<&'static str>,
    engine_binary: Option<&'static str>,
}

impl AssetBundle {
    /// Creates a bundle whose engine runs from the bundle root.
    #[must_use]
    pub const fn new(name: &'static str, entries: &'static [AssetEntry]) -> Self {
        Self {
            name,
            entries,
            engine_root: None,
            engine_binary: None,
        }
    }

    /// Nests the engine working directory one level below the sandbox root.
    #[must_use]
    pub const fn with_engine_root(mut self, engine_root: &'static str) -> Self {
        self.engine_root = Some(engine_root);
        self
    }

    /// Marks files with this name as executable when materialised.
    #[must_use]
    pub const fn with_engine_binary(mut self, engine_binary: &'static str) -> Self {
        self.engine_binary = Some(engine_binary);
        self
    }

    /// Prefix used for sandbox directory names.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Bundled entries in materialisation order.
    #[must_use]
    pub const fn entries(&self) -> &'static [AssetEntry] {
        self.entries
    }

    /// Sub-path holding the engine root, if nested.
    #[must_use]
    pub const fn engine_root(&self) -> Option<&'static str> {
        self.engine_root
    }

    /// File name of the engine binary, if bundled.
    #[must_use]
    pub const fn engine_binary(&self) -> Option<&'static str> {
        self.engine_binary
    }
}

include!(concat!(env!("OUT_DIR"), "/bundles.rs"));

/// Terraform definitions, nested under `terraform/`.
pub static TERRAFORM_BUNDLE: AssetBundle = AssetBundle::new("nebula-tf", TERRAFORM_ENTRIES)
    .with_engine_root("terraform")
    .with_engine_binary(TERRAFORM_BINARY);

/// Ansible configuration, playbooks, and roles.
pub static ANSIBLE_BUNDLE: AssetBundle = AssetBundle::new("nebula-ansible", ANSIBLE_ENTRIES);
