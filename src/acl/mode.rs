//! Access modes, mode sets and write decisions.

use std::collections::BTreeSet;
use std::fmt;

use oxigraph::model::{NamedNode, NamedNodeRef};
use serde::{Deserialize, Serialize};

use crate::vocab::{acl, warden};

/// A grantable permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessMode {
    Read,
    Write,
    Append,
    Control,
    WriteRestricted,
}

impl AccessMode {
    pub const ALL: [AccessMode; 5] = [
        AccessMode::Read,
        AccessMode::Write,
        AccessMode::Append,
        AccessMode::Control,
        AccessMode::WriteRestricted,
    ];

    /// The vocabulary IRI of this mode.
    pub fn iri(self) -> NamedNodeRef<'static> {
        match self {
            AccessMode::Read => acl::READ,
            AccessMode::Write => acl::WRITE,
            AccessMode::Append => acl::APPEND,
            AccessMode::Control => acl::CONTROL,
            AccessMode::WriteRestricted => warden::WRITE_RESTRICTED,
        }
    }

    /// Map a vocabulary IRI back to a mode; unknown IRIs yield `None`.
    pub fn from_iri(iri: &NamedNode) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.iri() == iri.as_ref())
    }

    /// Parse a CLI-style name such as `write-restricted`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.to_string().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AccessMode::Read => "read",
            AccessMode::Write => "write",
            AccessMode::Append => "append",
            AccessMode::Control => "control",
            AccessMode::WriteRestricted => "write-restricted",
        };
        f.write_str(name)
    }
}

/// A set of granted access modes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSet(BTreeSet<AccessMode>);

impl ModeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mode; what the system agent holds on every resource.
    pub fn universal() -> Self {
        AccessMode::ALL.into_iter().collect()
    }

    /// Modes that allow adding statements to a context.
    pub fn for_additions() -> Self {
        [
            AccessMode::Write,
            AccessMode::Control,
            AccessMode::Append,
            AccessMode::WriteRestricted,
        ]
        .into_iter()
        .collect()
    }

    /// Modes that allow removing statements from a context.
    pub fn for_removals() -> Self {
        [AccessMode::Write, AccessMode::Control, AccessMode::WriteRestricted]
            .into_iter()
            .collect()
    }

    pub fn insert(&mut self, mode: AccessMode) -> bool {
        self.0.insert(mode)
    }

    pub fn contains(&self, mode: AccessMode) -> bool {
        self.0.contains(&mode)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = AccessMode> + '_ {
        self.0.iter().copied()
    }

    /// Reduce to a binary write decision.
    ///
    /// Any of `Control`, `Write`, `WriteRestricted` or `Append` permits
    /// modification. `Append` alone is deliberately not narrowed to
    /// insert-only.
    pub fn write_decision(&self) -> WriteDecision {
        let writes = [
            AccessMode::Control,
            AccessMode::Write,
            AccessMode::WriteRestricted,
            AccessMode::Append,
        ];
        if writes.iter().any(|m| self.contains(*m)) {
            WriteDecision::Modify
        } else {
            WriteDecision::Denied
        }
    }
}

impl FromIterator<AccessMode> for ModeSet {
    fn from_iter<I: IntoIterator<Item = AccessMode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.iter().map(|m| m.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Outcome of write authorization for one resource within one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteDecision {
    /// Not resolved yet; blank resources stay here until chain resolution.
    Undetermined,
    Modify,
    Denied,
}

impl WriteDecision {
    pub fn is_modify(self) -> bool {
        self == WriteDecision::Modify
    }
}

impl fmt::Display for WriteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteDecision::Undetermined => f.write_str("undetermined"),
            WriteDecision::Modify => f.write_str("modify"),
            WriteDecision::Denied => f.write_str("denied"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iri_round_trip() {
        for mode in AccessMode::ALL {
            assert_eq!(AccessMode::from_iri(&mode.iri().into_owned()), Some(mode));
        }
    }

    #[test]
    fn read_only_is_denied() {
        let modes: ModeSet = [AccessMode::Read].into_iter().collect();
        assert_eq!(modes.write_decision(), WriteDecision::Denied);
        assert_eq!(ModeSet::new().write_decision(), WriteDecision::Denied);
    }

    #[test]
    fn append_alone_permits_modification() {
        // Append is not narrowed to insert-only; removals pass as well.
        let modes: ModeSet = [AccessMode::Append].into_iter().collect();
        assert_eq!(modes.write_decision(), WriteDecision::Modify);
    }

    #[test]
    fn write_restricted_permits_modification() {
        let modes: ModeSet = [AccessMode::WriteRestricted].into_iter().collect();
        assert!(modes.write_decision().is_modify());
    }

    #[test]
    fn removal_modes_exclude_append() {
        assert!(ModeSet::for_additions().contains(AccessMode::Append));
        assert!(!ModeSet::for_removals().contains(AccessMode::Append));
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!(
            AccessMode::from_name("Write-Restricted"),
            Some(AccessMode::WriteRestricted)
        );
        assert_eq!(AccessMode::from_name("delete"), None);
    }
}
