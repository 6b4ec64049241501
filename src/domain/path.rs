//! Canonical dotted addresses of patchable symbols.
//!
//! A [`ResolvedPath`] is made of a module path, an optional owner (the type
//! that holds the leaf, possibly a nested qualified name) and an optional
//! leaf. It renders as `module[.owner][.leaf]` and every segment must be an
//! identifier: `[A-Za-z_][A-Za-z0-9_]*`.

use crate::domain::error::PatchError;
use std::fmt;

/// Check whether a single segment is an identifier.
pub(crate) fn is_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Check whether a string matches `identifier(.identifier)*`.
pub(crate) fn is_dotted_path(path: &str) -> bool {
    !path.is_empty() && path.split('.').all(is_identifier)
}

/// Segments starting with an uppercase letter name types by convention.
pub(crate) fn names_type(segment: &str) -> bool {
    segment.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Canonical, validated address of a symbol.
///
/// Two paths built from the same inputs always compare equal, and a
/// `ResolvedPath` can only exist once its rendered form passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedPath {
    dotted: String,
    module: String,
    owner: Option<String>,
    leaf: Option<String>,
}

impl ResolvedPath {
    /// Build a path from its parts.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` if any part is not a dotted
    /// identifier path, or if the leaf contains a dot.
    pub fn new(module: &str, owner: Option<&str>, leaf: Option<&str>) -> Result<Self, PatchError> {
        let dotted = [Some(module), owner, leaf]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(".");

        if !is_dotted_path(module) {
            return Err(PatchError::invalid_target(
                &dotted,
                format!("module `{}` is not a dotted identifier path", module),
            ));
        }
        if let Some(owner) = owner {
            if !is_dotted_path(owner) {
                return Err(PatchError::invalid_target(
                    &dotted,
                    format!("owner `{}` is not a dotted identifier path", owner),
                ));
            }
        }
        if let Some(leaf) = leaf {
            if !is_identifier(leaf) {
                return Err(PatchError::invalid_target(
                    &dotted,
                    format!("`{}` is not an identifier", leaf),
                ));
            }
        }

        Ok(Self {
            dotted,
            module: module.to_string(),
            owner: owner.map(str::to_string),
            leaf: leaf.map(str::to_string),
        })
    }

    /// Parse a dotted string path, trusting its structure.
    ///
    /// The last segment is the leaf. The segment before it is the owner when
    /// it names a type (starts with an uppercase letter); everything else is
    /// the module. At least two segments are required.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` for malformed paths.
    pub fn parse(path: &str) -> Result<Self, PatchError> {
        if !is_dotted_path(path) {
            return Err(PatchError::invalid_target(
                path,
                "only identifiers separated by dots are allowed",
            ));
        }

        let segments: Vec<&str> = path.split('.').collect();
        match segments.as_slice() {
            [] | [_] => Err(PatchError::invalid_target(
                path,
                "a string target needs at least a module and an attribute",
            )),
            [module, leaf] => Self::new(module, None, Some(*leaf)),
            [module @ .., owner, leaf] if names_type(owner) => {
                Self::new(&module.join("."), Some(*owner), Some(*leaf))
            }
            [module @ .., leaf] => Self::new(&module.join("."), None, Some(*leaf)),
        }
    }

    /// The rendered dotted path.
    pub fn as_str(&self) -> &str {
        &self.dotted
    }

    /// The module part.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The owning type, if any.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// The final name, if any. Module-only paths have no leaf.
    pub fn leaf(&self) -> Option<&str> {
        self.leaf.as_deref()
    }

    /// Address `member` below this path.
    ///
    /// A leaf naming a type becomes part of the owner; any other leaf is
    /// folded into the module.
    ///
    /// # Errors
    /// Returns `PatchError::InvalidTarget` if `member` is not an identifier.
    pub fn join(&self, member: &str) -> Result<Self, PatchError> {
        match (&self.owner, &self.leaf) {
            (Some(owner), Some(leaf)) => {
                Self::new(&self.module, Some(&format!("{}.{}", owner, leaf)), Some(member))
            }
            (None, Some(leaf)) if names_type(leaf) => {
                Self::new(&self.module, Some(leaf), Some(member))
            }
            (None, Some(leaf)) => {
                Self::new(&format!("{}.{}", self.module, leaf), None, Some(member))
            }
            (owner, None) => Self::new(&self.module, owner.as_deref(), Some(member)),
        }
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dotted)
    }
}

impl AsRef<str> for ResolvedPath {
    fn as_ref(&self) -> &str {
        &self.dotted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("_x"));
        assert!(is_identifier("__init__"));
        assert!(is_identifier("Batman2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("with-dash"));
        assert!(!is_identifier("a.b"));
    }

    #[test]
    fn test_new_renders_all_parts() {
        let path = ResolvedPath::new("pkg.mod", Some("C"), Some("_x")).unwrap();
        assert_eq!(path.as_str(), "pkg.mod.C._x");
        assert_eq!(path.module(), "pkg.mod");
        assert_eq!(path.owner(), Some("C"));
        assert_eq!(path.leaf(), Some("_x"));
    }

    #[test]
    fn test_module_only_path() {
        let path = ResolvedPath::new("pkg.mod", None, None).unwrap();
        assert_eq!(path.as_str(), "pkg.mod");
        assert_eq!(path.leaf(), None);
    }

    #[test]
    fn test_new_rejects_bad_characters() {
        let err = ResolvedPath::new("pkg.mod", Some("Wrapper<u8>"), None).unwrap_err();
        assert!(matches!(err, PatchError::InvalidTarget { .. }));

        let err = ResolvedPath::new("pkg..mod", None, Some("x")).unwrap_err();
        assert!(matches!(err, PatchError::InvalidTarget { .. }));

        let err = ResolvedPath::new("", None, Some("x")).unwrap_err();
        assert!(matches!(err, PatchError::InvalidTarget { .. }));
    }

    #[test]
    fn test_parse_splits_owner_by_type_convention() {
        let path = ResolvedPath::parse("test_cases.my_heroes.Batman.eating_banana").unwrap();
        assert_eq!(path.module(), "test_cases.my_heroes");
        assert_eq!(path.owner(), Some("Batman"));
        assert_eq!(path.leaf(), Some("eating_banana"));

        let path = ResolvedPath::parse("os.path.join").unwrap();
        assert_eq!(path.module(), "os.path");
        assert_eq!(path.owner(), None);
        assert_eq!(path.leaf(), Some("join"));
    }

    #[test]
    fn test_parse_two_segments() {
        let path = ResolvedPath::parse("sys.stdout").unwrap();
        assert_eq!(path.module(), "sys");
        assert_eq!(path.leaf(), Some("stdout"));
    }

    #[test]
    fn test_parse_rejects_single_segment() {
        assert!(matches!(
            ResolvedPath::parse("sys"),
            Err(PatchError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_whitespace_and_punctuation() {
        for bad in ["sys. stdout", "sys.std$out", "sys.stdout.", "a/b.c", "a.b()"] {
            assert!(
                matches!(ResolvedPath::parse(bad), Err(PatchError::InvalidTarget { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_join_member() {
        let class = ResolvedPath::parse("pkg.mod.C").unwrap();
        assert_eq!(class.join("x").unwrap().owner(), Some("C"));

        let nested = ResolvedPath::parse("pkg.Outer.Inner").unwrap();
        let joined = nested.join("run").unwrap();
        assert_eq!(joined.owner(), Some("Outer.Inner"));
        assert_eq!(joined.as_str(), "pkg.Outer.Inner.run");

        let module = ResolvedPath::parse("os.path").unwrap();
        assert_eq!(module.join("join").unwrap().module(), "os.path");
        assert!(module.join("bad name").is_err());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let a = ResolvedPath::parse("pkg.mod.C._x").unwrap();
        let b = ResolvedPath::parse("pkg.mod.C._x").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, ResolvedPath::new("pkg.mod", Some("C"), Some("_x")).unwrap());
    }
}
