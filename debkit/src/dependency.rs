// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package relationship fields.

Parses the dependency meta language used by `Depends`, `Suggests` and
friends: `libc6 (>= 2.15), gpgv | gpgv2, python3:any, foo [i386]`.

The parser is deliberately shallow. Alternatives collapse to their first
branch, and architecture qualifiers (`:any`) and restrictions (`[i386]`)
are recognised but dropped. The resolver only needs package names.
*/

use {once_cell::sync::Lazy, regex::Regex, std::fmt};

static CLAUSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<name>[A-Za-z0-9][A-Za-z0-9+.-]*)(?::\w+)?(?: \((?P<relation>>>|>=|=|<=|<<) (?P<version>\S+)\))?(?: \[[^\]]+\])?(?: \|.*)?$",
    )
    .expect("dependency clause pattern is valid")
});

/// A version comparison operator in a dependency clause.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum VersionRelation {
    StrictlyEarlier,
    EarlierOrEqual,
    Exactly,
    LaterOrEqual,
    StrictlyLater,
}

impl VersionRelation {
    /// Parse the two-character operator syntax.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "<<" => Some(Self::StrictlyEarlier),
            "<=" => Some(Self::EarlierOrEqual),
            "=" => Some(Self::Exactly),
            ">=" => Some(Self::LaterOrEqual),
            ">>" => Some(Self::StrictlyLater),
            _ => None,
        }
    }

    /// The operator as written in control files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrictlyEarlier => "<<",
            Self::EarlierOrEqual => "<=",
            Self::Exactly => "=",
            Self::LaterOrEqual => ">=",
            Self::StrictlyLater => ">>",
        }
    }
}

impl fmt::Display for VersionRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed dependency clause.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dependency {
    pub name: String,
    pub relation: Option<VersionRelation>,
    pub version: Option<String>,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.relation, &self.version) {
            (Some(relation), Some(version)) => {
                write!(f, "{} ({} {})", self.name, relation, version)
            }
            _ => f.write_str(&self.name),
        }
    }
}

impl Dependency {
    /// Parse a single clause. Returns [None] for syntax the shallow grammar
    /// does not recognise.
    pub fn parse(clause: &str) -> Option<Self> {
        let captures = CLAUSE_RE.captures(clause.trim())?;

        Some(Self {
            name: captures
                .name("name")
                .expect("name group always matches")
                .as_str()
                .to_string(),
            relation: captures
                .name("relation")
                .and_then(|m| VersionRelation::parse(m.as_str())),
            version: captures.name("version").map(|m| m.as_str().to_string()),
        })
    }
}

/// Parse a comma-separated dependency field value.
///
/// Clauses the grammar cannot express are skipped with a warning rather
/// than failing the whole field.
pub fn parse_dependencies(value: &str) -> Vec<Dependency> {
    let value = value.trim();
    if value.is_empty() {
        return Vec::new();
    }

    value
        .split(", ")
        .filter_map(|clause| match Dependency::parse(clause) {
            Some(dependency) => Some(dependency),
            None => {
                log::warn!("skipping unparseable dependency clause: {}", clause);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names() {
        let dep = Dependency::parse("adduser").unwrap();
        assert_eq!(dep.name, "adduser");
        assert_eq!(dep.relation, None);
        assert_eq!(dep.version, None);

        let dep = Dependency::parse("perlapi-5.28.0").unwrap();
        assert_eq!(dep.name, "perlapi-5.28.0");
    }

    #[test]
    fn versioned_clause() {
        let dep = Dependency::parse("libc6 (>= 2.15)").unwrap();
        assert_eq!(dep.name, "libc6");
        assert_eq!(dep.relation, Some(VersionRelation::LaterOrEqual));
        assert_eq!(dep.version.as_deref(), Some("2.15"));
        assert_eq!(dep.to_string(), "libc6 (>= 2.15)");
    }

    #[test]
    fn alternatives_collapse_to_first_branch() {
        let dep = Dependency::parse("gpgv | gpgv2").unwrap();
        assert_eq!(dep.name, "gpgv");
    }

    #[test]
    fn qualifiers_and_restrictions_are_dropped() {
        let dep = Dependency::parse("python3:any (>= 3.5~)").unwrap();
        assert_eq!(dep.name, "python3");
        assert_eq!(dep.version.as_deref(), Some("3.5~"));

        let dep = Dependency::parse("perl:any").unwrap();
        assert_eq!(dep.name, "perl");

        let dep = Dependency::parse("foo [i386]").unwrap();
        assert_eq!(dep.name, "foo");
    }

    #[test]
    fn field_value_splits_on_commas() {
        let deps = parse_dependencies(
            "vim-common (= 2:8.2.2434-3), libacl1 (>= 2.2.23), libc6 (>= 2.29)",
        );
        assert_eq!(
            deps.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
            vec!["vim-common", "libacl1", "libc6"]
        );
    }

    #[test]
    fn empty_field_is_empty() {
        assert!(parse_dependencies("").is_empty());
        assert!(parse_dependencies("   ").is_empty());
    }
}
