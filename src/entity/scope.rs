//! Enumeration scopes.

use std::fmt;
use std::str::FromStr;

use crate::error::{StoreError, ValidationError};

use super::kind::Kind;

/// Qualifies which parents are consulted when looking up or enumerating children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// This collection only.
    #[default]
    Coll,
    /// This collection plus the site overlay.
    All,
    /// The site overlay only.
    Site,
    /// Collection-local entries, used when the overlay is cached separately.
    NoSite,
    /// Collection-local, plus the overlay for user records.
    User,
    /// Candidates for a selection list; same as `All`.
    Select,
}

impl Scope {
    /// Returns the scope name used as a cache key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coll => "coll",
            Self::All => "all",
            Self::Site => "site",
            Self::NoSite => "nosite",
            Self::User => "user",
            Self::Select => "select",
        }
    }

    /// Parses an optional scope name; `None` means collection-local.
    pub fn from_name(name: Option<&str>) -> Result<Self, StoreError> {
        name.map_or(Ok(Self::Coll), str::parse)
    }

    /// Returns true if the primary (collection-local) location is consulted.
    #[must_use]
    pub const fn includes_local(self) -> bool {
        !matches!(self, Self::Site)
    }

    /// Returns true if the alternate (site overlay) location is consulted for `kind`.
    #[must_use]
    pub fn includes_alt(self, kind: &Kind) -> bool {
        match self {
            Self::All | Self::Site | Self::Select => true,
            Self::User => *kind == Kind::User,
            Self::Coll | Self::NoSite => false,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "coll" | "" => Ok(Self::Coll),
            "all" => Ok(Self::All),
            "site" => Ok(Self::Site),
            "nosite" => Ok(Self::NoSite),
            "user" => Ok(Self::User),
            "select" => Ok(Self::Select),
            other => Err(ValidationError::InvalidValue {
                field: "scope".to_string(),
                reason: format!("unknown scope '{other}'"),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope() {
        assert_eq!("all".parse::<Scope>().unwrap(), Scope::All);
        assert_eq!(Scope::from_name(None).unwrap(), Scope::Coll);
        assert_eq!(Scope::from_name(Some("select")).unwrap(), Scope::Select);
        assert!("everything".parse::<Scope>().is_err());
    }

    #[test]
    fn test_scope_coverage() {
        assert!(Scope::All.includes_local());
        assert!(!Scope::Site.includes_local());
        assert!(Scope::Site.includes_alt(&Kind::Type));
        assert!(!Scope::NoSite.includes_alt(&Kind::Type));
        assert!(!Scope::Coll.includes_alt(&Kind::Type));
        assert!(Scope::User.includes_alt(&Kind::User));
        assert!(!Scope::User.includes_alt(&Kind::Type));
        assert!(Scope::Select.includes_alt(&Kind::Field));
    }
}
