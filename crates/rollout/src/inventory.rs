//! Host inventory resolution
//!
//! Turns the configuration source's host list plus a user selection into
//! the ordered host set of a run.

use crate::context::HostSource;
use crate::error::{Error, Result};
use crate::types::HostId;
use regex::Regex;
use std::collections::HashSet;

/// Which hosts of the inventory a run targets
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostSelection {
    /// Every host
    #[default]
    All,
    /// Glob pattern matched against the whole host id
    Pattern(String),
    /// Explicit hosts, in the given order
    Explicit(Vec<String>),
}

impl HostSelection {
    /// Build a selection from CLI-style inputs
    ///
    /// Explicit hosts take precedence over a pattern; an empty pattern
    /// selects everything.
    pub fn from_args(hosts: Vec<String>, filter: Option<String>) -> Self {
        if !hosts.is_empty() {
            Self::Explicit(hosts)
        } else {
            match filter {
                Some(p) if !p.trim().is_empty() => Self::Pattern(p),
                _ => Self::All,
            }
        }
    }
}

/// Resolve the ordered host set for a run
///
/// Order follows the source; duplicates keep their first position.
pub fn resolve(source: &dyn HostSource, selection: &HostSelection) -> Result<Vec<HostId>> {
    let listed = source
        .list_hosts()
        .map_err(|e| Error::InventoryUnavailable {
            message: format!("{e:#}"),
        })?;

    let mut seen = HashSet::new();
    let inventory: Vec<HostId> = listed
        .into_iter()
        .filter(|h| !h.trim().is_empty())
        .filter(|h| seen.insert(h.clone()))
        .map(HostId::new)
        .collect();

    log::debug!("Inventory lists {} hosts", inventory.len());

    match selection {
        HostSelection::All => Ok(inventory),
        HostSelection::Pattern(pattern) => {
            let matcher = glob_to_regex(pattern)?;
            Ok(inventory
                .into_iter()
                .filter(|h| matcher.is_match(h.as_str()))
                .collect())
        }
        HostSelection::Explicit(wanted) => {
            let known: HashSet<&str> = inventory.iter().map(HostId::as_str).collect();
            let mut picked = Vec::new();
            let mut seen = HashSet::new();
            for name in wanted {
                if !known.contains(name.as_str()) {
                    return Err(Error::UnknownHost(HostId::new(name.clone())));
                }
                if seen.insert(name.as_str()) {
                    picked.push(HostId::new(name.clone()));
                }
            }
            Ok(picked)
        }
    }
}

/// Translate a glob (`*`, `?`, `[...]`) into an anchored regex
pub fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::from("^");
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                if chars.peek() == Some(&'!') {
                    chars.next();
                    class.push('^');
                }
                for next in chars.by_ref() {
                    if next == ']' {
                        closed = true;
                        break;
                    }
                    if next == '\\' || next == '[' {
                        class.push('\\');
                    }
                    class.push(next);
                }
                if !closed {
                    return Err(Error::Invalid {
                        what: "host pattern",
                        message: format!("unclosed '[' in {pattern}"),
                    });
                }
                re.push('[');
                re.push_str(&class);
                re.push(']');
            }
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');

    Regex::new(&re).map_err(|e| Error::Invalid {
        what: "host pattern",
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ListSource(Vec<&'static str>);

    impl HostSource for ListSource {
        fn list_hosts(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    struct BrokenSource;

    impl HostSource for BrokenSource {
        fn list_hosts(&self) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("flake evaluation failed")
        }
    }

    fn names(hosts: &[HostId]) -> Vec<&str> {
        hosts.iter().map(HostId::as_str).collect()
    }

    #[test]
    fn test_resolve_all_keeps_order() {
        let source = ListSource(vec!["web2", "web1", "kiosk-a"]);
        let hosts = resolve(&source, &HostSelection::All).unwrap();
        assert_eq!(names(&hosts), vec!["web2", "web1", "kiosk-a"]);
    }

    #[test]
    fn test_resolve_drops_duplicates_and_blanks() {
        let source = ListSource(vec!["a", "b", "a", " ", "c"]);
        let hosts = resolve(&source, &HostSelection::All).unwrap();
        assert_eq!(names(&hosts), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_resolve_pattern() {
        let source = ListSource(vec!["web1", "web2", "db1", "kiosk-web"]);
        let hosts = resolve(&source, &HostSelection::Pattern("web*".into())).unwrap();
        assert_eq!(names(&hosts), vec!["web1", "web2"]);

        let hosts = resolve(&source, &HostSelection::Pattern("*web*".into())).unwrap();
        assert_eq!(names(&hosts), vec!["web1", "web2", "kiosk-web"]);

        let hosts = resolve(&source, &HostSelection::Pattern("??1".into())).unwrap();
        assert_eq!(names(&hosts), vec!["db1"]);
    }

    #[test]
    fn test_resolve_explicit() {
        let source = ListSource(vec!["a", "b", "c"]);
        let selection = HostSelection::Explicit(vec!["c".into(), "a".into(), "c".into()]);
        let hosts = resolve(&source, &selection).unwrap();
        assert_eq!(names(&hosts), vec!["c", "a"]);
    }

    #[test]
    fn test_resolve_explicit_unknown_host() {
        let source = ListSource(vec!["a"]);
        let selection = HostSelection::Explicit(vec!["typo".into()]);
        let err = resolve(&source, &selection).unwrap_err();
        assert!(matches!(err, Error::UnknownHost(h) if h.as_str() == "typo"));
    }

    #[test]
    fn test_resolve_inventory_unavailable() {
        let err = resolve(&BrokenSource, &HostSelection::All).unwrap_err();
        assert!(matches!(err, Error::InventoryUnavailable { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_glob_classes() {
        let re = glob_to_regex("web[12]").unwrap();
        assert!(re.is_match("web1"));
        assert!(re.is_match("web2"));
        assert!(!re.is_match("web3"));

        let re = glob_to_regex("web[!1]").unwrap();
        assert!(!re.is_match("web1"));
        assert!(re.is_match("web3"));
    }

    #[test]
    fn test_glob_escapes_regex_chars() {
        let re = glob_to_regex("host.lan").unwrap();
        assert!(re.is_match("host.lan"));
        assert!(!re.is_match("hostxlan"));
    }

    #[test]
    fn test_glob_unclosed_class() {
        assert!(glob_to_regex("web[1").is_err());
    }

    #[test]
    fn test_selection_from_args() {
        assert_eq!(HostSelection::from_args(vec![], None), HostSelection::All);
        assert_eq!(
            HostSelection::from_args(vec![], Some("  ".into())),
            HostSelection::All
        );
        assert_eq!(
            HostSelection::from_args(vec![], Some("web*".into())),
            HostSelection::Pattern("web*".into())
        );
        assert_eq!(
            HostSelection::from_args(vec!["a".into()], Some("web*".into())),
            HostSelection::Explicit(vec!["a".into()])
        );
    }
}
