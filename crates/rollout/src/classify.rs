//! Host category from naming conventions.
//!
//! Display only. Nothing in the engine branches on a category.

use crate::types::HostCategory;

const KIOSK_TOKENS: &[&str] = &["kiosk", "signage", "display"];
const SERVER_TOKENS: &[&str] = &["srv", "server", "nas", "node", "vps", "db", "web"];
const WORKSTATION_TOKENS: &[&str] = &["ws", "desktop", "laptop", "workstation", "pc", "tp"];

/// Classify a host by its name
pub fn classify(name: &str) -> HostCategory {
    let lower = name.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(['-', '_', '.'])
        .filter(|t| !t.is_empty())
        .collect();

    let has = |set: &[&str]| {
        tokens
            .iter()
            .any(|t| set.contains(t) || set.contains(&t.trim_end_matches(char::is_numeric)))
    };

    if has(KIOSK_TOKENS) || lower.contains("kiosk") {
        HostCategory::Kiosk
    } else if has(SERVER_TOKENS) || lower.contains("server") {
        HostCategory::Server
    } else if has(WORKSTATION_TOKENS) || lower.contains("workstation") {
        HostCategory::Workstation
    } else {
        HostCategory::Other
    }
}
