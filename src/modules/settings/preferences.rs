use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::modules::error::InboxResult;
use crate::modules::settings::dir::DATA_DIR_MANAGER;

const PREFERENCES_FILE: &str = "preferences.json";

/// User-editable overrides read from `<user_root>/preferences.json`,
/// grounded on `original_source/src/preferences.py`. Absent keys fall
/// back to the configured defaults in `modules::settings::cli::SETTINGS`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub vip_senders: Vec<String>,
    pub categories_mode: Option<bool>,
    pub outlook_categories: Option<serde_json::Value>,
    pub followup_n_days: Option<i64>,
    pub digest_day: Option<String>,
    pub digest_time_local: Option<String>,
    pub timezone: Option<String>,
}

fn preferences_path() -> std::path::PathBuf {
    DATA_DIR_MANAGER.user_root.join(PREFERENCES_FILE)
}

/// Reads preferences, tolerating a missing or malformed file (mirrors
/// the original's "absent file or bad JSON means empty prefs" fallback).
pub fn read() -> Preferences {
    let path = preferences_path();
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Preferences::default();
    };
    serde_json::from_str(&text).unwrap_or_default()
}

/// Atomic write-then-rename, matching the durability pattern used
/// elsewhere in this engine for anything user-facing on disk.
pub fn write(prefs: &Preferences) -> InboxResult<()> {
    let path = preferences_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(prefs)?)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

pub fn is_vip_sender(prefs: &Preferences, sender: &str) -> bool {
    let sender = sender.trim().to_lowercase();
    if sender.is_empty() {
        return false;
    }
    let vip: HashSet<String> = prefs.vip_senders.iter().map(|s| s.trim().to_lowercase()).collect();
    vip.contains(&sender)
}

/// Categories mode is the default organizer behavior unless a user
/// preference explicitly opts into legacy folder mode.
pub fn categories_mode_enabled(prefs: &Preferences) -> bool {
    prefs.categories_mode.unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vip_match_is_case_insensitive() {
        let prefs = Preferences { vip_senders: vec!["CFO@Acme.com".to_string()], ..Default::default() };
        assert!(is_vip_sender(&prefs, "cfo@acme.com"));
        assert!(!is_vip_sender(&prefs, "ceo@acme.com"));
    }

    #[test]
    fn categories_mode_defaults_to_enabled() {
        assert!(categories_mode_enabled(&Preferences::default()));
        assert!(!categories_mode_enabled(&Preferences { categories_mode: Some(false), ..Default::default() }));
    }
}
