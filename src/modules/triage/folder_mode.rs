use std::collections::HashMap;
use std::sync::LazyLock;

use tracing::warn;

use crate::modules::db::repo::folders;
use crate::modules::error::InboxResult;
use crate::modules::graph::GraphClient;
use crate::modules::settings::cli::SETTINGS;
use crate::modules::triage::TriageVerdict;

/// Folder taxonomy for legacy folder-mode triage, transcribed from
/// `original_source/src/folders_config.py::STANDARD_FOLDERS`.
pub const STANDARD_FOLDERS: &[&str] = &[
    "Work",
    "Personal",
    "Newsletters",
    "Finance",
    "Promotions",
    "Social",
    "Shopping",
    "Travel",
    "Receipts",
    "Urgent",
    "Action Required",
    "Security Notifications",
    "Updates",
    "Forums",
    "Should Delete",
];

/// `folders_config.py::FOLDER_ALIASES` — loose classifier output gets
/// canonicalized against this table before falling back to substring
/// matching against `STANDARD_FOLDERS`.
pub static FOLDER_ALIASES: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("inbox", "Work"),
        ("job", "Work"),
        ("career", "Work"),
        ("family", "Personal"),
        ("friends", "Personal"),
        ("newsletter", "Newsletters"),
        ("digest", "Newsletters"),
        ("bank", "Finance"),
        ("invoice", "Finance"),
        ("billing", "Finance"),
        ("ad", "Promotions"),
        ("offer", "Promotions"),
        ("deal", "Promotions"),
        ("facebook", "Social"),
        ("linkedin", "Social"),
        ("order", "Shopping"),
        ("purchase", "Shopping"),
        ("flight", "Travel"),
        ("hotel", "Travel"),
        ("itinerary", "Travel"),
        ("receipt", "Receipts"),
        ("asap", "Urgent"),
        ("spam", "Should Delete"),
        ("junk", "Should Delete"),
    ])
});

/// Maps a classifier-provided destination to one of `STANDARD_FOLDERS`,
/// per `organizer.py::_normalize_folder_name`: exact match first, then
/// the alias table, then substring containment, defaulting to "Work".
pub fn normalize_folder_name(raw: &str) -> &'static str {
    let lower = raw.trim().to_lowercase();

    if let Some(exact) = STANDARD_FOLDERS.iter().find(|f| f.eq_ignore_ascii_case(&lower)) {
        return exact;
    }
    if let Some(mapped) = FOLDER_ALIASES.get(lower.as_str()) {
        return mapped;
    }
    for (alias, folder) in FOLDER_ALIASES.iter() {
        if lower.contains(alias) {
            return folder;
        }
    }
    "Work"
}

fn prefixed(folder: &str) -> String {
    if SETTINGS.folder_prefix.is_empty() {
        folder.to_string()
    } else {
        format!("{}{folder}", SETTINGS.folder_prefix)
    }
}

/// Legacy folder-mode action dispatch: resolve the canonical, prefixed
/// destination folder and move or delete the message via Graph.
pub async fn execute(client: &dyn GraphClient, message_id: &str, verdict: &TriageVerdict) -> InboxResult<()> {
    if verdict.action == "delete" {
        client.delete_message(message_id).await?;
        return Ok(());
    }

    if verdict.action != "move" {
        return Ok(());
    }

    let raw_destination = verdict.destination_folder.as_deref().unwrap_or(&verdict.category);
    let canonical = normalize_folder_name(raw_destination);
    let display_name = prefixed(canonical);

    match folders::find_by_display_name(display_name.clone()).await? {
        Some(folder) => client.move_message(message_id, &folder.id).await,
        None => {
            warn!(destination = %display_name, message_id, "destination folder not found, leaving message in place");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_standard_folder_name_passes_through() {
        assert_eq!(normalize_folder_name("Finance"), "Finance");
    }

    #[test]
    fn alias_maps_to_canonical_folder() {
        assert_eq!(normalize_folder_name("newsletter"), "Newsletters");
    }

    #[test]
    fn substring_alias_match_is_case_insensitive() {
        assert_eq!(normalize_folder_name("Flight Confirmation"), "Travel");
    }

    #[test]
    fn unrecognized_destination_falls_back_to_work() {
        assert_eq!(normalize_folder_name("whatever this is"), "Work");
    }
}
