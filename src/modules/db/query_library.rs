use std::fs;

use tracing::info;

use crate::modules::error::InboxResult;
use crate::modules::settings::dir::DATA_DIR_MANAGER;

/// Writes a starter set of named `.sql` templates into the queries
/// directory on first run, grounded on
/// `examples/original_source/src/database.py::setup_query_library`.
/// Callers (e.g. a future ad-hoc reporting surface) load these by
/// filename rather than embedding SQL in Rust source, matching the
/// original's "queries live on disk, editable without a rebuild" design.
const TEMPLATES: &[(&str, &str)] = &[
    (
        "threads_needing_reply.sql",
        "SELECT id, subject, last_activity_at, reply_deadline\n\
         FROM threads\n\
         WHERE needs_reply = 1 AND status != 'archived'\n\
         ORDER BY reply_deadline ASC;\n",
    ),
    (
        "stale_observations.sql",
        "SELECT id, observation_type, content, observed_at\n\
         FROM observations\n\
         WHERE observed_at < ?1\n\
         ORDER BY observed_at ASC;\n",
    ),
    (
        "open_commitments.sql",
        "SELECT id, description, to_whom, due_by\n\
         FROM commitments\n\
         WHERE is_completed = 0\n\
         ORDER BY due_by ASC;\n",
    ),
    (
        "unresolved_decisions.sql",
        "SELECT id, question, urgency, deadline\n\
         FROM pending_decisions\n\
         WHERE is_resolved = 0\n\
         ORDER BY CASE urgency WHEN 'immediate' THEN 0 WHEN 'today' THEN 1 WHEN 'this_week' THEN 2 ELSE 3 END;\n",
    ),
    (
        "contact_relationship_summary.sql",
        "SELECT email, relationship, total_count, last_interaction_at\n\
         FROM contacts\n\
         ORDER BY last_interaction_at DESC\n\
         LIMIT 50;\n",
    ),
];

pub fn ensure_query_library() -> InboxResult<()> {
    let dir = &DATA_DIR_MANAGER.queries_dir;
    fs::create_dir_all(dir)?;
    for (name, body) in TEMPLATES {
        let path = dir.join(name);
        if !path.exists() {
            fs::write(&path, body)?;
            info!(file = %path.display(), "wrote query template");
        }
    }
    Ok(())
}
