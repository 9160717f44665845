use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use crate::modules::context::Initialize;
use crate::modules::error::{code::ErrorCode, InboxResult};
use crate::modules::settings::cli::SETTINGS;
use crate::raise_error;

const CAPABILITY_NAME: &str = "inbox-assistant";
const DB_FILE: &str = "inbox.sqlite";
const LOG_DIR: &str = "logs";
const QUERIES_DIR: &str = "queries";
const OUTBOX_DIR: &str = "outbox";
const ATTACHMENT_TMP_DIR: &str = "attachments/tmp";

pub static DATA_DIR_MANAGER: LazyLock<DataDirManager> = LazyLock::new(DataDirManager::resolve);

#[derive(Debug)]
pub struct DataDirManager {
    pub user_root: PathBuf,
    pub state_dir: PathBuf,
    pub db_path: PathBuf,
    pub log_dir: PathBuf,
    pub queries_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub attachment_tmp_dir: PathBuf,
}

impl DataDirManager {
    /// Mirrors `original_source/src/database.py::get_user_root` /
    /// `get_state_dir` / `get_db_path`: explicit env var, then a mounted
    /// container root, then a local dev fallback keyed off
    /// `delegated_user`, then `~/agentaech`.
    fn resolve() -> Self {
        let user_root = resolve_user_root();
        let state_dir = SETTINGS
            .inbox_state_dir
            .as_ref()
            .map(|s| PathBuf::from(shellexpand_home(s)))
            .unwrap_or_else(|| user_root.join(format!(".{CAPABILITY_NAME}")));
        let db_path = SETTINGS
            .inbox_db_path
            .as_ref()
            .map(|s| PathBuf::from(shellexpand_home(s)))
            .unwrap_or_else(|| state_dir.join(DB_FILE));

        Self {
            log_dir: state_dir.join(LOG_DIR),
            queries_dir: state_dir.join(QUERIES_DIR),
            outbox_dir: state_dir.join(OUTBOX_DIR),
            attachment_tmp_dir: state_dir.join(ATTACHMENT_TMP_DIR),
            user_root,
            state_dir,
            db_path,
        }
    }
}

fn resolve_user_root() -> PathBuf {
    if let Some(configured) = &SETTINGS.aech_user_dir {
        return PathBuf::from(shellexpand_home(configured));
    }
    let container_root = Path::new("/home/agentaech");
    if container_root.exists() {
        return container_root.to_path_buf();
    }
    if let Some(delegated) = &SETTINGS.delegated_user {
        if let Ok(cwd) = std::env::current_dir() {
            return cwd.join("data").join("users").join(delegated);
        }
    }
    dirs_home().join("agentaech")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/root"))
}

fn shellexpand_home(s: &str) -> String {
    if let Some(rest) = s.strip_prefix("~/") {
        dirs_home().join(rest).to_string_lossy().into_owned()
    } else {
        s.to_string()
    }
}

impl Initialize for DataDirManager {
    async fn initialize() -> InboxResult<()> {
        for dir in [
            &DATA_DIR_MANAGER.state_dir,
            &DATA_DIR_MANAGER.log_dir,
            &DATA_DIR_MANAGER.queries_dir,
            &DATA_DIR_MANAGER.outbox_dir,
            &DATA_DIR_MANAGER.attachment_tmp_dir,
        ] {
            std::fs::create_dir_all(dir)
                .map_err(|e| raise_error!(format!("{e:#?}"), ErrorCode::InternalError))?;
        }
        Ok(())
    }
}

/// Fatal configuration check, per spec.md §7.6 ("missing DELEGATED_USER
/// is fatal at start-up"). Malformed syntax is rejected the same way,
/// rather than surfacing later as an opaque Graph API error.
pub fn require_delegated_user() -> InboxResult<String> {
    let user = SETTINGS.delegated_user.clone().ok_or_else(|| {
        raise_error!(
            "DELEGATED_USER is required but was not set".to_string(),
            ErrorCode::MissingConfiguration
        )
    })?;
    email_address::EmailAddress::from_str(&user).map_err(|e| {
        raise_error!(
            format!("DELEGATED_USER '{user}' is not a valid email address: {e}"),
            ErrorCode::InvalidConfiguration
        )
    })?;
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_delegated_user_accepts_the_configured_test_address() {
        assert_eq!(require_delegated_user().unwrap(), "test-user@example.com");
    }

    #[test]
    fn malformed_address_is_rejected() {
        assert!(email_address::EmailAddress::from_str("not-an-email").is_err());
    }
}
