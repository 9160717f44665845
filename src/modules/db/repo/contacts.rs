use rusqlite::{params, OptionalExtension, Row};

use crate::modules::db::manager::DATABASE;
use crate::modules::error::InboxResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    Unknown,
    Internal,
    Vip,
    External,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Internal => "internal",
            Self::Vip => "vip",
            Self::External => "external",
        }
    }
    pub fn parse(s: &str) -> Self {
        match s {
            "internal" => Self::Internal,
            "vip" => Self::Vip,
            "external" => Self::External,
            _ => Self::Unknown,
        }
    }
}

/// §3 `Contact` working-memory entity, one row per distinct email
/// address the mailbox has ever interacted with.
#[derive(Debug, Clone)]
pub struct Contact {
    pub id: String,
    pub email: String,
    pub organization: Option<String>,
    pub relationship: Relationship,
    pub first_seen_at: Option<i64>,
    pub last_interaction_at: Option<i64>,
    pub total_count: i64,
    pub they_initiated_count: i64,
    pub user_initiated_count: i64,
    pub cc_count: i64,
    pub is_internal: bool,
    pub updated_at: Option<i64>,
}

fn from_row(row: &Row) -> rusqlite::Result<Contact> {
    let relationship: String = row.get("relationship")?;
    Ok(Contact {
        id: row.get("id")?,
        email: row.get("email")?,
        organization: row.get("organization")?,
        relationship: Relationship::parse(&relationship),
        first_seen_at: row.get("first_seen_at")?,
        last_interaction_at: row.get("last_interaction_at")?,
        total_count: row.get("total_count")?,
        they_initiated_count: row.get("they_initiated_count")?,
        user_initiated_count: row.get("user_initiated_count")?,
        cc_count: row.get("cc_count")?,
        is_internal: row.get::<_, i64>("is_internal")? != 0,
        updated_at: row.get("updated_at")?,
    })
}

pub async fn get_by_email(email: String) -> InboxResult<Option<Contact>> {
    DATABASE
        .with_conn(move |conn| {
            Ok(conn
                .query_row("SELECT * FROM contacts WHERE email = ?1", params![email], from_row)
                .optional()?)
        })
        .await
}

/// Touches a contact's interaction counters, per spec.md §4.8's contact
/// update rule: increments `total_count` plus either
/// `they_initiated_count`/`user_initiated_count` depending on
/// direction, and `cc_count` when the contact was only CC'd.
pub async fn touch(
    email: String,
    at: i64,
    they_initiated: bool,
    user_initiated: bool,
    was_cc: bool,
) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            let existing: Option<String> = conn
                .query_row("SELECT id FROM contacts WHERE email = ?1", params![email], |row| {
                    row.get(0)
                })
                .optional()?;
            match existing {
                Some(id) => {
                    conn.execute(
                        "UPDATE contacts SET
                            last_interaction_at = ?2,
                            total_count = total_count + 1,
                            they_initiated_count = they_initiated_count + ?3,
                            user_initiated_count = user_initiated_count + ?4,
                            cc_count = cc_count + ?5,
                            updated_at = ?2
                         WHERE id = ?1",
                        params![id, at, they_initiated as i64, user_initiated as i64, was_cc as i64],
                    )?;
                }
                None => {
                    conn.execute(
                        "INSERT INTO contacts (
                            id, email, relationship, first_seen_at, last_interaction_at,
                            total_count, they_initiated_count, user_initiated_count, cc_count,
                            is_internal, updated_at
                        ) VALUES (?1,?2,'unknown',?3,?3,1,?4,?5,?6,0,?3)",
                        params![
                            uuid::Uuid::new_v4().to_string(),
                            email,
                            at,
                            they_initiated as i64,
                            user_initiated as i64,
                            was_cc as i64,
                        ],
                    )?;
                }
            }
            Ok(())
        })
        .await
}

pub async fn set_relationship(email: String, relationship: Relationship) -> InboxResult<()> {
    DATABASE
        .with_conn(move |conn| {
            conn.execute(
                "UPDATE contacts SET relationship = ?2 WHERE email = ?1",
                params![email, relationship.as_str()],
            )?;
            Ok(())
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn touch_creates_then_accumulates() {
        let email = "contact-repo-test-1@example.com".to_string();
        touch(email.clone(), 100, true, false, false).await.unwrap();
        touch(email.clone(), 200, false, true, false).await.unwrap();

        let contact = get_by_email(email).await.unwrap().unwrap();
        assert_eq!(contact.total_count, 2);
        assert_eq!(contact.they_initiated_count, 1);
        assert_eq!(contact.user_initiated_count, 1);
        assert_eq!(contact.last_interaction_at, Some(200));
    }
}
