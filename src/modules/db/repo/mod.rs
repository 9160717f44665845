pub mod alerts;
pub mod attachments;
pub mod chunks;
pub mod commitments;
pub mod contacts;
pub mod facts;
pub mod folders;
pub mod labels;
pub mod messages;
pub mod observations;
pub mod projects;
pub mod reply_tracking;
pub mod threads;
pub mod triage_log;
pub mod triggers;
pub mod weekly_digest;
