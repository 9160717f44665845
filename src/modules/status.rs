use serde::Serialize;

use crate::modules::metrics::{
    ATTACHMENTS_BY_STATUS, CHUNKS_CREATED, MESSAGES_UPSERTED, TRIGGERS_EMITTED,
};

/// Read-only in-process snapshot. Replaces the teacher's REST/gRPC
/// surface, which spec.md places out of scope as a CLI/admin feature —
/// the ambient "report what the process is doing" concern is still
/// carried (SPEC_FULL.md §A.5), just not as a network service.
#[derive(Debug, Serialize, Default)]
pub struct StatusSnapshot {
    pub messages_upserted: i64,
    pub attachments_by_status: Vec<(String, i64)>,
    pub chunks_created: i64,
    pub triggers_emitted: Vec<(String, i64)>,
}

pub fn snapshot() -> StatusSnapshot {
    let messages_upserted: i64 = MESSAGES_UPSERTED
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| m.get_counter().value() as i64)
        .sum();

    let attachments_by_status = ATTACHMENTS_BY_STATUS
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| {
            let status = m
                .get_label()
                .iter()
                .find(|l| l.name() == "status")
                .map(|l| l.value().to_string())
                .unwrap_or_default();
            (status, m.get_counter().value() as i64)
        })
        .collect();

    let chunks_created: i64 = CHUNKS_CREATED
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| m.get_counter().value() as i64)
        .sum();

    let triggers_emitted = TRIGGERS_EMITTED
        .collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| {
            let trigger_type = m
                .get_label()
                .iter()
                .find(|l| l.name() == "trigger_type")
                .map(|l| l.value().to_string())
                .unwrap_or_default();
            (trigger_type, m.get_counter().value() as i64)
        })
        .collect();

    StatusSnapshot {
        messages_upserted,
        attachments_by_status,
        chunks_created,
        triggers_emitted,
    }
}
