use crate::modules::error::InboxResult;

/// Process-wide singletons (database handle, embedding model, http
/// clients) implement this for an initialize-on-first-use / explicit
/// startup-order contract, per spec.md §9 ("Global state").
pub trait Initialize {
    async fn initialize() -> InboxResult<()>;
}
