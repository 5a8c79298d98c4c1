use sitebook_core::TenantId;

use crate::result::{AiError, AiResult};

/// One tenant-scoped inference over a caller-supplied snapshot.
pub trait AiJob: Send + Sync + 'static {
    type Input: Send + Sync + 'static;

    fn tenant_id(&self) -> TenantId;

    fn input(&self) -> &Self::Input;

    /// Run the inference. Must not mutate domain state.
    fn run(&self) -> Result<AiResult, AiError>;
}
