use crate::contact_store::ContactStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
///
/// Contains the shared contact store and the cancellation token used for
/// shutdown.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    pub contact_store: Arc<dyn ContactStore>,
}

impl JobContext {
    /// Create a new job context with the given dependencies.
    pub fn new(cancellation_token: CancellationToken, contact_store: Arc<dyn ContactStore>) -> Self {
        Self {
            cancellation_token,
            contact_store,
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}
