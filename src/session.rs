//! The gateway session seen from the orchestrator.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::events::GatewayEvent;
use crate::types::ReadyEvent;

/// A logged-in connection to the gateway's event stream.
#[async_trait]
pub trait GatewaySession: Send {
    /// Authenticate with `token` and wait for READY.
    ///
    /// The READY event is returned here and is not repeated by
    /// [`next_event`](Self::next_event).
    async fn login(&mut self, token: &str) -> Result<ReadyEvent, GatewayError>;

    /// The next event in arrival order, or `None` once the session is gone.
    async fn next_event(&mut self) -> Option<GatewayEvent>;
}
