use async_trait::async_trait;
use watchtower_primitives::locator::Locator;

use crate::breach::ValidBreach;

/// Acts on valid breaches, typically by broadcasting the penalty and following it until it is
/// buried.
///
/// The responder owns its own block-processing loop and attaches to the chain monitor
/// independently of the watcher.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Takes ownership of a breach. The watcher forgets the appointment right after this returns.
    async fn handle_breach(&self, breach: ValidBreach);

    /// Whether a breach for `locator` was handed over and is still tracked.
    async fn has_responded(&self, locator: &Locator) -> bool;
}
