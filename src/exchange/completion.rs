//! Unit-of-work callbacks attached to an exchange.

use super::Exchange;

/// Callback invoked once when the exchange that owns it is done.
///
/// Sources that need an acknowledgement (a queue that removes a message, a
/// file consumer that moves a file) attach one of these to the exchanges
/// they hand out.
pub trait Synchronization: Send + Sync {
    /// The exchange completed without an exception
    fn on_complete(&self, exchange: &Exchange);

    /// The exchange completed with an exception
    fn on_failure(&self, exchange: &Exchange);
}

/// Synchronization built from two closures
pub struct FnSynchronization<C, F>
where
    C: Fn(&Exchange) + Send + Sync,
    F: Fn(&Exchange) + Send + Sync,
{
    on_complete: C,
    on_failure: F,
}

impl<C, F> FnSynchronization<C, F>
where
    C: Fn(&Exchange) + Send + Sync,
    F: Fn(&Exchange) + Send + Sync,
{
    pub fn new(on_complete: C, on_failure: F) -> Self {
        Self {
            on_complete,
            on_failure,
        }
    }
}

impl<C, F> Synchronization for FnSynchronization<C, F>
where
    C: Fn(&Exchange) + Send + Sync,
    F: Fn(&Exchange) + Send + Sync,
{
    fn on_complete(&self, exchange: &Exchange) {
        (self.on_complete)(exchange)
    }

    fn on_failure(&self, exchange: &Exchange) {
        (self.on_failure)(exchange)
    }
}
