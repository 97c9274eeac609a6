// Settlement signals: one-shot futures resolved at tier-cycle boundaries

use common::errors::SettleError;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// One-shot future resolved at the next boundary where the immediate queue is
/// empty and the timed queue has been checked at least once since the call.
///
/// This is deliberately weaker than "all queued timed tasks have run": a
/// single tier-cycle boundary suffices. Resolves `Err(EngineClosed)` if the
/// engine is closed first.
#[derive(Debug)]
pub struct Settlement {
    rx: oneshot::Receiver<()>,
}

impl Settlement {
    pub(crate) fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx }
    }

    /// A settlement that is already failed, for calls against a closed engine.
    pub(crate) fn closed() -> Self {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        Self { rx }
    }
}

impl Future for Settlement {
    type Output = Result<(), SettleError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| SettleError::EngineClosed))
    }
}

/// Pending settlement waiters.
///
/// Every registered waiter is satisfied by the next qualifying boundary;
/// concurrent registrations all resolve together.
#[derive(Debug, Default)]
pub(crate) struct SettlementRegistry {
    waiters: Vec<oneshot::Sender<()>>,
}

impl SettlementRegistry {
    pub fn register(&mut self) -> Settlement {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Settlement::new(rx)
    }

    /// Resolve every pending waiter. Receivers dropped in the meantime are
    /// simply skipped by the failed send.
    pub fn resolve_all(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// Drop all senders, failing every pending settlement.
    pub fn fail_all(&mut self) {
        self.waiters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_registered_settlement_resolves() {
        let mut registry = SettlementRegistry::default();
        let settlement = registry.register();

        registry.resolve_all();
        assert_eq!(settlement.await, Ok(()));
    }

    #[tokio::test]
    async fn test_all_concurrent_waiters_resolve_together() {
        let mut registry = SettlementRegistry::default();
        let first = registry.register();
        let second = registry.register();

        registry.resolve_all();
        assert_eq!(first.await, Ok(()));
        assert_eq!(second.await, Ok(()));
    }

    #[tokio::test]
    async fn test_failed_registry_yields_engine_closed() {
        let mut registry = SettlementRegistry::default();
        let settlement = registry.register();

        registry.fail_all();
        assert_eq!(settlement.await, Err(SettleError::EngineClosed));
    }

    #[tokio::test]
    async fn test_closed_settlement_is_already_failed() {
        assert_eq!(Settlement::closed().await, Err(SettleError::EngineClosed));
    }
}
