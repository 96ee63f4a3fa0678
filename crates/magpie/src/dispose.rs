//
// dispose.rs
//
// Explicit ownership teardown with failure aggregation
//

use thiserror::Error;

/// A resource with an explicit teardown step.
///
/// Disposal is idempotent for every implementation in this crate: a second
/// `dispose` call is a no-op.
pub trait Disposable: Send {
    fn dispose(&mut self) -> anyhow::Result<()>;
}

/// Teardown of several owned resources produced more than one failure.
///
/// `errors` preserves registration order.
#[derive(Debug, Error)]
#[error("encountered {} errors while disposing of store", errors.len())]
pub struct MultiDisposeError {
    pub errors: Vec<anyhow::Error>,
}

/// Dispose every item in registration order, collecting failures.
///
/// Exactly one failure is returned directly; several are wrapped into a
/// single [`MultiDisposeError`]. The caller therefore sees at most one error
/// per teardown regardless of how many children failed.
pub fn dispose_all(disposables: &mut Vec<Box<dyn Disposable>>) -> anyhow::Result<()> {
    let mut errors = Vec::new();
    for disposable in disposables.iter_mut() {
        if let Err(e) = disposable.dispose() {
            errors.push(e);
        }
    }
    disposables.clear();

    if errors.len() == 1 {
        Err(errors.remove(0))
    } else if errors.len() > 1 {
        Err(MultiDisposeError { errors }.into())
    } else {
        Ok(())
    }
}

/// Owns a set of disposables and tears them down in registration order.
#[derive(Default)]
pub struct DisposableStore {
    items: Vec<Box<dyn Disposable>>,
    is_disposed: bool,
}

impl DisposableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `item` for teardown. If the store is already disposed the
    /// item is disposed immediately instead of being leaked.
    pub fn add(&mut self, mut item: Box<dyn Disposable>) {
        if self.is_disposed {
            log::warn!("Adding to disposed store; disposing item immediately");
            if let Err(e) = item.dispose() {
                log::warn!("Failed to dispose item added to disposed store: {e}");
            }
            return;
        }
        self.items.push(item);
    }

    pub fn is_disposed(&self) -> bool {
        self.is_disposed
    }
}

impl Disposable for DisposableStore {
    fn dispose(&mut self) -> anyhow::Result<()> {
        if self.is_disposed {
            return Ok(());
        }
        self.is_disposed = true;
        dispose_all(&mut self.items)
    }
}
