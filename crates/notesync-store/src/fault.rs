//! Fault injection shared by the in-memory adapters.
//!
//! Tests use it to make a given operation fail, to hold an operation
//! in flight until released, and to count calls. Without the `mock` feature
//! the plan stays empty and every operation passes straight through.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use notesync_core::Error;

/// Operations a fault can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Subscribe,
    Create,
    Patch,
    Delete,
    BlobWrite,
    BlobResolve,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Subscribe => "subscribe",
            StoreOp::Create => "create",
            StoreOp::Patch => "patch",
            StoreOp::Delete => "delete",
            StoreOp::BlobWrite => "blob_write",
            StoreOp::BlobResolve => "blob_resolve",
        }
    }
}

/// Failure an injected fault produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    PermissionDenied,
    Unavailable,
}

impl Fault {
    pub fn to_error(self, op: StoreOp) -> Error {
        match self {
            Fault::PermissionDenied => {
                Error::PermissionDenied(format!("injected fault on {}", op.as_str()))
            }
            Fault::Unavailable => Error::Unavailable(format!("injected fault on {}", op.as_str())),
        }
    }
}

#[derive(Debug, Default)]
struct Plan {
    faults: HashMap<StoreOp, Fault>,
    gates: HashMap<StoreOp, Arc<Notify>>,
    calls: HashMap<StoreOp, usize>,
}

/// Per-adapter fault plan.
#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    inner: Mutex<Plan>,
}

impl FaultPlan {
    fn lock(&self) -> MutexGuard<'_, Plan> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call, wait on a pending gate, then apply any fault.
    pub(crate) async fn enter(&self, op: StoreOp) -> Result<(), Error> {
        let gate = {
            let mut plan = self.lock();
            *plan.calls.entry(op).or_default() += 1;
            plan.gates.remove(&op)
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.lock().faults.get(&op) {
            Some(fault) => Err(fault.to_error(op)),
            None => Ok(()),
        }
    }

    #[cfg_attr(not(any(test, feature = "mock")), allow(dead_code))]
    pub(crate) fn inject(&self, op: StoreOp, fault: Fault) {
        self.lock().faults.insert(op, fault);
    }

    #[cfg_attr(not(any(test, feature = "mock")), allow(dead_code))]
    pub(crate) fn clear(&self, op: StoreOp) {
        self.lock().faults.remove(&op);
    }

    /// Hold the next call of `op` until the returned handle is notified.
    #[cfg_attr(not(any(test, feature = "mock")), allow(dead_code))]
    pub(crate) fn gate(&self, op: StoreOp) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.lock().gates.insert(op, Arc::clone(&notify));
        notify
    }

    #[cfg_attr(not(any(test, feature = "mock")), allow(dead_code))]
    pub(crate) fn calls(&self, op: StoreOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enter_counts_calls() {
        let plan = FaultPlan::default();
        plan.enter(StoreOp::Create).await.unwrap();
        plan.enter(StoreOp::Create).await.unwrap();
        assert_eq!(plan.calls(StoreOp::Create), 2);
        assert_eq!(plan.calls(StoreOp::Patch), 0);
    }

    #[tokio::test]
    async fn test_injected_fault_until_cleared() {
        let plan = FaultPlan::default();
        plan.inject(StoreOp::Patch, Fault::PermissionDenied);
        assert!(matches!(
            plan.enter(StoreOp::Patch).await,
            Err(Error::PermissionDenied(_))
        ));
        plan.clear(StoreOp::Patch);
        assert!(plan.enter(StoreOp::Patch).await.is_ok());
    }

    #[tokio::test]
    async fn test_gate_holds_one_call() {
        let plan = Arc::new(FaultPlan::default());
        let gate = plan.gate(StoreOp::Delete);

        let task = {
            let plan = Arc::clone(&plan);
            tokio::spawn(async move { plan.enter(StoreOp::Delete).await })
        };
        tokio::task::yield_now().await;
        assert!(!task.is_finished());

        gate.notify_one();
        task.await.unwrap().unwrap();

        // Gate is consumed by the first call
        plan.enter(StoreOp::Delete).await.unwrap();
    }
}
