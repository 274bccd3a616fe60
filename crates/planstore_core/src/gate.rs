//! The save gate.
//!
//! One flag per engine: "import in progress". While it is engaged, regular
//! saves, removals and wipes are rejected; import writes pass. Reads are
//! never blocked.
//!
//! The flag is only ever set through [`SaveGate::engage`], whose guard
//! clears it on drop. An import that fails or panics therefore still
//! releases the gate.

use crate::error::{PersistenceError, PersistenceResult, WriteOperation};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// How a write interacts with the save gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// An ordinary write; rejected while an import is running.
    #[default]
    Regular,
    /// A write issued by an import or backup; always allowed.
    Import,
}

impl WriteMode {
    /// Returns true for import writes.
    #[must_use]
    pub const fn is_import(self) -> bool {
        matches!(self, Self::Import)
    }
}

/// The import-in-progress flag.
#[derive(Debug, Default)]
pub struct SaveGate {
    engaged: AtomicBool,
}

impl SaveGate {
    /// Creates a disengaged gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while an import holds the gate.
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Acquire)
    }

    /// Checks whether a write may proceed.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::WriteBlocked`] for regular writes while
    /// the gate is engaged.
    pub fn check(&self, logical_key: &str, operation: WriteOperation, mode: WriteMode) -> PersistenceResult<()> {
        if mode.is_import() || !self.is_engaged() {
            return Ok(());
        }
        warn!(logical_key, %operation, "write rejected: data import in progress");
        Err(PersistenceError::write_blocked(logical_key, operation))
    }

    /// Engages the gate for the lifetime of the returned guard.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::ImportInProgress`] if the gate is already
    /// engaged.
    pub fn engage(&self) -> PersistenceResult<SaveGateGuard<'_>> {
        self.engaged
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PersistenceError::ImportInProgress)?;
        Ok(SaveGateGuard { gate: self })
    }
}

/// Keeps the save gate engaged until dropped.
#[derive(Debug)]
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct SaveGateGuard<'a> {
    gate: &'a SaveGate,
}

impl Drop for SaveGateGuard<'_> {
    fn drop(&mut self) {
        self.gate.engaged.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_writes_blocked_while_engaged() {
        let gate = SaveGate::new();
        assert!(gate.check("task", WriteOperation::Save, WriteMode::Regular).is_ok());

        let guard = gate.engage().unwrap();
        let err = gate
            .check("task", WriteOperation::Save, WriteMode::Regular)
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(gate.check("task", WriteOperation::Save, WriteMode::Import).is_ok());

        drop(guard);
        assert!(!gate.is_engaged());
        assert!(gate.check("task", WriteOperation::Remove, WriteMode::Regular).is_ok());
    }

    #[test]
    fn second_engage_fails() {
        let gate = SaveGate::new();
        let _guard = gate.engage().unwrap();
        assert!(matches!(gate.engage(), Err(PersistenceError::ImportInProgress)));
    }

    #[test]
    fn released_on_panic() {
        let gate = SaveGate::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = gate.engage().unwrap();
            panic!("import blew up");
        }));
        assert!(result.is_err());
        assert!(!gate.is_engaged());
    }
}
