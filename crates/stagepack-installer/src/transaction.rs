use std::path::{Path, PathBuf};

/// Holds the directory a failed transaction must remove and runs the
/// rollback closure over it exactly once, unless committed.
///
/// Rollback also runs from `Drop`, so a panic unwinding through the body
/// still cleans up.
pub struct RollbackScope<F>
where
    F: FnOnce(Option<&Path>),
{
    target: Option<PathBuf>,
    rollback: Option<F>,
}

impl<F> RollbackScope<F>
where
    F: FnOnce(Option<&Path>),
{
    pub fn new(rollback: F) -> Self {
        Self {
            target: None,
            rollback: Some(rollback),
        }
    }

    /// Replaces the rollback target.
    pub fn track(&mut self, target: impl Into<PathBuf>) {
        self.target = Some(target.into());
    }

    pub fn target(&self) -> Option<&Path> {
        self.target.as_deref()
    }

    pub fn commit(mut self) {
        self.rollback = None;
    }

    pub fn rollback(mut self) {
        self.run_rollback();
    }

    fn run_rollback(&mut self) {
        if let Some(rollback) = self.rollback.take() {
            rollback(self.target.as_deref());
        }
    }
}

impl<F> Drop for RollbackScope<F>
where
    F: FnOnce(Option<&Path>),
{
    fn drop(&mut self) {
        self.run_rollback();
    }
}

/// Runs `body` and commits on `Ok`; any `Err` (or panic) rolls back first.
pub fn run_with_rollback<T, E, F, B>(rollback: F, body: B) -> Result<T, E>
where
    F: FnOnce(Option<&Path>),
    B: FnOnce(&mut RollbackScope<F>) -> Result<T, E>,
{
    let mut scope = RollbackScope::new(rollback);
    match body(&mut scope) {
        Ok(value) => {
            scope.commit();
            Ok(value)
        }
        Err(err) => {
            scope.rollback();
            Err(err)
        }
    }
}
