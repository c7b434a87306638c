//! Per-test scope with lazily created values and guaranteed teardown.

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use anyhow::{Result, anyhow};
use thiserror::Error;
use tracing::{debug, error, warn};

type Action = Box<dyn FnOnce() -> Result<()>>;
type Factory<T> = Box<dyn FnOnce() -> Result<T>>;
type Destructor<T> = Box<dyn FnOnce(T) -> Result<()>>;

struct Teardown {
    label: String,
    action: Action,
}

type TeardownStack = Rc<RefCell<Vec<Teardown>>>;

/// One teardown action that returned an error.
#[derive(Debug)]
pub struct TeardownFailure {
    pub label: String,
    pub error: anyhow::Error,
}

#[derive(Debug, Error)]
#[error("{} teardown action(s) failed: {}", .failures.len(), render_failures(.failures))]
pub struct TeardownError {
    pub failures: Vec<TeardownFailure>,
}

fn render_failures(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("`{}`: {:#}", failure.label, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Owns the teardown stack for one test.
///
/// Teardowns run in reverse order of creation, either from [`TestScope::finish`]
/// or, if the test bailed out early or panicked, from `Drop`. Only `finish`
/// (and [`TestScope::run`], which calls it) reports teardown failures; `Drop`
/// logs them, so a test that returns early with `?` keeps its own error.
pub struct TestScope {
    stack: TeardownStack,
}

impl TestScope {
    pub fn new() -> Self {
        Self {
            stack: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Run `body` in a fresh scope and tear it down afterwards.
    ///
    /// A body error wins over teardown errors (which are logged); teardown
    /// errors alone fail the run.
    pub fn run<F>(body: F) -> Result<()>
    where
        F: FnOnce(&TestScope) -> Result<()>,
    {
        let scope = TestScope::new();
        let outcome = body(&scope);
        let teardown = scope.finish();
        match (outcome, teardown) {
            (Err(err), Err(teardown)) => {
                warn!(err = %teardown, "teardown failed after test failure");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
            (Ok(()), Err(teardown)) => Err(teardown.into()),
            (Ok(()), Ok(())) => Ok(()),
        }
    }

    /// Lazily created value without a destructor (it is simply dropped).
    pub fn memoized<T, F>(&self, label: &str, factory: F) -> Memoized<T>
    where
        T: 'static,
        F: FnOnce() -> Result<T> + 'static,
    {
        self.memoized_cell(label, Box::new(factory), None)
    }

    /// Lazily created value whose `destructor` runs exactly once if it was created.
    pub fn memoized_with_teardown<T, F, D>(&self, label: &str, factory: F, destructor: D) -> Memoized<T>
    where
        T: 'static,
        F: FnOnce() -> Result<T> + 'static,
        D: FnOnce(T) -> Result<()> + 'static,
    {
        self.memoized_cell(label, Box::new(factory), Some(Box::new(destructor)))
    }

    fn memoized_cell<T: 'static>(
        &self,
        label: &str,
        factory: Factory<T>,
        destructor: Option<Destructor<T>>,
    ) -> Memoized<T> {
        Memoized {
            cell: Rc::new(MemoCell {
                label: label.to_string(),
                slot: RefCell::new(Slot::Pending(factory, destructor)),
                stack: Rc::downgrade(&self.stack),
            }),
        }
    }

    /// Register a plain teardown action at the current position in the stack.
    pub fn defer<F>(&self, label: &str, action: F)
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.stack.borrow_mut().push(Teardown {
            label: label.to_string(),
            action: Box::new(action),
        });
    }

    /// Number of teardown actions still to run.
    pub fn pending_teardowns(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Run all teardowns now, newest first, collecting every failure.
    pub fn finish(self) -> Result<(), TeardownError> {
        let failures = run_teardowns(&self.stack);
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }
}

impl Default for TestScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TestScope {
    fn drop(&mut self) {
        let panicking = std::thread::panicking();
        for failure in run_teardowns(&self.stack) {
            error!(
                label = %failure.label,
                err = %format!("{:#}", failure.error),
                panicking,
                "teardown failed in dropped scope"
            );
        }
    }
}

fn run_teardowns(stack: &TeardownStack) -> Vec<TeardownFailure> {
    let mut failures = Vec::new();
    loop {
        let next = stack.borrow_mut().pop();
        let Some(teardown) = next else {
            break;
        };
        debug!(label = %teardown.label, "running teardown");
        if let Err(error) = (teardown.action)() {
            failures.push(TeardownFailure {
                label: teardown.label,
                error,
            });
        }
    }
    failures
}

enum Slot<T> {
    Pending(Factory<T>, Option<Destructor<T>>),
    Creating,
    Ready(T),
    Failed,
    TornDown,
}

struct MemoCell<T> {
    label: String,
    slot: RefCell<Slot<T>>,
    stack: Weak<RefCell<Vec<Teardown>>>,
}

impl<T: 'static> MemoCell<T> {
    fn release(&self, destructor: Option<Destructor<T>>) -> Result<()> {
        let mut slot = self
            .slot
            .try_borrow_mut()
            .map_err(|_| anyhow!("memoized `{}` is still borrowed at teardown", self.label))?;
        let previous = std::mem::replace(&mut *slot, Slot::TornDown);
        drop(slot);
        match previous {
            Slot::Ready(value) => match destructor {
                Some(destructor) => destructor(value),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

/// A value created on first access and cached for the rest of the test.
///
/// Clones share the same cell, so one factory run serves every clone.
pub struct Memoized<T> {
    cell: Rc<MemoCell<T>>,
}

impl<T> Clone for Memoized<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for Memoized<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoized")
            .field("label", &self.cell.label)
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Memoized<T> {
    pub fn label(&self) -> &str {
        &self.cell.label
    }

    /// True once the factory has produced a value that is not yet torn down.
    pub fn is_created(&self) -> bool {
        // Only a ready value is ever handed out mutably.
        self.cell
            .slot
            .try_borrow()
            .map(|slot| matches!(*slot, Slot::Ready(_)))
            .unwrap_or(true)
    }

    /// Shared access, creating the value on first call.
    pub fn get(&self) -> Result<Ref<'_, T>> {
        self.ensure_created()?;
        let slot = self
            .cell
            .slot
            .try_borrow()
            .map_err(|_| anyhow!("memoized `{}` is mutably borrowed", self.cell.label))?;
        Ref::filter_map(slot, |slot| match slot {
            Slot::Ready(value) => Some(value),
            _ => None,
        })
        .map_err(|_| anyhow!("memoized `{}` is not available", self.cell.label))
    }

    /// Exclusive access, creating the value on first call.
    pub fn get_mut(&self) -> Result<RefMut<'_, T>> {
        self.ensure_created()?;
        let slot = self
            .cell
            .slot
            .try_borrow_mut()
            .map_err(|_| anyhow!("memoized `{}` is already borrowed", self.cell.label))?;
        RefMut::filter_map(slot, |slot| match slot {
            Slot::Ready(value) => Some(value),
            _ => None,
        })
        .map_err(|_| anyhow!("memoized `{}` is not available", self.cell.label))
    }

    fn ensure_created(&self) -> Result<()> {
        if self.is_created() {
            return Ok(());
        }
        let label = &self.cell.label;
        let Some(stack) = self.cell.stack.upgrade() else {
            return Err(anyhow!("memoized `{label}` used after its scope finished"));
        };

        let previous = {
            let mut slot = self
                .cell
                .slot
                .try_borrow_mut()
                .map_err(|_| anyhow!("memoized `{label}` is already borrowed"))?;
            std::mem::replace(&mut *slot, Slot::Creating)
        };
        let (factory, destructor) = match previous {
            Slot::Pending(factory, destructor) => (factory, destructor),
            other => {
                let message = match &other {
                    Slot::Creating => "requested while it is being created",
                    Slot::Failed => "failed earlier in this test",
                    _ => "was already torn down",
                };
                *self.cell.slot.borrow_mut() = other;
                return Err(anyhow!("memoized `{label}` {message}"));
            }
        };

        debug!(label = %label, "creating memoized value");
        match factory() {
            Ok(value) => {
                *self.cell.slot.borrow_mut() = Slot::Ready(value);
                let cell = Rc::clone(&self.cell);
                stack.borrow_mut().push(Teardown {
                    label: label.clone(),
                    action: Box::new(move || cell.release(destructor)),
                });
                Ok(())
            }
            Err(err) => {
                *self.cell.slot.borrow_mut() = Slot::Failed;
                Err(err.context(format!("create memoized `{label}`")))
            }
        }
    }
}
