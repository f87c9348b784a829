//! Process-wide resolution state: UNINITIALIZED -> RESOLVING -> {RESOLVED | FAILED}.

use log::warn;
use parking_lot::{Condvar, Mutex};

use super::ResolvedLibrary;
use crate::error::{LoadError, LoadResult};
use crate::variant::BackendVariant;

#[derive(Debug, Clone, PartialEq)]
pub enum LoaderState {
    Uninitialized,
    Resolving,
    Resolved(ResolvedLibrary),
    Failed(LoadError),
}

impl LoaderState {
    pub fn name(&self) -> &'static str {
        match self {
            LoaderState::Uninitialized => "uninitialized",
            LoaderState::Resolving => "resolving",
            LoaderState::Resolved(_) => "resolved",
            LoaderState::Failed(_) => "failed",
        }
    }

    fn outcome(&self) -> Option<LoadResult<ResolvedLibrary>> {
        match self {
            LoaderState::Resolved(library) => Some(Ok(library.clone())),
            LoaderState::Failed(err) => Some(Err(err.clone())),
            LoaderState::Uninitialized | LoaderState::Resolving => None,
        }
    }
}

/// Runs a resolution at most once and hands its outcome to every caller.
///
/// The first caller moves the cell to `Resolving` and runs the resolution
/// without holding the lock; concurrent callers wait on the condvar until a
/// terminal state is stored.
pub struct InitCell {
    state: Mutex<LoaderState>,
    settled: Condvar,
}

impl Default for InitCell {
    fn default() -> Self {
        Self::new()
    }
}

impl InitCell {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(LoaderState::Uninitialized),
            settled: Condvar::new(),
        }
    }

    pub fn state(&self) -> LoaderState {
        self.state.lock().clone()
    }

    pub fn current_variant(&self) -> Option<BackendVariant> {
        match &*self.state.lock() {
            LoaderState::Resolved(library) => Some(library.variant),
            _ => None,
        }
    }

    pub fn get_or_resolve<F>(&self, resolve: F) -> LoadResult<ResolvedLibrary>
    where
        F: FnOnce() -> LoadResult<ResolvedLibrary>,
    {
        {
            let mut state = self.state.lock();
            loop {
                if let Some(outcome) = state.outcome() {
                    return outcome;
                }
                match *state {
                    LoaderState::Resolving => self.settled.wait(&mut state),
                    _ => break,
                }
            }
            *state = LoaderState::Resolving;
        }

        let mut guard = SettleGuard {
            cell: self,
            settled: false,
        };
        let outcome = resolve();
        guard.settle(match &outcome {
            Ok(library) => LoaderState::Resolved(library.clone()),
            Err(err) => LoaderState::Failed(err.clone()),
        });
        outcome
    }
}

// Stores the terminal state even if the resolution unwinds, so waiters never hang.
struct SettleGuard<'a> {
    cell: &'a InitCell,
    settled: bool,
}

impl SettleGuard<'_> {
    fn settle(&mut self, state: LoaderState) {
        *self.cell.state.lock() = state;
        self.settled = true;
        self.cell.settled.notify_all();
    }
}

impl Drop for SettleGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("Library resolution panicked; marking the loader as failed");
            self.settle(LoaderState::Failed(LoadError::ExtractionFailed {
                path: Default::default(),
                message: "resolution panicked".to_string(),
            }));
        }
    }
}
