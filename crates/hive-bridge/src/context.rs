//! Load contexts and unload tracking
//!
//! A context owns its assemblies and the scope token every type built in it
//! holds. Unloading drops the context's own references, then watches the
//! token weakly while collections run: once nothing built in the context is
//! reachable the token dies and the unload is complete.

use crate::catalog::AssemblyRecord;
use crate::ids::{AssemblyId, ContextId};
use crate::table::IdTable;
use hive_runtime::{Assembly, ScopeToken};
use std::sync::{Arc, Weak};

/// Lifecycle of a load context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Open,
    /// Unload requested; the context's types are still reachable
    Unloading,
    Unloaded,
}

/// A live load context
#[derive(Debug)]
pub(crate) struct ContextRecord {
    pub name: String,
    pub can_unload: bool,
    pub token: Arc<ScopeToken>,
    pub assemblies: IdTable<AssemblyId, AssemblyRecord>,
}

impl ContextRecord {
    pub fn new(name: &str, can_unload: bool) -> Self {
        Self {
            name: name.to_string(),
            can_unload,
            token: ScopeToken::new(name, can_unload),
            assemblies: IdTable::new(),
        }
    }

    pub fn assemblies(&self) -> impl Iterator<Item = &Arc<Assembly>> + '_ {
        self.assemblies.values().map(|record| &record.assembly)
    }

    pub fn find_assembly(&self, name: &str) -> Option<AssemblyId> {
        self.assemblies.find_key(|record| record.assembly.name() == name)
    }
}

/// Progress of one unload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadState {
    Requested,
    Collecting { attempt: u32 },
    /// The context is gone
    Complete { attempts: u32 },
    /// Something still references the context's types after the retry budget
    Incomplete { attempts: u32 },
}

impl UnloadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, UnloadState::Complete { .. } | UnloadState::Incomplete { .. })
    }

    pub fn context_state(self) -> ContextState {
        match self {
            UnloadState::Complete { .. } => ContextState::Unloaded,
            _ => ContextState::Unloading,
        }
    }
}

/// Watches an unloading context until its scope token dies
#[derive(Debug)]
pub struct UnloadTracker {
    context: ContextId,
    name: String,
    observer: Weak<ScopeToken>,
    budget: u32,
    state: UnloadState,
}

impl UnloadTracker {
    pub fn new(context: ContextId, name: &str, observer: Weak<ScopeToken>, budget: u32) -> Self {
        Self {
            context,
            name: name.to_string(),
            observer,
            budget,
            state: UnloadState::Requested,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> UnloadState {
        self.state
    }

    /// Whether anything built in the context is still alive
    pub fn is_alive(&self) -> bool {
        self.observer.strong_count() > 0
    }

    /// Advance one step; `collect` runs one collect-and-finalize round
    pub fn step(&mut self, collect: &mut dyn FnMut()) -> UnloadState {
        self.state = match self.state {
            UnloadState::Requested if !self.is_alive() => UnloadState::Complete { attempts: 0 },
            UnloadState::Requested => UnloadState::Collecting { attempt: 0 },
            UnloadState::Collecting { attempt } if attempt >= self.budget => {
                UnloadState::Incomplete { attempts: attempt }
            }
            UnloadState::Collecting { attempt } => {
                collect();
                let attempts = attempt + 1;
                if self.is_alive() {
                    UnloadState::Collecting { attempt: attempts }
                } else {
                    UnloadState::Complete { attempts }
                }
            }
            terminal => terminal,
        };
        self.state
    }

    /// Step until complete or out of budget
    pub fn run(&mut self, collect: &mut dyn FnMut()) -> UnloadState {
        loop {
            let state = self.step(collect);
            if state.is_terminal() {
                return state;
            }
        }
    }

    /// Grant another `budget` rounds to an incomplete unload
    pub fn retry(&mut self, budget: u32) {
        if let UnloadState::Incomplete { attempts } = self.state {
            self.budget = attempts + budget;
            self.state = UnloadState::Collecting { attempt: attempts };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_token_completes_without_collecting() {
        let token = ScopeToken::new("plugin", true);
        let observer = Arc::downgrade(&token);
        drop(token);

        let mut tracker = UnloadTracker::new(ContextId::from(1), "plugin", observer, 5);
        let mut rounds = 0;
        let state = tracker.run(&mut || rounds += 1);
        assert_eq!(state, UnloadState::Complete { attempts: 0 });
        assert_eq!(rounds, 0);
    }

    #[test]
    fn test_completes_when_collection_releases_token() {
        let token = ScopeToken::new("plugin", true);
        let mut tracker = UnloadTracker::new(ContextId::from(1), "plugin", Arc::downgrade(&token), 5);

        let mut holder = Some(token);
        let mut rounds = 0;
        let state = tracker.run(&mut || {
            rounds += 1;
            if rounds == 2 {
                holder = None;
            }
        });
        assert_eq!(state, UnloadState::Complete { attempts: 2 });
        assert!(holder.is_none());
        assert_eq!(state.context_state(), ContextState::Unloaded);
    }

    #[test]
    fn test_budget_exhaustion_and_retry() {
        let token = ScopeToken::new("plugin", true);
        let mut tracker = UnloadTracker::new(ContextId::from(4), "plugin", Arc::downgrade(&token), 3);

        let state = tracker.run(&mut || {});
        assert_eq!(state, UnloadState::Incomplete { attempts: 3 });
        assert_eq!(state.context_state(), ContextState::Unloading);

        drop(token);
        tracker.retry(2);
        assert_eq!(tracker.state(), UnloadState::Collecting { attempt: 3 });
        assert_eq!(tracker.run(&mut || {}), UnloadState::Complete { attempts: 4 });
    }
}
