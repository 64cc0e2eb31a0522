use crate::state::{StateError, StateManager};

/// The one state checkpoint a builder holds over its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Checkpoint {
    NotStarted,
    Open,
    Committed,
    RolledBack,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    Open,
    Commit,
    RollBack,
}

impl Checkpoint {
    /// Applies `transition`, forwarding it to `state` when a checkpoint is
    /// actually opened or closed.
    ///
    /// | from       | open        | commit    | roll back  |
    /// |------------|-------------|-----------|------------|
    /// | NotStarted | Open        | Committed | RolledBack |
    /// | Open       | Open        | Committed | RolledBack |
    /// | Committed  | error       | error     | error      |
    /// | RolledBack | error       | error     | error      |
    pub(super) fn apply(
        &mut self,
        transition: Transition,
        state: &mut dyn StateManager,
    ) -> Result<(), InvalidTransition> {
        let next = match (*self, transition) {
            (Checkpoint::NotStarted, Transition::Open) => {
                state.checkpoint();
                Checkpoint::Open
            }
            (Checkpoint::Open, Transition::Open) => Checkpoint::Open,
            (Checkpoint::NotStarted, Transition::Commit) => Checkpoint::Committed,
            (Checkpoint::Open, Transition::Commit) => {
                state.commit()?;
                Checkpoint::Committed
            }
            (Checkpoint::NotStarted, Transition::RollBack) => Checkpoint::RolledBack,
            (Checkpoint::Open, Transition::RollBack) => {
                state.revert()?;
                Checkpoint::RolledBack
            }
            (from @ (Checkpoint::Committed | Checkpoint::RolledBack), transition) => {
                return Err(InvalidTransition::Closed { from, transition })
            }
        };
        *self = next;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidTransition {
    #[error("cannot {transition:?} a checkpoint that is already {from:?}")]
    Closed {
        from: Checkpoint,
        transition: Transition,
    },
    #[error(transparent)]
    State(#[from] StateError),
}
