//! Scope lifecycle state machine.
//!
//! Every enter, borrow, close and destroy goes through
//! [`ScopeState::apply`], which validates the transition and tells the
//! arena what work to do. The state keeps a LIFO stack of frames, one per
//! enter or borrow, each remembering the active-arena register value it
//! displaced so the matching close can restore it.
//!
//! ```text
//!            Enter                 Close (last Cycle frame)
//!   Closed ────────▶ Open ───────────────────────────────▶ Closed
//!     │  ▲            │ ▲ Enter/Borrow push, Close pops
//!     │  └────────────┘ └─┘
//!     │ Destroy (no frames)
//!     ▼
//!   Destroyed  (terminal)
//! ```

use loam_core::ArenaId;
use smallvec::SmallVec;

use crate::error::ArenaError;

/// Coarse lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopePhase {
    /// No cycle in progress.
    Closed,
    /// A cycle is in progress.
    Open,
    /// Terminal; every further event is rejected.
    Destroyed,
}

/// Input to the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeEvent {
    /// Enter a scope; `displaced` is the register value before entry.
    Enter {
        /// Previously active arena, if any.
        displaced: Option<ArenaId>,
    },
    /// Temporarily activate the arena without cycle accounting.
    Borrow {
        /// Previously active arena, if any.
        displaced: Option<ArenaId>,
    },
    /// Close the innermost enter or borrow.
    Close,
    /// Release the arena for good.
    Destroy,
}

/// Work the arena must perform for an accepted event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScopeAction {
    /// Top-level entry: start a new cycle.
    OpenCycle,
    /// Nested entry into an already open arena. No side effects.
    Reenter,
    /// A borrow began.
    Lend,
    /// A borrow ended; restore the lender.
    ReturnLoan {
        /// Register value to restore.
        restore: Option<ArenaId>,
    },
    /// A nested entry ended.
    Unnest {
        /// Register value to restore.
        restore: Option<ArenaId>,
    },
    /// The top-level scope ended: run close accounting.
    CloseCycle {
        /// Register value to restore.
        restore: Option<ArenaId>,
    },
    /// Release every resource.
    Release,
}

impl ScopeAction {
    /// The register value to restore, for closing actions.
    pub fn restore(self) -> Option<Option<ArenaId>> {
        match self {
            Self::ReturnLoan { restore }
            | Self::Unnest { restore }
            | Self::CloseCycle { restore } => Some(restore),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Cycle,
    Nested,
    Borrow,
}

#[derive(Clone, Copy, Debug)]
struct Frame {
    kind: FrameKind,
    displaced: Option<ArenaId>,
}

/// Scope state of one arena.
#[derive(Clone, Debug)]
pub struct ScopeState {
    arena: ArenaId,
    phase: ScopePhase,
    frames: SmallVec<[Frame; 4]>,
}

impl ScopeState {
    /// A closed scope for `arena`.
    pub fn new(arena: ArenaId) -> Self {
        Self {
            arena,
            phase: ScopePhase::Closed,
            frames: SmallVec::new(),
        }
    }

    /// Validate `event` and advance.
    pub fn apply(&mut self, event: ScopeEvent) -> Result<ScopeAction, ArenaError> {
        let arena = self.arena;
        if self.phase == ScopePhase::Destroyed {
            return Err(ArenaError::Destroyed { arena });
        }

        match event {
            ScopeEvent::Enter { displaced } => {
                if self.phase == ScopePhase::Open {
                    self.push(FrameKind::Nested, displaced);
                    Ok(ScopeAction::Reenter)
                } else {
                    self.phase = ScopePhase::Open;
                    self.push(FrameKind::Cycle, displaced);
                    Ok(ScopeAction::OpenCycle)
                }
            }
            ScopeEvent::Borrow { displaced } => {
                if self.is_borrowed() {
                    return Err(ArenaError::AlreadyBorrowed { arena });
                }
                self.push(FrameKind::Borrow, displaced);
                Ok(ScopeAction::Lend)
            }
            ScopeEvent::Close => {
                let frame = self
                    .frames
                    .pop()
                    .ok_or(ArenaError::ScopeNotOpen { arena })?;
                let restore = frame.displaced;
                Ok(match frame.kind {
                    FrameKind::Borrow => ScopeAction::ReturnLoan { restore },
                    FrameKind::Nested => ScopeAction::Unnest { restore },
                    FrameKind::Cycle => {
                        self.phase = ScopePhase::Closed;
                        ScopeAction::CloseCycle { restore }
                    }
                })
            }
            ScopeEvent::Destroy => {
                if !self.frames.is_empty() {
                    return Err(ArenaError::ScopeStillOpen { arena });
                }
                self.phase = ScopePhase::Destroyed;
                Ok(ScopeAction::Release)
            }
        }
    }

    fn push(&mut self, kind: FrameKind, displaced: Option<ArenaId>) {
        self.frames.push(Frame { kind, displaced });
    }

    /// Current phase.
    pub fn phase(&self) -> ScopePhase {
        self.phase
    }

    /// Whether a cycle is in progress.
    pub fn is_open(&self) -> bool {
        self.phase == ScopePhase::Open
    }

    /// Whether the arena is lent out.
    pub fn is_borrowed(&self) -> bool {
        self.frames.iter().any(|f| f.kind == FrameKind::Borrow)
    }

    /// Whether allocations are currently allowed.
    pub fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Whether the arena has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.phase == ScopePhase::Destroyed
    }

    /// Number of nested re-entries currently stacked.
    pub fn reentry_depth(&self) -> usize {
        self.frames
            .iter()
            .filter(|f| f.kind == FrameKind::Nested)
            .count()
    }

    /// Register value the next [`ScopeEvent::Close`] will restore, or
    /// `None` if there is nothing to close.
    pub fn pending_restore(&self) -> Option<Option<ArenaId>> {
        self.frames.last().map(|f| f.displaced)
    }

    /// Drop every frame without accounting. Used when tearing down.
    pub fn abandon(&mut self) {
        self.frames.clear();
        if self.phase == ScopePhase::Open {
            self.phase = ScopePhase::Closed;
        }
    }

    /// Register value displaced by the top-level entry of the open cycle.
    pub fn previous(&self) -> Option<ArenaId> {
        self.frames
            .iter()
            .find(|f| f.kind == FrameKind::Cycle)
            .and_then(|f| f.displaced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> (ArenaId, ScopeState) {
        let id = ArenaId::next();
        (id, ScopeState::new(id))
    }

    #[test]
    fn enter_close_round_trip() {
        let (_, mut s) = state();
        let outer = ArenaId::next();
        assert_eq!(
            s.apply(ScopeEvent::Enter {
                displaced: Some(outer)
            })
            .unwrap(),
            ScopeAction::OpenCycle
        );
        assert!(s.is_open());
        assert_eq!(s.previous(), Some(outer));
        assert_eq!(
            s.apply(ScopeEvent::Close).unwrap(),
            ScopeAction::CloseCycle {
                restore: Some(outer)
            }
        );
        assert_eq!(s.phase(), ScopePhase::Closed);
    }

    #[test]
    fn nested_entries_unwind_in_order() {
        let (id, mut s) = state();
        s.apply(ScopeEvent::Enter { displaced: None }).unwrap();
        assert_eq!(
            s.apply(ScopeEvent::Enter {
                displaced: Some(id)
            })
            .unwrap(),
            ScopeAction::Reenter
        );
        assert_eq!(s.reentry_depth(), 1);
        assert_eq!(
            s.apply(ScopeEvent::Close).unwrap(),
            ScopeAction::Unnest { restore: Some(id) }
        );
        assert!(s.is_open());
        assert_eq!(
            s.apply(ScopeEvent::Close).unwrap(),
            ScopeAction::CloseCycle { restore: None }
        );
    }

    #[test]
    fn double_borrow_is_rejected() {
        let (id, mut s) = state();
        assert_eq!(
            s.apply(ScopeEvent::Borrow { displaced: None }).unwrap(),
            ScopeAction::Lend
        );
        assert!(s.is_active());
        assert!(!s.is_open());
        assert_eq!(
            s.apply(ScopeEvent::Borrow { displaced: None }),
            Err(ArenaError::AlreadyBorrowed { arena: id })
        );
    }

    #[test]
    fn borrow_close_returns_loan_without_closing_cycle() {
        let (_, mut s) = state();
        let lender = ArenaId::next();
        s.apply(ScopeEvent::Enter { displaced: None }).unwrap();
        s.apply(ScopeEvent::Borrow {
            displaced: Some(lender),
        })
        .unwrap();
        assert_eq!(
            s.apply(ScopeEvent::Close).unwrap(),
            ScopeAction::ReturnLoan {
                restore: Some(lender)
            }
        );
        assert!(s.is_open());
        assert!(!s.is_borrowed());
    }

    #[test]
    fn closing_closed_scope_fails() {
        let (id, mut s) = state();
        assert_eq!(
            s.apply(ScopeEvent::Close),
            Err(ArenaError::ScopeNotOpen { arena: id })
        );
    }

    #[test]
    fn destroy_requires_no_frames_and_is_terminal() {
        let (id, mut s) = state();
        s.apply(ScopeEvent::Enter { displaced: None }).unwrap();
        assert_eq!(
            s.apply(ScopeEvent::Destroy),
            Err(ArenaError::ScopeStillOpen { arena: id })
        );
        s.apply(ScopeEvent::Close).unwrap();
        assert_eq!(s.apply(ScopeEvent::Destroy).unwrap(), ScopeAction::Release);
        assert!(s.is_destroyed());
        assert_eq!(
            s.apply(ScopeEvent::Destroy),
            Err(ArenaError::Destroyed { arena: id })
        );
        assert_eq!(
            s.apply(ScopeEvent::Enter { displaced: None }),
            Err(ArenaError::Destroyed { arena: id })
        );
    }

    #[test]
    fn restore_only_for_closing_actions() {
        assert_eq!(ScopeAction::OpenCycle.restore(), None);
        assert_eq!(
            ScopeAction::Unnest { restore: None }.restore(),
            Some(None)
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn balanced_enters_always_close(depth in 1usize..12) {
                let (id, mut s) = state();
                for _ in 0..depth {
                    s.apply(ScopeEvent::Enter { displaced: Some(id) }).unwrap();
                }
                prop_assert_eq!(s.reentry_depth(), depth - 1);
                for _ in 1..depth {
                    let action = s.apply(ScopeEvent::Close).unwrap();
                    prop_assert!(
                        matches!(action, ScopeAction::Unnest { .. }),
                        "unexpected action"
                    );
                }
                let last = s.apply(ScopeEvent::Close).unwrap();
                prop_assert!(matches!(last, ScopeAction::CloseCycle { .. }), "unexpected action");
                prop_assert_eq!(s.phase(), ScopePhase::Closed);
            }
        }
    }
}
