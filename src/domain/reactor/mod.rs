//! Incremental dataflow runtime.
//!
//! A translated program is a graph of reactors. The scheduler commits the
//! root once per tick with an increasing sequence number, and each reactor
//! commits the reactors it depends on before producing its own [`Update`].
//! Reactors are shared through [`ReactorHandle`]s, which remember the result
//! of the last commit so that a reactor reached along several paths is only
//! evaluated once per tick.

pub mod task;
pub mod value;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::domain::error::ReactorError;
use crate::domain::value::Value;

/// Outcome of one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    /// Nothing new.
    Continue,
    /// A new value is available.
    Evaluated,
    /// No further values will be produced.
    Complete,
    /// A final value is available.
    CompleteEvaluated,
}

impl Update {
    pub fn new(evaluated: bool, complete: bool) -> Self {
        match (evaluated, complete) {
            (false, false) => Update::Continue,
            (true, false) => Update::Evaluated,
            (false, true) => Update::Complete,
            (true, true) => Update::CompleteEvaluated,
        }
    }

    pub fn has_evaluation(self) -> bool {
        matches!(self, Update::Evaluated | Update::CompleteEvaluated)
    }

    pub fn is_complete(self) -> bool {
        matches!(self, Update::Complete | Update::CompleteEvaluated)
    }
}

pub trait Reactor {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError>;

    /// The most recently evaluated value, if any.
    fn value(&self) -> Option<Value>;
}

impl Reactor for Box<dyn Reactor> {
    fn commit(&mut self, sequence: u64) -> Result<Update, ReactorError> {
        (**self).commit(sequence)
    }

    fn value(&self) -> Option<Value> {
        (**self).value()
    }
}

#[derive(Default)]
struct Memo {
    sequence: Option<u64>,
    result: Option<Result<Update, ReactorError>>,
    complete: bool,
    version: u64,
    value: Option<Value>,
}

struct ReactorCell {
    reactor: RefCell<Box<dyn Reactor>>,
    memo: RefCell<Memo>,
}

/// Shared, memoizing handle onto a reactor.
#[derive(Clone)]
pub struct ReactorHandle {
    inner: Rc<ReactorCell>,
}

impl ReactorHandle {
    pub fn new(reactor: impl Reactor + 'static) -> Self {
        Self {
            inner: Rc::new(ReactorCell {
                reactor: RefCell::new(Box::new(reactor)),
                memo: RefCell::new(Memo::default()),
            }),
        }
    }

    pub fn commit(&self, sequence: u64) -> Result<Update, ReactorError> {
        {
            let memo = self.inner.memo.borrow();
            if memo.sequence == Some(sequence) {
                if let Some(result) = &memo.result {
                    return result.clone();
                }
            }
            if memo.complete {
                return Ok(Update::Complete);
            }
        }
        let result = {
            let mut reactor = self
                .inner
                .reactor
                .try_borrow_mut()
                .map_err(|_| ReactorError::ReentrantCommit)?;
            reactor.commit(sequence).map(|update| (update, reactor.value()))
        };
        let mut memo = self.inner.memo.borrow_mut();
        memo.sequence = Some(sequence);
        match result {
            Ok((update, value)) => {
                if update.has_evaluation() {
                    memo.version += 1;
                    memo.value = value;
                }
                if update.is_complete() {
                    memo.complete = true;
                }
                memo.result = Some(Ok(update));
                Ok(update)
            }
            Err(err) => {
                memo.result = Some(Err(err.clone()));
                Err(err)
            }
        }
    }

    /// A handle whose reactor is installed later, so that nodes translated
    /// before it can already hold it.
    pub fn pending() -> Self {
        Self::new(PendingReactor)
    }

    pub fn install(&self, reactor: impl Reactor + 'static) -> Result<(), ReactorError> {
        let mut slot = self
            .inner
            .reactor
            .try_borrow_mut()
            .map_err(|_| ReactorError::ReentrantCommit)?;
        *slot = Box::new(reactor);
        Ok(())
    }

    pub fn value(&self) -> Option<Value> {
        self.inner.memo.borrow().value.clone()
    }

    /// Number of evaluations so far.
    pub fn version(&self) -> u64 {
        self.inner.memo.borrow().version
    }

    pub fn is_complete(&self) -> bool {
        self.inner.memo.borrow().complete
    }

    pub fn ptr_eq(&self, other: &ReactorHandle) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let memo = self.inner.memo.borrow();
        f.debug_struct("ReactorHandle")
            .field("version", &memo.version)
            .field("complete", &memo.complete)
            .field("value", &memo.value)
            .finish()
    }
}

/// Cooperative cancellation flag. A child token also reports cancellation
/// when any of its ancestors is canceled.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Rc<Cell<bool>>,
    parent: Option<Rc<CancelToken>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> CancelToken {
        CancelToken {
            flag: Rc::new(Cell::new(false)),
            parent: Some(Rc::new(self.clone())),
        }
    }

    pub fn cancel(&self) {
        self.flag.set(true);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.get() || self.parent.as_ref().is_some_and(|p| p.is_canceled())
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancelToken({})", self.is_canceled())
    }
}

struct PendingReactor;

impl Reactor for PendingReactor {
    fn commit(&mut self, _sequence: u64) -> Result<Update, ReactorError> {
        Err(ReactorError::Translation {
            reason: "reactor used before its translation finished".to_string(),
        })
    }

    fn value(&self) -> Option<Value> {
        None
    }
}
