//! Heap-resident continuations.
//!
//! A [`Continuation`] is one suspended step plus a link to the rest of the
//! computation. Nothing here refers to the host stack, so a continuation can be
//! resumed after the evaluation that created it has returned.

use std::rc::Rc;

use crate::environment::Env;
use crate::interner::Symbol;
use crate::language::Value;

/// Identifies one interpreter driver loop.
pub type RunId = u64;

/// What to do with the value delivered to a continuation.
#[derive(Clone)]
pub(crate) enum Frame {
    /// End of a driver run; the value is the result.
    Halt,
    /// Collecting operator and operand values. `done[0]` is the operator.
    Arguments { pending: Value, done: Vec<Value> },
    /// Remaining forms of a `begin` or body; never empty.
    Sequence { rest: Value },
    Branch {
        consequent: Value,
        alternative: Option<Value>,
    },
    Assign { name: Symbol },
    Define { name: Symbol },
    DefineSyntax { name: Symbol },
    /// `before` has returned; push the winder and run `thunk`.
    WindIn {
        before: Value,
        thunk: Value,
        after: Value,
    },
    /// `thunk` has returned; pop `winder` and run its after thunk.
    WindOut { winder: Winders },
    /// Ignore the incoming value and deliver `value` instead.
    Deliver { value: Value },
    /// Running the before/after thunks of a continuation jump.
    Rewind {
        steps: Rc<[WindStep]>,
        next: usize,
        target: Rc<ContinuationValue>,
        value: Value,
    },
}

#[derive(Clone)]
pub struct Continuation {
    pub(crate) frame: Frame,
    pub(crate) env: Env,
    pub(crate) parent: Option<Rc<Continuation>>,
    pub(crate) run: RunId,
}

impl Continuation {
    pub(crate) fn halt(env: Env, run: RunId) -> Rc<Self> {
        Rc::new(Continuation {
            frame: Frame::Halt,
            env,
            parent: None,
            run,
        })
    }

    pub(crate) fn push(frame: Frame, env: Env, parent: Rc<Continuation>) -> Rc<Self> {
        let run = parent.run;
        Rc::new(Continuation {
            frame,
            env,
            parent: Some(parent),
            run,
        })
    }

    pub fn run(&self) -> RunId {
        self.run
    }

    /// Number of frames up to and including the halt frame.
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.parent.as_ref();
        while let Some(next) = current {
            depth += 1;
            current = next.parent.as_ref();
        }
        depth
    }
}

// Deep non-tail recursion builds long parent chains.
impl Drop for Continuation {
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(cont) = next {
            match Rc::try_unwrap(cont) {
                Ok(mut cont) => next = cont.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// A continuation captured by `call/cc`, with the wind list in effect at
/// capture time.
pub struct ContinuationValue {
    pub(crate) point: Rc<Continuation>,
    pub(crate) winders: Winders,
}

impl ContinuationValue {
    pub(crate) fn new(point: Rc<Continuation>, winders: Winders) -> Self {
        ContinuationValue { point, winders }
    }

    pub fn run(&self) -> RunId {
        self.point.run
    }
}

impl std::fmt::Debug for ContinuationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationValue")
            .field("run", &self.point.run)
            .field("depth", &self.point.depth())
            .field("winders", &self.winders.depth())
            .finish()
    }
}

// ============================================================================
// Dynamic wind list
// ============================================================================

pub(crate) struct Winder {
    before: Value,
    after: Value,
    parent: Winders,
    depth: usize,
}

/// The active `dynamic-wind` extents, innermost first.
#[derive(Clone, Default)]
pub struct Winders(Option<Rc<Winder>>);

/// One thunk to run while moving between two wind lists, with the wind list
/// in effect while it runs and once it has returned.
#[derive(Clone)]
pub(crate) struct WindStep {
    pub(crate) thunk: Value,
    pub(crate) during: Winders,
    pub(crate) after: Winders,
}

impl Winders {
    pub fn depth(&self) -> usize {
        self.0.as_ref().map_or(0, |w| w.depth)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub(crate) fn push(&self, before: Value, after: Value) -> Winders {
        Winders(Some(Rc::new(Winder {
            before,
            after,
            parent: self.clone(),
            depth: self.depth() + 1,
        })))
    }

    /// The after thunk of the innermost extent.
    pub(crate) fn after(&self) -> Value {
        self.0.as_ref().map(|w| w.after.clone()).unwrap_or_default()
    }

    pub(crate) fn parent(&self) -> Winders {
        self.0.as_ref().map(|w| w.parent.clone()).unwrap_or_default()
    }

    fn ptr_eq(&self, other: &Winders) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// The after thunks to leave `self` (innermost first) followed by the
    /// before thunks to enter `target` (outermost first).
    pub(crate) fn path_to(&self, target: &Winders) -> Vec<WindStep> {
        let mut leaving = Vec::new();
        let mut entering = Vec::new();
        let mut from = self.clone();
        let mut to = target.clone();
        while from.depth() > to.depth() {
            leaving.push(from.exit_step());
            from = from.parent();
        }
        while to.depth() > from.depth() {
            entering.push(to.entry_step());
            to = to.parent();
        }
        while !from.ptr_eq(&to) {
            leaving.push(from.exit_step());
            entering.push(to.entry_step());
            from = from.parent();
            to = to.parent();
        }
        leaving.extend(entering.into_iter().rev());
        leaving
    }

    fn exit_step(&self) -> WindStep {
        let parent = self.parent();
        WindStep {
            thunk: self.after(),
            during: parent.clone(),
            after: parent,
        }
    }

    fn entry_step(&self) -> WindStep {
        WindStep {
            thunk: self.0.as_ref().map(|w| w.before.clone()).unwrap_or_default(),
            during: self.parent(),
            after: self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(steps: &[WindStep]) -> Vec<String> {
        steps.iter().map(|s| s.thunk.to_string()).collect()
    }

    #[test]
    fn test_path_between_siblings() {
        let root = Winders::default();
        let a = root.push(Value::string("in-a"), Value::string("out-a"));
        let a1 = a.push(Value::string("in-a1"), Value::string("out-a1"));
        let b = root.push(Value::string("in-b"), Value::string("out-b"));
        let steps = a1.path_to(&b);
        assert_eq!(names(&steps), vec!["\"out-a1\"", "\"out-a\"", "\"in-b\""]);
        assert!(steps[2].after.ptr_eq(&b));
    }

    #[test]
    fn test_path_into_nested_extent() {
        let root = Winders::default();
        let a = root.push(Value::string("in-a"), Value::string("out-a"));
        let a1 = a.push(Value::string("in-a1"), Value::string("out-a1"));
        assert_eq!(names(&root.path_to(&a1)), vec!["\"in-a\"", "\"in-a1\""]);
        assert!(a1.path_to(&a1).is_empty());
    }

    #[test]
    fn test_long_chain_drops_iteratively() {
        let env = Env::new_root();
        let mut cont = Continuation::halt(env.clone(), 1);
        for _ in 0..200_000 {
            cont = Continuation::push(Frame::Deliver { value: Value::Nil }, env.clone(), cont);
        }
        assert_eq!(cont.depth(), 200_001);
        drop(cont);
    }
}
