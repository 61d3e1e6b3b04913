//! # Event Module
//!
//! The algebraic event language and its supporting vocabulary: primitive
//! signals, recorded signal occurrences, and structural addresses that
//! identify a leaf's position inside a combinator tree.
//!
//! An event is an observer built by composing signals with sum,
//! applicative, bind and shortcut combinators. Events are not coroutines;
//! "waiting" is a static partial result computed by [`resolver::resolve`],
//! and progress happens whenever the trigger pipeline commits a new
//! occurrence to the event's environment.

use std::fmt;
use std::rc::Rc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::expr::Expr;
use crate::expr::Pure;
use crate::expr::Value;
use crate::state::EventNumber;
use crate::state::PlayerNumber;

/* UTILITY MODULES */


/* MODULES */

pub mod resolver;

/* SIGNALS */

/// Kind of input control presented to a player.
///
/// Choice-bearing forms carry their options as `(index, label)` pairs; the
/// wire protocol exchanges indices only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum InputForm {
    /// Single-line free text.
    Text,

    /// Multi-line free text.
    TextArea,

    /// A plain button; the payload is unit.
    Button,

    /// One choice among the listed options; the payload is its index.
    Radio(Vec<(usize, String)>),

    /// Any subset of the listed options; the payload is the index list.
    Checkbox(Vec<(usize, String)>),
}

/// Rule lifecycle transitions observable as signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleEventKind {
    /// A rule draft entered the game through the proposal pipeline.
    Proposed,
    /// A proposed rule became active.
    Activated,
    /// A proposed or active rule was rejected.
    Rejected,
    /// A rule draft was inserted directly, bypassing proposal.
    Added,
    /// An existing rule's content was replaced.
    Modified,
}

/// Player lifecycle transitions observable as signals.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerEventKind {
    /// A player joined the game.
    Arrive,
    /// A player was removed from the game.
    Leave,
}

/// A primitive observable.
///
/// Two signals are equal iff their kind and carried parameters are equal;
/// identity of the call site that built them plays no part. Occurrence
/// routing additionally scopes matches by structural address, so equal
/// signals at different positions of one event stay independent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Signal {
    /// A form input awaited from one player. Payload: per [`InputForm`].
    Input {
        /// The player the form is presented to.
        player: PlayerNumber,
        /// Prompt text shown alongside the control.
        prompt: String,
        /// The control kind and its options.
        form: InputForm,
    },

    /// A timer with an absolute deadline. Fires when the host injects any
    /// time at or past it. Payload: the injected instant.
    Time(DateTime<Utc>),

    /// A message keyed by name. Payload: whatever the sender attached.
    Message(String),

    /// A rule lifecycle transition. Payload: the rule number.
    Rule(RuleEventKind),

    /// A player lifecycle transition. Payload: the player number.
    Player(PlayerEventKind),

    /// A victory declaration. Payload: the declaring rule number.
    Victory,
}

/* ADDRESSES AND OCCURRENCES */

/// One step of a structural address.
///
/// The `Shortcut` tag carries the child index so that shortcut siblings
/// referencing the same primitive signal keep distinct addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressTag {
    /// Left arm of a sum.
    SumL,
    /// Right arm of a sum.
    SumR,
    /// Left arm of an applicative product.
    AppL,
    /// Right arm of an applicative product.
    AppR,
    /// Left arm of a bind.
    BindL,
    /// Right arm of a bind, materialised after the left completed.
    BindR,
    /// The indexed child of a shortcut.
    Shortcut(usize),
}

/// Path of a leaf signal through an event's combinator tree, root first.
///
/// Hosts must store this address with every form they render and echo it
/// verbatim on submission, so the occurrence lands on exactly that leaf.
pub type SignalAddress = Vec<AddressTag>;

/// A fired signal together with its payload.
///
/// The address is `None` while the occurrence is in flight and `Some`
/// once the trigger pipeline has bound it to a leaf of a specific event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalOccurrence {
    /// The signal that fired.
    pub signal: Signal,
    /// The payload it carried.
    pub payload: Value,
    /// The structural position the occurrence was bound to, if any.
    pub address: Option<SignalAddress>,
}

/* COMBINATOR FUNCTIONS */

/// Post-transformation applied to a completed event value.
pub type MapFn = Rc<dyn Fn(Value) -> Value>;

/// Continuation of an event bind, materialising the right arm.
pub type EventCont = Rc<dyn Fn(Value) -> EventExpr>;

/// Completion predicate of a shortcut, over current partial results.
pub type ShortcutFn = Rc<dyn Fn(&[Option<Value>]) -> bool>;

/// Handler fired when an event completes. Receives the event's number and
/// final value; the returned expression runs under the owning rule.
pub type Handler = Rc<dyn Fn(EventNumber, Value) -> Expr>;

/* EVENT LANGUAGE */

/// An event combinator tree, resolving to a value.
#[derive(Clone)]
pub enum EventExpr {
    /// Already complete with the given value.
    Pure(Value),

    /// Never completes, and awaits no signal.
    Empty,

    /// A primitive signal leaf.
    Signal(Signal),

    /// First arm to complete wins; the left wins ties.
    Sum(Box<EventExpr>, Box<EventExpr>),

    /// Applicative product: completes once both arms have, with the
    /// two-element list of their values. Both arms' awaited signals are
    /// visible while either is pending.
    App(Box<EventExpr>, Box<EventExpr>),

    /// Evaluates a pure expression; complete by construction.
    LiftPure(Pure),

    /// Applies a transformation to the completed value. Transparent to
    /// addressing: the inner tree keeps its positions.
    Map(Box<EventExpr>, MapFn),

    /// Monadic sequencing. The right arm exists only after the left
    /// completes, and is resolved under the `BindR` branch so that stale
    /// occurrences from an earlier materialisation cannot bind to it.
    Bind(Box<EventExpr>, EventCont),

    /// A list of events with an early-termination predicate over their
    /// current partial results. Completes with the full partial-result
    /// vector as soon as the predicate holds.
    Shortcut(Vec<EventExpr>, ShortcutFn),
}

impl EventExpr {
    /// Wraps `self` in a post-transformation of its completed value.
    pub fn map<F>(self, f: F) -> EventExpr
    where
        F: Fn(Value) -> Value + 'static,
    {
        EventExpr::Map(Box::new(self), Rc::new(f))
    }

    /// Sequences `self` with a continuation building the next event.
    pub fn and_then<F>(self, f: F) -> EventExpr
    where
        F: Fn(Value) -> EventExpr + 'static,
    {
        EventExpr::Bind(Box::new(self), Rc::new(f))
    }

    /// Races `self` against `other`, left-biased.
    pub fn or(self, other: EventExpr) -> EventExpr {
        EventExpr::Sum(Box::new(self), Box::new(other))
    }

    /// Pairs `self` with `other`; completes when both have.
    pub fn pair(self, other: EventExpr) -> EventExpr {
        EventExpr::App(Box::new(self), Box::new(other))
    }
}

impl fmt::Debug for EventExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventExpr::Pure(v) => write!(f, "Pure({v:?})"),
            EventExpr::Empty => write!(f, "Empty"),
            EventExpr::Signal(s) => write!(f, "Signal({s:?})"),
            EventExpr::Sum(l, r) => write!(f, "Sum({l:?}, {r:?})"),
            EventExpr::App(l, r) => write!(f, "App({l:?}, {r:?})"),
            EventExpr::LiftPure(p) => write!(f, "LiftPure({p:?})"),
            EventExpr::Map(e, _) => write!(f, "Map({e:?}, ..)"),
            EventExpr::Bind(e, _) => write!(f, "Bind({e:?}, ..)"),
            EventExpr::Shortcut(es, _) => {
                write!(f, "Shortcut({es:?}, ..)")
            },
        }
    }
}

/* RESOLUTION RESULT */

/// Outcome of resolving an event against its environment: either the
/// final value, or the signals still awaited with their addresses.
#[derive(Debug)]
pub enum Todo {
    /// The event completed with this value.
    Done(Value),

    /// The event is still waiting on every listed `(address, signal)`
    /// pair. An event over [`EventExpr::Empty`] is pending with an empty
    /// list: it can never complete and demands nothing.
    Pending(Vec<(SignalAddress, Signal)>),
}

impl Todo {
    /// Returns the completed value, or `None` while pending.
    pub fn done(self) -> Option<Value> {
        match self {
            Todo::Done(v) => Some(v),
            Todo::Pending(_) => None,
        }
    }
}
