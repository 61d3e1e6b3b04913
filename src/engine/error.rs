//! # Engine Error Module
//!
//! Errors surfaced by the interpreters and the trigger pipeline. Rule
//! runtime errors are ordinary values here: they propagate through the
//! evaluators with `?`, can be intercepted by a catch frame, and are
//! absorbed and logged at handler-dispatch boundaries. Everything a rule
//! can cause is recoverable; only structural engine invariants panic.

use std::error::Error;
use std::fmt;

use crate::state::EventNumber;

/* EVALUATION ERRORS */

/// An error travelling up an evaluator stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EvalError {
    /// Raised by rule code. Carries the thrown message, which a catch
    /// frame receives verbatim.
    Raised(String),
}

impl Error for EvalError {}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raised(msg) => write!(f, "rule error: {msg}"),
        }
    }
}

/* INPUT ROUTING ERRORS */

/// Reasons an injected player input was dropped without effect.
///
/// None of these mutate the game; the trigger pipeline writes a
/// diagnostic log line and the occurrence is discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InputError {
    /// No live event carries the echoed event number.
    UnknownEvent {
        /// The event number the submission carried.
        event: EventNumber,
    },

    /// The echoed address is not among the event's remaining signals.
    AddressNotPending {
        /// The event the submission was routed to.
        event: EventNumber,
    },

    /// The leaf at the echoed address is not an input signal.
    NotAnInput {
        /// The event the submission was routed to.
        event: EventNumber,
    },

    /// The submitted form kind differs from the one the leaf declares.
    FormMismatch {
        /// The event the submission was routed to.
        event: EventNumber,
    },

    /// The submitted data does not fit the form (wrong payload shape, or
    /// a choice index outside the declared options).
    InvalidData {
        /// The event the submission was routed to.
        event: EventNumber,
    },
}

impl Error for InputError {}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEvent { event } => {
                write!(f, "no live event numbered {event}")
            },
            Self::AddressNotPending { event } => {
                write!(
                    f,
                    "the submitted address is not among the remaining \
                    signals of event {event}",
                )
            },
            Self::NotAnInput { event } => {
                write!(
                    f,
                    "the submitted address of event {event} does not \
                    identify an input signal",
                )
            },
            Self::FormMismatch { event } => {
                write!(
                    f,
                    "the submitted form kind does not match the input \
                    awaited by event {event}",
                )
            },
            Self::InvalidData { event } => {
                write!(
                    f,
                    "the submitted data does not fit the form awaited \
                    by event {event}",
                )
            },
        }
    }
}
