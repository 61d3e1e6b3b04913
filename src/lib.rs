#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! # Nomic Engine
//!
//! Rule and event evaluation core for programmable governance games, in
//! which participants submit executable rules that mutate the shared game
//! state, install event observers, run votes, and enact further rules.
//!
//! The crate is organized around three cooperating pieces:
//!
//! - A two-tier expression interpreter: the effectful language ([`expr::Expr`])
//!   mutates the game under the authority of an acting rule, while the pure
//!   language ([`expr::Pure`]) reads a consistent view of it and can run
//!   hypothetical executions against a throwaway clone.
//! - An algebraic event language ([`event::EventExpr`]) whose incremental
//!   resolution against recorded signal occurrences yields either a final
//!   value or the set of signals still awaited, each identified by its
//!   structural address in the combinator tree.
//! - A voting layer ([`vote`]) that assembles time-bounded, early-terminating
//!   polls out of event combinators and pluggable assessment functions.
//!
//! Hosts drive the engine exclusively through [`interface`]: they activate
//! and reject rules, inject player inputs, clock ticks and messages, and
//! read rendered outputs back. All entry points are synchronous and run to
//! completion on the calling thread; the engine performs no scheduling of
//! its own.

/* MODULES */

pub mod engine;
pub mod event;
pub mod expr;
pub mod interface;
pub mod state;
pub mod vote;
