//! # Expression Module
//!
//! Defines the runtime value representation and the two expression
//! languages interpreted by the engine: the pure language, which reads a
//! consistent view of the game, and the effectful language, which mutates
//! it under the authority of an acting rule.
//!
//! Rule code arrives at the engine as already-built trees of these types;
//! parsing and sandboxing of rule source text happen upstream. Payload
//! types that the source language would track statically are carried here
//! as runtime tags ([`ValueKind`]), checked at the point of consumption.

use std::fmt;
use std::rc::Rc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::event::EventExpr;
use crate::event::Handler;
use crate::state::EventNumber;
use crate::state::OutputNumber;
use crate::state::PlayerNumber;
use crate::state::RuleDraft;
use crate::state::RuleNumber;

/* RUNTIME VALUES */

/// A dynamically-tagged runtime value.
///
/// Everything that flows through the interpreters is a `Value`: variable
/// contents, signal payloads, message bodies, and the results of both
/// expression languages. The concrete type is recoverable at runtime via
/// [`Value::kind`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The unit value, produced by operations run for their effect.
    Unit,

    /// A boolean, also the conventional success indicator of mutations.
    Bool(bool),

    /// A signed integer. Entity numbers are represented this way when they
    /// travel through expressions.
    Int(i64),

    /// An owned text value.
    Text(String),

    /// An absolute instant, as carried by timer signals and the game clock.
    Time(DateTime<Utc>),

    /// An ordered list of values.
    List(Vec<Value>),

    /// An optional value. Partial results of shortcut events use this to
    /// distinguish answered positions from pending ones.
    Maybe(Option<Box<Value>>),
}

/// Runtime type tag of a [`Value`].
///
/// Variables fix their kind at creation time; writes of a different kind
/// are refused without mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    /// Tag of [`Value::Unit`].
    Unit,
    /// Tag of [`Value::Bool`].
    Bool,
    /// Tag of [`Value::Int`].
    Int,
    /// Tag of [`Value::Text`].
    Text,
    /// Tag of [`Value::Time`].
    Time,
    /// Tag of [`Value::List`].
    List,
    /// Tag of [`Value::Maybe`].
    Maybe,
}

impl Value {
    /// Returns the runtime type tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Unit => ValueKind::Unit,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Text(_) => ValueKind::Text,
            Value::Time(_) => ValueKind::Time,
            Value::List(_) => ValueKind::List,
            Value::Maybe(_) => ValueKind::Maybe,
        }
    }

    /// Returns the inner boolean, or `None` for other kinds.
    pub fn as_bool(&self) -> Option<bool> {
        if let Value::Bool(b) = self {
            Some(*b)
        } else {
            None
        }
    }

    /// Returns the inner integer, or `None` for other kinds.
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    /// Returns a borrow of the inner text, or `None` for other kinds.
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Returns a borrow of the inner list, or `None` for other kinds.
    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(l) = self {
            Some(l)
        } else {
            None
        }
    }

    /// Unwraps one level of [`Value::Maybe`], or `None` for other kinds
    /// and for the empty optional.
    pub fn as_maybe(&self) -> Option<&Value> {
        if let Value::Maybe(Some(v)) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Wraps an optional value into a [`Value::Maybe`].
    pub fn maybe(inner: Option<Value>) -> Value {
        Value::Maybe(inner.map(Box::new))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::List(items) => {
                let parts: Vec<String> =
                    items.iter().map(Value::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            },
            Value::Maybe(None) => write!(f, "none"),
            Value::Maybe(Some(v)) => write!(f, "{v}"),
        }
    }
}

/* CONTINUATIONS */

/// Continuation of a pure monadic bind.
pub type PureCont = Rc<dyn Fn(Value) -> Pure>;

/// Continuation of an effectful monadic bind.
pub type ExprCont = Rc<dyn Fn(Value) -> Expr>;

/// Handler of a caught rule error, receiving the thrown message.
pub type CatchCont = Rc<dyn Fn(String) -> Expr>;

/* PURE LANGUAGE */

/// An effect-free expression, interpreted against a read-only game view.
///
/// The single exception to the no-effects contract is [`Pure::Simu`],
/// which runs an effectful expression against a clone of the game and
/// discards every mutation before returning.
#[derive(Clone)]
pub enum Pure {
    /// A constant value.
    Const(Value),

    /// Reads a game variable by name. Yields `Maybe(Some(value))`, or the
    /// empty optional when no such variable exists.
    ReadVar(String),

    /// Renders an output's current text. Yields `Maybe(Some(Text))`, or
    /// the empty optional for unknown or deleted outputs.
    ReadOutput(OutputNumber),

    /// The numbers of all rules in the game, in insertion order.
    AllRuleNumbers,

    /// The numbers of all players, in insertion order.
    AllPlayerNumbers,

    /// The numbers of all live (non-tombstoned) events.
    AllEventNumbers,

    /// The number of the rule under whose authority evaluation runs.
    SelfNumber,

    /// The game clock.
    CurrentTime,

    /// The partial result vector of an event, as currently resolvable.
    ///
    /// For a shortcut-rooted event this is a `List` with one `Maybe` per
    /// child; for any other event it is a single `Maybe` holding the final
    /// value if the event can complete against its current environment.
    EventResults(EventNumber),

    /// Monadic sequencing: evaluate, feed the result to the continuation.
    Bind(Box<Pure>, PureCont),

    /// Hypothetical execution. Runs the effectful expression on a clone of
    /// the game (including its random stream), then evaluates the pure
    /// predicate on the clone. The real game is never touched.
    Simu(Box<Expr>, Box<Pure>),
}

impl Pure {
    /// Sequences `self` with a continuation over its result.
    pub fn and_then<F>(self, f: F) -> Pure
    where
        F: Fn(Value) -> Pure + 'static,
    {
        Pure::Bind(Box::new(self), Rc::new(f))
    }
}

impl fmt::Debug for Pure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pure::Const(v) => write!(f, "Const({v:?})"),
            Pure::ReadVar(n) => write!(f, "ReadVar({n:?})"),
            Pure::ReadOutput(n) => write!(f, "ReadOutput({n})"),
            Pure::AllRuleNumbers => write!(f, "AllRuleNumbers"),
            Pure::AllPlayerNumbers => write!(f, "AllPlayerNumbers"),
            Pure::AllEventNumbers => write!(f, "AllEventNumbers"),
            Pure::SelfNumber => write!(f, "SelfNumber"),
            Pure::CurrentTime => write!(f, "CurrentTime"),
            Pure::EventResults(n) => write!(f, "EventResults({n})"),
            Pure::Bind(e, _) => write!(f, "Bind({e:?}, ..)"),
            Pure::Simu(e, p) => write!(f, "Simu({e:?}, {p:?})"),
        }
    }
}

/* EFFECTFUL LANGUAGE */

/// An effectful expression, interpreted against a mutable game.
///
/// Every mutating operation is gated on the acting rule being either the
/// system rule `0` or currently active; a gated-out operation leaves the
/// game untouched and yields its failure value. Operations that create
/// entities return the allocated number as an `Int`; mutations of existing
/// entities return a `Bool` success indicator.
#[derive(Clone)]
pub enum Expr {
    /// Yields a constant value without touching the game.
    Return(Value),

    /// Embeds a pure expression.
    Lift(Pure),

    /// Monadic sequencing: evaluate, feed the result to the continuation.
    Bind(Box<Expr>, ExprCont),

    /// Creates a variable owned by the acting rule, fixing its kind from
    /// the initial value. `Bool(false)` if the name is taken.
    NewVar(String, Value),

    /// Deletes a variable by name. `Bool(false)` if absent.
    DelVar(String),

    /// Overwrites a variable. `Bool(false)` if absent or if the new value
    /// has a different kind; the variable is left untouched in both cases.
    WriteVar(String, Value),

    /// Installs an event observer owned by the acting rule and yields the
    /// allocated event number as an `Int`. An event whose expression is
    /// already complete fires its handler before this operation returns.
    OnEvent(EventExpr, Handler),

    /// Tombstones a live event. `Bool(false)` if absent or already gone.
    DelEvent(EventNumber),

    /// Registers an output addressed to one player, or broadcast when the
    /// recipient is `None`. The producer is re-evaluated at every read.
    /// Yields the allocated output number as an `Int`.
    NewOutput(Option<PlayerNumber>, Pure),

    /// Swaps the producer of a live output. `Bool(false)` if absent.
    UpdateOutput(OutputNumber, Pure),

    /// Tombstones a live output. `Bool(false)` if absent or already gone.
    DelOutput(OutputNumber),

    /// Submits a rule draft in proposed status and fires the rule-proposed
    /// signal. `Bool(false)` if the rule number is taken.
    ProposeRule(Box<RuleDraft>),

    /// Activates a proposed rule: flips its status, executes its body
    /// under its own number, then fires the rule-activated signal.
    /// `Bool(false)` for unknown rules or illegal status transitions.
    ActivateRule(RuleNumber),

    /// Rejects a proposed or active rule, purging every variable, event,
    /// output and victory record it owns, then fires the rule-rejected
    /// signal. `Bool(false)` for unknown rules or illegal transitions.
    RejectRule(RuleNumber),

    /// Inserts a rule draft directly, bypassing the proposal pipeline: the
    /// rule lands in proposed status and only the rule-added signal fires.
    /// `Bool(false)` if the rule number is taken.
    AddRule(Box<RuleDraft>),

    /// Replaces the name, description, source, body and proposer of an
    /// existing rule, keeping its number and status, then fires the
    /// rule-modified signal. `Bool(false)` for unknown rules.
    ModifyRule(RuleNumber, Box<RuleDraft>),

    /// Renames a player. `Bool(false)` for unknown players.
    SetPlayerName(PlayerNumber, String),

    /// Removes a player and fires the player-leave signal. `Bool(false)`
    /// for unknown players.
    DelPlayer(PlayerNumber),

    /// Installs the victory record: a pure expression re-evaluated on read
    /// to produce the current winner list. Fires the victory signal.
    DeclareVictory(Pure),

    /// Fires the named message signal with a payload, in-line.
    SendMessage(String, Value),

    /// Draws an integer uniformly from the inclusive range, advancing the
    /// game's deterministic random stream.
    Random(i64, i64),

    /// Appends a line to the game log under the acting rule's authority.
    Log(String),

    /// Raises a rule runtime error carrying a message.
    ThrowError(String),

    /// Evaluates the inner expression; if it raises, the handler receives
    /// the message and its expression is evaluated instead.
    CatchError(Box<Expr>, CatchCont),
}

impl Expr {
    /// Sequences `self` with a continuation over its result.
    pub fn and_then<F>(self, f: F) -> Expr
    where
        F: Fn(Value) -> Expr + 'static,
    {
        Expr::Bind(Box::new(self), Rc::new(f))
    }

    /// Sequences `self` with `next`, discarding the first result.
    pub fn then(self, next: Expr) -> Expr {
        let next = Rc::new(next);
        self.and_then(move |_| (*next).clone())
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Return(v) => write!(f, "Return({v:?})"),
            Expr::Lift(p) => write!(f, "Lift({p:?})"),
            Expr::Bind(e, _) => write!(f, "Bind({e:?}, ..)"),
            Expr::NewVar(n, v) => write!(f, "NewVar({n:?}, {v:?})"),
            Expr::DelVar(n) => write!(f, "DelVar({n:?})"),
            Expr::WriteVar(n, v) => write!(f, "WriteVar({n:?}, {v:?})"),
            Expr::OnEvent(e, _) => write!(f, "OnEvent({e:?}, ..)"),
            Expr::DelEvent(n) => write!(f, "DelEvent({n})"),
            Expr::NewOutput(p, e) => write!(f, "NewOutput({p:?}, {e:?})"),
            Expr::UpdateOutput(n, e) => {
                write!(f, "UpdateOutput({n}, {e:?})")
            },
            Expr::DelOutput(n) => write!(f, "DelOutput({n})"),
            Expr::ProposeRule(d) => write!(f, "ProposeRule(#{})", d.number),
            Expr::ActivateRule(n) => write!(f, "ActivateRule({n})"),
            Expr::RejectRule(n) => write!(f, "RejectRule({n})"),
            Expr::AddRule(d) => write!(f, "AddRule(#{})", d.number),
            Expr::ModifyRule(n, _) => write!(f, "ModifyRule({n}, ..)"),
            Expr::SetPlayerName(n, s) => {
                write!(f, "SetPlayerName({n}, {s:?})")
            },
            Expr::DelPlayer(n) => write!(f, "DelPlayer({n})"),
            Expr::DeclareVictory(p) => write!(f, "DeclareVictory({p:?})"),
            Expr::SendMessage(n, v) => {
                write!(f, "SendMessage({n:?}, {v:?})")
            },
            Expr::Random(a, b) => write!(f, "Random({a}, {b})"),
            Expr::Log(m) => write!(f, "Log({m:?})"),
            Expr::ThrowError(m) => write!(f, "ThrowError({m:?})"),
            Expr::CatchError(e, _) => write!(f, "CatchError({e:?}, ..)"),
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn value_kinds_are_stable() {
        assert_eq!(Value::Unit.kind(), ValueKind::Unit);
        assert_eq!(Value::Bool(true).kind(), ValueKind::Bool);
        assert_eq!(Value::Int(-4).kind(), ValueKind::Int);
        assert_eq!(Value::Text("x".into()).kind(), ValueKind::Text);
        assert_eq!(Value::List(vec![]).kind(), ValueKind::List);
        assert_eq!(Value::maybe(None).kind(), ValueKind::Maybe);
    }

    #[test]
    fn value_rendering() {
        let v = Value::List(vec![
            Value::Int(1),
            Value::maybe(Some(Value::Text("yes".into()))),
            Value::maybe(None),
        ]);
        assert_eq!(v.to_string(), "[1, yes, none]");
    }

    #[test]
    fn maybe_accessors_distinguish_empty_from_absent() {
        let some = Value::maybe(Some(Value::Bool(true)));
        let none = Value::maybe(None);
        assert_eq!(some.as_maybe(), Some(&Value::Bool(true)));
        assert_eq!(none.as_maybe(), None);
        assert_eq!(none.kind(), ValueKind::Maybe);
    }
}
