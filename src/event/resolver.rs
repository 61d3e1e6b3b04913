//! # Event Resolver Module
//!
//! Structural resolution of event combinator trees against an environment
//! of bound signal occurrences. Resolution is a pure function of the tree,
//! the environment and the (read-only) game; it either produces the final
//! value or enumerates the signals still awaited, each with the structural
//! address at which a future occurrence must bind.
//!
//! Because an address is the position of a leaf in the tree, a given
//! occurrence can satisfy at most one leaf, and structurally distinct
//! leaves referencing the same primitive signal stay independent.

use crate::engine::error::EvalError;
use crate::engine::pure::eval_pure;
use crate::event::AddressTag;
use crate::event::EventExpr;
use crate::event::Signal;
use crate::event::SignalAddress;
use crate::event::SignalOccurrence;
use crate::event::Todo;
use crate::expr::Value;
use crate::state::Game;
use crate::state::RuleNumber;

/* RESOLUTION */

/// Resolves `expr` against the occurrences in `env`.
///
/// `game` and `rule` form the pure-evaluation context needed by
/// [`EventExpr::LiftPure`] leaves; nothing is mutated.
///
/// # Errors
///
/// Only a lifted pure expression can fail, by raising a rule error.
pub fn resolve(
    expr: &EventExpr,
    env: &[SignalOccurrence],
    game: &Game,
    rule: RuleNumber,
) -> Result<Todo, EvalError> {
    let mut path = Vec::new();
    resolve_at(expr, &mut path, env, game, rule)
}

/// Computes the per-child partial results of a shortcut-rooted event, or
/// the single partial result of any other tree. Used by the pure language
/// to render intermediate vote states.
pub fn partial_results(
    expr: &EventExpr,
    env: &[SignalOccurrence],
    game: &Game,
    rule: RuleNumber,
) -> Result<Vec<Option<Value>>, EvalError> {
    if let EventExpr::Shortcut(children, _) = expr {
        let mut results = Vec::with_capacity(children.len());
        for (i, child) in children.iter().enumerate() {
            let mut path = vec![AddressTag::Shortcut(i)];
            let todo = resolve_at(child, &mut path, env, game, rule)?;
            results.push(todo.done());
        }
        Ok(results)
    } else {
        Ok(vec![resolve(expr, env, game, rule)?.done()])
    }
}

/* STRUCTURAL RECURSION */

fn resolve_at(
    expr: &EventExpr,
    path: &mut SignalAddress,
    env: &[SignalOccurrence],
    game: &Game,
    rule: RuleNumber,
) -> Result<Todo, EvalError> {
    match expr {
        EventExpr::Pure(v) => Ok(Todo::Done(v.clone())),

        EventExpr::Empty => Ok(Todo::Pending(Vec::new())),

        EventExpr::Signal(s) => Ok(resolve_leaf(s, path, env)),

        EventExpr::LiftPure(p) => {
            Ok(Todo::Done(eval_pure(p, game, rule)?))
        },

        EventExpr::Sum(l, r) => {
            let left = branch(l, AddressTag::SumL, path, env, game, rule)?;
            if let Todo::Done(v) = left {
                return Ok(Todo::Done(v));
            }
            let right = branch(r, AddressTag::SumR, path, env, game, rule)?;
            match (left, right) {
                (_, Todo::Done(v)) => Ok(Todo::Done(v)),
                (Todo::Pending(mut a), Todo::Pending(b)) => {
                    a.extend(b);
                    Ok(Todo::Pending(a))
                },
                (Todo::Done(_), _) => unreachable!(),
            }
        },

        EventExpr::App(l, r) => {
            let left = branch(l, AddressTag::AppL, path, env, game, rule)?;
            let right = branch(r, AddressTag::AppR, path, env, game, rule)?;
            match (left, right) {
                (Todo::Done(a), Todo::Done(b)) => {
                    Ok(Todo::Done(Value::List(vec![a, b])))
                },
                (Todo::Pending(p), Todo::Done(_)) => Ok(Todo::Pending(p)),
                (Todo::Done(_), Todo::Pending(p)) => Ok(Todo::Pending(p)),
                (Todo::Pending(mut a), Todo::Pending(b)) => {
                    a.extend(b);
                    Ok(Todo::Pending(a))
                },
            }
        },

        EventExpr::Map(e, f) => {
            match resolve_at(e, path, env, game, rule)? {
                Todo::Done(v) => Ok(Todo::Done(f(v))),
                pending => Ok(pending),
            }
        },

        EventExpr::Bind(e, k) => {
            let left = branch(e, AddressTag::BindL, path, env, game, rule)?;
            match left {
                Todo::Done(v) => {
                    branch(&k(v), AddressTag::BindR, path, env, game, rule)
                },
                pending => Ok(pending),
            }
        },

        EventExpr::Shortcut(children, pred) => {
            let mut results = Vec::with_capacity(children.len());
            let mut pending = Vec::new();
            for (i, child) in children.iter().enumerate() {
                let tag = AddressTag::Shortcut(i);
                match branch(child, tag, path, env, game, rule)? {
                    Todo::Done(v) => results.push(Some(v)),
                    Todo::Pending(p) => {
                        results.push(None);
                        pending.extend(p);
                    },
                }
            }
            if pred(&results) {
                let vector = results
                    .into_iter()
                    .map(Value::maybe)
                    .collect();
                Ok(Todo::Done(Value::List(vector)))
            } else {
                Ok(Todo::Pending(pending))
            }
        },
    }
}

/// Resolves a subtree one address step below the current path.
fn branch(
    expr: &EventExpr,
    tag: AddressTag,
    path: &mut SignalAddress,
    env: &[SignalOccurrence],
    game: &Game,
    rule: RuleNumber,
) -> Result<Todo, EvalError> {
    path.push(tag);
    let todo = resolve_at(expr, path, env, game, rule);
    path.pop();
    todo
}

/// A leaf completes iff some occurrence carries the same signal bound at
/// exactly this address.
fn resolve_leaf(
    signal: &Signal,
    path: &SignalAddress,
    env: &[SignalOccurrence],
) -> Todo {
    let hit = env.iter().find(|occ| {
        occ.signal == *signal
            && occ.address.as_deref() == Some(path.as_slice())
    });
    match hit {
        Some(occ) => Todo::Done(occ.payload.clone()),
        None => Todo::Pending(vec![(path.clone(), signal.clone())]),
    }
}
