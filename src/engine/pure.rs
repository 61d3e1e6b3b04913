//! # Pure Evaluator Module
//!
//! Interpretation of the effect-free expression language against a
//! read-only view of the game. The single special case is hypothetical
//! execution, which invokes the effect evaluator on a throwaway clone of
//! the game and discards it before returning.

use crate::engine::effect::eval_effect;
use crate::engine::error::EvalError;
use crate::event::resolver;
use crate::event::EventExpr;
use crate::expr::Pure;
use crate::expr::Value;
use crate::state::EventNumber;
use crate::state::EventStatus;
use crate::state::Game;
use crate::state::OutputStatus;
use crate::state::RuleNumber;

/* EVALUATION */

/// Evaluates a pure expression under the given acting rule.
///
/// # Errors
///
/// Only a rule-raised error can surface, either from a bind continuation
/// chain or from the effectful expression of a hypothetical execution.
pub fn eval_pure(
    expr: &Pure,
    game: &Game,
    rule: RuleNumber,
) -> Result<Value, EvalError> {
    match expr {
        Pure::Const(v) => Ok(v.clone()),

        Pure::ReadVar(name) => {
            let value = game.variable(name).map(|v| v.value.clone());
            Ok(Value::maybe(value))
        },

        Pure::ReadOutput(number) => {
            let output = game
                .output(*number)
                .filter(|o| o.status == OutputStatus::Active);
            match output {
                None => Ok(Value::maybe(None)),
                Some(o) => {
                    let text = eval_pure(&o.producer, game, o.owner)?;
                    Ok(Value::maybe(Some(Value::Text(text.to_string()))))
                },
            }
        },

        Pure::AllRuleNumbers => Ok(Value::List(
            game.rules
                .iter()
                .map(|r| Value::Int(i64::from(r.number)))
                .collect(),
        )),

        Pure::AllPlayerNumbers => Ok(Value::List(
            game.players
                .iter()
                .map(|p| Value::Int(i64::from(p.number)))
                .collect(),
        )),

        Pure::AllEventNumbers => Ok(Value::List(
            game.events
                .iter()
                .filter(|e| e.status == EventStatus::Active)
                .map(|e| Value::Int(i64::from(e.number)))
                .collect(),
        )),

        Pure::SelfNumber => Ok(Value::Int(i64::from(rule))),

        Pure::CurrentTime => Ok(Value::Time(game.current_time)),

        Pure::EventResults(number) => event_results(game, *number),

        Pure::Bind(inner, k) => {
            let value = eval_pure(inner, game, rule)?;
            eval_pure(&k(value), game, rule)
        },

        Pure::Simu(effectful, predicate) => {
            let mut hypothetical = game.clone();
            eval_effect(effectful, &mut hypothetical, rule)?;
            eval_pure(predicate, &hypothetical, rule)
        },
    }
}

/* EVENT INTROSPECTION */

/// Current partial results of an event, shaped by its root combinator: a
/// list with one optional entry per shortcut child, or a single optional
/// for any other tree.
fn event_results(
    game: &Game,
    number: EventNumber,
) -> Result<Value, EvalError> {
    let Some(event) = game.event(number) else {
        return Ok(Value::maybe(None));
    };
    let partial = resolver::partial_results(
        &event.expr,
        &event.env,
        game,
        event.owner,
    )?;
    if let EventExpr::Shortcut(_, _) = &event.expr {
        Ok(Value::List(
            partial.into_iter().map(Value::maybe).collect(),
        ))
    } else {
        let single = partial.into_iter().next().flatten();
        Ok(Value::maybe(single))
    }
}
