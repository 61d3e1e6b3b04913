//! # Effect Evaluator Module
//!
//! Interpretation of the effectful expression language. This module owns
//! every mutation of the game: entity creation and deletion, rule
//! lifecycle transitions, message and lifecycle signal emission, random
//! draws, and the error catch machinery.
//!
//! Two invariants run through everything here. First, mutation is gated:
//! an operation only touches the game when the acting rule is the system
//! actor or currently active, so the still-pending continuations of a
//! rejected rule become harmless. Second, lifecycle signals fire after
//! their causing mutation commits, so observers always see a consistent
//! state.

use rand::Rng;

use crate::engine::error::EvalError;
use crate::engine::pure::eval_pure;
use crate::engine::trigger;
use crate::event::EventExpr;
use crate::event::Handler;
use crate::event::PlayerEventKind;
use crate::event::RuleEventKind;
use crate::expr::Expr;
use crate::expr::Pure;
use crate::expr::Value;
use crate::state::EventInfo;
use crate::state::EventNumber;
use crate::state::EventStatus;
use crate::state::Game;
use crate::state::Output;
use crate::state::OutputNumber;
use crate::state::OutputStatus;
use crate::state::PlayerNumber;
use crate::state::RuleDraft;
use crate::state::RuleNumber;
use crate::state::RuleStatus;
use crate::state::Variable;
use crate::state::Victory;

/* EVALUATION */

/// Evaluates an effectful expression under the given acting rule,
/// mutating the game in place.
///
/// # Errors
///
/// Only rule-raised errors surface; every other failure mode (type
/// mismatch, missing entity, duplicate number, gated-out write) is
/// reported through the operation's result value.
pub fn eval_effect(
    expr: &Expr,
    game: &mut Game,
    rule: RuleNumber,
) -> Result<Value, EvalError> {
    match expr {
        Expr::Return(v) => Ok(v.clone()),

        Expr::Lift(p) => eval_pure(p, game, rule),

        Expr::Bind(inner, k) => {
            let value = eval_effect(inner, game, rule)?;
            eval_effect(&k(value), game, rule)
        },

        Expr::NewVar(name, init) => {
            Ok(Value::Bool(new_var(game, rule, name, init)))
        },

        Expr::DelVar(name) => Ok(Value::Bool(del_var(game, rule, name))),

        Expr::WriteVar(name, value) => {
            Ok(Value::Bool(write_var(game, rule, name, value)))
        },

        Expr::OnEvent(event, handler) => {
            let number = on_event(game, rule, event, handler);
            Ok(Value::Int(i64::from(number)))
        },

        Expr::DelEvent(number) => {
            Ok(Value::Bool(del_event(game, rule, *number)))
        },

        Expr::NewOutput(recipient, producer) => {
            let number = new_output(game, rule, *recipient, producer);
            Ok(Value::Int(i64::from(number)))
        },

        Expr::UpdateOutput(number, producer) => {
            Ok(Value::Bool(update_output(game, rule, *number, producer)))
        },

        Expr::DelOutput(number) => {
            Ok(Value::Bool(del_output(game, rule, *number)))
        },

        Expr::ProposeRule(draft) => {
            Ok(Value::Bool(propose_rule(game, rule, draft)))
        },

        Expr::ActivateRule(number) => {
            Ok(Value::Bool(activate_rule(game, rule, *number)))
        },

        Expr::RejectRule(number) => {
            Ok(Value::Bool(reject_rule(game, rule, *number)))
        },

        Expr::AddRule(draft) => {
            Ok(Value::Bool(add_rule(game, rule, draft)))
        },

        Expr::ModifyRule(number, draft) => {
            Ok(Value::Bool(modify_rule(game, rule, *number, draft)))
        },

        Expr::SetPlayerName(number, name) => {
            Ok(Value::Bool(set_player_name(game, rule, *number, name)))
        },

        Expr::DelPlayer(number) => {
            Ok(Value::Bool(del_player(game, rule, *number)))
        },

        Expr::DeclareVictory(winners) => {
            declare_victory(game, rule, winners);
            Ok(Value::Unit)
        },

        Expr::SendMessage(name, payload) => {
            if authorized(game, rule, "send message") {
                trigger::trigger_message(game, name, payload);
            }
            Ok(Value::Unit)
        },

        Expr::Random(low, high) => {
            Ok(Value::Int(random(game, rule, *low, *high)))
        },

        Expr::Log(message) => {
            if authorized(game, rule, "log") {
                game.log_append(None, message.clone());
            }
            Ok(Value::Unit)
        },

        Expr::ThrowError(message) => {
            Err(EvalError::Raised(message.clone()))
        },

        Expr::CatchError(inner, handler) => {
            match eval_effect(inner, game, rule) {
                Err(EvalError::Raised(message)) => {
                    eval_effect(&handler(message), game, rule)
                },
                outcome => outcome,
            }
        },
    }
}

/* GATING */

/// Whether the acting rule may mutate state right now. A refusal leaves a
/// trace diagnostic; the caller reports failure through its result value.
fn authorized(game: &Game, rule: RuleNumber, op: &str) -> bool {
    let authorized = game.rule_active(rule);
    if !authorized {
        log::trace!("rule {rule} is not active, dropping: {op}");
    }
    authorized
}

/* VARIABLES */

fn new_var(
    game: &mut Game,
    rule: RuleNumber,
    name: &str,
    init: &Value,
) -> bool {
    if !authorized(game, rule, "create variable") {
        return false;
    }
    if game.variable(name).is_some() {
        return false;
    }
    game.variables.push(Variable {
        owner: rule,
        name: name.to_owned(),
        value: init.clone(),
    });
    true
}

fn del_var(game: &mut Game, rule: RuleNumber, name: &str) -> bool {
    if !authorized(game, rule, "delete variable") {
        return false;
    }
    let before = game.variables.len();
    game.variables.retain(|v| v.name != name);
    game.variables.len() != before
}

fn write_var(
    game: &mut Game,
    rule: RuleNumber,
    name: &str,
    value: &Value,
) -> bool {
    if !authorized(game, rule, "write variable") {
        return false;
    }
    match game.variable_mut(name) {
        Some(var) if var.value.kind() == value.kind() => {
            var.value = value.clone();
            true
        },
        _ => false,
    }
}

/* EVENTS */

fn on_event(
    game: &mut Game,
    rule: RuleNumber,
    event: &EventExpr,
    handler: &Handler,
) -> EventNumber {
    if !authorized(game, rule, "install event") {
        return 0;
    }
    let number = game.next_event_number();
    game.events.push(EventInfo {
        number,
        owner: rule,
        expr: event.clone(),
        handler: handler.clone(),
        status: EventStatus::Active,
        env: Vec::new(),
    });

    // An expression with no pending signals completes on the spot.
    trigger::visit_event(game, number);
    number
}

fn del_event(game: &mut Game, rule: RuleNumber, number: EventNumber) -> bool {
    if !authorized(game, rule, "delete event") {
        return false;
    }
    match game.event_mut(number) {
        Some(event) if event.status == EventStatus::Active => {
            event.status = EventStatus::Deleted;
            event.env.clear();
            true
        },
        _ => false,
    }
}

/* OUTPUTS */

fn new_output(
    game: &mut Game,
    rule: RuleNumber,
    recipient: Option<PlayerNumber>,
    producer: &Pure,
) -> OutputNumber {
    if !authorized(game, rule, "register output") {
        return 0;
    }
    let number = game.next_output_number();
    game.outputs.push(Output {
        number,
        owner: rule,
        recipient,
        producer: producer.clone(),
        status: OutputStatus::Active,
    });
    number
}

fn update_output(
    game: &mut Game,
    rule: RuleNumber,
    number: OutputNumber,
    producer: &Pure,
) -> bool {
    if !authorized(game, rule, "update output") {
        return false;
    }
    match game.output_mut(number) {
        Some(output) if output.status == OutputStatus::Active => {
            output.producer = producer.clone();
            true
        },
        _ => false,
    }
}

fn del_output(
    game: &mut Game,
    rule: RuleNumber,
    number: OutputNumber,
) -> bool {
    if !authorized(game, rule, "delete output") {
        return false;
    }
    match game.output_mut(number) {
        Some(output) if output.status == OutputStatus::Active => {
            output.status = OutputStatus::Deleted;
            true
        },
        _ => false,
    }
}

/* RULES */

fn propose_rule(game: &mut Game, rule: RuleNumber, draft: &RuleDraft) -> bool {
    if !authorized(game, rule, "propose rule") {
        return false;
    }
    if game.rule(draft.number).is_some() || draft.number == 0 {
        return false;
    }
    let number = draft.number;
    game.rules
        .push(draft.clone().into_rule(RuleStatus::Proposed));
    trigger::trigger_rule_event(game, RuleEventKind::Proposed, number);
    true
}

fn activate_rule(
    game: &mut Game,
    rule: RuleNumber,
    number: RuleNumber,
) -> bool {
    if !authorized(game, rule, "activate rule") {
        return false;
    }
    let body = match game.rule_mut(number) {
        Some(target) if target.status == RuleStatus::Proposed => {
            target.status = RuleStatus::Active;
            target.assessor = Some(rule);
            target.body.clone()
        },
        _ => return false,
    };

    // The body runs under the activated rule's own number. A raised error
    // is logged without revoking the activation.
    if let Err(EvalError::Raised(message)) =
        eval_effect(&body, game, number)
    {
        log::warn!("body of rule {number} raised: {message}");
        game.log_append(None, format!("Error in rule {number}: {message}"));
    }

    trigger::trigger_rule_event(game, RuleEventKind::Activated, number);
    true
}

fn reject_rule(
    game: &mut Game,
    rule: RuleNumber,
    number: RuleNumber,
) -> bool {
    if !authorized(game, rule, "reject rule") {
        return false;
    }
    match game.rule_mut(number) {
        Some(target) if target.status != RuleStatus::Rejected => {
            target.status = RuleStatus::Rejected;
            target.assessor = Some(rule);
        },
        _ => return false,
    }

    // Everything the rule owned goes with it: variables outright, events
    // and outputs as tombstones, the victory record if it declared one.
    game.variables.retain(|v| v.owner != number);
    for event in &mut game.events {
        if event.owner == number && event.status == EventStatus::Active {
            event.status = EventStatus::Deleted;
            event.env.clear();
        }
    }
    for output in &mut game.outputs {
        if output.owner == number && output.status == OutputStatus::Active
        {
            output.status = OutputStatus::Deleted;
        }
    }
    if game.victory.as_ref().is_some_and(|v| v.rule == number) {
        game.victory = None;
    }

    trigger::trigger_rule_event(game, RuleEventKind::Rejected, number);
    true
}

fn add_rule(game: &mut Game, rule: RuleNumber, draft: &RuleDraft) -> bool {
    if !authorized(game, rule, "add rule") {
        return false;
    }
    if game.rule(draft.number).is_some() || draft.number == 0 {
        return false;
    }
    let number = draft.number;
    game.rules
        .push(draft.clone().into_rule(RuleStatus::Proposed));
    trigger::trigger_rule_event(game, RuleEventKind::Added, number);
    true
}

fn modify_rule(
    game: &mut Game,
    rule: RuleNumber,
    number: RuleNumber,
    draft: &RuleDraft,
) -> bool {
    if !authorized(game, rule, "modify rule") {
        return false;
    }
    match game.rule_mut(number) {
        Some(target) => {
            target.name = draft.name.clone();
            target.description = draft.description.clone();
            target.source = draft.source.clone();
            target.body = draft.body.clone();
            target.proposer = draft.proposer;
        },
        None => return false,
    }
    trigger::trigger_rule_event(game, RuleEventKind::Modified, number);
    true
}

/* PLAYERS AND VICTORY */

fn set_player_name(
    game: &mut Game,
    rule: RuleNumber,
    number: PlayerNumber,
    name: &str,
) -> bool {
    if !authorized(game, rule, "rename player") {
        return false;
    }
    match game.player_mut(number) {
        Some(player) => {
            player.name = name.to_owned();
            true
        },
        None => false,
    }
}

fn del_player(game: &mut Game, rule: RuleNumber, number: PlayerNumber) -> bool {
    if !authorized(game, rule, "remove player") {
        return false;
    }
    let before = game.players.len();
    game.players.retain(|p| p.number != number);
    if game.players.len() == before {
        return false;
    }
    trigger::trigger_player_event(game, PlayerEventKind::Leave, number);
    true
}

fn declare_victory(game: &mut Game, rule: RuleNumber, winners: &Pure) {
    if !authorized(game, rule, "declare victory") {
        return;
    }
    game.victory = Some(Victory {
        rule,
        winners: winners.clone(),
    });
    trigger::trigger_victory(game, rule);
}

/* RANDOMNESS */

/// Draws from the game's random stream. A gated-out draw must not advance
/// the stream either, and yields the lower bound.
fn random(game: &mut Game, rule: RuleNumber, low: i64, high: i64) -> i64 {
    if !authorized(game, rule, "draw random number") {
        return low.min(high);
    }
    if low > high {
        // Reversed bounds would panic in gen_range.
        return high;
    }
    game.rng.gen_range(low..=high)
}
