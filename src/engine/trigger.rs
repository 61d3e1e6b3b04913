//! # Trigger Pipeline Module
//!
//! Routing of incoming signal occurrences to live events. Broadcast
//! signals (time, messages, lifecycle transitions) visit every live event
//! in ascending owner order; player inputs are routed to the single event
//! and address the submitting form echoed back.
//!
//! An occurrence is committed to an event's environment only when it is
//! among the event's currently-remaining signals, which keeps
//! environments from growing without bound. A completed event has its
//! environment cleared and is tombstoned before its handler runs, so
//! completion is one-shot and re-injection is a no-op. Handlers recurse
//! freely into the evaluator and back into this module; iteration works
//! over a pre-sorted snapshot of event numbers, re-checking status before
//! each visit.

use chrono::DateTime;
use chrono::Utc;

use crate::engine::effect::eval_effect;
use crate::engine::error::EvalError;
use crate::engine::error::InputError;
use crate::event::resolver::resolve;
use crate::event::AddressTag;
use crate::event::InputForm;
use crate::event::PlayerEventKind;
use crate::event::RuleEventKind;
use crate::event::Signal;
use crate::event::SignalAddress;
use crate::event::SignalOccurrence;
use crate::event::Todo;
use crate::expr::Value;
use crate::interface::InputData;
use crate::state::EventNumber;
use crate::state::EventStatus;
use crate::state::Game;
use crate::state::PlayerNumber;
use crate::state::RuleNumber;

/* ENTRY POINTS */

/// Advances the game clock and fires every timer whose deadline has been
/// reached. The payload of a fired timer is the injected instant.
pub(crate) fn trigger_time(game: &mut Game, now: DateTime<Utc>) {
    game.current_time = now;
    broadcast(game, &|leaf| match leaf {
        Signal::Time(deadline) if *deadline <= now => {
            Some(Value::Time(now))
        },
        _ => None,
    });
}

/// Fires the named message signal with the given payload.
pub(crate) fn trigger_message(game: &mut Game, name: &str, payload: &Value) {
    broadcast(game, &|leaf| match leaf {
        Signal::Message(key) if key == name => Some(payload.clone()),
        _ => None,
    });
}

/// Fires a rule lifecycle signal. The payload is the rule number.
pub(crate) fn trigger_rule_event(
    game: &mut Game,
    kind: RuleEventKind,
    rule: RuleNumber,
) {
    broadcast(game, &|leaf| match leaf {
        Signal::Rule(k) if *k == kind => {
            Some(Value::Int(i64::from(rule)))
        },
        _ => None,
    });
}

/// Fires a player lifecycle signal. The payload is the player number.
pub(crate) fn trigger_player_event(
    game: &mut Game,
    kind: PlayerEventKind,
    player: PlayerNumber,
) {
    broadcast(game, &|leaf| match leaf {
        Signal::Player(k) if *k == kind => {
            Some(Value::Int(i64::from(player)))
        },
        _ => None,
    });
}

/// Fires the victory signal. The payload is the declaring rule number.
pub(crate) fn trigger_victory(game: &mut Game, rule: RuleNumber) {
    broadcast(game, &|leaf| match leaf {
        Signal::Victory => Some(Value::Int(i64::from(rule))),
        _ => None,
    });
}

/// Routes a player input to the leaf the UI echoed back: the given event,
/// at the given address. The data must fit the form the leaf declares.
///
/// # Errors
///
/// Any reason listed in [`InputError`]; the game is left untouched and a
/// diagnostic log line is written.
pub(crate) fn trigger_input(
    game: &mut Game,
    number: EventNumber,
    address: &[AddressTag],
    form: &InputForm,
    data: &InputData,
) -> Result<(), InputError> {
    let outcome = route_input(game, number, address, form, data);
    if let Err(reason) = &outcome {
        log::warn!("dropping input for event {number}: {reason}");
    }
    outcome
}

/* INPUT ROUTING */

fn route_input(
    game: &mut Game,
    number: EventNumber,
    address: &[AddressTag],
    form: &InputForm,
    data: &InputData,
) -> Result<(), InputError> {
    let live = game
        .event(number)
        .is_some_and(|e| e.status == EventStatus::Active);
    if !live {
        return Err(InputError::UnknownEvent { event: number });
    }

    let pending = remaining_signals(game, number);
    let leaf = pending
        .into_iter()
        .find(|(addr, _)| addr.as_slice() == address)
        .map(|(_, leaf)| leaf)
        .ok_or(InputError::AddressNotPending { event: number })?;

    let Signal::Input { form: expected, .. } = &leaf else {
        return Err(InputError::NotAnInput { event: number });
    };
    if expected != form {
        return Err(InputError::FormMismatch { event: number });
    }
    let payload = decode_input(form, data)
        .ok_or(InputError::InvalidData { event: number })?;

    commit(game, number, leaf.clone(), payload, address.to_vec());
    visit_event(game, number);
    Ok(())
}

/// Translates submitted form data into the payload value of the leaf, or
/// `None` when the data does not fit the form.
fn decode_input(form: &InputForm, data: &InputData) -> Option<Value> {
    match (form, data) {
        (InputForm::Text, InputData::Text(s)) => {
            Some(Value::Text(s.clone()))
        },
        (InputForm::TextArea, InputData::TextArea(s)) => {
            Some(Value::Text(s.clone()))
        },
        (InputForm::Button, InputData::Button) => Some(Value::Unit),
        (InputForm::Radio(choices), InputData::Radio(index)) => choices
            .iter()
            .any(|(i, _)| i == index)
            .then(|| Value::Int(*index as i64)),
        (InputForm::Checkbox(choices), InputData::Checkbox(indices)) => {
            let valid = indices
                .iter()
                .all(|ix| choices.iter().any(|(i, _)| i == ix));
            valid.then(|| {
                Value::List(
                    indices
                        .iter()
                        .map(|ix| Value::Int(*ix as i64))
                        .collect(),
                )
            })
        },
        _ => None,
    }
}

/* BROADCAST DELIVERY */

/// Visits every live event in trigger order, offering the occurrence
/// described by `matcher`: for each event, the first remaining signal the
/// matcher accepts receives the occurrence, bound at that signal's
/// address. Events for which nothing matches are left untouched.
fn broadcast(game: &mut Game, matcher: &dyn Fn(&Signal) -> Option<Value>) {
    for number in game.live_events() {
        deliver(game, number, matcher);
    }
}

fn deliver(
    game: &mut Game,
    number: EventNumber,
    matcher: &dyn Fn(&Signal) -> Option<Value>,
) {
    let live = game
        .event(number)
        .is_some_and(|e| e.status == EventStatus::Active);
    if !live {
        return;
    }
    for (address, leaf) in remaining_signals(game, number) {
        if let Some(payload) = matcher(&leaf) {
            commit(game, number, leaf, payload, address);
            visit_event(game, number);
            return;
        }
    }
}

/// The signals a live event still awaits. Resolution failures and
/// spontaneous completions are handled on the spot, yielding nothing to
/// bind to.
fn remaining_signals(
    game: &mut Game,
    number: EventNumber,
) -> Vec<(SignalAddress, Signal)> {
    let Some(event) = game.event(number) else {
        return Vec::new();
    };
    let event = event.clone();
    match resolve(&event.expr, &event.env, game, event.owner) {
        Ok(Todo::Pending(pending)) => pending,
        Ok(Todo::Done(value)) => {
            complete(game, number, value);
            Vec::new()
        },
        Err(EvalError::Raised(message)) => {
            absorb(game, number, event.owner, &message);
            Vec::new()
        },
    }
}

fn commit(
    game: &mut Game,
    number: EventNumber,
    signal: Signal,
    payload: Value,
    address: SignalAddress,
) {
    if let Some(event) = game.event_mut(number) {
        event.env.push(SignalOccurrence {
            signal,
            payload,
            address: Some(address),
        });
    }
}

/* COMPLETION */

/// Re-resolves an event; if it is complete, dispatches its handler. Used
/// after every environment commit and right after installation, since an
/// expression without signals is complete from the start.
pub(crate) fn visit_event(game: &mut Game, number: EventNumber) {
    let Some(event) = game.event(number) else {
        return;
    };
    if event.status != EventStatus::Active {
        return;
    }
    let event = event.clone();
    match resolve(&event.expr, &event.env, game, event.owner) {
        Ok(Todo::Pending(_)) => {},
        Ok(Todo::Done(value)) => complete(game, number, value),
        Err(EvalError::Raised(message)) => {
            absorb(game, number, event.owner, &message);
        },
    }
}

/// Completion is one-shot: the environment is dropped and the event
/// tombstoned before the handler runs, so nothing the handler does can
/// re-fire it.
fn complete(game: &mut Game, number: EventNumber, value: Value) {
    let (owner, handler) = match game.event_mut(number) {
        Some(event) => {
            event.env.clear();
            event.status = EventStatus::Deleted;
            (event.owner, event.handler.clone())
        },
        None => return,
    };
    if let Err(EvalError::Raised(message)) =
        eval_effect(&handler(number, value), game, owner)
    {
        absorb(game, number, owner, &message);
    }
}

/// Top of the handler-dispatch stack: a raised error ends here, logged,
/// and the pipeline moves on to the next event.
fn absorb(game: &mut Game, number: EventNumber, owner: RuleNumber, message: &str) {
    log::warn!("event {number} handler raised: {message}");
    game.log_append(
        None,
        format!(
            "Error in rule {owner} (triggered by event {number}): {message}",
        ),
    );
}
