//! # Interface Module
//!
//! The host-facing surface of the engine. A host application (web UI,
//! test driver, simulation harness) owns a [`Game`] and drives it through
//! the functions here: submitting and assessing rules, injecting player
//! inputs, clock ticks and messages, and reading rendered outputs back.
//!
//! All entry points are synchronous and must be serialized by the host;
//! the engine performs no locking and no scheduling. Timer signals in
//! particular are the host's job: poll [`next_timers`] and call
//! [`inject_time`] once wall time passes a deadline.

use anyhow::Context;
use anyhow::Result;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::engine::effect::eval_effect;
use crate::engine::error::InputError;
use crate::engine::pure::eval_pure;
use crate::engine::trigger;
use crate::event::resolver::resolve;
use crate::event::AddressTag;
use crate::event::InputForm;
use crate::event::PlayerEventKind;
use crate::event::Signal;
use crate::event::SignalAddress;
use crate::event::Todo;
use crate::expr::Expr;
use crate::expr::Value;
use crate::state::EventNumber;
use crate::state::Game;
use crate::state::OutputStatus;
use crate::state::Player;
use crate::state::PlayerNumber;
use crate::state::RuleDraft;
use crate::state::RuleNumber;
use crate::state::SYSTEM_RULE;

/* WIRE TYPES */

/// Data submitted for one input control. The shape must match the form
/// kind of the leaf it is routed to; choice payloads are indices into the
/// declared option list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputData {
    /// Submission of a single-line text control.
    Text(String),

    /// Submission of a multi-line text control.
    TextArea(String),

    /// Submission of a button press.
    Button,

    /// Submission of a radio control: the selected option index.
    Radio(usize),

    /// Submission of a checkbox control: the checked option indices.
    Checkbox(Vec<usize>),
}

/// Description of one input control a live event is waiting on. The host
/// renders the form and echoes `event` and `address` verbatim with the
/// submission so the occurrence lands on exactly this leaf.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FormDescriptor {
    /// The event awaiting the input.
    pub event: EventNumber,

    /// Structural address of the input leaf within the event.
    pub address: SignalAddress,

    /// The player the control is presented to.
    pub player: PlayerNumber,

    /// Prompt text shown alongside the control.
    pub prompt: String,

    /// The control kind and its options.
    pub form: InputForm,
}

/* PLAYERS AND RULES */

/// Adds a player and fires the player-arrive signal. Returns the number
/// allocated to the new player.
pub fn add_player(game: &mut Game, name: &str) -> PlayerNumber {
    let number = game.next_player_number();
    game.players.push(Player {
        number,
        name: name.to_owned(),
    });
    trigger::trigger_player_event(game, PlayerEventKind::Arrive, number);
    number
}

/// Submits a rule draft through the proposal pipeline, as the system
/// actor. Returns whether the draft was accepted (its number was free).
///
/// # Errors
///
/// When a rule observing the proposal raises an error that escapes every
/// catch frame below the API boundary.
pub fn propose_rule(game: &mut Game, draft: RuleDraft) -> Result<bool> {
    let value = eval_effect(&Expr::ProposeRule(Box::new(draft)), game, SYSTEM_RULE)
        .context("Rule proposal failed.")?;
    Ok(value.as_bool().unwrap_or(false))
}

/// Activates a proposed rule as the system actor: flips its status, runs
/// its body, fires the rule-activated signal. Returns whether the
/// transition happened.
///
/// # Errors
///
/// When an observer of the activation raises an error that escapes every
/// catch frame below the API boundary.
pub fn activate_rule(game: &mut Game, number: RuleNumber) -> Result<bool> {
    let value = eval_effect(&Expr::ActivateRule(number), game, SYSTEM_RULE)
        .context("Rule activation failed.")?;
    Ok(value.as_bool().unwrap_or(false))
}

/// Rejects a proposed or active rule as the system actor, purging
/// everything it owns. Returns whether the transition happened.
///
/// # Errors
///
/// When an observer of the rejection raises an error that escapes every
/// catch frame below the API boundary.
pub fn reject_rule(game: &mut Game, number: RuleNumber) -> Result<bool> {
    let value = eval_effect(&Expr::RejectRule(number), game, SYSTEM_RULE)
        .context("Rule rejection failed.")?;
    Ok(value.as_bool().unwrap_or(false))
}

/* SIGNAL INJECTION */

/// Routes a player's form submission to the event and address the form
/// echoed back.
///
/// # Errors
///
/// Any of the drop reasons in [`InputError`]. The game is unchanged in
/// every error case; a diagnostic log line has already been written.
pub fn inject_input(
    game: &mut Game,
    event: EventNumber,
    address: &[AddressTag],
    form: &InputForm,
    data: &InputData,
) -> Result<(), InputError> {
    trigger::trigger_input(game, event, address, form, data)
}

/// Advances the game clock to `now` and fires every timer with a
/// deadline at or before it.
pub fn inject_time(game: &mut Game, now: DateTime<Utc>) {
    trigger::trigger_time(game, now);
}

/// Fires the named message signal with a payload.
pub fn inject_message(game: &mut Game, name: &str, payload: Value) {
    trigger::trigger_message(game, name, &payload);
}

/* INTROSPECTION */

/// Enumerates every input control live events are waiting on, in trigger
/// order.
pub fn pending_inputs(game: &Game) -> Vec<FormDescriptor> {
    let mut descriptors = Vec::new();
    for number in game.live_events() {
        let Some(event) = game.event(number) else {
            continue;
        };
        let resolved = resolve(&event.expr, &event.env, game, event.owner);
        let Ok(Todo::Pending(pending)) = resolved else {
            continue;
        };
        for (address, leaf) in pending {
            if let Signal::Input { player, prompt, form } = leaf {
                descriptors.push(FormDescriptor {
                    event: number,
                    address,
                    player,
                    prompt,
                    form,
                });
            }
        }
    }
    descriptors
}

/// Enumerates the deadlines of every timer a live event is waiting on,
/// ascending and deduplicated. The host schedules [`inject_time`] calls
/// from this.
pub fn next_timers(game: &Game) -> Vec<DateTime<Utc>> {
    let mut deadlines = Vec::new();
    for number in game.live_events() {
        let Some(event) = game.event(number) else {
            continue;
        };
        let resolved = resolve(&event.expr, &event.env, game, event.owner);
        let Ok(Todo::Pending(pending)) = resolved else {
            continue;
        };
        for (_, leaf) in pending {
            if let Signal::Time(deadline) = leaf {
                deadlines.push(deadline);
            }
        }
    }
    deadlines.sort();
    deadlines.dedup();
    deadlines
}

/// Renders the outputs visible to `player`: those addressed to them plus
/// every broadcast, or broadcasts only when no player is given. Outputs
/// whose producer raises are skipped with a diagnostic.
pub fn read_outputs(
    game: &Game,
    player: Option<PlayerNumber>,
) -> Vec<String> {
    game.outputs
        .iter()
        .filter(|o| o.status == OutputStatus::Active)
        .filter(|o| o.recipient.is_none() || o.recipient == player)
        .filter_map(|o| match eval_pure(&o.producer, game, o.owner) {
            Ok(value) => Some(value.to_string()),
            Err(reason) => {
                log::warn!("skipping output {}: {reason}", o.number);
                None
            },
        })
        .collect()
}

/// The current winners, per the victory record's pure expression, or an
/// empty list when no victory was declared.
pub fn read_victory(game: &Game) -> Vec<PlayerNumber> {
    let Some(victory) = &game.victory else {
        return Vec::new();
    };
    match eval_pure(&victory.winners, game, victory.rule) {
        Ok(Value::List(values)) => values
            .iter()
            .filter_map(|v| v.as_int())
            .filter_map(|i| u32::try_from(i).ok())
            .collect(),
        Ok(other) => {
            log::warn!("victory expression yielded non-list: {other}");
            Vec::new()
        },
        Err(reason) => {
            log::warn!("victory expression raised: {reason}");
            Vec::new()
        },
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::event::AddressTag;

    #[test]
    fn wire_types_round_trip_through_json() -> Result<()> {
        let descriptor = FormDescriptor {
            event: 4,
            address: vec![AddressTag::SumL, AddressTag::Shortcut(2)],
            player: 1,
            prompt: "vote".into(),
            form: InputForm::Radio(vec![
                (0, "For".into()),
                (1, "Against".into()),
            ]),
        };
        let wire = serde_json::to_string(&descriptor)?;
        let echoed: FormDescriptor = serde_json::from_str(&wire)?;
        assert_eq!(echoed, descriptor);

        let data = InputData::Checkbox(vec![0, 2]);
        let wire = serde_json::to_string(&data)?;
        let echoed: InputData = serde_json::from_str(&wire)?;
        assert_eq!(echoed, data);
        Ok(())
    }
}
