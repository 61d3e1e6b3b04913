//! # Vote Module
//!
//! Time-bounded, early-terminating polls built on the event language. A
//! poll is a shortcut over one timer and one radio input per called
//! voter; its completion predicate consults a pluggable assessment
//! function, so the poll ends the moment the outcome is mathematically
//! settled, and at the deadline in every other case.
//!
//! Assessment functions work over a [`VoteStats`] snapshot and stay
//! undecided with `None`. The quota arithmetic is shared: an outcome is
//! positive once the quota is reached, and negative once the remaining
//! possible supporters can no longer reach it.

use std::cell::Cell;
use std::rc::Rc;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::event::EventExpr;
use crate::event::Handler;
use crate::event::InputForm;
use crate::event::Signal;
use crate::expr::Expr;
use crate::expr::Pure;
use crate::expr::Value;
use crate::state::EventNumber;
use crate::state::OutputNumber;
use crate::state::PlayerNumber;
use crate::state::RuleNumber;

/* UTILITY MODULES */


/* DEFINITIONS */

/// Snapshot of a poll in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteStats {
    /// Ballots cast in favour.
    pub for_count: usize,

    /// Ballots cast against.
    pub against_count: usize,

    /// Number of voters called to the poll.
    pub participants: usize,

    /// Whether the poll is over: the deadline passed, or every called
    /// voter has answered.
    pub finished: bool,
}

impl VoteStats {
    /// Ballots cast so far, either way.
    pub fn voted(&self) -> usize {
        self.for_count + self.against_count
    }

    /// The reference population for quota computations: everyone called
    /// while the poll runs, shrinking to actual ballots once it is over.
    pub fn voters(&self) -> usize {
        if self.finished {
            self.voted()
        } else {
            self.participants
        }
    }
}

/// An assessment function: decides a poll outcome, or stays pending.
pub type AssessFn = Rc<dyn Fn(&VoteStats) -> Option<bool>>;

/// Continuation receiving the assessed outcome of a completed poll.
pub type ResultCont = Rc<dyn Fn(bool) -> Expr>;

/* QUOTA ARITHMETIC */

/// Decides against a fixed quota: `Some(true)` once enough ballots are in
/// favour, `Some(false)` once the undecided ballots can no longer reach
/// the quota, `None` otherwise.
pub fn vote_quota(quota: usize, stats: &VoteStats) -> Option<bool> {
    if stats.for_count >= quota {
        Some(true)
    } else if stats.against_count > stats.voters().saturating_sub(quota) {
        Some(false)
    } else {
        None
    }
}

/// Passes only when every voter is in favour.
pub fn unanimity() -> AssessFn {
    Rc::new(|stats| vote_quota(stats.voters(), stats))
}

/// Passes on more than half of the voters.
pub fn majority() -> AssessFn {
    Rc::new(|stats| vote_quota(stats.voters() / 2 + 1, stats))
}

/// Passes on more than the given percentage of the voters.
pub fn majority_with(percent: usize) -> AssessFn {
    Rc::new(move |stats| {
        vote_quota(stats.voters() * percent / 100 + 1, stats)
    })
}

/// Passes on a fixed number of favourable ballots, regardless of how
/// many voters were called.
pub fn number_votes(count: usize) -> AssessFn {
    Rc::new(move |stats| vote_quota(count, stats))
}

/// Delegates to `inner` once at least `minimum` ballots are in; fails a
/// finished poll below the quorum, and stays pending otherwise.
pub fn with_quorum(inner: AssessFn, minimum: usize) -> AssessFn {
    Rc::new(move |stats| {
        if stats.voted() >= minimum {
            inner(stats)
        } else if stats.finished {
            Some(false)
        } else {
            None
        }
    })
}

/* TALLYING */

/// Computes vote statistics from a poll's partial-result vector, whose
/// first slot is the deadline timer and whose remaining slots are the
/// called voters' ballots.
pub fn tally(results: &[Option<Value>]) -> VoteStats {
    let timer_fired = results.first().is_some_and(Option::is_some);
    let ballots = results.get(1..).unwrap_or(&[]);
    let mut for_count = 0;
    let mut against_count = 0;
    for ballot in ballots.iter().flatten() {
        match ballot.as_bool() {
            Some(true) => for_count += 1,
            Some(false) => against_count += 1,
            None => {},
        }
    }
    VoteStats {
        for_count,
        against_count,
        participants: ballots.len(),
        finished: timer_fired || ballots.iter().all(Option::is_some),
    }
}

/* POLL CONSTRUCTION */

/// Builds the expression that opens a poll: installs the poll event,
/// registers a broadcast output tracking each voter's current ballot,
/// and wires the completion handler.
///
/// The poll asks every listed voter for a For/Against ballot under the
/// given title, ends at `deadline` at the latest, and completes the
/// moment `assess` decides. On completion the tracking output is removed
/// and `on_result` builds the follow-up expression, typically the
/// activation or rejection of the rule under vote (see [`assess_rule`]).
/// The built expression yields the poll's event number as an `Int`.
pub fn call_vote(
    assess: AssessFn,
    deadline: DateTime<Utc>,
    title: &str,
    voters: &[PlayerNumber],
    on_result: ResultCont,
) -> Expr {
    let title = title.to_owned();
    let voters = voters.to_vec();

    let mut children = Vec::with_capacity(voters.len() + 1);
    children.push(EventExpr::Signal(Signal::Time(deadline)));
    for &player in &voters {
        children.push(single_vote(player, &title));
    }
    let poll = EventExpr::Shortcut(children, {
        let assess = assess.clone();
        Rc::new(move |results| assess(&tally(results)).is_some())
    });

    // The tracking output's number exists only after the poll event does,
    // while the handler is built before either; the slot carries it over.
    let display_slot: Rc<Cell<OutputNumber>> = Rc::new(Cell::new(0));

    let handler: Handler = {
        let assess = assess.clone();
        let slot = display_slot.clone();
        Rc::new(move |_, value| {
            let results = unpack_results(&value);
            let passed = assess(&tally(&results)).unwrap_or(false);
            Expr::DelOutput(slot.get()).then(on_result(passed))
        })
    };

    Expr::OnEvent(poll, handler).and_then(move |installed| {
        let Some(event) = installed
            .as_int()
            .and_then(|i| u32::try_from(i).ok())
            .filter(|&n| n > 0)
        else {
            return Expr::Return(Value::Int(0));
        };
        let title = title.clone();
        let voters = voters.clone();
        let slot = display_slot.clone();

        // The poll may have completed while being installed, in which
        // case there is nothing left to track.
        Expr::Lift(Pure::AllEventNumbers).and_then(move |live| {
            let live = live
                .as_list()
                .is_some_and(|l| {
                    l.iter().any(|v| v.as_int() == Some(i64::from(event)))
                });
            if !live {
                return Expr::Return(Value::Int(i64::from(event)));
            }
            let display = intermediate_display(event, &title, &voters);
            let slot = slot.clone();
            Expr::NewOutput(None, display).and_then(move |output| {
                if let Some(n) =
                    output.as_int().and_then(|i| u32::try_from(i).ok())
                {
                    slot.set(n);
                }
                Expr::Return(Value::Int(i64::from(event)))
            })
        })
    })
}

/// The canonical poll continuation: activate the rule under vote on a
/// positive outcome, reject it otherwise.
pub fn assess_rule(target: RuleNumber) -> ResultCont {
    Rc::new(move |passed| {
        if passed {
            Expr::ActivateRule(target)
        } else {
            Expr::RejectRule(target)
        }
    })
}

/* PRIVATE HELPERS */

/// One voter's ballot: a For/Against radio, mapped to a boolean.
fn single_vote(player: PlayerNumber, prompt: &str) -> EventExpr {
    EventExpr::Signal(Signal::Input {
        player,
        prompt: prompt.to_owned(),
        form: InputForm::Radio(vec![
            (0, "For".to_owned()),
            (1, "Against".to_owned()),
        ]),
    })
    .map(|choice| Value::Bool(choice.as_int() == Some(0)))
}

/// Broadcast output rendering each called voter's current ballot.
fn intermediate_display(
    event: EventNumber,
    title: &str,
    voters: &[PlayerNumber],
) -> Pure {
    let title = title.to_owned();
    let voters = voters.to_vec();
    Pure::EventResults(event).and_then(move |results| {
        Pure::Const(Value::Text(render_ballots(&title, &voters, &results)))
    })
}

fn render_ballots(
    title: &str,
    voters: &[PlayerNumber],
    results: &Value,
) -> String {
    let slots = results.as_list().unwrap_or(&[]);
    let mut lines = vec![format!("Vote on {title}:")];
    for (i, player) in voters.iter().enumerate() {
        let ballot = match slots.get(i + 1).and_then(Value::as_maybe) {
            Some(cast) if cast.as_bool() == Some(true) => "For",
            Some(_) => "Against",
            None => "Not Voted",
        };
        lines.push(format!("player {player}: {ballot}"));
    }
    lines.join(" | ")
}

/// A poll completes with its partial-result vector; anything else is an
/// engine invariant violation.
fn unpack_results(value: &Value) -> Vec<Option<Value>> {
    let Some(slots) = value.as_list() else {
        panic!("poll completed with a non-list payload: {value:?}");
    };
    slots
        .iter()
        .map(|slot| match slot {
            Value::Maybe(inner) => {
                inner.as_ref().map(|v| (**v).clone())
            },
            other => {
                panic!("poll slot is not an optional: {other:?}")
            },
        })
        .collect()
}
