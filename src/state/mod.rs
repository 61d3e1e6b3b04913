//! # State Module
//!
//! The in-memory game aggregate and its entities. The [`Game`] exclusively
//! owns every collection; entities refer to each other by number only, so
//! no cyclic links exist and lookups stay simple scans, which is adequate
//! at the scale of tens of rules and hundreds of events.
//!
//! Cloning a [`Game`] clones everything, including the random stream; the
//! pure language relies on this for hypothetical execution.

use chrono::DateTime;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use serde::Serialize;

use crate::event::EventExpr;
use crate::event::Handler;
use crate::event::SignalOccurrence;
use crate::expr::Expr;
use crate::expr::Pure;
use crate::expr::Value;

/* TYPES */

/// Unique identifier of a rule. `0` denotes the system actor: implicitly
/// active, never stored in the rule list, bypasses rule gating.
pub type RuleNumber = u32;

/// Unique identifier of a player.
pub type PlayerNumber = u32;

/// Unique identifier of an event, monotonic per game.
pub type EventNumber = u32;

/// Unique identifier of an output, monotonic per game.
pub type OutputNumber = u32;

/// The system actor.
pub const SYSTEM_RULE: RuleNumber = 0;

/* RULES */

/// Lifecycle status of a rule. Legal transitions are proposed to active,
/// proposed to rejected, and active to rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleStatus {
    /// Submitted, not yet assessed.
    Proposed,

    /// In force: its body has run and it may own state.
    Active,

    /// Out of force; everything it owned has been purged.
    Rejected,
}

/// A unit of game law.
#[derive(Clone)]
pub struct Rule {
    /// Unique rule number, assigned by the proposer.
    pub number: RuleNumber,

    /// Short display name.
    pub name: String,

    /// Longer human-readable description.
    pub description: String,

    /// Verbatim source text, kept opaque for display purposes.
    pub source: String,

    /// Compiled body, executed when the rule becomes active.
    pub body: Expr,

    /// The player who proposed the rule.
    pub proposer: PlayerNumber,

    /// Current lifecycle status.
    pub status: RuleStatus,

    /// The rule that assessed (activated or rejected) this one, `Some(0)`
    /// for the system. `None` while proposed.
    pub assessor: Option<RuleNumber>,
}

/// The submittable portion of a rule: everything except lifecycle fields.
#[derive(Clone)]
pub struct RuleDraft {
    /// Requested rule number; submission fails if it is taken.
    pub number: RuleNumber,

    /// Short display name.
    pub name: String,

    /// Longer human-readable description.
    pub description: String,

    /// Verbatim source text.
    pub source: String,

    /// Compiled body.
    pub body: Expr,

    /// The proposing player.
    pub proposer: PlayerNumber,
}

impl RuleDraft {
    /// Materialises the draft as a rule in the given status.
    pub(crate) fn into_rule(self, status: RuleStatus) -> Rule {
        Rule {
            number: self.number,
            name: self.name,
            description: self.description,
            source: self.source,
            body: self.body,
            proposer: self.proposer,
            status,
            assessor: None,
        }
    }
}

/* VARIABLES */

/// A named, typed variable owned by a rule. The value's kind is fixed at
/// creation; mismatched writes are refused.
#[derive(Clone)]
pub struct Variable {
    /// The rule that created the variable.
    pub owner: RuleNumber,

    /// Game-wide unique name.
    pub name: String,

    /// Current contents.
    pub value: Value,
}

/* EVENTS */

/// Status of an installed event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    /// Live: visited by the trigger pipeline.
    Active,

    /// Tombstoned: kept to preserve numbering history, otherwise ignored.
    Deleted,
}

/// An installed event observer.
#[derive(Clone)]
pub struct EventInfo {
    /// Unique event number.
    pub number: EventNumber,

    /// The rule that installed the event; its handler runs under this
    /// rule's authority.
    pub owner: RuleNumber,

    /// The combinator tree being observed.
    pub expr: EventExpr,

    /// Fired once when the tree completes.
    pub handler: Handler,

    /// Live or tombstoned.
    pub status: EventStatus,

    /// Occurrences already bound to leaves of this event.
    pub env: Vec<SignalOccurrence>,
}

/* OUTPUTS */

/// Status of a registered output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStatus {
    /// Rendered on demand.
    Active,

    /// Tombstoned.
    Deleted,
}

/// A piece of displayable text, re-evaluated at every read.
#[derive(Clone)]
pub struct Output {
    /// Unique output number.
    pub number: OutputNumber,

    /// The rule that registered the output.
    pub owner: RuleNumber,

    /// Addressee, or `None` for a broadcast.
    pub recipient: Option<PlayerNumber>,

    /// Pure expression producing the current text.
    pub producer: Pure,

    /// Live or tombstoned.
    pub status: OutputStatus,
}

/* PLAYERS, VICTORY, LOG */

/// A participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    /// Unique player number.
    pub number: PlayerNumber,

    /// Display name.
    pub name: String,
}

/// The victory record: who currently wins, re-evaluated on read.
#[derive(Clone)]
pub struct Victory {
    /// The rule that declared victory.
    pub rule: RuleNumber,

    /// Pure expression yielding the list of winning player numbers.
    pub winners: Pure,
}

/// One line of the append-only game log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The player concerned, if the line is about one in particular.
    pub player: Option<PlayerNumber>,

    /// Game-clock timestamp at append time.
    pub time: DateTime<Utc>,

    /// Message text.
    pub message: String,
}

/* GAME AGGREGATE */

/// The root aggregate: one running game.
#[derive(Clone)]
pub struct Game {
    /// Display name of the game.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// All rules ever submitted, in insertion order.
    pub rules: Vec<Rule>,

    /// Current players, in arrival order.
    pub players: Vec<Player>,

    /// Live variables, in creation order.
    pub variables: Vec<Variable>,

    /// All events ever installed, tombstones included.
    pub events: Vec<EventInfo>,

    /// All outputs ever registered, tombstones included.
    pub outputs: Vec<Output>,

    /// The victory record, if one was declared.
    pub victory: Option<Victory>,

    /// Append-only log.
    pub log: Vec<LogEntry>,

    /// The game clock, advanced only by time injection.
    pub current_time: DateTime<Utc>,

    /// Deterministic random stream shared by all rules.
    pub rng: StdRng,
}

impl Game {
    /// Creates an empty game starting at the given instant, with a seeded
    /// random stream.
    pub fn new(
        name: &str,
        description: &str,
        start: DateTime<Utc>,
        seed: u64,
    ) -> Game {
        Game {
            name: name.to_owned(),
            description: description.to_owned(),
            rules: Vec::new(),
            players: Vec::new(),
            variables: Vec::new(),
            events: Vec::new(),
            outputs: Vec::new(),
            victory: None,
            log: Vec::new(),
            current_time: start,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /* LOOKUPS */

    /// Returns the rule with the given number, if any.
    pub fn rule(&self, number: RuleNumber) -> Option<&Rule> {
        self.rules.iter().find(|r| r.number == number)
    }

    /// Mutable variant of [`Game::rule`].
    pub fn rule_mut(&mut self, number: RuleNumber) -> Option<&mut Rule> {
        self.rules.iter_mut().find(|r| r.number == number)
    }

    /// Whether the given rule may currently mutate game state: the system
    /// actor always may, any other rule only while active.
    pub fn rule_active(&self, number: RuleNumber) -> bool {
        number == SYSTEM_RULE
            || self
                .rule(number)
                .is_some_and(|r| r.status == RuleStatus::Active)
    }

    /// Returns the player with the given number, if any.
    pub fn player(&self, number: PlayerNumber) -> Option<&Player> {
        self.players.iter().find(|p| p.number == number)
    }

    /// Mutable variant of [`Game::player`].
    pub fn player_mut(
        &mut self,
        number: PlayerNumber,
    ) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.number == number)
    }

    /// Returns the variable with the given name, if any.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// Mutable variant of [`Game::variable`].
    pub fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables.iter_mut().find(|v| v.name == name)
    }

    /// Returns the event with the given number, tombstoned or not.
    pub fn event(&self, number: EventNumber) -> Option<&EventInfo> {
        self.events.iter().find(|e| e.number == number)
    }

    /// Mutable variant of [`Game::event`].
    pub fn event_mut(
        &mut self,
        number: EventNumber,
    ) -> Option<&mut EventInfo> {
        self.events.iter_mut().find(|e| e.number == number)
    }

    /// Returns the output with the given number, tombstoned or not.
    pub fn output(&self, number: OutputNumber) -> Option<&Output> {
        self.outputs.iter().find(|o| o.number == number)
    }

    /// Mutable variant of [`Game::output`].
    pub fn output_mut(
        &mut self,
        number: OutputNumber,
    ) -> Option<&mut Output> {
        self.outputs.iter_mut().find(|o| o.number == number)
    }

    /* ALLOCATION */

    /// Next free event number: one past the maximum ever allocated.
    pub fn next_event_number(&self) -> EventNumber {
        self.events
            .iter()
            .map(|e| e.number)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Next free output number: one past the maximum ever allocated.
    pub fn next_output_number(&self) -> OutputNumber {
        self.outputs
            .iter()
            .map(|o| o.number)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Next free player number: one past the maximum present.
    pub fn next_player_number(&self) -> PlayerNumber {
        self.players
            .iter()
            .map(|p| p.number)
            .max()
            .unwrap_or(0)
            + 1
    }

    /* TRAVERSAL AND LOGGING */

    /// Numbers of all live events in trigger order: ascending owner, then
    /// ascending event number.
    pub fn live_events(&self) -> Vec<EventNumber> {
        let mut live: Vec<(RuleNumber, EventNumber)> = self
            .events
            .iter()
            .filter(|e| e.status == EventStatus::Active)
            .map(|e| (e.owner, e.number))
            .collect();
        live.sort();
        live.into_iter().map(|(_, n)| n).collect()
    }

    /// Appends a line to the game log at the current game time.
    pub fn log_append(
        &mut self,
        player: Option<PlayerNumber>,
        message: String,
    ) {
        let time = self.current_time;
        self.log.push(LogEntry { player, time, message });
    }
}
