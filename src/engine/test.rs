//! # Engine Test Module
//!
//! Exercises the evaluators and the trigger pipeline together: typed
//! variables, rule gating, error catch and isolation, hypothetical
//! execution, lifecycle cascades, one-shot event completion, and input
//! routing through the host interface.

use std::rc::Rc;

use chrono::DateTime;
use chrono::TimeZone;
use chrono::Utc;

use crate::engine::effect::eval_effect;
use crate::engine::error::EvalError;
use crate::engine::error::InputError;
use crate::engine::pure::eval_pure;
use crate::event::EventExpr;
use crate::event::InputForm;
use crate::event::RuleEventKind;
use crate::event::Signal;
use crate::expr::Expr;
use crate::expr::Pure;
use crate::expr::Value;
use crate::interface;
use crate::interface::InputData;
use crate::state::EventStatus;
use crate::state::Game;
use crate::state::OutputStatus;
use crate::state::RuleDraft;
use crate::state::RuleNumber;
use crate::state::RuleStatus;
use crate::state::SYSTEM_RULE;

/* FIXTURES */

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

fn game() -> Game {
    Game::new("engine-tests", "", epoch(), 42)
}

/// Evaluates under the system actor, panicking on a raised error.
fn run(game: &mut Game, expr: Expr) -> Value {
    eval_effect(&expr, game, SYSTEM_RULE).unwrap()
}

fn draft(number: RuleNumber, body: Expr) -> RuleDraft {
    RuleDraft {
        number,
        name: format!("rule {number}"),
        description: String::new(),
        source: String::new(),
        body,
        proposer: 1,
    }
}

/// Proposes and activates a rule in one step.
fn enact(game: &mut Game, number: RuleNumber, body: Expr) {
    assert!(interface::propose_rule(game, draft(number, body)).unwrap());
    assert!(interface::activate_rule(game, number).unwrap());
}

fn read_var(game: &Game, name: &str) -> Option<Value> {
    game.variable(name).map(|v| v.value.clone())
}

/* VARIABLES */

#[test]
fn variables_are_named_uniquely_and_typed_at_creation() {
    let mut game = game();
    let created =
        run(&mut game, Expr::NewVar("score".into(), Value::Int(0)));
    assert_eq!(created, Value::Bool(true));

    let duplicate =
        run(&mut game, Expr::NewVar("score".into(), Value::Int(9)));
    assert_eq!(duplicate, Value::Bool(false));

    let written =
        run(&mut game, Expr::WriteVar("score".into(), Value::Int(3)));
    assert_eq!(written, Value::Bool(true));

    // A kind-mismatched write fails and leaves the value alone.
    let mismatched = run(
        &mut game,
        Expr::WriteVar("score".into(), Value::Text("three".into())),
    );
    assert_eq!(mismatched, Value::Bool(false));
    assert_eq!(read_var(&game, "score"), Some(Value::Int(3)));

    assert_eq!(
        run(&mut game, Expr::DelVar("score".into())),
        Value::Bool(true),
    );
    assert_eq!(
        run(&mut game, Expr::DelVar("score".into())),
        Value::Bool(false),
    );
}

#[test]
fn reads_wrap_their_result_in_an_optional() {
    let mut game = game();
    run(&mut game, Expr::NewVar("x".into(), Value::Int(7)));

    let present =
        eval_pure(&Pure::ReadVar("x".into()), &game, SYSTEM_RULE).unwrap();
    assert_eq!(present, Value::maybe(Some(Value::Int(7))));

    let absent =
        eval_pure(&Pure::ReadVar("y".into()), &game, SYSTEM_RULE).unwrap();
    assert_eq!(absent, Value::maybe(None));
}

/* RULE GATING */

#[test]
fn writes_from_inactive_rules_are_dropped() {
    let mut game = game();
    assert!(interface::propose_rule(
        &mut game,
        draft(5, Expr::Return(Value::Unit)),
    )
    .unwrap());

    // Rule 5 is proposed but not active; rule 9 does not exist at all.
    for actor in [5, 9] {
        let refused = eval_effect(
            &Expr::NewVar("w".into(), Value::Int(1)),
            &mut game,
            actor,
        )
        .unwrap();
        assert_eq!(refused, Value::Bool(false));
        assert!(game.variable("w").is_none());

        let installed = eval_effect(
            &Expr::OnEvent(
                EventExpr::Signal(Signal::Victory),
                Rc::new(|_, _| Expr::Return(Value::Unit)),
            ),
            &mut game,
            actor,
        )
        .unwrap();
        assert_eq!(installed, Value::Int(0));
        assert!(game.events.is_empty());
    }
}

#[test]
fn a_rejected_rules_continuations_become_harmless() {
    let mut game = game();
    run(&mut game, Expr::NewVar("w".into(), Value::Int(0)));
    enact(&mut game, 5, Expr::Return(Value::Unit));
    assert!(interface::reject_rule(&mut game, 5).unwrap());

    // A continuation still holding rule 5's authority can no longer
    // touch anything.
    let refused = eval_effect(
        &Expr::WriteVar("w".into(), Value::Int(1)),
        &mut game,
        5,
    )
    .unwrap();
    assert_eq!(refused, Value::Bool(false));
    assert_eq!(read_var(&game, "w"), Some(Value::Int(0)));
}

/* ALLOCATION */

#[test]
fn entity_numbers_grow_from_one_past_the_maximum() {
    let mut game = game();
    let noop: crate::event::Handler =
        Rc::new(|_, _| Expr::Return(Value::Unit));

    let first = run(
        &mut game,
        Expr::OnEvent(
            EventExpr::Signal(Signal::Victory),
            noop.clone(),
        ),
    );
    let second = run(
        &mut game,
        Expr::OnEvent(
            EventExpr::Signal(Signal::Victory),
            noop.clone(),
        ),
    );
    assert_eq!((first, second), (Value::Int(1), Value::Int(2)));

    // Tombstoning does not free a number.
    run(&mut game, Expr::DelEvent(2));
    let third = run(
        &mut game,
        Expr::OnEvent(EventExpr::Signal(Signal::Victory), noop),
    );
    assert_eq!(third, Value::Int(3));
}

/* ERRORS */

#[test]
fn catch_frames_intercept_raised_errors() {
    let mut game = game();
    let caught = run(
        &mut game,
        Expr::CatchError(
            Box::new(Expr::ThrowError("boom".into())),
            Rc::new(|message| Expr::Return(Value::Text(message))),
        ),
    );
    assert_eq!(caught, Value::Text("boom".into()));

    let uncaught = eval_effect(
        &Expr::ThrowError("loose".into()),
        &mut game,
        SYSTEM_RULE,
    );
    assert_eq!(uncaught, Err(EvalError::Raised("loose".into())));

    // A catch frame is transparent to successful evaluation.
    let passed = run(
        &mut game,
        Expr::CatchError(
            Box::new(Expr::Return(Value::Int(1))),
            Rc::new(|_| Expr::Return(Value::Int(2))),
        ),
    );
    assert_eq!(passed, Value::Int(1));
}

#[test]
fn a_throwing_handler_does_not_starve_its_neighbours() {
    let mut game = game();
    enact(
        &mut game,
        3,
        Expr::OnEvent(
            EventExpr::Signal(Signal::Message("tick".into())),
            Rc::new(|_, _| Expr::ThrowError("boom".into())),
        )
        .then(Expr::Return(Value::Unit)),
    );
    enact(
        &mut game,
        4,
        Expr::NewVar("Z".into(), Value::Int(0))
            .then(Expr::OnEvent(
                EventExpr::Signal(Signal::Message("tick".into())),
                Rc::new(|_, _| {
                    Expr::WriteVar("Z".into(), Value::Int(1))
                }),
            ))
            .then(Expr::Return(Value::Unit)),
    );

    interface::inject_message(&mut game, "tick", Value::Unit);

    assert_eq!(read_var(&game, "Z"), Some(Value::Int(1)));
    assert!(game
        .log
        .iter()
        .any(|entry| entry.message.contains("Error in rule 3")
            && entry.message.contains("boom")));
}

/* RANDOMNESS */

#[test]
fn random_draws_are_deterministic_per_seed() {
    let mut a = game();
    let mut b = game();
    for _ in 0..3 {
        let x = run(&mut a, Expr::Random(1, 100));
        let y = run(&mut b, Expr::Random(1, 100));
        assert_eq!(x, y);
    }

    // A single-value range is still a draw; both streams take it and
    // stay in lockstep.
    let x = run(&mut a, Expr::Random(5, 5));
    let y = run(&mut b, Expr::Random(5, 5));
    assert_eq!((x, y), (Value::Int(5), Value::Int(5)));

    // A gated-out draw advances nothing.
    let skipped = eval_effect(&Expr::Random(1, 100), &mut a, 77).unwrap();
    assert_eq!(skipped, Value::Int(1));
    let x = run(&mut a, Expr::Random(1, 100));
    let y = run(&mut b, Expr::Random(1, 100));
    assert_eq!(x, y);
}

/* SIMULATION */

#[test]
fn simulation_observes_its_writes_but_commits_nothing() {
    let mut game = game();
    run(&mut game, Expr::NewVar("X".into(), Value::Int(0)));

    let predicate = Pure::ReadVar("X".into()).and_then(|v| {
        Pure::Const(Value::Bool(v.as_maybe() == Some(&Value::Int(1))))
    });
    let hypothetical = Pure::Simu(
        Box::new(Expr::WriteVar("X".into(), Value::Int(1))),
        Box::new(predicate),
    );

    let observed = eval_pure(&hypothetical, &game, SYSTEM_RULE).unwrap();
    assert_eq!(observed, Value::Bool(true));
    assert_eq!(read_var(&game, "X"), Some(Value::Int(0)));
}

#[test]
fn simulation_leaves_the_random_stream_alone() {
    let mut game = game();
    let mut witness = game.clone();

    let hypothetical = Pure::Simu(
        Box::new(Expr::Random(1, 1_000_000)),
        Box::new(Pure::Const(Value::Bool(true))),
    );
    eval_pure(&hypothetical, &game, SYSTEM_RULE).unwrap();

    let x = run(&mut game, Expr::Random(1, 1_000_000));
    let y = run(&mut witness, Expr::Random(1, 1_000_000));
    assert_eq!(x, y);
}

#[test]
fn simulation_discards_created_entities() {
    let mut game = game();
    let hypothetical = Pure::Simu(
        Box::new(
            Expr::NewVar("ghost".into(), Value::Unit).then(
                Expr::NewOutput(None, Pure::Const(Value::Unit)),
            ),
        ),
        Box::new(Pure::Const(Value::Bool(true))),
    );
    eval_pure(&hypothetical, &game, SYSTEM_RULE).unwrap();
    assert!(game.variables.is_empty());
    assert!(game.outputs.is_empty());
}

/* REJECTION CASCADE */

#[test]
fn rejecting_a_rule_purges_everything_it_owns() {
    let mut game = game();
    enact(
        &mut game,
        5,
        Expr::NewVar("Y".into(), Value::Int(1))
            .then(Expr::OnEvent(
                EventExpr::Signal(Signal::Message("m".into())),
                Rc::new(|_, _| Expr::Return(Value::Unit)),
            ))
            .then(Expr::NewOutput(
                None,
                Pure::Const(Value::Text("owned".into())),
            ))
            .then(Expr::Return(Value::Unit)),
    );
    assert!(game.variable("Y").is_some());

    assert!(interface::reject_rule(&mut game, 5).unwrap());

    assert_eq!(game.rule(5).unwrap().status, RuleStatus::Rejected);
    assert!(game.variable("Y").is_none());
    assert!(game
        .events
        .iter()
        .filter(|e| e.owner == 5)
        .all(|e| e.status == EventStatus::Deleted));
    assert!(game
        .outputs
        .iter()
        .filter(|o| o.owner == 5)
        .all(|o| o.status == OutputStatus::Deleted));
}

#[test]
fn rejection_clears_the_victory_record_of_its_declarer_only() {
    let mut game = game();
    enact(
        &mut game,
        6,
        Expr::DeclareVictory(Pure::Const(Value::List(vec![
            Value::Int(1),
        ]))),
    );
    assert!(game.victory.is_some());

    enact(&mut game, 7, Expr::Return(Value::Unit));
    assert!(interface::reject_rule(&mut game, 7).unwrap());
    assert!(game.victory.is_some());

    assert!(interface::reject_rule(&mut game, 6).unwrap());
    assert!(game.victory.is_none());
}

/* LIFECYCLE SIGNALS */

#[test]
fn lifecycle_observers_see_the_mutation_already_committed() {
    let mut game = game();
    run(&mut game, Expr::NewVar("seen".into(), Value::Bool(false)));
    run(
        &mut game,
        Expr::OnEvent(
            EventExpr::Signal(Signal::Rule(RuleEventKind::Proposed)),
            Rc::new(|_, payload| {
                let number = payload.as_int().unwrap_or(0);
                Expr::Lift(Pure::AllRuleNumbers).and_then(move |all| {
                    let committed = all
                        .as_list()
                        .is_some_and(|l| {
                            l.contains(&Value::Int(number))
                        });
                    Expr::WriteVar(
                        "seen".into(),
                        Value::Bool(committed),
                    )
                })
            }),
        ),
    );

    assert!(interface::propose_rule(
        &mut game,
        draft(9, Expr::Return(Value::Unit)),
    )
    .unwrap());
    assert_eq!(read_var(&game, "seen"), Some(Value::Bool(true)));
}

/* ONE-SHOT COMPLETION */

#[test]
fn completion_is_one_shot_and_reinjection_is_a_noop() {
    let mut game = game();
    run(&mut game, Expr::NewVar("count".into(), Value::Int(0)));
    run(
        &mut game,
        Expr::OnEvent(
            EventExpr::Signal(Signal::Message("once".into())),
            Rc::new(|_, _| {
                Expr::Lift(Pure::ReadVar("count".into())).and_then(|v| {
                    let next = v
                        .as_maybe()
                        .and_then(Value::as_int)
                        .unwrap_or(0)
                        + 1;
                    Expr::WriteVar("count".into(), Value::Int(next))
                })
            }),
        ),
    );

    interface::inject_message(&mut game, "once", Value::Unit);
    interface::inject_message(&mut game, "once", Value::Unit);

    assert_eq!(read_var(&game, "count"), Some(Value::Int(1)));
    assert_eq!(game.event(1).unwrap().status, EventStatus::Deleted);
    assert!(game.event(1).unwrap().env.is_empty());
}

#[test]
fn an_event_complete_at_installation_fires_immediately() {
    let mut game = game();
    run(&mut game, Expr::NewVar("fired".into(), Value::Bool(false)));
    run(
        &mut game,
        Expr::OnEvent(
            EventExpr::Pure(Value::Unit),
            Rc::new(|_, _| {
                Expr::WriteVar("fired".into(), Value::Bool(true))
            }),
        ),
    );
    assert_eq!(read_var(&game, "fired"), Some(Value::Bool(true)));
}

/* INPUT ROUTING */

#[test]
fn inputs_route_by_event_address_and_form() {
    let mut game = game();
    interface::add_player(&mut game, "alice");
    run(&mut game, Expr::NewVar("who".into(), Value::Text("".into())));
    run(
        &mut game,
        Expr::OnEvent(
            EventExpr::Signal(Signal::Input {
                player: 1,
                prompt: "name?".into(),
                form: InputForm::Text,
            }),
            Rc::new(|_, payload| Expr::WriteVar("who".into(), payload)),
        ),
    );

    let forms = interface::pending_inputs(&game);
    assert_eq!(forms.len(), 1);
    let form = &forms[0];
    assert_eq!((form.event, form.player), (1, 1));
    assert_eq!(form.form, InputForm::Text);

    // Wrong event, wrong address, wrong form kind, wrong data shape.
    assert_eq!(
        interface::inject_input(
            &mut game,
            99,
            &form.address,
            &form.form,
            &InputData::Text("x".into()),
        ),
        Err(InputError::UnknownEvent { event: 99 }),
    );
    assert_eq!(
        interface::inject_input(
            &mut game,
            form.event,
            &[crate::event::AddressTag::SumL],
            &form.form,
            &InputData::Text("x".into()),
        ),
        Err(InputError::AddressNotPending { event: 1 }),
    );
    assert_eq!(
        interface::inject_input(
            &mut game,
            form.event,
            &form.address,
            &InputForm::Button,
            &InputData::Button,
        ),
        Err(InputError::FormMismatch { event: 1 }),
    );
    assert_eq!(
        interface::inject_input(
            &mut game,
            form.event,
            &form.address,
            &form.form,
            &InputData::Button,
        ),
        Err(InputError::InvalidData { event: 1 }),
    );
    assert_eq!(read_var(&game, "who"), Some(Value::Text("".into())));

    // The well-formed submission binds and completes the event.
    interface::inject_input(
        &mut game,
        form.event,
        &form.address,
        &form.form,
        &InputData::Text("alice".into()),
    )
    .unwrap();
    assert_eq!(
        read_var(&game, "who"),
        Some(Value::Text("alice".into())),
    );

    // The event completed; a replay no longer routes.
    assert_eq!(
        interface::inject_input(
            &mut game,
            form.event,
            &form.address,
            &form.form,
            &InputData::Text("bob".into()),
        ),
        Err(InputError::UnknownEvent { event: 1 }),
    );
}

#[test]
fn out_of_range_choices_are_dropped() {
    let mut game = game();
    interface::add_player(&mut game, "alice");
    let choices = InputForm::Radio(vec![
        (0, "yes".into()),
        (1, "no".into()),
    ]);
    run(
        &mut game,
        Expr::OnEvent(
            EventExpr::Signal(Signal::Input {
                player: 1,
                prompt: "pick".into(),
                form: choices.clone(),
            }),
            Rc::new(|_, _| Expr::Return(Value::Unit)),
        ),
    );
    let forms = interface::pending_inputs(&game);
    assert_eq!(
        interface::inject_input(
            &mut game,
            forms[0].event,
            &forms[0].address,
            &choices,
            &InputData::Radio(5),
        ),
        Err(InputError::InvalidData { event: 1 }),
    );
    assert_eq!(game.event(1).unwrap().status, EventStatus::Active);
}

/* TIMERS */

#[test]
fn timers_fire_once_their_deadline_is_reached() {
    let mut game = game();
    let soon = epoch() + chrono::Duration::hours(1);
    let later = epoch() + chrono::Duration::hours(5);
    run(&mut game, Expr::NewVar("fired".into(), Value::Int(0)));
    for deadline in [soon, later] {
        run(
            &mut game,
            Expr::OnEvent(
                EventExpr::Signal(Signal::Time(deadline)),
                Rc::new(|_, _| {
                    Expr::Lift(Pure::ReadVar("fired".into())).and_then(
                        |v| {
                            let next = v
                                .as_maybe()
                                .and_then(Value::as_int)
                                .unwrap_or(0)
                                + 1;
                            Expr::WriteVar(
                                "fired".into(),
                                Value::Int(next),
                            )
                        },
                    )
                }),
            ),
        );
    }

    assert_eq!(interface::next_timers(&game), vec![soon, later]);

    interface::inject_time(&mut game, soon);
    assert_eq!(game.current_time, soon);
    assert_eq!(read_var(&game, "fired"), Some(Value::Int(1)));
    assert_eq!(interface::next_timers(&game), vec![later]);

    interface::inject_time(&mut game, later + chrono::Duration::hours(1));
    assert_eq!(read_var(&game, "fired"), Some(Value::Int(2)));
}

/* OUTPUTS AND VICTORY */

#[test]
fn outputs_are_rendered_on_demand_per_recipient() {
    let mut game = game();
    interface::add_player(&mut game, "alice");
    interface::add_player(&mut game, "bob");
    run(&mut game, Expr::NewVar("mood".into(), Value::Text("calm".into())));

    run(
        &mut game,
        Expr::NewOutput(None, Pure::Const(Value::Text("hello".into()))),
    );
    let personal = Pure::ReadVar("mood".into()).and_then(|v| {
        Pure::Const(match v.as_maybe() {
            Some(value) => value.clone(),
            None => Value::Text("gone".into()),
        })
    });
    run(&mut game, Expr::NewOutput(Some(2), personal));

    assert_eq!(interface::read_outputs(&game, None), vec!["hello"]);
    assert_eq!(
        interface::read_outputs(&game, Some(2)),
        vec!["hello", "calm"],
    );

    run(&mut game, Expr::WriteVar("mood".into(), Value::Text("wild".into())));
    assert_eq!(
        interface::read_outputs(&game, Some(2)),
        vec!["hello", "wild"],
    );

    run(&mut game, Expr::DelOutput(1));
    assert_eq!(interface::read_outputs(&game, Some(2)), vec!["wild"]);
}

#[test]
fn victory_is_reevaluated_on_read() {
    let mut game = game();
    interface::add_player(&mut game, "alice");
    interface::add_player(&mut game, "bob");
    run(
        &mut game,
        Expr::DeclareVictory(Pure::Const(Value::List(vec![
            Value::Int(2),
            Value::Int(1),
        ]))),
    );
    assert_eq!(interface::read_victory(&game), vec![2, 1]);
}

/* PLAYERS */

#[test]
fn player_lifecycle_is_observable() {
    let mut game = game();
    run(&mut game, Expr::NewVar("left".into(), Value::Int(0)));
    run(
        &mut game,
        Expr::OnEvent(
            EventExpr::Signal(Signal::Player(
                crate::event::PlayerEventKind::Leave,
            )),
            Rc::new(|_, payload| Expr::WriteVar("left".into(), payload)),
        ),
    );

    let alice = interface::add_player(&mut game, "alice");
    let bob = interface::add_player(&mut game, "bob");
    assert_eq!((alice, bob), (1, 2));

    run(&mut game, Expr::SetPlayerName(2, "robert".into()));
    assert_eq!(game.player(2).unwrap().name, "robert");

    run(&mut game, Expr::DelPlayer(2));
    assert!(game.player(2).is_none());
    assert_eq!(read_var(&game, "left"), Some(Value::Int(2)));
}
