use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use formwork::prelude::*;
use futures::channel::oneshot;
use serde_json::{Value, json};

fn signup_form(options: FormOptions) -> FormEngine {
    let form = FormEngine::with_options(json!({"username": "", "age": 0}), options);
    form.register("username", None, FieldRules::new().required("Username is required"))
        .unwrap();
    form.register(
        "age",
        None,
        FieldRules::new().min(0.0, "age must be positive"),
    )
    .unwrap();
    form
}

#[tokio::test]
async fn valid_submits_hand_over_the_values() {
    let form = signup_form(FormOptions::new());
    let _ = form.set_value("username", json!("Batman"), SetValueOptions::all());

    let received = Arc::new(Mutex::new(None::<Value>));
    let sink = Arc::clone(&received);
    let outcome = form
        .submit(
            move |values| async move {
                *sink.lock().unwrap() = Some(values);
                Ok(())
            },
            |_| panic!("form is valid"),
        )
        .await;

    assert!(outcome.is_submitted());
    assert_eq!(
        received.lock().unwrap().clone(),
        Some(json!({"username": "Batman", "age": 0}))
    );
    let snapshot = form.snapshot();
    assert_eq!(snapshot.phase, FormPhase::SubmitSuccess);
    assert!(snapshot.is_submitted);
    assert!(snapshot.is_submit_successful);
    assert!(!snapshot.is_submitting);
    assert_eq!(snapshot.submit_count, 1);
}

#[tokio::test]
async fn invalid_submits_report_every_error() {
    let form = signup_form(FormOptions::new());
    let _ = form.set_value("age", json!(-3), SetValueOptions::new().dirty());

    let reported = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reported);
    let outcome = form
        .submit(
            |_| async { Err(anyhow::anyhow!("handler must not run")) },
            move |errors| counter.store(errors.len(), Ordering::SeqCst),
        )
        .await;

    let SubmitOutcome::Invalid(errors) = outcome else {
        panic!("expected an invalid submit, got {outcome:?}");
    };
    assert_eq!(reported.load(Ordering::SeqCst), 2);
    assert_eq!(errors["username"].kind, ErrorKind::RequiredMissing);
    assert_eq!(errors["age"].message, "age must be positive");

    let snapshot = form.snapshot();
    assert_eq!(snapshot.phase, FormPhase::Invalid);
    assert!(snapshot.is_submitted);
    assert!(!snapshot.is_submit_successful);
    assert_eq!(snapshot.submit_count, 1);
}

#[tokio::test]
async fn a_second_submit_while_one_runs_is_blocked() {
    let form = signup_form(FormOptions::new());
    let _ = form.set_value("username", json!("Batman"), SetValueOptions::new());

    let calls = Arc::new(AtomicUsize::new(0));
    let (release, wait) = oneshot::channel::<()>();
    let first_calls = Arc::clone(&calls);
    let mut first = Box::pin(form.submit(
        move |_| async move {
            first_calls.fetch_add(1, Ordering::SeqCst);
            wait.await.map_err(anyhow::Error::from)
        },
        |_| {},
    ));
    assert!(futures::poll!(&mut first).is_pending());
    assert!(form.snapshot().is_submitting);
    assert_eq!(form.phase(), FormPhase::Submitting);

    let second_calls = Arc::clone(&calls);
    let second = form
        .submit(
            move |_| async move {
                second_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            |_| {},
        )
        .await;
    assert!(second.is_blocked());

    // Edits while submitting leave the phase alone.
    let _ = form.set_value("age", json!(3), SetValueOptions::new());
    assert_eq!(form.phase(), FormPhase::Submitting);

    release.send(()).unwrap();
    assert!(first.await.is_submitted());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(form.snapshot().submit_count, 1);
}

#[tokio::test]
async fn failing_handlers_end_in_submit_failure() {
    let form = signup_form(FormOptions::new());
    let _ = form.set_value("username", json!("Batman"), SetValueOptions::new());

    let outcome = form
        .submit(|_| async { Err(anyhow::anyhow!("backend unavailable")) }, |_| {})
        .await;
    let SubmitOutcome::HandlerFailed(err) = outcome else {
        panic!("expected a handler failure, got {outcome:?}");
    };
    assert_eq!(err.to_string(), "backend unavailable");

    let snapshot = form.snapshot();
    assert_eq!(snapshot.phase, FormPhase::SubmitFailure);
    assert!(snapshot.is_submitted);
    assert!(!snapshot.is_submit_successful);

    // The form can be submitted again afterwards.
    assert!(form.submit(|_| async { Ok(()) }, |_| {}).await.is_submitted());
    assert_eq!(form.snapshot().submit_count, 2);
}

#[tokio::test]
async fn reset_after_success_restores_defaults_and_keeps_the_count() {
    let form = signup_form(FormOptions::new());
    let _ = form.set_value("username", json!("Batman"), SetValueOptions::all());
    assert!(form.submit(|_| async { Ok(()) }, |_| {}).await.is_submitted());

    form.reset();
    let snapshot = form.snapshot();
    assert_eq!(snapshot.phase, FormPhase::Pristine);
    assert_eq!(snapshot.values, json!({"username": "", "age": 0}));
    assert!(!snapshot.is_dirty);
    assert!(snapshot.touched.is_empty());
    assert!(snapshot.dirty_fields.is_empty());
    assert!(!snapshot.is_submitted);
    assert_eq!(snapshot.submit_count, 1);
}

#[tokio::test]
async fn reset_on_submit_success_resets_implicitly() {
    let form = signup_form(FormOptions::new().with_reset_on_submit_success(true));
    let _ = form.set_value("username", json!("Batman"), SetValueOptions::all());
    assert!(form.submit(|_| async { Ok(()) }, |_| {}).await.is_submitted());

    let snapshot = form.snapshot();
    assert_eq!(snapshot.phase, FormPhase::Pristine);
    assert_eq!(snapshot.values["username"], json!(""));
    assert!(snapshot.touched.is_empty());
    assert_eq!(snapshot.submit_count, 1);
}

#[tokio::test]
async fn submits_polled_together_run_the_handler_once() {
    let form = signup_form(FormOptions::new());
    let _ = form.set_value("username", json!("Batman"), SetValueOptions::new());

    let calls = Arc::new(AtomicUsize::new(0));
    let (first_calls, second_calls) = (Arc::clone(&calls), Arc::clone(&calls));
    let (first, second) = futures::join!(
        form.submit(
            move |_| async move {
                first_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            |_| {},
        ),
        form.submit(
            move |_| async move {
                second_calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            |_| {},
        ),
    );

    assert!(first.is_submitted());
    assert!(second.is_blocked());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(form.snapshot().submit_count, 1);
}

#[tokio::test]
async fn a_dropped_submit_gives_the_form_back() {
    let form = signup_form(FormOptions::new());
    let _ = form.set_value("username", json!("Batman"), SetValueOptions::new());
    assert_eq!(form.phase(), FormPhase::Editing);

    let calls = Arc::new(AtomicUsize::new(0));
    let started = Arc::clone(&calls);
    let mut stuck = Box::pin(form.submit(
        move |_| {
            started.fetch_add(1, Ordering::SeqCst);
            futures::future::pending::<anyhow::Result<()>>()
        },
        |_| {},
    ));
    assert!(futures::poll!(&mut stuck).is_pending());
    assert!(futures::poll!(&mut stuck).is_pending());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(form.phase(), FormPhase::Submitting);

    let mut updates = form.subscribe(Selector::State);
    drop(stuck);
    assert_eq!(form.phase(), FormPhase::Editing);
    assert!(updates.try_recv().is_some());
    let snapshot = form.snapshot();
    assert!(!snapshot.is_submitting);
    assert_eq!(snapshot.submit_count, 0);

    assert!(form.submit(|_| async { Ok(()) }, |_| {}).await.is_submitted());
    assert_eq!(form.snapshot().submit_count, 1);
}

#[tokio::test]
async fn a_panicking_validator_fails_the_submit_without_escaping() {
    let form = FormEngine::new(json!({"age": 0}));
    form.register(
        "age",
        None,
        FieldRules::new().validate("nonZero", |value, _| {
            assert_ne!(value.as_i64(), Some(0), "validator bug");
            Ok(())
        }),
    )
    .unwrap();
    let mut updates = form.subscribe(Selector::All);

    let outcome = form
        .submit(|_| async { Err(anyhow::anyhow!("handler must not run")) }, |_| {})
        .await;
    let SubmitOutcome::Invalid(errors) = outcome else {
        panic!("expected an invalid submit, got {outcome:?}");
    };
    assert_eq!(errors["age"].kind, ErrorKind::AsyncValidatorThrew);
    assert_eq!(errors["age"].rule.as_deref(), Some("nonZero"));

    let snapshot = form.snapshot();
    assert_eq!(snapshot.phase, FormPhase::Invalid);
    assert!(!snapshot.is_validating);
    assert!(updates.try_recv().is_some());

    // Nothing is left held or stuck.
    while updates.try_recv().is_some() {}
    let _ = form.set_value("age", json!(7), SetValueOptions::all());
    assert!(updates.try_recv().is_some());
    assert!(form.submit(|_| async { Ok(()) }, |_| {}).await.is_submitted());
}
