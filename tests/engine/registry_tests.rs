use formwork::prelude::*;
use formwork::{FormError, Selector};
use serde_json::json;

fn batman_form() -> FormEngine {
    let form = FormEngine::new(json!({"username": "Batman", "age": 0}));
    form.register("username", None, FieldRules::new().required("Username is required"))
        .unwrap();
    form.register(
        "age",
        None,
        FieldRules::new().validate("positive", |value, _| match value.as_i64() {
            Some(age) if age < 0 => Err("age must be positive".into()),
            _ => Ok(()),
        }),
    )
    .unwrap();
    form
}

#[tokio::test]
async fn negative_age_is_invalid_until_corrected() {
    let form = batman_form();

    let error = form
        .set_value("age", json!(-1), SetValueOptions::all())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(error.kind, ErrorKind::RuleViolation);
    assert_eq!(error.rule.as_deref(), Some("positive"));
    assert!(!form.snapshot().is_valid);
    assert_eq!(form.phase(), FormPhase::Invalid);

    form.set_value("age", json!(5), SetValueOptions::new().dirty())
        .unwrap()
        .await;
    assert!(form.validate_all().await);
    let snapshot = form.snapshot();
    assert!(snapshot.is_valid);
    assert!(snapshot.errors.is_empty());
    assert_eq!(snapshot.phase, FormPhase::Valid);
    assert_eq!(snapshot.values, json!({"username": "Batman", "age": 5}));
}

#[tokio::test]
async fn required_fails_again_once_cleared() {
    let form = FormEngine::new(json!({}));
    form.register("email", Some(json!("")), FieldRules::new().required("Email is required"))
        .unwrap();

    let filled = form
        .set_value("email", json!("bruce@wayne.com"), SetValueOptions::all())
        .unwrap()
        .await;
    assert!(filled.is_none());

    let cleared = form
        .set_value("email", json!(""), SetValueOptions::all())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(cleared.kind, ErrorKind::RequiredMissing);
    assert_eq!(cleared.message, "Email is required");
}

#[test]
fn set_value_updates_flags_only_when_asked() {
    let form = batman_form();
    let _ = form.set_value("username", json!("Robin"), SetValueOptions::new());
    let state = form.field_state("username").unwrap();
    assert_eq!(state.value, json!("Robin"));
    assert!(!state.dirty);
    assert!(!state.touched);
    assert!(form.snapshot().is_dirty);

    let _ = form.set_value("username", json!("Batman"), SetValueOptions::new().dirty().touch());
    let state = form.field_state("username").unwrap();
    assert!(!state.dirty);
    assert!(state.touched);
    assert!(!form.snapshot().is_dirty);
}

#[test]
fn unknown_and_malformed_paths_are_reported() {
    let form = batman_form();
    assert!(matches!(
        form.set_value("nickname", json!("x"), SetValueOptions::new()),
        Err(FormError::UnknownFieldPath { .. })
    ));
    assert!(matches!(
        form.set_value("social..twitter", json!("x"), SetValueOptions::new()),
        Err(FormError::InvalidPath { .. })
    ));
    assert!(matches!(form.blur("nickname"), Err(FormError::UnknownFieldPath { .. })));
    assert!(matches!(
        form.validate_field("nickname"),
        Err(FormError::UnknownFieldPath { .. })
    ));
    assert!(form.unregister("nickname").is_err());
}

#[test]
fn nested_registration_seeds_defaults_and_ancestor_writes() {
    let form = FormEngine::new(json!({"username": "Batman"}));
    form.register("social.twitter", Some(json!("")), FieldRules::new())
        .unwrap();
    form.register("social.facebook", Some(json!("")), FieldRules::new())
        .unwrap();
    assert!(!form.snapshot().is_dirty);

    let _ = form.set_value(
        "social",
        json!({"twitter": "@batman", "facebook": ""}),
        SetValueOptions::new().dirty(),
    );
    assert_eq!(form.get_value("social.twitter").unwrap(), Some(json!("@batman")));
    assert_eq!(form.snapshot().dirty_fields, vec!["social.twitter".to_string()]);

    // Re-registering keeps the current value.
    form.register("social.twitter", Some(json!("ignored")), FieldRules::new())
        .unwrap();
    assert_eq!(form.get_value("social.twitter").unwrap(), Some(json!("@batman")));
}

#[test]
fn unregister_keeps_or_drops_the_value() {
    let form = batman_form();
    form.unregister("age").unwrap();
    assert!(!form.is_registered("age"));
    assert_eq!(form.values()["age"], json!(0));

    let dropping = FormEngine::with_options(
        json!({"username": "Batman", "age": 0}),
        FormOptions::new().with_should_unregister(true),
    );
    dropping.register("age", None, FieldRules::new()).unwrap();
    dropping.unregister("age").unwrap();
    assert_eq!(dropping.values(), json!({"username": "Batman"}));
}

#[test]
fn manual_errors_mark_the_form_invalid() {
    let form = batman_form();
    form.set_error("username", "taken on the server").unwrap();
    let errors = form.errors();
    assert_eq!(errors["username"].kind, ErrorKind::Manual);
    assert!(!form.snapshot().is_valid);

    form.clear_errors(Some("username")).unwrap();
    assert!(form.errors().is_empty());

    form.set_error("age", "nope").unwrap();
    form.clear_errors(None).unwrap();
    assert!(form.snapshot().is_valid);
    assert!(form.set_error("nickname", "x").is_err());
}

#[tokio::test]
async fn reset_with_values_commits_new_defaults() {
    let form = batman_form();
    form.set_value("age", json!(-1), SetValueOptions::all())
        .unwrap()
        .await;
    form.reset_with(Some(json!({"username": "Bruce", "age": 40})), ResetOptions::new());

    let snapshot = form.snapshot();
    assert_eq!(snapshot.phase, FormPhase::Pristine);
    assert_eq!(snapshot.values, json!({"username": "Bruce", "age": 40}));
    assert!(!snapshot.is_dirty);
    assert!(snapshot.errors.is_empty());
    assert!(snapshot.touched.is_empty());

    // keep_default_values leaves the committed defaults alone.
    form.reset_with(
        Some(json!({"username": "Alfred", "age": 70})),
        ResetOptions::new().keep_default_values(),
    );
    assert!(form.snapshot().is_dirty);
    form.reset();
    assert_eq!(form.values(), json!({"username": "Batman", "age": 0}));
}

#[test]
fn clones_share_state() {
    let form = batman_form();
    let other = form.clone();
    let _ = other.set_value("username", json!("Robin"), SetValueOptions::new());
    assert_eq!(form.get_value("username").unwrap(), Some(json!("Robin")));
    let _subscription = form.subscribe(Selector::All);
}
