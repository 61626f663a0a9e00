use formwork::prelude::*;
use formwork::{JsonSchemaAdapter, SchemaReport};
use serde_json::{Value, json};

fn schema_form() -> FormEngine {
    let adapter = JsonSchemaAdapter::new(&json!({
        "type": "object",
        "required": ["channel"],
        "properties": {
            "age": { "type": "integer", "minimum": 0 },
            "social": {
                "type": "object",
                "properties": { "twitter": { "type": "string", "minLength": 2 } }
            }
        }
    }))
    .unwrap();
    let form = FormEngine::with_options(
        json!({"age": -1, "social": {"twitter": "x"}}),
        FormOptions::new().with_resolver(adapter),
    );
    form.register("age", None, FieldRules::new()).unwrap();
    form.register("social", None, FieldRules::new()).unwrap();
    form
}

#[tokio::test]
async fn schema_errors_land_on_the_nearest_registered_field() {
    let form = schema_form();
    assert!(!form.validate_all().await);

    let errors = form.errors();
    assert_eq!(errors.len(), 3);
    assert_eq!(errors["age"].kind, ErrorKind::RuleViolation);
    assert_eq!(errors["age"].rule.as_deref(), Some("schema"));
    // `social.twitter` has no node of its own.
    assert!(errors.contains_key("social"));
    // Nothing is registered at or above `channel`.
    assert!(errors.contains_key("channel"));
    assert_eq!(form.phase(), FormPhase::Invalid);
}

#[tokio::test]
async fn single_field_passes_leave_other_errors_alone() {
    let form = schema_form();
    assert!(!form.validate_all().await);

    let fixed = form
        .set_value("age", json!(30), SetValueOptions::all())
        .unwrap()
        .await;
    assert!(fixed.is_none());
    let errors = form.errors();
    assert!(!errors.contains_key("age"));
    assert!(errors.contains_key("social"));
    assert!(errors.contains_key("channel"));

    let _ = form
        .set_value("social", json!({"twitter": "@bruce"}), SetValueOptions::all())
        .unwrap()
        .await;
    assert!(!form.errors().contains_key("social"));
}

#[tokio::test]
async fn resolvers_replace_field_rules() {
    let adapter = |values: &Value| match values["age"].as_i64() {
        Some(age) if age < 18 => SchemaReport::default().with_error("age", "too young"),
        _ => SchemaReport::valid(),
    };
    let form = FormEngine::with_options(
        json!({"age": 21, "nickname": ""}),
        FormOptions::new().with_resolver(adapter),
    );
    form.register("age", None, FieldRules::new()).unwrap();
    // Field rules are not consulted while a resolver is configured.
    form.register("nickname", None, FieldRules::new().required("Nickname is required"))
        .unwrap();

    assert!(form.validate_all().await);
    let error = form
        .validate_field("age")
        .unwrap()
        .await;
    assert!(error.is_none());

    let error = form
        .set_value("age", json!(12), SetValueOptions::all())
        .unwrap()
        .await
        .unwrap();
    assert_eq!(error.message, "too young");
    assert!(!form.snapshot().is_validating);
    assert!(!form.snapshot().is_valid);
}
