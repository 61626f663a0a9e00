use formwork::prelude::*;
use formwork::{FormError, StableId};
use serde_json::json;

use crate::support::Gate;

fn phone_form() -> FormEngine {
    FormEngine::new(json!({
        "phNumbers": [{"number": "111"}, {"number": "222"}, {"number": "333"}]
    }))
}

fn number_rules() -> ItemRules {
    ItemRules::new().field("number", FieldRules::new().required("Number is required"))
}

#[test]
fn binding_seeds_existing_entries() {
    let form = phone_form();
    let numbers = form.field_array("phNumbers", number_rules()).unwrap();
    assert_eq!(numbers.len().unwrap(), 3);
    assert!(form.is_registered("phNumbers.2.number"));

    let keys = numbers.keys().unwrap();
    assert_eq!(keys.len(), 3);
    assert_ne!(keys[0], keys[1]);

    // Binding again hands out the same controller state.
    let again = form.field_array("phNumbers", number_rules()).unwrap();
    assert_eq!(again.keys().unwrap(), keys);
}

#[test]
fn missing_arrays_are_created_and_scalars_rejected() {
    let form = FormEngine::new(json!({"username": "Batman"}));
    let tags = form.field_array("tags", ItemRules::new()).unwrap();
    assert!(tags.is_empty().unwrap());
    assert_eq!(form.values()["tags"], json!([]));
    assert!(!form.snapshot().is_dirty);

    assert!(matches!(
        form.field_array("username", ItemRules::new()),
        Err(FormError::NotAnArray { .. })
    ));
}

#[tokio::test]
async fn insertions_and_removals_keep_identities() {
    let form = phone_form();
    let numbers = form.field_array("phNumbers", number_rules()).unwrap();
    let before = numbers.keys().unwrap();

    let appended = numbers.append(json!({"number": ""})).unwrap();
    let prepended = numbers.prepend(json!({"number": "000"})).unwrap();
    let keys = numbers.keys().unwrap();
    assert_eq!(keys.first(), Some(&prepended));
    assert_eq!(keys.last(), Some(&appended));
    assert_eq!(&keys[1..4], before.as_slice());
    assert!(form.snapshot().is_dirty);

    // The appended entry sits at index 4 and is empty.
    let error = form
        .validate_field("phNumbers.4.number")
        .unwrap()
        .await
        .unwrap();
    assert_eq!(error.kind, ErrorKind::RequiredMissing);

    assert_eq!(numbers.remove(0).unwrap(), json!({"number": "000"}));
    assert_eq!(numbers.keys().unwrap()[..3], before[..]);
    // The error followed its entry to the new position.
    assert!(form.errors().contains_key("phNumbers.3.number"));
    assert!(!form.is_registered("phNumbers.4.number"));

    numbers.remove(3).unwrap();
    assert!(form.errors().is_empty());
    assert_eq!(numbers.keys().unwrap(), before);
    assert!(!form.snapshot().is_dirty);
}

#[tokio::test]
async fn move_and_swap_carry_values_and_nodes() {
    let form = phone_form();
    let numbers = form.field_array("phNumbers", number_rules()).unwrap();
    let keys = numbers.keys().unwrap();

    form.set_error("phNumbers.0.number", "flagged").unwrap();
    numbers.move_entry(0, 2).unwrap();
    let entries = numbers.entries().unwrap();
    let order: Vec<StableId> = entries.iter().map(|entry| entry.key).collect();
    assert_eq!(order, vec![keys[1], keys[2], keys[0]]);
    assert_eq!(entries[2].value, json!({"number": "111"}));
    assert!(form.errors().contains_key("phNumbers.2.number"));

    numbers.swap(0, 2).unwrap();
    assert_eq!(
        form.get_value("phNumbers").unwrap(),
        Some(json!([{"number": "111"}, {"number": "333"}, {"number": "222"}]))
    );
    assert_eq!(numbers.keys().unwrap(), vec![keys[0], keys[2], keys[1]]);
    assert!(form.errors().contains_key("phNumbers.0.number"));
}

#[test]
fn out_of_range_indexes_are_rejected() {
    let form = phone_form();
    let numbers = form.field_array("phNumbers", number_rules()).unwrap();
    assert!(matches!(
        numbers.remove(3),
        Err(FormError::IndexOutOfRange { index: 3, len: 3, .. })
    ));
    assert!(numbers.move_entry(0, 5).is_err());
    assert!(numbers.swap(7, 0).is_err());
    assert!(numbers.insert(5, json!({})).is_err());
    assert!(numbers.insert(3, json!({"number": "444"})).is_ok());
}

#[tokio::test]
async fn removing_an_entry_before_its_validation_resolves_leaves_no_trace() {
    let gate = Gate::new();
    let form = phone_form();
    let numbers = form
        .field_array(
            "phNumbers",
            ItemRules::new().field("number", gate.rules("reachable")),
        )
        .unwrap();
    let before = form.values();

    numbers.append(json!({"number": "999"})).unwrap();
    let run = tokio::spawn(form.validate_field("phNumbers.3.number").unwrap());
    gate.wait_for(1).await;
    assert!(form.snapshot().is_validating);

    numbers.remove(3).unwrap();
    assert!(!form.snapshot().is_validating);

    gate.resolve(0, Err("unreachable".into()));
    run.await.unwrap();

    let snapshot = form.snapshot();
    assert_eq!(snapshot.values, before);
    assert!(snapshot.errors.is_empty());
    assert!(!snapshot.is_validating);
    assert_eq!(numbers.len().unwrap(), 3);
}

#[tokio::test]
async fn pending_results_follow_a_moved_entry() {
    let gate = Gate::new();
    let form = phone_form();
    let numbers = form
        .field_array(
            "phNumbers",
            ItemRules::new().field("number", gate.rules("reachable")),
        )
        .unwrap();

    let run = tokio::spawn(form.validate_field("phNumbers.0.number").unwrap());
    gate.wait_for(1).await;
    numbers.move_entry(0, 1).unwrap();

    gate.resolve(0, Err("unreachable".into()));
    run.await.unwrap();
    let errors = form.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors["phNumbers.1.number"].message, "unreachable");
}

#[test]
fn scalar_entries_get_a_single_node() {
    let form = FormEngine::new(json!({"tags": ["a", "b"]}));
    let tags = form
        .field_array(
            "tags",
            ItemRules::new().entry(FieldRules::new().min_length(2, "too short")),
        )
        .unwrap();
    assert!(form.is_registered("tags.0"));
    tags.append(json!("cd")).unwrap();
    assert!(form.is_registered("tags.2"));
}

#[test]
fn replacing_the_whole_array_reseeds_it() {
    let form = phone_form();
    let numbers = form.field_array("phNumbers", number_rules()).unwrap();
    let old = numbers.keys().unwrap();

    let _ = form.set_value(
        "phNumbers",
        json!([{"number": "555"}]),
        SetValueOptions::new().dirty(),
    );
    let fresh = numbers.keys().unwrap();
    assert_eq!(fresh.len(), 1);
    assert!(!old.contains(&fresh[0]));
    assert!(!form.is_registered("phNumbers.1.number"));

    form.reset();
    assert_eq!(numbers.len().unwrap(), 3);
}

#[test]
fn fixed_fields_and_dynamic_arrays_are_independent() {
    let form = FormEngine::new(json!({"phoneNumbers": ["", ""], "phNumbers": []}));
    form.register("phoneNumbers.0", None, FieldRules::new()).unwrap();
    form.register("phoneNumbers.1", None, FieldRules::new()).unwrap();
    let numbers = form.field_array("phNumbers", number_rules()).unwrap();
    numbers.append(json!({"number": "1"})).unwrap();
    assert_eq!(form.values()["phoneNumbers"], json!(["", ""]));
    assert!(form.is_registered("phoneNumbers.1"));
}
