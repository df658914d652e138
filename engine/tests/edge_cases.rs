//! Edge case tests for stitch-engine
//!
//! These tests cover boundary conditions and unusual inputs.

use serde_json::json;
use stitch_engine::{
    compute_diff, ChildRecord, OperationContext, ProjectionRules, ProposedItem, RelationConfig,
    WriteKind,
};

fn sale_relation() -> stitch_engine::RelationSchema {
    RelationConfig::new("sales", "saleItems")
        .link_field("items")
        .reverse_field("sale")
        .build()
        .unwrap()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn empty_string_fields() {
    let original = vec![ChildRecord::new("1", "s", 1, json!({"name": ""}))];
    let proposed = vec![ProposedItem::existing("1", json!({"name": ""}))];

    let diff = compute_diff(&original, &proposed, &ProjectionRules::default());
    assert!(diff.is_empty());
}

#[test]
fn unicode_payloads() {
    let names = [
        "日本語テスト",      // Japanese
        "Привет мир",        // Russian
        "مرحبا بالعالم",     // Arabic
        "🎉🚀💯",            // Emoji
        "Ω≈ç√∫",             // Math symbols
        "Hello\nWorld\tTab", // Whitespace
    ];

    for (i, name) in names.iter().enumerate() {
        let original = vec![ChildRecord::new(
            format!("c-{i}"),
            "s",
            1,
            json!({"name": name}),
        )];
        let proposed = vec![ProposedItem::existing(
            format!("c-{i}"),
            json!({"name": name}),
        )];

        let diff = compute_diff(&original, &proposed, &ProjectionRules::default());
        assert!(diff.is_empty(), "spurious diff for: {}", name);
    }
}

// ============================================================================
// Payload Shape Edge Cases
// ============================================================================

#[test]
fn null_field_differs_from_absent_field() {
    // Deep equality distinguishes {"a": null} from {}; an explicit null is
    // a real change.
    let original = vec![ChildRecord::new("1", "s", 1, json!({"qty": 2}))];
    let proposed = vec![ProposedItem::existing("1", json!({"qty": 2, "note": null}))];

    let diff = compute_diff(&original, &proposed, &ProjectionRules::default());
    assert_eq!(diff.to_update.len(), 1);
}

#[test]
fn nested_payloads_compared_deeply() {
    let original = vec![ChildRecord::new(
        "1",
        "s",
        1,
        json!({"spec": {"color": "red", "sizes": [1, 2]}}),
    )];

    let same = vec![ProposedItem::existing(
        "1",
        json!({"spec": {"color": "red", "sizes": [1, 2]}}),
    )];
    assert!(compute_diff(&original, &same, &ProjectionRules::default()).is_empty());

    let changed = vec![ProposedItem::existing(
        "1",
        json!({"spec": {"color": "red", "sizes": [1, 3]}}),
    )];
    let diff = compute_diff(&original, &changed, &ProjectionRules::default());
    assert_eq!(diff.to_update.len(), 1);
}

#[test]
fn empty_payload_objects() {
    let original = vec![ChildRecord::new("1", "s", 1, json!({}))];
    let proposed = vec![ProposedItem::existing("1", json!({}))];

    let diff = compute_diff(&original, &proposed, &ProjectionRules::default());
    assert!(diff.is_empty());
}

// ============================================================================
// Scale
// ============================================================================

#[test]
fn large_list_order_stays_dense() {
    let original: Vec<ChildRecord> = (0u32..500)
        .map(|i| ChildRecord::new(format!("c-{i}"), "s", i + 1, json!({"n": i})))
        .collect();

    // Reverse the whole list and append a new tail item.
    let mut proposed: Vec<ProposedItem> = original
        .iter()
        .rev()
        .map(|r| ProposedItem::existing(r.id.clone(), r.payload.clone()))
        .collect();
    proposed.push(ProposedItem::new(json!({"n": -1})));

    let diff = compute_diff(&original, &proposed, &ProjectionRules::default());

    let mut orders: Vec<u32> = Vec::new();
    orders.extend(diff.to_update.iter().map(|w| w.order));
    orders.extend(diff.unchanged.iter().map(|r| r.order));
    orders.extend(diff.to_create.iter().map(|c| c.order));
    orders.sort_unstable();

    assert_eq!(orders, (1..=501).collect::<Vec<u32>>());
    assert!(diff.to_delete.is_empty());
}

// ============================================================================
// Relation-level projection
// ============================================================================

#[test]
fn write_payload_never_leaks_server_managed_fields() {
    let relation = sale_relation();
    let data = relation.write_payload(
        &json!({
            "id": "forged",
            "createdAt": 1,
            "updatedAt": 2,
            "sku": "apple"
        }),
        1,
        &"sale-1".to_string(),
    );

    assert_eq!(data, json!({"sku": "apple", "order": 1, "sale": "sale-1"}));
}

// ============================================================================
// Guard interplay
// ============================================================================

#[test]
fn guard_survives_interleaved_kinds() {
    let ctx = OperationContext::new();
    ctx.observe_before_write(WriteKind::Create, Some(vec![ProposedItem::new(json!({}))]));

    // An update-kind post hook must not consume a create-kind request.
    assert!(!ctx.should_reconcile(WriteKind::Update));
    assert!(ctx.should_reconcile(WriteKind::Create));

    ctx.take_snapshot();
    ctx.mark_reconciled(WriteKind::Create);
    ctx.mark_link_finished(WriteKind::Create);

    // Once finished, neither kind re-arms.
    assert!(!ctx.should_reconcile(WriteKind::Create));
    assert!(!ctx.should_reconcile(WriteKind::Update));
}
