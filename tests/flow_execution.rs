// End-to-end execution tests driving `FlowExecutor::run_flow` against whole
// flow documents: dependency-ordered execution, condition branch selection,
// For-Each accumulation, and input type enforcement.

use std::collections::HashMap;
use std::sync::Arc;

use flowrt::collaborators::Collaborators;
use flowrt::executor::{FlowExecutor, NoopHooks};
use flowrt::{Flow, FlowError};
use serde_json::{json, Value};

fn executor() -> FlowExecutor {
    FlowExecutor::new(4, Collaborators::noop(), Arc::new(NoopHooks))
}

fn inputs(pairs: Vec<(&str, Value)>) -> HashMap<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[tokio::test]
async fn conditional_scoring_selects_excellent_branch() {
    let flow = Flow::from_json(&json!({
        "name": "conditional-scoring",
        "version": "1.0.0",
        "description": "",
        "variables": [
            {"id": "user_score", "type": "number"},
            {"id": "result", "type": "string", "default": ""}
        ],
        "input": ["user_score"],
        "output": ["result"],
        "nodes": [
            {
                "id": "grade",
                "type": "CONDITION",
                "name": "grade",
                "input": {"switch_value": "{{user_score}}"},
                "branches": {
                    "excellent": {
                        "condition": "greater_than", "value": 90,
                        "nodes": [
                            {"id": "setExcellent", "type": "UPDATE_VARIABLE",
                             "config": {"variable_id": "result", "type": "update"},
                             "value": "Excellent"}
                        ]
                    },
                    "good": {
                        "condition": "greater_than", "value": 70,
                        "nodes": [
                            {"id": "setGood", "type": "UPDATE_VARIABLE",
                             "config": {"variable_id": "result", "type": "update"},
                             "value": "Good"}
                        ]
                    },
                    "default": {
                        "nodes": [
                            {"id": "setDefault", "type": "UPDATE_VARIABLE",
                             "config": {"variable_id": "result", "type": "update"},
                             "value": "Try harder"}
                        ]
                    }
                }
            }
        ]
    }))
    .expect("flow parses");

    let result = executor()
        .run_flow(&flow, inputs(vec![("user_score", json!(95))]))
        .await
        .expect("flow runs");

    assert!(result.success);
    assert_eq!(result.outputs.get("result"), Some(&json!("Excellent")));
}

#[tokio::test]
async fn conditional_scoring_falls_back_to_default_branch() {
    let flow = Flow::from_json(&json!({
        "name": "conditional-scoring",
        "version": "1.0.0",
        "description": "",
        "variables": [
            {"id": "user_score", "type": "number"},
            {"id": "result", "type": "string", "default": ""}
        ],
        "input": ["user_score"],
        "output": ["result"],
        "nodes": [
            {
                "id": "grade",
                "type": "CONDITION",
                "name": "grade",
                "input": {"switch_value": "{{user_score}}"},
                "branches": {
                    "excellent": {
                        "condition": "greater_than", "value": 90,
                        "nodes": [
                            {"id": "setExcellent", "type": "UPDATE_VARIABLE",
                             "config": {"variable_id": "result", "type": "update"},
                             "value": "Excellent"}
                        ]
                    },
                    "default": {
                        "nodes": [
                            {"id": "setDefault", "type": "UPDATE_VARIABLE",
                             "config": {"variable_id": "result", "type": "update"},
                             "value": "Try harder"}
                        ]
                    }
                }
            }
        ]
    }))
    .expect("flow parses");

    let result = executor()
        .run_flow(&flow, inputs(vec![("user_score", json!(40))]))
        .await
        .expect("flow runs");

    assert_eq!(result.outputs.get("result"), Some(&json!("Try harder")));
}

#[tokio::test]
async fn for_each_join_builds_comma_separated_accumulator() {
    let flow = Flow::from_json(&json!({
        "name": "for-each-summation",
        "version": "1.0.0",
        "description": "",
        "variables": [
            {"id": "items", "type": "array"},
            {"id": "out", "type": "string", "default": ""}
        ],
        "input": ["items"],
        "output": ["out"],
        "nodes": [
            {
                "id": "loop1",
                "type": "FOR_EACH",
                "name": "loop",
                "config": {"each_key": "current"},
                "input": {"items": "{{items}}"},
                "each_nodes": [
                    {"id": "appendNode", "type": "UPDATE_VARIABLE",
                     "config": {"variable_id": "out", "type": "join", "join_str": ","},
                     "value": "N={{current}}"}
                ]
            }
        ]
    }))
    .expect("flow parses");

    let result = executor()
        .run_flow(&flow, inputs(vec![("items", json!([1, 2, 3, 4, 5]))]))
        .await
        .expect("flow runs");

    assert_eq!(result.outputs.get("out"), Some(&json!("N=1,N=2,N=3,N=4,N=5")));
}

#[tokio::test]
async fn for_each_append_grows_accumulator_by_exactly_n_items() {
    let flow = Flow::from_json(&json!({
        "name": "for-each-append",
        "version": "1.0.0",
        "description": "",
        "variables": [
            {"id": "items", "type": "array"},
            {"id": "acc", "type": "array", "default": []}
        ],
        "input": ["items"],
        "output": ["acc"],
        "nodes": [
            {
                "id": "loop1",
                "type": "FOR_EACH",
                "name": "loop",
                "config": {"each_key": "current"},
                "input": {"items": "{{items}}"},
                "each_nodes": [
                    {"id": "appendNode", "type": "UPDATE_VARIABLE",
                     "config": {"variable_id": "acc", "type": "append", "stringify_output": false},
                     "value": "{{current}}"}
                ]
            }
        ]
    }))
    .expect("flow parses");

    let result = executor()
        .run_flow(&flow, inputs(vec![("items", json!([10, 20, 30]))]))
        .await
        .expect("flow runs");

    let acc = result.outputs.get("acc").expect("acc output present").as_array().unwrap();
    assert_eq!(acc.len(), 3);
    assert_eq!(acc, &vec![json!(10), json!(20), json!(30)]);
}

#[tokio::test]
async fn execution_honors_dependency_order_despite_declaration_order() {
    // `a` is declared first but references `b`'s output, so the validator's
    // topological sort must run `b` before `a` even though `a` appears
    // earlier in the node list.
    let flow = Flow::from_json(&json!({
        "name": "forward-reference",
        "version": "1.0.0",
        "description": "",
        "variables": [{"id": "x", "type": "number", "default": 0}],
        "input": [],
        "output": ["x"],
        "nodes": [
            {"id": "a", "type": "UPDATE_VARIABLE",
             "config": {"variable_id": "x", "type": "update"},
             "value": "{{b.output.new_value}}"},
            {"id": "b", "type": "UPDATE_VARIABLE",
             "config": {"variable_id": "x", "type": "update"},
             "value": 41}
        ]
    }))
    .expect("flow parses");

    let result = executor()
        .run_flow(&flow, HashMap::new())
        .await
        .expect("flow runs");

    assert_eq!(result.outputs.get("x"), Some(&json!(41)));
}

#[tokio::test]
async fn declared_output_completeness_reflects_final_registry_state() {
    let flow = Flow::from_json(&json!({
        "name": "output-completeness",
        "version": "1.0.0",
        "description": "",
        "variables": [
            {"id": "a", "type": "number", "default": 1},
            {"id": "b", "type": "number", "default": 2}
        ],
        "input": [],
        "output": ["a", "b"],
        "nodes": [
            {"id": "bump", "type": "UPDATE_VARIABLE",
             "config": {"variable_id": "a", "type": "update"},
             "value": 100}
        ]
    }))
    .expect("flow parses");

    let result = executor()
        .run_flow(&flow, HashMap::new())
        .await
        .expect("flow runs");

    assert_eq!(result.outputs.get("a"), Some(&json!(100)));
    assert_eq!(result.outputs.get("b"), Some(&json!(2)));
}

#[tokio::test]
async fn typed_input_mismatch_fails_before_any_node_runs() {
    let flow = Flow::from_json(&json!({
        "name": "type-enforcement",
        "version": "1.0.0",
        "description": "",
        "variables": [{"id": "n", "type": "number"}],
        "input": ["n"],
        "output": ["n"],
        "nodes": [
            {"id": "noop", "type": "UPDATE_VARIABLE",
             "config": {"variable_id": "n", "type": "update"},
             "value": "{{n}}"}
        ]
    }))
    .expect("flow parses");

    let err = executor()
        .run_flow(&flow, inputs(vec![("n", json!("42"))]))
        .await
        .expect_err("string input for a number-typed variable must be rejected");

    assert!(matches!(err, FlowError::Type { ref variable_id, .. } if variable_id.as_str() == "n"));
}
