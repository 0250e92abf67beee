//! End-to-end pipeline tests.
//!
//! Tests verify the full pipeline: workspace JSON → environment → inference →
//! lowering → emitted text, source map and diagnostics.

use brick_codegen::{find_block_id, Span};
use brick_compiler::{
    compile, compile_json, compile_to_result, source_hash, CompileOptions, CompileResult, Error,
    StdCallTable,
};
use brick_types::{ApiCatalog, BlockGraph, BlockId, ErrorCode};
use serde_json::{json, Value};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

const CATALOG: &str = r#"{ "functions": [
    { "block_id": "device_show_number", "namespace": "basic", "name": "showNumber",
      "parameters": [ { "name": "value", "slot": "number", "type": "number" } ] },
    { "block_id": "device_show_string", "namespace": "basic", "name": "showString",
      "parameters": [ { "name": "text", "slot": "text", "type": "string" } ] },
    { "block_id": "device_button_event", "namespace": "input", "name": "onButtonPressed",
      "parameters": [ { "name": "button", "slot": "NAME" },
                      { "name": "body", "type": "() => void" } ] },
    { "block_id": "device_show_leds", "namespace": "basic", "name": "showLeds",
      "image_literal": 1,
      "parameters": [ { "name": "interval", "literal": 400 } ] },
    { "block_id": "device_temperature", "namespace": "input", "name": "temperature" },
    { "block_id": "device_pause", "name": "pause",
      "parameters": [ { "name": "ms", "slot": "pause", "type": "number" } ] }
] }"#;

fn compile_blocks(blocks: Value) -> CompileResult {
    let workspace = json!({ "blocks": blocks }).to_string();
    compile_json(&workspace, CATALOG, &CompileOptions::default())
        .unwrap_or_else(|e| panic!("compilation aborted: {e}"))
}

fn compile_ok(blocks: Value) -> String {
    let result = compile_blocks(blocks);
    assert!(
        result.success,
        "expected no diagnostics, got:\n{:#?}",
        result
            .diagnostics
            .errors
            .iter()
            .map(|e| format!("  [{}] {} ({})", e.code, e.message, e.block))
            .collect::<Vec<_>>()
    );
    result.source
}

fn assert_diagnostic(result: &CompileResult, code: ErrorCode, block: &str) {
    assert!(
        result
            .diagnostics
            .errors
            .iter()
            .any(|e| e.code == code && e.block.as_str() == block),
        "expected {code} on block {block}, got: {:?}",
        result
            .diagnostics
            .errors
            .iter()
            .map(|e| format!("{} {} ({})", e.code, e.message, e.block))
            .collect::<Vec<_>>()
    );
}

fn number(id: &str, n: &str) -> Value {
    json!({ "id": id, "type": "math_number", "fields": { "NUM": n } })
}

fn text(id: &str, s: &str) -> Value {
    json!({ "id": id, "type": "text", "fields": { "TEXT": s } })
}

fn get(id: &str, var: &str) -> Value {
    json!({ "id": id, "type": "variables_get", "fields": { "VAR": var } })
}

fn set(id: &str, var: &str, value: &str, next: Option<&str>) -> Value {
    json!({ "id": id, "type": "variables_set", "fields": { "VAR": var },
            "inputs": [ { "name": "VALUE", "block": value } ], "next": next })
}

fn arith(id: &str, op: &str, a: &str, b: &str) -> Value {
    json!({ "id": id, "type": "math_arithmetic", "fields": { "OP": op },
            "inputs": [ { "name": "A", "block": a }, { "name": "B", "block": b } ] })
}

fn show_number(id: &str, value: &str, next: Option<&str>) -> Value {
    json!({ "id": id, "type": "device_show_number",
            "inputs": [ { "name": "number", "check": "Number", "block": value } ],
            "next": next })
}

fn controls_for(id: &str, var: &str, from: &str, to: &str, by: &str, body: Option<&str>) -> Value {
    json!({ "id": id, "type": "controls_for", "fields": { "VAR": var }, "inputs": [
        { "name": "FROM", "block": from }, { "name": "TO", "block": to },
        { "name": "BY", "block": by }, { "name": "DO", "block": body } ] })
}

// ══════════════════════════════════════════════════════════════════════════════
// Loops
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn classic_loop_compiles_to_native_for() {
    let source = compile_ok(json!([
        set("s0", "x", "zero", Some("loop")),
        number("zero", "0"),
        controls_for("loop", "i", "from", "to", "by", Some("s1")),
        number("from", "0"),
        number("to", "9"),
        number("by", "1"),
        set("s1", "x", "sum", None),
        arith("sum", "ADD", "gx", "gi"),
        get("gx", "x"),
        get("gi", "i"),
    ]));
    assert_eq!(
        source,
        "let x = 0;\nfor (let i = 0; i < 10; i++) {\n    x = x + i;\n}\n\n"
    );
}

#[test]
fn non_unit_step_falls_back_to_while() {
    let source = compile_ok(json!([
        controls_for("loop", "i", "from", "to", "by", None),
        number("from", "0"),
        number("to", "5"),
        number("by", "2"),
    ]));
    assert_eq!(
        source,
        "let i = 0;\nlet bound = 5;\ni = 0;\nwhile (i <= bound) {\n    i = i + 2;\n}\n\n"
    );
}

#[test]
fn index_read_after_loop_keeps_final_value_observable() {
    let source = compile_ok(json!([
        {
            "id": "loop", "type": "controls_simple_for", "fields": { "VAR": "i" },
            "inputs": [ { "name": "TO", "block": "to" }, { "name": "DO" } ],
            "next": "show"
        },
        number("to", "3"),
        show_number("show", "gi", None),
        get("gi", "i"),
    ]));
    assert_eq!(
        source,
        "let i = 0;\nlet bound = 3;\ni = 0;\nwhile (i <= bound) {\n    i = i + 1;\n}\nbasic.showNumber(i);\n\n"
    );
}

#[test]
fn non_literal_bound_gets_plus_one() {
    let source = compile_ok(json!([
        {
            "id": "loop", "type": "controls_simple_for", "fields": { "VAR": "k" },
            "inputs": [ { "name": "TO", "block": "n" }, { "name": "DO", "block": "show" } ]
        },
        get("n", "limit"),
        show_number("show", "gk", None),
        get("gk", "k"),
    ]));
    assert_eq!(
        source,
        "let limit = 0;\nfor (let k = 0; k < limit + 1; k++) {\n    basic.showNumber(k);\n}\n\n"
    );
}

#[test]
fn repeat_uses_a_fresh_index() {
    let source = compile_ok(json!([
        {
            "id": "rep", "type": "controls_repeat_ext",
            "inputs": [ { "name": "TIMES", "block": "n" }, { "name": "DO", "block": "show" } ]
        },
        number("n", "4"),
        show_number("show", "gi", None),
        get("gi", "i"),
    ]));
    assert_eq!(
        source,
        "let i = 0;\nfor (let i0 = 0; i0 < 4; i0++) {\n    basic.showNumber(i);\n}\n\n"
    );
}

#[test]
fn while_and_forever() {
    let source = compile_ok(json!([
        {
            "id": "forever", "type": "device_forever",
            "inputs": [ { "name": "HANDLER", "block": "loop" } ]
        },
        {
            "id": "loop", "type": "device_while",
            "inputs": [ { "name": "COND", "block": "t" }, { "name": "DO", "block": "show" } ]
        },
        { "id": "t", "type": "logic_boolean", "fields": { "BOOL": "TRUE" } },
        show_number("show", "one", None),
        number("one", "1"),
    ]));
    assert_eq!(
        source,
        "basic.forever(() => {\n    while (true) {\n        basic.showNumber(1);\n    }\n});\n\n"
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Conditionals
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn if_else_if_else_is_flat() {
    let source = compile_ok(json!([
        {
            "id": "if", "type": "controls_if",
            "inputs": [
                { "name": "IF0", "block": "c0" }, { "name": "DO0", "block": "s0" },
                { "name": "IF1", "block": "c1" }, { "name": "DO1", "block": "s1" },
                { "name": "ELSE", "block": "s2" }
            ]
        },
        { "id": "c0", "type": "logic_boolean", "fields": { "BOOL": "TRUE" } },
        { "id": "c1", "type": "logic_boolean", "fields": { "BOOL": "FALSE" } },
        show_number("s0", "n0", None),
        show_number("s1", "n1", None),
        show_number("s2", "n2", None),
        number("n0", "0"),
        number("n1", "1"),
        number("n2", "2"),
    ]));
    assert_eq!(
        source,
        "if (true) {\n    basic.showNumber(0);\n}\nelse if (false) {\n    basic.showNumber(1);\n}\nelse {\n    basic.showNumber(2);\n}\n\n"
    );
}

#[test]
fn nested_if_in_else_is_spliced() {
    let source = compile_ok(json!([
        {
            "id": "outer", "type": "controls_if",
            "inputs": [
                { "name": "IF0", "block": "c0" }, { "name": "DO0" },
                { "name": "ELSE", "block": "inner" }
            ]
        },
        {
            "id": "inner", "type": "controls_if",
            "inputs": [ { "name": "IF0", "block": "c1" }, { "name": "DO0", "block": "s" } ]
        },
        { "id": "c0", "type": "logic_boolean", "fields": { "BOOL": "TRUE" } },
        { "id": "c1", "type": "logic_boolean", "fields": { "BOOL": "FALSE" } },
        show_number("s", "n", None),
        number("n", "7"),
    ]));
    assert_eq!(
        source,
        "if (true) {\n}\nelse if (false) {\n    basic.showNumber(7);\n}\n\n"
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Expressions and calls
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn math_blocks() {
    let source = compile_ok(json!([
        show_number("show", "max", None),
        {
            "id": "max", "type": "math_op2", "fields": { "op": "max" },
            "inputs": [ { "name": "x", "block": "abs" }, { "name": "y", "block": "rnd" } ]
        },
        { "id": "abs", "type": "math_op3", "inputs": [ { "name": "x", "block": "pow" } ] },
        arith("pow", "POWER", "two", "three"),
        number("two", "2"),
        number("three", "3"),
        { "id": "rnd", "type": "device_random", "inputs": [ { "name": "limit", "block": "four" } ] },
        number("four", "4"),
    ]));
    assert_eq!(
        source,
        "basic.showNumber(Math.max(Math.abs(Math.pow(2, 3)), Math.random(5)));\n\n"
    );
}

#[test]
fn precedence_in_generated_code() {
    let source = compile_ok(json!([
        show_number("show", "mul", None),
        arith("mul", "MULTIPLY", "add", "c"),
        arith("add", "ADD", "a", "b"),
        number("a", "1"),
        number("b", "2"),
        number("c", "3"),
    ]));
    assert_eq!(source, "basic.showNumber((1 + 2) * 3);\n\n");
}

#[test]
fn zero_minus_block_becomes_negation() {
    let result = compile_blocks(json!([
        show_number("show", "neg", None),
        arith("neg", "MINUS", "zero", "g"),
        number("zero", "0"),
        get("g", "x"),
    ]));
    assert_eq!(result.source, "let x = 0;\nbasic.showNumber(-x);\n\n");
    let at = result.source.find("-x").unwrap();
    assert_eq!(
        find_block_id(&result.source_map, Some(Span::new(at, 2))),
        Some(BlockId::new("neg"))
    );
}

#[test]
fn string_variables_are_annotated() {
    let source = compile_ok(json!([
        {
            "id": "show", "type": "device_show_string",
            "inputs": [ { "name": "text", "block": "g" } ]
        },
        get("g", "name"),
    ]));
    assert_eq!(source, "let name: string = \"\";\nbasic.showString(name);\n\n");
}

#[test]
fn first_top_level_assignment_declares() {
    let source = compile_ok(json!([
        set("s", "greeting", "t", Some("show")),
        text("t", "hi"),
        {
            "id": "show", "type": "device_show_string",
            "inputs": [ { "name": "text", "block": "g" } ]
        },
        get("g", "greeting"),
    ]));
    assert_eq!(
        source,
        "let greeting: string = \"hi\";\nbasic.showString(greeting);\n\n"
    );
}

#[test]
fn event_handler_body_becomes_callback() {
    let source = compile_ok(json!([
        {
            "id": "ev", "type": "device_button_event", "fields": { "NAME": "Button.A" },
            "inputs": [ { "name": "HANDLER", "block": "show" } ]
        },
        show_number("show", "n", None),
        number("n", "42"),
    ]));
    assert_eq!(
        source,
        "input.onButtonPressed(Button.A, () => {\n    basic.showNumber(42);\n});\n\n"
    );
}

#[test]
fn image_literal_grid() {
    let mut fields = serde_json::Map::new();
    for i in 0..5 {
        fields.insert(format!("LED{i}{i}"), json!("TRUE"));
    }
    let source = compile_ok(json!([
        { "id": "img", "type": "device_show_leds", "fields": fields }
    ]));
    assert_eq!(
        source,
        "basic.showLeds(`\n# . . . .\n. # . . .\n. . # . .\n. . . # .\n. . . . #`, 400);\n\n"
    );
}

#[test]
fn property_and_bare_calls() {
    let source = compile_ok(json!([
        {
            "id": "pause", "type": "device_pause",
            "inputs": [ { "name": "pause", "block": "temp" } ]
        },
        { "id": "temp", "type": "device_temperature", "output": "number" },
    ]));
    assert_eq!(source, "pause(input.temperature);\n\n");
}

#[test]
fn disabled_blocks_are_skipped_or_defaulted() {
    let source = compile_ok(json!([
        show_number("a", "n", Some("b")),
        { "id": "n", "type": "math_number", "fields": { "NUM": "5" }, "disabled": true },
        {
            "id": "b", "type": "device_show_number", "disabled": true,
            "inputs": [ { "name": "number", "block": "m" } ]
        },
        number("m", "6"),
    ]));
    assert_eq!(source, "basic.showNumber(0);\n\n");
}

#[test]
fn empty_input_gets_default_value() {
    let source = compile_ok(json!([
        {
            "id": "show", "type": "device_show_string",
            "inputs": [ { "name": "text" } ]
        }
    ]));
    assert_eq!(source, "basic.showString(\"\");\n\n");
}

#[test]
fn empty_workspace_is_a_single_newline() {
    let result = compile_blocks(json!([]));
    assert!(result.success);
    assert_eq!(result.source, "\n");
    assert!(result.source_map.is_empty());
}

// ══════════════════════════════════════════════════════════════════════════════
// Diagnostics
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn invalid_number_is_reported_and_replaced() {
    let result = compile_blocks(json!([show_number("show", "n", None), number("n", "abc")]));
    assert!(!result.success);
    assert_diagnostic(&result, ErrorCode::INVALID_NUMBER, "n");
    assert_eq!(result.source, "basic.showNumber(0);\n\n");
}

#[test]
fn number_out_of_range_is_reported() {
    let result = compile_blocks(json!([
        show_number("show", "n", None),
        number("n", "99999999999")
    ]));
    assert_diagnostic(&result, ErrorCode::NUMBER_OUT_OF_RANGE, "n");
    assert_eq!(
        result.diagnostics.errors[0].message,
        "99999999999 is either too big or too small"
    );
}

#[test]
fn unknown_block_kind_is_reported_and_compilation_continues() {
    let result = compile_blocks(json!([
        { "id": "odd", "type": "radio_send_value", "output": "Number" },
        show_number("show", "n", None),
        number("n", "1"),
    ]));
    assert_diagnostic(&result, ErrorCode::UNKNOWN_BLOCK_KIND, "odd");
    assert!(result.source.contains("basic.showNumber(1);"));
}

#[test]
fn type_error_still_produces_text() {
    let result = compile_blocks(json!([
        show_number("show", "t", None),
        text("t", "not a number"),
    ]));
    assert!(!result.success);
    assert_diagnostic(&result, ErrorCode::PARAMETER_TYPE_MISMATCH, "show");
    assert_eq!(
        result.diagnostics.errors[0].message,
        "The parameter number of this block is of the wrong type. More precisely: cannot mix string with number"
    );
    assert_eq!(result.source, "basic.showNumber(\"not a number\");\n\n");
}

#[test]
fn missing_argument_is_reported() {
    let result = compile_blocks(json!([
        { "id": "show", "type": "device_show_number", "inputs": [] }
    ]));
    assert_diagnostic(&result, ErrorCode::MISSING_ARGUMENT, "show");
    assert_eq!(result.source, "basic.showNumber(0);\n\n");
}

#[test]
fn diagnostics_are_fresh_per_compilation() {
    let blocks = json!([show_number("show", "n", None), number("n", "abc")]);
    let first = compile_blocks(blocks.clone());
    let second = compile_blocks(blocks);
    assert_eq!(first.diagnostics.total_errors, 1);
    assert_eq!(second.diagnostics.total_errors, 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// Source map, placeholders, determinism
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn source_map_resolves_blocks() {
    let result = compile_blocks(json!([
        show_number("show", "add", None),
        arith("add", "ADD", "a", "b"),
        number("a", "10"),
        number("b", "20"),
    ]));
    let source = &result.source;
    let at = |needle: &str| source.find(needle).unwrap();
    let lookup = |start, length| find_block_id(&result.source_map, Some(Span::new(start, length)));

    assert_eq!(lookup(at("20"), 2), Some(BlockId::new("b")));
    assert_eq!(lookup(at("10 + 20"), 7), Some(BlockId::new("add")));
    assert_eq!(lookup(at("basic"), 5), Some(BlockId::new("show")));
    assert_eq!(find_block_id(&result.source_map, None), None);
}

#[test]
fn placeholders_are_removed_after_compilation() {
    let mut graph = BlockGraph::from_json(
        &json!({ "blocks": [ arith("add", "ADD", "a", "b") ] })
            .to_string()
            .replace("\"block\":\"a\"", "\"block\":null")
            .replace("\"block\":\"b\"", "\"block\":null"),
    )
    .unwrap();
    let calls = StdCallTable::default();
    let result = compile(&mut graph, &calls, &CompileOptions::default()).unwrap();
    assert_eq!(graph.placeholder_count(), 0);
    assert_eq!(result.source, "0 + 0;\n\n");
}

#[test]
fn repeated_compilation_is_deterministic() {
    let workspace = json!({ "blocks": [
        show_number("show", "g", None),
        get("g", "unused"),
    ] })
    .to_string();
    let catalog = ApiCatalog::from_json(CATALOG).unwrap();
    let calls = StdCallTable::from_catalog(&catalog);
    let mut graph = BlockGraph::from_json(&workspace).unwrap();

    let first = compile(&mut graph, &calls, &CompileOptions::default()).unwrap();
    let second = compile(&mut graph, &calls, &CompileOptions::default()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.source, "let unused = 0;\nbasic.showNumber(unused);\n\n");
}

#[test]
fn result_hash_matches_source() {
    let result = compile_blocks(json!([show_number("show", "n", None), number("n", "3")]));
    assert_eq!(result.source_hash, source_hash(&result.source));
    assert_eq!(result.source_hash.len(), 64);
    assert_eq!(
        source_hash(""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn indent_width_option() {
    let options: CompileOptions =
        serde_json::from_str(r#"{ "emit": { "indent_width": 2 } }"#).unwrap();
    let workspace = json!({ "blocks": [
        {
            "id": "forever", "type": "device_forever",
            "inputs": [ { "name": "HANDLER", "block": "show" } ]
        },
        show_number("show", "n", None),
        number("n", "1"),
    ] })
    .to_string();
    let result = compile_json(&workspace, CATALOG, &options).unwrap();
    assert_eq!(
        result.source,
        "basic.forever(() => {\n  basic.showNumber(1);\n});\n\n"
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Aborted compilations
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn malformed_workspace_aborts() {
    let err = compile_json("{ not json", CATALOG, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Graph(_)));
}

#[test]
fn malformed_catalog_aborts() {
    let err = compile_json(r#"{ "blocks": [] }"#, "[", &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Catalog(_)));
}

#[test]
fn compile_to_result_folds_errors() {
    let result = compile_to_result(
        r#"{ "blocks": [ { "id": "a", "type": "text", "next": "ghost" } ] }"#,
        CATALOG,
        &CompileOptions::default(),
    );
    assert!(!result.success);
    assert!(result.source.is_empty());
    assert!(result.error.unwrap().starts_with("invalid workspace"));
}

#[test]
fn compile_result_json_roundtrip() {
    let result = compile_blocks(json!([show_number("show", "n", None), number("n", "abc")]));
    let json = serde_json::to_string(&result).unwrap();
    let rt: CompileResult = serde_json::from_str(&json).unwrap();
    assert_eq!(rt, result);
}
