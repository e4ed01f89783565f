mod common;

use serde_json::{json, Value};
use trellis::Error;

fn read(input: &str) -> Result<Value, Error> {
    common::json().run(input, &mut ())
}

#[test]
fn reads_scalars() {
    assert_eq!(read("true").unwrap(), Value::Bool(true));
    assert_eq!(read("false").unwrap(), Value::Bool(false));
    assert_eq!(read("null").unwrap(), Value::Null);
    assert_eq!(read("-12.5").unwrap(), json!(-12.5));
    assert_eq!(read(r#""a \"quoted\" word""#).unwrap(), json!("a \"quoted\" word"));
}

#[test]
fn reads_nested_documents() {
    let input = r#"{
        "name": "trellis",
        "tags": ["peg", "parser"],
        "ratio": 0.75,
        "nested": {"empty": [], "deeper": [[1.5], {"x": null}]},
        "flags": [true, false]
    }"#;
    let expected: Value = serde_json::from_str(input).unwrap();
    assert_eq!(read(input).unwrap(), expected);
}

#[test]
fn whitespace_is_optional_between_tokens() {
    assert_eq!(read("[1.0,2.0]").unwrap(), read("[ 1.0 , 2.0 ]").unwrap());
    assert_eq!(read("{}").unwrap(), json!({}));
    assert_eq!(read("[ ]").unwrap(), json!([]));
}

#[test]
fn later_keys_win() {
    assert_eq!(read(r#"{"k": 1.0, "k": 2.0}"#).unwrap(), json!({"k": 2.0}));
}

#[test]
fn malformed_documents_are_syntax_errors() {
    for input in ["[1.0, ]", r#"{"a" 1.0}"#, "[true", "nul", r#"{1.0: 2.0}"#] {
        assert!(matches!(read(input), Err(Error::Syntax(_))), "{input}");
    }
}

#[test]
fn syntax_error_locates_the_dangling_comma() {
    let Err(Error::Syntax(error)) = read("[1.0, ]") else {
        panic!("expected a syntax error");
    };
    assert_eq!(error.position(), 6);
    let annotated = error.annotate();
    assert!(annotated.starts_with("[1.0, ]\n"));
    assert!(annotated.lines().nth(1).unwrap().ends_with('^'));
}
