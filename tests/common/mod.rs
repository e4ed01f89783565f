//! Grammars shared by the integration tests.
#![allow(dead_code)]

use serde_json::{Map, Value};
use trellis::{programs, Grammar, Parser, Program};

/// Words separated by spaces, optionally interleaved with punctuation that is
/// not at the very end, and closed by punctuation right after the last word.
/// Evaluates to the words in order.
pub fn tokenizer() -> Program<(), Vec<String>> {
    let mut grammar: Grammar<(), Vec<String>> = Grammar::new();
    grammar.define("Whitespace", "' '+").unwrap();
    grammar
        .define_with(
            "Start",
            "Word (Word | Punctuation ~ &.)* ~ Punctuation ~ !.",
            |e, words| e.iter().try_for_each(|token| token.evaluate(words)),
        )
        .unwrap();
    grammar
        .define_with("Word", "[a-zA-Z]+", |e, words| {
            words.push(e.as_str().to_string());
            Ok(())
        })
        .unwrap();
    grammar
        .define_with("Punctuation", "[.!?]+", |_, _| Ok(()))
        .unwrap();
    grammar.set_separator("Whitespace");
    grammar.set_start("Start");
    grammar.build().unwrap()
}

/// Runs the tokenizer and returns the collected words.
pub fn tokenize(input: &str) -> Result<Vec<String>, trellis::Error> {
    let program = tokenizer();
    let mut words = Vec::new();
    program.run(input, &mut words)?;
    Ok(words)
}

/// A JSON reader producing `serde_json` values.
pub fn json() -> Program<Value> {
    let mut grammar: Grammar<Value> = Grammar::new();
    grammar.define("Space", r"[ \t\n\r]+").unwrap();

    grammar
        .define("JSON", "Number | String | Boolean | Array | Object | Null")
        .unwrap();
    grammar
        .set_program_rule("Number", programs::number().unwrap())
        .unwrap();
    grammar
        .set_program_rule("String", programs::string("\"", "\"").unwrap())
        .unwrap();

    grammar.define("Boolean", "True | False").unwrap();
    grammar
        .define_with("True", "'true'", |_, _| Ok(Value::Bool(true)))
        .unwrap();
    grammar
        .define_with("False", "'false'", |_, _| Ok(Value::Bool(false)))
        .unwrap();
    grammar
        .define_with("Null", "'null'", |_, _| Ok(Value::Null))
        .unwrap();

    grammar
        .define_with("Array", "'[' (JSON (',' JSON)*)? ']'", |e, args| {
            let items = e
                .iter()
                .map(|item| item.evaluate(args))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        })
        .unwrap();

    grammar
        .define_with("Object", "'{' (Pair (',' Pair)*)? '}'", |e, args| {
            let mut object = Map::new();
            for pair in e.iter() {
                let key = match pair.child(0)?.evaluate(args)? {
                    Value::String(key) => key,
                    other => return Err(pair.error(format!("object key {other} is not a string"))),
                };
                object.insert(key, pair.child(1)?.evaluate(args)?);
            }
            Ok(Value::Object(object))
        })
        .unwrap();
    grammar.define("Pair", "String ':' JSON").unwrap();

    grammar.set_separator("Space");
    grammar.set_start("JSON");
    grammar.build().unwrap()
}

/// A parser whose start rule is `pattern`, with no separator.
pub fn pattern(pattern: &str) -> Parser {
    let mut grammar: Grammar<()> = Grammar::new();
    grammar.define("Start", pattern).unwrap();
    grammar.set_start("Start");
    grammar.parser().unwrap()
}
