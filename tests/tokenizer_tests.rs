mod common;

use rstest::rstest;
use trellis::Error;

use common::tokenize;

#[rstest]
#[case("Hello World!", &["Hello", "World"])]
#[case("Hello!", &["Hello"])]
#[case("Hello  big   World?!", &["Hello", "big", "World"])]
#[case("Hi. Bye!", &["Hi", "Bye"])]
#[case("One. two... three.", &["One", "two", "three"])]
fn collects_words(#[case] input: &str, #[case] expected: &[&str]) {
    assert_eq!(tokenize(input).unwrap(), expected);
}

#[rstest]
#[case::no_closing_punctuation("Hello World")]
#[case::no_leading_word("!")]
#[case::space_before_closing_punctuation("Hello World !")]
#[case::trailing_space("Hello World! ")]
#[case::empty("")]
fn rejects_malformed_sentences(#[case] input: &str) {
    assert!(matches!(tokenize(input), Err(Error::Syntax(_))), "{input:?}");
}

#[test]
fn syntax_error_points_past_the_last_word() {
    let Err(Error::Syntax(error)) = tokenize("Hello World") else {
        panic!("expected a syntax error");
    };
    assert_eq!(error.position(), 11);
    assert!(error.annotate().starts_with("Hello World\n"));
}
