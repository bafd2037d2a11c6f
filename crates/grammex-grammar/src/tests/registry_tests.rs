//! Tests for `GrammarSet`.

use crate::error::GrammarError;
use crate::loader::load_grammar;
use crate::registry::GrammarSet;

fn grammars(sources: &[&str]) -> Vec<crate::model::Grammar> {
    sources.iter().map(|s| load_grammar(s).unwrap()).collect()
}

const HOST: &str = r#"
grammar Host;
inherits Common;
embed Inner on "[" until "]";
doc : (WORD | block)* EOF ;
block : "[" @Inner "]" ;
"#;

const COMMON: &str = r#"
grammar Common;
skip /\s+/;
token WORD = /[a-z]+/ : identifier;
"#;

const INNER: &str = r#"
grammar Inner;
skip /\s+/;
token NUM = /[0-9]+/ : literal;
inline items : NUM* ;
"#;

#[test]
fn test_build_resolves_and_compiles() {
    let set = GrammarSet::build(grammars(&[HOST, COMMON, INNER])).unwrap();

    let names: Vec<&str> = set.names().collect();
    assert_eq!(names, ["Host", "Inner"]);
    assert!(!set.contains("Common"));
    assert!(set.resolved("Common").is_some());

    let host = set.get("Host").unwrap();
    assert!(host.source().tokens.contains_key("WORD"));
    assert_eq!(host.embeddings()[0].language, "Inner");
}

#[test]
fn test_unknown_embedded_language() {
    let err = GrammarSet::build(grammars(&[HOST, COMMON])).unwrap_err();
    assert!(matches!(
        err,
        GrammarError::UnknownEmbeddedLanguage { grammar, language }
            if grammar == "Host" && language == "Inner"
    ));
}

#[test]
fn test_cycles_fail_the_build() {
    let err = GrammarSet::build(grammars(&[
        "grammar A; inherits B; a : \"a\" ;",
        "grammar B; inherits A; b : \"b\" ;",
    ]))
    .unwrap_err();
    assert!(matches!(err, GrammarError::CyclicInheritance { .. }));
}

#[test]
fn test_require_unknown_grammar() {
    let set = GrammarSet::build(grammars(&[INNER])).unwrap();
    assert!(set.require("Inner").is_ok());
    assert!(matches!(
        set.require("Nope"),
        Err(GrammarError::UnknownGrammar { .. })
    ));
}
