//! Round-trip tests: serializing an unedited parse reproduces the source.
//!
//! Every case runs through a full-document pipeline, then the wikitext serializer.
//! Behavior switches are the one lossy construct and get their own test.

use proptest::prelude::*;
use rstest::rstest;
use std::sync::Arc;
use wikidom_parser::wiki::fetch::MemoryProvider;
use wikidom_parser::wiki::tree::html::{from_html, to_html};
use wikidom_parser::wiki::{
    ContentType, Document, EnvOptions, Environment, ParserPipelineFactory, WikitextSerializer,
};

fn parse_with(factory: &ParserPipelineFactory, source: &str, options: EnvOptions) -> Document {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        factory
            .make_pipeline(ContentType::FullDocument, Environment::new(options))
            .unwrap()
            .parse(source)
            .await
            .unwrap()
    })
}

fn parse(source: &str) -> Document {
    parse_with(&ParserPipelineFactory::offline(), source, EnvOptions::default())
}

fn roundtrip(source: &str) -> String {
    WikitextSerializer::new().serialize(&parse(source))
}

#[rstest]
#[case::plain_text("Just some text.")]
#[case::empty("")]
#[case::blank_lines("a\n\nb\n")]
#[case::quotes("''italic'' and '''bold''' and '''''both'''''")]
#[case::unbalanced_quotes("'''bold to the end")]
#[case::misnested_quotes("'''a''b'''c''")]
#[case::quotes_close_at_line_end("''open\nnext line")]
#[case::headings("== Heading ==\nBody\n=== Sub ===  \nMore")]
#[case::unbalanced_heading("=== Uneven ==\ntext")]
#[case::bullets("* one\n* two\n** nested\n* back")]
#[case::ordered_and_definitions("# first\n#* mixed\n; term\n: definition")]
#[case::skipped_level("*** deep\n* shallow")]
#[case::wikilinks("[[Main Page]] and [[Foo|bar ''baz'']]")]
#[case::external_links("[http://example.com Example] and [http://a.org]")]
#[case::bare_url("see http://example.com/x?y=1 here")]
#[case::file_link("[[File:Cat.png|thumb|left|A cat]]")]
#[case::sized_frame("[[File:Dog.jpg|frame|200x100px]]")]
#[case::comment("<!-- note -->text")]
#[case::html_tags("<span class=\"x\">y</span><br/>z")]
#[case::misnested_html("<b><i>x</b></i>")]
#[case::stray_close("a</span>b")]
#[case::template_without_page("{{Missing|a|b=c}}")]
#[case::parser_function("{{#if: x | yes | no }}")]
#[case::template_argument("{{{1|default}}}")]
#[case::noinclude("<noinclude>shown</noinclude> rest")]
#[case::includeonly("before<includeonly>hidden</includeonly>after")]
#[case::many_headings("= A =\n= B =\n= C =\n= D =\ntext")]
#[case::unbalanced_brackets("[[not closed and ]] [ also {{ this")]
fn test_unedited_parse_round_trips(#[case] source: &str) {
    assert_eq!(roundtrip(source), source);
}

#[test]
fn test_expanded_template_keeps_call_source() {
    let provider = MemoryProvider::new().with_page("Template:Greet", "Hello '''{{{1}}}'''");
    let factory = ParserPipelineFactory::new(Arc::new(provider));
    let source = "Say: {{ Greet | you }}!";
    let doc = parse_with(&factory, source, EnvOptions::default());
    assert_eq!(doc.elements_typed("mw:Transclusion").len(), 1);
    assert!(doc.text_content(doc.root()).contains("Hello"));
    assert_eq!(WikitextSerializer::new().serialize(&doc), source);
}

#[test]
fn test_behavior_switches_are_consumed() {
    assert_eq!(roundtrip("__NOTOC__Text"), "Text");
}

#[test]
fn test_debug_html_carries_enough_to_round_trip() {
    let source = "''a'' [[Foo|bar]]\n* x\n* y\n[[File:Cat.png|thumb|A cat]]";
    let doc = parse(source);
    let html = to_html(&doc, true).unwrap();
    assert!(html.contains("data-parsoid"));

    let restored = from_html(&html).unwrap();
    assert_eq!(WikitextSerializer::new().serialize(&restored), source);

    let plain = from_html(&to_html(&doc, false).unwrap()).unwrap();
    assert_ne!(WikitextSerializer::new().serialize(&plain), "");
}

#[test]
fn test_failed_expansion_round_trips_through_plain_html() {
    let provider = MemoryProvider::new().with_page("Template:Deep", "never reached");
    let factory = ParserPipelineFactory::new(Arc::new(provider));
    let options = EnvOptions {
        max_depth: 0,
        ..EnvOptions::default()
    };
    let source = "a {{Deep|x}} b";
    let doc = parse_with(&factory, source, options);
    assert_eq!(doc.elements_typed("mw:Error").len(), 1);

    let html = to_html(&doc, false).unwrap();
    assert!(!html.contains("data-parsoid"));
    let restored = from_html(&html).unwrap();
    assert_eq!(WikitextSerializer::new().serialize(&restored), source);
}

#[test]
fn test_edit_rebuilds_only_the_edited_node() {
    let source = "[[Foo|bar]] and '''kept'''";
    let mut doc = parse(source);
    let link = doc.elements_named("a")[0];
    doc.set_attr(link, "href", "./Baz");
    assert_eq!(
        WikitextSerializer::new().serialize(&doc),
        "[[Baz|bar]] and '''kept'''"
    );
}

fn wikitext() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            "[a-c ]{1,4}",
            Just("''".to_string()),
            Just("'''".to_string()),
            Just("\n".to_string()),
            Just("== ".to_string()),
            Just(" ==".to_string()),
            Just("* ".to_string()),
            Just("#".to_string()),
            Just("[[".to_string()),
            Just("]]".to_string()),
            Just("|".to_string()),
            Just("<!--c-->".to_string()),
        ],
        0..24,
    )
    .prop_map(|parts| parts.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_unedited_parse_round_trips(source in wikitext()) {
        prop_assert_eq!(roundtrip(&source), source);
    }
}
