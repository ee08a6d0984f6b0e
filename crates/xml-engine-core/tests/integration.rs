//! Integration tests for xml-engine-core
//!
//! Exercises the narrow engine surface end to end: parse, compile,
//! invoke, serialize.

use std::collections::HashMap;

use xml_engine_core::xpath::Environment;
use xml_engine_core::xquery::QueryOutcome;
use xml_engine_core::{Engine, Item};

const SIMPLE_XML: &str = r#"<?xml version="1.0"?>
<root><item id="1">First</item><item id="2">Second</item><item id="3">Third</item></root>"#;

// ============== Parsing ==============

#[test]
fn parse_valid_xml() {
    let engine = Engine::new(false);
    assert!(engine.parse(SIMPLE_XML).is_ok());
}

#[test]
fn parse_invalid_xml() {
    let engine = Engine::new(false);
    assert!(engine.parse("<root><unclosed>").is_err());
}

#[test]
fn parse_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doc.xml");
    std::fs::write(&path, "<root><item>Hello</item></root>").unwrap();

    let engine = Engine::new(false);
    let doc = engine.parse_file(&path).unwrap();
    assert_eq!(doc.string_value(doc.root()), "Hello");
}

// ============== XPath ==============

#[test]
fn xpath_count() {
    let engine = Engine::new(false);
    let doc = engine.parse(SIMPLE_XML).unwrap();
    let program = engine.compile_xpath("count(//item)").unwrap();
    let result = engine
        .evaluate_xpath(&program, &doc, None, &Environment::default())
        .unwrap();
    assert_eq!(result, vec![Item::Integer(3)]);
}

#[test]
fn xpath_predicate_text() {
    let engine = Engine::new(false);
    let doc = engine.parse(SIMPLE_XML).unwrap();
    let program = engine.compile_xpath("//item[@id='2']/text()").unwrap();
    let result = engine
        .evaluate_xpath(&program, &doc, None, &Environment::default())
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].string_value(&doc), "Second");
}

#[test]
fn xpath_invalid_expression() {
    let engine = Engine::new(false);
    assert!(engine.compile_xpath("//[invalid").is_err());
}

// ============== XSLT ==============

#[test]
fn xslt_identity_like_transform() {
    let engine = Engine::new(false);
    let doc = engine.parse("<root>Hello</root>").unwrap();
    let stylesheet = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/"><copy><xsl:value-of select="/root"/></copy></xsl:template>
</xsl:stylesheet>"#;
    let program = engine.compile_stylesheet(stylesheet).unwrap();
    let result = engine
        .transform(&program, &doc, &HashMap::new(), &HashMap::new())
        .unwrap();
    assert_eq!(result.serialize_document(), "<copy>Hello</copy>");
}

#[test]
fn xslt_invalid_stylesheet() {
    let engine = Engine::new(false);
    assert!(engine.compile_stylesheet("<xsl:stylesheet/>").is_err());
}

// ============== XQuery ==============

#[test]
fn xquery_constructor() {
    let engine = Engine::new(false);
    let doc = engine.parse(SIMPLE_XML).unwrap();
    let program = engine
        .compile_query("<summary>{count(//item)}</summary>")
        .unwrap();
    match engine
        .execute_query(&program, &doc, None, &Environment::default())
        .unwrap()
    {
        QueryOutcome::Tree(tree) => {
            assert_eq!(tree.serialize_document(), "<summary>3</summary>");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn xquery_flwor() {
    let engine = Engine::new(false);
    let doc = engine.parse(SIMPLE_XML).unwrap();
    let program = engine
        .compile_query("for $i in //item return $i/@id")
        .unwrap();
    match engine
        .execute_query(&program, &doc, None, &Environment::default())
        .unwrap()
    {
        QueryOutcome::Items(items) => assert_eq!(items.len(), 3),
        other => panic!("unexpected outcome: {other:?}"),
    }
}

// ============== XSD ==============

#[test]
fn xsd_validation_batch() {
    let engine = Engine::new(true);
    let mut schemas = engine.new_schema_set().unwrap();
    engine
        .add_schema(
            &mut schemas,
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="nums">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="n" type="xs:integer" maxOccurs="unbounded"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#,
        )
        .unwrap();

    let ok = engine.parse("<nums><n>1</n><n>2</n></nums>").unwrap();
    assert!(engine.validate(&schemas, &ok).valid);

    let bad = engine.parse("<nums><n>one</n><x/></nums>").unwrap();
    let outcome = engine.validate(&schemas, &bad);
    assert!(!outcome.valid);
    assert_eq!(outcome.errors.len(), 2);
    assert!(outcome.report.is_some());
}
