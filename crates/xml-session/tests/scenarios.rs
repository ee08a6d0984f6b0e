//! End-to-end scenarios driving all three processor kinds through a
//! scoped session.

use std::collections::HashMap;

use xml_session::{AtomicKind, Session, SessionConfig, SessionRegistry, ValueItem};

const PERSON_XML: &str =
    "<out><person>text1</person><person>text2</person><person>text3</person></out>";

// ==================== Transformation ====================

#[test]
fn transform_with_sequence_parameter() {
    let stylesheet = r#"<xsl:stylesheet version="2.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:param name="values" select="(2,3,4)"/>
  <xsl:template match="/">
    <output>
      <xsl:value-of select="/out/person[1]/text()"/>
      <xsl:for-each select="$values">
        <out><xsl:value-of select=". * 3"/></out>
      </xsl:for-each>
    </output>
  </xsl:template>
</xsl:stylesheet>"#;

    let registry = SessionRegistry::new();
    let output = Session::scoped(&registry, SessionConfig::new(), |session| {
        let source = session.parse_xml(PERSON_XML)?;
        let mut transformer = session.new_transformer()?;
        transformer.set_source_node(&source)?;
        transformer.compile_stylesheet(stylesheet)?;
        assert!(!transformer.exception_occurred());
        let output = transformer.transform_to_string()?;
        assert!(!transformer.exception_occurred());
        Ok(output)
    })
    .unwrap()
    .expect("transform produced output");

    assert!(output.starts_with("<output>text1<out>6</out>"));
    assert_eq!(
        output,
        "<output>text1<out>6</out><out>9</out><out>12</out></output>"
    );
}

#[test]
fn transform_with_supplied_parameter() {
    let stylesheet = r#"<xsl:stylesheet version="2.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:param name="values" select="(2,3,4)"/>
  <xsl:template match="/">
    <output>
      <xsl:for-each select="$values">
        <out><xsl:value-of select=". * 3"/></out>
      </xsl:for-each>
    </output>
  </xsl:template>
</xsl:stylesheet>"#;

    let registry = SessionRegistry::new();
    let output = Session::scoped(&registry, SessionConfig::new(), |session| {
        let source = session.parse_xml(PERSON_XML)?;
        let ten = session.make_atomic(AtomicKind::Integer, "10")?;
        let mut transformer = session.new_transformer()?;
        transformer.set_source_node(&source)?;
        transformer.compile_stylesheet(stylesheet)?;
        transformer.set_parameter("values", &ten)?;
        transformer.transform_to_string()
    })
    .unwrap()
    .unwrap();

    assert_eq!(output, "<output><out>30</out></output>");
}

#[test]
fn transform_with_initial_template_parameters() {
    let stylesheet = r#"<xsl:stylesheet version="2.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/">
    <greeting><xsl:value-of select="$word"/></greeting>
  </xsl:template>
</xsl:stylesheet>"#;

    let registry = SessionRegistry::new();
    let output = Session::scoped(&registry, SessionConfig::new(), |session| {
        let source = session.parse_xml("<r/>")?;
        let word = session.make_atomic(AtomicKind::String, "hello")?;
        let mut transformer = session.new_transformer()?;
        transformer.set_source_node(&source)?;
        transformer.compile_stylesheet(stylesheet)?;
        let params = HashMap::from([("word".to_string(), word)]);
        transformer.set_initial_template_parameters(&params, false)?;
        transformer.transform_to_string()
    })
    .unwrap()
    .unwrap();

    assert_eq!(output, "<greeting>hello</greeting>");
}

#[test]
fn transform_to_value_yields_a_node() {
    let stylesheet = r#"<xsl:stylesheet version="2.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/">
    <total><xsl:value-of select="count(//person)"/></total>
  </xsl:template>
</xsl:stylesheet>"#;

    let registry = SessionRegistry::new();
    let result = Session::scoped(&registry, SessionConfig::new(), |session| {
        let source = session.parse_xml(PERSON_XML)?;
        let mut transformer = session.new_transformer()?;
        transformer.set_source_node(&source)?;
        transformer.compile_stylesheet(stylesheet)?;
        transformer.transform_to_value()
    })
    .unwrap()
    .expect("transform produced a tree");

    assert_eq!(result.len(), 1);
    assert_eq!(result.string_value(), "3");
    assert!(matches!(result.head(), Some(ValueItem::Node(_))));
}

// ==================== Path evaluation ====================

#[test]
fn path_counts_and_boolean_checks() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        let source = session.parse_xml(PERSON_XML)?;
        let mut xpath = session.new_path_evaluator()?;
        xpath.set_context_node(&source)?;

        let count = xpath.evaluate_single("count(//person)")?.unwrap();
        assert_eq!(count.string_value(), "3");
        assert!(xpath.effective_boolean_value("count(//person) = 3")?);
        assert!(!xpath.effective_boolean_value("/out/person/text() = 'text'")?);
        assert!(xpath.effective_boolean_value("/out/person/text() = 'text2'")?);

        let names = xpath.evaluate("/out/person")?.unwrap();
        assert_eq!(names.len(), 3);
        assert!(xpath.evaluate("/out/missing")?.is_none());
        Ok(())
    })
    .unwrap();
}

// ==================== Query ====================

#[test]
fn query_builds_a_result_tree() {
    let registry = SessionRegistry::new();
    let output = Session::scoped(&registry, SessionConfig::new(), |session| {
        let source = session.parse_xml(PERSON_XML)?;
        let mut query = session.new_query_runner()?;
        query.set_context_item(&source)?;
        query.set_query_content("<summary>{count(//person)}</summary>")?;
        query.run_query_to_string()
    })
    .unwrap()
    .unwrap();
    assert_eq!(output, "<summary>3</summary>");
}

#[test]
fn query_with_bound_variable() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        let source = session.parse_xml("<r/>")?;
        let seven = session.make_atomic(AtomicKind::Integer, "7")?;
        let mut query = session.new_query_runner()?;
        query.set_context_item(&source)?;
        query.set_parameter("n", &seven)?;
        query.set_query_content("$n * 2")?;
        let out = query.run_query_to_string()?;
        assert_eq!(out.as_deref(), Some("14"));
        Ok(())
    })
    .unwrap();
}

#[test]
fn query_result_as_a_value() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        let source = session.parse_xml(PERSON_XML)?;
        let mut query = session.new_query_runner()?;
        query.set_context_item(&source)?;

        // A bare expression yields its item sequence.
        query.set_query_content("//person")?;
        let people = query.run_query_to_value()?.expect("query ran");
        assert_eq!(people.len(), 3);
        assert_eq!(people.string_value(), "text1 text2 text3");

        // A constructor yields the built tree as a single node.
        query.set_query_content("<summary>{count(//person)}</summary>")?;
        let tree = query.run_query_to_value()?.expect("query ran");
        assert_eq!(tree.len(), 1);
        assert!(matches!(tree.head(), Some(ValueItem::Node(_))));
        assert_eq!(tree.string_value(), "3");
        Ok(())
    })
    .unwrap();
}

#[test]
fn query_with_declared_namespace() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        let source =
            session.parse_xml(r#"<d:root xmlns:d="urn:demo"><d:item>7</d:item></d:root>"#)?;
        let mut query = session.new_query_runner()?;
        query.set_context_item(&source)?;
        query.declare_namespace("t", "urn:demo")?;
        query.set_query_content("count(//t:item)")?;
        assert_eq!(query.run_query_to_string()?.as_deref(), Some("1"));

        // An undeclared prefix matches nothing.
        query.set_query_content("count(//u:item)")?;
        assert_eq!(query.run_query_to_string()?.as_deref(), Some("0"));
        Ok(())
    })
    .unwrap();
}

// ==================== File handling ====================

#[test]
fn files_resolve_against_the_working_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("people.xml"), PERSON_XML).unwrap();

    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        session.set_working_directory(dir.path())?;
        let mut query = session.new_query_runner()?;
        query.set_context_file("people.xml")?;
        query.set_query_content("count(//person)")?;
        assert!(query.run_query_to_file("count.txt")?);
        Ok(())
    })
    .unwrap();

    let written = std::fs::read_to_string(dir.path().join("count.txt")).unwrap();
    assert_eq!(written, "3");
}

#[test]
fn transform_writes_its_result_to_a_file() {
    let stylesheet = r#"<xsl:stylesheet version="2.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:template match="/">
    <total><xsl:value-of select="count(//person)"/></total>
  </xsl:template>
</xsl:stylesheet>"#;

    let dir = tempfile::tempdir().unwrap();
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        session.set_working_directory(dir.path())?;
        let source = session.parse_xml(PERSON_XML)?;
        let mut transformer = session.new_transformer()?;
        transformer.set_source_node(&source)?;
        transformer.compile_stylesheet(stylesheet)?;
        assert!(transformer.transform_to_file("total.xml")?);

        // Without a compiled stylesheet nothing is written.
        transformer.compile_stylesheet("not a stylesheet")?;
        assert!(!transformer.transform_to_file("never.xml")?);
        Ok(())
    })
    .unwrap();

    let written = std::fs::read_to_string(dir.path().join("total.xml")).unwrap();
    assert_eq!(written, "<total>3</total>");
    assert!(!dir.path().join("never.xml").exists());
}

#[test]
fn missing_context_file_is_batched() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        let mut query = session.new_query_runner()?;
        query.set_context_file("/no/such/file.xml")?;
        query.set_query_content("1")?;
        assert!(query.run_query_to_string()?.is_none());
        assert!(query.exception_occurred());
        Ok(())
    })
    .unwrap();
}

// ==================== Validation ====================

const FAMILY_XSD: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Family">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="Parent" type="xs:string"/>
        <xs:element name="Child" type="xs:string"/>
      </xs:sequence>
      <xs:assert test="count(child::node()) = 2"/>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[test]
fn validation_failure_fills_batch_and_report() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new().licensed(true), |session| {
        let mut validator = session.new_schema_validator()?;
        validator.register_schema(FAMILY_XSD)?;
        assert!(!validator.exception_occurred());

        // Two comments and a lone element: content model and the
        // child-count assertion both fail.
        let doc =
            session.parse_xml("<Family><!--one--><!--two--><Parent>p</Parent></Family>")?;
        validator.set_source_node(&doc)?;
        validator.validate()?;
        assert!(validator.exception_occurred());
        assert!(validator.exception_count() >= 2);
        assert!(validator.validate_to_node()?.is_none());

        let report = validator.validation_report().expect("report on failure");
        assert!(report.string_value().len() > 0);
        Ok(())
    })
    .unwrap();
}

#[test]
fn valid_document_round_trips_through_validation() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new().licensed(true), |session| {
        let mut validator = session.new_schema_validator()?;
        validator.register_schema(FAMILY_XSD)?;
        let doc = session.parse_xml("<Family><Parent>p</Parent><Child>c</Child></Family>")?;
        validator.set_source_node(&doc)?;
        let validated = validator.validate_to_node()?.expect("document is valid");
        assert_eq!(validated.string_value(), "pc");
        assert!(!validator.exception_occurred());
        assert!(validator.validation_report().is_none());
        Ok(())
    })
    .unwrap();
}
