//! Session lifetime and error-batch contract tests.
//!
//! Every test builds its own registry so acquisition rules can be
//! exercised without contending on process-wide state.

use xml_session::{
    AtomicKind, Error, Session, SessionConfig, SessionRegistry,
};

// ==================== Acquisition ====================

#[test]
fn one_live_session_per_registry() {
    let registry = SessionRegistry::new();
    let session = Session::acquire(&registry, SessionConfig::new()).unwrap();
    let error = Session::acquire(&registry, SessionConfig::new()).unwrap_err();
    assert!(matches!(error, Error::License(_)));
    session.release();
    let second = Session::acquire(&registry, SessionConfig::new()).unwrap();
    assert!(second.is_live());
}

#[test]
fn scoped_releases_on_success() {
    let registry = SessionRegistry::new();
    let answer = Session::scoped(&registry, SessionConfig::new(), |session| {
        assert!(session.is_live());
        Ok(21)
    })
    .unwrap();
    assert_eq!(answer, 21);
    assert!(!registry.is_occupied());
}

#[test]
fn scoped_releases_on_failure() {
    let registry = SessionRegistry::new();
    let outcome: Result<(), _> = Session::scoped(&registry, SessionConfig::new(), |session| {
        session.parse_xml("<broken").map(|_| ())
    });
    assert!(matches!(outcome, Err(Error::Parse(_))));
    assert!(!registry.is_occupied());
}

// ==================== Teardown ====================

#[test]
fn children_fail_after_release() {
    let registry = SessionRegistry::new();
    let session = Session::acquire(&registry, SessionConfig::new()).unwrap();
    let doc = session.parse_xml("<r><a/></r>").unwrap();
    let mut transformer = session.new_transformer().unwrap();
    let mut xpath = session.new_path_evaluator().unwrap();
    xpath.set_context_node(&doc).unwrap();
    session.release();

    assert!(matches!(
        transformer.transform_to_string(),
        Err(Error::Released)
    ));
    assert!(matches!(xpath.evaluate("/r/a"), Err(Error::Released)));
    assert!(matches!(session.new_query_runner(), Err(Error::Released)));
}

#[test]
fn values_survive_session_release() {
    let registry = SessionRegistry::new();
    let session = Session::acquire(&registry, SessionConfig::new()).unwrap();
    let doc = session.parse_xml("<r>kept</r>").unwrap();
    session.release();
    // Values are immutable snapshots; they outlive the session.
    assert_eq!(doc.string_value(), "kept");
}

// ==================== Error batches ====================

#[test]
fn compile_failure_is_batched_not_raised() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        let doc = session.parse_xml("<r/>")?;
        let mut transformer = session.new_transformer()?;
        transformer.set_source_node(&doc)?;
        transformer.compile_stylesheet("<not-a-stylesheet/>")?;
        assert!(transformer.exception_occurred());
        assert!(transformer.exception_count() >= 1);
        assert!(transformer.error_message(0).is_some());

        let result = transformer.transform_to_string()?;
        assert!(result.is_none());
        assert!(transformer.exception_occurred());
        Ok(())
    })
    .unwrap();
}

#[test]
fn batches_describe_only_the_latest_operation() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        let doc = session.parse_xml("<r><a>1</a></r>")?;
        let mut query = session.new_query_runner()?;
        query.set_context_item(&doc)?;
        query.set_query_content("((broken")?;
        assert!(query.exception_occurred());

        query.set_query_content("/r/a")?;
        assert!(!query.exception_occurred());
        let out = query.run_query_to_string()?;
        assert_eq!(out.as_deref(), Some("<a>1</a>"));
        assert!(!query.exception_occurred());
        Ok(())
    })
    .unwrap();
}

#[test]
fn path_syntax_errors_are_loud() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        let doc = session.parse_xml("<r/>")?;
        let mut xpath = session.new_path_evaluator()?;
        xpath.set_context_node(&doc)?;
        assert!(matches!(xpath.evaluate("//[broken"), Err(Error::Syntax(_))));
        Ok(())
    })
    .unwrap();
}

#[test]
fn parse_failure_is_recorded_on_the_session() {
    let registry = SessionRegistry::new();
    let session = Session::acquire(&registry, SessionConfig::new()).unwrap();
    assert!(matches!(session.parse_xml("<r>"), Err(Error::Parse(_))));
    assert!(session.exception_occurred());
    assert_eq!(session.exception_count(), 1);
    session.clear_diagnostics();
    assert!(!session.exception_occurred());
    session.release();
}

// ==================== Configuration and state ====================

#[test]
fn unknown_configuration_key_is_rejected() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        assert!(matches!(
            session.set_configuration_property("frobnicate", "yes"),
            Err(Error::Config(_))
        ));
        Ok(())
    })
    .unwrap();
}

#[test]
fn clear_properties_restores_session_defaults() {
    let registry = SessionRegistry::new();
    let config = SessionConfig::new()
        .property("strip-whitespace", "true")
        .unwrap();
    Session::scoped(&registry, config, |session| {
        let mut query = session.new_query_runner()?;
        assert_eq!(query.property("strip-whitespace"), Some("true"));
        query.set_property("strip-whitespace", "false")?;
        assert_eq!(query.property("strip-whitespace"), Some("false"));
        query.clear_properties();
        // Back to the value inherited at creation, not to empty.
        assert_eq!(query.property("strip-whitespace"), Some("true"));
        Ok(())
    })
    .unwrap();
}

#[test]
fn clear_parameters_only_affects_one_processor() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        let doc = session.parse_xml("<r/>")?;
        let param = session.make_atomic(AtomicKind::Integer, "5")?;

        let mut first = session.new_path_evaluator()?;
        let mut second = session.new_path_evaluator()?;
        first.set_context_node(&doc)?;
        second.set_context_node(&doc)?;
        first.set_parameter("n", &param)?;
        second.set_parameter("n", &param)?;
        first.clear_parameters();

        assert!(matches!(first.evaluate("$n + 1"), Err(Error::Syntax(_)) | Ok(None)));
        let kept = second.evaluate("$n + 1")?.unwrap();
        assert_eq!(kept.string_value(), "6");
        Ok(())
    })
    .unwrap();
}

#[test]
fn make_atomic_validates_lexical_forms() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        assert!(session.make_atomic(AtomicKind::Integer, "12").is_ok());
        assert!(matches!(
            session.make_atomic(AtomicKind::Integer, "twelve"),
            Err(Error::Value(_))
        ));
        assert!(session.make_atomic(AtomicKind::Boolean, "true").is_ok());
        Ok(())
    })
    .unwrap();
}

#[test]
fn validator_requires_a_license() {
    let registry = SessionRegistry::new();
    Session::scoped(&registry, SessionConfig::new(), |session| {
        assert!(matches!(
            session.new_schema_validator(),
            Err(Error::License(_))
        ));
        Ok(())
    })
    .unwrap();
    Session::scoped(&registry, SessionConfig::new().licensed(true), |session| {
        assert!(session.new_schema_validator().is_ok());
        Ok(())
    })
    .unwrap();
}
