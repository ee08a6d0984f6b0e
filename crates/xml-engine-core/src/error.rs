//! Error types for engine operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("XML parsing error: {0}")]
    Parse(String),

    #[error("XPath syntax error: {0}")]
    XPathSyntax(String),

    #[error("XPath evaluation error: {0}")]
    XPathEval(String),

    #[error("XSLT compilation error: {0}")]
    XsltCompile(String),

    #[error("XSLT runtime error: {0}")]
    XsltRuntime(String),

    #[error("XQuery compilation error: {0}")]
    QueryCompile(String),

    #[error("XQuery evaluation error: {0}")]
    QueryEval(String),

    #[error("Schema compilation error: {0}")]
    SchemaCompile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine error: {0}")]
    Engine(String),
}

impl Error {
    /// True for errors raised while compiling a program, as opposed to
    /// errors raised while running one.
    pub fn is_static(&self) -> bool {
        matches!(
            self,
            Error::Parse(_)
                | Error::XPathSyntax(_)
                | Error::XsltCompile(_)
                | Error::QueryCompile(_)
                | Error::SchemaCompile(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
