//! Command-line front end over a scoped session

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use xml_session::{AtomicKind, Session, SessionConfig, SessionRegistry};

#[derive(Parser, Debug)]
#[command(name = "xml-session")]
#[command(author, version, about = "XML transformation, query, path evaluation and validation", long_about = None)]
struct Cli {
    /// Acquire a licensed session (required for validation)
    #[arg(long, global = true)]
    licensed: bool,

    /// Working directory for resolving relative file references
    #[arg(long, global = true, value_name = "DIR")]
    cwd: Option<PathBuf>,

    /// Print error batches as JSON on failure
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a path expression against an XML document
    Xpath {
        /// Path to the XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// The expression to evaluate
        #[arg(value_name = "EXPR")]
        expression: String,

        /// Report only the effective boolean value
        #[arg(short, long)]
        boolean: bool,
    },

    /// Transform an XML document with a stylesheet
    Transform {
        /// Path to the stylesheet
        #[arg(short, long, value_name = "XSL")]
        stylesheet: PathBuf,

        /// Path to the source XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Stylesheet parameters as name=value pairs
        #[arg(short, long, value_name = "NAME=VALUE")]
        param: Vec<String>,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a query against an XML document
    Query {
        /// Path to the query file
        #[arg(short, long, value_name = "XQ")]
        query: PathBuf,

        /// Path to the context XML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate an XML document against one or more schemas
    Validate {
        /// Path to a schema file; repeat to register several
        #[arg(short, long, value_name = "XSD", required = true)]
        schema: Vec<PathBuf>,

        /// Path to the XML file to validate
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the structured report on failure
        #[arg(short, long)]
        report: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = SessionConfig::new().licensed(cli.licensed);
    if let Some(dir) = &cli.cwd {
        config = config.working_dir(dir);
    }
    let json = cli.json;

    Session::scoped(SessionRegistry::global(), config, |session| {
        match run(session, cli.command, json) {
            Ok(()) => Ok(()),
            Err(e) => Err(xml_session::Error::Engine(format!("{e:#}"))),
        }
    })
    .map_err(|e| anyhow::anyhow!("{e}"))
}

fn run(session: &Session, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Xpath {
            file,
            expression,
            boolean,
        } => {
            let mut xpath = session.new_path_evaluator()?;
            xpath.set_context_file(&file)?;
            if boolean {
                let value = xpath.effective_boolean_value(&expression)?;
                println!("{value}");
            } else {
                match xpath.evaluate(&expression)? {
                    Some(value) => println!("{value}"),
                    None => {
                        report_batch(json, xpath.exception_count(), |i| {
                            xpath.error_message(i).map(str::to_string)
                        });
                        if xpath.exception_occurred() {
                            bail!("evaluation failed");
                        }
                    }
                }
            }
        }
        Commands::Transform {
            stylesheet,
            file,
            param,
            output,
        } => {
            let mut transformer = session.new_transformer()?;
            transformer.set_source_file(&file)?;
            transformer.compile_stylesheet_file(&stylesheet)?;
            let mut initial = HashMap::new();
            for pair in &param {
                let (name, value) = pair
                    .split_once('=')
                    .with_context(|| format!("parameter '{pair}' is not name=value"))?;
                initial.insert(
                    name.to_string(),
                    session.make_atomic(AtomicKind::String, value)?,
                );
            }
            for (name, value) in &initial {
                transformer.set_parameter(name, value)?;
            }
            match transformer.transform_to_string()? {
                Some(result) => emit(output.as_deref(), &result)?,
                None => {
                    report_batch(json, transformer.exception_count(), |i| {
                        transformer.error_message(i).map(str::to_string)
                    });
                    bail!("transformation failed");
                }
            }
        }
        Commands::Query {
            query,
            file,
            output,
        } => {
            let mut runner = session.new_query_runner()?;
            runner.set_context_file(&file)?;
            runner.set_query_file(&query)?;
            match runner.run_query_to_string()? {
                Some(result) => emit(output.as_deref(), &result)?,
                None => {
                    report_batch(json, runner.exception_count(), |i| {
                        runner.error_message(i).map(str::to_string)
                    });
                    bail!("query failed");
                }
            }
        }
        Commands::Validate {
            schema,
            file,
            report,
        } => {
            let mut validator = session.new_schema_validator()?;
            for path in &schema {
                validator.register_schema_file(path)?;
            }
            if validator.exception_occurred() {
                report_batch(json, validator.exception_count(), |i| {
                    validator.error_message(i).map(str::to_string)
                });
                bail!("schema registration failed");
            }
            validator.set_source_file(&file)?;
            validator.validate()?;
            if validator.exception_occurred() {
                report_batch(json, validator.exception_count(), |i| {
                    validator.error_message(i).map(str::to_string)
                });
                if report {
                    if let Some(r) = validator.validation_report() {
                        if let Some(xml_session::ValueItem::Node(node)) = r.head() {
                            println!("{}", node.to_xml());
                        }
                    }
                }
                bail!("validation failed");
            }
            println!("valid");
        }
    }
    Ok(())
}

fn emit(output: Option<&std::path::Path>, content: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => std::fs::write(path, content)
            .with_context(|| format!("writing {}", path.display()))?,
        None => println!("{content}"),
    }
    Ok(())
}

/// Print an error batch to stderr, one record per line, or as JSON.
fn report_batch(json: bool, count: usize, message: impl Fn(usize) -> Option<String>) {
    if json {
        let records: Vec<serde_json::Value> = (0..count)
            .filter_map(|i| {
                message(i).map(|m| serde_json::json!({ "index": i, "message": m }))
            })
            .collect();
        eprintln!("{}", serde_json::json!({ "errors": records }));
    } else {
        for i in 0..count {
            if let Some(m) = message(i) {
                eprintln!("error [{i}]: {m}");
            }
        }
    }
}
