//! Command-line interface for wikidom
//! Parses wikitext into an annotated DOM, serializes it back, and checks that the two agree.
//!
//! Usage:
//!   wikidom parse `<file|->` [--format html|tree|tokens|linear]  - Parse a document
//!   wikidom roundtrip `<file>`                                   - Parse and serialize, report drift
//!   wikidom serialize `<html-file>`                              - Turn annotated HTML back into wikitext
//!   wikidom fetch `<title>` [--service]                          - Parse a page by title
//!
//! Global flags (`--config`, `--no-templates`, `--max-depth`, `--trace`, `--debug`, `--title`)
//! are layered over the configuration files before any command runs.

use clap::{Arg, ArgAction, ArgMatches, Command};
use log::{LevelFilter, Log, Metadata, Record};
use similar::{Algorithm, ChangeTag, TextDiff};
use std::io::Read;
use std::path::Path;
use std::process;
use wikidom_config::{Loader, WikidomConfig};
use wikidom_parser::wiki::lexing::tokenize;
use wikidom_parser::wiki::model::DomConverter;
use wikidom_parser::wiki::service::ParseService;
use wikidom_parser::wiki::tree::html::{from_html, to_html};
use wikidom_parser::wiki::{
    ContentType, Document, EnvOptions, Environment, ParserPipelineFactory, WikitextSerializer,
};

const LOCAL_CONFIG: &str = "wikidom.toml";

/// Writes log records to stderr, one line each.
struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging(verbosity: u8, quiet: bool) {
    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };
    if log::set_boxed_logger(Box::new(StderrLogger { level })).is_ok() {
        log::set_max_level(level);
    }
}

fn cli() -> Command {
    Command::new("wikidom")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Parse wikitext into an annotated DOM and serialize it back")
        .arg_required_else_help(true)
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .help("Configuration file (defaults to ./wikidom.toml when present)"),
        )
        .arg(
            Arg::new("no-templates")
                .long("no-templates")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Leave transclusions unexpanded"),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .global(true)
                .value_parser(clap::value_parser!(u32))
                .help("Maximum nesting of template expansions"),
        )
        .arg(
            Arg::new("trace")
                .long("trace")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log every transform dispatch"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit round-trip attributes in HTML output"),
        )
        .arg(
            Arg::new("title")
                .long("title")
                .global(true)
                .help("Title of the page being parsed"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count)
                .help("Increase log output (repeatable)"),
        )
        .arg(
            Arg::new("quiet")
                .long("quiet")
                .short('q')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Only log errors"),
        )
        .subcommand(
            Command::new("parse")
                .about("Parse a wikitext file ('-' reads stdin)")
                .arg(Arg::new("path").required(true).index(1))
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .value_parser(["html", "tree", "tokens", "linear"])
                        .default_value("html"),
                ),
        )
        .subcommand(
            Command::new("roundtrip")
                .about("Parse and serialize a file, failing when the output differs")
                .arg(Arg::new("path").required(true).index(1)),
        )
        .subcommand(
            Command::new("serialize")
                .about("Serialize annotated HTML back to wikitext")
                .arg(Arg::new("path").required(true).index(1)),
        )
        .subcommand(
            Command::new("fetch")
                .about("Parse a page by title")
                .arg(Arg::new("title").required(true).index(1))
                .arg(
                    Arg::new("service")
                        .long("service")
                        .action(ArgAction::SetTrue)
                        .help("Delegate to the configured parse service"),
                ),
        )
}

#[tokio::main]
async fn main() {
    let matches = cli().get_matches();
    let verbosity = if matches.get_flag("trace") {
        3
    } else {
        matches.get_count("verbose")
    };
    init_logging(verbosity, matches.get_flag("quiet"));

    let config = load_config(&matches).unwrap_or_else(|e| fail(&format!("Configuration error: {}", e)));

    match matches.subcommand() {
        Some(("parse", sub)) => handle_parse_command(&config, sub).await,
        Some(("roundtrip", sub)) => handle_roundtrip_command(&config, sub).await,
        Some(("serialize", sub)) => handle_serialize_command(sub),
        Some(("fetch", sub)) => handle_fetch_command(&config, sub).await,
        _ => unreachable!("a subcommand is required"),
    }
}

/// Layer config files and flag overrides over the embedded defaults.
fn load_config(matches: &ArgMatches) -> Result<WikidomConfig, wikidom_config::LoadError> {
    let mut loader = match matches.get_one::<String>("config") {
        Some(path) => Loader::new().with_file(path),
        None => Loader::new().with_optional_file(LOCAL_CONFIG),
    };
    if matches.get_flag("no-templates") {
        loader = loader.set_override("environment.fetch_templates", false)?;
    }
    if let Some(depth) = matches.get_one::<u32>("max-depth") {
        loader = loader.set_override("environment.max_depth", i64::from(*depth))?;
    }
    if matches.get_flag("trace") {
        loader = loader.set_override("environment.trace", true)?;
    }
    if matches.get_flag("debug") {
        loader = loader.set_override("environment.debug", true)?;
    }
    if let Some(title) = matches.get_one::<String>("title") {
        loader = loader.set_override("environment.page_title", title.as_str())?;
    }
    loader.build()
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn read_input(path: &str) -> String {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .unwrap_or_else(|e| fail(&format!("Error reading stdin: {}", e)));
        return buf;
    }
    std::fs::read_to_string(Path::new(path))
        .unwrap_or_else(|e| fail(&format!("Error reading {}: {}", path, e)))
}

fn factory_for(options: &EnvOptions) -> ParserPipelineFactory {
    if options.fetch_templates {
        ParserPipelineFactory::http(options)
    } else {
        ParserPipelineFactory::offline()
    }
}

async fn parse_document(options: &EnvOptions, source: &str) -> Document {
    let pipeline = factory_for(options)
        .make_pipeline(ContentType::FullDocument, Environment::new(options.clone()))
        .unwrap_or_else(|e| fail(&format!("Pipeline error: {}", e)));
    pipeline
        .parse(source)
        .await
        .unwrap_or_else(|e| fail(&format!("Parse error: {}", e)))
}

async fn handle_parse_command(config: &WikidomConfig, matches: &ArgMatches) {
    let path = matches
        .get_one::<String>("path")
        .expect("path is a required argument");
    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("html");
    let source = read_input(path);

    // Tokens come straight from the lexer, before any transform runs.
    if format == "tokens" {
        for token in tokenize(&source) {
            println!("{:?} {}", token.kind(), token);
        }
        return;
    }

    let doc = parse_document(&config.environment, &source).await;
    let formatted = match format {
        "tree" => doc.to_string(),
        "linear" => serde_json::to_string_pretty(&DomConverter::new().to_linear(&doc))
            .unwrap_or_else(|e| fail(&format!("Error formatting linear model: {}", e))),
        _ => to_html(&doc, config.environment.debug)
            .unwrap_or_else(|e| fail(&format!("Error rendering HTML: {}", e))),
    };
    println!("{}", formatted);
}

async fn handle_roundtrip_command(config: &WikidomConfig, matches: &ArgMatches) {
    let path = matches
        .get_one::<String>("path")
        .expect("path is a required argument");
    let source = read_input(path);
    let doc = parse_document(&config.environment, &source).await;
    let output = WikitextSerializer::new().serialize(&doc);

    if output == source {
        println!("roundtrip ok: {}", path);
        return;
    }

    println!("roundtrip mismatch: {}", path);
    for line in diff_lines(&source, &output) {
        println!("{}", line);
    }
    process::exit(1);
}

/// Removed source lines as `N: - line`, added output lines as `N: + line`.
/// Line numbers refer to the side the line comes from.
fn diff_lines(expected: &str, actual: &str) -> Vec<String> {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(expected, actual);
    diff.iter_all_changes()
        .filter_map(|change| {
            let (mark, index) = match change.tag() {
                ChangeTag::Equal => return None,
                ChangeTag::Delete => ('-', change.old_index()),
                ChangeTag::Insert => ('+', change.new_index()),
            };
            let line = change.value().trim_end_matches(['\r', '\n']);
            Some(format!("{}: {} {}", index.unwrap_or(0) + 1, mark, line))
        })
        .collect()
}

fn handle_serialize_command(matches: &ArgMatches) {
    let path = matches
        .get_one::<String>("path")
        .expect("path is a required argument");
    let html = read_input(path);
    let doc = from_html(&html).unwrap_or_else(|e| fail(&format!("Error reading HTML: {}", e)));
    print!("{}", WikitextSerializer::new().serialize(&doc));
}

async fn handle_fetch_command(config: &WikidomConfig, matches: &ArgMatches) {
    let title = matches
        .get_one::<String>("title")
        .expect("title is a required argument");
    let use_service = matches.get_flag("service");
    let service = ParseService::new(
        factory_for(&config.environment),
        config.environment.clone(),
        config.service.clone(),
    );
    let html = service
        .parse(title, use_service)
        .await
        .unwrap_or_else(|e| fail(&format!("Fetch failed: {}", e)));
    println!("{}", html);
}
