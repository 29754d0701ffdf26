// ABOUTME: CLI for running the adsift detection engine over saved HTML files.
// ABOUTME: Subcommands detect ads, check rule set files and print per-node debug info as JSON.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use adsift_engine::{
    from_path, load_default_rule_set, AdCandidate, ConfigValidator, Detector, DocumentTree,
    HtmlTree, MetricsCollector, RuleSet,
};
use anyhow::{anyhow, bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Detect advertisements in saved HTML pages with declarative rule sets.
#[derive(Parser, Debug)]
#[command(name = "adsift")]
#[command(about = "Rule-driven ad detection over HTML files", long_about = None)]
struct Args {
    /// Raise log verbosity (-v debug, -vv trace). Overrides RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Output compact JSON instead of pretty.
    #[arg(long, default_value_t = false, global = true)]
    compact: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a detection pass over each HTML file and print accepted candidates.
    Detect {
        /// Rule set JSON file. Defaults to the built-in generic rule set.
        #[arg(long)]
        rules: Option<PathBuf>,

        /// Metrics snapshot to load, update and write back.
        #[arg(long)]
        metrics: Option<PathBuf>,

        /// HTML files. Use "-" to read one document from stdin.
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Validate rule set files. Exits non-zero if any has errors.
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Explain how a pass treats every element matching a selector.
    Debug {
        /// Rule set JSON file. Defaults to the built-in generic rule set.
        #[arg(long)]
        rules: Option<PathBuf>,

        /// CSS selector picking the elements to explain.
        #[arg(long)]
        selector: String,

        /// HTML file, or "-" for stdin.
        file: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let output = match args.command {
        Command::Detect {
            rules,
            metrics,
            files,
        } => run_detect(rules.as_deref(), metrics.as_deref(), &files)?,
        Command::Check { files } => run_check(&files, args.compact)?,
        Command::Debug {
            rules,
            selector,
            file,
        } => run_debug(rules.as_deref(), &selector, &file)?,
    };

    print_json(&output, args.compact)
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into()),
        1 => "debug".into(),
        _ => "trace".into(),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn print_json(value: &Value, compact: bool) -> Result<()> {
    if compact {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn load_rules(path: Option<&Path>) -> Result<RuleSet> {
    match path {
        Some(p) => Ok(from_path(p)?),
        None => Ok(load_default_rule_set()),
    }
}

fn load_html(target: &str) -> Result<HtmlTree> {
    if target == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        return Ok(HtmlTree::parse_document(&buf));
    }

    let path = PathBuf::from(target);
    if !path.exists() {
        return Err(anyhow!("file not found: {}", target));
    }
    let source = fs::read_to_string(&path).with_context(|| format!("reading {}", target))?;
    Ok(HtmlTree::parse_document(&source))
}

fn candidate_json<T: DocumentTree>(tree: &T, candidate: &AdCandidate<T::Node>) -> Value {
    let m = &candidate.container_match;
    json!({
        "node": tree.describe(candidate.node),
        "ruleId": m.rule_id,
        "score": m.score,
        "label": m.label_node.map(|l| tree.describe(l)),
        "labelConfidence": m.label_confidence,
        "fields": candidate.fields,
        "validation": candidate.validation,
        "placement": candidate.placement,
        "detectedAt": candidate.detected_at,
    })
}

fn run_detect(rules: Option<&Path>, metrics_path: Option<&Path>, files: &[String]) -> Result<Value> {
    let detector = Detector::builder().build(load_rules(rules)?)?;
    let platform = detector.rule_set().platform_key().to_string();
    let mut metrics = match metrics_path {
        Some(p) => Some(MetricsCollector::load(p, &platform)?),
        None => None,
    };

    let mut documents = Vec::new();
    let mut detections = 0;
    for file in files {
        match load_html(file) {
            Ok(tree) => {
                let found = match metrics.as_mut() {
                    Some(m) => detector.detect_with_metrics(&tree, m),
                    None => detector.detect(&tree),
                };
                detections += found.len();
                let candidates: Vec<Value> = found.iter().map(|c| candidate_json(&tree, c)).collect();
                documents.push(json!({
                    "file": file,
                    "ok": true,
                    "candidates": candidates,
                    "error": null
                }));
            }
            Err(err) => {
                warn!(file = %file, error = %err, "skipping document");
                documents.push(json!({
                    "file": file,
                    "ok": false,
                    "candidates": [],
                    "error": err.to_string()
                }));
            }
        }
    }

    if let (Some(m), Some(p)) = (metrics.as_ref(), metrics_path) {
        m.flush(p)?;
    }

    Ok(json!({
        "ruleSet": detector.rule_set().id,
        "documents": documents,
        "totalDocuments": files.len(),
        "detections": detections
    }))
}

fn run_check(files: &[PathBuf], compact: bool) -> Result<Value> {
    let validator = ConfigValidator::new();
    let mut reports = Vec::new();
    let mut failed = 0;

    for file in files {
        let report = fs::read_to_string(file)
            .map_err(anyhow::Error::new)
            .and_then(|s| serde_json::from_str::<Value>(&s).map_err(anyhow::Error::new))
            .map(|value| validator.validate_value(&value));
        let entry = match report {
            Ok(report) => {
                if !report.valid {
                    failed += 1;
                }
                json!({
                    "file": file.display().to_string(),
                    "valid": report.valid,
                    "errors": report.errors,
                    "warnings": report.warnings
                })
            }
            Err(err) => {
                failed += 1;
                json!({
                    "file": file.display().to_string(),
                    "valid": false,
                    "errors": [err.to_string()],
                    "warnings": []
                })
            }
        };
        reports.push(entry);
    }

    let output = json!({ "reports": reports, "failed": failed });
    if failed > 0 {
        print_json(&output, compact)?;
        bail!("{} of {} rule set(s) failed validation", failed, files.len());
    }
    Ok(output)
}

fn run_debug(rules: Option<&Path>, selector: &str, file: &str) -> Result<Value> {
    let detector = Detector::builder().build(load_rules(rules)?)?;
    let tree = load_html(file)?;
    let nodes = tree.query(selector)?;
    if nodes.is_empty() {
        bail!("selector {:?} matched nothing in {}", selector, file);
    }
    let infos = nodes
        .into_iter()
        .map(|node| serde_json::to_value(detector.debug_info(&tree, node)))
        .collect::<Result<Vec<Value>, _>>()?;
    Ok(Value::Array(infos))
}
