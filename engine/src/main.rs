//! Ecotools CLI - translate building-energy models
//!
//! # Commands
//!
//! ```bash
//! ecotools translate house.xml --to emjson -o house.json
//! ecotools validate house.xml
//! ecotools info house.xml --detailed
//! ecotools batch a.xml b.xml --to cibd22 --out-dir out/ --shared-registry
//! ecotools registry ids.json
//! ecotools dialect cibd22x
//! ```
//!
//! Exit codes: 0 success, 1 validation failure, 2 unexpected error.

use clap::{Parser, Subcommand};
use ecotools::translate::lock;
use ecotools::validation::emjson_schema;
use ecotools::{
    logging, translate_batch, BatchItem, BatchOptions, Dialect, DialectConfig,
    EngineConfig, IdRegistry, TranslationContext, TranslationFailure, TranslationResult,
    Translator,
};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

type CmdResult = Result<i32, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "ecotools")]
#[command(about = "Translate building-energy models between CIBD22X, CIBD22 and EMJSON", long_about = None)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Engine configuration JSON file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a document into another dialect
    Translate {
        /// Input document
        input: PathBuf,

        /// Target dialect (cibd22x, cibd22, emjson)
        #[arg(short, long)]
        to: Dialect,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Id registry file loaded before and saved after translation
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Validate a document and print the report
    Validate {
        /// Input document
        input: PathBuf,
    },

    /// Detect a document's format
    Info {
        /// Input document
        input: PathBuf,

        /// Also parse the model and print counts and areas
        #[arg(short, long)]
        detailed: bool,
    },

    /// Translate many documents concurrently
    Batch {
        /// Input documents
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Target dialect
        #[arg(short, long)]
        to: Dialect,

        /// Directory for the outputs
        #[arg(long)]
        out_dir: PathBuf,

        /// Share one id registry across the batch
        #[arg(long)]
        shared_registry: bool,

        /// Id registry file loaded before and saved after the batch
        #[arg(long)]
        registry: Option<PathBuf>,
    },

    /// Summarize a persisted id registry
    Registry {
        /// Registry JSON file
        file: PathBuf,
    },

    /// Print a dialect's alias table (or the EMJSON schema)
    Dialect {
        /// Dialect name
        name: Dialect,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(cli.verbose, cli.quiet);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            2
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> CmdResult {
    let config = Arc::new(load_config(cli.config.as_deref())?);

    match cli.command {
        Commands::Translate {
            input,
            to,
            output,
            registry,
        } => {
            let translator = Translator::new(config)?;
            cmd_translate(&translator, &input, to, output.as_deref(), registry.as_deref())
        }

        Commands::Validate { input } => {
            let translator = Translator::new(config)?;
            cmd_validate(&translator, &input)
        }

        Commands::Info { input, detailed } => {
            let translator = Translator::new(config)?;
            cmd_info(&translator, &input, detailed)
        }

        Commands::Batch {
            inputs,
            to,
            out_dir,
            shared_registry,
            registry,
        } => {
            let translator = Arc::new(Translator::new(config)?);
            cmd_batch(translator, &inputs, to, &out_dir, shared_registry, registry.as_deref()).await
        }

        Commands::Registry { file } => cmd_registry(&file),

        Commands::Dialect { name } => cmd_dialect(name),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(p) => EngineConfig::from_file(p)?,
        None => EngineConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

fn load_registry(path: Option<&Path>) -> Result<IdRegistry, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(p) => IdRegistry::load_or_default(p)?,
        None => IdRegistry::new(),
    })
}

fn cmd_translate(
    translator: &Translator,
    input: &Path,
    to: Dialect,
    output: Option<&Path>,
    registry_path: Option<&Path>,
) -> CmdResult {
    eprintln!("📄 Translating: {} → {}", input.display(), to);

    let registry = load_registry(registry_path)?;
    let mut ctx = TranslationContext::with_registry(registry, translator.config_arc());

    let result = match translator.translate_file(input, Some(to), &mut ctx) {
        Ok(result) => result,
        Err(failure) => {
            report_failure(&failure);
            return Ok(failure.exit_code());
        }
    };

    print_summary(&result);
    if let Some(text) = &result.output {
        write_output(text, output)?;
    }
    if let Some(path) = registry_path {
        ctx.into_registry().save(path)?;
        eprintln!("   💾 Registry saved to: {}", path.display());
    }
    Ok(result.exit_code())
}

fn cmd_validate(translator: &Translator, input: &Path) -> CmdResult {
    eprintln!("✔️  Validating: {}", input.display());

    let mut ctx = translator.context();
    let result = match translator.translate_file(input, None, &mut ctx) {
        Ok(result) => result,
        Err(failure) => {
            report_failure(&failure);
            return Ok(failure.exit_code());
        }
    };

    print_summary(&result);
    println!("{}", serde_json::to_string_pretty(&result.source_validation)?);
    Ok(result.exit_code())
}

fn cmd_info(translator: &Translator, input: &Path, detailed: bool) -> CmdResult {
    let decoded = ecotools::parser::read_file(input)?;
    let info = translator.detector().detect_text(&decoded.text)?;

    let mut report = json!({
        "format": info.format,
        "version": info.version,
        "building_type": info.building_type,
        "ruleset": info.ruleset,
        "confidence": info.confidence,
        "encoding": decoded.encoding,
    });

    if detailed {
        let mut ctx = translator.context();
        match translator.translate(decoded.text.as_bytes(), None, &mut ctx) {
            Ok(result) => {
                let model = &result.model;
                report["counts"] = json!(model.counts());
                report["total_floor_area_m2"] = json!(model.total_floor_area_m2());
                report["window_area_m2"] = json!(model.window_area_m2());
                report["window_to_wall_ratio"] = json!(model.window_to_wall_ratio());
                report["scores"] = json!(info.scores);
            }
            Err(failure) => {
                report_failure(&failure);
                return Ok(failure.exit_code());
            }
        }
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

async fn cmd_batch(
    translator: Arc<Translator>,
    inputs: &[PathBuf],
    to: Dialect,
    out_dir: &Path,
    shared: bool,
    registry_path: Option<&Path>,
) -> CmdResult {
    eprintln!("📦 Batch: {} documents → {}", inputs.len(), to);
    fs::create_dir_all(out_dir)?;

    let mut worst = 0;
    let mut items = Vec::with_capacity(inputs.len());
    for path in inputs {
        match fs::read(path) {
            Ok(bytes) => items.push(BatchItem::new(path.display().to_string(), bytes)),
            Err(e) => {
                eprintln!("   ❌ {}: {}", path.display(), e);
                worst = 2;
            }
        }
    }

    let shared_registry = if shared || registry_path.is_some() {
        Some(Arc::new(Mutex::new(load_registry(registry_path)?)))
    } else {
        None
    };
    let options = BatchOptions {
        target: Some(to),
        shared_registry: shared_registry.clone(),
    };

    let outcomes = translate_batch(translator, items, options).await;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => {
                let stem = Path::new(&outcome.name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_else(|| "output".to_string());
                let target = out_dir.join(format!("{}.{}", stem, to.extension()));
                if let Some(text) = &result.output {
                    fs::write(&target, text)?;
                }
                let mark = if result.exit_code() == 0 { "✅" } else { "⚠️ " };
                eprintln!(
                    "   {} {} → {} ({} errors, {} warnings)",
                    mark,
                    outcome.name,
                    target.display(),
                    result.target_validation.error_count(),
                    result.target_validation.warning_count()
                );
            }
            Err(failure) => {
                eprintln!("   ❌ {}: {}", outcome.name, failure);
            }
        }
        worst = worst.max(outcome.exit_code());
    }

    if let (Some(registry), Some(path)) = (shared_registry, registry_path) {
        lock(&registry).save(path)?;
        eprintln!("   💾 Registry saved to: {}", path.display());
    }

    eprintln!("\n✨ Done (exit code {})", worst);
    Ok(worst)
}

fn cmd_registry(file: &Path) -> CmdResult {
    let registry = IdRegistry::load(file)?;
    let summary = json!({
        "file": file.display().to_string(),
        "ids": registry.len(),
        "by_prefix": registry.prefix_counts(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(0)
}

fn cmd_dialect(dialect: Dialect) -> CmdResult {
    let json = if dialect.is_xml() {
        DialectConfig::builtin(dialect)?.to_json()?
    } else {
        serde_json::to_string_pretty(emjson_schema()?)?
    };
    println!("{}", json);
    Ok(0)
}

fn print_summary(result: &TranslationResult) {
    let info = &result.source_format;
    eprintln!(
        "   Format: {} {} ({}, confidence {:.2})",
        info.format, info.version, info.building_type, info.confidence
    );
    for (bucket, n) in result.model.counts().iter().filter(|(_, n)| **n > 0) {
        eprintln!("   {}: {}", bucket, n);
    }

    let report = &result.target_validation;
    if report.is_valid {
        eprintln!("   ✅ Valid ({} warnings)", report.warning_count());
    } else {
        eprintln!("   ❌ Invalid: {} errors, {} warnings", report.error_count(), report.warning_count());
        for d in report.errors.iter().take(10) {
            eprintln!("     - [{}] {}", d.code, d.message);
        }
    }
}

fn report_failure(failure: &TranslationFailure) {
    eprintln!("❌ {}", failure);
    for d in failure.diagnostics.iter().filter(|d| !d.code.starts_with("I-")) {
        eprintln!("   - [{}] {}", d.code, d.message);
    }
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
