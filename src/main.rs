use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use radiapp::config::{self, DraftingConfig};
use radiapp::good_examples::GoodExampleStore;
use radiapp::pipeline::drafting::{
    DraftRequest, ImageInput, Modality, ReportDrafter, TemplateSource,
};
use radiapp::pipeline::inference::{InferenceClient, InferenceSession, OllamaVisionClient};
use radiapp::templates;

#[derive(Parser, Debug)]
#[command(
    name = "radiapp",
    version,
    about = "Draft radiology reports from an image and a clinician template"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Draft a report for one image.
    Generate(GenerateArgs),
    /// List the templates in the data directory.
    Templates,
    /// Import a .txt or .json template into the data directory.
    ImportTemplate(ImportArgs),
    /// Append an approved edit JSON to the good-example store.
    AddExample(AddExampleArgs),
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[arg(long)]
    image: PathBuf,
    /// Template file name (looked up in the templates directory) or path.
    #[arg(long, default_value = templates::DEFAULT_TEMPLATE_FILE)]
    template: PathBuf,
    #[arg(long, value_parser = parse_modality)]
    modality: Modality,
    #[arg(long)]
    region: String,
    #[arg(long, default_value = "")]
    indication: String,
    #[arg(long, default_value = "")]
    extras: String,
    /// Defaults to the configured token budget.
    #[arg(long)]
    max_new_tokens: Option<u32>,
    /// Raise the token ceiling to the unlimited bound.
    #[arg(long)]
    unlimited: bool,
    /// Print the full outcome as JSON instead of the report text.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ImportArgs {
    path: PathBuf,
    /// File name to store under; defaults to the template name.
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args, Debug)]
struct AddExampleArgs {
    #[arg(long)]
    label: String,
    /// File holding the edit JSON object.
    #[arg(long)]
    json: PathBuf,
}

fn parse_modality(s: &str) -> std::result::Result<Modality, String> {
    s.parse::<Modality>().map_err(|e| e.to_string())
}

fn main() -> ExitCode {
    // .env may set RUST_LOG, so it is read before the subscriber exists and
    // reported right after.
    let env_file = config::load_env_file();
    radiapp::init_tracing();
    env_file.log();

    let cli = Cli::parse();
    let config = DraftingConfig::from_env();
    tracing::debug!(
        version = config::APP_VERSION,
        data_dir = %config.data_dir.display(),
        model = %config.model,
        "Configuration loaded"
    );

    let result = match cli.command {
        Commands::Generate(args) => run_generate(&config, args),
        Commands::Templates => run_templates(&config),
        Commands::ImportTemplate(args) => run_import(&config, args),
        Commands::AddExample(args) => run_add_example(&config, args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_generate(config: &DraftingConfig, args: GenerateArgs) -> Result<ExitCode> {
    templates::ensure_default_template(&config.templates_dir())?;

    let image = ImageInput::from_path(&args.image)
        .with_context(|| format!("cannot read image {}", args.image.display()))?;

    let loader_config = config.clone();
    let session = Arc::new(InferenceSession::new(Box::new(move || {
        OllamaVisionClient::from_config(&loader_config)
            .map(|client| Box::new(client) as Box<dyn InferenceClient>)
    })));
    let drafter = ReportDrafter::new(config.clone(), session);

    let request = DraftRequest {
        image: Some(image),
        modality: args.modality.code().to_string(),
        region: args.region,
        indication: args.indication,
        extras: args.extras,
        template: TemplateSource::File(args.template),
        max_new_tokens: args.max_new_tokens.unwrap_or(config.default_max_tokens),
        unlimited: args.unlimited,
    };

    match drafter.generate(&request) {
        Ok(outcome) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{}", outcome.report);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            } else {
                eprintln!("{}", failure.status_message());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_templates(config: &DraftingConfig) -> Result<ExitCode> {
    let dir = config.templates_dir();
    templates::ensure_default_template(&dir)?;
    for name in templates::list_templates(&dir)? {
        println!("{name}");
    }
    Ok(ExitCode::SUCCESS)
}

fn run_import(config: &DraftingConfig, args: ImportArgs) -> Result<ExitCode> {
    let template = templates::import_template(&args.path)?;
    let file_name = args.name.unwrap_or_else(|| template.name.clone());
    if file_name.trim().is_empty() {
        return Err(anyhow!("template has no name; pass --name"));
    }
    let written = templates::write_template(&config.templates_dir(), &file_name, &template)?;
    println!("✅ Plantilla guardada: {written}");
    Ok(ExitCode::SUCCESS)
}

fn run_add_example(config: &DraftingConfig, args: AddExampleArgs) -> Result<ExitCode> {
    let raw = std::fs::read_to_string(&args.json)
        .with_context(|| format!("cannot read {}", args.json.display()))?;
    let example: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", args.json.display()))?;
    if !example.is_object() {
        return Err(anyhow!("{} must hold a JSON object", args.json.display()));
    }

    let entry = serde_json::json!({ "label": args.label, "example": example });
    let store = GoodExampleStore::new(config.good_examples_path());
    let saved = store.append(&entry)?;
    println!("✅ Ejemplo guardado: {}", saved.label);
    Ok(ExitCode::SUCCESS)
}
