use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use klartext::{Context, KnowledgeBase, Planner, QueryParser, UnderstandingEngine};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "klartext")]
#[command(about = "Compiles free-form German report requests into parameterized SQL plans")]
#[command(version)]
struct Args {
    /// Path to a directory of report template JSON files.
    /// Falls back to KLARTEXT_KNOWLEDGE_DIR, then to the built-in knowledge base.
    #[arg(short, long, global = true)]
    knowledge_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and score a sentence, print the verdict as JSON
    Understand {
        /// The report request in natural language
        text: String,
    },
    /// Compile a sentence into a SQL plan
    Plan {
        /// The report request in natural language
        text: String,

        /// Template name; defaults to the template matching the detected context
        #[arg(short, long)]
        template: Option<String>,
    },
    /// List the available report templates and their columns
    Templates,
}

fn load_knowledge(dir: &Option<PathBuf>) -> Result<KnowledgeBase> {
    let dir = dir
        .clone()
        .or_else(|| std::env::var("KLARTEXT_KNOWLEDGE_DIR").ok().map(PathBuf::from));
    match dir {
        Some(dir) => {
            info!("Loading knowledge base from {:?}", dir);
            Ok(KnowledgeBase::load(&dir)?)
        }
        None => Ok(KnowledgeBase::builtin()),
    }
}

fn template_for_context(context: Context) -> Option<&'static str> {
    match context {
        Context::Contracts => Some("vertraege"),
        Context::Claims => Some("schaeden"),
        Context::Unknown => None,
    }
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let knowledge = load_knowledge(&args.knowledge_dir)?;
    let engine = UnderstandingEngine::new(QueryParser::default())
        .with_vocabulary(knowledge.vocabulary());

    match args.command {
        Commands::Understand { text } => {
            let result = engine.understand(&text);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Plan { text, template } => {
            let result = engine.understand(&text);
            if !result.is_actionable() {
                eprintln!(
                    "Eingabe nicht eindeutig genug (confidence {:.1}). Beispiele:",
                    result.confidence
                );
                for suggestion in &result.suggestions {
                    eprintln!("  - {}", suggestion);
                }
                std::process::exit(1);
            }

            let name = match template.as_deref() {
                Some(name) => name,
                None => match template_for_context(result.ir.context) {
                    Some(name) => name,
                    None => bail!("no template for context {:?}", result.ir.context),
                },
            };
            let Some(template) = knowledge.template(name) else {
                bail!("unknown template '{}'", name);
            };

            let plan = Planner::new(template).plan(&result.ir)?;
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        Commands::Templates => {
            for template in knowledge.templates() {
                println!("{}", template.name);
                for column in &template.columns {
                    println!("  {} -> {}", column.canonical_key, column.sql_expression);
                }
            }
        }
    }
    Ok(())
}
