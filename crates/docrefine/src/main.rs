use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use docrefine_common::logger::{self, LogOutput};
use docrefine_common::AppConfig;
use docrefine_llm::{
    create_refine_documents_chain, question_prompts, split_into_documents, summarize_prompts, CombineDocuments,
    Document, ExtraInputs, LanguageModel, OllamaClient, RefineChainConfig, RefineDocumentsChain, RefineOutput,
    SUMMARIZE_DOCUMENT_VARIABLE, SUMMARIZE_RESPONSE_VARIABLE,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Find project root by looking for .git directory
fn find_project_root() -> Option<PathBuf> {
    let mut current_dir = std::env::current_dir().ok()?;

    loop {
        if current_dir.join(".git").exists() {
            return Some(current_dir);
        }

        if !current_dir.pop() {
            break;
        }
    }

    None
}

/// Load .env file from project root
fn load_dotenv_from_project_root() {
    if let Some(root) = find_project_root() {
        let env_path = root.join(".env");
        if env_path.exists() {
            dotenv::from_path(&env_path).ok();
        }
    } else {
        dotenv::dotenv().ok();
    }
}

#[derive(Parser)]
#[command(name = "docrefine")]
#[command(about = "DocRefine - summarize or query long documents one chunk at a time", long_about = None)]
struct Cli {
    /// Config file (defaults to ./docrefine.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured model
    #[arg(long, global = true)]
    model: Option<String>,

    /// Stream generations from Ollama (NDJSON)
    #[arg(long, global = true)]
    stream: bool,

    /// Log to stderr only, without a log file
    #[arg(long, global = true)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize files with the refine strategy
    Summarize {
        #[command(flatten)]
        run: RunArgs,

        /// Extra prompt inputs passed to every step
        #[arg(long = "input", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        inputs: Vec<(String, String)>,
    },

    /// Answer a question over files with the refine strategy
    Ask {
        /// Question to answer
        question: String,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Check that the Ollama server is reachable
    Check,
}

#[derive(Args)]
struct RunArgs {
    /// Input text files, processed in the given order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Override the configured chunk size (approximate tokens)
    #[arg(long)]
    chunk_tokens: Option<usize>,

    /// Print the output of every step
    #[arg(long)]
    intermediate: bool,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("invalid KEY=VALUE: no `=` or empty key in `{}`", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    load_dotenv_from_project_root();

    let mut config = AppConfig::load_from(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config.llm_model = model.clone();
    }
    if cli.stream {
        config.stream = true;
    }

    logger::init(&config, &LogOutput::from_config(&config, cli.no_log_file))?;

    let client = Arc::new(OllamaClient::from_config(&config)?);

    match cli.command {
        Commands::Summarize { run, inputs } => {
            let documents = load_documents(&run, &config).await?;
            let (initial, refine) = summarize_prompts();
            let chain = RefineDocumentsChain::new(
                client,
                initial,
                refine,
                RefineChainConfig::default()
                    .with_document_variable_name(SUMMARIZE_DOCUMENT_VARIABLE)
                    .with_initial_response_name(SUMMARIZE_RESPONSE_VARIABLE)
                    .with_intermediate_steps(run.intermediate),
            )?;

            let extra: ExtraInputs = inputs.into_iter().collect();
            let result = run_until_interrupted(&chain, &documents, &extra).await?;
            print_result(&result, run.json)?;
        }
        Commands::Ask { question, run } => {
            let documents = load_documents(&run, &config).await?;
            let (initial, refine) = question_prompts();
            let pipeline = create_refine_documents_chain(client, initial, refine, None)?;

            let extra: ExtraInputs = [("question".to_string(), question)].into_iter().collect();
            let mut result = run_until_interrupted(&pipeline, &documents, &extra).await?;
            if !run.intermediate {
                result.intermediate_steps = None;
            }
            print_result(&result, run.json)?;
        }
        Commands::Check => {
            let reachable = client.test_connection().await.unwrap_or(false);
            if !reachable {
                bail!("Ollama server at {} is not reachable", client.base_url());
            }
            println!("Ollama server at {} is reachable (model: {})", client.base_url(), client.model_name());
        }
    }

    Ok(())
}

/// Read and chunk the input files into one ordered document list
async fn load_documents(run: &RunArgs, config: &AppConfig) -> Result<Vec<Document>> {
    let chunk_tokens = run.chunk_tokens.unwrap_or(config.chunk_tokens);
    if chunk_tokens <= config.chunk_overlap {
        bail!(
            "chunk size ({}) must be larger than the configured overlap ({})",
            chunk_tokens,
            config.chunk_overlap
        );
    }

    let mut documents = Vec::new();
    for path in &run.files {
        documents.extend(load_file(path, chunk_tokens, config.chunk_overlap).await?);
    }

    if documents.is_empty() {
        bail!("input files contain no text");
    }

    tracing::info!("Loaded {} documents from {} files", documents.len(), run.files.len());
    Ok(documents)
}

async fn load_file(path: &Path, chunk_tokens: usize, overlap: usize) -> Result<Vec<Document>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let documents = split_into_documents(&text, &path.display().to_string(), chunk_tokens, overlap);
    tracing::debug!("{}: {} chunks", path.display(), documents.len());
    Ok(documents)
}

/// Run the chain, cancelling the in-flight step on Ctrl-C
async fn run_until_interrupted(
    chain: &dyn CombineDocuments,
    documents: &[Document],
    extra: &ExtraInputs,
) -> Result<RefineOutput> {
    let token = CancellationToken::new();
    let canceller = token.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling refine run");
            canceller.cancel();
        }
    });

    let result = chain.combine_docs_cancellable(documents, extra, token).await;
    signal.abort();

    Ok(result?)
}

fn print_result(result: &RefineOutput, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    if let Some(steps) = &result.intermediate_steps {
        for (i, step) in steps.iter().enumerate() {
            println!("--- step {} ---\n{}\n", i + 1, step);
        }
        println!("--- final ---");
    }
    println!("{}", result.output);
    Ok(())
}
