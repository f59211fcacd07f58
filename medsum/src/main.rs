use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use medsum::{Config, Pipeline, ProcessOptions};

#[derive(Parser)]
#[command(name = "medsum")]
#[command(about = "OCR and summarize scanned medical documents (Hebrew/English)")]
struct Args {
    /// Documents to process (images or PDFs)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Custom instruction prompt (defaults to the built-in
    /// occupational-medicine prompt)
    #[arg(long)]
    prompt: Option<String>,

    /// Read the instruction prompt from a file
    #[arg(long, conflicts_with = "prompt")]
    prompt_file: Option<PathBuf>,

    /// Comma-separated OCR engines to use, in order
    /// (tesseract, dicta, abbyy, vision)
    #[arg(long)]
    engines: Option<String>,

    /// Language hint passed to the OCR engines (e.g. "heb+eng")
    #[arg(long)]
    language: Option<String>,

    /// Maximum characters per summarization chunk
    #[arg(long)]
    max_chunk_chars: Option<usize>,

    /// Maximum tokens generated per chunk
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Concatenate all documents and produce one combined summary
    #[arg(long)]
    combined: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medsum=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    if config.llm.is_none() {
        tracing::warn!("LLM_MODEL is not set - OCR will run but summarization will fail");
    }

    let pipeline = Pipeline::new(&config);

    let instruction_prompt = match (&args.prompt, &args.prompt_file) {
        (Some(prompt), _) => Some(prompt.clone()),
        (None, Some(path)) => Some(std::fs::read_to_string(path)?),
        (None, None) => None,
    };

    let options = ProcessOptions {
        engines: args.engines.as_ref().map(|list| {
            list.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }),
        language_hint: args.language.clone(),
        instruction_prompt,
        max_chunk_chars: args.max_chunk_chars,
        max_tokens: args.max_tokens,
    };

    // Ctrl-C stops generation before the next chunk; completed chunk
    // summaries are kept and reported as a partial result.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing current chunk");
                cancel.cancel();
            }
        });
    }

    let mut documents = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        documents.push((bytes, filename));
    }

    let all_succeeded = if args.combined {
        let report = pipeline
            .process_many(&documents, &options, Some(&cancel))
            .await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        report.success
    } else {
        let mut reports = Vec::with_capacity(documents.len());
        for (bytes, filename) in &documents {
            let report = pipeline
                .process(bytes, filename, &options, Some(&cancel))
                .await;
            reports.push(report);
        }
        let ok = reports.iter().all(|r| r.success);
        println!("{}", serde_json::to_string_pretty(&reports)?);
        ok
    };

    if !all_succeeded {
        std::process::exit(1);
    }

    Ok(())
}
