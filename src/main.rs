use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::PathBuf;

use gemini_chat_rag::chat::call_gemini_chat;
use gemini_chat_rag::chunking::TextSplitter;
use gemini_chat_rag::database::{QdrantConfig, QdrantStore};
use gemini_chat_rag::document::{Document, DocumentSource, FileSource};
use gemini_chat_rag::gemini::{GeminiClient, GeminiConfig};
use gemini_chat_rag::messages::parse_openai_messages;
use gemini_chat_rag::models::gemini_model_name;
use gemini_chat_rag::rag::RagPipeline;
use gemini_chat_rag::retriever::VectorRetriever;
use gemini_chat_rag::sitemap::{SitemapLoader, DEFAULT_SITEMAP_URL};
use gemini_chat_rag::store::{LocalStore, VectorStore};

/// OpenAI-style chat and documentation Q&A on top of Gemini
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer questions from an indexed sitemap or file
    Ask {
        /// Question to answer, omit for an interactive session
        question: Option<String>,

        /// Sitemap to index when no index exists yet
        #[arg(long)]
        sitemap: Option<String>,

        /// Index a local text or PDF file instead of a sitemap
        #[arg(long, conflicts_with = "sitemap")]
        file: Option<PathBuf>,

        /// Where the local index is persisted
        #[arg(long)]
        index_path: Option<PathBuf>,

        /// Vector store backend
        #[arg(long, value_enum, default_value_t = StoreKind::Local)]
        store: StoreKind,
    },

    /// Send a JSON array of OpenAI chat messages to Gemini
    Chat {
        /// Path to the messages file
        #[arg(long)]
        messages: PathBuf,

        /// OpenAI model name, translated to its Gemini equivalent
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,

        #[arg(long, default_value_t = 0.0)]
        temperature: f32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StoreKind {
    /// JSON file on local disk
    Local,
    /// Qdrant collection, needs QDRANT_URL
    Qdrant,
}

/// Where documents come from when the index has to be built
enum Source {
    Sitemap(SitemapLoader),
    File(FileSource),
}

impl DocumentSource for Source {
    async fn load(&self) -> Result<Vec<Document>> {
        match self {
            Source::Sitemap(loader) => loader.load().await,
            Source::File(file) => file.load().await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let gemini_config = GeminiConfig::from_env().context("Failed to configure Gemini")?;
    let gemini = GeminiClient::new(gemini_config);
    debug!("Gemini endpoint: {}", gemini.config().base_url);

    match args.command {
        Command::Ask {
            question,
            sitemap,
            file,
            index_path,
            store,
        } => {
            let (source, splitter, index_name) = match file {
                Some(path) => {
                    let name = path.display().to_string();
                    // local files keep a little overlap between chunks
                    (Source::File(FileSource::new(path)), TextSplitter::new(500, 50), name)
                }
                None => {
                    let url = sitemap.unwrap_or_else(|| DEFAULT_SITEMAP_URL.to_string());
                    let loader = SitemapLoader::new(url.clone()).continue_on_failure(true);
                    (Source::Sitemap(loader), TextSplitter::default(), url)
                }
            };

            match store {
                StoreKind::Local => {
                    let store = LocalStore::new(index_path.unwrap_or_else(LocalStore::default_path));
                    info!("Using local index at {}", store.persist_path().display());
                    ask(&gemini, &source, &splitter, store, question).await
                }
                StoreKind::Qdrant => {
                    let qdrant_config = QdrantConfig::from_env()?;
                    let store = QdrantStore::new(qdrant_config, &index_name)
                        .context("Failed to initialize Qdrant client")?;
                    info!("Using Qdrant collection {}", store.collection_name());
                    ask(&gemini, &source, &splitter, store, question).await
                }
            }
        }
        Command::Chat {
            messages,
            model,
            temperature,
        } => {
            let json = fs::read_to_string(&messages)
                .with_context(|| format!("Failed to read {}", messages.display()))?;
            let turns = parse_openai_messages(&json)?;
            let gemini_model = gemini_model_name(&model);
            info!("Using {} for {}", gemini_model, model);

            let reply = call_gemini_chat(&gemini, gemini_model, &turns, temperature).await?;
            println!("{}", reply);
            Ok(())
        }
    }
}

async fn ask<S: VectorStore>(
    gemini: &GeminiClient,
    source: &Source,
    splitter: &TextSplitter,
    store: S,
    question: Option<String>,
) -> Result<()> {
    let retriever = VectorRetriever::build_or_load(source, splitter, gemini, store)
        .await
        .context("Failed to prepare the vector index")?;
    let pipeline = RagPipeline::new(gemini, retriever);

    match question {
        Some(question) => {
            let answer = pipeline.answer(&question).await?;
            println!("{}", answer);
        }
        None => {
            let stdin = io::stdin();
            pipeline
                .run_query_loop(stdin.lock(), io::stdout())
                .await
                .context("Error in query loop")?;
        }
    }

    Ok(())
}
