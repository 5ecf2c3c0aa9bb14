// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use multimodal_rag::adaptors::elasticsearch::MigrationOptions;
use multimodal_rag::usecases::agent::workflow_mermaid;
use multimodal_rag::usecases::document_indexing::DiscoveredDocument;
use multimodal_rag::usecases::dtos::SearchResponse;
use multimodal_rag::usecases::{ConversationalAgent, SearchOptions};
use multimodal_rag::utils::logging::{
    format_error, format_info, format_step, format_success, format_warning,
};
use multimodal_rag::utils::{OperationTimer, Validator};
use multimodal_rag::{Config, Container};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "multimodal_rag")]
#[command(author = "cipher")]
#[command(version)]
#[command(about = "Multimodal RAG over Docling documents with Elasticsearch, Gemini and Telegram", long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SearchMode {
    Text,
    Vector,
    Hybrid,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot until Ctrl-C or SIGTERM
    Bot,

    /// Create the index with its mapping if it does not exist
    InitIndex,

    /// Index Docling JSON documents
    Index {
        /// Directory with one subdirectory per document (defaults to indexing.directory)
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Index a single Docling JSON file instead of a directory
        #[arg(short, long, conflicts_with = "directory")]
        file: Option<PathBuf>,

        /// Document id for --file (defaults to the file stem)
        #[arg(long, requires = "file")]
        document_id: Option<String>,

        #[arg(long)]
        no_embeddings: bool,

        #[arg(long)]
        no_progress: bool,
    },

    /// Search chunks
    Search {
        query: String,

        #[arg(short, long, value_enum, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,

        #[arg(short, long)]
        size: Option<usize>,

        /// Restrict to one document
        #[arg(long)]
        document_id: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Search documents by name or filename
    SearchDocuments {
        query: String,

        #[arg(short, long)]
        size: Option<usize>,
    },

    /// Print a stored document record
    Get { document_id: String },

    /// Delete a document record, or a chunk with --chunk
    Delete {
        id: String,

        #[arg(long)]
        chunk: bool,
    },

    /// Ask the agent a single question
    Ask { question: String },

    /// Backfill chunk.chunk_id on chunks indexed without one
    MigrateChunkIds {
        #[arg(long)]
        dry_run: bool,

        #[arg(long, default_value_t = 100)]
        batch_size: usize,

        #[arg(long)]
        no_verify: bool,
    },

    /// Check Elasticsearch, Gemini and Telegram
    Health,

    /// Print or save the agent workflow as a Mermaid graph
    WorkflowGraph {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    multimodal_rag::utils::logging::init_logger(cli.color, cli.verbose);

    let config = if cli.config.exists() {
        info!("Loading configuration from: {}", cli.config.display());
        Config::load(Some(cli.config.as_path())).context("Failed to load configuration")?
    } else {
        warn!(
            "Config file {} not found, using environment and defaults",
            cli.config.display()
        );
        Config::load(None).unwrap_or_else(|e| {
            warn!("Falling back to built-in defaults: {}", e);
            Config::default_config()
        })
    };

    if let Commands::WorkflowGraph { output } = &cli.command {
        return cmd_workflow_graph(output.as_deref());
    }

    let container = Container::new(config).context("Failed to initialize services")?;

    match cli.command {
        Commands::Bot => cmd_bot(&container).await?,
        Commands::InitIndex => cmd_init_index(&container).await?,
        Commands::Index {
            directory,
            file,
            document_id,
            no_embeddings,
            no_progress,
        } => {
            cmd_index(
                &container,
                directory,
                file,
                document_id,
                !no_embeddings,
                !no_progress,
            )
            .await?
        }
        Commands::Search {
            query,
            mode,
            size,
            document_id,
            json,
        } => cmd_search(&container, &query, mode, size, document_id, json).await?,
        Commands::SearchDocuments { query, size } => {
            cmd_search_documents(&container, &query, size).await?
        }
        Commands::Get { document_id } => cmd_get(&container, &document_id).await?,
        Commands::Delete { id, chunk } => cmd_delete(&container, &id, chunk).await?,
        Commands::Ask { question } => cmd_ask(&container, &question).await?,
        Commands::MigrateChunkIds {
            dry_run,
            batch_size,
            no_verify,
        } => cmd_migrate(&container, dry_run, batch_size, !no_verify).await?,
        Commands::Health => cmd_health(&container).await?,
        Commands::WorkflowGraph { .. } => {}
    }

    Ok(())
}

async fn cmd_bot(container: &Container) -> Result<()> {
    let service = container
        .telegram_bot_service()
        .context("Failed to create Telegram bot service")?;

    container
        .repository()
        .initialize_indices()
        .await
        .context("Failed to initialize index")?;

    let shutdown = service.shutdown_token();
    tokio::spawn(wait_for_signal(shutdown));

    info!("Starting Telegram bot");
    service.run().await.context("Telegram bot stopped with an error")?;
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C"),
                    _ = terminate.recv() => info!("Received SIGTERM"),
                }
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl-C");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C");
    }
    shutdown.cancel();
}

async fn cmd_init_index(container: &Container) -> Result<()> {
    container
        .repository()
        .initialize_indices()
        .await
        .context("Failed to initialize index")?;
    println!(
        "{}",
        format_success(&format!(
            "Index '{}' is ready",
            container.config().elasticsearch.index_name
        ))
    );
    Ok(())
}

async fn cmd_index(
    container: &Container,
    directory: Option<PathBuf>,
    file: Option<PathBuf>,
    document_id: Option<String>,
    generate_embeddings: bool,
    show_progress: bool,
) -> Result<()> {
    let generate_embeddings = generate_embeddings
        && container.config().indexing.generate_embeddings
        && container.embedding_service().is_some();
    if !generate_embeddings {
        println!(
            "{}",
            format_warning("Indexing without embeddings; vector search will not find these chunks")
        );
    }

    println!("{}", format_step(1, 2, "Preparing index"));
    container
        .repository()
        .initialize_indices()
        .await
        .context("Failed to initialize index")?;

    println!("{}", format_step(2, 2, "Indexing documents"));
    let indexing = container.indexing_use_case(generate_embeddings);
    let timer = OperationTimer::new("index");

    if let Some(path) = file {
        Validator::validate_json_extension(&path)?;
        let document_id = match document_id {
            Some(id) => id,
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .context("Cannot derive a document id from the file name")?,
        };
        Validator::validate_document_id(&document_id)?;

        let response = indexing
            .index_file(&DiscoveredDocument { document_id, path }, generate_embeddings)
            .await
            .context("Indexing failed")?;
        timer.finish_with_count(response.total_indexed);

        if response.is_success() {
            println!(
                "{}",
                format_success(&format!(
                    "Indexed {} with {} entries",
                    response.document_id, response.total_indexed
                ))
            );
        } else {
            for error in &response.errors {
                println!("{}", format_error(error));
            }
            anyhow::bail!("{} entries failed", response.errors.len());
        }
        return Ok(());
    }

    let directory = directory.unwrap_or_else(|| container.config().indexing.directory.clone());
    Validator::validate_directory(&directory)?;

    let responses = indexing
        .bulk_index_from_directory(&directory, show_progress)
        .await
        .context("Bulk indexing failed")?;
    let entries: usize = responses.iter().map(|r| r.total_indexed).sum();
    timer.finish_with_count(entries);

    let failed: Vec<_> = responses.iter().filter(|r| !r.is_success()).collect();
    println!(
        "{}",
        format_success(&format!(
            "Indexed {} documents ({} entries)",
            responses.len(),
            entries
        ))
    );
    for response in failed {
        println!(
            "{}",
            format_warning(&format!(
                "{}: {} errors",
                response.document_id,
                response.errors.len()
            ))
        );
    }
    Ok(())
}

async fn cmd_search(
    container: &Container,
    query: &str,
    mode: SearchMode,
    size: Option<usize>,
    document_id: Option<String>,
    json: bool,
) -> Result<()> {
    let search = container.search_use_case();
    let mut options = SearchOptions {
        size,
        ..SearchOptions::default()
    };
    if let Some(document_id) = document_id {
        let mut filters = Map::new();
        filters.insert("chunk.document_id".to_string(), Value::String(document_id));
        options.filters = Some(filters);
    }

    let response = match mode {
        SearchMode::Text => search.search_chunks_by_text(query, options).await,
        SearchMode::Vector => search.search_chunks_by_vector(query, options).await,
        SearchMode::Hybrid => search.search_chunks_hybrid(query, options).await,
    }
    .context("Search failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        print_chunk_hits(&response);
    }
    Ok(())
}

fn print_chunk_hits(response: &SearchResponse) {
    println!(
        "{}",
        format_info(&format!(
            "{} hits (showing {})",
            response.total,
            response.hits.len()
        ))
    );

    for (rank, hit) in response.hits.iter().enumerate() {
        let score = hit.score.map_or("-".to_string(), |s| format!("{:.3}", s));
        match hit.to_chunk() {
            Ok(chunk) => {
                println!(
                    "\n{}. {} (score {}, document {})",
                    rank + 1,
                    chunk.chunk_id.as_deref().unwrap_or(hit.id.as_str()),
                    score,
                    chunk.document_id.as_deref().unwrap_or("-")
                );
                if !chunk.headings().is_empty() {
                    println!("   {}", chunk.headings().join(" > "));
                }
                let highlights = hit.highlights("chunk.text");
                if highlights.is_empty() {
                    println!("   {}", Validator::truncate_text(&chunk.text, 300));
                } else {
                    for fragment in highlights {
                        println!("   … {}", fragment);
                    }
                }
            }
            Err(e) => println!("\n{}. {} (unreadable: {})", rank + 1, hit.id, e),
        }
    }
}

async fn cmd_search_documents(container: &Container, query: &str, size: Option<usize>) -> Result<()> {
    let response = container
        .search_use_case()
        .search_documents(
            query,
            SearchOptions {
                size,
                ..SearchOptions::default()
            },
        )
        .await
        .context("Document search failed")?;

    println!("{}", format_info(&format!("{} documents", response.total)));
    for hit in &response.hits {
        let name = hit
            .source
            .pointer("/document/name")
            .and_then(Value::as_str)
            .unwrap_or("-");
        let filename = hit
            .source
            .pointer("/document/origin/filename")
            .and_then(Value::as_str)
            .unwrap_or("-");
        println!("  {}  {} ({})", hit.id, name, filename);
    }
    Ok(())
}

async fn cmd_get(container: &Container, document_id: &str) -> Result<()> {
    let response = container
        .search_use_case()
        .get_document(document_id)
        .await
        .context("Failed to fetch document")?;

    match response.source {
        Some(source) if response.found => {
            println!("{}", serde_json::to_string_pretty(&source)?);
        }
        _ => println!(
            "{}",
            format_warning(&format!("Document {} not found", document_id))
        ),
    }
    Ok(())
}

async fn cmd_delete(container: &Container, id: &str, chunk: bool) -> Result<()> {
    Validator::validate_document_id(id)?;
    let repository = container.repository();
    let deleted = if chunk {
        repository.delete_chunk(id).await
    } else {
        repository.delete_document(id).await
    }
    .context("Delete failed")?;

    let kind = if chunk { "Chunk" } else { "Document" };
    if deleted {
        println!("{}", format_success(&format!("{} {} deleted", kind, id)));
    } else {
        println!("{}", format_warning(&format!("{} {} not found", kind, id)));
    }
    Ok(())
}

async fn cmd_ask(container: &Container, question: &str) -> Result<()> {
    Validator::validate_content_not_empty(question)?;
    let agent = container.agent().context("Agent is not available")?;

    let timer = OperationTimer::new("ask");
    let response = agent.process_message(question, None, &[]).await;
    timer.warn_if_slow(Duration::from_secs(30), "agent answer");
    timer.finish();

    println!("{}\n", response.content);
    if response.has_sources() {
        println!("{}", format_info("Sources:"));
        for chunk_id in &response.chunk_ids_used {
            println!("  📄 {}", chunk_id);
        }
    }
    if !response.pictures.is_empty() {
        println!(
            "{}",
            format_info(&format!("{} related pictures", response.pictures.len()))
        );
    }
    if let Some(error) = response.metadata.get("error").and_then(Value::as_str) {
        println!("{}", format_error(error));
    }
    tracing::debug!(
        "Agent metadata: {}",
        serde_json::to_string(&response.metadata)?
    );
    Ok(())
}

async fn cmd_migrate(
    container: &Container,
    dry_run: bool,
    batch_size: usize,
    verify: bool,
) -> Result<()> {
    Validator::validate_batch_size(batch_size)?;
    let migration = container.chunk_id_migration(MigrationOptions {
        batch_size,
        dry_run,
        verify,
        pause_between_batches: Duration::from_millis(100),
        ..MigrationOptions::default()
    });

    let report = migration.run().await.context("Migration failed")?;
    println!(
        "{}",
        format_info(&format!(
            "Chunks: {} total, {} with id, {} without",
            report.before.total, report.before.with_id, report.before.without_id
        ))
    );

    if dry_run {
        println!(
            "{}",
            format_info(&format!("Dry run: {} chunks would be updated", report.found))
        );
        return Ok(());
    }

    println!(
        "{}",
        format_success(&format!(
            "Updated {} of {} chunks ({} failed)",
            report.updated, report.found, report.failed
        ))
    );
    for error in report.errors.iter().take(10) {
        println!("{}", format_error(error));
    }
    if let Some(after) = report.after {
        if after.is_complete() {
            println!("{}", format_success("Every chunk now has a chunk_id"));
        } else {
            println!(
                "{}",
                format_warning(&format!("{} chunks still lack a chunk_id", after.without_id))
            );
        }
    }
    Ok(())
}

async fn cmd_health(container: &Container) -> Result<()> {
    let report = container.health_check().await;
    println!("{}", report.format());
    if !report.is_healthy() {
        println!("{}", format_warning("Some components are not healthy"));
    }
    Ok(())
}

fn cmd_workflow_graph(output: Option<&Path>) -> Result<()> {
    let graph = workflow_mermaid();
    match output {
        Some(path) => {
            std::fs::write(path, &graph)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "{}",
                format_success(&format!("Workflow graph saved to {}", path.display()))
            );
        }
        None => println!("{}", graph),
    }
    Ok(())
}
