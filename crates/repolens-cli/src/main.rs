use clap::{Parser, Subcommand};
use repolens_core::{RepoLensError, Settings};
use repolens_graph::DependencyGraph;
use repolens_parser::{fetch_repository, RepoParser};
use repolens_query::QueryEngine;
use repolens_vector::{index_graph, FastembedEmbedder, Journal, QdrantIndex};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "repolens", about = "Parse, index and query a repository graph")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a repository into graph.json
    Parse {
        #[arg(long, conflicts_with = "repo_path")]
        repo_url: Option<String>,
        #[arg(long)]
        repo_path: Option<PathBuf>,
        #[arg(long, default_value = "main")]
        branch: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Embed a parsed graph and upsert it into the vector index
    Index {
        #[arg(long)]
        collection: Option<String>,
        #[arg(long)]
        graph: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        recreate: bool,
    },
    /// Semantic search over an indexed collection
    Search {
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        #[arg(long)]
        collection: Option<String>,
    },
    /// Search plus answer-path analysis
    Analyze {
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        #[arg(long)]
        collection: Option<String>,
    },
    /// List collections in the external index
    Collections,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "repolens=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();

    match run(cli.command, settings).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError { code, source }) => {
            eprintln!("error: {}", source);
            ExitCode::from(code)
        }
    }
}

struct CliError {
    code: u8,
    source: RepoLensError,
}

/// Exit codes: 2 invalid argument, 3 fetch failure, 4 parse failure,
/// 5 index unreachable, 6 query failed.
fn classify(error: RepoLensError, query_context: bool) -> CliError {
    let code = match &error {
        RepoLensError::InvalidInput(_) => 2,
        RepoLensError::FetchFailed(_) => 3,
        RepoLensError::ParseFailed(_) => 4,
        RepoLensError::IndexUnavailable(_) => 5,
        _ if query_context => 6,
        _ => 1,
    };
    CliError {
        code,
        source: error,
    }
}

async fn run(command: Command, settings: Settings) -> Result<(), CliError> {
    match command {
        Command::Parse {
            repo_url,
            repo_path,
            branch,
            output,
        } => {
            let root = match (repo_url, repo_path) {
                (Some(url), None) => fetch_repository(&url, &branch, &settings.tmp_dir)
                    .map_err(|e| classify(e, false))?,
                (None, Some(path)) => path,
                _ => {
                    return Err(classify(
                        RepoLensError::InvalidInput(
                            "exactly one of --repo-url or --repo-path is required".to_string(),
                        ),
                        false,
                    ))
                }
            };

            let parsed = RepoParser::new()
                .parse_repository(&root)
                .map_err(|e| classify(e, false))?;
            let graph = DependencyGraph::from_parts(parsed.nodes, parsed.edges);
            let output = output.unwrap_or_else(|| settings.graph_path());
            graph.save(&output).map_err(|e| classify(e, false))?;

            print_json(&serde_json::json!({
                "graph_path": output,
                "stats": graph.stats(),
                "files_parsed": parsed.report.files_parsed,
                "failures": parsed.report.failures,
            }));
            Ok(())
        }

        Command::Index {
            collection,
            graph,
            recreate,
        } => {
            let graph_path = graph.unwrap_or_else(|| settings.graph_path());
            let graph =
                DependencyGraph::load(&graph_path).map_err(|e| classify(e, false))?;
            let collection = collection.unwrap_or_else(|| settings.collection.clone());

            let embedder =
                FastembedEmbedder::new(&settings.model_name).map_err(|e| classify(e, false))?;
            let index =
                QdrantIndex::connect(&settings.qdrant_url).map_err(|e| classify(e, false))?;
            let journal = Journal::new(settings.map_path(), settings.status_path());

            let outcome = index_graph(&embedder, &index, &journal, &graph, &collection, recreate)
                .await
                .map_err(|e| classify(e, false))?;
            print_json(&outcome);
            Ok(())
        }

        Command::Search {
            query,
            top_k,
            collection,
        } => {
            let engine = build_engine(&settings).map_err(|e| classify(e, false))?;
            let collection = collection.unwrap_or_else(|| settings.collection.clone());
            let output = engine
                .search(&query, top_k, &collection)
                .await
                .map_err(|e| classify(e, true))?;
            print_json(&output);
            Ok(())
        }

        Command::Analyze {
            query,
            top_k,
            collection,
        } => {
            let engine = build_engine(&settings).map_err(|e| classify(e, false))?;
            let collection = collection.unwrap_or_else(|| settings.collection.clone());
            let output = engine
                .analyze(&query, top_k, &collection)
                .await
                .map_err(|e| classify(e, true))?;
            print_json(&output);
            Ok(())
        }

        Command::Collections => {
            let index =
                QdrantIndex::connect(&settings.qdrant_url).map_err(|e| classify(e, false))?;
            use repolens_vector::VectorIndex;
            let collections = index
                .list_collections()
                .await
                .map_err(|e| classify(e, true))?;
            print_json(&collections);
            Ok(())
        }
    }
}

fn build_engine(settings: &Settings) -> repolens_core::Result<QueryEngine> {
    let embedder = Arc::new(FastembedEmbedder::new(&settings.model_name)?);
    let index = Arc::new(QdrantIndex::connect(&settings.qdrant_url)?);
    let journal = Arc::new(Journal::new(settings.map_path(), settings.status_path()));

    let graph_path = settings.graph_path();
    let graph = if graph_path.exists() {
        DependencyGraph::load(&graph_path)?
    } else {
        DependencyGraph::new()
    };

    Ok(QueryEngine::new(
        embedder,
        index,
        Arc::new(RwLock::new(graph)),
        journal,
    ))
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("error rendering output: {}", e),
    }
}
