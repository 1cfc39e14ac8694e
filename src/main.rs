//! # Expertise Graph CLI (`xg`)
//!
//! ## Usage
//!
//! ```bash
//! xg --config ./config/xg.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `xg init` | Create the SQLite database and run schema migrations |
//! | `xg ingest <file>` | Chunk, embed, and store a document for a person |
//! | `xg search "<query>"` | Snippets, candidate topics, and ranked experts |
//! | `xg match "<problem>"` | Experts best placed to help with a problem |
//! | `xg interview <answers.json>` | Record expertise from interview answers |
//! | `xg expertise list` | A person's scores |
//! | `xg expertise age` | Advance freshness of every score |
//! | `xg graph <topic>` | Expert graph and bus factor for a topic |
//! | `xg person add` | Register a display name |
//! | `xg privacy export` | Everything held about a person, as JSON |
//! | `xg privacy erase` | Delete a person's scores and chunks |
//! | `xg health` | Embedding model, dimension, and store status |
//! | `xg serve` | Start the HTTP API server |
//!
//! Set `RUST_LOG` to override the log filter; `-v` switches the default to debug.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use expertise_graph::app::App;
use expertise_graph::config::{self, Config};
use expertise_graph::expertise::{self, InterviewAnswer, InterviewRequest};
use expertise_graph::ingest::{self, IngestRequest};
use expertise_graph::{db, migrate, privacy, server};
use expertise_graph_core::models::{Person, Visibility};
use expertise_graph_core::search::MatchFilter;

/// Expertise Graph: semantic search over team documents and the people
/// who know the topics they cover.
#[derive(Parser)]
#[command(name = "xg", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/xg.toml")]
    config: PathBuf,

    /// Debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Ingest a document from a file or a URL.
    Ingest {
        /// Text file to ingest.
        file: Option<PathBuf>,

        /// Fetch the document from this URL instead of a file.
        #[arg(long, conflicts_with = "file")]
        url: Option<String>,

        /// Owner's person id (UUID).
        #[arg(long)]
        person: String,

        /// Document title. Defaults to the file name.
        #[arg(long)]
        title: Option<String>,

        /// private, team, or org.
        #[arg(long, default_value = "private")]
        visibility: Visibility,
    },

    /// Search documents and rank experts.
    Search {
        query: String,

        /// Number of snippets (1-20). Defaults to `retrieval.default_top_k`.
        #[arg(long)]
        top_k: Option<usize>,
    },

    /// Find experts for a problem statement.
    Match {
        problem: String,

        #[arg(long, default_value = "5")]
        top_k: usize,

        #[arg(long)]
        min_score: Option<f64>,

        #[arg(long)]
        max_freshness_days: Option<i64>,
    },

    /// Record expertise from a JSON file of `[{"q": ..., "a": ...}]` answers.
    Interview {
        answers: PathBuf,

        #[arg(long)]
        person: String,
    },

    /// Inspect or age expertise scores.
    Expertise {
        #[command(subcommand)]
        action: ExpertiseAction,
    },

    /// Expert graph for a topic.
    Graph { topic: String },

    /// Manage people.
    Person {
        #[command(subcommand)]
        action: PersonAction,
    },

    /// Data-subject export and erasure.
    Privacy {
        #[command(subcommand)]
        action: PrivacyAction,
    },

    /// Report the embedding provider and store status.
    Health,

    /// Start the HTTP API server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum ExpertiseAction {
    /// A person's scores, highest first.
    List {
        #[arg(long)]
        person: String,
    },
    /// Add days to every score's freshness.
    Age {
        #[arg(long, default_value = "1")]
        days: i64,
    },
}

#[derive(Subcommand)]
enum PersonAction {
    /// Register or rename a person.
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
    },
}

#[derive(Subcommand)]
enum PrivacyAction {
    /// Print everything held about a person as JSON.
    Export {
        #[arg(long)]
        person: String,
    },
    /// Delete a person's scores and chunks and anonymize their documents.
    Erase {
        #[arg(long)]
        person: String,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "expertise_graph=debug,expertise_graph_core=debug"
    } else {
        "expertise_graph=info,expertise_graph_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    if let Commands::Init = cli.command {
        let pool = db::connect(&cfg).await?;
        migrate::run_migrations(&pool).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let app = App::open(cfg).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Ingest {
            file,
            url,
            person,
            title,
            visibility,
        } => {
            let req = ingest_request(&app.config, file, url, person, title, visibility)?;
            let out = ingest::ingest_document(&app, req).await?;
            println!("ingested {}", out.doc_id);
            println!("  chunks: {}", out.chunk_count);
        }
        Commands::Search { query, top_k } => {
            let top_k = top_k.unwrap_or(app.config.retrieval.default_top_k);
            let response = app.engine.search_with_experts(&query, top_k).await?;
            if response.snippets.is_empty() {
                println!("No results.");
            }
            for (i, s) in response.snippets.iter().enumerate() {
                println!("{}. {} ({})", i + 1, s.source, s.doc_id);
                println!("    {}", s.text.replace('\n', " "));
            }
            let topics: Vec<&str> = response
                .candidate_topics
                .iter()
                .map(|t| t.name.as_str())
                .collect();
            println!();
            println!("topics: {}", topics.join(", "));
            for e in &response.experts {
                println!(
                    "  {} [{}] score={:.2} freshness={}d",
                    e.name, e.employee_id, e.score, e.freshness_days
                );
            }
        }
        Commands::Match {
            problem,
            top_k,
            min_score,
            max_freshness_days,
        } => {
            let filter = MatchFilter {
                top_k,
                min_score,
                max_freshness_days,
            };
            let out = app.engine.match_experts(&problem, &filter).await?;
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Commands::Interview { answers, person } => {
            let content = std::fs::read_to_string(&answers)
                .with_context(|| format!("Failed to read {}", answers.display()))?;
            let answers: Vec<InterviewAnswer> =
                serde_json::from_str(&content).context("Answers must be a JSON array of {q, a}")?;
            let out = expertise::ingest_interview(
                &app,
                InterviewRequest {
                    person_id: person,
                    answers,
                },
            )
            .await?;
            for t in &out.topics_updated {
                println!("{}: {:.2}", t.name, t.score);
            }
        }
        Commands::Expertise { action } => match action {
            ExpertiseAction::List { person } => {
                for s in expertise::list_expertise(&app, &person).await? {
                    println!("{}: {:.2} ({}d)", s.topic, s.score, s.freshness_days);
                }
            }
            ExpertiseAction::Age { days } => {
                let aged = expertise::age_expertise(&app, days).await?;
                println!("aged {} scores by {} days", aged, days);
            }
        },
        Commands::Graph { topic } => {
            let graph = expertise::topic_graph(&app, &topic).await?;
            println!("{}", serde_json::to_string_pretty(&graph)?);
        }
        Commands::Person { action } => match action {
            PersonAction::Add { id, name } => {
                let person = expertise::add_person(&app, Person { id, name }).await?;
                println!("saved {} ({})", person.name, person.id);
            }
        },
        Commands::Privacy { action } => match action {
            PrivacyAction::Export { person } => {
                let export = privacy::export_person(&app, &person).await?;
                println!("{}", serde_json::to_string_pretty(&export)?);
            }
            PrivacyAction::Erase { person } => {
                let report = privacy::erase_person(&app, &person).await?;
                println!("scores deleted: {}", report.scores_deleted);
                println!("chunks deleted: {}", report.chunks_deleted);
                println!("documents anonymized: {}", report.documents_anonymized);
            }
        },
        Commands::Health => {
            println!("embed model: {}", app.embedder().model_name());
            println!("dim: {}", app.embedder().dims());
            let declared = app.store().vector_dim().await?;
            println!(
                "store dim: {}",
                declared.map_or_else(|| "undeclared".to_string(), |d| d.to_string())
            );
            println!("chunks: {}", app.store().chunk_count().await?);
        }
        Commands::Serve => {
            server::run_server(app).await?;
        }
    }

    Ok(())
}

fn ingest_request(
    config: &Config,
    file: Option<PathBuf>,
    url: Option<String>,
    person: String,
    title: Option<String>,
    visibility: Visibility,
) -> anyhow::Result<IngestRequest> {
    let text = match &file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None if url.is_some() => None,
        None => bail!("Provide a file or --url"),
    };
    let title = title
        .or_else(|| {
            file.as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
        })
        .or_else(|| url.clone())
        .unwrap_or_default();
    if text
        .as_ref()
        .is_some_and(|t| t.chars().count() > config.ingest.max_text_chars)
    {
        bail!(
            "File exceeds ingest.max_text_chars ({})",
            config.ingest.max_text_chars
        );
    }
    Ok(IngestRequest {
        person_id: person,
        title,
        text,
        url,
        visibility,
    })
}
