//! graphrank CLI: compute, inspect and export entity ranks
//!
//! Works on a data directory holding the rank file and engine state, and on a
//! graph file with one `subject predicate object [graph] .` statement per line.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use graphrank::{
    FilterList, NodeId, Outcome, RankConfig, RankEngine, TripleGraph,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "graphrank", version, about = "Entity ranking for knowledge graphs")]
struct Cli {
    /// Directory holding the rank file and engine state
    #[arg(long, default_value = "graphrank-data", global = true, env = "GRAPHRANK_DATA")]
    data_dir: PathBuf,

    /// Graph file in N-Quads, N-Triples or Turtle (.ttl)
    #[arg(long, global = true, env = "GRAPHRANK_GRAPH")]
    graph: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute ranks for the graph
    Compute {
        /// Only rank nodes added since the last computation
        #[arg(long)]
        incremental: bool,

        /// Upper bound on power iterations (persisted)
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Convergence threshold (persisted)
        #[arg(long)]
        epsilon: Option<f64>,

        /// Damping factor (persisted)
        #[arg(long)]
        damping: Option<f64>,
    },
    /// Show the rank of one or more terms
    Rank {
        /// Terms as written in the graph file, or numeric ids
        terms: Vec<String>,

        /// Fraction digits of the normalized rank (2 to 5)
        #[arg(long, default_value_t = 2)]
        digits: usize,
    },
    /// List the highest ranked nodes
    Top {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Show the status of the ranks
    Status,
    /// Write every node's rank to a file
    Export {
        /// Output file
        path: PathBuf,
    },
    /// Inspect or change the statement filter
    Filter {
        #[command(subcommand)]
        action: FilterAction,
    },
}

#[derive(Subcommand)]
enum FilterAction {
    /// Print the filter configuration
    Show,
    /// Apply the filter to future computations
    Enable,
    /// Rank over every statement
    Disable,
    /// Add a term to a filter list
    Add { list: FilterList, term: String },
    /// Remove a term from a filter list
    Remove { list: FilterList, term: String },
    /// Include asserted statements
    Explicit {
        #[arg(action = clap::ArgAction::Set)]
        include: bool,
    },
    /// Include inferred statements
    Implicit {
        #[arg(action = clap::ArgAction::Set)]
        include: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let engine = RankEngine::open(&cli.data_dir)
        .with_context(|| format!("opening data directory {:?}", cli.data_dir))?;

    match cli.command {
        Commands::Compute {
            incremental,
            max_iterations,
            epsilon,
            damping,
        } => {
            let config = RankConfig {
                max_iterations: max_iterations.unwrap_or(engine.config().max_iterations),
                epsilon: epsilon.unwrap_or(engine.config().epsilon),
                damping_factor: damping.unwrap_or(engine.config().damping_factor),
                ..engine.config()
            };
            if config != engine.config() {
                engine.set_config(config)?;
            }
            let graph = load_graph(cli.graph.as_deref())?;
            run_compute(&engine, graph, incremental, &cli.format)
        }
        Commands::Rank { terms, digits } => {
            let graph = load_graph(cli.graph.as_deref())?;
            run_rank(&engine, &graph, &terms, digits, &cli.format)
        }
        Commands::Top { limit } => {
            let graph = load_graph(cli.graph.as_deref())?;
            run_top(&engine, &graph, limit, &cli.format)
        }
        Commands::Status => {
            let graph = load_graph(cli.graph.as_deref())?;
            run_status(&engine, &graph, &cli.format)
        }
        Commands::Export { path } => {
            let graph = Arc::new(load_graph(cli.graph.as_deref())?);
            let lines = engine.export(&path, &engine.filtered(graph))?;
            println!("Exported {} ranks to {}", lines, path.display());
            Ok(())
        }
        Commands::Filter { action } => run_filter(&engine, cli.graph.as_deref(), action, &cli.format),
    }
}

fn load_graph(path: Option<&Path>) -> Result<TripleGraph> {
    let path = path.ok_or_else(|| anyhow!("--graph is required for this command"))?;
    TripleGraph::load(path).with_context(|| format!("loading graph {:?}", path))
}

/// Resolve a term from the graph file or a literal numeric id
fn resolve(graph: Option<&TripleGraph>, term: &str) -> Result<NodeId> {
    if let Ok(id) = term.parse::<NodeId>() {
        return Ok(id);
    }
    graph
        .and_then(|g| g.lookup(term))
        .ok_or_else(|| anyhow!("unknown term {}", term))
}

fn run_compute(
    engine: &RankEngine,
    graph: TripleGraph,
    incremental: bool,
    format: &OutputFormat,
) -> Result<()> {
    let node_count = graph.entity_count();
    let source = engine.filtered(Arc::new(graph));
    info!("Computing ranks over {} nodes", node_count);

    let outcome = if incremental {
        engine.compute_incremental(&source)?
    } else {
        engine.compute(&source)?
    };

    let summary = match outcome {
        Outcome::Completed {
            nodes,
            iterations,
            fingerprint,
        } => json!({
            "outcome": "completed",
            "nodes": nodes,
            "iterations": iterations,
            "fingerprint": format!("{:016x}", fingerprint),
        }),
        Outcome::Appended { records } => json!({ "outcome": "appended", "records": records }),
        Outcome::Interrupted => json!({ "outcome": "interrupted" }),
        Outcome::NothingToDo => json!({ "outcome": "nothing to do" }),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            if let Some(map) = summary.as_object() {
                for (key, value) in map {
                    println!("{:<12} {}", format!("{}:", key), value.as_str().map_or(value.to_string(), str::to_string));
                }
            }
        }
    }
    println!("Status: {}", engine.status(node_count));
    Ok(())
}

fn run_rank(
    engine: &RankEngine,
    graph: &TripleGraph,
    terms: &[String],
    digits: usize,
    format: &OutputFormat,
) -> Result<()> {
    if terms.is_empty() {
        bail!("no terms given");
    }
    let mut rows = Vec::with_capacity(terms.len());
    for term in terms {
        let id = resolve(Some(graph), term)?;
        rows.push((term.clone(), id, engine.rank(id), engine.formatted_rank(id, digits)));
    }
    print_rows(&rows, format)
}

fn run_top(
    engine: &RankEngine,
    graph: &TripleGraph,
    limit: usize,
    format: &OutputFormat,
) -> Result<()> {
    let mut ranked: Vec<(NodeId, f64)> = (1..=graph.entity_count())
        .filter_map(|id| engine.rank(id).map(|rank| (id, rank)))
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(limit);

    let rows: Vec<_> = ranked
        .into_iter()
        .map(|(id, rank)| {
            let term = graph.term(id).unwrap_or_default().to_string();
            (term, id, Some(rank), engine.formatted_rank(id, 2))
        })
        .collect();
    print_rows(&rows, format)
}

fn print_rows(rows: &[(String, NodeId, Option<f64>, String)], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let values: Vec<_> = rows
                .iter()
                .map(|(term, id, rank, normalized)| {
                    json!({ "term": term, "id": id, "rank": rank, "normalized": normalized })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
        OutputFormat::Csv => {
            println!("term,id,rank,normalized");
            for (term, id, rank, normalized) in rows {
                let rank = rank.map(|r| r.to_string()).unwrap_or_default();
                println!("{},{},{},{}", format_csv_value(term), id, rank, normalized);
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Term", "Id", "Rank", "Normalized"]);
            for (term, id, rank, normalized) in rows {
                let rank = rank.map_or_else(|| "-".to_string(), |r| format!("{:.6e}", r));
                table.add_row(vec![term.clone(), id.to_string(), rank, normalized.clone()]);
            }
            println!("{}", table);
            println!("{} row(s)", rows.len());
        }
    }
    Ok(())
}

fn run_status(engine: &RankEngine, graph: &TripleGraph, format: &OutputFormat) -> Result<()> {
    let state = engine.state();
    let status = engine.status(graph.entity_count());
    let summary = json!({
        "status": status.to_string(),
        "nodes": graph.entity_count(),
        "ranked": engine.reader().size().saturating_sub(1),
        "last_ranked_id": state.last_ranked_id,
        "min_rank": state.min_rank,
        "max_rank": state.max_rank,
        "thresholds": engine.thresholds().len() / 2,
        "fingerprint": format!("{:016x}", state.fingerprint),
        "filtering": state.filtering,
        "computed_at": state.computed_at,
    });

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            println!("Status:       {}", status);
            println!("Nodes:        {}", graph.entity_count());
            println!("Ranked:       {}", engine.reader().size().saturating_sub(1));
            println!("Buckets:      {}", engine.thresholds().len() / 2);
            println!("Fingerprint:  {:016x}", state.fingerprint);
            println!("Filtering:    {}", state.filtering);
            if let Some(at) = &state.computed_at {
                println!("Computed at:  {}", at);
            }
        }
    }
    Ok(())
}

fn run_filter(
    engine: &RankEngine,
    graph_path: Option<&Path>,
    action: FilterAction,
    format: &OutputFormat,
) -> Result<()> {
    match action {
        FilterAction::Show => {
            let filter = engine.filter();
            match format {
                OutputFormat::Json => {
                    let value = json!({ "filtering": engine.filtering(), "filter": filter });
                    println!("{}", serde_json::to_string_pretty(&value)?);
                }
                _ => {
                    println!("filtering: {}", engine.filtering());
                    for list in FilterList::ALL {
                        let ids: Vec<_> = filter.list(list).iter().map(|id| id.to_string()).collect();
                        println!("{}: [{}]", list, ids.join(", "));
                    }
                    println!("include-explicit: {}", filter.include_explicit);
                    println!("include-implicit: {}", filter.include_implicit);
                }
            }
        }
        FilterAction::Enable => engine.set_filtering(true)?,
        FilterAction::Disable => engine.set_filtering(false)?,
        FilterAction::Add { list, term } => {
            let graph = graph_path.map(|p| TripleGraph::load(p)).transpose()?;
            let id = resolve(graph.as_ref(), &term)?;
            if !engine.add_filter_entry(list, id)? {
                println!("{} already lists {}", list, term);
            }
        }
        FilterAction::Remove { list, term } => {
            let graph = graph_path.map(|p| TripleGraph::load(p)).transpose()?;
            let id = resolve(graph.as_ref(), &term)?;
            if !engine.remove_filter_entry(list, id)? {
                println!("{} does not list {}", list, term);
            }
        }
        FilterAction::Explicit { include } => engine.set_include_explicit(include)?,
        FilterAction::Implicit { include } => engine.set_include_implicit(include)?,
    }
    Ok(())
}

fn format_csv_value(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
