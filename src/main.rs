use graphrank::{RankEngine, Status, TripleGraph};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("graphrank v{}", graphrank::version());
    println!("==========================================");

    let data_dir = std::env::temp_dir().join("graphrank-demo");
    let engine = RankEngine::open(&data_dir)?;

    // Demo 1: full computation
    println!("\n=== Demo 1: Full computation ===");
    let mut graph = TripleGraph::new();
    for (s, p, o) in [
        ("<alice>", "<knows>", "<bob>"),
        ("<alice>", "<knows>", "<carol>"),
        ("<bob>", "<knows>", "<carol>"),
        ("<dave>", "<knows>", "<carol>"),
        ("<carol>", "<worksFor>", "<acme>"),
    ] {
        graph.add(s, p, o);
    }
    let shared = Arc::new(graph.clone());
    let outcome = engine.compute(&engine.filtered(Arc::clone(&shared)))?;
    println!("✓ {:?}", outcome);
    print_ranks(&engine, &graph);

    // Demo 2: incremental update
    println!("\n=== Demo 2: Incremental update ===");
    graph.add("<carol>", "<knows>", "<erin>");
    graph.add("<alice>", "<knows>", "<erin>");
    let shared = Arc::new(graph.clone());
    println!("Status before: {}", engine.status(graph.entity_count()));
    let outcome = engine.compute_incremental(&engine.filtered(Arc::clone(&shared)))?;
    println!("✓ {:?}", outcome);
    print_ranks(&engine, &graph);

    let status = engine.status(graph.entity_count());
    println!("\nStatus: {}", status);
    if status != Status::Computed {
        println!("(run a full computation to refresh every rank)");
    }
    println!("Data directory: {:?}", data_dir);
    Ok(())
}

fn print_ranks(engine: &RankEngine, graph: &TripleGraph) {
    for id in 1..=graph.entity_count() {
        if let Some(term) = graph.term(id) {
            println!("  {:<12} {}", term, engine.formatted_rank(id, 3));
        }
    }
}
