// CLI command handlers
use anyhow::{Context, Result};
use instsema_core::semantics::collector::{CollectionStats, InstructionCollector};
use instsema_core::semantics::database::PatternDatabase;
use instsema_core::semantics::pipeline::{PipelineStats, SemanticsPipeline};
use instsema_core::target::TargetSpec;
use std::fs;
use std::path::Path;

fn load_database(database: &Path) -> Result<PatternDatabase> {
    PatternDatabase::load(database)
        .with_context(|| format!("Failed to load pattern database: {}", database.display()))
}

pub fn generate_semantics(
    database: &Path,
    output: Option<&Path>,
    config: Option<&Path>,
    no_comments: bool,
) -> Result<PipelineStats> {
    let db = load_database(database)?;

    let mut spec = match config {
        Some(path) => TargetSpec::load(path)?,
        None => TargetSpec::default(),
    };
    if no_comments {
        spec.emit_pattern_comments = false;
    }

    let output_data = SemanticsPipeline::run(&db, &spec)
        .with_context(|| format!("Failed to generate semantics for {}", database.display()))?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
            }
            fs::write(path, &output_data.rendered)
                .with_context(|| format!("Failed to write output file: {}", path.display()))?;
            println!("Wrote semantics table to {}", path.display());
        }
        None => print!("{}", output_data.rendered),
    }

    Ok(output_data.stats)
}

pub fn analyze_database(database: &Path) -> Result<()> {
    println!("Reading pattern database: {}", database.display());
    let db = load_database(database)?;

    println!("Database loaded successfully");
    println!("  Target: {}", db.target);
    println!("  Instructions: {}", db.instructions.len());
    println!("  Operators: {}", db.operators.len());
    println!("  Equivalences: {}", db.equivalences.len());
    println!("  Semantics overrides: {}", db.semantics.len());

    let collector = InstructionCollector::new(&db).context("Failed to prepare collection")?;
    let collected = collector.collect().context("Failed to collect semantics")?;

    println!("\nCollection complete");
    print_collection_stats(&collected.stats);
    println!("  Constants: {}", collected.constants.len());
    println!("  Predicates: {}", collected.predicates.len());

    if !collected.exclusions.is_empty() {
        println!("\nExcluded instructions:");
        for (name, reason) in collected.exclusions.iter() {
            println!("    {}: {}", name, reason);
        }
    }

    Ok(())
}

pub fn print_collection_stats(stats: &CollectionStats) {
    println!("  Instructions: {}", stats.total_instructions);
    println!("  Linearized: {} ({} from overrides)", stats.linearized, stats.from_overrides);
    println!("  Accepted: {}", stats.accepted);
    println!("  Excluded: {}", stats.excluded());
    println!("    intrinsic: {}", stats.excluded_intrinsic);
    println!("    complex pattern: {}", stats.excluded_complex_pattern);
    println!("    multiple implicit defs: {}", stats.excluded_multiple_implicit_defs);
    println!("    implicit def without def: {}", stats.excluded_implicit_def_without_def);
}
