//! Semantics Generation Pipeline
//!
//! This module orchestrates a complete generation run, from a loaded pattern
//! database to the rendered semantics file.
//!
//! # Pipeline Stages
//! 1. **Configuration**: Check the target specification
//! 2. **Collection**: Build the equivalence table and linearize every instruction
//! 3. **Program validation**: Check every accepted program (optional)
//! 4. **Layout**: Assign table offsets and build the name tables
//! 5. **Table validation**: Check the laid-out table (optional)
//! 6. **Rendering**: Produce the includable source file
//!
//! The stages are also exposed one by one on [`PipelineContext`] so callers
//! can stop after collection, e.g. to report statistics.

use crate::semantics::collector::{CollectedSemantics, CollectionStats, InstructionCollector};
use crate::semantics::database::PatternDatabase;
use crate::semantics::emitter::{ProgramEmitter, SemanticsTable};
use crate::semantics::validator::ProgramValidator;
use crate::target::{validate_target, TargetSpec};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Semantics generation orchestrator.
pub struct SemanticsPipeline;

/// Mutable context that carries state through pipeline stages.
pub struct PipelineContext<'a> {
    pub db: &'a PatternDatabase,
    pub spec: &'a TargetSpec,
    pub collected: Option<CollectedSemantics>,
    pub table: Option<SemanticsTable>,
    pub rendered: Option<String>,
    pub stats: PipelineStats,
}

/// Statistics collected during pipeline execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub collection: CollectionStats,
    pub constants: usize,
    pub predicates: usize,
    pub table_words: u32,
}

/// Everything a generation run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: SemanticsTable,
    pub rendered: String,
    pub stats: PipelineStats,
}

impl<'a> PipelineContext<'a> {
    pub fn new(db: &'a PatternDatabase, spec: &'a TargetSpec) -> Self {
        Self {
            db,
            spec,
            collected: None,
            table: None,
            rendered: None,
            stats: PipelineStats::default(),
        }
    }
}

impl SemanticsPipeline {
    /// Generate the semantics file for a database.
    ///
    /// # Algorithm
    /// 1. Check the target specification
    /// 2. Collect programs for every instruction
    /// 3. Validate programs (when enabled)
    /// 4. Lay out the table
    /// 5. Validate the table (when enabled)
    /// 6. Render
    ///
    /// # Arguments
    /// * `db` - Loaded pattern database
    /// * `spec` - Output configuration
    ///
    /// # Returns
    /// The laid-out table, its rendering and run statistics.
    ///
    /// # Errors
    /// Returns error on an invalid configuration, a database or pattern that
    /// breaks the input contract, or a program that fails validation. No
    /// partial output is produced.
    #[inline(never)]
    pub fn run(db: &PatternDatabase, spec: &TargetSpec) -> Result<PipelineOutput> {
        log::info!("Starting semantics generation for target {}...", db.target);
        let mut ctx = PipelineContext::new(db, spec);

        log::info!("Step 1: Checking target specification...");
        Self::stage_check_target(&mut ctx)?;

        log::info!("Step 2: Collecting instruction semantics...");
        Self::stage_collect(&mut ctx)?;

        if spec.validate_programs {
            log::info!("Step 3: Validating programs...");
            Self::stage_validate_programs(&mut ctx)?;
        }

        log::info!("Step 4: Laying out semantics table...");
        Self::stage_layout(&mut ctx)?;

        if spec.validate_programs {
            log::info!("Step 5: Validating table...");
            Self::stage_validate_table(&mut ctx)?;
        }

        log::info!("Step 6: Rendering...");
        Self::stage_render(&mut ctx)?;

        let table = ctx.table.ok_or_else(|| anyhow::anyhow!("No table laid out"))?;
        let rendered = ctx.rendered.ok_or_else(|| anyhow::anyhow!("No output rendered"))?;
        log::info!(
            "Semantics generation complete: {} programs, {} table words",
            ctx.stats.collection.accepted,
            ctx.stats.table_words
        );
        Ok(PipelineOutput {
            table,
            rendered,
            stats: ctx.stats,
        })
    }

    /// Stage: Reject an unusable target specification.
    pub fn stage_check_target(ctx: &mut PipelineContext<'_>) -> Result<()> {
        validate_target(ctx.spec).map_err(|e| anyhow::anyhow!("Invalid target specification: {}", e))
    }

    /// Stage: Linearize every instruction of the database.
    pub fn stage_collect(ctx: &mut PipelineContext<'_>) -> Result<()> {
        let collector = InstructionCollector::new(ctx.db)?;
        log::debug!("Equivalence table has {} entries", collector.equivalences().len());
        let collected = collector.collect()?;
        ctx.stats.collection = collected.stats.clone();
        ctx.stats.constants = collected.constants.len();
        ctx.stats.predicates = collected.predicates.len();
        ctx.collected = Some(collected);
        Ok(())
    }

    /// Stage: Check every accepted program.
    pub fn stage_validate_programs(ctx: &mut PipelineContext<'_>) -> Result<()> {
        let collected = ctx
            .collected
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No semantics collected"))?;
        for program in collected.programs.iter() {
            ProgramValidator::validate_program(program)?;
        }
        Ok(())
    }

    /// Stage: Assign table offsets.
    pub fn stage_layout(ctx: &mut PipelineContext<'_>) -> Result<()> {
        let collected = ctx
            .collected
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("No semantics collected"))?;
        let table = ProgramEmitter::new(ctx.db, ctx.spec).layout(collected)?;
        ctx.stats.table_words = table.num_words;
        ctx.table = Some(table);
        Ok(())
    }

    /// Stage: Check the laid-out table.
    pub fn stage_validate_table(ctx: &mut PipelineContext<'_>) -> Result<()> {
        let table = ctx.table.as_ref().ok_or_else(|| anyhow::anyhow!("No table laid out"))?;
        ProgramValidator::validate_table(table)
    }

    /// Stage: Render the laid-out table.
    pub fn stage_render(ctx: &mut PipelineContext<'_>) -> Result<()> {
        let table = ctx.table.as_ref().ok_or_else(|| anyhow::anyhow!("No table laid out"))?;
        let rendered = ProgramEmitter::new(ctx.db, ctx.spec).render(table)?;
        if ctx.spec.validate_programs {
            ProgramValidator::validate_rendered(&rendered)?;
        }
        ctx.rendered = Some(rendered);
        Ok(())
    }
}
