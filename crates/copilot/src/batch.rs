//! JSONL batch processing.
//!
//! Reads question records one JSON object per line, runs each through the
//! engine in input order, and writes answer records the same way. A run
//! failure maps to an error record for that id; it never aborts the batch.

use crate::engine::{Engine, RunOutcome};
use anyhow::{Context, Result};
use copilot_common::{BatchInput, BatchOutput, CopilotError};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{error, info};

/// Explanations are capped on the wire; the trace keeps the full story.
pub const MAX_EXPLANATION_CHARS: usize = 200;

/// Parse a JSONL batch file. A malformed line is a hard error carrying its
/// line number; silently skipping records would desync input and output.
pub fn read_batch(path: &Path) -> Result<Vec<BatchInput>> {
    let file =
        File::open(path).with_context(|| format!("opening batch file {}", path.display()))?;
    let mut inputs = Vec::new();

    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let input: BatchInput =
            serde_json::from_str(&line).map_err(|e| CopilotError::Record {
                line: idx + 1,
                reason: e.to_string(),
            })?;
        inputs.push(input);
    }

    Ok(inputs)
}

/// Write answer records as JSONL, one per input, in input order.
pub fn write_batch(path: &Path, outputs: &[BatchOutput]) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("creating output file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for output in outputs {
        serde_json::to_writer(&mut writer, output)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Run one input through the engine, mapping failure to an error record.
pub async fn process_one(engine: &Engine, input: &BatchInput) -> BatchOutput {
    match engine.run(&input.question, &input.format_hint).await {
        Ok(outcome) => to_output(&input.id, outcome),
        Err(e) => {
            error!("Run failed for {}: {:#}", input.id, e);
            BatchOutput::errored(&input.id, e)
        }
    }
}

/// Run a whole batch in input order.
pub async fn process_batch(engine: &Engine, inputs: &[BatchInput]) -> Vec<BatchOutput> {
    let mut outputs = Vec::with_capacity(inputs.len());
    for input in inputs {
        let output = process_one(engine, input).await;
        info!("{}: confidence={}", input.id, output.confidence);
        outputs.push(output);
    }
    outputs
}

fn to_output(id: &str, outcome: RunOutcome) -> BatchOutput {
    BatchOutput {
        id: id.to_string(),
        final_answer: outcome.answer,
        query: outcome.query.unwrap_or_default(),
        confidence: outcome.confidence,
        explanation: truncate(&outcome.explanation, MAX_EXPLANATION_CHARS),
        citations: outcome.citations,
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}
