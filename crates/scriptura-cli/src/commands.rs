//! Command implementations

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use scriptura_core::{BookScript, ScripturaConfig};

use crate::error::{CliError, Result};

/// One block in `verse` output
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockRow {
    index: usize,
    character_id: String,
    text: String,
}

/// One multi-block quote chain in `chains` output
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChainRow {
    start: usize,
    end: usize,
    characters: Vec<String>,
}

fn load_book(path: &Path) -> Result<BookScript> {
    let book = BookScript::load(path)?;
    tracing::debug!(path = %path.display(), book = book.book_id(), blocks = book.len(), "Loaded book");
    Ok(book)
}

pub fn run_verse(path: &Path, chapter: u32, verse: u32, json: bool) -> Result<()> {
    let book = load_book(path)?;
    let range = book.get_block_range_for_verse(chapter, verse).ok_or_else(|| {
        CliError::user(format!("{} {}:{} is not in {}", book.book_id(), chapter, verse, path.display()))
    })?;

    let rows: Vec<BlockRow> = range
        .map(|index| {
            let block = &book.blocks()[index];
            BlockRow {
                index,
                character_id: block.character_id_in_script().to_string(),
                text: block.get_text(true, true),
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    for row in rows {
        println!("{:>5}  {}  {}", row.index, row.character_id.cyan(), row.text);
    }
    Ok(())
}

pub fn run_chains(path: &Path, json: bool) -> Result<()> {
    let book = load_book(path)?;
    let rows: Vec<ChainRow> = book
        .quote_chain_ranges()
        .into_iter()
        .map(|range| {
            let mut characters: Vec<String> = Vec::new();
            for block in &book.blocks()[range.clone()] {
                if !characters.iter().any(|c| c == block.character_id()) {
                    characters.push(block.character_id().to_string());
                }
            }
            ChainRow {
                start: range.start,
                end: range.end - 1,
                characters,
            }
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No multi-block quotes in {}", book.book_id());
        return Ok(());
    }
    for row in rows {
        let characters = row.characters.join(", ");
        let characters = if row.characters.len() > 1 {
            characters.yellow()
        } else {
            characters.green()
        };
        println!("{:>5}-{:<5} {}", row.start, row.end, characters);
    }
    Ok(())
}

pub fn run_replay(
    source: &Path,
    target: &Path,
    out: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = match config {
        Some(path) => ScripturaConfig::load(path)?,
        None => ScripturaConfig::default(),
    };
    let source_book = load_book(source)?;
    let mut target_book = load_book(target)?;
    if source_book.book_id() != target_book.book_id() {
        return Err(CliError::user(format!(
            "Cannot replay {} decisions onto {}",
            source_book.book_id(),
            target_book.book_id()
        )));
    }

    let report =
        target_book.apply_user_decisions_with(&source_book, Some(&config.reference), &config.replay)?;

    if let Some(out) = out {
        std::fs::write(out, target_book.to_json()?)?;
        tracing::info!(path = %out.display(), "Wrote updated book");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("{} {}", "Replayed".green().bold(), target_book.book_id());
    println!("  splits applied:        {}", report.splits_applied);
    println!("  alignments restored:   {}", report.alignments_restored);
    println!("  confirmations applied: {}", report.confirmations_applied);
    println!("  chains reconciled:     {}", report.chains_reconciled);
    if report.splits_unapplied > 0 || report.alignments_unapplied > 0 {
        println!(
            "  {} {} split(s) and {} alignment(s) could not be replayed",
            "warning:".yellow().bold(),
            report.splits_unapplied,
            report.alignments_unapplied
        );
    }
    Ok(())
}
