//! Replaying user decisions onto a freshly parsed book
//!
//! When a book is re-parsed from revised source text, the decisions made on
//! the previous parse are carried over in three passes:
//!
//! 1. user splits, located by exact block sequence, by a single block equal
//!    to the joined group, or (optionally) inside a larger block;
//! 2. reference-text alignments, located per verse span;
//! 3. user-confirmed speaker and delivery assignments.
//!
//! Splits that cannot be located are kept on the book as unapplied splits.
//! Finally every multi-block quote chain is reconciled to one speaker.

use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::block::{Block, MultiBlockQuote, ReferenceBlockCloning};
use crate::book::BookScript;
use crate::character::{self, AMBIGUOUS_CHARACTER};
use crate::element::BlockElement;
use crate::error::Result;
use crate::reference::ReferenceLanguageInfo;

/// Knobs for [`BookScript::apply_user_decisions_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ReplayOptions {
    /// Look for a split group inside a larger block when no block matches it whole
    pub match_unchunked_blocks: bool,
    /// Restore reference-text alignments when a reference language is given
    pub reapply_reference_text: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            match_unchunked_blocks: true,
            reapply_reference_text: true,
        }
    }
}

/// What a replay managed to carry over
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub splits_applied: usize,
    pub splits_unapplied: usize,
    pub alignments_restored: usize,
    pub alignments_unapplied: usize,
    pub confirmations_applied: usize,
    pub chains_reconciled: usize,
}

impl BookScript {
    /// Carry user decisions from `source` (a previous parse of the same
    /// book) onto this book, with default options.
    pub fn apply_user_decisions(
        &mut self,
        source: &BookScript,
        reference_text_to_reapply: Option<&dyn ReferenceLanguageInfo>,
    ) -> Result<ReplayReport> {
        self.apply_user_decisions_with(source, reference_text_to_reapply, &ReplayOptions::default())
    }

    pub fn apply_user_decisions_with(
        &mut self,
        source: &BookScript,
        reference_text_to_reapply: Option<&dyn ReferenceLanguageInfo>,
        options: &ReplayOptions,
    ) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();

        self.apply_user_splits(source, options, &mut report)?;
        if let Some(language) = reference_text_to_reapply.filter(|_| options.reapply_reference_text) {
            self.apply_reference_alignments(source, language, &mut report)?;
        }
        self.apply_user_confirmations(source, &mut report);
        report.chains_reconciled = self.process_assignments_for_multi_block_quotes();

        debug!(book = %self.book_id(), ?report, "Applied user decisions");
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Splits
    // ------------------------------------------------------------------

    fn apply_user_splits(
        &mut self,
        source: &BookScript,
        options: &ReplayOptions,
        report: &mut ReplayReport,
    ) -> Result<()> {
        let groups: Vec<Vec<Block>> = source
            .split_groups()
            .into_iter()
            .map(<[Block]>::to_vec)
            .chain(source.unapplied_splits().iter().cloned())
            .collect();

        for group in groups {
            let Some(first) = group.first().filter(|_| group.len() > 1) else {
                debug!(book = %self.book_id(), blocks = group.len(), "Dropping degenerate split group");
                continue;
            };
            let (chapter, verse) = (first.chapter_number, first.initial_verse_number_or_bridge());
            if self.replay_split(&group, options)? {
                report.splits_applied += 1;
            } else {
                warn!(book = %self.book_id(), chapter, %verse, "Could not reapply user split");
                report.splits_unapplied += 1;
                self.add_unapplied_split(group);
            }
        }
        Ok(())
    }

    fn replay_split(&mut self, group: &[Block], options: &ReplayOptions) -> Result<bool> {
        if group.len() < 2 {
            return Ok(false);
        }
        if let Some(index) = self.find_block_sequence(group) {
            self.mark_split_group(index..index + group.len(), group);
            return Ok(true);
        }

        let joined = join_blocks(group);
        if let Some(index) = self.blocks().iter().position(|b| b.content_equals(&joined)) {
            if let Some(range) = self.split_to_match(index, 0, group)? {
                self.mark_split_group(range, group);
                return Ok(true);
            }
        }

        if options.match_unchunked_blocks {
            let needle = joined.get_text(true, true);
            let candidates: Vec<(usize, usize)> = self
                .blocks()
                .iter()
                .enumerate()
                .filter(|(_, b)| b.chapter_number == joined.chapter_number && b.style_tag == joined.style_tag)
                .filter_map(|(i, b)| {
                    let text = b.get_text(true, true);
                    text.find(&needle).map(|byte| (i, text[..byte].chars().count()))
                })
                .collect();
            for (index, position) in candidates {
                if let Some(range) = self.split_to_match(index, position, group)? {
                    self.mark_split_group(range, group);
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Index of the first run of blocks whose content equals `group`
    fn find_block_sequence(&self, group: &[Block]) -> Option<usize> {
        self.blocks()
            .windows(group.len())
            .position(|window| window.iter().zip(group).all(|(a, b)| a.content_equals(b)))
    }

    /// Split block `index` so that the pieces starting at character
    /// `position` equal `group`, returning the range of those pieces.
    ///
    /// Nothing changes unless every piece matches.
    fn split_to_match(&mut self, index: usize, position: usize, group: &[Block]) -> Result<Option<Range<usize>>> {
        let target = &self.blocks()[index];
        let total = target.get_text(true, true).chars().count();

        let mut positions = Vec::with_capacity(group.len() + 1);
        if position > 0 {
            positions.push(position);
        }
        let mut end = position;
        for (i, block) in group.iter().enumerate() {
            end += block.get_text(true, true).chars().count();
            if i + 1 < group.len() {
                positions.push(end);
            }
        }
        if end < total {
            positions.push(end);
        }

        let mut head = target.clone();
        let mut tails = Vec::with_capacity(positions.len());
        for &at in positions.iter().rev() {
            let Ok((verse, offset)) = head.split_point_at(at) else {
                return Ok(None);
            };
            match head.split_block(&verse, offset) {
                Ok(Some(tail)) => tails.push(tail),
                _ => return Ok(None),
            }
        }
        let mut pieces = vec![head];
        pieces.extend(tails.into_iter().rev());

        let lead = usize::from(position > 0);
        let matched = group.len() + lead <= pieces.len()
            && pieces[lead..lead + group.len()]
                .iter()
                .zip(group)
                .all(|(piece, block)| piece.content_equals(block));
        if !matched {
            return Ok(None);
        }
        for piece in pieces.iter_mut().skip(1) {
            piece.split_id = None;
            piece.multi_block_quote = MultiBlockQuote::None;
        }
        self.replace_blocks(index, 1, pieces)?;
        Ok(Some(index + lead..index + lead + group.len()))
    }

    fn mark_split_group(&mut self, range: Range<usize>, group: &[Block]) {
        let id = self.next_split_id();
        for (i, source) in range.zip(group) {
            let block = self.attribution_mut(i);
            block.split_id = Some(id);
            block.set_character_and_delivery_from(source, None);
            block.user_confirmed = source.user_confirmed;
            block.multi_block_quote = if block.character_is_standard() {
                MultiBlockQuote::None
            } else {
                source.multi_block_quote
            };
        }
    }

    // ------------------------------------------------------------------
    // Reference alignments
    // ------------------------------------------------------------------

    fn apply_reference_alignments(
        &mut self,
        source: &BookScript,
        language: &dyn ReferenceLanguageInfo,
        report: &mut ReplayReport,
    ) -> Result<()> {
        for span in verse_spans(source.blocks()) {
            let group = &source.blocks()[span];
            if !group.iter().any(Block::matches_reference_text) {
                continue;
            }
            if !group.iter().all(|b| b.matches_reference_text() || !b.is_scripture()) {
                report.alignments_unapplied += 1;
                continue;
            }

            let range = match self.find_block_sequence(group) {
                Some(index) => Some(index..index + group.len()),
                None => {
                    let joined = join_blocks(group);
                    match self.blocks().iter().position(|b| b.content_equals(&joined)) {
                        Some(index) if group.len() > 1 => self.split_to_match(index, 0, group)?,
                        _ => None,
                    }
                }
            };
            let Some(range) = range else {
                warn!(
                    book = %self.book_id(),
                    chapter = group[0].chapter_number,
                    verse = %group[0].initial_verse_number_or_bridge(),
                    "Could not restore reference alignment"
                );
                report.alignments_unapplied += 1;
                continue;
            };

            for (i, source_block) in range.zip(group) {
                let Ok(reference) = source_block.matched_reference_block() else {
                    continue;
                };
                let mut reference = reference.clone_with(ReferenceBlockCloning::CloneListAndAllReferenceBlocks);
                if language.backing().is_none() {
                    reference.clear_reference_text();
                }
                let block = self.attribution_mut(i);
                block.set_matched_reference_block(reference)?;
                if block.character_is_unclear() {
                    block.set_character_and_delivery_from(source_block, None);
                }
            }
            report.alignments_restored += 1;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Confirmations
    // ------------------------------------------------------------------

    fn apply_user_confirmations(&mut self, source: &BookScript, report: &mut ReplayReport) {
        let mut cursor = 0;
        for source_block in source.blocks().iter().filter(|b| b.user_confirmed) {
            let found = (cursor..self.len()).find(|&i| {
                let block = &self.blocks()[i];
                block.is_paragraph_start == source_block.is_paragraph_start && block.content_equals(source_block)
            });
            let Some(index) = found else {
                debug!(
                    book = %self.book_id(),
                    chapter = source_block.chapter_number,
                    verse = %source_block.initial_verse_number_or_bridge(),
                    "No block for confirmed assignment"
                );
                continue;
            };
            let block = self.attribution_mut(index);
            block.set_character_and_delivery_from(source_block, None);
            block.user_confirmed = true;
            if !block.character_is_standard() {
                block.multi_block_quote = source_block.multi_block_quote;
            }
            cursor = index + 1;
            report.confirmations_applied += 1;
        }
    }

    // ------------------------------------------------------------------
    // Quote chains
    // ------------------------------------------------------------------

    /// Give each multi-block quote chain a single speaker.
    ///
    /// A chain whose blocks disagree is unified when exactly one resolved
    /// speaker/delivery combination occurs in it; otherwise the whole chain
    /// becomes ambiguous. Returns the number of chains changed.
    pub fn process_assignments_for_multi_block_quotes(&mut self) -> usize {
        let mut changed = 0;
        for chain in self.quote_chain_ranges() {
            if self.process_assignment_for_multi_block_quote(chain) {
                changed += 1;
            }
        }
        changed
    }

    fn process_assignment_for_multi_block_quote(&mut self, chain: Range<usize>) -> bool {
        let blocks = &self.blocks()[chain.clone()];
        if blocks.windows(2).all(|w| w[0].has_same_character_and_delivery(&w[1])) {
            return false;
        }

        let combinations: BTreeSet<(&str, &str, Option<&str>)> = blocks
            .iter()
            .filter(|b| !character::is_unclear(b.character_id()))
            .map(|b| (b.character_id(), b.character_id_in_script(), b.delivery.as_deref()))
            .collect();

        if combinations.len() == 1 {
            let representative = blocks
                .iter()
                .find(|b| !b.character_is_unclear())
                .map(|b| b.clone_with(ReferenceBlockCloning::SetToNewEmptyList));
            if let Some(representative) = representative {
                for i in chain {
                    self.attribution_mut(i)
                        .set_character_and_delivery_from(&representative, None);
                }
                return true;
            }
        }

        debug!(book = %self.book_id(), start = chain.start, "Quote chain speakers disagree");
        for i in chain {
            let block = self.attribution_mut(i);
            block.set_character_id(AMBIGUOUS_CHARACTER);
            block.delivery = None;
            block.user_confirmed = false;
        }
        true
    }
}

/// Concatenate blocks element by element, as if never split
fn join_blocks(group: &[Block]) -> Block {
    let mut joined = group[0].clone_with(ReferenceBlockCloning::SetToNewEmptyList);
    for block in &group[1..] {
        let mut rest = block.block_elements.iter();
        if let (Some(BlockElement::ScriptText { content }), Some(BlockElement::ScriptText { content: first })) =
            (joined.block_elements.last_mut(), block.block_elements.first())
        {
            content.push_str(first);
            rest.next();
        }
        joined.block_elements.extend(rest.cloned());
    }
    joined
}

/// Ranges of blocks that together cover whole verses
fn verse_spans(blocks: &[Block]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;
    for i in 1..blocks.len() {
        let (previous, block) = (&blocks[i - 1], &blocks[i]);
        let boundary = block.starts_at_verse_start()
            || block.chapter_number != previous.chapter_number
            || !block.is_scripture()
            || !previous.is_scripture();
        if boundary {
            spans.push(start..i);
            start = i;
        }
    }
    if start < blocks.len() {
        spans.push(start..blocks.len());
    }
    spans
}
