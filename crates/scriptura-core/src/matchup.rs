//! Block matchups: aligning a window of vernacular blocks to reference text
//!
//! A [`BlockMatchup`] takes a window of consecutive blocks around an anchor
//! block, expanded outward to verse breaks where it is safe to cut. It works
//! on deep copies (the "correlated" blocks) so the book is untouched until
//! [`BlockMatchup::apply`] writes the result back.
//!
//! The matchup remembers the book's version when it was built. Applying it
//! to a book that has changed since is refused.

use tracing::{debug, trace, warn};

use crate::block::{Block, MultiBlockQuote, ReferenceBlockCloning};
use crate::book::BookScript;
use crate::character::StandardCharacter;
use crate::collaborators::CharacterContext;
use crate::element::{BlockElement, Verse};
use crate::error::{Error, Result};
use crate::reference::{ReferenceLanguageInfo, ReferenceLanguageSettings};

/// Dash characters that introduce dialogue in some orthographies
const DIALOGUE_DASHES: [char; 4] = ['-', '\u{2013}', '\u{2014}', '\u{2015}'];

pub struct BlockMatchup {
    book_id: String,
    book_version: u64,
    start_index: usize,
    original_count: usize,
    original_blocks: Vec<Block>,
    portion: BookScript,
    anchor_offset: usize,
    language: ReferenceLanguageSettings,
}

impl std::fmt::Debug for BlockMatchup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockMatchup")
            .field("book_id", &self.book_id)
            .field("start_index", &self.start_index)
            .field("original_count", &self.original_count)
            .field("correlated", &self.portion.len())
            .finish()
    }
}

impl BlockMatchup {
    /// Build a matchup around `anchor_index`.
    ///
    /// With `predetermined_block_count` the window is exactly that many
    /// blocks starting at the anchor. Otherwise it grows backward and
    /// forward to verse breaks that `is_okay_to_break_at_verse` allows and
    /// that neither split a verse bridge nor separate a repeated verse.
    /// `split_blocks` then splits and aligns the correlated copy.
    pub fn new<B, S>(
        book: &BookScript,
        anchor_index: usize,
        predetermined_block_count: Option<usize>,
        is_okay_to_break_at_verse: B,
        split_blocks: S,
        language: &dyn ReferenceLanguageInfo,
    ) -> Result<Self>
    where
        B: Fn(u32, u32) -> bool,
        S: FnOnce(&mut BookScript) -> Result<()>,
    {
        let blocks = book.blocks();
        let anchor = blocks
            .get(anchor_index)
            .ok_or_else(|| Error::index_out_of_range(anchor_index, blocks.len()))?;

        let window = match predetermined_block_count {
            Some(count) => anchor_index..(anchor_index + count.max(1)).min(blocks.len()),
            None => {
                let mut start = anchor_index;
                while start > 0 && !is_clean_break_before(blocks, start, &is_okay_to_break_at_verse) {
                    start -= 1;
                }
                trace!(anchor = anchor_index, start, "Expanded matchup window backward");
                let mut last = anchor_index;
                advance_to_clean_verse_break(blocks, &is_okay_to_break_at_verse, &mut last);
                while last > start && !blocks[last].is_scripture() {
                    last -= 1;
                }
                trace!(anchor = anchor_index, last, "Expanded matchup window forward");
                start..last + 1
            }
        };

        let original_blocks = blocks[window.clone()].to_vec();
        let correlated = original_blocks
            .iter()
            .map(|b| b.clone_with(ReferenceBlockCloning::CloneListAndAllReferenceBlocks))
            .collect();
        let mut portion = BookScript::new(book.book_id(), correlated);
        split_blocks(&mut portion)?;
        if portion.is_empty() {
            return Err(Error::index_out_of_range(anchor_index - window.start, 0));
        }

        let anchor_offset = locate_anchor(&portion, anchor, anchor_index - window.start);
        debug!(
            book = book.book_id(),
            start = window.start,
            count = window.len(),
            added = portion.len().saturating_sub(window.len()),
            "Built block matchup"
        );

        Ok(Self {
            book_id: book.book_id().to_string(),
            book_version: book.version(),
            start_index: window.start,
            original_count: window.len(),
            original_blocks,
            portion,
            anchor_offset,
            language: ReferenceLanguageSettings::from_info(language),
        })
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn language(&self) -> &ReferenceLanguageSettings {
        &self.language
    }

    /// The working copies, after splitting for alignment
    pub fn correlated_blocks(&self) -> &[Block] {
        self.portion.blocks()
    }

    pub fn correlated_anchor_block(&self) -> &Block {
        &self.portion.blocks()[self.anchor_offset]
    }

    pub fn original_blocks(&self) -> &[Block] {
        &self.original_blocks
    }

    pub fn index_of_start_block_in_book(&self) -> usize {
        self.start_index
    }

    pub fn original_block_count(&self) -> usize {
        self.original_count
    }

    pub fn includes_book_index(&self, book_index: usize) -> bool {
        (self.start_index..self.start_index + self.original_count).contains(&book_index)
    }

    pub fn count_of_blocks_added_by_splitting(&self) -> usize {
        self.portion.len().saturating_sub(self.original_count)
    }

    pub fn all_scripture_blocks_match(&self) -> bool {
        self.correlated_blocks()
            .iter()
            .filter(|b| b.is_scripture())
            .all(Block::matches_reference_text)
    }

    /// True when applying would change the book
    pub fn has_outstanding_changes(&self) -> bool {
        self.correlated_blocks() != self.original_blocks.as_slice()
    }

    /// Mutable access to a correlated block
    pub fn correlated_block_mut(&mut self, index: usize) -> Result<&mut Block> {
        self.portion.block_mut(index)
    }

    // ------------------------------------------------------------------
    // Alignment
    // ------------------------------------------------------------------

    /// Ensure every correlated block is aligned to exactly one reference block.
    ///
    /// Blocks already aligned only pick up the reference block's character
    /// when their own is unresolved. Other blocks get a reference block
    /// synthesized from their candidates (joined with the word separator),
    /// or an empty one when there are none.
    pub fn match_all_blocks(&mut self, context: Option<&CharacterContext<'_>>) -> Result<()> {
        for i in 0..self.portion.len() {
            let block = &self.portion.blocks()[i];
            if block.matches_reference_text() {
                if block.character_is_unclear() {
                    let reference = block.matched_reference_block()?.clone();
                    self.portion
                        .attribution_mut(i)
                        .set_character_and_delivery_from(&reference, context);
                }
                continue;
            }

            let reference = synthesize_reference_block(block, &self.language)?;
            let adopt = block.character_is_unclear()
                || (i > 0 && narrator_dash_applies(&self.portion.blocks()[i - 1], block, &reference));
            let target = self.portion.attribution_mut(i);
            if adopt {
                target.set_character_and_delivery_from(&reference, context);
            }
            target.set_matched_reference_block(reference)?;
        }
        Ok(())
    }

    /// Align correlated block `index` at `level` to a reference block parsed
    /// from `text`.
    ///
    /// When `text` does not start with a verse, the reference block starts
    /// at the last verse of the previous block's reference at that level.
    /// Each level's running verse is then carried into the following
    /// reference blocks of that level, until one starts with its own verse
    /// marker. Propagation ends once every level has met one.
    pub fn set_reference_text(&mut self, index: usize, text: &str, level: usize) -> Result<()> {
        let len = self.portion.len();
        if index >= len {
            return Err(Error::index_out_of_range(index, len));
        }
        if level >= self.language.levels() {
            return Err(Error::ReferenceLevelUnavailable { level });
        }
        let previous = index
            .checked_sub(1)
            .and_then(|i| self.portion.blocks()[i].reference_block_at(level))
            .cloned();

        let block = self.portion.attribution_mut(index);
        let owner = match level {
            0 => block,
            _ => block
                .reference_block_at_mut(level - 1)
                .ok_or(Error::ReferenceLevelUnavailable { level })?,
        };
        owner.set_matched_reference_block_from_text(text, previous.as_ref())?;

        let edited = &self.portion.blocks()[index];
        let mut running: Vec<Option<Verse>> = (0..self.language.levels())
            .map(|l| edited.reference_block_at(l).map(Block::last_verse))
            .collect();

        for j in index + 1..len {
            if running.iter().all(Option::is_none) {
                break;
            }
            for (l, verse) in running.iter_mut().enumerate() {
                let Some(current) = verse.as_ref() else {
                    continue;
                };
                let needs_verse = self.portion.blocks()[j]
                    .reference_block_at(l)
                    .is_some_and(|r| !r.starts_at_verse_start());
                if !needs_verse {
                    *verse = None;
                    continue;
                }
                let (start, end) = (current.start_verse, current.end_verse);
                *verse = self
                    .portion
                    .attribution_mut(j)
                    .reference_block_at_mut(l)
                    .map(|reference| {
                        reference.set_initial_verses(start, end);
                        reference.last_verse()
                    });
            }
        }
        Ok(())
    }

    /// Fill empty reference placeholders of narrator blocks with the
    /// language's "he said" text.
    ///
    /// Applies to block `index` when it is narrated or its speaker is
    /// unresolved (which then becomes the narrator), at every reference
    /// level. Continuation blocks that follow in the same quote chain with
    /// an unresolved speaker are resolved to the narrator the same way.
    /// `on_change(index, level, text)` is called for each block changed;
    /// `text` is empty when only the speaker was resolved.
    pub fn insert_he_said_text<F>(&mut self, index: usize, mut on_change: F) -> Result<()>
    where
        F: FnMut(usize, usize, &str),
    {
        let len = self.portion.len();
        if index >= len {
            return Err(Error::index_out_of_range(index, len));
        }
        self.insert_he_said_into_block(index, &mut on_change)?;

        for j in index + 1..len {
            let block = &self.portion.blocks()[j];
            if block.multi_block_quote != MultiBlockQuote::Continuation {
                break;
            }
            if !block.character_is_unclear() {
                continue;
            }
            if !self.insert_he_said_into_block(j, &mut on_change)? {
                let narrator = StandardCharacter::Narrator.id_for(&self.book_id);
                self.portion.attribution_mut(j).set_character_id(narrator);
                on_change(j, 0, "");
            }
        }
        Ok(())
    }

    fn insert_he_said_into_block<F>(&mut self, index: usize, on_change: &mut F) -> Result<bool>
    where
        F: FnMut(usize, usize, &str),
    {
        let block = &self.portion.blocks()[index];
        if !(block.character_is(StandardCharacter::Narrator) || block.character_is_unclear()) {
            return Ok(false);
        }
        let continues_paragraph = self
            .portion
            .blocks()
            .get(index + 1)
            .is_some_and(|next| !next.is_paragraph_start);

        let mut changed = false;
        for level in 0..self.language.levels() {
            let Some(reference) = self.portion.blocks()[index].reference_block_at(level) else {
                break;
            };
            if !is_empty_placeholder(reference) {
                continue;
            }
            let verse_prefix = placeholder_verse_prefix(reference);
            let Some(language) = self.language.at_level(level) else {
                break;
            };
            let mut text = language.he_said_text.clone();
            if continues_paragraph {
                text.push_str(&language.word_separator);
            }
            if level == 0 && self.portion.blocks()[index].character_is_unclear() {
                let narrator = StandardCharacter::Narrator.id_for(&self.book_id);
                self.portion.attribution_mut(index).set_character_id(narrator);
            }
            self.set_reference_text(index, &format!("{verse_prefix}{text}"), level)?;
            on_change(index, level, &text);
            changed = true;
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Apply
    // ------------------------------------------------------------------

    /// Write the correlated blocks back into `book`.
    ///
    /// Fails if the book changed since the matchup was built, or if any
    /// scripture block is still unaligned. Blocks added by splitting are
    /// spliced in; otherwise alignment, speaker, split id and chain state
    /// are copied block by block. Narrator and other standard-character
    /// blocks leave any quote chain.
    pub fn apply(&mut self, book: &mut BookScript, context: Option<&CharacterContext<'_>>) -> Result<()> {
        if book.book_id() != self.book_id || book.version() != self.book_version {
            return Err(Error::StaleMatchup {
                book_id: self.book_id.clone(),
            });
        }
        let unmatched = self
            .correlated_blocks()
            .iter()
            .filter(|b| b.is_scripture() && !b.matches_reference_text())
            .count();
        if unmatched > 0 {
            return Err(Error::UnmatchedScriptureBlocks { count: unmatched });
        }

        let blocks: Vec<Block> = self
            .correlated_blocks()
            .iter()
            .map(|b| {
                let mut block = b.clone_with(ReferenceBlockCloning::CloneListAndAllReferenceBlocks);
                if block.character_is_standard() {
                    block.multi_block_quote = MultiBlockQuote::None;
                }
                block
            })
            .collect();
        let start = self.start_index;
        let count = blocks.len();

        if self.count_of_blocks_added_by_splitting() > 0 {
            book.replace_blocks(start, self.original_count, blocks.clone())?;
        } else {
            for (offset, source) in blocks.iter().enumerate() {
                let target = book.attribution_mut(start + offset);
                if source.matches_reference_text() {
                    target.set_matched_reference_block(source.matched_reference_block()?.clone())?;
                }
                target.set_character_and_delivery_from(source, context);
                target.user_confirmed = source.user_confirmed;
                target.split_id = source.split_id;
                target.multi_block_quote = source.multi_block_quote;
            }
        }

        for i in start..start + count {
            if book.blocks()[i].multi_block_quote == MultiBlockQuote::None {
                book.update_following_continuation_blocks(i)?;
            }
        }
        book.demote_dangling_quote_heads(start.saturating_sub(1)..start + count);
        for i in start..start + count {
            let block = &book.blocks()[i];
            if block.character_is_standard() && block.multi_block_quote != MultiBlockQuote::None {
                warn!(book = %self.book_id, index = i, "Standard character left in quote chain");
                return Err(Error::InvalidChainState {
                    index: i,
                    message: format!("standard character {} in a quote chain", block.character_id()),
                });
            }
        }

        debug!(book = %self.book_id, start, count, "Applied block matchup");
        self.book_version = book.version();
        self.original_blocks = blocks;
        self.original_count = count;
        Ok(())
    }
}

/// Whether a window may begin at block `index`
fn is_clean_break_before<B>(blocks: &[Block], index: usize, is_okay_to_break_at_verse: &B) -> bool
where
    B: Fn(u32, u32) -> bool,
{
    if index == 0 || index >= blocks.len() {
        return true;
    }
    let (previous, block) = (&blocks[index - 1], &blocks[index]);
    if !block.is_scripture() || !previous.is_scripture() {
        return true;
    }
    if block.chapter_number != previous.chapter_number {
        return is_okay_to_break_at_verse(block.chapter_number, block.initial_start_verse_number());
    }
    block.starts_at_verse_start()
        && block.initial_start_verse_number() > previous.last_verse_number()
        && is_okay_to_break_at_verse(block.chapter_number, block.initial_start_verse_number())
}

/// Move `index` forward to the last block before the next clean break
fn advance_to_clean_verse_break<B>(blocks: &[Block], is_okay_to_break_at_verse: &B, index: &mut usize)
where
    B: Fn(u32, u32) -> bool,
{
    while *index + 1 < blocks.len() && !is_clean_break_before(blocks, *index + 1, is_okay_to_break_at_verse) {
        *index += 1;
    }
}

/// Position of the anchor among the correlated blocks after splitting
fn locate_anchor(portion: &BookScript, anchor: &Block, original_offset: usize) -> usize {
    let anchor_text = anchor.get_text(true, true);
    (original_offset..portion.len())
        .find(|&i| {
            let block = &portion.blocks()[i];
            block.chapter_number == anchor.chapter_number
                && block.initial_start_verse_number() == anchor.initial_start_verse_number()
                && anchor_text.starts_with(&block.get_text(true, true))
        })
        .unwrap_or(original_offset.min(portion.len().saturating_sub(1)))
}

/// Reference block for a block that has no single aligned reference
fn synthesize_reference_block(block: &Block, language: &ReferenceLanguageSettings) -> Result<Block> {
    let candidates = block.reference_blocks();
    let mut reference = match candidates.split_first() {
        Some((first, [])) => first.clone_with(ReferenceBlockCloning::CloneListAndAllReferenceBlocks),
        Some((first, rest)) => {
            let mut combined = first.clone_with(ReferenceBlockCloning::SetToNewEmptyList);
            for candidate in rest {
                append_with_separator(&mut combined, candidate, &language.word_separator);
            }
            // Backing blocks of every candidate become candidates one level down
            let backing: Vec<Block> = candidates
                .iter()
                .flat_map(|c| c.reference_blocks().iter().cloned())
                .collect();
            if language.backing.is_some() && !backing.is_empty() {
                combined.set_unmatched_reference_blocks(backing);
            }
            combined
        }
        None => {
            let verse = block.initial_verse();
            let mut empty = Block::new(
                block.style_tag.clone(),
                block.chapter_number,
                verse.start_verse,
                verse.end_verse,
            );
            empty.set_character_and_delivery_from(block, None);
            empty.block_elements = if block.starts_at_verse_start() {
                vec![BlockElement::Verse(verse), BlockElement::text("")]
            } else {
                vec![BlockElement::text("")]
            };
            empty
        }
    };
    reference.is_paragraph_start = block.is_paragraph_start;

    if let Some(backing) = language.backing.as_deref() {
        if !reference.matches_reference_text() {
            let backing_reference = synthesize_reference_block(&reference, backing)?;
            reference.set_matched_reference_block(backing_reference)?;
        }
    }
    Ok(reference)
}

fn append_with_separator(target: &mut Block, other: &Block, separator: &str) {
    let mut rest = other.block_elements.iter();
    if let (Some(BlockElement::ScriptText { content }), Some(BlockElement::ScriptText { content: first })) =
        (target.block_elements.last_mut(), other.block_elements.first())
    {
        if !content.is_empty()
            && !first.is_empty()
            && !content.ends_with(char::is_whitespace)
            && !first.starts_with(char::is_whitespace)
        {
            content.push_str(separator);
        }
        content.push_str(first);
        rest.next();
    }
    target.block_elements.extend(rest.cloned());
}

/// A dash-introduced block right after a block by the same speaker, whose
/// reference text is narration, is the narrator's interjection.
fn narrator_dash_applies(previous: &Block, block: &Block, reference: &Block) -> bool {
    !block.character_is_standard()
        && block.character_id() == previous.character_id()
        && reference.character_is(StandardCharacter::Narrator)
        && block
            .get_text(false, false)
            .trim_start()
            .starts_with(DIALOGUE_DASHES)
}

fn is_empty_placeholder(reference: &Block) -> bool {
    reference.get_text(false, false).trim().is_empty()
}

/// The verse marker an empty placeholder carries, rendered for re-parsing
fn placeholder_verse_prefix(reference: &Block) -> String {
    if reference.starts_at_verse_start() {
        reference.get_text(true, false)
    } else {
        String::new()
    }
}
