//! Book-level block sequence
//!
//! [`BookScript`] owns the ordered blocks of one book. All changes to the
//! sequence go through a small set of primitives ([`BookScript::replace_blocks`],
//! [`BookScript::split_block`], [`BookScript::combine_with_following`]) so
//! that derived data stays in step: every mutation bumps a version counter,
//! and the memoized chapter index is rebuilt lazily when its recorded
//! layout version no longer matches.

use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::block::{Block, MultiBlockQuote};
use crate::character::StandardCharacter;
use crate::collaborators::{NarratorOverride, NarratorOverrideSource, Versification};
use crate::error::{Error, Result};

/// Chapter number to index of the chapter's first block, filled as scanned
#[derive(Debug, Clone, Default)]
struct ChapterIndex {
    layout_version: u64,
    starts: BTreeMap<u32, usize>,
}

/// The blocks of one book, plus edits that could not be replayed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookScript {
    book_id: String,
    #[serde(default)]
    pub single_voice: bool,
    blocks: Vec<Block>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    unapplied_splits: Vec<Vec<Block>>,
    #[serde(skip)]
    version: u64,
    #[serde(skip)]
    layout_version: u64,
    #[serde(skip)]
    chapter_index: RefCell<ChapterIndex>,
    #[serde(skip)]
    narrator_overrides: OnceCell<Vec<NarratorOverride>>,
}

impl BookScript {
    pub fn new(book_id: impl Into<String>, blocks: Vec<Block>) -> Self {
        Self {
            book_id: book_id.into(),
            single_voice: false,
            blocks,
            unapplied_splits: Vec::new(),
            version: 0,
            layout_version: 0,
            chapter_index: RefCell::new(ChapterIndex::default()),
            narrator_overrides: OnceCell::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn book_id(&self) -> &str {
        &self.book_id
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Incremented by every mutation of the block sequence or its blocks
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Mutable access to one block.
    ///
    /// The caller may change anything, including chapter and verse, so all
    /// derived data is invalidated.
    pub fn block_mut(&mut self, index: usize) -> Result<&mut Block> {
        let len = self.blocks.len();
        if index >= len {
            return Err(Error::index_out_of_range(index, len));
        }
        self.on_blocks_reset();
        Ok(&mut self.blocks[index])
    }

    /// Mutable access for changes that leave chapter and verse untouched
    pub(crate) fn attribution_mut(&mut self, index: usize) -> &mut Block {
        self.version += 1;
        &mut self.blocks[index]
    }

    // ------------------------------------------------------------------
    // Structural-change hooks
    // ------------------------------------------------------------------

    fn on_blocks_reset(&mut self) {
        self.version += 1;
        self.layout_version += 1;
    }

    /// Shift cached chapter starts past an insertion instead of discarding them
    fn on_blocks_inserted(&mut self, index: usize, count: usize) {
        let cache = self.chapter_index.get_mut();
        let current = cache.layout_version == self.layout_version;
        self.version += 1;
        self.layout_version += 1;
        if !current {
            return;
        }
        cache.starts = std::mem::take(&mut cache.starts)
            .into_iter()
            .filter(|&(_, start)| start != index)
            .map(|(chapter, start)| (chapter, if start > index { start + count } else { start }))
            .collect();
        cache.layout_version = self.layout_version;
    }

    // ------------------------------------------------------------------
    // Verse lookup
    // ------------------------------------------------------------------

    /// Best known block index to start scanning for `chapter`: its cached
    /// start, else the nearest earlier chapter's, else the beginning.
    fn chapter_scan_start(&self, chapter: u32) -> usize {
        let mut cache = self.chapter_index.borrow_mut();
        if cache.layout_version != self.layout_version {
            *cache = ChapterIndex {
                layout_version: self.layout_version,
                starts: BTreeMap::new(),
            };
        }
        cache
            .starts
            .range(..=chapter)
            .next_back()
            .map_or(0, |(_, &start)| start)
    }

    fn record_chapter_start(&self, chapter: u32, index: usize) {
        self.chapter_index
            .borrow_mut()
            .starts
            .entry(chapter)
            .or_insert(index);
    }

    /// Index of the first block covering `verse` of `chapter`, including
    /// blocks that reach it only through a verse bridge.
    pub fn get_index_of_first_block_for_verse(&self, chapter: u32, verse: u32) -> Option<usize> {
        let start = self.chapter_scan_start(chapter);
        for i in start..self.blocks.len() {
            let block = &self.blocks[i];
            if i == 0 || self.blocks[i - 1].chapter_number != block.chapter_number {
                self.record_chapter_start(block.chapter_number, i);
            }
            if block.chapter_number < chapter {
                continue;
            }
            if block.chapter_number > chapter {
                return None;
            }
            if !block.is_scripture() {
                continue;
            }
            if block.covers_verse(verse) {
                return Some(i);
            }
            if block.initial_start_verse_number() > verse {
                return None;
            }
        }
        None
    }

    pub fn get_first_block_for_verse(&self, chapter: u32, verse: u32) -> Option<&Block> {
        self.get_index_of_first_block_for_verse(chapter, verse)
            .map(|i| &self.blocks[i])
    }

    /// Indices of every consecutive block covering `verse` of `chapter`
    pub fn get_block_range_for_verse(&self, chapter: u32, verse: u32) -> Option<Range<usize>> {
        let first = self.get_index_of_first_block_for_verse(chapter, verse)?;
        let mut end = first + 1;
        while end < self.blocks.len()
            && self.blocks[end].chapter_number == chapter
            && self.blocks[end].covers_verse(verse)
        {
            end += 1;
        }
        Some(first..end)
    }

    pub fn get_blocks_for_verse(&self, chapter: u32, verse: u32) -> &[Block] {
        self.get_block_range_for_verse(chapter, verse)
            .map_or(&[][..], |range| &self.blocks[range])
    }

    /// Verses of `chapter` that no block covers
    pub fn missing_verses(&self, chapter: u32, versification: &dyn Versification) -> Vec<u32> {
        (1..=versification.last_verse(&self.book_id, chapter))
            .filter(|&v| self.get_index_of_first_block_for_verse(chapter, v).is_none())
            .collect()
    }

    // ------------------------------------------------------------------
    // Narrator overrides
    // ------------------------------------------------------------------

    /// The character that voices block `index` in the script.
    ///
    /// Narrator blocks inside a narrator-override range are voiced by the
    /// override character. Overrides are read from `source` once and kept
    /// for the life of the book.
    pub fn effective_character_id_in_script(
        &self,
        index: usize,
        source: &dyn NarratorOverrideSource,
    ) -> Result<String> {
        let block = self
            .blocks
            .get(index)
            .ok_or_else(|| Error::index_out_of_range(index, self.blocks.len()))?;
        if !block.character_is(StandardCharacter::Narrator) {
            return Ok(block.character_id_in_script().to_string());
        }
        let overrides = self
            .narrator_overrides
            .get_or_init(|| source.overrides_for(&self.book_id));
        let (chapter, verse) = (block.chapter_number, block.initial_start_verse_number());
        Ok(overrides
            .iter()
            .find(|o| o.covers(chapter, verse))
            .map_or_else(|| block.character_id_in_script().to_string(), |o| o.character_id.clone()))
    }

    // ------------------------------------------------------------------
    // Structural primitives
    // ------------------------------------------------------------------

    /// Replace `count` blocks starting at `start` with `new_blocks`.
    ///
    /// A quote chain left dangling by the splice is repaired: a "Start"
    /// block immediately before the splice is demoted unless the first new
    /// block continues it, and continuation blocks after the splice are
    /// re-rooted or updated.
    pub fn replace_blocks(&mut self, start: usize, count: usize, new_blocks: Vec<Block>) -> Result<()> {
        let len = self.blocks.len();
        if start + count > len {
            return Err(Error::index_out_of_range(start + count, len));
        }
        if let Some(last) = new_blocks.last() {
            if last.character_is_standard() && last.multi_block_quote != MultiBlockQuote::None {
                return Err(Error::InvalidChainState {
                    index: start + new_blocks.len() - 1,
                    message: format!("standard character {} in a quote chain", last.character_id()),
                });
            }
        }

        let inserted = new_blocks.len();
        let continued = new_blocks
            .first()
            .or_else(|| self.blocks.get(start + count))
            .is_some_and(|b| b.multi_block_quote == MultiBlockQuote::Continuation);
        if start > 0 && self.blocks[start - 1].multi_block_quote == MultiBlockQuote::Start && !continued {
            self.blocks[start - 1].multi_block_quote = MultiBlockQuote::None;
        }
        self.blocks.splice(start..start + count, new_blocks);
        if count == 0 {
            self.on_blocks_inserted(start, inserted);
        } else {
            self.on_blocks_reset();
        }

        if inserted > 0 {
            self.update_following_continuation_blocks(start + inserted - 1)?;
        } else if start > 0 {
            self.update_following_continuation_blocks(start - 1)?;
        }
        Ok(())
    }

    /// Repair the quote chain following block `index`.
    ///
    /// If the block is not part of a chain, continuation blocks after it
    /// have lost their head: two or more are re-rooted (the first becomes
    /// "Start"), a lone one is cleared. If it is part of a chain, its
    /// character and delivery are copied to the continuation blocks that
    /// follow.
    pub fn update_following_continuation_blocks(&mut self, index: usize) -> Result<()> {
        let len = self.blocks.len();
        let block = self
            .blocks
            .get(index)
            .ok_or_else(|| Error::index_out_of_range(index, len))?;
        let following = (index + 1..len)
            .take_while(|&i| self.blocks[i].multi_block_quote == MultiBlockQuote::Continuation)
            .count();
        if following == 0 {
            return Ok(());
        }

        match block.multi_block_quote {
            MultiBlockQuote::None => {
                let state = if following >= 2 {
                    MultiBlockQuote::Start
                } else {
                    MultiBlockQuote::None
                };
                self.attribution_mut(index + 1).multi_block_quote = state;
            }
            MultiBlockQuote::Start | MultiBlockQuote::Continuation => {
                if block.character_is_standard() {
                    return Err(Error::StandardCharacterChainHead {
                        index,
                        character_id: block.character_id().to_string(),
                    });
                }
                let head = block.clone();
                for i in index + 1..=index + following {
                    self.attribution_mut(i).set_character_and_delivery_from(&head, None);
                }
            }
        }
        Ok(())
    }

    /// Demote every "Start" block in `range` that no continuation follows
    pub(crate) fn demote_dangling_quote_heads(&mut self, range: Range<usize>) {
        for i in range.start..range.end.min(self.blocks.len()) {
            if self.blocks[i].multi_block_quote == MultiBlockQuote::Start
                && self.blocks.get(i + 1).is_none_or(|b| b.multi_block_quote != MultiBlockQuote::Continuation)
            {
                self.attribution_mut(i).multi_block_quote = MultiBlockQuote::None;
            }
        }
    }

    pub(crate) fn next_split_id(&self) -> u32 {
        self.blocks
            .iter()
            .filter_map(|b| b.split_id)
            .max()
            .map_or(0, |id| id + 1)
    }

    /// Split block `index` at `offset` characters into the text of
    /// `verse_to_split`, returning the index of the new block.
    ///
    /// A user split gives both halves a shared split id, breaks any quote
    /// chain at the split point, and assigns `character_id` (if given) to
    /// the new block. Other splits (made while aligning to reference text)
    /// keep the new block in the original's chain.
    pub fn split_block(
        &mut self,
        index: usize,
        verse_to_split: &str,
        offset: usize,
        user_split: bool,
        character_id: Option<&str>,
    ) -> Result<Option<usize>> {
        let len = self.blocks.len();
        let mut block = self
            .blocks
            .get(index)
            .cloned()
            .ok_or_else(|| Error::index_out_of_range(index, len))?;
        let Some(mut new_block) = block.split_block(verse_to_split, offset)? else {
            return Ok(None);
        };

        if user_split {
            let id = block.split_id.unwrap_or_else(|| self.next_split_id());
            block.split_id = Some(id);
            new_block.split_id = Some(id);
            new_block.multi_block_quote = MultiBlockQuote::None;
            if let Some(character_id) = character_id {
                new_block.set_character_id(character_id);
                new_block.user_confirmed = false;
            }
        } else {
            new_block.split_id = block.split_id;
            new_block.multi_block_quote = match block.multi_block_quote {
                MultiBlockQuote::None => MultiBlockQuote::None,
                _ => MultiBlockQuote::Continuation,
            };
        }

        tracing::debug!(
            book = %self.book_id,
            index,
            verse = verse_to_split,
            offset,
            user_split,
            "Splitting block"
        );
        self.blocks[index] = block;
        self.on_blocks_reset();
        self.replace_blocks(index + 1, 0, vec![new_block])?;
        Ok(Some(index + 1))
    }

    /// Merge block `index + 1` into block `index`
    pub fn combine_with_following(&mut self, index: usize) -> Result<()> {
        let len = self.blocks.len();
        if index + 1 >= len {
            return Err(Error::index_out_of_range(index + 1, len));
        }
        let mut combined = self.blocks[index].clone();
        combined.combine_with(&self.blocks[index + 1])?;

        let split_elsewhere = |i: Option<usize>| {
            i.and_then(|i| self.blocks.get(i))
                .is_some_and(|b| b.split_id.is_some() && b.split_id == combined.split_id)
        };
        if !split_elsewhere(index.checked_sub(1)) && !split_elsewhere(Some(index + 2)) {
            combined.split_id = None;
        }
        self.replace_blocks(index, 2, vec![combined])
    }

    /// Index ranges of contiguous blocks sharing a split id
    pub fn split_group_ranges(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut i = 0;
        while i < self.blocks.len() {
            let Some(id) = self.blocks[i].split_id else {
                i += 1;
                continue;
            };
            let end = (i + 1..self.blocks.len())
                .find(|&j| self.blocks[j].split_id != Some(id))
                .unwrap_or(self.blocks.len());
            if end - i > 1 {
                ranges.push(i..end);
            }
            i = end;
        }
        ranges
    }

    /// The blocks of each split group, in book order
    pub fn split_groups(&self) -> Vec<&[Block]> {
        self.split_group_ranges()
            .into_iter()
            .map(|range| &self.blocks[range])
            .collect()
    }

    /// Block index ranges of every multi-block quote chain
    pub fn quote_chain_ranges(&self) -> Vec<Range<usize>> {
        let mut chains = Vec::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if block.multi_block_quote != MultiBlockQuote::Start {
                continue;
            }
            let end = (i + 1..self.blocks.len())
                .find(|&j| self.blocks[j].multi_block_quote != MultiBlockQuote::Continuation)
                .unwrap_or(self.blocks.len());
            chains.push(i..end);
        }
        chains
    }

    // ------------------------------------------------------------------
    // Unapplied splits
    // ------------------------------------------------------------------

    /// Split groups from a previous parse that could not be replayed
    pub fn unapplied_splits(&self) -> &[Vec<Block>] {
        &self.unapplied_splits
    }

    /// Record a split group for later replay. Groups of fewer than two
    /// blocks describe no split and are discarded; returns whether `group`
    /// was kept.
    pub fn add_unapplied_split(&mut self, group: Vec<Block>) -> bool {
        if group.len() < 2 {
            return false;
        }
        self.unapplied_splits.push(group);
        true
    }

    pub fn remove_unapplied_split(&mut self, index: usize) -> Option<Vec<Block>> {
        (index < self.unapplied_splits.len()).then(|| self.unapplied_splits.remove(index))
    }

    pub fn clear_unapplied_splits(&mut self) {
        self.unapplied_splits.clear();
    }
}
