//! Blocks: speaker-attributed paragraph or quote segments
//!
//! A [`Block`] carries its style, chapter/verse position, speaker
//! attribution and ordered [`BlockElement`]s. It may be aligned to a block
//! of reference text, and that reference block may in turn be aligned to a
//! block in a backing reference language. Deeper nesting is rejected.
//!
//! Reference blocks are held behind an [`Arc`]: a plain `clone()` shares the
//! list with the original (copy-on-write on mutation), while
//! [`Block::clone_with`] offers an explicit deep copy or an empty list.
//!
//! Text offsets used by split operations count Unicode scalar values.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::character::{self, StandardCharacter};
use crate::collaborators::CharacterContext;
use crate::element::{self, BlockElement, Token, Verse, is_punctuation_only};
use crate::error::{Error, Result};

/// Maximum nesting of reference blocks below a vernacular block
pub const MAX_REFERENCE_DEPTH: usize = 2;

/// Position of a block within a quotation spanning several paragraphs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MultiBlockQuote {
    #[default]
    None,
    Start,
    Continuation,
}

/// How [`Block::clone_with`] treats reference blocks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReferenceBlockCloning {
    /// Share the original list
    #[default]
    CrossLinkToOriginalReferenceBlockList,
    /// Deep-copy the list and every nested reference block
    CloneListAndAllReferenceBlocks,
    /// Start with no reference blocks
    SetToNewEmptyList,
}

/// One paragraph or quote segment of script text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub style_tag: String,
    #[serde(default)]
    pub is_paragraph_start: bool,
    pub chapter_number: u32,
    initial_start_verse_number: u32,
    #[serde(default)]
    initial_end_verse_number: u32,
    character_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    character_id_override_for_script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<String>,
    #[serde(default)]
    pub user_confirmed: bool,
    #[serde(default)]
    pub multi_block_quote: MultiBlockQuote,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_id: Option<u32>,
    pub block_elements: Vec<BlockElement>,
    #[serde(default, skip_serializing_if = "is_empty_list")]
    reference_blocks: Arc<Vec<Block>>,
    #[serde(default)]
    matches_reference_text: bool,
}

fn is_empty_list(blocks: &Arc<Vec<Block>>) -> bool {
    blocks.is_empty()
}

impl Block {
    pub fn new(style_tag: impl Into<String>, chapter_number: u32, start_verse: u32, end_verse: u32) -> Self {
        let mut block = Self {
            style_tag: style_tag.into(),
            is_paragraph_start: false,
            chapter_number,
            initial_start_verse_number: 0,
            initial_end_verse_number: 0,
            character_id: String::new(),
            character_id_override_for_script: None,
            delivery: None,
            user_confirmed: false,
            multi_block_quote: MultiBlockQuote::None,
            split_id: None,
            block_elements: Vec::new(),
            reference_blocks: Arc::new(Vec::new()),
            matches_reference_text: false,
        };
        block.set_initial_verses(start_verse, end_verse);
        block
    }

    /// Builder-style character assignment
    pub fn with_character(mut self, character_id: impl Into<String>) -> Self {
        self.set_character_id(character_id);
        self
    }

    /// Builder-style element list
    pub fn with_elements(mut self, elements: impl IntoIterator<Item = BlockElement>) -> Self {
        self.block_elements = elements.into_iter().collect();
        self
    }

    pub fn paragraph_start(mut self) -> Self {
        self.is_paragraph_start = true;
        self
    }

    // ------------------------------------------------------------------
    // Verses
    // ------------------------------------------------------------------

    pub fn initial_start_verse_number(&self) -> u32 {
        self.initial_start_verse_number
    }

    /// End of the initial bridge, or 0 when the block starts with a single verse
    pub fn initial_end_verse_number(&self) -> u32 {
        self.initial_end_verse_number
    }

    /// Set the starting verse; an end equal to (or before) the start is stored as 0.
    pub fn set_initial_verses(&mut self, start: u32, end: u32) {
        self.initial_start_verse_number = start;
        self.initial_end_verse_number = if end > start { end } else { 0 };
    }

    pub fn initial_verse(&self) -> Verse {
        Verse::from_range(self.initial_start_verse_number, self.initial_end_verse_number)
    }

    pub fn initial_verse_number_or_bridge(&self) -> String {
        self.initial_verse().number
    }

    /// The last verse marked in the block, or the initial verse when none is
    pub fn last_verse(&self) -> Verse {
        self.block_elements
            .iter()
            .rev()
            .find_map(BlockElement::as_verse)
            .cloned()
            .unwrap_or_else(|| self.initial_verse())
    }

    pub fn last_verse_number(&self) -> u32 {
        self.last_verse().end_verse
    }

    /// Whether `verse` is covered by the initial verse or any verse marker
    pub fn covers_verse(&self, verse: u32) -> bool {
        self.initial_verse().contains(verse)
            || self
                .block_elements
                .iter()
                .filter_map(BlockElement::as_verse)
                .any(|v| v.contains(verse))
    }

    /// Every verse in the block, starting with the initial one.
    ///
    /// Only scripture blocks have verses; asking a section head or chapter
    /// announcement is an error.
    pub fn all_verses(&self) -> Result<Vec<Verse>> {
        if !self.is_scripture() {
            return Err(Error::NotScripture {
                character_id: self.character_id.clone(),
            });
        }
        let mut verses = vec![self.initial_verse()];
        for verse in self.block_elements.iter().filter_map(BlockElement::as_verse) {
            if verses.last().is_some_and(|last| last.number == verse.number) {
                continue;
            }
            verses.push(verse.clone());
        }
        Ok(verses)
    }

    /// True when the block's first real content is a verse marker
    pub fn starts_at_verse_start(&self) -> bool {
        self.block_elements
            .iter()
            .find(|e| !matches!(e, BlockElement::ScriptText { content } if is_punctuation_only(content)))
            .is_some_and(|e| matches!(e, BlockElement::Verse(_)))
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    pub fn character_id(&self) -> &str {
        &self.character_id
    }

    /// Assign a character, clearing any in-script override
    pub fn set_character_id(&mut self, character_id: impl Into<String>) {
        self.character_id = character_id.into();
        self.character_id_override_for_script = None;
    }

    /// The id used in the script: the override if any, else the character id
    pub fn character_id_in_script(&self) -> &str {
        self.character_id_override_for_script
            .as_deref()
            .unwrap_or(&self.character_id)
    }

    pub fn character_id_override_for_script(&self) -> Option<&str> {
        self.character_id_override_for_script.as_deref()
    }

    pub fn set_character_id_in_script(&mut self, character_id: Option<String>) {
        self.character_id_override_for_script = character_id.filter(|c| *c != self.character_id);
    }

    /// Assign a character and, for a multi-character id, pick the id used in
    /// the script: the first alternative the control data expects in this
    /// block's verses, else the first listed.
    pub fn set_character_id_and_character_id_in_script(
        &mut self,
        character_id: impl Into<String>,
        context: Option<&CharacterContext<'_>>,
    ) {
        self.set_character_id(character_id);
        if !character::is_multi_character(&self.character_id) {
            return;
        }
        let expected = context.and_then(|ctx| {
            let candidates = ctx.characters(self.chapter_number, &self.initial_verse());
            character::alternatives(&self.character_id)
                .find(|alt| {
                    candidates
                        .iter()
                        .any(|c| c.is_expected && c.character_id == *alt)
                })
                .map(str::to_string)
        });
        let chosen = expected.or_else(|| {
            character::alternatives(&self.character_id)
                .next()
                .map(str::to_string)
        });
        self.set_character_id_in_script(chosen);
    }

    /// Copy character, in-script override and delivery from another block
    pub fn set_character_and_delivery_from(&mut self, other: &Block, context: Option<&CharacterContext<'_>>) {
        self.set_character_id_and_character_id_in_script(other.character_id.clone(), context);
        if other.character_id_override_for_script.is_some() {
            self.character_id_override_for_script = other.character_id_override_for_script.clone();
        }
        self.delivery = other.delivery.clone();
    }

    /// Same character, override and delivery as `other`
    pub fn has_same_character_and_delivery(&self, other: &Block) -> bool {
        self.character_id == other.character_id
            && self.character_id_in_script() == other.character_id_in_script()
            && self.delivery == other.delivery
    }

    pub fn character_is_standard(&self) -> bool {
        character::is_standard(&self.character_id)
    }

    pub fn character_is(&self, kind: StandardCharacter) -> bool {
        character::is_character_of_type(&self.character_id, kind)
    }

    pub fn character_is_unclear(&self) -> bool {
        character::is_unclear(&self.character_id)
    }

    /// Narration and dramatic speech are scripture; headings and intros are not.
    pub fn is_scripture(&self) -> bool {
        character::standard_character_type(&self.character_id)
            .is_none_or(StandardCharacter::is_scripture)
    }

    pub fn is_quote(&self) -> bool {
        !self.character_is_standard() || self.user_confirmed
    }

    // ------------------------------------------------------------------
    // Style
    // ------------------------------------------------------------------

    /// Paragraph styles that continue the preceding paragraph rather than
    /// starting a new unit of speech (poetry indents, margin paragraphs).
    pub fn is_follow_on_paragraph_style(&self) -> bool {
        matches!(self.style_tag.as_str(), "m" | "mi" | "nb" | "pmc")
            || (self.style_tag.starts_with('q') && !matches!(self.style_tag.as_str(), "q" | "q1"))
    }

    pub fn is_chapter_announcement(&self) -> bool {
        matches!(self.style_tag.as_str(), "c" | "cl")
    }

    /// Text to record for this block; chapter announcements are rendered by
    /// `format(book_id, chapter)` when it yields a value.
    pub fn chapter_announcement_text<F>(&self, book_id: &str, format: F) -> String
    where
        F: Fn(&str, u32) -> Option<String>,
    {
        if self.is_chapter_announcement() {
            if let Some(text) = format(book_id, self.chapter_number) {
                return text;
            }
        }
        self.get_text(false, false)
    }

    // ------------------------------------------------------------------
    // Text
    // ------------------------------------------------------------------

    pub fn get_text(&self, include_verse_numbers: bool, include_annotations: bool) -> String {
        let mut text = String::new();
        for element in &self.block_elements {
            element.write_text(&mut text, include_verse_numbers, include_annotations);
        }
        text
    }

    /// Replace the block's elements with those parsed from `text`.
    ///
    /// Verse markers (`{3}`, `{3-5}`) and annotation markers are recognized.
    /// Two verse markers with no text between them collapse into one
    /// covering both. Punctuation preceding a leading verse marker (an
    /// opening quotation mark, say) moves into that verse's text. The result
    /// always holds at least one script text element.
    pub fn parse_plain_text(&mut self, text: &str) {
        let mut elements: Vec<BlockElement> = Vec::new();
        let mut leading_punctuation = String::new();

        for token in element::tokenize(text) {
            match token {
                Token::Text(run) => {
                    let run = if leading_punctuation.is_empty() {
                        run
                    } else {
                        std::mem::take(&mut leading_punctuation) + &run
                    };
                    match elements.last_mut() {
                        Some(BlockElement::ScriptText { content }) => content.push_str(&run),
                        _ => elements.push(BlockElement::text(run)),
                    }
                }
                Token::Marker(BlockElement::Verse(verse)) => {
                    if let [BlockElement::ScriptText { content }] = elements.as_slice() {
                        if is_punctuation_only(content) {
                            leading_punctuation = content.trim_end().to_string();
                            elements.clear();
                        }
                    }
                    if let Some(BlockElement::ScriptText { content }) = elements.last() {
                        let follows_verse = elements.len() >= 2
                            && matches!(elements[elements.len() - 2], BlockElement::Verse(_));
                        if follows_verse && content.trim().is_empty() {
                            elements.pop();
                        }
                    }
                    match elements.last_mut() {
                        Some(BlockElement::Verse(prev)) => {
                            *prev = Verse::from_range(prev.start_verse, verse.end_verse.max(prev.end_verse));
                        }
                        _ => elements.push(BlockElement::Verse(verse)),
                    }
                }
                Token::Marker(annotation) => elements.push(annotation),
            }
        }

        if !leading_punctuation.is_empty() {
            elements.push(BlockElement::text(leading_punctuation));
        }
        if !matches!(elements.last(), Some(BlockElement::ScriptText { .. })) {
            elements.push(BlockElement::text(""));
        }
        if let Some(BlockElement::Verse(first)) = elements.first() {
            let (start, end) = (first.start_verse, first.end_verse);
            self.set_initial_verses(start, end);
        }
        self.block_elements = elements;
    }

    /// Same position and content: style, chapter, initial verse and elements
    pub fn content_equals(&self, other: &Block) -> bool {
        self.style_tag == other.style_tag
            && self.chapter_number == other.chapter_number
            && self.initial_start_verse_number == other.initial_start_verse_number
            && self.initial_end_verse_number == other.initial_end_verse_number
            && self.block_elements == other.block_elements
    }

    // ------------------------------------------------------------------
    // Reference text
    // ------------------------------------------------------------------

    /// Aligned to exactly one reference block
    pub fn matches_reference_text(&self) -> bool {
        self.matches_reference_text && self.reference_blocks.len() == 1
    }

    pub fn reference_blocks(&self) -> &[Block] {
        &self.reference_blocks
    }

    /// True when both blocks hold the very same reference block list
    pub fn shares_reference_blocks_with(&self, other: &Block) -> bool {
        Arc::ptr_eq(&self.reference_blocks, &other.reference_blocks)
    }

    /// The single aligned reference block
    pub fn matched_reference_block(&self) -> Result<&Block> {
        if self.matches_reference_text() {
            Ok(&self.reference_blocks[0])
        } else {
            Err(Error::MissingReferenceBlock)
        }
    }

    /// The aligned block at `level` (0 = primary, 1 = backing language)
    pub fn reference_block_at(&self, level: usize) -> Option<&Block> {
        let mut block = self;
        for _ in 0..=level {
            block = block.matched_reference_block().ok()?;
        }
        Some(block)
    }

    pub(crate) fn reference_block_at_mut(&mut self, level: usize) -> Option<&mut Block> {
        if !self.matches_reference_text() {
            return None;
        }
        let primary = &mut Arc::make_mut(&mut self.reference_blocks)[0];
        if level == 0 {
            Some(primary)
        } else {
            primary.reference_block_at_mut(level - 1)
        }
    }

    /// Levels of reference blocks nested below this block
    pub fn reference_depth(&self) -> usize {
        self.reference_blocks
            .iter()
            .map(|b| 1 + b.reference_depth())
            .max()
            .unwrap_or(0)
    }

    /// Align this block 1:1 with `reference`, dropping any unresolved candidates
    pub fn set_matched_reference_block(&mut self, reference: Block) -> Result<()> {
        if reference.reference_depth() >= MAX_REFERENCE_DEPTH {
            return Err(Error::ReferenceLevelUnavailable {
                level: reference.reference_depth() + 1,
            });
        }
        self.reference_blocks = Arc::new(vec![reference]);
        self.matches_reference_text = true;
        Ok(())
    }

    /// Align this block to a reference block parsed from `text`.
    ///
    /// When `text` does not begin with a verse marker, the reference block
    /// starts at the last verse of `previous_reference` (or, lacking one, at
    /// this block's initial verse). Any backing-language alignment of the
    /// current reference block is kept.
    pub fn set_matched_reference_block_from_text(
        &mut self,
        text: &str,
        previous_reference: Option<&Block>,
    ) -> Result<&Block> {
        let existing = self.matched_reference_block().ok().cloned();
        let mut reference = Block::new(
            self.style_tag.clone(),
            self.chapter_number,
            self.initial_start_verse_number,
            self.initial_end_verse_number,
        );
        match &existing {
            Some(existing) => reference.set_character_and_delivery_from(existing, None),
            None => reference.set_character_and_delivery_from(self, None),
        }
        if let Some(previous) = previous_reference {
            let verse = previous.last_verse();
            reference.set_initial_verses(verse.start_verse, verse.end_verse);
        }
        reference.parse_plain_text(text);
        if let Some(existing) = existing {
            reference.reference_blocks = existing.reference_blocks.clone();
            reference.matches_reference_text = existing.matches_reference_text;
        }
        self.set_matched_reference_block(reference)?;
        self.matched_reference_block()
    }

    /// Record candidate reference blocks that still need to be resolved to one
    pub fn set_unmatched_reference_blocks(&mut self, candidates: Vec<Block>) {
        self.reference_blocks = Arc::new(candidates);
        self.matches_reference_text = false;
    }

    pub fn clear_reference_text(&mut self) {
        self.reference_blocks = Arc::new(Vec::new());
        self.matches_reference_text = false;
    }

    // ------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------

    pub fn clone_with(&self, behavior: ReferenceBlockCloning) -> Block {
        let mut copy = self.clone();
        match behavior {
            ReferenceBlockCloning::CrossLinkToOriginalReferenceBlockList => {}
            ReferenceBlockCloning::CloneListAndAllReferenceBlocks => {
                copy.reference_blocks = Arc::new(
                    self.reference_blocks
                        .iter()
                        .map(|b| b.clone_with(behavior))
                        .collect(),
                );
            }
            ReferenceBlockCloning::SetToNewEmptyList => {
                copy.reference_blocks = Arc::new(Vec::new());
                copy.matches_reference_text = false;
            }
        }
        copy
    }

    /// Append `other`'s content to this block.
    ///
    /// Adjacent script text is joined: a leading ellipsis on the joined side
    /// is dropped and a single space is inserted unless whitespace is
    /// already present at the seam. Aligned reference blocks are combined
    /// the same way, level by level.
    pub fn combine_with(&mut self, other: &Block) -> Result<()> {
        if self.matches_reference_text() != other.matches_reference_text() {
            return Err(Error::ReferenceMatchMismatch);
        }
        self.combine_unchecked(other);
        self.user_confirmed &= other.user_confirmed;
        Ok(())
    }

    fn combine_unchecked(&mut self, other: &Block) {
        let mut rest = other.block_elements.iter();
        if let (Some(BlockElement::ScriptText { content: last }), Some(BlockElement::ScriptText { content: first })) =
            (self.block_elements.last_mut(), other.block_elements.first())
        {
            let joined = strip_leading_ellipsis(first);
            let needs_space = !last.is_empty()
                && !joined.is_empty()
                && !last.ends_with(char::is_whitespace)
                && !joined.starts_with(char::is_whitespace);
            if needs_space {
                last.push(' ');
            }
            last.push_str(joined);
            rest.next();
        }
        self.block_elements.extend(rest.cloned());

        match (self.matches_reference_text(), other.matches_reference_text()) {
            (true, true) => {
                let refs = Arc::make_mut(&mut self.reference_blocks);
                refs[0].combine_unchecked(&other.reference_blocks[0]);
            }
            (false, true) if self.reference_blocks.is_empty() => {
                self.reference_blocks = other.reference_blocks.clone();
                self.matches_reference_text = true;
            }
            (false, _) if !other.reference_blocks.is_empty() => {
                Arc::make_mut(&mut self.reference_blocks).extend(other.reference_blocks.iter().cloned());
            }
            _ => {}
        }
    }

    /// Split this block inside the script text of `verse_to_split`.
    ///
    /// `offset` counts characters across all script text of the verse,
    /// skipping annotations. Everything after it moves to the returned
    /// block. When the rest of the text is empty or only punctuation and a
    /// verse marker follows, the split moves to just before that marker and
    /// the new block starts at that verse. Returns `Ok(None)` for a split at
    /// the very end of the block.
    pub fn split_block(&mut self, verse_to_split: &str, offset: usize) -> Result<Option<Block>> {
        let mut current_verse = self.initial_verse_number_or_bridge();
        let mut verse_found = false;
        let mut verse_length = 0;
        let mut target = None;
        for (i, element) in self.block_elements.iter().enumerate() {
            match element {
                BlockElement::Verse(_) if verse_found => break,
                BlockElement::Verse(v) => current_verse = v.number.clone(),
                BlockElement::ScriptText { content } if current_verse == verse_to_split => {
                    verse_found = true;
                    let len = content.chars().count();
                    if target.is_none() && offset > verse_length && offset <= verse_length + len {
                        target = Some((i, content.clone(), offset - verse_length));
                    }
                    verse_length += len;
                }
                _ => {}
            }
        }
        if !verse_found {
            return Err(Error::VerseNotFound {
                verse: verse_to_split.to_string(),
            });
        }
        let Some((index, content, local_offset)) = target else {
            return Err(Error::SplitOffsetOutOfRange {
                offset,
                length: verse_length,
            });
        };

        let byte = byte_index(&content, local_offset);
        let remainder = &content[byte..];
        let following_verse = self
            .block_elements
            .get(index + 1)
            .and_then(BlockElement::as_verse)
            .cloned();

        let (start, end, moved_text) = match following_verse {
            Some(next) if is_punctuation_only(remainder) => (next.start_verse, next.end_verse, None),
            _ if remainder.is_empty() => {
                if index + 1 == self.block_elements.len() {
                    return Ok(None);
                }
                let (s, e) = element::parse_verse_number(verse_to_split);
                (s, e, None)
            }
            _ => {
                let (s, e) = element::parse_verse_number(verse_to_split);
                (s, e, Some(remainder.to_string()))
            }
        };

        let mut new_block = Block::new(self.style_tag.clone(), self.chapter_number, start, end);
        new_block.character_id = self.character_id.clone();
        new_block.character_id_override_for_script = self.character_id_override_for_script.clone();
        new_block.delivery = self.delivery.clone();
        new_block.user_confirmed = self.user_confirmed;

        let moved = self.block_elements.split_off(index + 1);
        if let Some(text) = moved_text {
            if let BlockElement::ScriptText { content } = &mut self.block_elements[index] {
                content.truncate(byte);
            }
            new_block.block_elements.push(BlockElement::text(text));
        }
        new_block.block_elements.extend(moved);
        Ok(Some(new_block))
    }

    /// Translate a character position in `get_text(true, true)` into the
    /// `(verse, offset)` pair [`Block::split_block`] expects.
    pub fn split_point_at(&self, position: usize) -> Result<(String, usize)> {
        let mut current_verse = self.initial_verse_number_or_bridge();
        let mut consumed = 0;
        let mut verse_text = 0;
        let mut rendered = String::new();
        for element in &self.block_elements {
            rendered.clear();
            element.write_text(&mut rendered, true, true);
            let len = rendered.chars().count();
            match element {
                BlockElement::Verse(v) => {
                    current_verse = v.number.clone();
                    verse_text = 0;
                }
                BlockElement::ScriptText { .. } => {
                    if position > consumed && position <= consumed + len {
                        return Ok((current_verse, verse_text + position - consumed));
                    }
                    verse_text += len;
                }
                _ => {}
            }
            consumed += len;
        }
        Err(Error::InvalidSplitPosition { position })
    }
}

/// Drop a leading `...` or `…` from text joined onto a preceding block
fn strip_leading_ellipsis(text: &str) -> &str {
    text.strip_prefix("...")
        .or_else(|| text.strip_prefix('…'))
        .unwrap_or(text)
}

fn byte_index(text: &str, char_offset: usize) -> usize {
    text.char_indices()
        .nth(char_offset)
        .map_or(text.len(), |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn block(start: u32, text: &str) -> Block {
        let mut b = Block::new("p", 1, start, 0).with_character("narrator-GEN");
        b.parse_plain_text(text);
        b
    }

    #[test]
    fn bridge_end_equal_to_start_is_stored_as_zero() {
        let b = Block::new("p", 1, 4, 4);
        assert_eq!(b.initial_end_verse_number(), 0);
        let b = Block::new("p", 1, 4, 6);
        assert_eq!(b.initial_end_verse_number(), 6);
        assert_eq!(b.initial_verse_number_or_bridge(), "4-6");
    }

    #[test]
    fn parse_plain_text_with_interior_verse() {
        let mut b = Block::new("p", 1, 0, 0);
        b.parse_plain_text("{3}\u{00A0}In the beginning... {4}\u{00A0}And God said");
        assert_eq!(b.initial_start_verse_number(), 3);
        assert_eq!(
            b.block_elements,
            vec![
                BlockElement::verse("3"),
                BlockElement::text("In the beginning... "),
                BlockElement::verse("4"),
                BlockElement::text("And God said"),
            ]
        );
    }

    #[test]
    fn parse_plain_text_collapses_adjacent_verse_markers() {
        let mut b = Block::new("p", 1, 0, 0);
        b.parse_plain_text("{3}\u{00A0}{4}\u{00A0}Text");
        assert_eq!(b.block_elements, vec![BlockElement::verse("3-4"), BlockElement::text("Text")]);
        assert_eq!(b.initial_end_verse_number(), 4);
    }

    #[test]
    fn parse_plain_text_moves_leading_punctuation_into_verse_text() {
        let mut b = Block::new("p", 1, 0, 0);
        b.parse_plain_text("“{5}\u{00A0}Listen!");
        assert_eq!(b.block_elements, vec![BlockElement::verse("5"), BlockElement::text("“Listen!")]);
        assert!(b.starts_at_verse_start());
    }

    #[test]
    fn parse_plain_text_of_empty_input_has_one_text_element() {
        let mut b = Block::new("p", 1, 2, 0);
        b.parse_plain_text("");
        assert_eq!(b.block_elements, vec![BlockElement::text("")]);
        assert_eq!(b.initial_start_verse_number(), 2);
    }

    #[test]
    fn get_text_optionally_includes_markers() {
        let b = block(1, "{1}\u{00A0}Hello {F8 Music--Starts @ v2}{2}\u{00A0}world");
        assert_eq!(b.get_text(false, false), "Hello world");
        assert_eq!(b.get_text(true, false), "{1}\u{00A0}Hello {2}\u{00A0}world");
        assert_eq!(
            b.get_text(true, true),
            "{1}\u{00A0}Hello {F8 Music--Starts @ v2}{2}\u{00A0}world"
        );
    }

    #[test]
    fn split_in_middle_of_verse_text() {
        let mut b = block(1, "{1}\u{00A0}Hello there world");
        let tail = b.split_block("1", 12).unwrap().unwrap();
        assert_eq!(b.get_text(false, false), "Hello there ");
        assert_eq!(tail.get_text(false, false), "world");
        assert_eq!(tail.initial_start_verse_number(), 1);
        assert_eq!(tail.character_id(), "narrator-GEN");
    }

    #[test]
    fn split_at_end_of_verse_starts_new_block_at_next_verse() {
        let mut b = block(1, "{1}\u{00A0}One. {2}\u{00A0}Two.");
        let tail = b.split_block("1", 5).unwrap().unwrap();
        assert_eq!(b.get_text(true, false), "{1}\u{00A0}One. ");
        assert_eq!(tail.initial_start_verse_number(), 2);
        assert!(tail.starts_at_verse_start());
    }

    #[test]
    fn split_before_trailing_punctuation_keeps_punctuation() {
        let mut b = block(1, "{1}\u{00A0}One.” {2-3}\u{00A0}Two.");
        let tail = b.split_block("1", 4).unwrap().unwrap();
        assert_eq!(b.get_text(false, false), "One.” ");
        assert_eq!(tail.initial_verse_number_or_bridge(), "2-3");
    }

    #[test]
    fn split_at_content_end_with_nothing_following_is_no_split() {
        let mut b = block(1, "{1}\u{00A0}Hello");
        assert!(b.split_block("1", 5).unwrap().is_none());
        assert_eq!(b.get_text(false, false), "Hello");
    }

    #[test]
    fn split_offset_out_of_range_is_an_error() {
        let mut b = block(1, "{1}\u{00A0}Hello");
        assert!(matches!(
            b.split_block("1", 0),
            Err(Error::SplitOffsetOutOfRange { offset: 0, length: 5 })
        ));
        assert!(matches!(b.split_block("1", 6), Err(Error::SplitOffsetOutOfRange { .. })));
        assert!(matches!(b.split_block("9", 1), Err(Error::VerseNotFound { .. })));
    }

    #[test]
    fn combine_inserts_space_and_strips_ellipsis() {
        let mut a = block(1, "{1}\u{00A0}He went");
        let b = block(1, "...to the city");
        a.combine_with(&b).unwrap();
        assert_eq!(a.get_text(false, false), "He went to the city");
    }

    #[test]
    fn combine_does_not_double_whitespace() {
        let mut a = block(1, "{1}\u{00A0}He went ");
        let b = block(1, "home");
        a.combine_with(&b).unwrap();
        assert_eq!(a.get_text(false, false), "He went home");
    }

    #[test]
    fn combine_matched_with_unmatched_fails() {
        let mut a = block(1, "{1}\u{00A0}A");
        a.set_matched_reference_block(block(1, "{1}\u{00A0}Ref")).unwrap();
        let b = block(1, "B");
        assert!(matches!(a.combine_with(&b), Err(Error::ReferenceMatchMismatch)));
        assert_eq!(a.get_text(false, false), "A");
    }

    #[test]
    fn combine_merges_reference_blocks_at_every_level() {
        let mut backing_a = block(1, "{1}\u{00A0}Er ging");
        backing_a.set_character_id("narrator-GEN");
        let mut ref_a = block(1, "{1}\u{00A0}He went");
        ref_a.set_matched_reference_block(backing_a).unwrap();
        let mut a = block(1, "{1}\u{00A0}Il alla");
        a.set_matched_reference_block(ref_a).unwrap();

        let mut ref_b = block(1, "home.");
        ref_b.set_matched_reference_block(block(1, "heim.")).unwrap();
        let mut b = block(1, "chez lui.");
        b.set_matched_reference_block(ref_b).unwrap();

        a.combine_with(&b).unwrap();
        assert_eq!(a.get_text(false, false), "Il alla chez lui.");
        assert_eq!(a.reference_block_at(0).unwrap().get_text(false, false), "He went home.");
        assert_eq!(a.reference_block_at(1).unwrap().get_text(false, false), "Er ging heim.");
    }

    #[test]
    fn clone_cross_link_shares_and_deep_clone_is_independent() {
        let mut original = block(1, "{1}\u{00A0}A");
        original.set_matched_reference_block(block(1, "{1}\u{00A0}Ref")).unwrap();

        let linked = original.clone_with(ReferenceBlockCloning::CrossLinkToOriginalReferenceBlockList);
        assert!(linked.shares_reference_blocks_with(&original));

        let mut deep = original.clone_with(ReferenceBlockCloning::CloneListAndAllReferenceBlocks);
        assert!(!deep.shares_reference_blocks_with(&original));
        deep.reference_block_at_mut(0).unwrap().parse_plain_text("{1}\u{00A0}Changed");
        assert_eq!(original.reference_block_at(0).unwrap().get_text(false, false), "Ref");

        let empty = original.clone_with(ReferenceBlockCloning::SetToNewEmptyList);
        assert!(empty.reference_blocks().is_empty());
        assert!(!empty.matches_reference_text());
    }

    #[test]
    fn reference_nesting_is_limited() {
        let mut backing = block(1, "b");
        backing.set_matched_reference_block(block(1, "c")).unwrap();
        let mut primary = block(1, "a");
        primary.set_matched_reference_block(backing).unwrap();
        let mut vern = block(1, "v");
        assert!(matches!(
            vern.set_matched_reference_block(primary),
            Err(Error::ReferenceLevelUnavailable { .. })
        ));
    }

    #[test]
    fn unmatched_candidates_do_not_count_as_match() {
        let mut b = block(1, "{1}\u{00A0}A");
        b.set_unmatched_reference_blocks(vec![block(1, "x"), block(1, "y")]);
        assert!(!b.matches_reference_text());
        assert_eq!(b.reference_blocks().len(), 2);
        b.set_matched_reference_block(block(1, "z")).unwrap();
        assert!(b.matches_reference_text());
        assert_eq!(b.reference_blocks().len(), 1);
        b.clear_reference_text();
        assert!(b.reference_blocks().is_empty());
    }

    #[test]
    fn reference_from_text_infers_verse_from_previous_reference() {
        let previous = block(6, "{6}\u{00A0}x {7}\u{00A0}y");
        let mut b = block(7, "more");
        let reference = b.set_matched_reference_block_from_text("and then", Some(&previous)).unwrap();
        assert_eq!(reference.initial_start_verse_number(), 7);
        let reference = b.set_matched_reference_block_from_text("{8}\u{00A0}new", Some(&previous)).unwrap();
        assert_eq!(reference.initial_start_verse_number(), 8);
    }

    #[test]
    fn all_verses_requires_scripture() {
        let b = block(1, "{1}\u{00A0}A {2}\u{00A0}B");
        let numbers: Vec<_> = b.all_verses().unwrap().into_iter().map(|v| v.number).collect();
        assert_eq!(numbers, vec!["1", "2"]);

        let heading = Block::new("s", 1, 1, 0).with_character("extra-GEN");
        assert!(matches!(heading.all_verses(), Err(Error::NotScripture { .. })));
    }

    #[test]
    fn is_quote_for_dramatic_or_confirmed_blocks() {
        let mut b = Block::new("p", 1, 1, 0).with_character("narrator-GEN");
        assert!(!b.is_quote());
        b.user_confirmed = true;
        assert!(b.is_quote());
        assert!(Block::new("p", 1, 1, 0).with_character("God").is_quote());
    }

    #[test]
    fn chapter_announcement_uses_explicit_formatter() {
        let b = Block::new("c", 3, 0, 0)
            .with_character("BC-GEN")
            .with_elements([BlockElement::text("3")]);
        let text = b.chapter_announcement_text("GEN", |book, ch| Some(format!("{book} chapter {ch}")));
        assert_eq!(text, "GEN chapter 3");
        assert_eq!(b.chapter_announcement_text("GEN", |_, _| None), "3");
    }

    #[test]
    fn split_point_at_maps_rendered_positions() {
        let b = block(1, "{1}\u{00A0}One. {2}\u{00A0}Two.");
        // "{1} " is 4 chars, "One. " is 5
        assert_eq!(b.split_point_at(9).unwrap(), ("1".to_string(), 5));
        assert_eq!(b.split_point_at(15).unwrap(), ("2".to_string(), 2));
        assert!(b.split_point_at(11).is_err());
    }

    #[test]
    fn split_inside_verse_skips_annotation() {
        let mut b = block(1, "{1}\u{00A0}Hello {F8 Music--Starts @ v1}world wide {2}\u{00A0}Two");
        let rendered = b.get_text(true, true);
        let position = rendered.find("wide").map(|byte| rendered[..byte].chars().count()).unwrap();
        let (verse, offset) = b.split_point_at(position).unwrap();
        assert_eq!((verse.as_str(), offset), ("1", 12));

        let tail = b.split_block(&verse, offset).unwrap().unwrap();
        assert_eq!(tail.get_text(true, true), "wide {2}\u{00A0}Two");
        assert_eq!(b.get_text(true, true), "{1}\u{00A0}Hello {F8 Music--Starts @ v1}world ");
        assert!(matches!(
            b.split_block("1", 13),
            Err(Error::SplitOffsetOutOfRange { offset: 13, length: 12 })
        ));
    }
}
