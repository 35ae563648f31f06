//! Fixture builders shared by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;

use scriptura_core::{
    Block, BookScript, CharacterVerse, CharacterVerseLookup, MultiBlockQuote, NarratorOverride,
    NarratorOverrideSource, ReferenceLanguageInfo, ReferenceLanguageSettings, ReferenceTextProvider,
    Result, Verse, Versification,
};

pub const BOOK: &str = "MRK";
pub const NARRATOR: &str = "narrator-MRK";

/// A paragraph block parsed from plain text with verse markers
pub fn block(chapter: u32, start_verse: u32, character: &str, text: &str) -> Block {
    let mut block = Block::new("p", chapter, start_verse, 0).with_character(character);
    block.parse_plain_text(text);
    block
}

pub fn narrator(chapter: u32, start_verse: u32, text: &str) -> Block {
    block(chapter, start_verse, NARRATOR, text)
}

pub fn quote(chapter: u32, start_verse: u32, character: &str, text: &str, state: MultiBlockQuote) -> Block {
    let mut quote = block(chapter, start_verse, character, text);
    quote.multi_block_quote = state;
    quote
}

pub fn section_head(chapter: u32, start_verse: u32, text: &str) -> Block {
    let mut head = Block::new("s", chapter, start_verse, 0).with_character("extra-MRK");
    head.parse_plain_text(text);
    head
}

pub fn book(blocks: Vec<Block>) -> BookScript {
    BookScript::new(BOOK, blocks)
}

/// Verse marker followed by a no-break space
pub fn v(number: &str) -> String {
    format!("{{{number}}}\u{00A0}")
}

pub struct FixedVersification {
    pub last_verses: Vec<u32>,
}

impl Versification for FixedVersification {
    fn last_verse(&self, _book_id: &str, chapter: u32) -> u32 {
        chapter
            .checked_sub(1)
            .and_then(|i| self.last_verses.get(i as usize))
            .copied()
            .unwrap_or(0)
    }

    fn last_chapter(&self, _book_id: &str) -> u32 {
        self.last_verses.len() as u32
    }
}

/// Control data keyed by (chapter, verse)
#[derive(Default)]
pub struct MapLookup {
    pub entries: HashMap<(u32, u32), Vec<CharacterVerse>>,
}

impl MapLookup {
    pub fn expect(mut self, chapter: u32, verse: u32, character_id: &str) -> Self {
        self.entries.entry((chapter, verse)).or_default().push(CharacterVerse {
            character_id: character_id.to_string(),
            delivery: None,
            is_expected: true,
        });
        self
    }
}

impl CharacterVerseLookup for MapLookup {
    fn get_characters(
        &self,
        _book_id: &str,
        chapter: u32,
        verses: &Verse,
        _versification: &dyn Versification,
    ) -> Vec<CharacterVerse> {
        (verses.start_verse..=verses.end_verse)
            .filter_map(|verse| self.entries.get(&(chapter, verse)))
            .flatten()
            .cloned()
            .collect()
    }
}

pub struct Overrides(pub Vec<NarratorOverride>);

impl NarratorOverrideSource for Overrides {
    fn overrides_for(&self, _book_id: &str) -> Vec<NarratorOverride> {
        self.0.clone()
    }
}

/// Reference text that aligns correlated blocks by position and can split
/// a block before aligning.
pub struct ScriptedProvider {
    pub language: ReferenceLanguageSettings,
    /// `(correlated index, verse, character offset)` splits, applied in order
    pub splits: Vec<(usize, String, usize)>,
    /// Reference text for correlated blocks by index, after splitting
    pub references: HashMap<usize, String>,
    pub unbreakable_verses: Vec<(u32, u32)>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            language: ReferenceLanguageSettings::default(),
            splits: Vec::new(),
            references: HashMap::new(),
            unbreakable_verses: Vec::new(),
        }
    }

    pub fn reference(mut self, index: usize, text: &str) -> Self {
        self.references.insert(index, text.to_string());
        self
    }

    pub fn split(mut self, index: usize, verse: &str, offset: usize) -> Self {
        self.splits.push((index, verse.to_string(), offset));
        self
    }
}

impl ReferenceTextProvider for ScriptedProvider {
    fn language(&self) -> &dyn ReferenceLanguageInfo {
        &self.language
    }

    fn split_and_align(&self, portion: &mut BookScript) -> Result<()> {
        for (index, verse, offset) in &self.splits {
            portion.split_block(*index, verse, *offset, false, None)?;
        }
        for (&index, text) in &self.references {
            let mut reference = portion.blocks()[index].clone();
            reference.clear_reference_text();
            reference.parse_plain_text(text);
            portion.block_mut(index)?.set_matched_reference_block(reference)?;
        }
        Ok(())
    }

    fn is_okay_to_break_at_verse(&self, _book_id: &str, chapter: u32, verse: u32) -> bool {
        !self.unbreakable_verses.contains(&(chapter, verse))
    }
}
