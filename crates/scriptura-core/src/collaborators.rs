//! Interfaces of the external data sources the core consults
//!
//! Control data (which characters speak in which verses), versification,
//! and narrator overrides live outside this crate. Callers supply
//! implementations of these traits.

use serde::{Deserialize, Serialize};

use crate::element::Verse;

/// One character expected (or merely possible) in a verse range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterVerse {
    pub character_id: String,
    pub delivery: Option<String>,
    pub is_expected: bool,
}

/// Versification queries
pub trait Versification {
    /// Number of the last verse of a chapter, 0 if the chapter does not exist
    fn last_verse(&self, book_id: &str, chapter: u32) -> u32;

    /// Number of the last chapter of a book
    fn last_chapter(&self, book_id: &str) -> u32;

    /// Map a reference onto this versification
    fn canonicalize(&self, _book_id: &str, chapter: u32, verse: u32) -> (u32, u32) {
        (chapter, verse)
    }
}

/// Character/delivery control data lookup
pub trait CharacterVerseLookup {
    fn get_characters(
        &self,
        book_id: &str,
        chapter: u32,
        verses: &Verse,
        versification: &dyn Versification,
    ) -> Vec<CharacterVerse>;
}

/// Bundles what is needed to resolve character ids against control data
#[derive(Clone, Copy)]
pub struct CharacterContext<'a> {
    pub book_id: &'a str,
    pub lookup: &'a dyn CharacterVerseLookup,
    pub versification: &'a dyn Versification,
}

impl<'a> CharacterContext<'a> {
    pub fn new(
        book_id: &'a str,
        lookup: &'a dyn CharacterVerseLookup,
        versification: &'a dyn Versification,
    ) -> Self {
        Self {
            book_id,
            lookup,
            versification,
        }
    }

    pub fn characters(&self, chapter: u32, verses: &Verse) -> Vec<CharacterVerse> {
        self.lookup
            .get_characters(self.book_id, chapter, verses, self.versification)
    }
}

/// A range of verses in which narration is voiced by another character
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NarratorOverride {
    pub start_chapter: u32,
    pub start_verse: u32,
    pub end_chapter: u32,
    pub end_verse: u32,
    pub character_id: String,
}

impl NarratorOverride {
    pub fn covers(&self, chapter: u32, verse: u32) -> bool {
        (self.start_chapter, self.start_verse) <= (chapter, verse)
            && (chapter, verse) <= (self.end_chapter, self.end_verse)
    }
}

/// Source of narrator overrides for a book
pub trait NarratorOverrideSource {
    fn overrides_for(&self, book_id: &str) -> Vec<NarratorOverride>;
}
