//! Reference languages
//!
//! A reference language supplies the canonical "he said" clause used to
//! fill narrator placeholders and the separator placed between joined
//! words. It may be backed by a second reference language (for example an
//! English translation backing a French reference text).

use serde::{Deserialize, Serialize};

use crate::book::BookScript;
use crate::error::Result;
use crate::matchup::BlockMatchup;

/// What the alignment engine needs to know about a reference language
pub trait ReferenceLanguageInfo {
    /// Canonical reporting clause, e.g. "he said."
    fn he_said_text(&self) -> &str;

    /// Separator between words when text is joined
    fn word_separator(&self) -> &str;

    /// The backing language, if this reference text has one
    fn backing(&self) -> Option<&dyn ReferenceLanguageInfo>;

    fn has_backing(&self) -> bool {
        self.backing().is_some()
    }
}

/// Reference-language settings, as read from configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceLanguageSettings {
    pub he_said_text: String,
    pub word_separator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backing: Option<Box<ReferenceLanguageSettings>>,
}

impl Default for ReferenceLanguageSettings {
    fn default() -> Self {
        Self {
            he_said_text: "he said.".to_string(),
            word_separator: " ".to_string(),
            backing: None,
        }
    }
}

impl ReferenceLanguageSettings {
    pub fn new(he_said_text: impl Into<String>, word_separator: impl Into<String>) -> Self {
        Self {
            he_said_text: he_said_text.into(),
            word_separator: word_separator.into(),
            backing: None,
        }
    }

    pub fn with_backing(mut self, backing: ReferenceLanguageSettings) -> Self {
        self.backing = Some(Box::new(backing));
        self
    }

    /// Snapshot any implementation, including its backing chain
    pub fn from_info(info: &dyn ReferenceLanguageInfo) -> Self {
        Self {
            he_said_text: info.he_said_text().to_string(),
            word_separator: info.word_separator().to_string(),
            backing: info.backing().map(|b| Box::new(Self::from_info(b))),
        }
    }

    /// Number of reference levels: 1, or 2 with a backing language
    pub fn levels(&self) -> usize {
        1 + self.backing.as_ref().map_or(0, |b| b.levels())
    }

    /// Settings of the language at `level` (0 = this one)
    pub fn at_level(&self, level: usize) -> Option<&ReferenceLanguageSettings> {
        match level {
            0 => Some(self),
            _ => self.backing.as_deref()?.at_level(level - 1),
        }
    }
}

impl ReferenceLanguageInfo for ReferenceLanguageSettings {
    fn he_said_text(&self) -> &str {
        &self.he_said_text
    }

    fn word_separator(&self) -> &str {
        &self.word_separator
    }

    fn backing(&self) -> Option<&dyn ReferenceLanguageInfo> {
        self.backing
            .as_deref()
            .map(|b| b as &dyn ReferenceLanguageInfo)
    }
}

/// A reference text that can align windows of a vernacular book
pub trait ReferenceTextProvider {
    fn language(&self) -> &dyn ReferenceLanguageInfo;

    /// Split the correlated copy of a window to match the reference text
    /// and attach the reference blocks it corresponds to.
    fn split_and_align(&self, portion: &mut BookScript) -> Result<()>;

    /// Whether a matchup window may begin or end at this verse
    fn is_okay_to_break_at_verse(&self, _book_id: &str, _chapter: u32, _verse: u32) -> bool {
        true
    }

    fn get_blocks_for_verse_matched_to_reference_text(
        &self,
        book: &BookScript,
        block_index: usize,
        predetermined_block_count: Option<usize>,
    ) -> Result<BlockMatchup> {
        BlockMatchup::new(
            book,
            block_index,
            predetermined_block_count,
            |chapter, verse| self.is_okay_to_break_at_verse(book.book_id(), chapter, verse),
            |portion| self.split_and_align(portion),
            self.language(),
        )
    }
}
