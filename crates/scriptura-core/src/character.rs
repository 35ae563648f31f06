//! Character identifiers
//!
//! Dramatic characters are free-form ids ("Jesus", "Peter (Simon)").
//! Standard characters are book-qualified ids produced by the parser for
//! narration and extra-biblical material, e.g. `narrator-MRK` or `BC-MRK`.

use serde::{Deserialize, Serialize};

/// Character id for a block whose speaker could be one of several
pub const AMBIGUOUS_CHARACTER: &str = "Ambiguous";

/// Character id for a block whose speaker has not been determined
pub const UNKNOWN_CHARACTER: &str = "Unknown";

/// Separator between alternatives in a multi-character id
pub const MULTI_CHARACTER_SEPARATOR: char = '/';

/// Kinds of book-qualified standard characters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandardCharacter {
    Narrator,
    /// Book title and chapter announcements
    BookOrChapter,
    /// Section heads and other extra-biblical material
    ExtraBiblical,
    Intro,
}

impl StandardCharacter {
    pub const ALL: [StandardCharacter; 4] = [
        Self::Narrator,
        Self::BookOrChapter,
        Self::ExtraBiblical,
        Self::Intro,
    ];

    fn prefix(self) -> &'static str {
        match self {
            Self::Narrator => "narrator-",
            Self::BookOrChapter => "BC-",
            Self::ExtraBiblical => "extra-",
            Self::Intro => "intro-",
        }
    }

    /// The standard character id of this kind for a book
    pub fn id_for(self, book_id: &str) -> String {
        format!("{}{}", self.prefix(), book_id)
    }

    /// Narration is scripture; the other kinds are not.
    pub fn is_scripture(self) -> bool {
        matches!(self, Self::Narrator)
    }
}

/// Standard character kind of the id, if it is one
pub fn standard_character_type(character_id: &str) -> Option<StandardCharacter> {
    StandardCharacter::ALL.into_iter().find(|kind| {
        character_id
            .strip_prefix(kind.prefix())
            .is_some_and(|book| !book.is_empty())
    })
}

pub fn is_standard(character_id: &str) -> bool {
    standard_character_type(character_id).is_some()
}

pub fn is_character_of_type(character_id: &str, kind: StandardCharacter) -> bool {
    standard_character_type(character_id) == Some(kind)
}

/// True for ids that still need a decision (ambiguous, unknown or blank)
pub fn is_unclear(character_id: &str) -> bool {
    character_id.is_empty()
        || character_id == AMBIGUOUS_CHARACTER
        || character_id == UNKNOWN_CHARACTER
}

/// The alternatives of a multi-character id, in listed order
pub fn alternatives(character_id: &str) -> impl Iterator<Item = &str> {
    character_id
        .split(MULTI_CHARACTER_SEPARATOR)
        .map(str::trim)
        .filter(|c| !c.is_empty())
}

pub fn is_multi_character(character_id: &str) -> bool {
    character_id.contains(MULTI_CHARACTER_SEPARATOR) && !is_standard(character_id)
}
