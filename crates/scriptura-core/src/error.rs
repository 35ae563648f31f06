//! Error types for scriptura-core

/// Result type for scriptura-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in scriptura-core operations
///
/// Every variant except the transparent wrappers signals a violated
/// precondition: the offending operation is aborted and the book is left
/// as it was before the call. Alignment failures during replay are not
/// errors; they are reported through [`crate::replay::ReplayReport`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Exactly one of two blocks being combined is aligned to reference text
    #[error("Cannot combine a reference-matched block with an unmatched one")]
    ReferenceMatchMismatch,

    /// A narrator or extra-biblical block was asked to head a quote chain
    #[error("Block {index} has standard character {character_id} and cannot head a quote chain")]
    StandardCharacterChainHead { index: usize, character_id: String },

    /// Split offset outside `(0, content_length]`
    #[error("Split offset {offset} is out of range for text of length {length}")]
    SplitOffsetOutOfRange { offset: usize, length: usize },

    /// The verse to split was not present in the block
    #[error("Verse {verse} not found in block")]
    VerseNotFound { verse: String },

    /// The position of a split does not fall inside script text
    #[error("Text position {position} does not fall within script text")]
    InvalidSplitPosition { position: usize },

    /// Verse enumeration requested for a non-scripture block
    #[error("Block with character {character_id} is not scripture")]
    NotScripture { character_id: String },

    /// A reference block was required but none was supplied
    #[error("A reference block is required")]
    MissingReferenceBlock,

    /// Apply was called while scripture blocks in the window lack alignment
    #[error("{count} scripture block(s) in the matchup are not aligned to reference text")]
    UnmatchedScriptureBlocks { count: usize },

    /// The book changed since the matchup window was computed
    #[error("Book {book_id} changed since the matchup was created")]
    StaleMatchup { book_id: String },

    /// Block index outside the book
    #[error("Block index {index} is out of range (book has {len} blocks)")]
    BlockIndexOutOfRange { index: usize, len: usize },

    /// Reference text nesting level not present or not supported
    #[error("Reference level {level} is not available")]
    ReferenceLevelUnavailable { level: usize },

    /// A block would be left in an inconsistent multi-block quote state
    #[error("Block {index} would be left with invalid quote chain state: {message}")]
    InvalidChainState { index: usize, message: String },

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn index_out_of_range(index: usize, len: usize) -> Self {
        Self::BlockIndexOutOfRange { index, len }
    }
}
