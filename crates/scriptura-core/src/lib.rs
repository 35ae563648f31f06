//! Block model, reference-text alignment and edit replay for dramatized
//! scripture recording scripts
//!
//! A book is a sequence of speaker-attributed [`Block`]s. Blocks can be
//! split and combined, aligned to reference text through a
//! [`BlockMatchup`], and the decisions made on one parse of a book can be
//! replayed onto the next with [`BookScript::apply_user_decisions`].

pub mod block;
pub mod book;
pub mod character;
pub mod collaborators;
pub mod config;
pub mod element;
pub mod error;
pub mod matchup;
pub mod navigator;
pub mod reference;
pub mod replay;

pub use block::{Block, MultiBlockQuote, ReferenceBlockCloning};
pub use book::BookScript;
pub use character::StandardCharacter;
pub use collaborators::{
    CharacterContext, CharacterVerse, CharacterVerseLookup, NarratorOverride, NarratorOverrideSource,
    Versification,
};
pub use config::ScripturaConfig;
pub use element::{BlockElement, Pause, Sound, SoundType, Verse};
pub use error::{Error, Result};
pub use matchup::BlockMatchup;
pub use navigator::{BlockNavigator, BookBlockIndices};
pub use reference::{ReferenceLanguageInfo, ReferenceLanguageSettings, ReferenceTextProvider};
pub use replay::{ReplayOptions, ReplayReport};
