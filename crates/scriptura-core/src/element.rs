//! Block elements: the atomic content units of a block
//!
//! A block's content is an ordered list of elements: runs of script text,
//! verse markers, and two kinds of recording annotations (sound cues and
//! pauses). Plain-text renderings use brace markers:
//!
//! ```text
//! {3} verse 3 (followed by a no-break space)
//! {4-6} verse bridge
//! {F8 Music--Starts @ v3}
//! {F8 SFX--Thunder--Ends before v5}
//! {Pause--1.5 sec}
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Separator written between a verse marker and the verse text
pub const VERSE_NUMBER_SEPARATOR: char = '\u{00A0}';

/// A verse marker; `end_verse == start_verse` unless it is a bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verse {
    pub number: String,
    pub start_verse: u32,
    pub end_verse: u32,
}

impl Verse {
    /// Parse a verse number such as `"3"` or `"3-5"`.
    ///
    /// Unparseable numbers yield verse 0, which never matches a real verse.
    pub fn new(number: impl Into<String>) -> Self {
        let number = number.into();
        let (start_verse, end_verse) = parse_verse_number(&number);
        Self {
            number,
            start_verse,
            end_verse,
        }
    }

    pub fn from_range(start_verse: u32, end_verse: u32) -> Self {
        if end_verse > start_verse {
            Self {
                number: format!("{start_verse}-{end_verse}"),
                start_verse,
                end_verse,
            }
        } else {
            Self {
                number: start_verse.to_string(),
                start_verse,
                end_verse: start_verse,
            }
        }
    }

    pub fn is_bridge(&self) -> bool {
        self.end_verse > self.start_verse
    }

    pub fn contains(&self, verse: u32) -> bool {
        self.start_verse <= verse && verse <= self.end_verse
    }
}

/// Split `"3-5"` into `(3, 5)`; a single verse yields `(n, n)`.
pub fn parse_verse_number(number: &str) -> (u32, u32) {
    let mut parts = number.splitn(2, '-');
    let start = parts
        .next()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let end = parts
        .next()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(start);
    (start, end.max(start))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundType {
    Music,
    Sfx,
}

impl SoundType {
    fn label(self) -> &'static str {
        match self {
            Self::Music => "Music",
            Self::Sfx => "SFX",
        }
    }
}

/// A sound cue for the recording engineer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sound {
    pub sound_type: SoundType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_name: Option<String>,
    /// Verse at which the sound starts, 0 if unspecified
    #[serde(default)]
    pub start_verse: u32,
    /// Verse before which the sound ends, 0 if unspecified
    #[serde(default)]
    pub end_verse: u32,
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{F8 {}", self.sound_type.label())?;
        if let Some(effect) = &self.effect_name {
            write!(f, "--{effect}")?;
        }
        if self.start_verse > 0 {
            write!(f, "--Starts @ v{}", self.start_verse)?;
        }
        if self.end_verse > 0 {
            write!(f, "--Ends before v{}", self.end_verse)?;
        }
        f.write_str("}")
    }
}

/// A recording pause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pause {
    pub seconds: f64,
}

impl fmt::Display for Pause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{Pause--{} sec}}", self.seconds)
    }
}

/// One atomic unit of block content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockElement {
    ScriptText { content: String },
    Verse(Verse),
    Sound(Sound),
    Pause(Pause),
}

impl BlockElement {
    pub fn text(content: impl Into<String>) -> Self {
        Self::ScriptText {
            content: content.into(),
        }
    }

    pub fn verse(number: impl Into<String>) -> Self {
        Self::Verse(Verse::new(number))
    }

    pub fn is_annotation(&self) -> bool {
        matches!(self, Self::Sound(_) | Self::Pause(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::ScriptText { content } => Some(content),
            _ => None,
        }
    }

    pub fn as_verse(&self) -> Option<&Verse> {
        match self {
            Self::Verse(v) => Some(v),
            _ => None,
        }
    }

    /// Append this element's rendering to `out`
    pub fn write_text(&self, out: &mut String, include_verse_numbers: bool, include_annotations: bool) {
        match self {
            Self::ScriptText { content } => out.push_str(content),
            Self::Verse(v) if include_verse_numbers => {
                out.push('{');
                out.push_str(&v.number);
                out.push('}');
                out.push(VERSE_NUMBER_SEPARATOR);
            }
            Self::Sound(s) if include_annotations => out.push_str(&s.to_string()),
            Self::Pause(p) if include_annotations => out.push_str(&p.to_string()),
            _ => {}
        }
    }
}

/// Matches any verse or annotation marker in plain text.
static MARKER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\{(?:(?P<verse>\d+(?:-\d+)?)\}[\x{00A0} ]?|F8 (?P<sound>Music|SFX)(?P<sound_args>(?:--[^{}]*)?)\}|Pause--(?P<pause>\d+(?:\.\d+)?) sec\})",
    )
    .expect("Invalid marker regex")
});

static SOUND_START_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Starts @ v(\d+)$").expect("Invalid sound start regex"));

static SOUND_END_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Ends before v(\d+)$").expect("Invalid sound end regex"));

/// A token of plain text: a run of text or a recognized marker
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Text(String),
    Marker(BlockElement),
}

/// Split plain text into text runs and markers, in order.
pub(crate) fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in MARKER_REGEX.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            tokens.push(Token::Text(text[last..whole.start()].to_string()));
        }
        last = whole.end();

        let element = if let Some(verse) = caps.name("verse") {
            BlockElement::verse(verse.as_str())
        } else if let Some(sound) = caps.name("sound") {
            let sound_type = if sound.as_str() == "Music" {
                SoundType::Music
            } else {
                SoundType::Sfx
            };
            let args = caps.name("sound_args").map_or("", |m| m.as_str());
            BlockElement::Sound(parse_sound_args(sound_type, args))
        } else if let Some(pause) = caps.name("pause") {
            BlockElement::Pause(Pause {
                seconds: pause.as_str().parse().unwrap_or_default(),
            })
        } else {
            continue;
        };
        tokens.push(Token::Marker(element));
    }
    if last < text.len() {
        tokens.push(Token::Text(text[last..].to_string()));
    }
    tokens
}

fn parse_sound_args(sound_type: SoundType, args: &str) -> Sound {
    let mut sound = Sound {
        sound_type,
        effect_name: None,
        start_verse: 0,
        end_verse: 0,
    };
    for part in args.split("--").map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(c) = SOUND_START_REGEX.captures(part) {
            sound.start_verse = c[1].parse().unwrap_or_default();
        } else if let Some(c) = SOUND_END_REGEX.captures(part) {
            sound.end_verse = c[1].parse().unwrap_or_default();
        } else {
            sound.effect_name = Some(part.to_string());
        }
    }
    sound
}

/// True when the text has no letters or digits (punctuation and spaces only)
pub fn is_punctuation_only(text: &str) -> bool {
    !text.chars().any(char::is_alphanumeric)
}
