use std::{fmt, str::FromStr};

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize,
    serde::Serialize,
)]
pub struct VerseKey {
    pub chapter: u16,
    pub number: u16,
}

impl VerseKey {
    pub const fn new(chapter: u16, number: u16) -> Self {
        Self { chapter, number }
    }
}

impl fmt::Display for VerseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chapter, self.number)
    }
}

impl FromStr for VerseKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (chapter, number) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <chapter>:<verse>, got {s:?}"))?;

        let chapter: u16 = chapter
            .trim()
            .parse()
            .map_err(|_| format!("invalid chapter number: {chapter:?}"))?;
        let number: u16 = number
            .trim()
            .parse()
            .map_err(|_| format!("invalid verse number: {number:?}"))?;

        if !(1..=LAST_CHAPTER).contains(&chapter) {
            return Err(format!("chapter must be between 1 and {LAST_CHAPTER}"));
        }
        if number == 0 {
            return Err("verse numbers start at 1".to_string());
        }

        Ok(Self { chapter, number })
    }
}

/// A verse record as delivered by the content service.
#[derive(Default, Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verse {
    pub chapter: u16,
    pub number: u16,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub translation_text: String,
    #[serde(default)]
    pub audio_url: Option<String>,
}

impl Verse {
    pub fn key(&self) -> VerseKey {
        VerseKey::new(self.chapter, self.number)
    }
}

/// One unit of audio. A missing url means the active narrator has no
/// recording for this item.
#[derive(Default, Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PlayableItem {
    pub id: String,
    audio_url: Option<String>,
}

impl PlayableItem {
    pub fn new(id: impl Into<String>, audio_url: Option<String>) -> Self {
        Self {
            id: id.into(),
            audio_url: audio_url.filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn audio_url(&self) -> Option<&str> {
        self.audio_url.as_deref()
    }

    pub fn has_audio(&self) -> bool {
        self.audio_url.is_some()
    }
}

impl From<&Verse> for PlayableItem {
    fn from(verse: &Verse) -> Self {
        Self::new(verse.key().to_string(), verse.audio_url.clone())
    }
}

impl From<Verse> for PlayableItem {
    fn from(verse: Verse) -> Self {
        let id = verse.key().to_string();
        Self::new(id, verse.audio_url)
    }
}

pub const LAST_CHAPTER: u16 = 114;
pub const LAST_JUZ: u8 = 30;

/// First verse of every juz, in order.
const JUZ_STARTS: [VerseKey; LAST_JUZ as usize] = [
    VerseKey::new(1, 1),
    VerseKey::new(2, 142),
    VerseKey::new(2, 253),
    VerseKey::new(3, 93),
    VerseKey::new(4, 24),
    VerseKey::new(4, 148),
    VerseKey::new(5, 82),
    VerseKey::new(6, 111),
    VerseKey::new(7, 88),
    VerseKey::new(8, 41),
    VerseKey::new(9, 93),
    VerseKey::new(11, 6),
    VerseKey::new(12, 53),
    VerseKey::new(15, 1),
    VerseKey::new(17, 1),
    VerseKey::new(18, 75),
    VerseKey::new(21, 1),
    VerseKey::new(23, 1),
    VerseKey::new(25, 21),
    VerseKey::new(27, 56),
    VerseKey::new(29, 46),
    VerseKey::new(33, 31),
    VerseKey::new(36, 28),
    VerseKey::new(39, 32),
    VerseKey::new(41, 47),
    VerseKey::new(46, 1),
    VerseKey::new(51, 31),
    VerseKey::new(58, 1),
    VerseKey::new(67, 1),
    VerseKey::new(78, 1),
];

pub fn juz_start(juz: u8) -> Option<VerseKey> {
    match juz {
        1..=LAST_JUZ => Some(JUZ_STARTS[juz as usize - 1]),
        _ => None,
    }
}

/// The juz a verse belongs to.
pub fn juz_of(key: VerseKey) -> u8 {
    JUZ_STARTS
        .iter()
        .rposition(|start| *start <= key)
        .map(|index| index as u8 + 1)
        .unwrap_or(1)
}

/// What the listener picked; decides which verses end up in a sequence.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum Selection {
    #[default]
    All,
    Verse(VerseKey),
    Chapter(u16),
    Juz(u8),
}

impl Selection {
    pub fn contains(&self, key: VerseKey) -> bool {
        match self {
            Selection::All => true,
            Selection::Verse(verse) => *verse == key,
            Selection::Chapter(chapter) => key.chapter == *chapter,
            Selection::Juz(juz) => juz_of(key) == *juz,
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => write!(f, "all"),
            Selection::Verse(key) => write!(f, "verse {key}"),
            Selection::Chapter(chapter) => write!(f, "chapter {chapter}"),
            Selection::Juz(juz) => write!(f, "juz {juz}"),
        }
    }
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Selection::All);
        }

        let (kind, value) = s.split_once(':').ok_or_else(|| {
            format!("unknown selection {s:?}, expected all, verse:C:V, chapter:C or juz:N")
        })?;

        match kind.to_ascii_lowercase().as_str() {
            "verse" => value.parse().map(Selection::Verse),
            "chapter" => {
                let chapter: u16 = value
                    .parse()
                    .map_err(|_| format!("invalid chapter number: {value:?}"))?;
                if !(1..=LAST_CHAPTER).contains(&chapter) {
                    return Err(format!("chapter must be between 1 and {LAST_CHAPTER}"));
                }
                Ok(Selection::Chapter(chapter))
            }
            "juz" => {
                let juz: u8 = value
                    .parse()
                    .map_err(|_| format!("invalid juz number: {value:?}"))?;
                if juz_start(juz).is_none() {
                    return Err(format!("juz must be between 1 and {LAST_JUZ}"));
                }
                Ok(Selection::Juz(juz))
            }
            other => Err(format!("unknown selection kind: {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verse_key_parses_and_displays() {
        let key: VerseKey = "2:255".parse().unwrap();
        assert_eq!(key, VerseKey::new(2, 255));
        assert_eq!(key.to_string(), "2:255");

        assert!("0:1".parse::<VerseKey>().is_err());
        assert!("115:1".parse::<VerseKey>().is_err());
        assert!("2:0".parse::<VerseKey>().is_err());
        assert!("2".parse::<VerseKey>().is_err());
    }

    #[test]
    fn blank_audio_url_counts_as_missing() {
        let item = PlayableItem::new("1:1", Some("   ".to_string()));
        assert!(!item.has_audio());
        assert_eq!(item.audio_url(), None);

        let item = PlayableItem::new("1:2", Some("https://cdn.example/001002.mp3".to_string()));
        assert_eq!(item.audio_url(), Some("https://cdn.example/001002.mp3"));
    }

    #[test]
    fn juz_boundaries_cross_chapters() {
        assert_eq!(juz_of(VerseKey::new(1, 1)), 1);
        assert_eq!(juz_of(VerseKey::new(2, 141)), 1);
        assert_eq!(juz_of(VerseKey::new(2, 142)), 2);
        assert_eq!(juz_of(VerseKey::new(15, 1)), 14);
        assert_eq!(juz_of(VerseKey::new(14, 52)), 13);
        assert_eq!(juz_of(VerseKey::new(114, 6)), 30);

        let juz = Selection::Juz(13);
        assert!(juz.contains(VerseKey::new(12, 53)));
        assert!(juz.contains(VerseKey::new(14, 52)));
        assert!(!juz.contains(VerseKey::new(12, 52)));
        assert!(!juz.contains(VerseKey::new(15, 1)));
    }

    #[test]
    fn selection_parses_from_cli_form() {
        assert_eq!("all".parse::<Selection>().unwrap(), Selection::All);
        assert_eq!(
            "verse:2:255".parse::<Selection>().unwrap(),
            Selection::Verse(VerseKey::new(2, 255))
        );
        assert_eq!("chapter:18".parse::<Selection>().unwrap(), Selection::Chapter(18));
        assert_eq!("juz:30".parse::<Selection>().unwrap(), Selection::Juz(30));

        assert!("juz:31".parse::<Selection>().is_err());
        assert!("chapter:0".parse::<Selection>().is_err());
        assert!("page:3".parse::<Selection>().is_err());
    }

    #[test]
    fn verse_reads_camel_case_records() {
        let verse: Verse = serde_json::from_str(
            r#"{"chapter":1,"number":2,"text":"...","translationText":"Praise be","audioUrl":null}"#,
        )
        .unwrap();

        assert_eq!(verse.key(), VerseKey::new(1, 2));
        assert_eq!(verse.translation_text, "Praise be");

        let item = PlayableItem::from(&verse);
        assert_eq!(item.id, "1:2");
        assert!(!item.has_audio());
    }
}
