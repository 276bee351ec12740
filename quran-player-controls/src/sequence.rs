use std::{collections::HashSet, sync::Arc};

use quran_player_models::{PlayableItem, Selection, Verse};
use snafu::ensure;

use crate::{Result, error::DuplicateItemSnafu};

/// Ordered, immutable list of items for one playback run.
#[derive(Default, Debug, Clone, PartialEq)]
pub struct Sequence {
    items: Arc<[PlayableItem]>,
    selection: Selection,
}

impl Sequence {
    pub fn new(items: Vec<PlayableItem>) -> Result<Self> {
        {
            let mut seen = HashSet::with_capacity(items.len());
            for item in &items {
                ensure!(
                    seen.insert(item.id.as_str()),
                    DuplicateItemSnafu {
                        id: item.id.clone()
                    }
                );
            }
        }

        Ok(Self {
            items: items.into(),
            selection: Selection::All,
        })
    }

    pub fn single(item: PlayableItem) -> Self {
        Self {
            items: Arc::from(vec![item]),
            selection: Selection::All,
        }
    }

    /// Keep the verses `selection` covers, in the order given.
    pub fn from_verses(verses: &[Verse], selection: Selection) -> Result<Self> {
        let items = verses
            .iter()
            .filter(|verse| selection.contains(verse.key()))
            .map(PlayableItem::from)
            .collect();

        Ok(Self::new(items)?.with_selection(selection))
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn items(&self) -> &[PlayableItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&PlayableItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn playable_count(&self) -> usize {
        self.items.iter().filter(|item| item.has_audio()).count()
    }

    /// First item at or after `from` that has audio.
    pub fn next_playable(&self, from: usize) -> Option<(usize, &PlayableItem)> {
        self.items
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, item)| item.has_audio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use quran_player_models::VerseKey;

    fn item(id: &str, url: Option<&str>) -> PlayableItem {
        PlayableItem::new(id, url.map(str::to_string))
    }

    #[test]
    fn rejects_duplicate_ids() {
        let result = Sequence::new(vec![item("1:1", None), item("1:1", Some("a.mp3"))]);
        assert!(matches!(result, Err(Error::DuplicateItem { id }) if id == "1:1"));
    }

    #[test]
    fn next_playable_skips_items_without_audio() {
        let sequence = Sequence::new(vec![
            item("a", None),
            item("b", None),
            item("c", Some("c.mp3")),
            item("d", None),
        ])
        .unwrap();

        assert_eq!(sequence.next_playable(0).map(|(i, _)| i), Some(2));
        assert_eq!(sequence.next_playable(2).map(|(i, _)| i), Some(2));
        assert_eq!(sequence.next_playable(3), None);
        assert_eq!(sequence.next_playable(10), None);
        assert_eq!(sequence.playable_count(), 1);
    }

    #[test]
    fn builds_juz_across_chapter_boundary() {
        let verse = |chapter, number| Verse {
            chapter,
            number,
            audio_url: Some(format!("{chapter:03}{number:03}.mp3")),
            ..Default::default()
        };
        let verses = vec![
            verse(2, 140),
            verse(2, 141),
            verse(2, 142),
            verse(2, 143),
            verse(2, 252),
            verse(2, 253),
        ];

        let sequence = Sequence::from_verses(&verses, Selection::Juz(2)).unwrap();
        let ids: Vec<&str> = sequence.items().iter().map(|i| i.id.as_str()).collect();

        assert_eq!(ids, vec!["2:142", "2:143", "2:252"]);
        assert_eq!(sequence.selection(), Selection::Juz(2));

        let single =
            Sequence::from_verses(&verses, Selection::Verse(VerseKey::new(2, 253))).unwrap();
        assert_eq!(single.len(), 1);
    }
}
