//! Keyword highlight definitions and their store

use crate::config::PersistedHighlight;

/// A user-defined keyword highlight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordHighlight {
    /// Generated, UI-scoped id; stable identity is the keyword+color pair
    pub id: String,
    pub keyword: String,
    pub color: String,
    pub is_checked: bool,
}

/// Store of keyword highlights, rebuilt from persisted configuration on
/// panel init and written back on every change.
#[derive(Debug, Default)]
pub struct HighlightStore {
    items: Vec<KeywordHighlight>,
    next_id: u64,
}

impl HighlightStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the store from persisted configuration, assigning fresh ids.
    pub fn from_config(persisted: &[PersistedHighlight]) -> Self {
        let mut store = Self::new();
        for highlight in persisted {
            let id = store.fresh_id();
            store.items.push(KeywordHighlight {
                id,
                keyword: highlight.keyword.clone(),
                color: highlight.color.clone(),
                is_checked: highlight.is_checked,
            });
        }
        store
    }

    /// The persisted form written back to configuration.
    pub fn to_config(&self) -> Vec<PersistedHighlight> {
        self.items
            .iter()
            .map(|h| PersistedHighlight {
                keyword: h.keyword.clone(),
                color: h.color.clone(),
                is_checked: h.is_checked,
            })
            .collect()
    }

    /// Add a highlight; a duplicate keyword+color pair is returned as-is
    /// instead of creating a second entry.
    pub fn add(&mut self, keyword: String, color: String) -> &KeywordHighlight {
        let index = match self
            .items
            .iter()
            .position(|h| h.keyword == keyword && h.color == color)
        {
            Some(index) => index,
            None => {
                let id = self.fresh_id();
                self.items.push(KeywordHighlight {
                    id,
                    keyword,
                    color,
                    is_checked: true,
                });
                self.items.len() - 1
            }
        };
        &self.items[index]
    }

    pub fn remove(&mut self, id: &str) {
        self.items.retain(|h| h.id != id);
    }

    pub fn set_checked(&mut self, id: &str, checked: bool) {
        if let Some(highlight) = self.items.iter_mut().find(|h| h.id == id) {
            highlight.is_checked = checked;
        }
    }

    #[allow(dead_code)]
    pub fn items(&self) -> &[KeywordHighlight] {
        &self.items
    }

    /// Highlights currently applied
    #[allow(dead_code)]
    pub fn checked(&self) -> impl Iterator<Item = &KeywordHighlight> {
        self.items.iter().filter(|h| h.is_checked)
    }

    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("hl-{}", self.next_id)
    }
}
