//! Visibility and ordering of catalog entries
//!
//! [`FilterIndex`] is derived from one system's games and the user's
//! active [`FilterState`]. It is rebuilt wholesale whenever the system's
//! revision or the filter state changes.

use crate::metadata::{MetadataKey, MetadataStore};
use crate::system::SystemId;
use crate::tree::{CatalogTree, Entry, EntryId, TypeMask};
use ludex_config::{CatalogSettings, SortDirection, SortField};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Attributes a user can filter on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FilterType {
    Favorites,
    Genre,
    Players,
    Developer,
    Publisher,
    Region,
    Lang,
    KidGame,
    Installed,
    Year,
}

impl FilterType {
    pub const ALL: &'static [FilterType] = &[
        FilterType::Favorites,
        FilterType::Genre,
        FilterType::Players,
        FilterType::Developer,
        FilterType::Publisher,
        FilterType::Region,
        FilterType::Lang,
        FilterType::KidGame,
        FilterType::Installed,
        FilterType::Year,
    ];

    /// Values of this attribute for one game; empty when unset
    pub fn values(self, md: &MetadataStore) -> Vec<String> {
        let raw = match self {
            FilterType::Favorites => return vec![md.get(MetadataKey::Favorite).to_string()],
            FilterType::KidGame => return vec![md.get(MetadataKey::KidGame).to_string()],
            FilterType::Installed => {
                let installed = !md.get_bool(MetadataKey::Virtual);
                return vec![installed.to_string()];
            }
            FilterType::Year => {
                return md
                    .get_year(MetadataKey::ReleaseDate)
                    .map(|y| vec![y.to_string()])
                    .unwrap_or_default();
            }
            FilterType::Genre => md.get(MetadataKey::Genre),
            FilterType::Players => md.get(MetadataKey::Players),
            FilterType::Developer => md.get(MetadataKey::Developer),
            FilterType::Publisher => md.get(MetadataKey::Publisher),
            FilterType::Region => md.get(MetadataKey::Region),
            FilterType::Lang => md.get(MetadataKey::Lang),
        };

        // Multi-valued fields are comma separated ("en,fr", "Action, Platform")
        raw.split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// The user's active filters for one system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    text: String,
    selections: BTreeMap<FilterType, BTreeSet<String>>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into().trim().to_string();
    }

    pub fn select(&mut self, filter: FilterType, value: impl Into<String>) {
        self.selections.entry(filter).or_default().insert(value.into());
    }

    pub fn deselect(&mut self, filter: FilterType, value: &str) {
        if let Some(values) = self.selections.get_mut(&filter) {
            values.remove(value);
            if values.is_empty() {
                self.selections.remove(&filter);
            }
        }
    }

    pub fn selected(&self, filter: FilterType) -> Option<&BTreeSet<String>> {
        self.selections.get(&filter)
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.selections.clear();
    }

    pub fn is_active(&self) -> bool {
        !self.text.is_empty() || !self.selections.is_empty()
    }

    /// Relevance of one game; zero excludes it.
    ///
    /// Selections of different filter types must all match; values within a
    /// type are alternatives. Text search ranks name matches above
    /// description matches.
    pub fn score(&self, entry: &Entry) -> u32 {
        let md = entry.metadata();
        for (filter, wanted) in &self.selections {
            let values = filter.values(md);
            if !values.iter().any(|v| wanted.contains(v)) {
                return 0;
            }
        }

        if self.text.is_empty() {
            return 1;
        }
        text_score(&self.text, &entry.display_name(), md.get(MetadataKey::Desc))
    }
}

fn text_score(query: &str, name: &str, desc: &str) -> u32 {
    let query = query.to_lowercase();
    let name = name.to_lowercase();

    if name == query {
        100
    } else if name.starts_with(&query) {
        50
    } else if name
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| !word.is_empty() && word.starts_with(&query))
    {
        25
    } else if name.contains(&query) {
        10
    } else if desc.to_lowercase().contains(&query) {
        1
    } else {
        0
    }
}

/// Derived filter data for one system
#[derive(Debug, Clone)]
pub struct FilterIndex {
    revision: u64,
    state: FilterState,
    values: BTreeMap<FilterType, BTreeMap<String, usize>>,
    scores: HashMap<EntryId, u32>,
}

impl FilterIndex {
    /// Index every game below `root`
    pub fn build(tree: &CatalogTree, root: EntryId, state: &FilterState, revision: u64) -> Self {
        let mut values: BTreeMap<FilterType, BTreeMap<String, usize>> = BTreeMap::new();
        let mut scores = HashMap::new();

        for id in tree.files_recursive(root, TypeMask::GAME, None, true) {
            let Some(entry) = tree.get(id) else { continue };
            for filter in FilterType::ALL {
                for value in filter.values(entry.metadata()) {
                    *values.entry(*filter).or_default().entry(value).or_insert(0) += 1;
                }
            }
            if state.is_active() {
                scores.insert(id, state.score(entry));
            }
        }

        tracing::debug!("Built filter index for {} games", scores.len());
        Self {
            revision,
            state: state.clone(),
            values,
            scores,
        }
    }

    /// Whether this index no longer describes the system
    pub fn is_stale(&self, revision: u64, state: &FilterState) -> bool {
        self.revision != revision || self.state != *state
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether text relevance takes part in ordering
    pub fn has_text(&self) -> bool {
        !self.state.text.is_empty()
    }

    /// Distinct values of a filter type with their game counts
    pub fn value_counts(&self, filter: FilterType) -> Option<&BTreeMap<String, usize>> {
        self.values.get(&filter)
    }

    pub fn score(&self, id: EntryId) -> u32 {
        if !self.is_active() {
            return 1;
        }
        self.scores.get(&id).copied().unwrap_or(0)
    }
}

/// Display policy handed to traversals
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub show_hidden_files: bool,
    pub kid_mode: bool,
    pub hidden_extensions: &'a [String],
    pub index: Option<&'a FilterIndex>,
}

impl<'a> FilterContext<'a> {
    pub fn new(settings: &CatalogSettings, hidden_extensions: &'a [String]) -> Self {
        Self {
            show_hidden_files: settings.show_hidden_files,
            kid_mode: settings.kid_mode,
            hidden_extensions,
            index: None,
        }
    }

    pub fn with_index(mut self, index: &'a FilterIndex) -> Self {
        self.index = Some(index);
        self
    }

    pub fn is_displayed(&self, id: EntryId, entry: &Entry) -> bool {
        let md = entry.metadata();
        if !self.show_hidden_files && md.get_bool(MetadataKey::Hidden) {
            return false;
        }
        if entry.is_folder() {
            return true;
        }

        if self.kid_mode && !md.get_bool(MetadataKey::KidGame) {
            return false;
        }
        if let Some(ext) = entry.extension()
            && self
                .hidden_extensions
                .iter()
                .any(|h| h.trim_start_matches('.').eq_ignore_ascii_case(&ext))
        {
            return false;
        }

        if let Some(index) = self.index
            && index.score(id) == 0
        {
            // Uninstalled store titles stay discoverable
            return entry.status().is_virtual();
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, PartialOrd)]
enum SortValue {
    Text(String),
    Number(f64),
}

fn sort_name(entry: &Entry) -> String {
    let sort_name = entry.metadata().get(MetadataKey::SortName);
    if sort_name.is_empty() {
        entry.display_name().to_lowercase()
    } else {
        sort_name.to_lowercase()
    }
}

fn sort_value(entry: &Entry, field: SortField, system_name: &dyn Fn(SystemId) -> String) -> SortValue {
    let md = entry.metadata();
    match field {
        SortField::Name => SortValue::Text(sort_name(entry)),
        SortField::ReleaseDate => SortValue::Text(md.get(MetadataKey::ReleaseDate).to_string()),
        SortField::LastPlayed => SortValue::Text(md.get(MetadataKey::LastPlayed).to_string()),
        SortField::Rating => SortValue::Number(f64::from(md.get_float(MetadataKey::Rating))),
        SortField::PlayCount => SortValue::Number(md.get_int(MetadataKey::PlayCount) as f64),
        SortField::System => SortValue::Text(system_name(entry.system()).to_lowercase()),
    }
}

/// Order entries for display.
///
/// With active text relevance the highest score comes first (not stable).
/// Otherwise favorites and folders are optionally partitioned to the front
/// and the configured comparator orders the rest with a stable sort; the
/// sort direction reverses only the comparator.
pub fn sort_entries(
    tree: &CatalogTree,
    ids: &mut [EntryId],
    settings: &CatalogSettings,
    index: Option<&FilterIndex>,
    system_name: &dyn Fn(SystemId) -> String,
) {
    struct Key {
        favorite: bool,
        folder: bool,
        primary: SortValue,
        name: String,
        score: u32,
    }

    let field = settings.sort.field;
    let keys: HashMap<EntryId, Key> = ids
        .iter()
        .filter_map(|id| {
            let entry = tree.get(*id)?;
            Some((
                *id,
                Key {
                    favorite: entry.metadata().get_bool(MetadataKey::Favorite),
                    folder: entry.is_folder(),
                    primary: sort_value(entry, field, system_name),
                    name: sort_name(entry),
                    score: index.map(|i| i.score(*id)).unwrap_or(0),
                },
            ))
        })
        .collect();

    let compare_configured = |a: &Key, b: &Key| {
        let ordering = a
            .primary
            .partial_cmp(&b.primary)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name));
        match settings.sort.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    };

    if index.is_some_and(|i| i.has_text()) {
        ids.sort_unstable_by(|a, b| match (keys.get(a), keys.get(b)) {
            (Some(ka), Some(kb)) => kb
                .score
                .cmp(&ka.score)
                .then_with(|| compare_configured(ka, kb)),
            _ => Ordering::Equal,
        });
        return;
    }

    ids.sort_by(|a, b| {
        let (Some(ka), Some(kb)) = (keys.get(a), keys.get(b)) else {
            return Ordering::Equal;
        };
        let mut ordering = Ordering::Equal;
        if settings.favorites_first {
            ordering = kb.favorite.cmp(&ka.favorite);
        }
        if settings.folders_first {
            ordering = ordering.then_with(|| kb.folder.cmp(&ka.folder));
        }
        ordering.then_with(|| compare_configured(ka, kb))
    });
}
