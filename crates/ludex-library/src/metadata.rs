//! Typed per-entry metadata with change tracking

use std::collections::BTreeMap;

/// Value type of a metadata field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataType {
    String,
    MultilineString,
    Path,
    Int,
    Float,
    Bool,
    /// Normalized to 0.0..=1.0
    Rating,
    /// `YYYYMMDDTHHMMSS`
    Date,
    /// `YYYYMMDDTHHMMSS`
    DateTime,
}

/// Which entry kind a store belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataScope {
    Game,
    Folder,
}

macro_rules! metadata_keys {
    ($($key:ident => ($tag:literal, $ty:ident, $default:literal, $folder:literal)),+ $(,)?) => {
        /// Fixed set of metadata fields, in document order
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MetadataKey {
            $($key),+
        }

        impl MetadataKey {
            pub const ALL: &'static [MetadataKey] = &[$(MetadataKey::$key),+];

            /// Element name used in gamelist documents
            pub fn tag(self) -> &'static str {
                match self {
                    $(MetadataKey::$key => $tag),+
                }
            }

            pub fn value_type(self) -> MetadataType {
                match self {
                    $(MetadataKey::$key => MetadataType::$ty),+
                }
            }

            pub fn default_value(self) -> &'static str {
                match self {
                    $(MetadataKey::$key => $default),+
                }
            }

            fn in_folder_scope(self) -> bool {
                match self {
                    $(MetadataKey::$key => $folder),+
                }
            }

            pub fn from_tag(tag: &str) -> Option<Self> {
                match tag {
                    $($tag => Some(MetadataKey::$key),)+
                    _ => None,
                }
            }
        }
    };
}

metadata_keys! {
    Name => ("name", String, "", true),
    SortName => ("sortname", String, "", false),
    Desc => ("desc", MultilineString, "", true),
    Emulator => ("emulator", String, "", false),
    Core => ("core", String, "", false),
    Image => ("image", Path, "", true),
    Thumbnail => ("thumbnail", Path, "", true),
    Video => ("video", Path, "", true),
    Marquee => ("marquee", Path, "", true),
    Fanart => ("fanart", Path, "", true),
    TitleShot => ("titleshot", Path, "", false),
    Manual => ("manual", Path, "", false),
    Bezel => ("bezel", Path, "", false),
    Rating => ("rating", Rating, "0", false),
    ReleaseDate => ("releasedate", Date, "", false),
    Developer => ("developer", String, "", false),
    Publisher => ("publisher", String, "", false),
    Genre => ("genre", String, "", false),
    Family => ("family", String, "", false),
    ArcadeSystemName => ("arcadesystemname", String, "", false),
    Players => ("players", String, "", false),
    Favorite => ("favorite", Bool, "false", true),
    Hidden => ("hidden", Bool, "false", true),
    KidGame => ("kidgame", Bool, "false", false),
    PlayCount => ("playcount", Int, "0", false),
    LastPlayed => ("lastplayed", DateTime, "", false),
    GameTime => ("gametime", Int, "0", false),
    Lang => ("lang", String, "", false),
    Region => ("region", String, "", false),
    Md5 => ("md5", String, "", false),
    Crc32 => ("crc32", String, "", false),
    StoreId => ("storeid", String, "", false),
    StoreNamespace => ("storenamespace", String, "", false),
    StoreCatalogId => ("storecatalogid", String, "", false),
    Virtual => ("virtual", Bool, "false", false),
    Installed => ("installed", Bool, "false", false),
    Launch => ("launch", String, "", false),
}

impl MetadataScope {
    pub fn supports(self, key: MetadataKey) -> bool {
        match self {
            MetadataScope::Game => true,
            MetadataScope::Folder => key.in_folder_scope(),
        }
    }

    /// Keys of this scope, in document order
    pub fn keys(self) -> impl Iterator<Item = MetadataKey> {
        MetadataKey::ALL
            .iter()
            .copied()
            .filter(move |k| self.supports(*k))
    }
}

/// Ordered typed key/value record attached to every catalog entry
#[derive(Debug, Clone)]
pub struct MetadataStore {
    scope: MetadataScope,
    values: BTreeMap<MetadataKey, String>,
    changed: bool,
}

impl MetadataStore {
    pub fn new(scope: MetadataScope) -> Self {
        Self {
            scope,
            values: BTreeMap::new(),
            changed: false,
        }
    }

    pub fn scope(&self) -> MetadataScope {
        self.scope
    }

    /// Current value, or the key's default
    pub fn get(&self, key: MetadataKey) -> &str {
        self.values
            .get(&key)
            .map(String::as_str)
            .unwrap_or_else(|| key.default_value())
    }

    pub fn get_bool(&self, key: MetadataKey) -> bool {
        self.get(key) == "true"
    }

    pub fn get_int(&self, key: MetadataKey) -> i64 {
        self.get(key).parse().unwrap_or(0)
    }

    pub fn get_float(&self, key: MetadataKey) -> f32 {
        self.get(key).parse().unwrap_or(0.0)
    }

    /// Normalized `YYYYMMDDTHHMMSS` value, if set
    pub fn get_date(&self, key: MetadataKey) -> Option<&str> {
        let value = self.get(key);
        (!value.is_empty()).then_some(value)
    }

    /// Year component of a date field
    pub fn get_year(&self, key: MetadataKey) -> Option<u32> {
        self.get_date(key)?.get(..4)?.parse().ok()
    }

    pub fn is_default(&self, key: MetadataKey) -> bool {
        !self.values.contains_key(&key)
    }

    /// Set a value; marks the store dirty when the stored value changes
    pub fn set(&mut self, key: MetadataKey, value: &str) -> bool {
        let changed = self.store(key, value);
        if changed {
            self.changed = true;
        }
        changed
    }

    /// Set a value without touching the dirty flag
    pub fn set_quiet(&mut self, key: MetadataKey, value: &str) -> bool {
        self.store(key, value)
    }

    /// Reset a field to its default
    pub fn unset(&mut self, key: MetadataKey) -> bool {
        let changed = self.values.remove(&key).is_some();
        if changed {
            self.changed = true;
        }
        changed
    }

    fn store(&mut self, key: MetadataKey, value: &str) -> bool {
        if !self.scope.supports(key) {
            tracing::warn!(
                "Metadata field '{}' does not apply to {:?} entries",
                key.tag(),
                self.scope
            );
            return false;
        }

        let normalized = normalize_value(key.value_type(), value);
        if normalized == key.default_value() {
            return self.values.remove(&key).is_some();
        }

        match self.values.get(&key) {
            Some(old) if *old == normalized => false,
            _ => {
                self.values.insert(key, normalized);
                true
            }
        }
    }

    /// Fields holding a non-default value, in document order
    pub fn non_default_fields(&self) -> impl Iterator<Item = (MetadataKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Non-empty path-typed fields (media discovery)
    pub fn media_fields(&self) -> impl Iterator<Item = (MetadataKey, &str)> {
        self.non_default_fields()
            .filter(|(k, _)| k.value_type() == MetadataType::Path)
    }

    /// Replace every field of this store's scope with `other`'s values
    pub fn import_changes(&mut self, other: &MetadataStore) -> bool {
        let mut changed = false;
        for key in self.scope.keys() {
            changed |= self.set(key, other.get(key));
        }
        changed
    }

    pub fn was_changed(&self) -> bool {
        self.changed
    }

    pub fn reset_changed_flag(&mut self) {
        self.changed = false;
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }
}

/// Canonical text form of a value for its type; invalid input yields the type's empty form
pub fn normalize_value(value_type: MetadataType, value: &str) -> String {
    match value_type {
        MetadataType::String | MetadataType::MultilineString | MetadataType::Path => {
            value.to_string()
        }
        MetadataType::Bool => {
            let v = value.trim();
            if v.eq_ignore_ascii_case("true") || v == "1" || v.eq_ignore_ascii_case("yes") {
                "true".to_string()
            } else {
                "false".to_string()
            }
        }
        MetadataType::Int => value
            .trim()
            .parse::<i64>()
            .map(|v| v.to_string())
            .unwrap_or_else(|_| "0".to_string()),
        MetadataType::Float => value
            .trim()
            .parse::<f32>()
            .map(|v| v.to_string())
            .unwrap_or_else(|_| "0".to_string()),
        MetadataType::Rating => normalize_rating(value),
        MetadataType::Date | MetadataType::DateTime => normalize_date(value).unwrap_or_default(),
    }
}

fn normalize_rating(value: &str) -> String {
    let Ok(raw) = value.trim().parse::<f32>() else {
        return "0".to_string();
    };
    if !raw.is_finite() || raw <= 0.0 {
        return "0".to_string();
    }

    // Accept 0..1, 0..5 (stars) and 0..100 (percent) scales
    let rating = if raw <= 1.0 {
        raw
    } else if raw <= 5.0 {
        raw / 5.0
    } else {
        (raw / 100.0).min(1.0)
    };

    let rounded = (rating * 100.0).round() / 100.0;
    format!("{}", rounded)
}

/// Parse the date spellings found in gamelists into `YYYYMMDDTHHMMSS`
pub fn normalize_date(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "not-a-date-time" {
        return None;
    }

    let (date_part, time_part) = match value.split_once('T') {
        Some((d, t)) => (d, t),
        None => (value, ""),
    };

    let date_digits: String = date_part.chars().filter(|c| c.is_ascii_digit()).collect();
    let date = match date_digits.len() {
        4 => format!("{}0101", date_digits),
        6 => format!("{}01", date_digits),
        8 => date_digits,
        _ => return None,
    };

    let month: u32 = date[4..6].parse().ok()?;
    let day: u32 = date[6..8].parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let time_digits: String = time_part.chars().filter(|c| c.is_ascii_digit()).collect();
    let time = match time_digits.len() {
        0 => "000000".to_string(),
        4 => format!("{}00", time_digits),
        6 => time_digits,
        _ => return None,
    };

    Some(format!("{}T{}", date, time))
}
