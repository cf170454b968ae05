use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::analysis::error::{Result, StabilityError};
use crate::analysis::series::{Series, Timestamp};

pub type SeriesId = u64;
pub type TagMap = BTreeMap<String, String>;

/// Tags the analysis reads to pick its engine; anything else is passed through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tag {
    DataKind,
    Units,
    TUnits,
    LoGhz,
    RfGhz,
}

impl Tag {
    pub const ALL: [Tag; 5] = [Tag::DataKind, Tag::Units, Tag::TUnits, Tag::LoGhz, Tag::RfGhz];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::DataKind => "DATA_KIND",
            Tag::Units => "UNITS",
            Tag::TUnits => "T_UNITS",
            Tag::LoGhz => "LO_GHZ",
            Tag::RfGhz => "RF_GHZ",
        }
    }

    pub fn is_well_known(name: &str) -> bool {
        name.parse::<Tag>().is_ok()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = StabilityError;

    fn from_str(s: &str) -> Result<Self> {
        Tag::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StabilityError::UnknownVariant {
                kind: "tag",
                value: s.to_string(),
            })
    }
}

/// Storage seam for series and their tags.
pub trait SeriesProvider {
    fn load(&self, id: SeriesId) -> Result<Series>;

    /// Persists a new series and marks its samples clean.
    fn store(&mut self, series: &mut Series) -> Result<SeriesId>;

    /// Appends samples to an already stored series.
    fn append(&mut self, id: SeriesId, samples: &Series) -> Result<()>;

    fn append_tags(&mut self, id: SeriesId, tags: &TagMap) -> Result<()>;

    /// Returns the requested tags that are set; an empty `names` returns all of them.
    fn get_tags(&self, id: SeriesId, names: &[&str]) -> Result<TagMap>;

    /// Writes only the samples appended since the last store or sync.
    fn sync(&mut self, id: SeriesId, series: &mut Series) -> Result<()> {
        let dirty = series.dirty_range();
        if dirty.is_empty() {
            return Ok(());
        }
        let tail = series.select(dirty.start, dirty.end - 1, 1, false)?;
        self.append(id, &tail)?;
        series.mark_clean();
        Ok(())
    }
}

/// In-memory provider useful for tests and the simulation binary.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    next_id: SeriesId,
    series: BTreeMap<SeriesId, Series>,
    tags: BTreeMap<SeriesId, TagMap>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<SeriesId> {
        self.series.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

fn present(values: &[f64]) -> Option<&[f64]> {
    (!values.is_empty()).then_some(values)
}

impl SeriesProvider for MemoryProvider {
    fn load(&self, id: SeriesId) -> Result<Series> {
        let mut series = self
            .series
            .get(&id)
            .cloned()
            .ok_or(StabilityError::SeriesNotFound(id))?;
        series.mark_clean();
        Ok(series)
    }

    fn store(&mut self, series: &mut Series) -> Result<SeriesId> {
        self.next_id += 1;
        let id = self.next_id;
        series.mark_clean();
        self.series.insert(id, series.clone());
        self.tags.insert(id, TagMap::new());
        Ok(id)
    }

    fn append(&mut self, id: SeriesId, samples: &Series) -> Result<()> {
        let stored = self
            .series
            .get_mut(&id)
            .ok_or(StabilityError::SeriesNotFound(id))?;
        let (temp1, temp2) = samples.temperatures();
        let stamps: Vec<Timestamp> = samples
            .timestamps()
            .iter()
            .copied()
            .map(Timestamp::from)
            .collect();
        stored.append_batch(
            samples.data(),
            present(temp1),
            present(temp2),
            (!stamps.is_empty()).then_some(&stamps[..]),
        )
    }

    fn append_tags(&mut self, id: SeriesId, tags: &TagMap) -> Result<()> {
        let existing = self
            .tags
            .get_mut(&id)
            .ok_or(StabilityError::SeriesNotFound(id))?;
        existing.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn get_tags(&self, id: SeriesId, names: &[&str]) -> Result<TagMap> {
        let tags = self.tags.get(&id).ok_or(StabilityError::SeriesNotFound(id))?;
        if names.is_empty() {
            return Ok(tags.clone());
        }
        Ok(names
            .iter()
            .filter_map(|name| tags.get_key_value(*name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
