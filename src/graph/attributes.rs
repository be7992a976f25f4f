use std::fmt;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};

use crate::cache_store::Value;
use crate::query_builder::ColumnType;

/// Optional per-node attribute a report may or may not carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionalAttribute {
    Latitude,
    Longitude,
    JsonUrl,
    Img,
}

impl OptionalAttribute {
    pub const ALL: [OptionalAttribute; 4] = [
        OptionalAttribute::Latitude,
        OptionalAttribute::Longitude,
        OptionalAttribute::JsonUrl,
        OptionalAttribute::Img,
    ];

    /// Field name, also the suffix of `source_`/`target_`/`node_` columns
    pub fn name(&self) -> &'static str {
        match self {
            OptionalAttribute::Latitude => "latitude",
            OptionalAttribute::Longitude => "longitude",
            OptionalAttribute::JsonUrl => "json_url",
            OptionalAttribute::Img => "img",
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            OptionalAttribute::Latitude | OptionalAttribute::Longitude => ColumnType::Float64,
            OptionalAttribute::JsonUrl | OptionalAttribute::Img => ColumnType::String,
        }
    }

    /// `img` keeps NULL so the document can emit `false` for it
    pub fn keeps_null(&self) -> bool {
        matches!(self, OptionalAttribute::Img)
    }

    /// Value of a node whose rows never carry the column
    pub fn default_value(&self) -> Value {
        self.column_type().default_value()
    }

    fn bit(&self) -> u8 {
        match self {
            OptionalAttribute::Latitude => 1,
            OptionalAttribute::Longitude => 1 << 1,
            OptionalAttribute::JsonUrl => 1 << 2,
            OptionalAttribute::Img => 1 << 3,
        }
    }
}

impl fmt::Display for OptionalAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Subset of [`OptionalAttribute`]s available in one generation
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct AttributeSet(u8);

impl AttributeSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        OptionalAttribute::ALL.into_iter().collect()
    }

    pub fn insert(&mut self, attribute: OptionalAttribute) {
        self.0 |= attribute.bit();
    }

    pub fn contains(&self, attribute: OptionalAttribute) -> bool {
        self.0 & attribute.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Present attributes in canonical order
    pub fn iter(&self) -> impl Iterator<Item = OptionalAttribute> + '_ {
        OptionalAttribute::ALL
            .into_iter()
            .filter(move |a| self.contains(*a))
    }
}

impl FromIterator<OptionalAttribute> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = OptionalAttribute>>(iter: I) -> Self {
        let mut set = AttributeSet::empty();
        for attribute in iter {
            set.insert(attribute);
        }
        set
    }
}

impl fmt::Debug for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(|a| a.name())).finish()
    }
}

impl Serialize for AttributeSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for attribute in self.iter() {
            seq.serialize_element(attribute.name())?;
        }
        seq.end()
    }
}
