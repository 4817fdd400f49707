use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// Primary key of an item: partition key plus sort key.
///
/// Ordered by partition, then sort key, so a `BTreeMap<ItemKey, _>` iterates
/// partitions in the same order a range query does.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    /// Partition key (`pk`)
    pub partition: String,
    /// Sort key (`sk`)
    pub sort: String,
}

impl ItemKey {
    /// Key from its two halves.
    pub fn new(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self { partition: partition.into(), sort: sort.into() }
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.partition, self.sort)
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Attribute {
    /// String
    S(String),
    /// Ordered list
    L(Vec<Attribute>),
    /// Nested map
    M(BTreeMap<String, Attribute>),
}

impl Attribute {
    /// String value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// List value, if this is a list.
    pub fn as_list(&self) -> Option<&[Attribute]> {
        match self {
            Self::L(l) => Some(l),
            _ => None,
        }
    }

    /// Map value, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Attribute>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Self::S(value.to_string())
    }
}

impl From<String> for Attribute {
    fn from(value: String) -> Self {
        Self::S(value)
    }
}

/// A stored item: key plus named attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Primary key
    pub key: ItemKey,
    /// Non-key attributes
    pub attributes: BTreeMap<String, Attribute>,
}

impl Item {
    /// Item with no attributes.
    pub fn new(key: ItemKey) -> Self {
        Self { key, attributes: BTreeMap::new() }
    }

    /// Builder: set `name` to `value`.
    #[must_use]
    pub fn with(mut self, name: &str, value: Attribute) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    /// Builder: set `name` to a string value.
    #[must_use]
    pub fn with_str(self, name: &str, value: impl Into<String>) -> Self {
        self.with(name, Attribute::S(value.into()))
    }

    /// Attribute `name`, if present.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Attribute `name` if present and a string.
    pub fn str_attr(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Attribute::as_str)
    }

    /// Copy of this item keeping only the attributes named in `projection`.
    ///
    /// The key is always kept.
    #[must_use]
    pub fn project(&self, projection: &[&str]) -> Item {
        let attributes = self
            .attributes
            .iter()
            .filter(|(name, _)| projection.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Item { key: self.key.clone(), attributes }
    }
}
