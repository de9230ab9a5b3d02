//! Mixed-radix funnel addressing
//!
//! Funnel ids are laid out group by group. Within a group, each field is one
//! digit whose radix is its lexicon size plus one (digit 0 is "unset"), the
//! first field being the least significant. Each group starts where the
//! previous group's id range ends.
//!
//! For groups `[[], [a, b]]` with `|a| = 3` and `|b| = 4`, group 0 is the
//! single funnel 0 and group 1 spans `1..1 + 4 * 5`, with
//! `id(a = i, b = j) = 1 + i + 4 * j`.

use itertools::Itertools;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::engine::{Event, FieldId, FunnelError, FunnelId, FunnelResult, TrailStore};
use crate::params::IndexParams;

/// Characters left as-is when serializing keys; space becomes `+`.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b' ');

fn encode(s: &str) -> String {
    utf8_percent_encode(s, KEY_ENCODE_SET)
        .to_string()
        .replace(' ', "+")
}

fn decode(s: &str) -> FunnelResult<String> {
    let plus_decoded = s.replace('+', " ");
    percent_decode_str(&plus_decoded)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| FunnelError::Format(format!("invalid key encoding '{}': {}", s, e)))
}

/// An ordered list of `(field, value)` assignments
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunnelKey {
    pairs: Vec<(String, String)>,
}

impl FunnelKey {
    pub fn new<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((field.into(), value.into()));
        self
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Parse the serialized `field=value,field=value` form.
    ///
    /// Names and values are form-encoded (`%XX`, `+` for space); empty
    /// segments are skipped.
    pub fn parse(input: &str) -> FunnelResult<Self> {
        let mut pairs = Vec::new();
        for segment in input.split(',').filter(|s| !s.is_empty()) {
            let (field, value) = segment.split_once('=').ok_or_else(|| {
                FunnelError::Format(format!("key segment '{}' is not field=value", segment))
            })?;
            pairs.push((decode(field)?, decode(value)?));
        }
        Ok(Self { pairs })
    }
}

impl FromStr for FunnelKey {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FunnelKey::parse(s)
    }
}

impl fmt::Display for FunnelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", encode(field), encode(value))?;
        }
        Ok(())
    }
}

/// How a caller names a funnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Id(FunnelId),
    Fields(FunnelKey),
    Serialized(String),
}

impl From<FunnelId> for Key {
    fn from(id: FunnelId) -> Self {
        Key::Id(id)
    }
}

impl From<FunnelKey> for Key {
    fn from(key: FunnelKey) -> Self {
        Key::Fields(key)
    }
}

impl From<&FunnelKey> for Key {
    fn from(key: &FunnelKey) -> Self {
        Key::Fields(key.clone())
    }
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key::Serialized(key.to_string())
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key::Serialized(key)
    }
}

/// Address layout of one key group
#[derive(Debug, Clone)]
struct GroupLayout {
    fields: Vec<FieldId>,
    members: BTreeSet<FieldId>,
    radix: Vec<u64>,
    multiplier: Vec<u64>,
    base: u64,
    total: u64,
}

impl GroupLayout {
    fn position(&self, field: FieldId) -> Option<usize> {
        self.fields.iter().position(|&f| f == field)
    }

    fn contains_id(&self, id: u64) -> bool {
        id >= self.base && id < self.base + self.total
    }
}

/// Mixed-radix map between funnel keys and funnel ids
#[derive(Debug, Clone)]
pub struct KeyIndex {
    groups: Vec<GroupLayout>,
    num_funnels: u64,
    mask_field: Option<FieldId>,
}

impl KeyIndex {
    /// Precompute group offsets from field lexicon sizes
    pub fn new<S: TrailStore>(store: &S, params: &IndexParams) -> FunnelResult<Self> {
        let mask_field = params.validate(store)?;

        let mut groups = Vec::with_capacity(params.keys.len());
        let mut base: u64 = 0;

        for group in &params.keys {
            let mut fields = Vec::with_capacity(group.fields().len());
            let mut radix = Vec::with_capacity(fields.capacity());
            let mut multiplier = Vec::with_capacity(fields.capacity());
            let mut total: u64 = 1;

            for name in group.fields() {
                let field = store.field(name)?;
                if fields.contains(&field) {
                    return Err(FunnelError::Format(format!(
                        "field '{}' appears twice in one key group",
                        name
                    )));
                }
                let r = store.lexicon_size(field)? + 1;
                fields.push(field);
                radix.push(r);
                multiplier.push(total);
                total = total.checked_mul(r).ok_or_else(|| too_many_funnels(u64::MAX))?;
            }

            groups.push(GroupLayout {
                members: fields.iter().copied().collect(),
                fields,
                radix,
                multiplier,
                base,
                total,
            });
            base = base.checked_add(total).ok_or_else(|| too_many_funnels(u64::MAX))?;
        }

        if base > u64::from(FunnelId::MAX) + 1 {
            return Err(too_many_funnels(base));
        }

        tracing::debug!(groups = groups.len(), funnels = base, "key index laid out");
        Ok(Self {
            groups,
            num_funnels: base,
            mask_field,
        })
    }

    pub fn num_funnels(&self) -> u64 {
        self.num_funnels
    }

    /// The validated mask field, if the index has one
    pub fn mask_field(&self) -> Option<FieldId> {
        self.mask_field
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Resolve any key form to a funnel id
    pub fn funnel_id<S: TrailStore>(&self, store: &S, key: &Key) -> FunnelResult<FunnelId> {
        match key {
            Key::Id(id) => {
                if u64::from(*id) >= self.num_funnels {
                    return Err(FunnelError::NotFound(format!("funnel id {}", id)));
                }
                Ok(*id)
            }
            Key::Fields(key) => self.resolve(store, key),
            Key::Serialized(s) => self.resolve(store, &FunnelKey::parse(s)?),
        }
    }

    /// Resolve a field assignment to a funnel id.
    ///
    /// All fields must belong to one group; group fields missing from the
    /// key take the unset digit. The empty key addresses funnel 0.
    pub fn resolve<S: TrailStore>(&self, store: &S, key: &FunnelKey) -> FunnelResult<FunnelId> {
        let mut which: Vec<(FieldId, &str)> = Vec::with_capacity(key.len());
        for (name, value) in key.pairs() {
            let field = store.field(name)?;
            if which.iter().any(|(f, _)| *f == field) {
                return Err(FunnelError::Format(format!(
                    "field '{}' given twice in key",
                    name
                )));
            }
            which.push((field, value));
        }

        let members: BTreeSet<FieldId> = which.iter().map(|(f, _)| *f).collect();
        let group = self.owning_group(store, &members)?;

        let mut id = group.base;
        for (field, value) in which {
            let val = store.lexicon_val(field, value)?;
            // Group membership was checked above.
            let pos = group.position(field).unwrap_or(0);
            id += val * group.multiplier[pos];
        }
        Ok(id as FunnelId)
    }

    fn owning_group<S: TrailStore>(
        &self,
        store: &S,
        members: &BTreeSet<FieldId>,
    ) -> FunnelResult<&GroupLayout> {
        if let Some(group) = self.groups.iter().find(|g| g.members == *members) {
            return Ok(group);
        }
        if let Some(group) = self.groups.iter().find(|g| members.is_subset(&g.members)) {
            return Ok(group);
        }

        for &field in members {
            if !self.groups.iter().any(|g| g.members.contains(&field)) {
                let name = store.field_name(field)?;
                tracing::debug!(field = name, "key field is not part of any key group");
                return Err(FunnelError::NotFound(format!("key field '{}'", name)));
            }
        }
        Err(FunnelError::Format(
            "key mixes fields from different key groups".to_string(),
        ))
    }

    /// Funnel id an event lands in for one group
    pub fn event_funnel(&self, group: usize, event: &Event) -> FunnelResult<FunnelId> {
        let layout = self
            .groups
            .get(group)
            .ok_or_else(|| FunnelError::NotFound(format!("key group {}", group)))?;
        let mut id = layout.base;
        for (pos, &field) in layout.fields.iter().enumerate() {
            let val = event.value(field);
            if val >= layout.radix[pos] {
                return Err(FunnelError::Format(format!(
                    "event value {} out of range for field {}",
                    val, field
                )));
            }
            id += val * layout.multiplier[pos];
        }
        Ok(id as FunnelId)
    }

    /// Decode a funnel id back into its key; unset digits are omitted
    pub fn key_of<S: TrailStore>(&self, store: &S, id: FunnelId) -> FunnelResult<FunnelKey> {
        let id = u64::from(id);
        let group = self
            .groups
            .iter()
            .find(|g| g.contains_id(id))
            .ok_or_else(|| FunnelError::NotFound(format!("funnel id {}", id)))?;

        let offset = id - group.base;
        let mut key = FunnelKey::default();
        for (pos, &field) in group.fields.iter().enumerate() {
            let val = (offset / group.multiplier[pos]) % group.radix[pos];
            if val != 0 {
                key = key.with(store.field_name(field)?, store.lexicon_word(field, val)?);
            }
        }
        Ok(key)
    }

    /// Every fully-set key, group by group, the last field varying fastest.
    ///
    /// Lexicons are read up front; the combinations are produced lazily and
    /// every call starts over.
    pub fn keys<S: TrailStore>(&self, store: &S) -> FunnelResult<impl Iterator<Item = FunnelKey>> {
        let mut groups = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let mut names = Vec::with_capacity(group.fields.len());
            let mut lexicons = Vec::with_capacity(group.fields.len());
            for &field in &group.fields {
                names.push(store.field_name(field)?.to_string());
                let words: Vec<String> = store
                    .lexicon(field)?
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                lexicons.push(words);
            }
            groups.push((names, lexicons));
        }

        Ok(groups.into_iter().flat_map(|(names, lexicons)| {
            let combos: Box<dyn Iterator<Item = Vec<String>>> = if lexicons.is_empty() {
                Box::new(std::iter::once(Vec::new()))
            } else {
                Box::new(
                    lexicons
                        .into_iter()
                        .map(|words| words.into_iter())
                        .multi_cartesian_product(),
                )
            };
            combos.map(move |values| FunnelKey::new(names.iter().cloned().zip(values)))
        }))
    }
}

fn too_many_funnels(count: u64) -> FunnelError {
    FunnelError::Capacity {
        what: "funnel count".to_string(),
        index: usize::try_from(count).unwrap_or(usize::MAX),
        limit: usize::try_from(u64::from(FunnelId::MAX) + 1).unwrap_or(usize::MAX),
    }
}
