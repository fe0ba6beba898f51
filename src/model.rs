//! Immutable prediction model
//!
//! A [`Model`] owns one or more [`Dataplane`]s. Each dataplane carries its
//! window geometry, its [`NumberSet`]s with their `vector id -> group id`
//! indexes, the shared [`ProbabilityStore`], and a [`DefaultAccumulator`]
//! used when nothing else contributes.
//!
//! Models are built once from a [`ModelArtifact`](artifact::ModelArtifact)
//! and shared read-only by any number of prediction calls.

pub mod artifact;

use crate::framer::Framer;
use crate::hasher::{VID_EXCLUDED, VID_UNSET};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub use artifact::{fingerprint, ModelArtifact};

/// Predicted value id (a label id in the model's label registry).
pub type Value = i64;

/// Index into a dataplane's group table.
pub type GroupId = usize;

/// Label returned for values missing from the label registry.
pub const UNRESOLVED_LABEL: &str = "<?>";

/// (dimension tag, dataplane tag) pair naming one dataplane.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataplaneKey {
    pub dimension: String,
    pub dataplane: String,
}

impl DataplaneKey {
    pub fn new(dimension: impl Into<String>, dataplane: impl Into<String>) -> Self {
        DataplaneKey {
            dimension: dimension.into(),
            dataplane: dataplane.into(),
        }
    }
}

impl fmt::Display for DataplaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dimension, self.dataplane)
    }
}

/// How candidate probabilities from several number sets are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbMethod {
    /// Sum per value, divide by the number of resolved sets.
    #[default]
    Average,
    /// As `Average`, but a single recalled full-window value is forced to win.
    AverageRecall,
    /// Use the full-window distribution alone when it recalls a single value.
    AverageIfNotRecall,
}

/// Whether a number set touches the focus slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberSetKind {
    /// Only positions around the focus.
    Context,
    /// Includes the focus slot.
    Focus,
}

/// One window slot used by a number set.
///
/// `tiers` is empty for a plain slot. Otherwise it flags which frame tiers the
/// slot folds: tier 0 is the token itself, tier 1 the dependent value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRef {
    pub slot: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tiers: Vec<bool>,
}

impl SlotRef {
    pub fn plain(slot: usize) -> Self {
        SlotRef {
            slot,
            tiers: Vec::new(),
        }
    }

    pub fn with_tiers(slot: usize, tiers: Vec<bool>) -> Self {
        SlotRef { slot, tiers }
    }

    /// Number of values this slot folds into the vector id.
    pub fn folds(&self) -> usize {
        self.tiers.len().max(1)
    }
}

/// A combination of window slots hashed to one vector id, plus its index.
#[derive(Clone, Debug)]
pub struct NumberSet {
    name: Option<String>,
    slots: Vec<SlotRef>,
    weight_class: usize,
    kind: NumberSetKind,
    index: HashMap<i64, GroupId>,
}

impl NumberSet {
    /// Build a number set; slots are ordered by window position.
    pub fn new(
        name: Option<String>,
        mut slots: Vec<SlotRef>,
        focus: usize,
        index: HashMap<i64, GroupId>,
    ) -> Self {
        slots.sort_by_key(|s| s.slot);
        let weight_class = slots.iter().map(SlotRef::folds).sum();
        let kind = if slots.iter().any(|s| s.slot == focus) {
            NumberSetKind::Focus
        } else {
            NumberSetKind::Context
        };
        NumberSet {
            name,
            slots,
            weight_class,
            kind,
            index,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn slots(&self) -> &[SlotRef] {
        &self.slots
    }

    pub fn weight_class(&self) -> usize {
        self.weight_class
    }

    pub fn kind(&self) -> NumberSetKind {
        self.kind
    }

    /// Number of indexed vector ids.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Resolve a vector id to its group.
    ///
    /// Unset, excluded and empty-sentinel ids never resolve.
    pub fn resolve(&self, vector_id: i64, empty: i32) -> Option<GroupId> {
        if vector_id == VID_UNSET || vector_id == VID_EXCLUDED || vector_id == i64::from(empty) {
            return None;
        }
        self.index.get(&vector_id).copied()
    }
}

/// Group table plus the probability and value arrays it points into.
#[derive(Clone, Debug, Default)]
pub struct ProbabilityStore {
    groups: Vec<(usize, usize)>,
    probabilities: Vec<Vec<f64>>,
    values: Vec<Vec<Value>>,
}

impl ProbabilityStore {
    pub fn new(
        groups: Vec<(usize, usize)>,
        probabilities: Vec<Vec<f64>>,
        values: Vec<Vec<Value>>,
    ) -> Self {
        ProbabilityStore {
            groups,
            probabilities,
            values,
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Parallel value and probability arrays of a group.
    ///
    /// `None` when the group or either array id is out of bounds.
    pub fn lookup(&self, group: GroupId) -> Option<(&[Value], &[f64])> {
        let &(prob_id, value_id) = self.groups.get(group)?;
        let probabilities = self.probabilities.get(prob_id)?;
        let values = self.values.get(value_id)?;
        Some((values, probabilities))
    }

    /// Value array of a group.
    pub fn values(&self, group: GroupId) -> Option<&[Value]> {
        let &(_, value_id) = self.groups.get(group)?;
        self.values.get(value_id).map(Vec::as_slice)
    }
}

/// Dataplane-wide fallback distribution.
#[derive(Clone, Debug, Default)]
pub struct DefaultAccumulator {
    entries: Vec<(f64, Value)>,
    by_value: HashMap<Value, f64>,
}

impl DefaultAccumulator {
    pub fn new(entries: Vec<(f64, Value)>) -> Self {
        let mut by_value = HashMap::with_capacity(entries.len());
        for &(probability, value) in &entries {
            *by_value.entry(value).or_insert(0.0) += probability;
        }
        DefaultAccumulator { entries, by_value }
    }

    /// `(probability, value)` pairs in artifact order.
    pub fn entries(&self) -> &[(f64, Value)] {
        &self.entries
    }

    pub fn probability(&self, value: Value) -> Option<f64> {
        self.by_value.get(&value).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One configured predictor.
#[derive(Clone, Debug)]
pub struct Dataplane {
    pub(crate) key: DataplaneKey,
    pub(crate) window: usize,
    pub(crate) before: usize,
    pub(crate) prob_method: ProbMethod,
    pub(crate) identity_only: bool,
    pub(crate) no_empty: bool,
    pub(crate) allow_empty_set: Option<usize>,
    pub(crate) framer: Framer,
    pub(crate) dependent_source: Option<DataplaneKey>,
    pub(crate) number_sets: Vec<NumberSet>,
    pub(crate) full_set: Option<usize>,
    pub(crate) identity_set: Option<usize>,
    pub(crate) store: ProbabilityStore,
    pub(crate) defaults: DefaultAccumulator,
    pub(crate) label_map: Option<u32>,
}

impl Dataplane {
    pub fn key(&self) -> &DataplaneKey {
        &self.key
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Focus offset: slots before the focus position.
    pub fn before(&self) -> usize {
        self.before
    }

    pub fn after(&self) -> usize {
        self.window - self.before
    }

    pub fn prob_method(&self) -> ProbMethod {
        self.prob_method
    }

    pub fn identity_only(&self) -> bool {
        self.identity_only
    }

    pub fn no_empty(&self) -> bool {
        self.no_empty
    }

    pub fn allow_empty_set(&self) -> Option<usize> {
        self.allow_empty_set
    }

    pub fn framer(&self) -> &Framer {
        &self.framer
    }

    pub fn dependent_source(&self) -> Option<&DataplaneKey> {
        self.dependent_source.as_ref()
    }

    /// Frame tiers: the token tier plus one when a dependent source is set.
    pub fn tiers(&self) -> usize {
        1 + usize::from(self.dependent_source.is_some())
    }

    pub fn number_sets(&self) -> &[NumberSet] {
        &self.number_sets
    }

    pub fn full_set(&self) -> Option<usize> {
        self.full_set
    }

    pub fn identity_set(&self) -> Option<usize> {
        self.identity_set
    }

    pub fn store(&self) -> &ProbabilityStore {
        &self.store
    }

    pub fn defaults(&self) -> &DefaultAccumulator {
        &self.defaults
    }

    pub fn label_map(&self) -> Option<u32> {
        self.label_map
    }
}

/// Label maps by namespace id.
#[derive(Clone, Debug, Default)]
pub struct LabelRegistry {
    maps: HashMap<u32, HashMap<Value, String>>,
}

impl LabelRegistry {
    pub fn insert(&mut self, id: u32, entries: impl IntoIterator<Item = (Value, String)>) {
        self.maps.entry(id).or_default().extend(entries);
    }

    pub fn get(&self, map: u32, value: Value) -> Option<&str> {
        self.maps.get(&map)?.get(&value).map(String::as_str)
    }

    /// Reverse lookup: the value whose label is `label`.
    pub fn value_of(&self, map: u32, label: &str) -> Option<Value> {
        self.maps
            .get(&map)?
            .iter()
            .filter(|(_, l)| l.as_str() == label)
            .map(|(&v, _)| v)
            .min()
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }
}

/// Fully materialized, immutable model.
#[derive(Clone, Debug)]
pub struct Model {
    pub(crate) tag: String,
    pub(crate) description: String,
    pub(crate) empty: i32,
    pub(crate) dataplanes: Vec<Dataplane>,
    pub(crate) by_key: HashMap<DataplaneKey, usize>,
    pub(crate) default_dataplane: usize,
    pub(crate) labels: LabelRegistry,
}

impl Model {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Value denoting "no token here".
    pub fn empty(&self) -> i32 {
        self.empty
    }

    pub fn dataplanes(&self) -> &[Dataplane] {
        &self.dataplanes
    }

    pub fn dataplane(&self, key: &DataplaneKey) -> Option<&Dataplane> {
        self.by_key.get(key).map(|&i| &self.dataplanes[i])
    }

    pub fn default_dataplane(&self) -> &Dataplane {
        &self.dataplanes[self.default_dataplane]
    }

    pub fn labels(&self) -> &LabelRegistry {
        &self.labels
    }

    /// Decode a value through the default dataplane's label map.
    pub fn resolve_label(&self, value: Value) -> Option<&str> {
        let map = self.default_dataplane().label_map?;
        self.labels.get(map, value)
    }

    /// Decode a value, falling back to [`UNRESOLVED_LABEL`].
    ///
    /// # Examples
    ///
    /// ```
    /// use framewise::model::{ModelArtifact, UNRESOLVED_LABEL};
    /// use framewise::model::artifact::DataplaneArtifact;
    ///
    /// let mut artifact = ModelArtifact::new("demo", DataplaneArtifact::token("pos", "text", 1, 0));
    /// artifact.add_label(0, 7, "NOUN");
    /// let model = artifact.into_model().unwrap();
    ///
    /// assert_eq!(model.label(7), "NOUN");
    /// assert_eq!(model.label(8), UNRESOLVED_LABEL);
    /// ```
    pub fn label(&self, value: Value) -> &str {
        self.resolve_label(value).unwrap_or(UNRESOLVED_LABEL)
    }

    /// Reverse of [`Model::resolve_label`].
    pub fn value_for_label(&self, label: &str) -> Option<Value> {
        let map = self.default_dataplane().label_map?;
        self.labels.value_of(map, label)
    }
}
