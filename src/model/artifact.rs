//! Model artifact format and loading
//!
//! The artifact is a JSON document produced by an external training step.
//! [`ModelArtifact::into_model`] checks it structurally and materializes the
//! immutable [`Model`]; any structural problem is reported as a [`ModelError`]
//! before a single prediction can run.
//!
//! Vector-to-group pairs are stored with 1-based group ids on disk and become
//! 0-based once loaded. Group table entries may still point outside the
//! probability or value arrays; those groups simply contribute nothing.

use super::{
    DataplaneKey, DefaultAccumulator, Dataplane, GroupId, LabelRegistry, Model, NumberSet,
    ProbMethod, ProbabilityStore, SlotRef, Value,
};
use crate::error::ModelError;
use crate::framer::Framer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Top-level artifact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub tag: String,
    #[serde(default)]
    pub description: String,
    /// Value denoting "no token here".
    #[serde(default)]
    pub empty: i32,
    pub default_dataplane: DataplaneKey,
    #[serde(default)]
    pub label_maps: Vec<LabelMapArtifact>,
    pub dataplanes: Vec<DataplaneArtifact>,
}

/// One label namespace.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LabelMapArtifact {
    pub id: u32,
    pub entries: Vec<(Value, String)>,
}

/// One dataplane as stored on disk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataplaneArtifact {
    pub dimension: String,
    pub dataplane: String,
    pub window: usize,
    pub before: usize,
    #[serde(default)]
    pub prob_method: ProbMethod,
    #[serde(default = "default_identity_only")]
    pub identity_only: bool,
    #[serde(default)]
    pub no_empty: bool,
    #[serde(default)]
    pub allow_empty_set: Option<usize>,
    #[serde(default)]
    pub framer: Framer,
    #[serde(default)]
    pub dependent_source: Option<DataplaneKey>,
    #[serde(default)]
    pub number_sets: Vec<NumberSetArtifact>,
    #[serde(default)]
    pub full_set: Option<usize>,
    #[serde(default)]
    pub identity_set: Option<usize>,
    /// `(probability array id, value array id)` per group.
    #[serde(default)]
    pub groups: Vec<(usize, usize)>,
    #[serde(default)]
    pub probabilities: Vec<Vec<f64>>,
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
    /// `(probability, value)` fallback pairs.
    #[serde(default)]
    pub defaults: Vec<(f64, Value)>,
    #[serde(default)]
    pub label_map: Option<u32>,
}

fn default_identity_only() -> bool {
    true
}

/// One number set as stored on disk.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NumberSetArtifact {
    #[serde(default)]
    pub name: Option<String>,
    /// Declared weight class; computed from the slots when absent.
    #[serde(default)]
    pub weight_class: Option<usize>,
    pub slots: Vec<SlotRef>,
    /// `(vector id, 1-based group id)` pairs.
    #[serde(default)]
    pub vectors: Vec<(i64, usize)>,
}

impl ModelArtifact {
    /// Artifact with a single dataplane that is also the default.
    pub fn new(tag: impl Into<String>, dataplane: DataplaneArtifact) -> Self {
        ModelArtifact {
            tag: tag.into(),
            description: String::new(),
            empty: 0,
            default_dataplane: dataplane.key(),
            label_maps: Vec::new(),
            dataplanes: vec![dataplane],
        }
    }

    pub fn add_dataplane(&mut self, dataplane: DataplaneArtifact) {
        self.dataplanes.push(dataplane);
    }

    pub fn add_label(&mut self, map: u32, value: Value, label: impl Into<String>) {
        let label = label.into();
        match self.label_maps.iter_mut().find(|m| m.id == map) {
            Some(m) => m.entries.push((value, label)),
            None => self.label_maps.push(LabelMapArtifact {
                id: map,
                entries: vec![(value, label)],
            }),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ModelError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate and materialize the model.
    pub fn into_model(self) -> Result<Model, ModelError> {
        let mut by_key = HashMap::with_capacity(self.dataplanes.len());
        for (i, dp) in self.dataplanes.iter().enumerate() {
            if by_key.insert(dp.key(), i).is_some() {
                return Err(ModelError::DuplicateDataplane {
                    dimension: dp.dimension.clone(),
                    dataplane: dp.dataplane.clone(),
                });
            }
        }
        let default_dataplane = *by_key.get(&self.default_dataplane).ok_or_else(|| {
            ModelError::UnknownDefaultDataplane {
                dimension: self.default_dataplane.dimension.clone(),
                dataplane: self.default_dataplane.dataplane.clone(),
            }
        })?;
        let known: HashSet<DataplaneKey> = by_key.keys().cloned().collect();

        let dataplanes = self
            .dataplanes
            .into_iter()
            .map(|dp| dp.into_dataplane(&known))
            .collect::<Result<Vec<_>, _>>()?;

        let mut labels = LabelRegistry::default();
        for map in self.label_maps {
            labels.insert(map.id, map.entries);
        }

        tracing::debug!(
            tag = %self.tag,
            dataplanes = dataplanes.len(),
            label_maps = labels.map_count(),
            "model loaded"
        );

        Ok(Model {
            tag: self.tag,
            description: self.description,
            empty: self.empty,
            dataplanes,
            by_key,
            default_dataplane,
            labels,
        })
    }
}

impl DataplaneArtifact {
    /// Token-framed dataplane with no number sets yet, decoding through label map 0.
    pub fn token(
        dimension: impl Into<String>,
        dataplane: impl Into<String>,
        window: usize,
        before: usize,
    ) -> Self {
        DataplaneArtifact {
            dimension: dimension.into(),
            dataplane: dataplane.into(),
            window,
            before,
            prob_method: ProbMethod::Average,
            identity_only: true,
            no_empty: false,
            allow_empty_set: None,
            framer: Framer::Token,
            dependent_source: None,
            number_sets: Vec::new(),
            full_set: None,
            identity_set: None,
            groups: Vec::new(),
            probabilities: Vec::new(),
            values: Vec::new(),
            defaults: Vec::new(),
            label_map: Some(0),
        }
    }

    pub fn key(&self) -> DataplaneKey {
        DataplaneKey::new(self.dimension.clone(), self.dataplane.clone())
    }

    /// Append a number set over plain slots; returns its index.
    pub fn add_number_set(&mut self, slots: &[usize]) -> usize {
        self.add_number_set_with(slots.iter().copied().map(SlotRef::plain).collect())
    }

    /// Append a number set with explicit slot references; returns its index.
    pub fn add_number_set_with(&mut self, slots: Vec<SlotRef>) -> usize {
        self.number_sets.push(NumberSetArtifact {
            slots,
            ..NumberSetArtifact::default()
        });
        self.number_sets.len() - 1
    }

    /// Append a group holding `(value, probability)` pairs; returns its 1-based id.
    pub fn add_group(&mut self, entries: &[(Value, f64)]) -> usize {
        self.values.push(entries.iter().map(|&(v, _)| v).collect());
        self.probabilities.push(entries.iter().map(|&(_, p)| p).collect());
        self.groups
            .push((self.probabilities.len() - 1, self.values.len() - 1));
        self.groups.len()
    }

    /// Map a vector id of a number set to a 1-based group id.
    pub fn observe(&mut self, number_set: usize, vector_id: i64, group: usize) {
        if let Some(ns) = self.number_sets.get_mut(number_set) {
            ns.vectors.push((vector_id, group));
        }
    }

    fn into_dataplane(self, known: &HashSet<DataplaneKey>) -> Result<Dataplane, ModelError> {
        let key = self.key();
        let name = key.to_string();

        if self.window == 0 || self.before >= self.window {
            return Err(ModelError::InvalidWindow {
                dataplane: name,
                window: self.window,
                before: self.before,
            });
        }
        if let Some(expected) = self.framer.fixed_window() {
            if expected != self.window {
                return Err(ModelError::FramerWindowMismatch {
                    dataplane: name,
                    expected,
                    window: self.window,
                });
            }
        }
        if let Some(source) = &self.dependent_source {
            if !known.contains(source) {
                return Err(ModelError::UnknownDependentSource {
                    dimension: source.dimension.clone(),
                    dataplane: source.dataplane.clone(),
                });
            }
        }

        let count = self.number_sets.len();
        for (field, index) in [
            ("full set", self.full_set),
            ("identity set", self.identity_set),
            ("allow-empty set", self.allow_empty_set),
        ] {
            if let Some(index) = index {
                if index >= count {
                    return Err(ModelError::NumberSetOutOfRange {
                        dataplane: name,
                        field,
                        index,
                        count,
                    });
                }
            }
        }

        if self.number_sets.iter().any(|ns| !ns.vectors.is_empty()) {
            for (missing, absent) in [
                ("groups", self.groups.is_empty()),
                ("probabilities", self.probabilities.is_empty()),
                ("values", self.values.is_empty()),
            ] {
                if absent {
                    return Err(ModelError::MissingArrays {
                        dataplane: name,
                        missing,
                    });
                }
            }
        }

        for (group, &(prob_id, value_id)) in self.groups.iter().enumerate() {
            if let (Some(p), Some(v)) = (self.probabilities.get(prob_id), self.values.get(value_id))
            {
                if p.len() != v.len() {
                    return Err(ModelError::ArrayLengthMismatch {
                        dataplane: name,
                        group,
                        probabilities: p.len(),
                        values: v.len(),
                    });
                }
            }
        }

        let tiers = 1 + usize::from(self.dependent_source.is_some());
        let mut number_sets = Vec::with_capacity(count);
        for (i, ns) in self.number_sets.into_iter().enumerate() {
            for slot in &ns.slots {
                if slot.slot >= self.window {
                    return Err(ModelError::SlotOutOfRange {
                        dataplane: name,
                        number_set: i,
                        slot: slot.slot,
                        window: self.window,
                    });
                }
                if slot.tiers.len() > tiers {
                    return Err(ModelError::TierOutOfRange {
                        dataplane: name,
                        number_set: i,
                        tiers,
                    });
                }
            }
            let computed: usize = ns.slots.iter().map(SlotRef::folds).sum();
            if let Some(declared) = ns.weight_class {
                if declared != computed {
                    return Err(ModelError::WeightClassMismatch {
                        dataplane: name,
                        number_set: i,
                        declared,
                        computed,
                    });
                }
            }

            let mut index: HashMap<i64, GroupId> = HashMap::with_capacity(ns.vectors.len());
            let mut skipped = 0usize;
            for (vector_id, group) in ns.vectors {
                match group.checked_sub(1) {
                    Some(group) => {
                        index.insert(vector_id, group);
                    }
                    None => skipped += 1,
                }
            }
            if skipped > 0 {
                tracing::warn!(dataplane = %name, number_set = i, skipped, "dropped vectors with group id 0");
            }
            number_sets.push(NumberSet::new(ns.name, ns.slots, self.before, index));
        }

        Ok(Dataplane {
            key,
            window: self.window,
            before: self.before,
            prob_method: self.prob_method,
            identity_only: self.identity_only,
            no_empty: self.no_empty,
            allow_empty_set: self.allow_empty_set,
            framer: self.framer,
            dependent_source: self.dependent_source,
            number_sets,
            full_set: self.full_set,
            identity_set: self.identity_set,
            store: ProbabilityStore::new(self.groups, self.probabilities, self.values),
            defaults: DefaultAccumulator::new(self.defaults),
            label_map: self.label_map,
        })
    }
}

impl Model {
    /// Parse and validate a JSON artifact.
    pub fn from_json_str(json: &str) -> Result<Model, ModelError> {
        ModelArtifact::from_json_str(json)?.into_model()
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Model, ModelError> {
        let artifact: ModelArtifact = serde_json::from_reader(reader)?;
        artifact.into_model()
    }

    /// Load a JSON artifact from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Model, ModelError> {
        let bytes = fs::read(path)?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
        artifact.into_model()
    }
}

/// Hex SHA-256 of raw artifact bytes.
///
/// # Examples
///
/// ```
/// use framewise::model::fingerprint;
///
/// let a = fingerprint(b"{}");
/// assert_eq!(a.len(), 64);
/// assert_eq!(a, fingerprint(b"{}"));
/// assert_ne!(a, fingerprint(b"[]"));
/// ```
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
