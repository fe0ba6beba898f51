//! Prediction engine
//!
//! Evaluates one built [`Frame`] against one [`Dataplane`]:
//!
//! 1. Hash each number set's window values into a vector id
//! 2. Resolve vector ids to groups
//! 3. Classify the position from the full set and identity set
//! 4. Merge every contributing group's `(value, probability)` pairs,
//!    applying identity filtering or amplification
//! 5. Fall back to the default accumulator when nothing contributed
//! 6. Average, sort, and resolve ties deterministically
//!
//! Sparsity is expected: an unknown vector id or a dangling group reference is
//! "no contribution" and never an error.

use crate::config::{Amplify, AmplifyMode, EngineConfig};
use crate::context::Context;
use crate::framer::Frame;
use crate::hasher::{fold, Token, PLACEHOLDER, VID_EXCLUDED, VID_UNSET};
use crate::model::{
    Dataplane, DataplaneKey, DefaultAccumulator, Model, NumberSetKind, ProbMethod, Value,
};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// How a prediction was reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(i8)]
pub enum PredictionType {
    /// Nothing contributed and no fallback was available.
    Fail = -1,
    /// The full window was seen with exactly one value.
    Recall = 0,
    /// The full window was seen with several values.
    RecallPredict = 1,
    /// A focus set other than the identity set contributed.
    PredictRelate = 2,
    /// Generic prediction from partial context.
    Predict = 3,
    /// The focus token itself was never seen.
    PredictUnknown = 4,
    /// Default accumulator fallback.
    Default = 5,
}

impl PredictionType {
    pub const ALL: [PredictionType; 7] = [
        PredictionType::Fail,
        PredictionType::Recall,
        PredictionType::RecallPredict,
        PredictionType::PredictRelate,
        PredictionType::Predict,
        PredictionType::PredictUnknown,
        PredictionType::Default,
    ];

    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn name(self) -> &'static str {
        match self {
            PredictionType::Fail => "fail",
            PredictionType::Recall => "recall",
            PredictionType::RecallPredict => "recall-predict",
            PredictionType::PredictRelate => "predict-relate",
            PredictionType::Predict => "predict",
            PredictionType::PredictUnknown => "predict-unknown",
            PredictionType::Default => "default",
        }
    }
}

impl fmt::Display for PredictionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One merged prediction option.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    pub value: Value,
    pub probability: f64,
    /// Number of merges into this candidate.
    pub count: u32,
    /// Only set on the top-ranked candidate.
    pub prediction_type: Option<PredictionType>,
}

impl Candidate {
    pub fn new(value: Value, probability: f64) -> Self {
        Candidate {
            value,
            probability,
            count: 1,
            prediction_type: None,
        }
    }
}

/// Ranked outcome of one position.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub prediction_type: PredictionType,
    pub candidates: Vec<Candidate>,
}

impl Prediction {
    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn value(&self) -> Option<Value> {
        self.top().map(|c| c.value)
    }
}

/// Stateless evaluator over a shared [`Model`].
///
/// # Examples
///
/// ```
/// use framewise::model::artifact::{DataplaneArtifact, ModelArtifact};
/// use framewise::{hasher, PredictionEngine, PredictionType};
///
/// let mut dp = DataplaneArtifact::token("pos", "text", 1, 0);
/// let identity = dp.add_number_set(&[0]);
/// dp.identity_set = Some(identity);
/// let group = dp.add_group(&[(1, 1.0)]);
/// dp.observe(identity, hasher::hash_short_string("cat", 0) as i64, group);
/// let model = ModelArtifact::new("demo", dp).into_model().unwrap();
///
/// let engine = PredictionEngine::new(&model);
/// let prediction = engine.predict(&["cat"], 0).unwrap();
/// assert_eq!(prediction.value(), Some(1));
/// assert_eq!(prediction.prediction_type, PredictionType::Predict);
/// ```
#[derive(Clone, Debug)]
pub struct PredictionEngine<'m> {
    model: &'m Model,
    config: EngineConfig,
}

impl<'m> PredictionEngine<'m> {
    pub fn new(model: &'m Model) -> Self {
        Self::with_config(model, EngineConfig::default())
    }

    pub fn with_config(model: &'m Model, config: EngineConfig) -> Self {
        PredictionEngine { model, config }
    }

    pub fn model(&self) -> &'m Model {
        self.model
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Predict one position on the default dataplane with fresh buffers.
    ///
    /// `None` when the position is skipped by the framer.
    pub fn predict<T: Token>(&self, seq: &[T], position: usize) -> Option<Prediction> {
        let dp = self.model.default_dataplane();
        let mut ctx = Context::new();
        let mut frame = Frame::new(dp);
        let prediction_type = self.predict_at(&mut ctx, &mut frame, dp, seq, position)?;
        Some(Prediction {
            prediction_type,
            candidates: frame.candidates,
        })
    }

    /// Frame and evaluate `position` of `seq` into `frame`.
    ///
    /// Reuse `frame` across increasing positions of one sequence to take the
    /// shift path; [`Frame::reset`] it before switching sequences. `None` when
    /// the framer skips the position or `dp` is already being evaluated in
    /// `ctx`.
    pub fn predict_at<T: Token>(
        &self,
        ctx: &mut Context,
        frame: &mut Frame,
        dp: &Dataplane,
        seq: &[T],
        position: usize,
    ) -> Option<PredictionType> {
        ctx.with_callout(dp.key(), |ctx| {
            if !frame.build(ctx, self, dp, seq, position) {
                return None;
            }
            ctx.record_evaluation();
            Some(self.evaluate(dp, frame, self.config.amplify.as_ref()))
        })
        .flatten()
    }

    /// Evaluate a frame that has already been built for `dp`.
    pub fn predict_frame(&self, dp: &Dataplane, frame: &mut Frame) -> PredictionType {
        frame.fit(dp);
        self.evaluate(dp, frame, self.config.amplify.as_ref())
    }

    /// Top value of `source` at `position`, for dependent tiers.
    ///
    /// Amplification is not applied. `None` on recursion, unknown source or
    /// no prediction.
    pub(crate) fn predict_dependent<T: Token>(
        &self,
        ctx: &mut Context,
        source: &DataplaneKey,
        seq: &[T],
        position: usize,
    ) -> Option<Value> {
        let dp = self.model.dataplane(source)?;
        let mut frame = Frame::new(dp);
        ctx.with_callout(source, |ctx| {
            if !frame.build(ctx, self, dp, seq, position) {
                return None;
            }
            ctx.record_evaluation();
            match self.evaluate(dp, &mut frame, None) {
                PredictionType::Fail => None,
                _ => frame.top().map(|c| c.value),
            }
        })
        .flatten()
    }

    fn evaluate(
        &self,
        dp: &Dataplane,
        frame: &mut Frame,
        amplify: Option<&Amplify>,
    ) -> PredictionType {
        let empty = self.model.empty();
        generate_vectors(dp, frame, empty);
        let active = resolve_groups(dp, frame, empty);
        frame.candidates.clear();

        let store = dp.store();
        let group_of = |set: Option<usize>| set.and_then(|i| frame.set_ids.get(i).copied().flatten());
        let full_group = group_of(dp.full_set());
        let identity_group = group_of(dp.identity_set());
        let full_values = full_group.and_then(|g| store.values(g));

        let mut prediction_type = match full_values {
            Some(values) if values.len() == 1 => PredictionType::Recall,
            Some(values) if values.len() > 1 => PredictionType::RecallPredict,
            _ => PredictionType::Predict,
        };

        if prediction_type == PredictionType::Recall
            && dp.prob_method() == ProbMethod::AverageIfNotRecall
        {
            let full = full_group
                .and_then(|g| store.lookup(g))
                .zip(dp.full_set().and_then(|i| dp.number_sets().get(i)));
            if let Some(((values, probabilities), ns)) = full {
                let gain = amplify.map_or(0.0, |a| {
                    amplify_gain(values, probabilities, a, a.noise_limit(ns.kind()))
                });
                for (&value, &probability) in values.iter().zip(probabilities) {
                    match amplify {
                        Some(a) if !a.is_target(value) => continue,
                        Some(_) if gain > 0.0 => {
                            merge(&mut frame.candidates, value, probability * gain)
                        }
                        _ => merge(&mut frame.candidates, value, probability),
                    }
                }
            }
            if !frame.candidates.is_empty() {
                sort_candidates(&mut frame.candidates);
                frame.candidates[0].prediction_type = Some(prediction_type);
                return prediction_type;
            }
        }

        let identity_values = identity_group.and_then(|g| store.values(g));
        let filter = if dp.identity_only() && dp.identity_set().is_some() {
            if identity_values.is_none() {
                prediction_type = PredictionType::PredictUnknown;
            }
            identity_values
        } else {
            None
        };

        for (i, ns) in dp.number_sets().iter().enumerate() {
            let Some(group) = frame.set_ids[i] else {
                continue;
            };
            let Some((values, probabilities)) = store.lookup(group) else {
                tracing::warn!(dataplane = %dp.key(), number_set = i, group, "group reference out of bounds");
                continue;
            };
            let is_identity = dp.identity_set() == Some(i);
            let identity_gain = amplify
                .filter(|a| is_identity && a.identity_gain > 0.0)
                .map(|a| a.identity_gain);
            let gain = amplify.map_or(0.0, |a| {
                amplify_gain(values, probabilities, a, a.noise_limit(ns.kind()))
            });

            let mut contributed = false;
            for (&value, &probability) in values.iter().zip(probabilities) {
                // identity-gained values skip only the identity filter
                if identity_gain.is_none() && filter.is_some_and(|ids| !ids.contains(&value)) {
                    continue;
                }
                let mut probability = probability;
                if let Some(a) = amplify {
                    if a.is_target(value) {
                        if gain > 0.0 {
                            probability *= gain;
                        }
                    } else if a.mode == AmplifyMode::Limit {
                        continue;
                    }
                }
                if let Some(g) = identity_gain {
                    probability *= g;
                }
                merge(&mut frame.candidates, value, probability);
                contributed = true;
            }

            if contributed
                && !is_identity
                && ns.kind() == NumberSetKind::Focus
                && prediction_type == PredictionType::Predict
            {
                prediction_type = PredictionType::PredictRelate;
            }
        }

        if frame.candidates.is_empty() {
            let defaults = dp.defaults();
            if self.config.no_defaults || defaults.is_empty() {
                return PredictionType::Fail;
            }
            for &(probability, value) in defaults.entries() {
                merge(
                    &mut frame.candidates,
                    value,
                    probability * self.config.default_weight,
                );
            }
            sort_candidates(&mut frame.candidates);
            frame.candidates[0].prediction_type = Some(PredictionType::Default);
            return PredictionType::Default;
        }

        let divisor = active.max(1) as f64;
        for candidate in &mut frame.candidates {
            candidate.probability /= divisor;
        }
        sort_candidates(&mut frame.candidates);

        if prediction_type == PredictionType::Recall && dp.prob_method() == ProbMethod::AverageRecall
        {
            if let Some(&recalled) = full_values.and_then(|v| v.first()) {
                force_winner(&mut frame.candidates, recalled, self.config.win_margin);
            }
        }

        resolve_ties(&mut frame.candidates, dp.defaults());
        frame.candidates[0].prediction_type = Some(prediction_type);
        prediction_type
    }
}

/// Compute every number set's vector id from the frame's window.
///
/// Under the dataplane's empty-exclusion policy, a set whose primary value or
/// required dependent value is empty gets [`VID_EXCLUDED`].
pub fn generate_vectors(dp: &Dataplane, frame: &mut Frame, empty: i32) {
    for (i, ns) in dp.number_sets().iter().enumerate() {
        let excludes = dp.no_empty() && dp.allow_empty_set() != Some(i);
        let weight_class = ns.weight_class();
        let mut acc = VID_UNSET;
        let mut excluded = false;
        'slots: for slot in ns.slots() {
            let primary = frame.tiers[0][slot.slot];
            if excludes && primary == empty {
                excluded = true;
                break;
            }
            if slot.tiers.is_empty() {
                acc = fold(weight_class, primary, acc);
                continue;
            }
            for (tier, &used) in slot.tiers.iter().enumerate() {
                if !used {
                    acc = fold(weight_class, PLACEHOLDER, acc);
                    continue;
                }
                let value = frame
                    .tiers
                    .get(tier)
                    .map_or(empty, |window| window[slot.slot]);
                if excludes && value == empty {
                    excluded = true;
                    break 'slots;
                }
                acc = fold(weight_class, value, acc);
            }
        }
        frame.vector_space[i] = if excluded { VID_EXCLUDED } else { acc };
    }
}

/// Resolve vector ids to groups; returns how many sets resolved.
pub fn resolve_groups(dp: &Dataplane, frame: &mut Frame, empty: i32) -> usize {
    let mut active = 0;
    for (i, ns) in dp.number_sets().iter().enumerate() {
        let group = ns.resolve(frame.vector_space[i], empty);
        active += usize::from(group.is_some());
        frame.set_ids[i] = group;
    }
    active
}

/// Gain applied to target values of one group.
///
/// The denominator drops non-target values ranked within `noise_limit`
/// (every non-target value when the limit is 0). Returns 0, meaning no
/// amplification, when nothing was dropped or nothing is left.
pub fn amplify_gain(
    values: &[Value],
    probabilities: &[f64],
    amplify: &Amplify,
    noise_limit: usize,
) -> f64 {
    let mut total = 0.0;
    let mut retained = 0.0;
    let mut dropped = false;
    for (rank, (&value, &probability)) in values.iter().zip(probabilities).enumerate() {
        total += probability;
        if !amplify.is_target(value) && (noise_limit == 0 || rank < noise_limit) {
            dropped = true;
        } else {
            retained += probability;
        }
    }
    if !dropped || retained <= 0.0 {
        return 0.0;
    }
    total / retained
}

/// Add `probability` to the candidate for `value`, inserting it if new.
pub fn merge(candidates: &mut Vec<Candidate>, value: Value, probability: f64) {
    match candidates.iter_mut().find(|c| c.value == value) {
        Some(c) => {
            c.probability += probability;
            c.count += 1;
        }
        None => candidates.push(Candidate::new(value, probability)),
    }
}

fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    b.probability
        .total_cmp(&a.probability)
        .then(b.count.cmp(&a.count))
        .then(b.value.cmp(&a.value))
}

/// Probability descending, then count descending, then value descending.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(rank);
}

fn force_winner(candidates: &mut [Candidate], recalled: Value, margin: f64) {
    let top = candidates[0].probability;
    if candidates[0].value == recalled {
        return;
    }
    if let Some(c) = candidates.iter_mut().find(|c| c.value == recalled) {
        c.probability = top * (1.0 + margin);
        sort_candidates(candidates);
    }
}

/// Break an exact tie at the top with the default distribution.
///
/// Tied candidates are blended left to right as
/// `(p + default * max_weight) / 2`, stopping at the first one whose
/// probability changes; the list is then re-sorted.
pub fn resolve_ties(candidates: &mut [Candidate], defaults: &DefaultAccumulator) {
    if candidates.len() < 2 || candidates[0].probability != candidates[1].probability {
        return;
    }
    let top = candidates[0].probability;
    let tied = candidates
        .iter()
        .take_while(|c| c.probability == top)
        .count();

    let default_of = |c: &Candidate| defaults.probability(c.value).filter(|&d| d > 0.0);
    let Some(max_weight) = candidates[..tied]
        .iter()
        .filter_map(|c| default_of(c).map(|d| c.probability / d))
        .reduce(f64::max)
    else {
        return;
    };

    for c in &mut candidates[..tied] {
        let Some(d) = default_of(&*c) else {
            continue;
        };
        c.probability = (c.probability + d * max_weight) / 2.0;
        if c.probability != top {
            break;
        }
    }
    sort_candidates(candidates);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AmplifyMode;

    fn candidates(entries: &[(Value, f64, u32)]) -> Vec<Candidate> {
        entries
            .iter()
            .map(|&(value, probability, count)| Candidate {
                value,
                probability,
                count,
                prediction_type: None,
            })
            .collect()
    }

    fn values(list: &[Candidate]) -> Vec<Value> {
        list.iter().map(|c| c.value).collect()
    }

    #[test]
    fn merge_sums_and_counts() {
        let mut list = Vec::new();
        merge(&mut list, 3, 0.25);
        merge(&mut list, 4, 0.5);
        merge(&mut list, 3, 0.25);
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].probability, 0.5);
        assert_eq!(list[0].count, 2);
    }

    #[test]
    fn sort_order_is_total() {
        let mut list = candidates(&[(1, 0.5, 1), (2, 0.5, 2), (3, 0.7, 1), (4, 0.5, 2)]);
        sort_candidates(&mut list);
        assert_eq!(values(&list), vec![3, 4, 2, 1]);
    }

    #[test]
    fn ties_prefer_larger_default() {
        let defaults = DefaultAccumulator::new(vec![(0.1, 1), (0.4, 2)]);
        let mut list = candidates(&[(1, 0.5, 1), (2, 0.5, 1)]);
        sort_candidates(&mut list);
        assert_eq!(values(&list), vec![2, 1]);

        // value 1 has the larger ratio and keeps 0.5; value 2 is lifted
        let mut list = candidates(&[(2, 0.5, 1), (1, 0.5, 1)]);
        resolve_ties(&mut list, &defaults);
        assert_eq!(values(&list), vec![2, 1]);
        assert_eq!(list[1].probability, 0.5);
        assert!((list[0].probability - 1.25).abs() < 1e-12);
    }

    #[test]
    fn ties_without_defaults_stay_put() {
        let defaults = DefaultAccumulator::default();
        let mut list = candidates(&[(5, 0.5, 1), (4, 0.5, 1)]);
        resolve_ties(&mut list, &defaults);
        assert_eq!(values(&list), vec![5, 4]);
        assert_eq!(list[0].probability, 0.5);
    }

    #[test]
    fn ties_only_touch_tied_prefix() {
        let defaults = DefaultAccumulator::new(vec![(0.5, 1), (0.25, 2), (0.9, 3)]);
        let mut list = candidates(&[(2, 0.4, 1), (1, 0.4, 1), (3, 0.1, 1)]);
        resolve_ties(&mut list, &defaults);
        let third = list.iter().find(|c| c.value == 3).unwrap();
        assert_eq!(third.probability, 0.1);
    }

    #[test]
    fn gain_ignores_groups_without_non_targets() {
        let amp = Amplify::new([1, 2], AmplifyMode::Soft);
        assert_eq!(amplify_gain(&[1, 2], &[0.5, 0.5], &amp, 0), 0.0);
    }

    #[test]
    fn gain_drops_all_non_targets_at_zero_limit() {
        let amp = Amplify::new([1], AmplifyMode::Soft);
        let gain = amplify_gain(&[2, 1, 3], &[0.5, 0.25, 0.25], &amp, 0);
        assert_eq!(gain, 4.0);
    }

    #[test]
    fn gain_respects_noise_limit() {
        let amp = Amplify::new([1], AmplifyMode::Soft);
        // only rank 0 is dropped
        let gain = amplify_gain(&[2, 1, 3], &[0.5, 0.25, 0.25], &amp, 1);
        assert_eq!(gain, 2.0);
    }

    #[test]
    fn gain_is_zero_without_retained_mass() {
        let amp = Amplify::new([9], AmplifyMode::Soft);
        assert_eq!(amplify_gain(&[1, 2], &[0.5, 0.5], &amp, 0), 0.0);
    }

    #[test]
    fn forced_winner_moves_recalled_value_up() {
        let mut list = candidates(&[(1, 0.6, 1), (2, 0.4, 1)]);
        force_winner(&mut list, 2, 0.1);
        assert_eq!(list[0].value, 2);
        assert!((list[0].probability - 0.66).abs() < 1e-12);
    }

    #[test]
    fn prediction_type_codes() {
        assert_eq!(PredictionType::Fail.code(), -1);
        assert_eq!(PredictionType::Default.code(), 5);
        assert_eq!(PredictionType::PredictRelate.to_string(), "predict-relate");
    }
}
