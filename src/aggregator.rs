//! Batch prediction and result statistics
//!
//! [`ResultAggregator`] walks every position of every sequence in increasing
//! order, so each sequence gets one [`Frame`] that advances by shifting. The
//! output arrays line up one-to-one with the input positions; positions the
//! framer skips produce the model's empty sentinel.

use crate::config::EngineConfig;
use crate::context::Context;
use crate::engine::{PredictionEngine, PredictionType};
use crate::error::PredictError;
use crate::framer::Frame;
use crate::hasher::Token;
use crate::model::{Dataplane, DataplaneKey, Model, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Pass/fail counts for one prediction type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TypeTally {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Outputs and statistics of one batch.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ResultSet {
    /// Predicted value per position, per sequence.
    pub outputs: Vec<Vec<Value>>,
    /// Prediction type per position; `None` where the framer skipped.
    pub types: Vec<Vec<Option<PredictionType>>>,
    /// Scored mode only: whether each position matched its expected value.
    pub matches: Option<Vec<Vec<bool>>>,
    /// Positions visited, skipped ones included.
    pub total: usize,
    pub skipped: usize,
    pub passed: usize,
    pub failed: usize,
    /// Positions reported as `PredictUnknown`.
    pub unknown: usize,
    pub type_tallies: BTreeMap<PredictionType, TypeTally>,
    pub elapsed: Duration,
}

impl ResultSet {
    /// Positions actually evaluated.
    pub fn evaluated(&self) -> usize {
        self.total - self.skipped
    }

    /// Fraction of scored positions that matched; 0 when nothing was scored.
    pub fn accuracy(&self) -> f64 {
        let scored = self.passed + self.failed;
        if scored == 0 {
            0.0
        } else {
            self.passed as f64 / scored as f64
        }
    }

    fn absorb(&mut self, outcome: SequenceOutcome, expected: Option<&[Value]>) {
        self.total += outcome.values.len();
        let mut matches = Vec::with_capacity(outcome.values.len());
        for (pos, (&value, &ptype)) in outcome.values.iter().zip(&outcome.types).enumerate() {
            let Some(ptype) = ptype else {
                self.skipped += 1;
                matches.push(false);
                continue;
            };
            if ptype == PredictionType::PredictUnknown {
                self.unknown += 1;
            }
            let tally = self.type_tallies.entry(ptype).or_default();
            tally.total += 1;
            if let Some(expected) = expected {
                let hit = expected.get(pos) == Some(&value);
                matches.push(hit);
                if hit {
                    self.passed += 1;
                    tally.passed += 1;
                } else {
                    self.failed += 1;
                    tally.failed += 1;
                }
            }
        }
        if expected.is_some() {
            self.matches.get_or_insert_with(Vec::new).push(matches);
        }
        self.outputs.push(outcome.values);
        self.types.push(outcome.types);
    }
}

struct SequenceOutcome {
    values: Vec<Value>,
    types: Vec<Option<PredictionType>>,
}

/// Drives a [`PredictionEngine`] over batches of sequences.
pub struct ResultAggregator<'m> {
    engine: PredictionEngine<'m>,
    dataplane: &'m Dataplane,
}

impl<'m> ResultAggregator<'m> {
    /// Aggregator over the default dataplane.
    pub fn new(model: &'m Model) -> Self {
        Self::with_config(model, EngineConfig::default())
    }

    pub fn with_config(model: &'m Model, config: EngineConfig) -> Self {
        ResultAggregator {
            engine: PredictionEngine::with_config(model, config),
            dataplane: model.default_dataplane(),
        }
    }

    /// Switch to another dataplane of the same model.
    pub fn for_dataplane(mut self, key: &DataplaneKey) -> Result<Self, PredictError> {
        self.dataplane = self.engine.model().dataplane(key).ok_or_else(|| {
            PredictError::UnknownDataplane {
                dimension: key.dimension.clone(),
                dataplane: key.dataplane.clone(),
            }
        })?;
        Ok(self)
    }

    pub fn engine(&self) -> &PredictionEngine<'m> {
        &self.engine
    }

    pub fn dataplane(&self) -> &'m Dataplane {
        self.dataplane
    }

    /// Predict every position of every sequence.
    ///
    /// # Examples
    ///
    /// ```
    /// use framewise::model::artifact::{DataplaneArtifact, ModelArtifact};
    /// use framewise::ResultAggregator;
    ///
    /// let mut dp = DataplaneArtifact::token("pos", "text", 1, 0);
    /// dp.defaults = vec![(1.0, 4)];
    /// let model = ModelArtifact::new("demo", dp).into_model().unwrap();
    ///
    /// let results = ResultAggregator::new(&model).predict_batch(&[vec!["a", "b"], vec!["c"]]);
    /// assert_eq!(results.outputs, vec![vec![4, 4], vec![4]]);
    /// assert_eq!(results.total, 3);
    /// ```
    pub fn predict_batch<T, S>(&self, sequences: &[S]) -> ResultSet
    where
        T: Token,
        S: AsRef<[T]>,
    {
        let start = Instant::now();
        let mut results = ResultSet::default();
        let mut ctx = Context::new();
        let mut frame = Frame::new(self.dataplane);
        for seq in sequences {
            let outcome = self.predict_sequence(&mut ctx, &mut frame, seq.as_ref());
            results.absorb(outcome, None);
        }
        self.finish(&mut results, start);
        results
    }

    /// As [`predict_batch`](Self::predict_batch), comparing each position with
    /// the expected value.
    pub fn predict_batch_scored<T, S, E>(
        &self,
        sequences: &[S],
        expected: &[E],
    ) -> Result<ResultSet, PredictError>
    where
        T: Token,
        S: AsRef<[T]>,
        E: AsRef<[Value]>,
    {
        check_expected::<T, S, E>(sequences, expected)?;
        let start = Instant::now();
        let mut results = ResultSet::default();
        let mut ctx = Context::new();
        let mut frame = Frame::new(self.dataplane);
        for (seq, want) in sequences.iter().zip(expected) {
            let outcome = self.predict_sequence(&mut ctx, &mut frame, seq.as_ref());
            results.absorb(outcome, Some(want.as_ref()));
        }
        self.finish(&mut results, start);
        Ok(results)
    }

    /// Sequences evaluated concurrently, one context and frame per sequence.
    #[cfg(feature = "parallel")]
    pub fn predict_batch_parallel<T, S>(&self, sequences: &[S]) -> ResultSet
    where
        T: Token + Sync,
        S: AsRef<[T]> + Sync,
    {
        use rayon::prelude::*;

        let start = Instant::now();
        let outcomes: Vec<SequenceOutcome> = sequences
            .par_iter()
            .map(|seq| {
                let mut ctx = Context::new();
                let mut frame = Frame::new(self.dataplane);
                self.predict_sequence(&mut ctx, &mut frame, seq.as_ref())
            })
            .collect();
        let mut results = ResultSet::default();
        for outcome in outcomes {
            results.absorb(outcome, None);
        }
        self.finish(&mut results, start);
        results
    }

    fn predict_sequence<T: Token>(
        &self,
        ctx: &mut Context,
        frame: &mut Frame,
        seq: &[T],
    ) -> SequenceOutcome {
        let empty = Value::from(self.engine.model().empty());
        frame.reset();
        let mut values = Vec::with_capacity(seq.len());
        let mut types = Vec::with_capacity(seq.len());
        for position in 0..seq.len() {
            let ptype = self
                .engine
                .predict_at(ctx, frame, self.dataplane, seq, position);
            let value = match ptype {
                Some(_) => frame.top().map_or(empty, |c| c.value),
                None => empty,
            };
            values.push(value);
            types.push(ptype);
        }
        SequenceOutcome { values, types }
    }

    fn finish(&self, results: &mut ResultSet, start: Instant) {
        results.elapsed = start.elapsed();
        tracing::debug!(
            dataplane = %self.dataplane.key(),
            sequences = results.outputs.len(),
            total = results.total,
            skipped = results.skipped,
            elapsed_ms = results.elapsed.as_millis() as u64,
            "batch complete"
        );
    }
}

fn check_expected<T, S, E>(sequences: &[S], expected: &[E]) -> Result<(), PredictError>
where
    S: AsRef<[T]>,
    E: AsRef<[Value]>,
{
    for i in 0..sequences.len().max(expected.len()) {
        let tokens = sequences.get(i).map_or(0, |s| s.as_ref().len());
        let want = expected.get(i).map_or(0, |e| e.as_ref().len());
        if tokens != want || i >= sequences.len() || i >= expected.len() {
            return Err(PredictError::ExpectedLengthMismatch {
                sequence: i,
                tokens,
                expected: want,
            });
        }
    }
    Ok(())
}

/// Predict a batch on the model's default dataplane with default options.
pub fn predict_batch<T, S>(model: &Model, sequences: &[S]) -> ResultSet
where
    T: Token,
    S: AsRef<[T]>,
{
    ResultAggregator::new(model).predict_batch(sequences)
}
