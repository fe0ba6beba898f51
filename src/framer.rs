//! Window framing
//!
//! A [`Frame`] holds the feature window around one focus position plus the
//! per-number-set working buffers the engine fills while evaluating it. The
//! window has one row per tier: tier 0 carries token features, tier 1 (when the
//! dataplane has a dependent source) the source dataplane's prediction at the
//! same sequence position.
//!
//! Two framing strategies exist, chosen once per dataplane:
//! - [`Framer::Token`]: slot `i` holds the token at `focus - before + i`
//! - [`Framer::CharEdge`]: slots hold leading and trailing code units of the focus token

use crate::context::Context;
use crate::engine::{Candidate, PredictionEngine};
use crate::hasher::{hash_code_unit, Token, VID_UNSET};
use crate::model::{Dataplane, GroupId};
use serde::{Deserialize, Serialize};

/// Framing strategy of a dataplane.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Framer {
    #[default]
    Token,
    CharEdge(CharEdge),
}

/// Layout of a character-edge window.
///
/// Slots `0..prefix` hold the first code units of the focus token, the next
/// `suffix` slots its last code units, and an optional final slot the whole
/// token's feature.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharEdge {
    pub prefix: usize,
    pub suffix: usize,
    /// Shorter tokens get an all-empty edge.
    #[serde(default)]
    pub min_length: usize,
    #[serde(default)]
    pub include_identity: bool,
}

impl Framer {
    /// Window size the strategy requires, if it fixes one.
    pub fn fixed_window(&self) -> Option<usize> {
        match self {
            Framer::Token => None,
            Framer::CharEdge(edge) => {
                Some(edge.prefix + edge.suffix + usize::from(edge.include_identity))
            }
        }
    }

    /// Whether consecutive windows can be produced by shifting.
    pub fn shifts(&self) -> bool {
        matches!(self, Framer::Token)
    }
}

/// Reusable per-caller window and evaluation buffers.
#[derive(Clone, Debug, Default)]
pub struct Frame {
    pub(crate) tiers: Vec<Vec<i32>>,
    pub(crate) vector_space: Vec<i64>,
    pub(crate) set_ids: Vec<Option<GroupId>>,
    pub(crate) candidates: Vec<Candidate>,
    position: Option<usize>,
}

impl Frame {
    /// Frame sized for `dp`.
    pub fn new(dp: &Dataplane) -> Self {
        let mut frame = Frame::default();
        frame.fit(dp);
        frame
    }

    /// Resize for `dp`, dropping the shift state when the shape changes.
    pub fn fit(&mut self, dp: &Dataplane) {
        let sets = dp.number_sets().len();
        let shaped = self.tiers.len() == dp.tiers()
            && self.tiers.iter().all(|t| t.len() == dp.window())
            && self.vector_space.len() == sets;
        if !shaped {
            self.tiers = vec![vec![0; dp.window()]; dp.tiers()];
            self.vector_space = vec![VID_UNSET; sets];
            self.set_ids = vec![None; sets];
            self.position = None;
        }
    }

    /// Forget the previous position; call before reusing a frame on a new sequence.
    pub fn reset(&mut self) {
        self.position = None;
        self.vector_space.fill(VID_UNSET);
        self.set_ids.fill(None);
        self.candidates.clear();
    }

    /// Window values of one tier.
    pub fn window(&self, tier: usize) -> &[i32] {
        self.tiers.get(tier).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn vector_ids(&self) -> &[i64] {
        &self.vector_space
    }

    pub fn group_ids(&self) -> &[Option<GroupId>] {
        &self.set_ids
    }

    /// Ranked candidates of the last evaluation.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn top(&self) -> Option<&Candidate> {
        self.candidates.first()
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Fill the window for `position` of `seq`.
    ///
    /// Returns `false` when the position is skipped: outside the sequence, or
    /// a character framer on a token without text.
    pub fn build<T: Token>(
        &mut self,
        ctx: &mut Context,
        engine: &PredictionEngine<'_>,
        dp: &Dataplane,
        seq: &[T],
        position: usize,
    ) -> bool {
        self.fit(dp);
        if position >= seq.len() {
            self.position = None;
            return false;
        }
        let built = match dp.framer() {
            Framer::Token => {
                let shift = engine.config().shift_frames
                    && position > 0
                    && self.position == Some(position - 1);
                if shift {
                    self.shift_token(ctx, engine, dp, seq, position);
                } else {
                    self.fill_token(ctx, engine, dp, seq, position);
                }
                true
            }
            Framer::CharEdge(edge) => self.fill_char_edge(edge, engine, seq, position),
        };
        self.position = if built && dp.framer().shifts() {
            Some(position)
        } else {
            None
        };
        built
    }

    fn fill_token<T: Token>(
        &mut self,
        ctx: &mut Context,
        engine: &PredictionEngine<'_>,
        dp: &Dataplane,
        seq: &[T],
        position: usize,
    ) {
        for slot in 0..dp.window() {
            self.fill_slot(ctx, engine, dp, seq, position, slot);
        }
    }

    fn shift_token<T: Token>(
        &mut self,
        ctx: &mut Context,
        engine: &PredictionEngine<'_>,
        dp: &Dataplane,
        seq: &[T],
        position: usize,
    ) {
        for tier in &mut self.tiers {
            tier.rotate_left(1);
        }
        self.fill_slot(ctx, engine, dp, seq, position, dp.window() - 1);
    }

    fn fill_slot<T: Token>(
        &mut self,
        ctx: &mut Context,
        engine: &PredictionEngine<'_>,
        dp: &Dataplane,
        seq: &[T],
        position: usize,
        slot: usize,
    ) {
        let empty = engine.model().empty();
        let at = (position + slot)
            .checked_sub(dp.before())
            .filter(|&at| at < seq.len());
        self.tiers[0][slot] = match at {
            Some(at) => seq[at].feature(empty),
            None => empty,
        };
        if let (Some(source), Some(tier)) = (dp.dependent_source(), self.tiers.get_mut(1)) {
            tier[slot] = at
                .and_then(|at| engine.predict_dependent(ctx, source, seq, at))
                .map(|value| value as i32)
                .unwrap_or(empty);
        }
    }

    fn fill_char_edge<T: Token>(
        &mut self,
        edge: &CharEdge,
        engine: &PredictionEngine<'_>,
        seq: &[T],
        position: usize,
    ) -> bool {
        let empty = engine.model().empty();
        let token = &seq[position];
        let Some(text) = token.text() else {
            return false;
        };
        let units: Vec<u16> = text.encode_utf16().collect();
        let short = units.len() < edge.min_length;
        let unit = |i: Option<usize>| match i.and_then(|i| units.get(i)) {
            Some(&u) if !short => hash_code_unit(u),
            _ => empty,
        };

        let window = &mut self.tiers[0];
        for i in 0..edge.prefix {
            window[i] = unit(Some(i));
        }
        for j in 0..edge.suffix {
            window[edge.prefix + j] = unit((units.len() + j).checked_sub(edge.suffix));
        }
        if edge.include_identity {
            window[edge.prefix + edge.suffix] = token.feature(empty);
        }
        for tier in self.tiers.iter_mut().skip(1) {
            tier.fill(empty);
        }
        true
    }
}
