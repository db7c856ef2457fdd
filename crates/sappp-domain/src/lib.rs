// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! The product abstract domain the analyzer runs its fixpoint over.
//!
//! Each sub-domain below is an independent value type with its own
//! `bottom`, `join`, `widen`, and `transfer`. [`AbstractState`] composes
//! them as a plain product and does nothing more than forward to each
//! member; there is no domain trait or inheritance hierarchy to satisfy.

use sappp_nir::{Instruction, Op};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

fn arg_i64(args: &[serde_json::Value], index: usize) -> Option<i64> {
    args.get(index).and_then(serde_json::Value::as_i64)
}

fn arg_str(args: &[serde_json::Value], index: usize) -> Option<&str> {
    args.get(index).and_then(serde_json::Value::as_str)
}

fn arg_is_null(args: &[serde_json::Value], index: usize) -> bool {
    matches!(args.get(index), Some(serde_json::Value::Null))
}

// ---------------------------------------------------------------------------
// Interval
// ---------------------------------------------------------------------------

/// An interval over the integer values a symbolic variable may take.
///
/// `Bottom` means no reaching path assigns this variable a value yet.
/// `Range { lo, hi }` with `lo == i64::MIN` and/or `hi == i64::MAX`
/// represents an unbounded end; `Range { lo: i64::MIN, hi: i64::MAX }` is
/// the domain's top element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind")]
pub enum Interval {
    /// No information yet.
    Bottom,
    /// A closed range `[lo, hi]`.
    Range {
        /// Inclusive lower bound.
        lo: i64,
        /// Inclusive upper bound.
        hi: i64,
    },
}

impl Interval {
    /// The unconstrained top element.
    #[must_use]
    pub const fn top() -> Self {
        Self::Range {
            lo: i64::MIN,
            hi: i64::MAX,
        }
    }

    /// The interval containing exactly `v`.
    #[must_use]
    pub const fn exact(v: i64) -> Self {
        Self::Range { lo: v, hi: v }
    }

    /// Least upper bound: the smallest range containing both operands.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bottom, x) | (x, Self::Bottom) => *x,
            (Self::Range { lo: l1, hi: h1 }, Self::Range { lo: l2, hi: h2 }) => Self::Range {
                lo: (*l1).min(*l2),
                hi: (*h1).max(*h2),
            },
        }
    }

    /// Standard interval widening: any bound that grew since the last
    /// iteration is snapped to infinity, guaranteeing termination.
    #[must_use]
    pub fn widen(&self, next: &Self) -> Self {
        match (self, next) {
            (Self::Bottom, x) => *x,
            (x, Self::Bottom) => *x,
            (Self::Range { lo: l1, hi: h1 }, Self::Range { lo: l2, hi: h2 }) => Self::Range {
                lo: if l2 < l1 { i64::MIN } else { *l1 },
                hi: if h2 > h1 { i64::MAX } else { *h1 },
            },
        }
    }

    /// True if this interval could contain zero.
    #[must_use]
    pub fn may_be_zero(&self) -> bool {
        matches!(self, Self::Range { lo, hi } if *lo <= 0 && 0 <= *hi)
    }

    /// True if every value in this interval is zero.
    #[must_use]
    pub fn must_be_zero(&self) -> bool {
        matches!(self, Self::Range { lo: 0, hi: 0 })
    }

    /// True if zero is provably excluded from this interval.
    #[must_use]
    pub fn cannot_be_zero(&self) -> bool {
        matches!(self, Self::Range { lo, hi } if *lo > 0 || *hi < 0)
    }

    /// True if every value `self` can take lies in `[0, bound)` on every
    /// reaching path. Uses `bound`'s lower bound, so a bound that is itself
    /// imprecise still yields a sound answer: if `self` fits under the
    /// *smallest* value `bound` could be, it fits under the real one too.
    #[must_use]
    pub fn provably_in_bounds(&self, bound: &Self) -> bool {
        match (self, bound) {
            (Self::Range { lo, hi }, Self::Range { lo: blo, .. }) => *lo >= 0 && *hi < *blo,
            _ => false,
        }
    }

    /// True if every value `self` can take falls outside `[0, bound)` on
    /// every reaching path: either always negative, or always at or past
    /// the *largest* value `bound` could be (so it is past the real bound
    /// too, whatever that turns out to be).
    #[must_use]
    pub fn provably_out_of_bounds(&self, bound: &Self) -> bool {
        match (self, bound) {
            (Self::Range { hi, .. }, _) if *hi < 0 => true,
            (Self::Range { lo, .. }, Self::Range { hi: bhi, .. }) => *lo >= *bhi,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Null
// ---------------------------------------------------------------------------

/// Nullability of a pointer-valued variable: `⊥, MustNull, MustNonNull,
/// MayNull, ⊤`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Null {
    /// No information yet.
    Bottom,
    /// Provably null on every reaching path.
    MustNull,
    /// Provably non-null on every reaching path.
    MustNonNull,
    /// Null on some reaching paths, non-null on others.
    MayNull,
    /// No information is precise enough to be useful.
    Top,
}

impl Null {
    /// Least upper bound.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        use Null::{Bottom, MayNull, MustNonNull, MustNull, Top};
        match (self, other) {
            (Bottom, x) | (x, Bottom) => *x,
            (a, b) if a == b => *a,
            (Top, _) | (_, Top) => Top,
            (MustNull, MustNonNull) | (MustNonNull, MustNull) => MayNull,
            (MayNull, _) | (_, MayNull) => MayNull,
        }
    }

    /// `Null` has finite height; widening is just `join`.
    #[must_use]
    pub fn widen(&self, other: &Self) -> Self {
        self.join(other)
    }
}

// ---------------------------------------------------------------------------
// Lifetime
// ---------------------------------------------------------------------------

/// Object-lifetime state: `⊥, Live, Dead, Moved, ⊤`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    /// No information yet.
    Bottom,
    /// The object's storage is valid and its value unmoved-from.
    Live,
    /// The object's storage has ended (`lifetime.end`/`dtor`/`free`).
    Dead,
    /// The object's value was moved out of it.
    Moved,
    /// No information is precise enough to be useful.
    Top,
}

impl Lifetime {
    /// Least upper bound.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bottom, x) | (x, Self::Bottom) => *x,
            (a, b) if a == b => *a,
            _ => Self::Top,
        }
    }

    /// `Lifetime` has finite height; widening is just `join`.
    #[must_use]
    pub fn widen(&self, other: &Self) -> Self {
        self.join(other)
    }

    /// True if a use requiring liveness is provably unsound here.
    #[must_use]
    pub fn proves_use_after_lifetime(&self) -> bool {
        matches!(self, Self::Dead | Self::Moved)
    }
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

/// Definite-initialization state of a local variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Init {
    /// No information yet.
    Bottom,
    /// Provably uninitialized on every reaching path.
    Uninit,
    /// Initialized on some reaching paths, uninitialized on others.
    MaybeInit,
    /// Provably initialized on every reaching path.
    Init,
}

impl Init {
    /// Least upper bound.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bottom, x) | (x, Self::Bottom) => *x,
            (a, b) if a == b => *a,
            _ => Self::MaybeInit,
        }
    }

    /// `Init` has finite height; widening is just `join`.
    #[must_use]
    pub fn widen(&self, other: &Self) -> Self {
        self.join(other)
    }
}

// ---------------------------------------------------------------------------
// Points-to
// ---------------------------------------------------------------------------

/// An abstract memory location: an allocation site plus an optional field
/// selector within it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct AbstractLocation {
    /// The instruction id of the allocation (or parameter/global origin)
    /// this location traces back to.
    pub alloc_site: String,
    /// Field selector within the allocation, if this location denotes a
    /// sub-object rather than the whole allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// The set of abstract locations a pointer variable may refer to.
///
/// `Top` means "points somewhere unconstrained" (e.g. the return value of
/// an un-contracted external call): sound, but useless for proving
/// anything about what it points to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "locations")]
pub enum PointsTo {
    /// No information yet.
    Bottom,
    /// Exactly one of these abstract locations.
    Locations(BTreeSet<AbstractLocation>),
    /// Unconstrained.
    Top,
}

impl PointsTo {
    /// A points-to set naming a single allocation site.
    #[must_use]
    pub fn singleton(alloc_site: impl Into<String>) -> Self {
        let mut set = BTreeSet::new();
        set.insert(AbstractLocation {
            alloc_site: alloc_site.into(),
            field: None,
        });
        Self::Locations(set)
    }

    /// Least upper bound: union of location sets, or `Top` if either side
    /// is already unconstrained.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bottom, x) | (x, Self::Bottom) => x.clone(),
            (Self::Top, _) | (_, Self::Top) => Self::Top,
            (Self::Locations(a), Self::Locations(b)) => Self::Locations(a.union(b).cloned().collect()),
        }
    }

    /// Points-to sets can grow without bound across loop iterations
    /// (new allocation sites per iteration); widen straight to `Top` once
    /// growth is observed, matching the other domains' finite-height
    /// fallback.
    #[must_use]
    pub fn widen(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bottom, x) => x.clone(),
            (x, Self::Bottom) => x.clone(),
            (Self::Locations(a), Self::Locations(b)) if a == b => self.clone(),
            _ => Self::Top,
        }
    }
}

// ---------------------------------------------------------------------------
// AbstractState: the product
// ---------------------------------------------------------------------------

/// The fixpoint engine's per-program-point state: the product of all five
/// sub-domains, each keyed by symbolic variable name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AbstractState {
    /// Interval domain, keyed by variable name.
    pub intervals: BTreeMap<String, Interval>,
    /// Null domain, keyed by variable name.
    pub nulls: BTreeMap<String, Null>,
    /// Lifetime domain, keyed by variable name.
    pub lifetimes: BTreeMap<String, Lifetime>,
    /// Init domain, keyed by variable name.
    pub inits: BTreeMap<String, Init>,
    /// Points-to domain, keyed by variable name.
    pub points_to: BTreeMap<String, PointsTo>,
}

impl AbstractState {
    /// The state with every map empty (the product's bottom: no
    /// information about any variable).
    #[must_use]
    pub fn bottom() -> Self {
        Self::default()
    }

    /// Current interval for `var`, or `Interval::Bottom` if untracked.
    #[must_use]
    pub fn interval(&self, var: &str) -> Interval {
        self.intervals.get(var).copied().unwrap_or(Interval::Bottom)
    }

    /// Current nullability for `var`, or `Null::Bottom` if untracked.
    #[must_use]
    pub fn null(&self, var: &str) -> Null {
        self.nulls.get(var).copied().unwrap_or(Null::Bottom)
    }

    /// Current lifetime state for `var`, or `Lifetime::Bottom` if untracked.
    #[must_use]
    pub fn lifetime(&self, var: &str) -> Lifetime {
        self.lifetimes.get(var).copied().unwrap_or(Lifetime::Bottom)
    }

    /// Current init state for `var`, or `Init::Bottom` if untracked.
    #[must_use]
    pub fn init(&self, var: &str) -> Init {
        self.inits.get(var).copied().unwrap_or(Init::Bottom)
    }

    /// Current points-to set for `var`, or `PointsTo::Bottom` if untracked.
    #[must_use]
    pub fn points_to(&self, var: &str) -> PointsTo {
        self.points_to.get(var).cloned().unwrap_or(PointsTo::Bottom)
    }

    /// Pointwise join, per variable, per sub-domain.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        Self {
            intervals: join_maps(&self.intervals, &other.intervals, Interval::join),
            nulls: join_maps(&self.nulls, &other.nulls, Null::join),
            lifetimes: join_maps(&self.lifetimes, &other.lifetimes, Lifetime::join),
            inits: join_maps(&self.inits, &other.inits, Init::join),
            points_to: join_maps(&self.points_to, &other.points_to, PointsTo::join),
        }
    }

    /// Pointwise widen, per variable, per sub-domain. `self` is the
    /// previous iteration's state, `self` widened towards `next`.
    #[must_use]
    pub fn widen(&self, next: &Self) -> Self {
        Self {
            intervals: join_maps(&self.intervals, &next.intervals, Interval::widen),
            nulls: join_maps(&self.nulls, &next.nulls, Null::widen),
            lifetimes: join_maps(&self.lifetimes, &next.lifetimes, Lifetime::widen),
            inits: join_maps(&self.inits, &next.inits, Init::widen),
            points_to: join_maps(&self.points_to, &next.points_to, PointsTo::widen),
        }
    }

    /// Apply one instruction's transfer function, producing the state
    /// that holds immediately after it.
    ///
    /// Deterministic and pure: the same `(state, instruction)` pair always
    /// produces the same successor state. Instructions this crate does not
    /// model leave every sub-domain unchanged, which is always sound (it
    /// never asserts more than was already known).
    #[must_use]
    pub fn transfer(&self, inst: &Instruction) -> Self {
        let mut next = self.clone();
        match &inst.op {
            Op::Alloc => {
                if let Some(dest) = arg_str(&inst.args, 0) {
                    next.nulls.insert(dest.to_string(), Null::MustNonNull);
                    next.lifetimes.insert(dest.to_string(), Lifetime::Live);
                    next.inits.insert(dest.to_string(), Init::Init);
                    next.points_to.insert(dest.to_string(), PointsTo::singleton(inst.id.clone()));
                }
            }
            Op::LifetimeBegin => {
                if let Some(target) = arg_str(&inst.args, 0) {
                    next.lifetimes.insert(target.to_string(), Lifetime::Live);
                }
            }
            Op::LifetimeEnd | Op::Free | Op::Dtor => {
                if let Some(target) = arg_str(&inst.args, 0) {
                    next.lifetimes.insert(target.to_string(), Lifetime::Dead);
                }
            }
            Op::Move => {
                if let Some(src) = arg_str(&inst.args, 1) {
                    next.lifetimes.insert(src.to_string(), Lifetime::Moved);
                    if let Some(dest) = arg_str(&inst.args, 0) {
                        if dest != "_" {
                            let pt = self.points_to(src);
                            next.points_to.insert(dest.to_string(), pt);
                            next.lifetimes.insert(dest.to_string(), Lifetime::Live);
                        }
                    }
                }
            }
            Op::Assign => {
                if let Some(dest) = arg_str(&inst.args, 0) {
                    if let Some(n) = arg_i64(&inst.args, 1) {
                        next.intervals.insert(dest.to_string(), Interval::exact(n));
                        next.nulls.insert(dest.to_string(), Null::MustNonNull);
                    } else if arg_is_null(&inst.args, 1) {
                        next.nulls.insert(dest.to_string(), Null::MustNull);
                        next.points_to.insert(dest.to_string(), PointsTo::Locations(BTreeSet::new()));
                    } else if let Some(src) = arg_str(&inst.args, 1) {
                        next.intervals.insert(dest.to_string(), self.interval(src));
                        next.nulls.insert(dest.to_string(), self.null(src));
                        next.points_to.insert(dest.to_string(), self.points_to(src));
                    } else {
                        next.intervals.insert(dest.to_string(), Interval::top());
                        next.nulls.insert(dest.to_string(), Null::Top);
                    }
                    next.inits.insert(dest.to_string(), Init::Init);
                }
            }
            Op::Store => {
                if let Some(dest) = arg_str(&inst.args, 0) {
                    next.inits.insert(dest.to_string(), Init::Init);
                }
            }
            Op::Load => {
                if let Some(dest) = arg_str(&inst.args, 0) {
                    next.inits.insert(dest.to_string(), Init::Init);
                    next.nulls.insert(dest.to_string(), Null::Top);
                }
            }
            Op::Call | Op::Vcall | Op::Invoke => {
                if let Some(dest) = arg_str(&inst.args, 0) {
                    next.nulls.insert(dest.to_string(), Null::Top);
                    next.points_to.insert(dest.to_string(), PointsTo::Top);
                    next.inits.insert(dest.to_string(), Init::Init);
                }
            }
            _ => {}
        }
        next
    }
}

fn join_maps<V: Clone>(
    a: &BTreeMap<String, V>,
    b: &BTreeMap<String, V>,
    op: impl Fn(&V, &V) -> V,
) -> BTreeMap<String, V> {
    let mut out = BTreeMap::new();
    for key in a.keys().chain(b.keys()).collect::<BTreeSet<_>>() {
        let merged = match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) => op(x, y),
            (Some(x), None) | (None, Some(x)) => x.clone(),
            (None, None) => unreachable!("key came from one of the two maps"),
        };
        out.insert(key.clone(), merged);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sappp_nir::Location;

    fn inst(op: Op, args: Vec<serde_json::Value>) -> Instruction {
        Instruction {
            id: "i0".to_string(),
            op,
            args,
            src: None,
        }
    }

    #[test]
    fn interval_join_widens_to_cover_both() {
        let a = Interval::Range { lo: 0, hi: 5 };
        let b = Interval::Range { lo: 3, hi: 10 };
        assert_eq!(a.join(&b), Interval::Range { lo: 0, hi: 10 });
    }

    #[test]
    fn interval_widen_snaps_growing_bound_to_infinity() {
        let a = Interval::Range { lo: 0, hi: 5 };
        let b = Interval::Range { lo: 0, hi: 6 };
        assert_eq!(a.widen(&b), Interval::Range { lo: 0, hi: i64::MAX });
    }

    #[test]
    fn interval_divzero_predicates() {
        assert!(Interval::exact(0).must_be_zero());
        assert!(Interval::Range { lo: -1, hi: 1 }.may_be_zero());
        assert!(Interval::Range { lo: 1, hi: 5 }.cannot_be_zero());
    }

    #[test]
    fn interval_bounds_predicates_match_a_constant_index_against_a_constant_size() {
        let idx = Interval::exact(10);
        let size = Interval::exact(5);
        assert!(idx.provably_out_of_bounds(&size));
        assert!(!idx.provably_in_bounds(&size));

        let idx = Interval::exact(2);
        assert!(idx.provably_in_bounds(&size));
        assert!(!idx.provably_out_of_bounds(&size));
    }

    #[test]
    fn interval_bounds_predicates_are_unknown_when_the_index_straddles_the_bound() {
        let idx = Interval::Range { lo: 0, hi: 10 };
        let size = Interval::exact(5);
        assert!(!idx.provably_in_bounds(&size));
        assert!(!idx.provably_out_of_bounds(&size));
    }

    #[test]
    fn interval_bounds_predicate_catches_a_negative_index_without_a_bound() {
        let idx = Interval::Range { lo: i64::MIN, hi: -1 };
        assert!(idx.provably_out_of_bounds(&Interval::top()));
    }

    #[test]
    fn null_join_of_must_null_and_must_non_null_is_may_null() {
        assert_eq!(Null::MustNull.join(&Null::MustNonNull), Null::MayNull);
    }

    #[test]
    fn lifetime_dead_and_moved_prove_use_after_lifetime() {
        assert!(Lifetime::Dead.proves_use_after_lifetime());
        assert!(Lifetime::Moved.proves_use_after_lifetime());
        assert!(!Lifetime::Live.proves_use_after_lifetime());
    }

    #[test]
    fn init_join_of_differing_states_is_maybe_init() {
        assert_eq!(Init::Uninit.join(&Init::Init), Init::MaybeInit);
    }

    #[test]
    fn points_to_join_unions_location_sets() {
        let a = PointsTo::singleton("alloc1");
        let b = PointsTo::singleton("alloc2");
        let PointsTo::Locations(union) = a.join(&b) else {
            panic!("expected Locations");
        };
        assert_eq!(union.len(), 2);
    }

    #[test]
    fn transfer_alloc_sets_live_non_null_and_singleton_points_to() {
        let state = AbstractState::bottom();
        let next = state.transfer(&inst(Op::Alloc, vec![serde_json::json!("p")]));
        assert_eq!(next.null("p"), Null::MustNonNull);
        assert_eq!(next.lifetime("p"), Lifetime::Live);
        assert_eq!(next.init("p"), Init::Init);
    }

    #[test]
    fn transfer_free_then_use_proves_lifetime_violation() {
        let mut state = AbstractState::bottom();
        state = state.transfer(&inst(Op::Alloc, vec![serde_json::json!("p")]));
        state = state.transfer(&inst(Op::Free, vec![serde_json::json!("p")]));
        assert!(state.lifetime("p").proves_use_after_lifetime());
    }

    #[test]
    fn transfer_move_marks_source_moved_and_copies_points_to_dest() {
        let mut state = AbstractState::bottom();
        state = state.transfer(&inst(Op::Alloc, vec![serde_json::json!("p")]));
        state = state.transfer(&inst(Op::Move, vec![serde_json::json!("q"), serde_json::json!("p")]));
        assert_eq!(state.lifetime("p"), Lifetime::Moved);
        assert_eq!(state.lifetime("q"), Lifetime::Live);
        assert_eq!(state.points_to("q"), state.points_to("p"));
    }

    #[test]
    fn transfer_assign_null_literal_is_must_null() {
        let state = AbstractState::bottom();
        let next = state.transfer(&inst(Op::Assign, vec![serde_json::json!("p"), serde_json::Value::Null]));
        assert_eq!(next.null("p"), Null::MustNull);
    }

    #[test]
    fn transfer_ignores_unmodeled_ops() {
        let state = AbstractState::bottom();
        let next = state.transfer(&inst(
            Op::Branch,
            vec![serde_json::json!("cond")],
        ));
        assert_eq!(next, state);
    }

    #[test]
    fn transfer_is_indifferent_to_unused_source_location() {
        let state = AbstractState::bottom();
        let mut i = inst(Op::Alloc, vec![serde_json::json!("p")]);
        i.src = Some(Location {
            file: "a.cpp".to_string(),
            line: 1,
            col: 1,
        });
        let next = state.transfer(&i);
        assert_eq!(next.null("p"), Null::MustNonNull);
    }

    proptest! {
        #[test]
        fn interval_join_is_commutative(lo1 in -100i64..100, hi1 in -100i64..100, lo2 in -100i64..100, hi2 in -100i64..100) {
            let a = Interval::Range { lo: lo1.min(hi1), hi: lo1.max(hi1) };
            let b = Interval::Range { lo: lo2.min(hi2), hi: lo2.max(hi2) };
            prop_assert_eq!(a.join(&b), b.join(&a));
        }

        #[test]
        fn null_join_is_idempotent(variant in 0u8..5) {
            let n = match variant {
                0 => Null::Bottom,
                1 => Null::MustNull,
                2 => Null::MustNonNull,
                3 => Null::MayNull,
                _ => Null::Top,
            };
            prop_assert_eq!(n.join(&n), n);
        }
    }
}
