// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

//! The analyzer engine: one [`analyze`] call runs the whole per-function
//! fixpoint, PO classification, and certificate-construction pipeline for
//! a translation unit.

use sappp_cert::{
    AbstractPoint, CasStore, Certificate, ContractDependency, Depends, IndexEntry, IrLocation, Verdict as CertVerdict,
    Violation,
};
use sappp_config::AnalysisConfig;
use sappp_domain::{AbstractState, Interval};
use sappp_error::{CoreError, CoreResult};
use sappp_nir::{BasicBlock, FunctionDef, Instruction, Nir, Op};
use sappp_po::{Po, PoKind, PoList};
use sappp_specdb::{match_contracts, select_contract, Contract, SpecdbSnapshot};
use sappp_unknown::{build_unknown_record, UnknownCode, UnknownRecord};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// A cooperative cancellation flag checked at function-boundary dequeue
/// points.
///
/// Synchronous and allocation-free, unlike an async notify-based token:
/// the worker pool below is plain `std::thread::scope`, not `tokio`, so
/// there is nothing to await. A worker observes cancellation only between
/// functions, never mid-fixpoint, so a function already in flight always
/// finishes (its PO classifications settle on whatever entry state the
/// fixpoint had reached, which is already sound: UNKNOWN is always a
/// legal answer).
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that starts out not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether [`CancellationToken::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Per-function fixpoint
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct PointState {
    abstract_state: AbstractState,
    taint: BTreeSet<UnknownCodeKey>,
}

impl PointState {
    fn join(&self, other: &Self) -> Self {
        Self {
            abstract_state: self.abstract_state.join(&other.abstract_state),
            taint: self.taint.union(&other.taint).copied().collect(),
        }
    }
}

/// `UnknownCode` has no `Ord`; this crate only ever needs set membership
/// and a fixed priority order over the closed taxonomy, so it works with
/// its own tiny sortable key rather than asking `sappp-unknown` to grow an
/// ordering it has no other use for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct UnknownCodeKey(u8);

fn code_key(code: UnknownCode) -> UnknownCodeKey {
    UnknownCodeKey(match code {
        UnknownCode::DomainTooWeakNumeric => 0,
        UnknownCode::MissingContractPre => 1,
        UnknownCode::BudgetExceeded => 2,
        UnknownCode::VirtualCallCandidateSetMissing => 3,
        UnknownCode::VirtualCallMissingContractPre => 4,
        UnknownCode::VirtualDispatchUnknown => 5,
        UnknownCode::ExceptionFlowConservative => 6,
        UnknownCode::AtomicOrderUnknown => 7,
        UnknownCode::ConcurrencyUnsupported => 8,
        UnknownCode::SyncContractMissing => 9,
        UnknownCode::LifetimeStateUnknown => 10,
    })
}

fn key_code(key: UnknownCodeKey) -> UnknownCode {
    match key.0 {
        0 => UnknownCode::DomainTooWeakNumeric,
        1 => UnknownCode::MissingContractPre,
        2 => UnknownCode::BudgetExceeded,
        3 => UnknownCode::VirtualCallCandidateSetMissing,
        4 => UnknownCode::VirtualCallMissingContractPre,
        5 => UnknownCode::VirtualDispatchUnknown,
        6 => UnknownCode::ExceptionFlowConservative,
        7 => UnknownCode::AtomicOrderUnknown,
        8 => UnknownCode::ConcurrencyUnsupported,
        9 => UnknownCode::SyncContractMissing,
        _ => UnknownCode::LifetimeStateUnknown,
    }
}

/// The least-specific (lowest-priority) code in `taints`, used when the
/// sound-downgrade policy needs to pick exactly one `unknown_code` out of
/// several reasons a PO couldn't be proved SAFE. The choice is arbitrary
/// but deterministic, which is all determinism requires here.
fn pick_taint_code(taints: &BTreeSet<UnknownCodeKey>) -> Option<UnknownCode> {
    taints.iter().next().copied().map(key_code)
}

/// Per-instruction state and accumulated taint immediately *before* that
/// instruction executes, plus whether the fixpoint converged within
/// budget.
struct FunctionFixpoint {
    entry_points: BTreeMap<(String, String), PointState>,
    converged: bool,
}

fn instruction_taint(
    inst: &Instruction,
    func: &FunctionDef,
    specdb: &[Contract],
    ctx: &sappp_specdb::ContractMatchContext,
) -> Vec<UnknownCode> {
    let arg_str = |i: usize| inst.args.get(i).and_then(serde_json::Value::as_str);
    match &inst.op {
        Op::Vcall => {
            let candidates = func
                .tables
                .as_ref()
                .and_then(|t| t.vcall_candidates.iter().find(|c| c.id == inst.id));
            match candidates {
                None => vec![UnknownCode::VirtualCallCandidateSetMissing],
                Some(set) if set.methods.is_empty() => vec![UnknownCode::VirtualCallCandidateSetMissing],
                Some(set) if set.methods.len() > 1 => vec![UnknownCode::VirtualDispatchUnknown],
                Some(set) => {
                    if select_contract(specdb, &set.methods[0], ctx).is_some() {
                        vec![]
                    } else {
                        vec![UnknownCode::VirtualCallMissingContractPre]
                    }
                }
            }
        }
        Op::Call => match arg_str(1) {
            Some(target) if select_contract(specdb, target, ctx).is_some() => vec![],
            _ => vec![UnknownCode::MissingContractPre],
        },
        Op::Invoke => {
            let mut codes = vec![UnknownCode::ExceptionFlowConservative];
            match arg_str(1) {
                Some(target) if select_contract(specdb, target, ctx).is_some() => {}
                _ => codes.push(UnknownCode::MissingContractPre),
            }
            codes
        }
        Op::AtomicRead | Op::AtomicWrite => vec![UnknownCode::AtomicOrderUnknown],
        Op::ThreadSpawn => vec![UnknownCode::ConcurrencyUnsupported],
        Op::SyncEvent => vec![UnknownCode::SyncContractMissing],
        _ => vec![],
    }
}

fn edge_taint(kind: &str) -> Option<UnknownCode> {
    (kind == "unwind").then_some(UnknownCode::ExceptionFlowConservative)
}

/// Run one function's abstract-interpretation fixpoint.
///
/// A plain round-robin solver: every round recomputes every block's entry
/// state as the join (or, past `widening_threshold` visits, the widen) of
/// its predecessors' exit states, then folds each instruction's transfer
/// function across the block recording the state and accumulated taint in
/// effect immediately before every instruction. The solver stops as soon
/// as a full round leaves every block's exit state unchanged; reaching
/// `max_iterations` without that happening reports `converged = false`.
fn run_function_fixpoint(func: &FunctionDef, specdb: &[Contract], ctx: &sappp_specdb::ContractMatchContext, max_iterations: usize, widening_threshold: usize) -> FunctionFixpoint {
    let blocks: BTreeMap<&str, &BasicBlock> = func.cfg.blocks.iter().map(|b| (b.id.as_str(), b)).collect();
    let mut predecessors: BTreeMap<&str, Vec<&sappp_nir::Edge>> = BTreeMap::new();
    for edge in &func.cfg.edges {
        predecessors.entry(edge.to.as_str()).or_default().push(edge);
    }

    let mut block_entry: BTreeMap<String, PointState> = blocks.keys().map(|id| (id.to_string(), PointState::default())).collect();
    let mut block_exit: BTreeMap<String, PointState> = block_entry.clone();
    let mut visits: BTreeMap<String, usize> = blocks.keys().map(|id| (id.to_string(), 0usize)).collect();
    let mut entry_points: BTreeMap<(String, String), PointState> = BTreeMap::new();
    let mut converged = false;

    for _round in 0..max_iterations {
        let mut changed = false;
        for (block_id, block) in &blocks {
            let preds = predecessors.get(block_id).cloned().unwrap_or_default();
            let mut incoming = PointState::default();
            for edge in &preds {
                let mut pred_exit = block_exit.get(edge.from.as_str()).cloned().unwrap_or_default();
                if let Some(extra) = edge_taint(&edge.kind) {
                    pred_exit.taint.insert(code_key(extra));
                }
                incoming = incoming.join(&pred_exit);
            }
            // The entry block (and any other block with no predecessors)
            // has no incoming edges to fold, so `incoming` stays the
            // product bottom here: parameters carry no domain information
            // until something in the function actually assigns them.
            let visit = visits.entry((*block_id).to_string()).or_insert(0);
            *visit += 1;
            let widen = *visit > widening_threshold;

            let prev_entry = block_entry.get(*block_id).cloned().unwrap_or_default();
            let new_entry = if widen {
                PointState {
                    abstract_state: prev_entry.abstract_state.widen(&incoming.abstract_state),
                    taint: prev_entry.taint.union(&incoming.taint).copied().collect(),
                }
            } else {
                prev_entry.join(&incoming)
            };

            let mut running = new_entry.clone();
            for (index, inst) in block.insts.iter().enumerate() {
                entry_points.insert(((*block_id).to_string(), inst.id.clone()), running.clone());
                let next_state = running.abstract_state.transfer(inst);
                let mut next_taint = running.taint.clone();
                for code in instruction_taint(inst, func, specdb, ctx) {
                    next_taint.insert(code_key(code));
                }
                running = PointState {
                    abstract_state: next_state,
                    taint: next_taint,
                };
                let _ = index;
            }

            if new_entry != prev_entry {
                changed = true;
            }
            let prev_exit = block_exit.get(*block_id).cloned().unwrap_or_default();
            if running != prev_exit {
                changed = true;
            }
            block_entry.insert((*block_id).to_string(), new_entry);
            block_exit.insert((*block_id).to_string(), running);
        }
        if !changed {
            converged = true;
            break;
        }
    }

    FunctionFixpoint { entry_points, converged }
}

impl PartialEq for PointState {
    fn eq(&self, other: &Self) -> bool {
        self.abstract_state == other.abstract_state && self.taint == other.taint
    }
}
impl Eq for PointState {}

// ---------------------------------------------------------------------------
// PO classification
// ---------------------------------------------------------------------------

enum Classification {
    Safe(&'static str),
    Bug(&'static str),
    Unknown(UnknownCode),
}

/// The analyzer's own convention for naming the variable a PO's anchor
/// instruction is actually about. Proof obligations carry only a
/// `(block_id, inst_id)` anchor, no operand list of their own, so the
/// subject has to be recovered from the NIR instruction at that anchor:
///
/// - `free` names its own symbol directly (`args[0]`).
/// - `load`/`store` anchors (from the `"ptr"`/`"indexed"` marker
///   convention the PO enumerator uses) carry the symbol of interest as
///   `args[1]`.
/// - `ub.check`/`sink.marker` anchors carry no operand at all; the
///   subject is the destination of the nearest preceding instruction in
///   the same block that defines one (skipping the marker-tagged forms).
fn anchor_subject(block: &BasicBlock, index: usize) -> Option<String> {
    let inst = &block.insts[index];
    let arg_str = |i: usize| inst.args.get(i).and_then(serde_json::Value::as_str);
    match &inst.op {
        Op::Free => arg_str(0).map(str::to_string),
        Op::Load | Op::Store => arg_str(1).map(str::to_string),
        Op::UbCheck | Op::SinkMarker => nearest_definition(block, index),
        _ => None,
    }
}

fn nearest_definition(block: &BasicBlock, before_index: usize) -> Option<String> {
    for inst in block.insts[..before_index].iter().rev() {
        let defines = matches!(
            inst.op,
            Op::Alloc | Op::Assign | Op::Move | Op::Load | Op::Store | Op::Call | Op::Vcall | Op::Invoke
        );
        if !defines {
            continue;
        }
        if let Some(name) = inst.args.first().and_then(serde_json::Value::as_str) {
            if name != "ptr" && name != "indexed" {
                return Some(name.to_string());
            }
        }
    }
    None
}

/// Resolves a bound-check operand (the index/amount or the declared
/// size/width) to an interval: a JSON number is a known constant, a JSON
/// string names a variable to read out of the interval domain, anything
/// else (including a missing operand) is unconstrained.
fn resolve_bound_operand(state: &AbstractState, value: Option<&serde_json::Value>) -> Interval {
    match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().map(Interval::exact).unwrap_or(Interval::top()),
        Some(serde_json::Value::String(s)) => state.interval(s),
        _ => Interval::top(),
    }
}

/// `UB.OutOfBounds` (`store indexed`) carries its index/bound pair after
/// the dest operand, at positions 2/3; `UB.Shift` and litmus-only
/// `sink.marker` forms of either kind have no dest operand, so their
/// amount/width pair sits at positions 1/2 instead.
fn bound_check_operands<'a>(inst: &'a Instruction) -> (Option<&'a serde_json::Value>, Option<&'a serde_json::Value>) {
    match inst.op {
        Op::Store => (inst.args.get(2), inst.args.get(3)),
        _ => (inst.args.get(1), inst.args.get(2)),
    }
}

fn classify_po(po: &Po, func: &FunctionDef, fixpoint: &FunctionFixpoint) -> (Classification, Option<BTreeSet<UnknownCodeKey>>) {
    if !fixpoint.converged {
        return (Classification::Unknown(UnknownCode::BudgetExceeded), None);
    }
    let Some((block_index, inst_index)) = func
        .cfg
        .blocks
        .iter()
        .enumerate()
        .find(|(_, b)| b.id == po.anchor.block_id)
        .and_then(|(bi, b)| b.insts.iter().position(|i| i.id == po.anchor.inst_id).map(|ii| (bi, ii)))
    else {
        return (Classification::Unknown(UnknownCode::DomainTooWeakNumeric), None);
    };
    let block = &func.cfg.blocks[block_index];
    let Some(point) = fixpoint.entry_points.get(&(po.anchor.block_id.clone(), po.anchor.inst_id.clone())) else {
        return (Classification::Unknown(UnknownCode::DomainTooWeakNumeric), None);
    };
    let subject = anchor_subject(block, inst_index);
    let state = &point.abstract_state;

    let candidate = match &po.po_kind {
        PoKind::DivZero => match subject.as_deref() {
            Some(s) if state.interval(s).cannot_be_zero() => Classification::Safe("interval"),
            Some(s) if state.interval(s).must_be_zero() => Classification::Bug("interval"),
            _ => Classification::Unknown(UnknownCode::DomainTooWeakNumeric),
        },
        PoKind::NullDeref => match subject.as_deref() {
            Some(s) if state.null(s) == sappp_domain::Null::MustNonNull => Classification::Safe("null"),
            Some(s) if state.null(s) == sappp_domain::Null::MustNull => Classification::Bug("null"),
            _ => Classification::Unknown(UnknownCode::DomainTooWeakNumeric),
        },
        PoKind::OutOfBounds | PoKind::Shift => {
            let inst = &block.insts[inst_index];
            let (idx_arg, bound_arg) = bound_check_operands(inst);
            let idx = resolve_bound_operand(state, idx_arg);
            let bound = resolve_bound_operand(state, bound_arg);
            if idx.provably_out_of_bounds(&bound) {
                Classification::Bug("interval")
            } else if idx.provably_in_bounds(&bound) {
                Classification::Safe("interval")
            } else {
                Classification::Unknown(UnknownCode::DomainTooWeakNumeric)
            }
        }
        PoKind::UseAfterLifetime => match subject.as_deref() {
            Some(s) if state.lifetime(s).proves_use_after_lifetime() => Classification::Bug("lifetime"),
            Some(s) if state.lifetime(s) == sappp_domain::Lifetime::Live => Classification::Safe("lifetime"),
            _ => Classification::Unknown(UnknownCode::LifetimeStateUnknown),
        },
        PoKind::DoubleFree | PoKind::InvalidFree => match subject.as_deref() {
            Some(s) if state.lifetime(s) == sappp_domain::Lifetime::Dead => Classification::Bug("lifetime"),
            Some(s) if state.lifetime(s) == sappp_domain::Lifetime::Live => Classification::Safe("lifetime"),
            _ => Classification::Unknown(UnknownCode::LifetimeStateUnknown),
        },
        PoKind::UninitRead => match subject.as_deref() {
            Some(s) if state.init(s) == sappp_domain::Init::Init => Classification::Safe("init"),
            Some(s) if state.init(s) == sappp_domain::Init::Uninit => Classification::Bug("init"),
            _ => Classification::Unknown(UnknownCode::DomainTooWeakNumeric),
        },
        PoKind::Unknown | PoKind::Other(_) => Classification::Unknown(UnknownCode::DomainTooWeakNumeric),
    };

    if matches!(candidate, Classification::Safe(_)) && !point.taint.is_empty() {
        let code = pick_taint_code(&point.taint).unwrap_or(UnknownCode::DomainTooWeakNumeric);
        return (Classification::Unknown(code), Some(point.taint.clone()));
    }
    (candidate, Some(point.taint.clone()))
}

// ---------------------------------------------------------------------------
// Certificate construction
// ---------------------------------------------------------------------------

/// One PO's final outcome, ready for the single-threaded merge stage.
enum PoOutcome {
    Classified(IndexEntry),
    Unresolved(UnknownRecord),
}

fn build_contract_refs(
    cas: &CasStore,
    specdb: &[Contract],
    target_usr: &str,
    ctx: &sappp_specdb::ContractMatchContext,
) -> CoreResult<Vec<ContractDependency>> {
    let mut deps = Vec::new();
    for contract in match_contracts(specdb, target_usr, ctx) {
        let cert = Certificate::ContractRef {
            contract_id: contract.contract_id.clone(),
            target: contract.target.usr.clone(),
            tier: contract.tier.clone(),
        };
        let hash = cas.put(&cert)?;
        deps.push(ContractDependency { contract_ref: hash });
    }
    Ok(deps)
}

fn build_certificate(
    cas: &CasStore,
    po: &Po,
    tu_id: &str,
    verdict: CertVerdict,
    domain: &'static str,
    specdb: &[Contract],
    ctx: &sappp_specdb::ContractMatchContext,
) -> CoreResult<IndexEntry> {
    let ir_ref = Certificate::IrRef {
        location: IrLocation {
            tu_id: tu_id.to_string(),
            function_uid: po.function.usr.clone(),
            block_id: po.anchor.block_id.clone(),
            inst_id: po.anchor.inst_id.clone(),
        },
    };
    let ir_hash = cas.put(&ir_ref)?;

    let evidence = match verdict {
        CertVerdict::Safe => Certificate::SafetyProof {
            domain: domain.to_string(),
            points: vec![AbstractPoint {
                ir_ref: ir_hash.clone(),
                state: serde_json::Value::Null,
            }],
        },
        CertVerdict::Bug => Certificate::BugTrace {
            trace_kind: "fixpoint-witness".to_string(),
            steps: vec![ir_hash.clone()],
            violation: Violation {
                po_id: po.po_id.clone(),
                predicate_holds: false,
            },
        },
    };
    let evidence_hash = cas.put(&evidence)?;

    let po_def = Certificate::PoDef { po: Box::new(po.clone()) };
    let po_hash = cas.put(&po_def)?;

    let contracts = build_contract_refs(cas, specdb, &po.function.usr, ctx)?;
    let depends = Depends {
        semantics_version: po.semantics_version.clone(),
        proof_system_version: po.proof_system_version.clone(),
        profile_version: po.profile_version.clone(),
        contracts,
    };

    let root = Certificate::ProofRoot {
        po: po_hash,
        ir: ir_hash,
        evidence: evidence_hash,
        result: verdict,
        depends,
        hash_scope: "core".to_string(),
    };
    let root_hash = cas.put(&root)?;
    cas.bind_po(&po.po_id, &root_hash)?;

    Ok(IndexEntry {
        schema_version: "cert_index.v1".to_string(),
        po_id: po.po_id.to_string(),
        root: root_hash,
    })
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Everything one `analyze` run produced, ready to be persisted by the
/// caller (the CLI writes `cert_index.v1` entries and the `unknown.v1`
/// ledger from these).
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    /// Every classified PO's index entry, sorted by `po_id`.
    pub cert_index: Vec<IndexEntry>,
    /// Every unclassified PO's ledger entry, sorted by `unknown_stable_id`.
    pub unknowns: Vec<UnknownRecord>,
}

fn worker_count(config: &AnalysisConfig) -> usize {
    config.jobs.unwrap_or_else(|| std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(1)).max(1)
}

/// Run the whole analyzer pipeline over one translation unit: per-function
/// fixpoints, PO classification under the sound-downgrade policy, and
/// certificate DAG construction into `cas`.
///
/// Functions are processed by a bounded worker pool; the result ordering
/// (by `po_id` for `cert_index`, by `unknown_stable_id` for `unknowns`) is
/// produced by a single-threaded merge stage afterwards, so the output is
/// identical no matter how many workers ran or in what order they
/// finished.
///
/// # Errors
///
/// Propagates any [`CoreError`] raised while building or storing
/// certificates (canonicalization failures, CAS I/O failures). Gaps in
/// what the abstract domains can prove are never errors: they become
/// `UNKNOWN` ledger entries instead.
pub fn analyze(
    nir: &Nir,
    po_list: &PoList,
    specdb: &SpecdbSnapshot,
    cas: &CasStore,
    config: &AnalysisConfig,
    cancel: &CancellationToken,
) -> CoreResult<AnalysisOutcome> {
    let functions: BTreeMap<&str, &FunctionDef> = nir.functions.iter().map(|f| (f.function_uid.as_str(), f)).collect();
    let mut pos_by_function: BTreeMap<&str, Vec<&Po>> = BTreeMap::new();
    for po in &po_list.pos {
        pos_by_function.entry(po.function.usr.as_str()).or_default().push(po);
    }

    let work: Mutex<VecDeque<&str>> = Mutex::new(pos_by_function.keys().copied().collect());
    let results: Mutex<Vec<PoOutcome>> = Mutex::new(Vec::new());
    let failure: Mutex<Option<CoreError>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..worker_count(config) {
            scope.spawn(|| loop {
                if failure.lock().expect("failure mutex poisoned").is_some() {
                    return;
                }
                let Some(usr) = work.lock().expect("work queue mutex poisoned").pop_front() else {
                    return;
                };
                let Some(func) = functions.get(usr).copied() else { continue };
                let pos = &pos_by_function[usr];

                let outcomes: CoreResult<Vec<PoOutcome>> = if cancel.is_cancelled() {
                    pos.iter()
                        .copied()
                        .map(|po| {
                            build_unknown_record(
                                &po.po_id,
                                po.po_kind.as_str(),
                                &po.function.usr,
                                UnknownCode::BudgetExceeded,
                                &po.semantics_version,
                                &po.proof_system_version,
                                &po.profile_version,
                            )
                            .map(PoOutcome::Unresolved)
                        })
                        .collect()
                } else {
                    let fixpoint = run_function_fixpoint(
                        func,
                        &specdb.contracts,
                        &config.match_context,
                        config.budget.max_iterations,
                        config.memory_domain.widening_threshold,
                    );
                    pos.iter()
                        .map(|po| classify_one(cas, po, &nir.tu_id, func, &fixpoint, &specdb.contracts, &config.match_context))
                        .collect()
                };

                match outcomes {
                    Ok(mut batch) => results.lock().expect("results mutex poisoned").append(&mut batch),
                    Err(e) => *failure.lock().expect("failure mutex poisoned") = Some(e),
                }
            });
        }
    });

    if let Some(e) = failure.into_inner().expect("failure mutex poisoned") {
        return Err(e);
    }

    let results = results.into_inner().expect("results mutex poisoned");
    let mut outcome = AnalysisOutcome::default();
    for r in results {
        match r {
            PoOutcome::Classified(entry) => outcome.cert_index.push(entry),
            PoOutcome::Unresolved(record) => outcome.unknowns.push(record),
        }
    }
    outcome.cert_index.sort_by(|a, b| a.po_id.cmp(&b.po_id));
    outcome.unknowns.sort_by(|a, b| a.unknown_stable_id.cmp(&b.unknown_stable_id));
    Ok(outcome)
}

fn classify_one(
    cas: &CasStore,
    po: &Po,
    tu_id: &str,
    func: &FunctionDef,
    fixpoint: &FunctionFixpoint,
    specdb: &[Contract],
    ctx: &sappp_specdb::ContractMatchContext,
) -> CoreResult<PoOutcome> {
    let (classification, _taint) = classify_po(po, func, fixpoint);
    match classification {
        Classification::Safe(domain) => {
            build_certificate(cas, po, tu_id, CertVerdict::Safe, domain, specdb, ctx).map(PoOutcome::Classified)
        }
        Classification::Bug(domain) => {
            build_certificate(cas, po, tu_id, CertVerdict::Bug, domain, specdb, ctx).map(PoOutcome::Classified)
        }
        Classification::Unknown(code) => build_unknown_record(
            &po.po_id,
            po.po_kind.as_str(),
            &po.function.usr,
            code,
            &po.semantics_version,
            &po.proof_system_version,
            &po.profile_version,
        )
        .map(PoOutcome::Unresolved),
    }
}
