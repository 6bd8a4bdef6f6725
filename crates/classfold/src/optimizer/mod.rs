//! Constant-folding passes over method bodies.
//!
//! Each pass is a self-contained sub-module working on a
//! [`MethodBody`]. The top-level [`optimize_class`] function runs them on
//! every method of a class:
//!
//! 1. peephole folding and constant propagation, alternated until neither
//!    changes anything;
//! 2. whole-method folding;
//! 3. structural repair and re-encoding of every method that changed.
//!
//! A method whose rewrite fails to encode is left exactly as it was, and the
//! constant pool entries added for it are rolled back.

use crate::bytecode::MethodBody;
use crate::classfile::descriptor::MethodDescriptor;
use crate::classfile::{ClassFile, CodeAttribute, ConstantPool};
use anyhow::{Context, Result};
use std::fmt;
use tracing::{debug, info, warn};

// ── Passes ───────────────────────────────────────────────────────────────────
pub mod const_prop;
pub mod encoding;
pub mod eval;
pub mod method_fold;
pub mod peephole;
pub mod repair;
pub mod tracker;

pub use method_fold::{FoldOutcome, Unresolved};

/// Which passes run, and whether the fixpoint loop is capped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeOptions {
    pub peephole: bool,
    pub propagation: bool,
    pub method_fold: bool,
    /// Upper bound on peephole + propagation rounds per method. `None` runs
    /// to a fixpoint, which every method reaches: a fold removes
    /// instructions and a propagation removes a load. A cap leaves output
    /// that a second run may still improve.
    pub max_rounds: Option<usize>,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            peephole: true,
            propagation: true,
            method_fold: true,
            max_rounds: None,
        }
    }
}

/// What a run did to one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    /// Methods with a `Code` attribute.
    pub methods_visited: usize,
    pub methods_changed: usize,
    pub peephole_folds: usize,
    pub loads_propagated: usize,
    /// Methods collapsed to a single constant return.
    pub methods_folded: usize,
    /// Methods whose rewrite could not be encoded and were kept as they were.
    pub methods_abandoned: usize,
}

impl fmt::Display for OptimizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} methods changed ({} peephole folds, {} loads propagated, {} methods folded, {} abandoned)",
            self.methods_changed,
            self.methods_visited,
            self.peephole_folds,
            self.loads_propagated,
            self.methods_folded,
            self.methods_abandoned
        )
    }
}

/// Per-method counters, merged into the report only if the method is kept.
#[derive(Debug, Default)]
struct MethodStats {
    peephole_folds: usize,
    loads_propagated: usize,
    folded: bool,
}

impl MethodStats {
    fn changed(&self) -> bool {
        self.peephole_folds > 0 || self.loads_propagated > 0 || self.folded
    }
}

/// Optimizes every method of `class` in place.
pub fn optimize_class(class: &mut ClassFile, options: &OptimizeOptions) -> Result<OptimizeReport> {
    let mut report = OptimizeReport::default();
    let class_name = class.class_name().unwrap_or("<unnamed>").to_string();

    for index in 0..class.methods.len() {
        let name = class.method_name(index).unwrap_or("<unnamed>").to_string();
        let code = match class.method_code(index) {
            Ok(Some(code)) => code,
            Ok(None) => continue,
            Err(e) => {
                warn!("{}.{}: skipped: {:#}", class_name, name, e);
                continue;
            }
        };
        report.methods_visited += 1;

        let descriptor = class
            .method_descriptor(index)
            .unwrap_or_default()
            .to_string();
        let is_static = class.methods[index].is_static();
        let mark = class.constant_pool.mark();

        let result = optimize_method(
            &code,
            &descriptor,
            is_static,
            &mut class.constant_pool,
            options,
        )
        .and_then(|rewritten| match rewritten {
            Some((code, stats)) => {
                class.set_method_code(index, &code)?;
                Ok(Some(stats))
            }
            None => Ok(None),
        });

        match result {
            Ok(Some(stats)) => {
                report.methods_changed += 1;
                report.peephole_folds += stats.peephole_folds;
                report.loads_propagated += stats.loads_propagated;
                report.methods_folded += usize::from(stats.folded);
            }
            Ok(None) => {
                debug!("{}.{}: unchanged", class_name, name);
                class.constant_pool.rollback(mark);
            }
            Err(e) => {
                warn!("{}.{}{}: rewrite abandoned: {:#}", class_name, name, descriptor, e);
                class.constant_pool.rollback(mark);
                report.methods_abandoned += 1;
            }
        }
    }

    info!("{}: {}", class_name, report);
    Ok(report)
}

/// Runs the passes on one method; `None` if nothing changed.
fn optimize_method(
    code: &CodeAttribute,
    descriptor: &str,
    is_static: bool,
    pool: &mut ConstantPool,
    options: &OptimizeOptions,
) -> Result<Option<(CodeAttribute, MethodStats)>> {
    let descriptor = MethodDescriptor::parse(descriptor)?;
    let mut body = MethodBody::from_code(code, pool)?;
    let mut stats = MethodStats::default();

    let mut round = 0;
    loop {
        if options.max_rounds.is_some_and(|max| round >= max) {
            debug!("stopping after {} rounds", round);
            break;
        }
        let folds = if options.peephole {
            peephole::fold(&mut body, pool)?
        } else {
            0
        };
        let loads = if options.propagation {
            const_prop::propagate(&mut body, pool)?
        } else {
            0
        };
        stats.peephole_folds += folds;
        stats.loads_propagated += loads;
        if folds + loads == 0 {
            break;
        }
        debug!("round {}: {} folds, {} loads", round, folds, loads);
        round += 1;
    }

    if options.method_fold {
        stats.folded = method_fold::fold(&mut body, pool)?;
    }

    if !stats.changed() {
        return Ok(None);
    }
    repair::repair(&mut body, &descriptor, is_static, pool);
    let code = body.to_code().context("re-encoding method")?;
    Ok(Some((code, stats)))
}

// ── optimize_class integration tests ──────────────────────────────────────────
