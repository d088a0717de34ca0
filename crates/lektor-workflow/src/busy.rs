use std::fmt;
use std::sync::{Mutex, MutexGuard};

use schemars::JsonSchema;
use serde::Serialize;
use tracing::warn;

use crate::error::WorkflowError;

/// The asynchronous operation categories. Each has its own busy flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Extract,
    Analyze,
    SaveGuideline,
    ListGuidelines,
    LoadGuideline,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Extract => "rule extraction",
            Operation::Analyze => "paper analysis",
            Operation::SaveGuideline => "guideline save",
            Operation::ListGuidelines => "guideline list refresh",
            Operation::LoadGuideline => "guideline load",
        };
        f.write_str(name)
    }
}

/// One flag per [`Operation`].
///
/// Each owner sets only its own flags: the workflow state owns `extracting` and
/// `analyzing`, the guideline repository owns the three store flags. A session view
/// combines the two with [`BusyFlags::merged`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct BusyFlags {
    pub extracting: bool,
    pub analyzing: bool,
    pub saving_guideline: bool,
    pub listing_guidelines: bool,
    pub loading_guideline: bool,
}

impl BusyFlags {
    pub fn is_set(&self, op: Operation) -> bool {
        *self.flag(op)
    }

    /// Set the flag for `op`. Returns `false` if it was already set.
    pub fn try_begin(&mut self, op: Operation) -> bool {
        let flag = self.flag_mut(op);
        if *flag {
            return false;
        }
        *flag = true;
        true
    }

    pub fn finish(&mut self, op: Operation) {
        *self.flag_mut(op) = false;
    }

    /// Flags set in either `self` or `other`.
    pub fn merged(self, other: BusyFlags) -> BusyFlags {
        BusyFlags {
            extracting: self.extracting || other.extracting,
            analyzing: self.analyzing || other.analyzing,
            saving_guideline: self.saving_guideline || other.saving_guideline,
            listing_guidelines: self.listing_guidelines || other.listing_guidelines,
            loading_guideline: self.loading_guideline || other.loading_guideline,
        }
    }

    fn flag(&self, op: Operation) -> &bool {
        match op {
            Operation::Extract => &self.extracting,
            Operation::Analyze => &self.analyzing,
            Operation::SaveGuideline => &self.saving_guideline,
            Operation::ListGuidelines => &self.listing_guidelines,
            Operation::LoadGuideline => &self.loading_guideline,
        }
    }

    fn flag_mut(&mut self, op: Operation) -> &mut bool {
        match op {
            Operation::Extract => &mut self.extracting,
            Operation::Analyze => &mut self.analyzing,
            Operation::SaveGuideline => &mut self.saving_guideline,
            Operation::ListGuidelines => &mut self.listing_guidelines,
            Operation::LoadGuideline => &mut self.loading_guideline,
        }
    }
}

/// State types that carry busy flags.
pub trait Tracked {
    fn busy_mut(&mut self) -> &mut BusyFlags;
}

/// Lock, recovering from poisoning. Mutations validate before they write, so a
/// poisoned guard never holds a half-applied transition.
pub(crate) fn lock<S>(cell: &Mutex<S>) -> MutexGuard<'_, S> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears an operation's busy flag when dropped, whether the operation succeeded,
/// failed, or its future was dropped mid-flight.
pub(crate) struct InFlight<'a, S: Tracked> {
    cell: &'a Mutex<S>,
    op: Operation,
}

impl<'a, S: Tracked> InFlight<'a, S> {
    /// Check-and-set under one lock. `None` means the operation is already running.
    pub(crate) fn begin(cell: &'a Mutex<S>, op: Operation) -> Option<Self> {
        let started = lock(cell).busy_mut().try_begin(op);
        started.then_some(Self { cell, op })
    }

    /// Like [`InFlight::begin`], reporting a taken flag as [`WorkflowError::Busy`].
    pub(crate) fn claim(cell: &'a Mutex<S>, op: Operation) -> Result<Self, WorkflowError> {
        Self::begin(cell, op).ok_or_else(|| {
            warn!(operation = %op, "already in progress, ignoring");
            WorkflowError::Busy(op)
        })
    }
}

impl<S: Tracked> Drop for InFlight<'_, S> {
    fn drop(&mut self) {
        lock(self.cell).busy_mut().finish(self.op);
    }
}
