use std::sync::{Arc, Mutex, MutexGuard};

use camino::Utf8PathBuf;
use dap::requests::{SetBreakpointsArguments, SetFunctionBreakpointsArguments};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A breakpoint registered by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Breakpoint {
    #[serde(rename_all = "camelCase")]
    Source {
        source: Utf8PathBuf,
        line: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        column: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hit_condition: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        log_message: Option<String>,
        enabled: bool,
    },
    #[serde(rename_all = "camelCase")]
    Function {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hit_condition: Option<String>,
        enabled: bool,
    },
}

impl Breakpoint {
    pub fn enabled(&self) -> bool {
        match self {
            Breakpoint::Source { enabled, .. } | Breakpoint::Function { enabled, .. } => *enabled,
        }
    }

    /// Copy of this breakpoint with every other field untouched
    #[must_use]
    pub fn disabled(&self) -> Self {
        let mut bp = self.clone();
        match &mut bp {
            Breakpoint::Source { enabled, .. } | Breakpoint::Function { enabled, .. } => {
                *enabled = false;
            }
        }
        bp
    }
}

/// Snapshot taken when a launch disables breakpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSnapshot(Vec<Breakpoint>);

/// Breakpoints known to the host, grouped by source file.
///
/// The adapter can not stop at breakpoints, it only keeps them so a launch can
/// disable them and the matching disconnect can put them back.
#[derive(Debug, Default)]
pub struct BreakpointStore {
    sources: IndexMap<Utf8PathBuf, Vec<Breakpoint>>,
    functions: Vec<Breakpoint>,
}

pub type SharedBreakpoints = Arc<Mutex<BreakpointStore>>;

impl BreakpointStore {
    pub fn shared() -> SharedBreakpoints {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Locks a shared store, recovering the data if a holder panicked
    pub fn lock(shared: &SharedBreakpoints) -> MutexGuard<'_, BreakpointStore> {
        shared
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Replaces the breakpoints of one source file
    pub fn set_source_breakpoints(&mut self, source: Utf8PathBuf, breakpoints: Vec<Breakpoint>) {
        if breakpoints.is_empty() {
            self.sources.shift_remove(&source);
        } else {
            self.sources.insert(source, breakpoints);
        }
    }

    pub fn set_function_breakpoints(&mut self, breakpoints: Vec<Breakpoint>) {
        self.functions = breakpoints;
    }

    /// Records the arguments of a `setBreakpoints` request, returns how many were stored
    pub fn apply_set_breakpoints(&mut self, args: &SetBreakpointsArguments) -> usize {
        let Some(source) = args
            .source
            .path
            .as_ref()
            .or(args.source.name.as_ref())
            .map(Utf8PathBuf::from)
        else {
            return 0;
        };

        let breakpoints: Vec<Breakpoint> = args
            .breakpoints
            .iter()
            .flatten()
            .map(|bp| Breakpoint::Source {
                source: source.clone(),
                line: bp.line,
                column: bp.column,
                condition: bp.condition.clone(),
                hit_condition: bp.hit_condition.clone(),
                log_message: bp.log_message.clone(),
                enabled: true,
            })
            .collect();
        let count = breakpoints.len();
        self.set_source_breakpoints(source, breakpoints);
        count
    }

    /// Records the arguments of a `setFunctionBreakpoints` request
    pub fn apply_set_function_breakpoints(&mut self, args: &SetFunctionBreakpointsArguments) -> usize {
        let breakpoints: Vec<Breakpoint> = args
            .breakpoints
            .iter()
            .map(|bp| Breakpoint::Function {
                name: bp.name.clone(),
                condition: bp.condition.clone(),
                hit_condition: bp.hit_condition.clone(),
                enabled: true,
            })
            .collect();
        let count = breakpoints.len();
        self.set_function_breakpoints(breakpoints);
        count
    }

    pub fn all(&self) -> Vec<Breakpoint> {
        self.sources
            .values()
            .flatten()
            .chain(self.functions.iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.values().map(Vec::len).sum::<usize>() + self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replaces every breakpoint with a disabled copy and returns the originals
    pub fn snapshot_and_disable(&mut self) -> BreakpointSnapshot {
        let snapshot = BreakpointSnapshot(self.all());
        debug!("Disabling {} breakpoints", snapshot.0.len());

        for bps in self.sources.values_mut() {
            *bps = bps.iter().map(Breakpoint::disabled).collect();
        }
        self.functions = self.functions.iter().map(Breakpoint::disabled).collect();

        snapshot
    }

    /// Puts a snapshot back verbatim, dropping whatever was stored since
    pub fn restore(&mut self, snapshot: BreakpointSnapshot) {
        debug!("Restoring {} breakpoints", snapshot.0.len());
        self.sources.clear();
        self.functions.clear();

        for bp in snapshot.0 {
            match &bp {
                Breakpoint::Source { source, .. } => {
                    self.sources.entry(source.clone()).or_default().push(bp);
                }
                Breakpoint::Function { .. } => self.functions.push(bp),
            }
        }
    }
}
