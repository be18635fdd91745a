//! Evaluation tracing infrastructure.
//!
//! Provides a trait-based tracing system for the evaluator with zero-cost abstraction.
//! When using [`NoopTracer`], all trace methods compile away entirely via monomorphization,
//! the same way [`NoLimitTracker`](crate::NoLimitTracker) eliminates most
//! resource checking overhead.
//!
//! # Architecture
//!
//! The [`CallTracer`] trait defines hook points at key evaluation events (statements,
//! function calls and returns, function creation, free variable reads). Concrete
//! implementations collect different kinds of data:
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (default) |
//! | [`StderrTracer`] | Human-readable call log to stderr |
//! | [`ProfilingTracer`] | Per-function call counts and call depth tracking |
//! | [`RecordingTracer`] | Full event recording for post-mortem analysis and tests |
//!
//! # Usage
//!
//! Hosts pick the tracer per entry point:
//!
//! ```
//! use starling::{syntax::*, Module, ProfilingTracer};
//!
//! let mut module = Module::new("demo");
//! let program = vec![
//!     Stmt::def("twice", vec![Param::required("x")], vec![Stmt::ret(Expr::binop(Expr::name("x"), Operator::Mult, Expr::int(2)))]),
//!     Stmt::assign("y", Expr::call(Expr::name("twice"), vec![Arg::positional(Expr::int(21))])),
//! ];
//! let mut tracer = ProfilingTracer::new();
//! module.exec_traced(&program, &mut tracer).unwrap();
//! assert_eq!(tracer.report().total_calls, 1);
//! ```

use std::fmt;

use ahash::AHashMap;

/// Trace event emitted during evaluation.
///
/// Used by [`RecordingTracer`] to capture a full execution trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A statement is about to run.
    Statement {
        /// Statement kind, e.g. `"assign"` or `"return"`.
        kind: &'static str,
        /// Call depth at the time the statement runs (0 at module level).
        depth: usize,
    },
    /// A function call entered its body.
    Call {
        /// Function name (`"lambda"` for anonymous functions).
        func_name: String,
        /// Call depth after the entry.
        depth: usize,
    },
    /// A function call left its body, normally or with an error.
    Return {
        func_name: String,
        /// Call depth after the exit.
        depth: usize,
    },
    /// A `def` or `lambda` was executed, creating a new function value.
    MakeFunction {
        func_name: String,
        /// Number of default values evaluated for the new function.
        defaults_count: usize,
        /// Whether the function captured an enclosing call frame.
        captures_frame: bool,
    },
    /// A free variable was read from an enclosing frame.
    FreeLoad {
        name: String,
        /// Number of frames walked up from the current one.
        frames_up: u16,
    },
}

/// Trait for evaluation tracing.
///
/// All methods have default no-op implementations, so [`NoopTracer`] requires
/// zero lines of code and compiles to zero instructions. Implementations only
/// override the hooks they care about.
///
/// The evaluator carries the tracer as a type parameter `Tr: CallTracer`, so the
/// compiler can inline and eliminate no-op calls (identical to `ResourceTracker`).
pub trait CallTracer: fmt::Debug {
    /// Called before each statement is executed.
    ///
    /// This is the hottest hook. Implementations should be as lightweight as possible.
    ///
    /// # Arguments
    /// * `kind` - Short statement kind name
    /// * `depth` - Number of active function calls
    #[inline(always)]
    fn on_statement(&mut self, _kind: &'static str, _depth: usize) {}

    /// Called after a call has bound its arguments, before the body runs.
    ///
    /// Native functions are reported too.
    ///
    /// # Arguments
    /// * `func_name` - Name of the callee
    /// * `depth` - Call depth after the entry
    #[inline(always)]
    fn on_call(&mut self, _func_name: &str, _depth: usize) {}

    /// Called when a call returns or fails.
    ///
    /// # Arguments
    /// * `func_name` - Name of the callee
    /// * `depth` - Call depth after the exit
    #[inline(always)]
    fn on_return(&mut self, _func_name: &str, _depth: usize) {}

    /// Called when a `def` or `lambda` creates a function value.
    ///
    /// # Arguments
    /// * `func_name` - Name of the function
    /// * `defaults_count` - Number of default values evaluated
    /// * `captures_frame` - Whether an enclosing call frame was captured
    #[inline(always)]
    fn on_make_function(&mut self, _func_name: &str, _defaults_count: usize, _captures_frame: bool) {}

    /// Called when a free variable is read through the closure frame chain.
    #[inline(always)]
    fn on_free_load(&mut self, _name: &str, _frames_up: u16) {}
}

impl<Tr: CallTracer + ?Sized> CallTracer for &mut Tr {
    #[inline(always)]
    fn on_statement(&mut self, kind: &'static str, depth: usize) {
        (**self).on_statement(kind, depth);
    }

    #[inline(always)]
    fn on_call(&mut self, func_name: &str, depth: usize) {
        (**self).on_call(func_name, depth);
    }

    #[inline(always)]
    fn on_return(&mut self, func_name: &str, depth: usize) {
        (**self).on_return(func_name, depth);
    }

    #[inline(always)]
    fn on_make_function(&mut self, func_name: &str, defaults_count: usize, captures_frame: bool) {
        (**self).on_make_function(func_name, defaults_count, captures_frame);
    }

    #[inline(always)]
    fn on_free_load(&mut self, name: &str, frames_up: u16) {
        (**self).on_free_load(name, frames_up);
    }
}

// ============================================================================
// NoopTracer - zero-cost default
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl CallTracer for NoopTracer {}

// ============================================================================
// StderrTracer - human-readable call log
// ============================================================================

/// Tracer that prints a human-readable call log to stderr.
///
/// Output format:
/// ```text
///   +++ DEF fib                  defaults=0
///   >>> CALL fib                 depth=1
///     >>> CALL fib                 depth=2
///     <<< RETURN fib               depth=1
///   <<< RETURN fib               depth=0
/// ```
///
/// Statements are not logged; they would drown out the call structure.
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Maximum number of lines to print before stopping. None = unlimited.
    limit: Option<usize>,
    /// Number of lines printed so far.
    count: usize,
    /// Whether we've stopped tracing (hit the limit).
    stopped: bool,
}

impl StderrTracer {
    /// Creates a new stderr tracer with no line limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new stderr tracer that stops after `limit` lines.
    ///
    /// Useful when tracing runaway recursion, where the interesting part is
    /// the first few calls.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    fn emit(&mut self, line: fmt::Arguments<'_>, depth: usize) {
        if self.stopped {
            return;
        }
        let indent = depth.min(40) * 2;
        eprintln!("{:indent$}{line}", "");
        self.count += 1;
        if let Some(limit) = self.limit
            && self.count >= limit
        {
            eprintln!("--- trace limit reached ({limit} lines) ---");
            self.stopped = true;
        }
    }
}

impl CallTracer for StderrTracer {
    fn on_call(&mut self, func_name: &str, depth: usize) {
        self.emit(format_args!("  >>> CALL {func_name:<20} depth={depth}"), depth.saturating_sub(1));
    }

    fn on_return(&mut self, func_name: &str, depth: usize) {
        self.emit(format_args!("  <<< RETURN {func_name:<18} depth={depth}"), depth);
    }

    fn on_make_function(&mut self, func_name: &str, defaults_count: usize, captures_frame: bool) {
        let kind = if captures_frame { "CLOSURE" } else { "DEF" };
        self.emit(format_args!("  +++ {kind} {func_name:<20} defaults={defaults_count}"), 0);
    }
}

// ============================================================================
// ProfilingTracer - call counts and depth tracking
// ============================================================================

/// Tracer that collects execution statistics for profiling.
///
/// Tracks:
/// - Per-function call counts (which functions are hot)
/// - Total statement count
/// - Maximum call depth reached
/// - Number of functions created and free variable reads
///
/// Retrieve results via [`ProfilingTracer::report`] after execution.
#[derive(Debug, Default)]
pub struct ProfilingTracer {
    call_counts: AHashMap<String, u64>,
    total_statements: u64,
    max_depth: usize,
    total_calls: u64,
    functions_created: u64,
    free_loads: u64,
}

/// Summary report from a profiling trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilingReport {
    /// Per-function call counts, most called first (ties by name).
    pub call_counts: Vec<(String, u64)>,
    pub total_statements: u64,
    /// Maximum call depth observed.
    pub max_depth: usize,
    pub total_calls: u64,
    pub functions_created: u64,
    pub free_loads: u64,
}

impl ProfilingTracer {
    /// Creates a new profiling tracer with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a profiling report from the collected data.
    #[must_use]
    pub fn report(&self) -> ProfilingReport {
        let mut call_counts: Vec<_> = self.call_counts.iter().map(|(k, &v)| (k.clone(), v)).collect();
        call_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ProfilingReport {
            call_counts,
            total_statements: self.total_statements,
            max_depth: self.max_depth,
            total_calls: self.total_calls,
            functions_created: self.functions_created,
            free_loads: self.free_loads,
        }
    }
}

impl CallTracer for ProfilingTracer {
    #[inline]
    fn on_statement(&mut self, _kind: &'static str, _depth: usize) {
        self.total_statements += 1;
    }

    fn on_call(&mut self, func_name: &str, depth: usize) {
        self.total_calls += 1;
        self.max_depth = self.max_depth.max(depth);
        if let Some(count) = self.call_counts.get_mut(func_name) {
            *count += 1;
        } else {
            self.call_counts.insert(func_name.to_owned(), 1);
        }
    }

    fn on_make_function(&mut self, _func_name: &str, _defaults_count: usize, _captures_frame: bool) {
        self.functions_created += 1;
    }

    fn on_free_load(&mut self, _name: &str, _frames_up: u16) {
        self.free_loads += 1;
    }
}

impl fmt::Display for ProfilingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Call Profiling Report ===")?;
        writeln!(f, "Statements:         {}", self.total_statements)?;
        writeln!(f, "Total calls:        {}", self.total_calls)?;
        writeln!(f, "Max call depth:     {}", self.max_depth)?;
        writeln!(f, "Functions created:  {}", self.functions_created)?;
        writeln!(f, "Free variable reads: {}", self.free_loads)?;
        writeln!(f)?;
        writeln!(f, "--- Calls per function ---")?;
        for (name, count) in &self.call_counts {
            writeln!(f, "  {name:<20} {count:>10}")?;
        }
        Ok(())
    }
}

// ============================================================================
// RecordingTracer - full event recording
// ============================================================================

/// Tracer that records all events for post-mortem analysis.
///
/// Captures every trace event into a `Vec<TraceEvent>`. This is the most
/// expensive tracer (allocates per event), so use it only for debugging
/// specific issues or recording short executions.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    /// All recorded events in chronological order.
    events: Vec<TraceEvent>,
    /// Optional limit on number of events recorded.
    limit: Option<usize>,
}

impl RecordingTracer {
    /// Creates a new recording tracer with no event limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new recording tracer that stops recording after `limit` events.
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: Vec::with_capacity(limit.min(1024)),
            limit: Some(limit),
        }
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Consumes the tracer and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    /// Names of the called functions, in the order the calls were entered.
    #[must_use]
    pub fn call_order(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Call { func_name, .. } => Some(func_name.as_str()),
                _ => None,
            })
            .collect()
    }

    fn at_limit(&self) -> bool {
        self.limit.is_some_and(|l| self.events.len() >= l)
    }

    fn record(&mut self, event: TraceEvent) {
        if !self.at_limit() {
            self.events.push(event);
        }
    }
}

impl CallTracer for RecordingTracer {
    fn on_statement(&mut self, kind: &'static str, depth: usize) {
        self.record(TraceEvent::Statement { kind, depth });
    }

    fn on_call(&mut self, func_name: &str, depth: usize) {
        self.record(TraceEvent::Call {
            func_name: func_name.to_owned(),
            depth,
        });
    }

    fn on_return(&mut self, func_name: &str, depth: usize) {
        self.record(TraceEvent::Return {
            func_name: func_name.to_owned(),
            depth,
        });
    }

    fn on_make_function(&mut self, func_name: &str, defaults_count: usize, captures_frame: bool) {
        self.record(TraceEvent::MakeFunction {
            func_name: func_name.to_owned(),
            defaults_count,
            captures_frame,
        });
    }

    fn on_free_load(&mut self, name: &str, frames_up: u16) {
        self.record(TraceEvent::FreeLoad {
            name: name.to_owned(),
            frames_up,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_tracer_respects_limit() {
        let mut tracer = RecordingTracer::with_limit(2);
        tracer.on_call("yin", 1);
        tracer.on_call("yang", 2);
        tracer.on_call("yin", 3);
        assert_eq!(tracer.call_order(), ["yin", "yang"]);
        assert_eq!(tracer.events().len(), 2);
    }

    #[test]
    fn profiling_report_sorts_by_count() {
        let mut tracer = ProfilingTracer::new();
        for depth in 1..=3 {
            tracer.on_call("fib", depth);
        }
        tracer.on_call("main", 1);
        let report = tracer.report();
        assert_eq!(report.call_counts, vec![("fib".to_owned(), 3), ("main".to_owned(), 1)]);
        assert_eq!(report.max_depth, 3);
        assert!(report.to_string().contains("Max call depth:     3"));
    }
}
