#![doc = include_str!("../../../README.md")]

mod args;
mod environment;
mod evaluate;
mod exception;
mod expressions;
mod frame;
mod function;
mod heap;
mod intern;
mod native;
mod object;
mod prepare;
mod resource;
mod run;
mod signature;
mod stack;
pub mod syntax;
pub mod tracer;
mod types;
mod value;

pub use crate::{
    exception::{ExcType, Exception, RunResult},
    heap::HeapStats,
    native::{NativeCall, NativeFn, ValueRef},
    object::Object,
    resource::{
        DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, MAX_DATA_RECURSION_DEPTH, NoLimitTracker, ResourceError,
        ResourceLimits, ResourceTracker,
    },
    run::Module,
    tracer::{
        CallTracer, NoopTracer, ProfilingReport, ProfilingTracer, RecordingTracer, StderrTracer, TraceEvent,
    },
    types::Type,
};
