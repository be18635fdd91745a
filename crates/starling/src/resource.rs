use std::{
    fmt,
    time::{Duration, Instant},
};

use crate::exception::{ExcType, Exception};

/// Error returned when a resource limit is exceeded during execution.
///
/// This allows embedders to enforce strict limits on allocation count,
/// execution time, memory usage and call depth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum number of executed statements exceeded.
    Operation { limit: usize, count: usize },
    /// Maximum execution time exceeded.
    Time { limit: Duration, elapsed: Duration },
    /// Maximum memory usage exceeded.
    Memory { limit: usize, used: usize },
    /// Maximum recursion depth exceeded.
    Recursion { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Operation { limit, count } => {
                write!(f, "operation limit exceeded: {count} > {limit}")
            }
            Self::Time { limit, elapsed } => {
                write!(f, "time limit exceeded: {elapsed:?} > {limit:?}")
            }
            Self::Memory { limit, used } => {
                write!(f, "memory limit exceeded: {used} bytes > {limit} bytes")
            }
            Self::Recursion { limit, .. } => {
                write!(f, "maximum recursion depth exceeded (limit {limit})")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

impl From<ResourceError> for Exception {
    /// Maps resource errors to exception kinds:
    /// - `Recursion` → `RecursionTooDeep`
    /// - everything else → `ResourceExhausted`
    fn from(err: ResourceError) -> Self {
        let exc_type = match err {
            ResourceError::Recursion { .. } => ExcType::RecursionTooDeep,
            _ => ExcType::ResourceExhausted,
        };
        Self::new(exc_type, err.to_string())
    }
}

/// Trait for tracking resource usage and scheduling garbage collection.
///
/// Implementations can enforce limits on allocations, time, memory and call
/// depth. The evaluator is generic over the tracker, so with [`NoLimitTracker`]
/// most checks compile down to a comparison against the default depth limit.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each heap allocation.
    ///
    /// Returns `Ok(())` if the allocation should proceed, or `Err(ResourceError)`
    /// if a limit would be exceeded.
    ///
    /// # Arguments
    /// * `get_size` - Lazily computes the approximate size in bytes of the allocation
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError>;

    /// Called when memory is freed by garbage collection.
    fn on_free(&mut self, get_size: impl FnOnce() -> usize);

    /// Called at statement boundaries to check operation and time limits.
    fn check_time(&mut self) -> Result<(), ResourceError>;

    /// Called on every call entry to check the call depth.
    ///
    /// Returns `Ok(())` if within recursion limit, or `Err(ResourceError::Recursion)`
    /// if the limit would be exceeded.
    ///
    /// # Arguments
    /// * `current_depth` - Number of active calls before the new one is entered
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError>;

    /// Number of allocations between automatic collections, if collection is scheduled.
    fn gc_interval(&self) -> Option<usize> {
        None
    }
}

/// Configuration for resource limits.
///
/// All limits are optional - set to `None` to disable a specific limit.
/// Use `ResourceLimits::default()` for no limits, or build custom limits
/// with the builder pattern. Being serde-derived, limits can also be loaded
/// from a host's own configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    /// Maximum number of executed statements over the lifetime of the tracker.
    pub max_operations: Option<usize>,
    /// Maximum number of heap allocations allowed.
    pub max_allocations: Option<usize>,
    /// Maximum execution time.
    pub max_duration: Option<Duration>,
    /// Maximum heap memory in bytes (approximate).
    pub max_memory: Option<usize>,
    /// Collect garbage once N allocations happened. Checked between module-level
    /// statements and at the end of every `Module` entry point.
    pub gc_interval: Option<usize>,
    /// Maximum call depth. `None` falls back to [`DEFAULT_MAX_RECURSION_DEPTH`].
    pub max_recursion_depth: Option<usize>,
}

/// Recommended maximum call depth if not otherwise specified.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;

/// Maximum nesting for data structure operations (equality, host conversion).
///
/// Separate from the call depth limit. Protects the host stack when walking
/// deeply nested lists like `a = [a]` repeated thousands of times.
pub const MAX_DATA_RECURSION_DEPTH: usize = 200;

impl ResourceLimits {
    /// Creates limits with everything disabled except the call depth, which is set
    /// to [`DEFAULT_MAX_RECURSION_DEPTH`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_recursion_depth: Some(DEFAULT_MAX_RECURSION_DEPTH),
            ..Default::default()
        }
    }

    /// Sets the maximum number of allocations.
    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    /// Sets the maximum number of executed statements.
    #[must_use]
    pub fn max_operations(mut self, limit: usize) -> Self {
        self.max_operations = Some(limit);
        self
    }

    /// Sets the maximum execution duration.
    #[must_use]
    pub fn max_duration(mut self, limit: Duration) -> Self {
        self.max_duration = Some(limit);
        self
    }

    /// Sets the maximum memory usage in bytes.
    #[must_use]
    pub fn max_memory(mut self, limit: usize) -> Self {
        self.max_memory = Some(limit);
        self
    }

    /// Sets the garbage collection interval in allocations.
    #[must_use]
    pub fn gc_interval(mut self, interval: usize) -> Self {
        self.gc_interval = Some(interval);
        self
    }

    /// Sets the maximum call depth.
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: Option<usize>) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    fn recursion_limit(&self) -> usize {
        self.max_recursion_depth.unwrap_or(DEFAULT_MAX_RECURSION_DEPTH)
    }
}

/// Compares a depth against a limit; shared by both trackers.
#[inline]
fn check_depth(current_depth: usize, limit: usize) -> Result<(), ResourceError> {
    // current_depth is before entry, so the new depth would be current_depth + 1
    if current_depth >= limit {
        Err(ResourceError::Recursion {
            limit,
            depth: current_depth + 1,
        })
    } else {
        Ok(())
    }
}

/// A resource tracker that only enforces the call depth.
///
/// The depth limit is [`DEFAULT_MAX_RECURSION_DEPTH`] unless overridden with
/// [`NoLimitTracker::with_recursion_limit`]: runaway recursion is always a
/// reported error, even without other limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker {
    max_recursion_depth: Option<usize>,
}

impl NoLimitTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_recursion_depth: None,
        }
    }

    /// Creates a tracker with a custom call depth limit and no other limits.
    #[must_use]
    pub const fn with_recursion_limit(limit: usize) -> Self {
        Self {
            max_recursion_depth: Some(limit),
        }
    }
}

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self, _: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn on_free(&mut self, _: impl FnOnce() -> usize) {}

    #[inline]
    fn check_time(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    #[inline]
    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        check_depth(
            current_depth,
            self.max_recursion_depth.unwrap_or(DEFAULT_MAX_RECURSION_DEPTH),
        )
    }
}

/// A resource tracker that enforces configurable limits.
///
/// Tracks allocation count, memory usage, executed statements and execution time,
/// returning errors when limits are exceeded. Also schedules garbage collection
/// at the configured interval.
#[derive(Debug)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    /// When execution started (for time limit checking).
    start_time: Instant,
    /// Total number of allocations made.
    allocation_count: usize,
    /// Number of statements executed.
    operation_count: usize,
    /// Current approximate memory usage in bytes.
    current_memory: usize,
}

impl LimitedTracker {
    /// Creates a new LimitedTracker with the given limits.
    ///
    /// The start time is recorded when the tracker is created, so create
    /// it immediately before starting execution.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            start_time: Instant::now(),
            allocation_count: 0,
            operation_count: 0,
            current_memory: 0,
        }
    }

    /// Returns the current allocation count.
    #[must_use]
    pub fn allocation_count(&self) -> usize {
        self.allocation_count
    }

    /// Returns the current approximate memory usage.
    #[must_use]
    pub fn current_memory(&self) -> usize {
        self.current_memory
    }

    /// Returns the number of statements executed so far.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.operation_count
    }

    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self, get_size: impl FnOnce() -> usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }

        let size = get_size();
        if let Some(max) = self.limits.max_memory {
            let new_memory = self.current_memory + size;
            if new_memory > max {
                return Err(ResourceError::Memory {
                    limit: max,
                    used: new_memory,
                });
            }
        }

        self.allocation_count += 1;
        self.current_memory += size;
        Ok(())
    }

    fn on_free(&mut self, get_size: impl FnOnce() -> usize) {
        self.current_memory = self.current_memory.saturating_sub(get_size());
    }

    fn check_time(&mut self) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_operations {
            self.operation_count += 1;
            if self.operation_count > max {
                return Err(ResourceError::Operation {
                    limit: max,
                    count: self.operation_count,
                });
            }
        }

        if let Some(max) = self.limits.max_duration {
            let elapsed = self.start_time.elapsed();
            if elapsed > max {
                return Err(ResourceError::Time { limit: max, elapsed });
            }
        }
        Ok(())
    }

    fn check_recursion_depth(&self, current_depth: usize) -> Result<(), ResourceError> {
        check_depth(current_depth, self.limits.recursion_limit())
    }

    fn gc_interval(&self) -> Option<usize> {
        self.limits.gc_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limit_tracker_still_bounds_depth() {
        let tracker = NoLimitTracker::new();
        assert!(tracker.check_recursion_depth(DEFAULT_MAX_RECURSION_DEPTH - 1).is_ok());
        assert_eq!(
            tracker.check_recursion_depth(DEFAULT_MAX_RECURSION_DEPTH),
            Err(ResourceError::Recursion {
                limit: DEFAULT_MAX_RECURSION_DEPTH,
                depth: DEFAULT_MAX_RECURSION_DEPTH + 1,
            })
        );
    }

    #[test]
    fn limited_tracker_counts_allocations() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_allocations(2));
        assert!(tracker.on_allocate(|| 8).is_ok());
        assert!(tracker.on_allocate(|| 8).is_ok());
        let err = tracker.on_allocate(|| 8).unwrap_err();
        assert_eq!(err, ResourceError::Allocation { limit: 2, count: 3 });
        assert_eq!(tracker.current_memory(), 16);
    }

    #[test]
    fn limited_tracker_counts_operations() {
        let mut tracker = LimitedTracker::new(ResourceLimits::new().max_operations(1));
        assert!(tracker.check_time().is_ok());
        assert!(matches!(tracker.check_time(), Err(ResourceError::Operation { limit: 1, count: 2 })));
    }

    #[test]
    fn recursion_error_maps_to_recursion_too_deep() {
        let exc: Exception = ResourceError::Recursion { limit: 3, depth: 4 }.into();
        assert_eq!(exc.exc_type(), ExcType::RecursionTooDeep);
        let exc: Exception = ResourceError::Allocation { limit: 1, count: 2 }.into();
        assert_eq!(exc.exc_type(), ExcType::ResourceExhausted);
    }
}
