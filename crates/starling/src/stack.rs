//! Native stack growth for the recursive evaluator.
//!
//! Each language call nests several Rust frames, so a program may reach the
//! configured call depth limit long after the default thread stack would have
//! overflowed. Expression evaluation runs under [`ensure_sufficient_stack`], which
//! keeps hitting the limit a reported `RecursionTooDeep` instead of a host crash.

/// If less than this remains, the stack is grown before recursing.
const RED_ZONE: usize = 128 * 1024;

/// Size of each additional stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth(n: u32) -> u32 {
        ensure_sufficient_stack(|| if n == 0 { 0 } else { 1 + depth(n - 1) })
    }

    #[test]
    fn deep_native_recursion_does_not_overflow() {
        assert_eq!(depth(100_000), 100_000);
    }
}
