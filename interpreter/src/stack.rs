//! Stack growth for the recursive passes.
//!
//! Parsing, resolution and evaluation all recurse on the shape of the source, so a deeply nested
//! program could otherwise exhaust the native stack. Each recursive entry point goes through
//! [`ensure_sufficient_stack`], which allocates a new stack segment when the current one runs low.

/// If less than this remains, the stack is grown.
const RED_ZONE: usize = 100 * 1024;

/// Size of each newly allocated segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub(crate) fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deep_recursion() {
        fn depth(n: u64) -> u64 {
            ensure_sufficient_stack(|| if n == 0 { 0 } else { depth(n - 1) + 1 })
        }

        assert_eq!(depth(100_000), 100_000);
    }
}
