pub(crate) const MAX_ARGS: usize = 8;
pub(crate) const MAX_PARAMS: usize = 8;

// Interpreted calls nest native frames, the stack guard keeps those from overflowing but a
// runaway recursion still has to stop somewhere.
pub(crate) const MAX_CALL_DEPTH: usize = 1024;

pub(crate) const MAX_REFERENCE_HOPS: usize = 256;
