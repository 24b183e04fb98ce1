
/// Instance lifetime: destroy, drop, vanished tracees, concurrency.
pub mod lifecycle;

/// Memory reads from the tracee.
pub mod memory;

/// Mapping removal before the first stop.
pub mod munmap;

/// Register snapshots of a live tracee.
pub mod registers;

/// Observable effects of each sandbox option.
pub mod sandbox;
