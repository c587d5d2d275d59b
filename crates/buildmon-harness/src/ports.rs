//! Server port allocation

use std::sync::atomic::{AtomicU16, Ordering};

/// First port handed out by the process-wide allocator.
pub const BASE_PORT: u16 = 4210;

/// Monotonic port counter.
///
/// Every sandbox takes its serve port from one shared allocator so that
/// concurrently constructed sandboxes in the same process never collide.
/// Ports are never returned; the counter only moves forward.
pub struct PortAllocator {
    next: AtomicU16,
}

impl PortAllocator {
    pub const fn new(base: u16) -> Self {
        Self {
            next: AtomicU16::new(base),
        }
    }

    /// Take the next port. Increments by one per call.
    pub fn next_port(&self) -> u16 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

static PORTS: PortAllocator = PortAllocator::new(BASE_PORT);

/// Allocate a port from the process-wide allocator.
pub fn next_port() -> u16 {
    PORTS.next_port()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocator_counts_up_from_base() {
        let allocator = PortAllocator::new(5000);
        assert_eq!(allocator.next_port(), 5000);
        assert_eq!(allocator.next_port(), 5001);
        assert_eq!(allocator.next_port(), 5002);
    }

    #[test]
    fn test_global_allocator_never_repeats() {
        let a = next_port();
        let b = next_port();
        assert_ne!(a, b);
        assert!(a >= BASE_PORT);
    }
}
