//! Callback id allocation.
//!
//! The serial API carries a one-byte callback id in requests that complete
//! asynchronously. Zero means "no callback", so ids run `1..=255`.

/// Round-robin allocator over `1..=255`.
#[derive(Debug, Clone)]
pub(crate) struct CallbackIds {
    next: u8,
}

impl Default for CallbackIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl CallbackIds {
    /// Next id after the previous allocation that `in_use` does not claim.
    pub(crate) fn allocate(&mut self, in_use: impl Fn(u8) -> bool) -> Option<u8> {
        let mut candidate = self.next;
        for _ in 0..u8::MAX {
            let after = if candidate == u8::MAX { 1 } else { candidate + 1 };
            if !in_use(candidate) {
                self.next = after;
                return Some(candidate);
            }
            candidate = after;
        }
        None
    }
}
