//! Session-scoped identifier generation.

/// Largest identifier exactly representable in every supported wire
/// encoding. JSON numbers are IEEE 754 doubles, so ids must stay within
/// `2^53 - 1`.
pub const MAX_ID: u64 = (1 << 53) - 1;

/// Monotonically increasing id generator for requests, registrations
/// and subscriptions.
///
/// Ids start at 1 and wrap back to 1 before exceeding [`MAX_ID`].
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    /// Create a generator whose first id is 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next identifier.
    pub fn next_id(&mut self) -> u64 {
        if self.next >= MAX_ID {
            self.next = 0;
        }
        self.next += 1;
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_start_at_one() {
        let mut ids = IdGenerator::new();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
    }

    #[test]
    fn test_wraparound_at_serialization_bound() {
        let mut ids = IdGenerator { next: MAX_ID - 1 };
        assert_eq!(ids.next_id(), MAX_ID);
        assert_eq!(ids.next_id(), 1);
    }

    #[test]
    fn test_max_id_is_2_pow_53_minus_1() {
        assert_eq!(MAX_ID, 9_007_199_254_740_991);
    }
}
