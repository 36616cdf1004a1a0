//! Bounded counter gating new-device admission.

/// Number of new (non-reprovisioning) devices that may still be admitted.
///
/// Unsigned and saturating, so it can never go negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisioningQuota {
    remaining: u32,
}

impl ProvisioningQuota {
    /// Create a quota allowing `limit` admissions.
    pub fn new(limit: u32) -> Self {
        Self { remaining: limit }
    }

    /// Admissions left.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Check if no new device may be admitted.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }

    /// Take one unit. Returns false (and changes nothing) when exhausted.
    pub fn try_consume(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                true
            }
            None => false,
        }
    }

    /// Return a unit taken for an admission that did not go through.
    pub fn refund(&mut self) {
        self.remaining = self.remaining.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_negative() {
        let mut quota = ProvisioningQuota::new(1);
        assert!(quota.try_consume());
        assert!(quota.is_exhausted());
        assert!(!quota.try_consume());
        assert!(!quota.try_consume());
        assert_eq!(quota.remaining(), 0);
    }

    #[test]
    fn test_refund() {
        let mut quota = ProvisioningQuota::new(2);
        quota.try_consume();
        quota.refund();
        assert_eq!(quota.remaining(), 2);
    }
}
