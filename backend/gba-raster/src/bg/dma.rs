use crate::transfer::VramTransfer;

pub const MAX_TRACKED_SLOTS: u8 = 128;

/// Set of in-flight BG transfer slot IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaBusyTracker {
    words: [u32; 4],
}

impl DmaBusyTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, slot: u8) {
        if slot >= MAX_TRACKED_SLOTS {
            log::warn!("Transfer slot {slot} out of range, not tracking");
            return;
        }

        self.words[usize::from(slot / 32)] |= 1 << (slot % 32);
    }

    #[must_use]
    pub fn is_marked(&self, slot: u8) -> bool {
        slot < MAX_TRACKED_SLOTS && self.words[usize::from(slot / 32)] & (1 << (slot % 32)) != 0
    }

    pub fn clear(&mut self) {
        self.words = [0; 4];
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words == [0; 4]
    }

    /// Reclaim slots whose transfers have completed, scanning in slot order. Stops and reports
    /// busy at the first tracked slot that has no space; later slots are left as they are.
    pub fn poll(&mut self, transfer: &impl VramTransfer) -> bool {
        for slot in 0..MAX_TRACKED_SLOTS {
            if !self.is_marked(slot) {
                continue;
            }

            if !transfer.has_space(slot) {
                log::trace!("BG transfer slot {slot} still busy");
                return true;
            }

            self.words[usize::from(slot / 32)] &= !(1 << (slot % 32));
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::TransferRequest;
    use std::collections::HashSet;
    use test_log::test;

    struct SpaceSet(HashSet<u8>);

    impl VramTransfer for SpaceSet {
        fn request_copy(&mut self, _request: TransferRequest<'_>) -> Option<u8> {
            None
        }

        fn has_space(&self, slot: u8) -> bool {
            self.0.contains(&slot)
        }
    }

    #[test]
    fn poll_reclaims_completed_slots() {
        let mut tracker = DmaBusyTracker::new();
        tracker.mark(3);
        tracker.mark(40);

        assert!(!tracker.poll(&SpaceSet([3, 40].into())));
        assert!(tracker.is_empty());
    }

    #[test]
    fn poll_stops_at_first_busy_slot() {
        let mut tracker = DmaBusyTracker::new();
        tracker.mark(1);
        tracker.mark(5);
        tracker.mark(100);

        assert!(tracker.poll(&SpaceSet([1, 100].into())));
        assert!(!tracker.is_marked(1));
        assert!(tracker.is_marked(5));
        assert!(tracker.is_marked(100));
    }

    #[test]
    fn out_of_range_slots_are_not_tracked() {
        let mut tracker = DmaBusyTracker::new();
        tracker.mark(200);
        assert!(tracker.is_empty());
        assert!(!tracker.is_marked(200));
    }
}
