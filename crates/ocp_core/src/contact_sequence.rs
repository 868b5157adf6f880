//! Horizon-level contact schedule: a vector of per-stage
//! [`ContactStatus`], externally supplied and mutated only by the horizon
//! driver when the schedule is declared.

use crate::contact_status::ContactStatus;

#[derive(Debug, Clone)]
pub struct ContactSequence {
    stages: Vec<ContactStatus>,
}

impl ContactSequence {
    /// Builds a sequence of `num_stages` all-inactive statuses, each with
    /// room for `max_points` contacts.
    pub fn new(num_stages: usize, max_points: usize) -> Self {
        Self {
            stages: (0..num_stages).map(|_| ContactStatus::new(max_points)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage(&self, t: usize) -> &ContactStatus {
        &self.stages[t]
    }

    pub fn stage_mut(&mut self, t: usize) -> &mut ContactStatus {
        &mut self.stages[t]
    }

    /// Activates contact `i` on every stage in `[stage_begin, stage_end)`.
    pub fn activate_contact(&mut self, i: usize, stage_begin: usize, stage_end: usize) {
        for t in stage_begin..stage_end.min(self.stages.len()) {
            self.stages[t].activate(i);
        }
    }

    /// Deactivates contact `i` on every stage in `[stage_begin, stage_end)`.
    pub fn deactivate_contact(&mut self, i: usize, stage_begin: usize, stage_end: usize) {
        for t in stage_begin..stage_end.min(self.stages.len()) {
            self.stages[t].deactivate(i);
        }
    }

    /// Multi-index variant of [`activate_contact`](Self::activate_contact).
    pub fn activate_contacts(&mut self, indices: &[usize], stage_begin: usize, stage_end: usize) {
        for &i in indices {
            self.activate_contact(i, stage_begin, stage_end);
        }
    }

    /// Multi-index variant of [`deactivate_contact`](Self::deactivate_contact).
    pub fn deactivate_contacts(&mut self, indices: &[usize], stage_begin: usize, stage_end: usize) {
        for &i in indices {
            self.deactivate_contact(i, stage_begin, stage_end);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ContactSequence;

    #[test]
    fn activation_window_is_half_open() {
        let mut seq = ContactSequence::new(5, 2);
        seq.activate_contact(0, 1, 3);
        assert!(!seq.stage(0).is_active(0));
        assert!(seq.stage(1).is_active(0));
        assert!(seq.stage(2).is_active(0));
        assert!(!seq.stage(3).is_active(0));
    }

    #[test]
    fn deactivation_overrides_window() {
        let mut seq = ContactSequence::new(30, 1);
        seq.activate_contact(0, 0, 30);
        seq.deactivate_contact(0, 10, 20);
        for t in 0..30 {
            let expect_active = !(10..20).contains(&t);
            assert_eq!(seq.stage(t).is_active(0), expect_active, "stage {t}");
        }
    }
}
