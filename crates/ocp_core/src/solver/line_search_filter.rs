//! Fletcher-Leyffer style filter over `(cost, violation)` pairs. No literal
//! source survives for this exact component; the acceptance rule and
//! dominated-entry pruning below are a direct transcription of the formula.

/// A candidate `(cost, violation)` is acceptable against one filter entry
/// `(c, v)` if it strictly improves cost or violation by at least
/// `margin * v`. It is acceptable against the filter as a whole if it
/// clears every entry.
#[derive(Debug, Clone)]
pub struct LineSearchFilter {
    margin: f64,
    entries: Vec<(f64, f64)>,
}

impl LineSearchFilter {
    pub fn new(margin: f64) -> Self {
        Self { margin, entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_acceptable(&self, cost: f64, violation: f64) -> bool {
        self.entries
            .iter()
            .all(|&(c, v)| cost < c - self.margin * v || violation < v - self.margin * v)
    }

    /// Adds `(cost, violation)` to the filter and drops every existing
    /// entry it dominates (entries it compares `<=` on both axes become
    /// redundant once the tighter candidate is in the filter).
    pub fn accept(&mut self, cost: f64, violation: f64) {
        self.entries.retain(|&(c, v)| !(cost <= c && violation <= v));
        self.entries.push((cost, violation));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_accepts_anything() {
        let filter = LineSearchFilter::new(1e-5);
        assert!(filter.is_acceptable(1.0, 1.0));
        assert!(filter.is_acceptable(1e9, 1e9));
    }

    #[test]
    fn candidate_dominated_by_an_entry_is_rejected() {
        let mut filter = LineSearchFilter::new(1e-5);
        filter.accept(1.0, 1.0);
        assert!(!filter.is_acceptable(1.0, 1.0));
        assert!(!filter.is_acceptable(1.5, 1.5));
    }

    #[test]
    fn accepting_a_dominating_candidate_prunes_the_dominated_entry() {
        let mut filter = LineSearchFilter::new(0.0);
        filter.accept(2.0, 2.0);
        filter.accept(1.0, 1.0);
        assert_eq!(filter.entries.len(), 1);
        assert_eq!(filter.entries[0], (1.0, 1.0));
    }

    #[test]
    fn improving_either_axis_is_acceptable() {
        let mut filter = LineSearchFilter::new(1e-5);
        filter.accept(5.0, 5.0);
        assert!(filter.is_acceptable(4.0, 10.0));
        assert!(filter.is_acceptable(10.0, 4.0));
        assert!(!filter.is_acceptable(6.0, 6.0));
    }
}
