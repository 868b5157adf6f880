//! Per-stage primal/dual iterate and its Newton step.
//!
//! Every named segment is stored as its own [`DVector<f64>`] pre-allocated
//! at the stage's maximum size and logically truncated via
//! [`Segment::resize`]. See `DESIGN.md` for why this departs from the
//! single-contiguous-buffer layout of the system this was ported from.

use nalgebra::{DVector, DVectorView, DVectorViewMut};

use crate::contact_status::ContactStatus;

/// A named block of a stage container: fixed-capacity storage with a
/// logical, possibly-smaller, active length.
#[derive(Debug, Clone)]
pub struct Segment {
    storage: DVector<f64>,
    active_len: usize,
}

impl Segment {
    pub fn new(max_len: usize) -> Self {
        Self {
            storage: DVector::zeros(max_len),
            active_len: max_len,
        }
    }

    pub fn max_len(&self) -> usize {
        self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.active_len
    }

    pub fn is_empty(&self) -> bool {
        self.active_len == 0
    }

    /// Rebinds the logical length without reallocating. Entries beyond the
    /// new length are left untouched (they are simply not part of any view).
    pub fn resize(&mut self, len: usize) {
        debug_assert!(len <= self.storage.len());
        self.active_len = len;
    }

    pub fn as_view(&self) -> DVectorView<'_, f64> {
        self.storage.rows(0, self.active_len)
    }

    pub fn as_view_mut(&mut self) -> DVectorViewMut<'_, f64> {
        self.storage.rows_mut(0, self.active_len)
    }

    pub fn set_zero(&mut self) {
        self.storage.fill(0.0);
    }

    pub fn set_random(&mut self) {
        for i in 0..self.active_len {
            self.storage[i] = rand_like(i);
        }
    }
}

/// Deterministic, seedless "random" fill used only for test fixtures (spec
/// §5: "Random-number generation in tests uses a process-wide seed").
/// A tiny xorshift-style hash keeps tests reproducible without pulling in a
/// RNG crate for a single fixture helper.
fn rand_like(seed: usize) -> f64 {
    let mut x = (seed as u64).wrapping_mul(0x9E3779B97F4A7C15).wrapping_add(1);
    x ^= x >> 30;
    x = x.wrapping_mul(0xBF58476D1CE4E5B9);
    x ^= x >> 27;
    ((x >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
}

macro_rules! split_container {
    ($name:ident { $($field:ident),+ $(,)? }) => {
        #[derive(Debug, Clone)]
        pub struct $name {
            $(pub $field: Segment,)+
        }
    };
}

split_container!(SplitSolution { lmd, gmm, mu, a, f, q, v, u, beta });
split_container!(SplitDirection { dlmd, dgmm, dmu, da, df, dq, dv, du, dbeta });

impl SplitSolution {
    /// Allocates all segments at their maximum size for a robot with the
    /// given `(nq, nv, dim_passive, max_dimf)`.
    pub fn new(nq: usize, nv: usize, dim_passive: usize, max_dimf: usize) -> Self {
        Self {
            lmd: Segment::new(nv),
            gmm: Segment::new(nv),
            mu: Segment::new(dim_passive + max_dimf),
            a: Segment::new(nv),
            f: Segment::new(max_dimf),
            q: Segment::new(nq),
            v: Segment::new(nv),
            u: Segment::new(nv),
            beta: Segment::new(nv),
        }
    }

    /// Rebinds `f` and `mu` to the active contact status without
    /// reallocating. Contract: after this, `f.len() == cs.dimf()` and
    /// `mu.len() == dim_passive + cs.dimf()`.
    pub fn set_contact_status(&mut self, dim_passive: usize, cs: &ContactStatus) {
        self.f.resize(cs.dimf());
        self.mu.resize(dim_passive + cs.dimf());
    }

    pub fn set_zero(&mut self) {
        for seg in [
            &mut self.lmd,
            &mut self.gmm,
            &mut self.mu,
            &mut self.a,
            &mut self.f,
            &mut self.q,
            &mut self.v,
            &mut self.u,
            &mut self.beta,
        ] {
            seg.set_zero();
        }
    }

    pub fn set_random(&mut self, cs: Option<&ContactStatus>, dim_passive: usize) {
        if let Some(cs) = cs {
            self.set_contact_status(dim_passive, cs);
        }
        for seg in [
            &mut self.lmd,
            &mut self.gmm,
            &mut self.mu,
            &mut self.a,
            &mut self.f,
            &mut self.q,
            &mut self.v,
            &mut self.u,
            &mut self.beta,
        ] {
            seg.set_random();
        }
    }
}

impl SplitDirection {
    pub fn new(nq: usize, nv: usize, dim_passive: usize, max_dimf: usize) -> Self {
        let _ = nq; // direction has no configuration-manifold segment of its own beyond dq (size nv)
        Self {
            dlmd: Segment::new(nv),
            dgmm: Segment::new(nv),
            dmu: Segment::new(dim_passive + max_dimf),
            da: Segment::new(nv),
            df: Segment::new(max_dimf),
            dq: Segment::new(nv),
            dv: Segment::new(nv),
            du: Segment::new(nv),
            dbeta: Segment::new(nv),
        }
    }

    pub fn set_contact_status(&mut self, dim_passive: usize, cs: &ContactStatus) {
        self.df.resize(cs.dimf());
        self.dmu.resize(dim_passive + cs.dimf());
    }

    /// Total dimension of the linearized KKT system at this stage:
    /// `dimKKT = 5*nv + dim_passive + 2*dimf`.
    pub fn dim_kkt(&self) -> usize {
        self.dlmd.len()
            + self.dgmm.len()
            + self.dmu.len()
            + self.da.len()
            + self.df.len()
            + self.dq.len()
            + self.dv.len()
    }

    pub fn set_zero(&mut self) {
        for seg in [
            &mut self.dlmd,
            &mut self.dgmm,
            &mut self.dmu,
            &mut self.da,
            &mut self.df,
            &mut self.dq,
            &mut self.dv,
            &mut self.du,
            &mut self.dbeta,
        ] {
            seg.set_zero();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_solution_resize_by_status_tracks_contacts() {
        let mut s = SplitSolution::new(7, 7, 0, 9);
        let mut cs = ContactStatus::new(3);
        cs.activate(0);
        cs.activate(2);
        s.set_contact_status(0, &cs);
        assert_eq!(s.f.len(), cs.dimf());
        assert_eq!(s.mu.len(), cs.dimf());
    }

    #[test]
    fn split_direction_dim_kkt_matches_formula() {
        let nv = 7usize;
        let dim_passive = 6usize;
        let max_dimf = 12usize;
        let mut d = SplitDirection::new(nv + 1, nv, dim_passive, max_dimf);
        let mut cs = ContactStatus::new(4);
        cs.activate(0);
        cs.activate(1);
        d.set_contact_status(dim_passive, &cs);
        let expected = 5 * nv + dim_passive + 2 * cs.dimf();
        assert_eq!(d.dim_kkt(), expected);
    }
}
