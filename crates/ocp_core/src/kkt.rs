//! Per-stage KKT blocks: the block matrix over
//! `(lmd, gmm, mu, a, f, q, v)` and its matching residual.

use nalgebra::{DMatrix, DVector};

use crate::contact_status::ContactStatus;
use crate::solution::Segment;

/// Allocates a `(rows, cols)` matrix at `(max_rows, max_cols)` and tracks
/// the active sub-block via `resize`, same philosophy as [`crate::solution::Segment`].
#[derive(Debug, Clone)]
pub struct Block {
    storage: DMatrix<f64>,
    rows: usize,
    cols: usize,
}

impl Block {
    pub fn new(max_rows: usize, max_cols: usize) -> Self {
        Self {
            storage: DMatrix::zeros(max_rows, max_cols),
            rows: max_rows,
            cols: max_cols,
        }
    }

    pub fn resize(&mut self, rows: usize, cols: usize) {
        debug_assert!(rows <= self.storage.nrows() && cols <= self.storage.ncols());
        self.rows = rows;
        self.cols = cols;
    }

    pub fn view(&self) -> nalgebra::DMatrixView<'_, f64> {
        self.storage.view((0, 0), (self.rows, self.cols))
    }

    pub fn view_mut(&mut self) -> nalgebra::DMatrixViewMut<'_, f64> {
        self.storage.view_mut((0, 0), (self.rows, self.cols))
    }

    pub fn set_zero(&mut self) {
        self.storage.fill(0.0);
    }
}

/// Block matrix over `(lmd, gmm, mu, a, f, q, v)` at stage `t`.
#[derive(Debug, Clone)]
pub struct KktMatrix {
    /// State-equation Jacobian w.r.t. `q` on the manifold.
    pub fqq: Block,
    /// State-equation Jacobian w.r.t. `v`, already scaled by `dtau`.
    pub fqv: Block,

    pub qaa: Block,
    pub qff: Block,
    pub qqq: Block,
    pub qvv: Block,
    pub qqa: Block,
    pub qva: Block,
    pub qqf: Block,
    pub qvf: Block,
    pub qaf: Block,

    /// Equality-constraint Jacobians (underactuation + contact acceleration rows).
    pub cq: Block,
    pub cv: Block,
    pub ca: Block,
    pub cf: Block,
}

impl KktMatrix {
    pub fn new(nv: usize, max_dimf: usize, dim_passive: usize) -> Self {
        let max_nc = dim_passive + max_dimf;
        Self {
            fqq: Block::new(nv, nv),
            fqv: Block::new(nv, nv),
            qaa: Block::new(nv, nv),
            qff: Block::new(max_dimf, max_dimf),
            qqq: Block::new(nv, nv),
            qvv: Block::new(nv, nv),
            qqa: Block::new(nv, nv),
            qva: Block::new(nv, nv),
            qqf: Block::new(nv, max_dimf),
            qvf: Block::new(nv, max_dimf),
            qaf: Block::new(nv, max_dimf),
            cq: Block::new(max_nc, nv),
            cv: Block::new(max_nc, nv),
            ca: Block::new(max_nc, nv),
            cf: Block::new(max_nc, max_dimf),
        }
    }

    pub fn set_contact_status(&mut self, nv: usize, dim_passive: usize, cs: &ContactStatus) {
        let dimf = cs.dimf();
        let nc = dim_passive + dimf;
        self.qff.resize(dimf, dimf);
        self.qqf.resize(nv, dimf);
        self.qvf.resize(nv, dimf);
        self.qaf.resize(nv, dimf);
        self.cq.resize(nc, nv);
        self.cv.resize(nc, nv);
        self.ca.resize(nc, nv);
        self.cf.resize(nc, dimf);
    }

    pub fn set_zero(&mut self) {
        for b in [
            &mut self.fqq,
            &mut self.fqv,
            &mut self.qaa,
            &mut self.qff,
            &mut self.qqq,
            &mut self.qvv,
            &mut self.qqa,
            &mut self.qva,
            &mut self.qqf,
            &mut self.qvf,
            &mut self.qaf,
            &mut self.cq,
            &mut self.cv,
            &mut self.ca,
            &mut self.cf,
        ] {
            b.set_zero();
        }
    }

    /// Symmetry invariant check: the lower triangle of each
    /// symmetric Hessian block must equal its upper triangle. Debug-only.
    #[cfg(debug_assertions)]
    pub fn assert_symmetric(&self, tol: f64) {
        for b in [&self.qaa, &self.qff, &self.qqq, &self.qvv] {
            let m = b.view();
            assert!(
                (&m - m.transpose()).abs().max() <= tol,
                "KKT Hessian block not symmetric within {tol}"
            );
        }
    }
}

/// Residual blocks for stage `t`: dynamics residual, equality residual, and
/// gradients w.r.t. each primal block.
#[derive(Debug, Clone)]
pub struct KktResidual {
    pub fq: Segment,
    pub fv: Segment,
    pub c: Segment,
    pub la: Segment,
    pub lf: Segment,
    pub lq: Segment,
    pub lv: Segment,
    pub lu: Segment,
    /// Inverse-dynamics residual `u_res = tau - RNEA(q, v, a, f)`.
    pub u_res: Segment,
}

impl KktResidual {
    pub fn new(nv: usize, max_dimf: usize, dim_passive: usize) -> Self {
        Self {
            fq: Segment::new(nv),
            fv: Segment::new(nv),
            c: Segment::new(dim_passive + max_dimf),
            la: Segment::new(nv),
            lf: Segment::new(max_dimf),
            lq: Segment::new(nv),
            lv: Segment::new(nv),
            lu: Segment::new(nv),
            u_res: Segment::new(nv),
        }
    }

    pub fn set_contact_status(&mut self, dim_passive: usize, cs: &ContactStatus) {
        self.c.resize(dim_passive + cs.dimf());
        self.lf.resize(cs.dimf());
    }

    pub fn set_zero(&mut self) {
        for seg in [
            &mut self.fq,
            &mut self.fv,
            &mut self.c,
            &mut self.la,
            &mut self.lf,
            &mut self.lq,
            &mut self.lv,
            &mut self.lu,
            &mut self.u_res,
        ] {
            seg.set_zero();
        }
    }

    /// `‖Fq‖₁ + ‖Fv‖₁`.
    pub fn violation_l1_norm(&self) -> f64 {
        l1_norm(&self.fq) + l1_norm(&self.fv)
    }

    pub fn squared_kkt_error_norm(&self) -> f64 {
        squared_norm(&self.fq)
            + squared_norm(&self.fv)
            + squared_norm(&self.c)
            + squared_norm(&self.la)
            + squared_norm(&self.lf)
            + squared_norm(&self.lq)
            + squared_norm(&self.lv)
    }
}

fn l1_norm(seg: &Segment) -> f64 {
    seg.as_view().iter().map(|v| v.abs()).sum()
}

fn squared_norm(seg: &Segment) -> f64 {
    seg.as_view().iter().map(|v| v * v).sum()
}

/// A dense, reusable scratch buffer of the given size, used for
/// intermediate RNEA/Jacobian outputs that don't belong to [`KktMatrix`]
/// or [`KktResidual`] directly.
pub fn zeros(n: usize) -> DVector<f64> {
    DVector::zeros(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kkt_matrix_resizes_tracking_blocks_only() {
        let nv = 6;
        let max_dimf = 9;
        let mut m = KktMatrix::new(nv, max_dimf, 0);
        let mut cs = ContactStatus::new(3);
        cs.activate(1);
        m.set_contact_status(nv, 0, &cs);
        assert_eq!(m.qff.view().nrows(), cs.dimf());
        assert_eq!(m.cq.view().nrows(), cs.dimf());
        assert_eq!(m.fqq.view().nrows(), nv, "fqq is sized to nv regardless of contacts");
    }

    #[test]
    fn violation_l1_norm_is_sum_of_l1_norms() {
        let mut r = KktResidual::new(3, 0, 0);
        r.fq.as_view_mut().copy_from(&DVector::from_vec(vec![1.0, -2.0, 0.5]));
        r.fv.as_view_mut().copy_from(&DVector::from_vec(vec![-1.0, 0.0, 3.0]));
        assert!((r.violation_l1_norm() - (3.5 + 4.0)).abs() < 1e-12);
    }
}
