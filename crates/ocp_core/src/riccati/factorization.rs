//! The propagated value-function quadratic approximation `(P_t, s_t)` over
//! the tangent state `(dq, dv)`.

use nalgebra::{DMatrixView, DVectorView};

use crate::kkt::{Block, KktMatrix, KktResidual};
use crate::solution::Segment;

#[derive(Debug, Clone)]
pub struct RiccatiFactorization {
    p: Block,
    s: Segment,
    nv: usize,
}

impl RiccatiFactorization {
    pub fn new(nv: usize) -> Self {
        Self {
            p: Block::new(2 * nv, 2 * nv),
            s: Segment::new(2 * nv),
            nv,
        }
    }

    /// `P_N = diag(Qqq, Qvv)`, `s_N = [lq; lv]` — the terminal cost has no
    /// `(a, f)` block and the base quadratic cost carries no `q`-`v` cross
    /// term, so the terminal value function is exactly block-diagonal.
    pub fn set_terminal(&mut self, matrix: &KktMatrix, residual: &KktResidual) {
        let nv = self.nv;
        self.p.set_zero();
        {
            let mut p = self.p.view_mut();
            p.view_mut((0, 0), (nv, nv)).copy_from(&matrix.qqq.view());
            p.view_mut((nv, nv), (nv, nv)).copy_from(&matrix.qvv.view());
        }
        let mut s = self.s.as_view_mut();
        s.rows_mut(0, nv).copy_from(&residual.lq.as_view());
        s.rows_mut(nv, nv).copy_from(&residual.lv.as_view());
    }

    pub fn p(&self) -> DMatrixView<'_, f64> {
        self.p.view()
    }

    pub fn p_mut(&mut self) -> &mut Block {
        &mut self.p
    }

    pub fn s(&self) -> DVectorView<'_, f64> {
        self.s.as_view()
    }

    pub fn s_mut(&mut self) -> &mut Segment {
        &mut self.s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DVector;

    #[test]
    fn terminal_factorization_is_block_diagonal() {
        let nv = 2;
        let mut matrix = KktMatrix::new(nv, 0, 0);
        let mut residual = KktResidual::new(nv, 0, 0);
        matrix.qqq.view_mut().copy_from(&nalgebra::DMatrix::identity(nv, nv));
        matrix.qvv.view_mut().copy_from(&(nalgebra::DMatrix::<f64>::identity(nv, nv) * 2.0));
        residual.lq.as_view_mut().copy_from(&DVector::from_vec(vec![1.0, 2.0]));
        residual.lv.as_view_mut().copy_from(&DVector::from_vec(vec![3.0, 4.0]));

        let mut fact = RiccatiFactorization::new(nv);
        fact.set_terminal(&matrix, &residual);
        assert_eq!(fact.p()[(0, 0)], 1.0);
        assert_eq!(fact.p()[(nv, nv)], 2.0);
        assert_eq!(fact.p()[(0, nv)], 0.0);
        assert_eq!(fact.s()[0], 1.0);
        assert_eq!(fact.s()[nv + 1], 4.0);
    }
}
