//! Inverts the stage saddle block `[G  Caf^T; Caf  0]`.
//! Grounded on `original_source/test/ocp/riccati_recursion_test.cpp`: the
//! `Ginv` the tests check against is the inverse of the *whole* saddle
//! matrix (size `naf + nc`), not of `G` alone — confirmed by the
//! `fixed_base_with_contacts` case, which builds the reference `Ginv` from
//! `M.inverse()` over the full `(a,f,mu)` block. The class is still called
//! `RiccatiMatrixInverter` because `G` is what makes the block invertible
//! in the first place.

use nalgebra::{Cholesky, DMatrix, DMatrixView};

use crate::error::{OcpError, Result};

/// Scratch storage sized once at `(nv + max_dimf + max_nc)` and reused
/// every stage via [`Block`](crate::kkt::Block)-style logical resizing.
#[derive(Debug, Clone)]
pub struct RiccatiMatrixInverter {
    max_naf: usize,
    max_nc: usize,
    storage: DMatrix<f64>,
    naf: usize,
    nc: usize,
}

impl RiccatiMatrixInverter {
    pub fn new(nv: usize, max_dimf: usize, dim_passive: usize) -> Self {
        let max_naf = nv + max_dimf;
        let max_nc = dim_passive + max_dimf;
        Self {
            max_naf,
            max_nc,
            storage: DMatrix::zeros(max_naf + max_nc, max_naf + max_nc),
            naf: max_naf,
            nc: max_nc,
        }
    }

    pub fn set_dims(&mut self, naf: usize, nc: usize) {
        debug_assert!(naf <= self.max_naf && nc <= self.max_nc);
        self.naf = naf;
        self.nc = nc;
    }

    /// Inverse of the full saddle matrix, `(naf + nc) x (naf + nc)`.
    pub fn ginv(&self) -> DMatrixView<'_, f64> {
        self.storage.view((0, 0), (self.naf + self.nc, self.naf + self.nc))
    }

    /// Factorizes `G` (Cholesky; regularizes the trailing `f`-rows/cols
    /// diagonal with `epsilon` and retries once on failure) and completes
    /// the saddle-block inverse by Schur-complementing out `Caf`. `dimf` is
    /// the number of force columns at the tail of `G`/`Caf`, the block the
    /// regularizer is added to.
    pub fn invert(&mut self, g: &DMatrix<f64>, caf: &DMatrixView<'_, f64>, dimf: usize, epsilon: f64, stage: usize) -> Result<()> {
        let naf = g.nrows();
        let nc = caf.nrows();
        self.set_dims(naf, nc);

        let g_chol = match Cholesky::new(g.clone()) {
            Some(c) => c,
            None => {
                tracing::warn!("{}", OcpError::NonPositiveDefiniteBlock { stage });
                let mut regularized = g.clone();
                for i in (naf - dimf)..naf {
                    regularized[(i, i)] += epsilon;
                }
                Cholesky::new(regularized).ok_or(OcpError::FactorizationFailed { stage })?
            }
        };
        let g_inv = g_chol.inverse();

        if nc == 0 {
            self.storage.view_mut((0, 0), (naf, naf)).copy_from(&g_inv);
            return Ok(());
        }

        let caf_owned = caf.clone_owned();
        // N = Caf * Ginv * Caf^T is positive definite (Caf full row rank, Ginv PD);
        // the saddle block's Schur complement is S = -N, so Sinv = -Ninv.
        let n = &caf_owned * &g_inv * caf_owned.transpose();
        let n_chol = Cholesky::new(n).ok_or(OcpError::FactorizationFailed { stage })?;
        let n_inv = n_chol.inverse();
        let s_inv = -&n_inv;

        let ginv_caf_t = &g_inv * caf_owned.transpose();
        let top_left = &g_inv + &ginv_caf_t * &s_inv * ginv_caf_t.transpose();
        let top_right = -&ginv_caf_t * &s_inv;
        let bottom_left = top_right.transpose();

        self.storage.view_mut((0, 0), (naf, naf)).copy_from(&top_left);
        self.storage.view_mut((0, naf), (naf, nc)).copy_from(&top_right);
        self.storage.view_mut((naf, 0), (nc, naf)).copy_from(&bottom_left);
        self.storage.view_mut((naf, naf), (nc, nc)).copy_from(&s_inv);
        Ok(())
    }
}
