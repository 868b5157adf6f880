//! The external collaborator this crate consumes kinematics/dynamics through.
//!
//! `RobotModel` is never implemented in this crate; URDF parsing, rigid-body
//! kinematics/dynamics (RNEA, CRBA, derivatives), and Lie-group
//! integrate/subtract on the configuration manifold all live on the other
//! side of this trait. Implementors are expected to be cheap to `Clone`
//! since the solver keeps one clone per worker: the clone must carry its
//! own kinematics scratch state, not share it.

use nalgebra::{DMatrix, DVector};

/// Kinematics/dynamics/manifold operations consumed by the solver.
///
/// All vector/matrix arguments are sized to the model's own `dimq()`/`dimv()`;
/// callers are responsible for passing correctly-sized buffers, and
/// implementations may `debug_assert!` on size but must not panic in
/// release builds on a merely-inactive contact (it must simply not write to
/// unused rows).
pub trait RobotModel: Clone + Send {
    /// Size of the configuration vector `q` (`nv` without a floating base,
    /// `nv + 1` with one, to carry a unit quaternion).
    fn dimq(&self) -> usize;

    /// Size of the tangent/velocity vector `v`, acceleration `a`, and torque `u`.
    fn dimv(&self) -> usize;

    /// Dimension of the passive (underactuated) coordinates: 6 if the robot
    /// has a floating base, 0 otherwise.
    fn dim_passive(&self) -> usize;

    /// Upper bound on the number of point contacts this model can carry.
    fn max_point_contacts(&self) -> usize;

    fn has_floating_base(&self) -> bool;

    /// Lie-group retraction: `q' = q \boxplus (v * dt)`.
    fn integrate_configuration(&self, q: &DVector<f64>, v: &DVector<f64>, dt: f64) -> DVector<f64>;

    /// `d(integrate(q, v, dt))/dq`, a `dimv x dimv` matrix (identity for
    /// revolute-only models; block-diagonal with a quaternion-derivative
    /// block for a floating base).
    fn d_integrate_dq(&self, q: &DVector<f64>, v: &DVector<f64>, dt: f64) -> DMatrix<f64>;

    /// `d(integrate(q, v, dt))/dv`, a `dimv x dimv` matrix, already scaled by `dt`.
    fn d_integrate_dv(&self, q: &DVector<f64>, v: &DVector<f64>, dt: f64) -> DMatrix<f64>;

    /// Lie-group logarithm: `v = q_a \boxminus q_b`, i.e. the tangent vector
    /// that integrates `q_b` to `q_a` over one unit of (normalized) time.
    fn subtract_configuration(&self, q_a: &DVector<f64>, q_b: &DVector<f64>) -> DVector<f64>;

    fn d_subtract_dq_a(&self, q_a: &DVector<f64>, q_b: &DVector<f64>) -> DMatrix<f64>;
    fn d_subtract_dq_b(&self, q_a: &DVector<f64>, q_b: &DVector<f64>) -> DMatrix<f64>;

    /// Renormalizes a configuration in place (e.g. a floating-base quaternion).
    fn normalize_configuration(&self, q: &mut DVector<f64>);

    /// Returns a configuration that respects joint position limits, for
    /// initializing PDIP feasibility.
    fn generate_feasible_configuration(&self) -> DVector<f64>;

    /// Recomputes frame placements/Jacobians for `(q, v, a)`. Must be called
    /// before any of the methods below that depend on kinematics.
    fn update_kinematics(&mut self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>);

    /// Caches the current frame positions of active contact points as the
    /// reference points used by Baumgarte residuals.
    fn set_contact_points_by_current_kinematics(&mut self);

    /// Declares which of the model's contact frames are currently active.
    fn set_contact_status(&mut self, active: &[bool]);

    /// Writes the stacked Baumgarte-stabilized contact-acceleration residual
    /// (length `dimf` of the currently active contacts) into `out`.
    fn compute_baumgarte_residual(&self, out: &mut DVector<f64>);

    /// Writes `d(residual)/dq`, `d(residual)/dv`, `d(residual)/da`
    /// (each `dimf x dimv`) for the currently active contacts.
    fn compute_baumgarte_derivatives(
        &self,
        dq: &mut DMatrix<f64>,
        dv: &mut DMatrix<f64>,
        da: &mut DMatrix<f64>,
    );

    /// Inverse dynamics: writes `tau = RNEA(q, v, a, f)` into `tau_out`
    /// (the currently set contact forces, via [`set_contact_forces`], are used).
    ///
    /// [`set_contact_forces`]: RobotModel::set_contact_forces
    fn rnea(&mut self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>, tau_out: &mut DVector<f64>);

    /// Partial derivatives of RNEA w.r.t. `(q, v, a)`, each `dimv x dimv`.
    fn rnea_derivatives(
        &mut self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        a: &DVector<f64>,
        d_tau_dq: &mut DMatrix<f64>,
        d_tau_dv: &mut DMatrix<f64>,
        d_tau_da: &mut DMatrix<f64>,
    );

    /// `d(tau)/d(f)` for the currently active contacts, `dimv x dimf`.
    fn d_rnea_d_fext(&self, out: &mut DMatrix<f64>);

    /// Sets the contact forces used by the next [`rnea`](RobotModel::rnea) call.
    fn set_contact_forces(&mut self, f: &DVector<f64>);

    fn joint_effort_limit(&self) -> &DVector<f64>;
    fn joint_velocity_limit(&self) -> &DVector<f64>;
    fn lower_joint_position_limit(&self) -> &DVector<f64>;
    fn upper_joint_position_limit(&self) -> &DVector<f64>;

    /// Signed distance of every active contact frame to its surface (length
    /// `num_active`), used by the contact-distance inequality component.
    fn contact_distance(&self, out: &mut DVector<f64>);

    /// `d(contact_distance)/dq`, `num_active x dimv`.
    fn contact_distance_derivative(&self, out: &mut DMatrix<f64>);
}
