//! End-to-end exercise of the horizon driver against a hand-derived
//! two-link planar arm instead of the crate's trivial unit-test fixtures:
//! scenario 1 (fixed-base, joint limits only), scenario 2 (one end-effector
//! contact, friction cone plus contact-distance constraints), and scenario 5
//! (zero cost and no constraints reproduces the exact feasible rollout).
//!
//! `PlanarArm` is a two-revolute-joint manipulator with point masses at the
//! elbow and wrist (the standard textbook two-link form), gravity acting in
//! the plane of motion, and one optional point contact at the wrist. Its
//! Baumgarte-stabilized contact constraint omits the `Jdot * v` curvature
//! term; close enough to a true acceleration constraint for a test fixture
//! that never has to match a real simulator.

use nalgebra::{DMatrix, DVector};

use ocp_core::constraints::{Constraints, ConstraintComponent, ContactDistance, FrictionCone, JointAxis, JointBound};
use ocp_core::cost::QuadraticCost;
use ocp_core::robot_model::RobotModel;
use ocp_core::solver::{OcpSolver, SolverSettings};

const GRAVITY: f64 = 9.81;

#[derive(Clone)]
struct PlanarArm {
    l1: f64,
    l2: f64,
    m1: f64,
    m2: f64,
    k1: f64,
    k2: f64,
    k3: f64,
    baumgarte_alpha: f64,
    ground_z: f64,
    effort_limit: DVector<f64>,
    velocity_limit: DVector<f64>,
    lower_limit: DVector<f64>,
    upper_limit: DVector<f64>,
    contact_active: bool,
    contact_force: DVector<f64>,
    contact_reference: DVector<f64>,
    q: DVector<f64>,
    v: DVector<f64>,
    a: DVector<f64>,
}

impl PlanarArm {
    fn new() -> Self {
        let l1 = 0.35;
        let l2 = 0.3;
        let m1 = 1.2;
        let m2 = 0.8;
        Self {
            l1,
            l2,
            m1,
            m2,
            k1: (m1 + m2) * l1 * l1,
            k2: m2 * l2 * l2,
            k3: m2 * l1 * l2,
            baumgarte_alpha: 10.0,
            ground_z: -0.2,
            effort_limit: DVector::from_element(2, 30.0),
            velocity_limit: DVector::from_element(2, 10.0),
            lower_limit: DVector::from_vec(vec![-2.8, -2.8]),
            upper_limit: DVector::from_vec(vec![2.8, 2.8]),
            contact_active: false,
            contact_force: DVector::zeros(3),
            contact_reference: DVector::zeros(2),
            q: DVector::zeros(2),
            v: DVector::zeros(2),
            a: DVector::zeros(2),
        }
    }

    fn end_effector(&self, q: &DVector<f64>) -> (f64, f64) {
        let (c1, s1) = (q[0].cos(), q[0].sin());
        let (c12, s12) = ((q[0] + q[1]).cos(), (q[0] + q[1]).sin());
        (self.l1 * c1 + self.l2 * c12, self.l1 * s1 + self.l2 * s12)
    }

    /// The end-effector's `(x, z)` Jacobian (rows x/z, columns q1/q2) and
    /// its two partials w.r.t. `q1`, `q2`.
    fn jacobian_and_derivatives(&self, q: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>, DMatrix<f64>) {
        let (c1, s1) = (q[0].cos(), q[0].sin());
        let (c12, s12) = ((q[0] + q[1]).cos(), (q[0] + q[1]).sin());
        let (l1, l2) = (self.l1, self.l2);

        #[rustfmt::skip]
        let j = DMatrix::from_row_slice(2, 2, &[
            -l1 * s1 - l2 * s12, -l2 * s12,
             l1 * c1 + l2 * c12,  l2 * c12,
        ]);
        #[rustfmt::skip]
        let dj_dq1 = DMatrix::from_row_slice(2, 2, &[
            -l1 * c1 - l2 * c12, -l2 * c12,
            -l1 * s1 - l2 * s12, -l2 * s12,
        ]);
        #[rustfmt::skip]
        let dj_dq2 = DMatrix::from_row_slice(2, 2, &[
            -l2 * c12, -l2 * c12,
            -l2 * s12, -l2 * s12,
        ]);
        (j, dj_dq1, dj_dq2)
    }

    fn mass_matrix(&self, q: &DVector<f64>) -> DMatrix<f64> {
        let c2 = q[1].cos();
        #[rustfmt::skip]
        let m = DMatrix::from_row_slice(2, 2, &[
            self.k1 + self.k2 + 2.0 * self.k3 * c2, self.k2 + self.k3 * c2,
            self.k2 + self.k3 * c2,                 self.k2,
        ]);
        m
    }

    fn coriolis_term(&self, q: &DVector<f64>, v: &DVector<f64>) -> DVector<f64> {
        let h = -self.k3 * q[1].sin();
        DVector::from_vec(vec![h * (2.0 * v[0] * v[1] + v[1] * v[1]), -h * v[0] * v[0]])
    }

    fn gravity_term(&self, q: &DVector<f64>) -> DVector<f64> {
        let c1 = q[0].cos();
        let c12 = (q[0] + q[1]).cos();
        let shoulder = (self.m1 + self.m2) * GRAVITY * self.l1 * c1 + self.m2 * GRAVITY * self.l2 * c12;
        let elbow = self.m2 * GRAVITY * self.l2 * c12;
        DVector::from_vec(vec![shoulder, elbow])
    }

    fn contact_force_xz(&self) -> DVector<f64> {
        DVector::from_vec(vec![self.contact_force[0], self.contact_force[2]])
    }
}

impl RobotModel for PlanarArm {
    fn dimq(&self) -> usize {
        2
    }

    fn dimv(&self) -> usize {
        2
    }

    fn dim_passive(&self) -> usize {
        0
    }

    fn max_point_contacts(&self) -> usize {
        1
    }

    fn has_floating_base(&self) -> bool {
        false
    }

    fn integrate_configuration(&self, q: &DVector<f64>, v: &DVector<f64>, dt: f64) -> DVector<f64> {
        q + dt * v
    }

    fn d_integrate_dq(&self, q: &DVector<f64>, _v: &DVector<f64>, _dt: f64) -> DMatrix<f64> {
        DMatrix::identity(q.len(), q.len())
    }

    fn d_integrate_dv(&self, q: &DVector<f64>, _v: &DVector<f64>, dt: f64) -> DMatrix<f64> {
        DMatrix::identity(q.len(), q.len()) * dt
    }

    fn subtract_configuration(&self, q_a: &DVector<f64>, q_b: &DVector<f64>) -> DVector<f64> {
        q_a - q_b
    }

    fn d_subtract_dq_a(&self, q_a: &DVector<f64>, _q_b: &DVector<f64>) -> DMatrix<f64> {
        DMatrix::identity(q_a.len(), q_a.len())
    }

    fn d_subtract_dq_b(&self, q_a: &DVector<f64>, _q_b: &DVector<f64>) -> DMatrix<f64> {
        -DMatrix::<f64>::identity(q_a.len(), q_a.len())
    }

    fn normalize_configuration(&self, _q: &mut DVector<f64>) {}

    fn generate_feasible_configuration(&self) -> DVector<f64> {
        (&self.lower_limit + &self.upper_limit) * 0.5
    }

    fn update_kinematics(&mut self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>) {
        self.q.copy_from(q);
        self.v.copy_from(v);
        self.a.copy_from(a);
    }

    fn set_contact_points_by_current_kinematics(&mut self) {
        let (x, z) = self.end_effector(&self.q);
        self.contact_reference[0] = x;
        self.contact_reference[1] = z;
    }

    fn set_contact_status(&mut self, active: &[bool]) {
        self.contact_active = active[0];
    }

    fn compute_baumgarte_residual(&self, out: &mut DVector<f64>) {
        let (j, _, _) = self.jacobian_and_derivatives(&self.q);
        let (x, z) = self.end_effector(&self.q);
        let alpha = self.baumgarte_alpha;
        let accel_xz = &j * &self.a + (&j * &self.v) * (2.0 * alpha);
        let pos_err = DVector::from_vec(vec![x - self.contact_reference[0], z - self.contact_reference[1]]);
        let stabilized = accel_xz + pos_err * (alpha * alpha);
        out[0] = stabilized[0];
        out[1] = 0.0;
        out[2] = stabilized[1];
    }

    fn compute_baumgarte_derivatives(&self, dq: &mut DMatrix<f64>, dv: &mut DMatrix<f64>, da: &mut DMatrix<f64>) {
        let (j, dj_dq1, dj_dq2) = self.jacobian_and_derivatives(&self.q);
        let alpha = self.baumgarte_alpha;

        da.fill(0.0);
        da.view_mut((0, 0), (1, 2)).copy_from(&j.row(0));
        da.view_mut((2, 0), (1, 2)).copy_from(&j.row(1));

        dv.fill(0.0);
        let two_alpha_j = &j * (2.0 * alpha);
        dv.view_mut((0, 0), (1, 2)).copy_from(&two_alpha_j.row(0));
        dv.view_mut((2, 0), (1, 2)).copy_from(&two_alpha_j.row(1));

        let col_q1 = &dj_dq1 * &self.a + (&dj_dq1 * &self.v) * (2.0 * alpha) + j.column(0).clone_owned() * (alpha * alpha);
        let col_q2 = &dj_dq2 * &self.a + (&dj_dq2 * &self.v) * (2.0 * alpha) + j.column(1).clone_owned() * (alpha * alpha);
        dq.fill(0.0);
        dq[(0, 0)] = col_q1[0];
        dq[(2, 0)] = col_q1[1];
        dq[(0, 1)] = col_q2[0];
        dq[(2, 1)] = col_q2[1];
    }

    fn rnea(&mut self, q: &DVector<f64>, v: &DVector<f64>, a: &DVector<f64>, tau_out: &mut DVector<f64>) {
        let mut tau = &self.mass_matrix(q) * a + self.coriolis_term(q, v) + self.gravity_term(q);
        if self.contact_active {
            let (j, _, _) = self.jacobian_and_derivatives(q);
            tau -= j.transpose() * self.contact_force_xz();
        }
        tau_out.copy_from(&tau);
    }

    fn rnea_derivatives(
        &mut self,
        q: &DVector<f64>,
        v: &DVector<f64>,
        a: &DVector<f64>,
        d_tau_dq: &mut DMatrix<f64>,
        d_tau_dv: &mut DMatrix<f64>,
        d_tau_da: &mut DMatrix<f64>,
    ) {
        d_tau_da.copy_from(&self.mass_matrix(q));

        let c2 = q[1].cos();
        let s2 = q[1].sin();
        #[rustfmt::skip]
        let dm_dq2 = DMatrix::from_row_slice(2, 2, &[
            -2.0 * self.k3 * s2, -self.k3 * s2,
            -self.k3 * s2,        0.0,
        ]);
        let dm_dq2_a = &dm_dq2 * a;

        let h = -self.k3 * s2;
        let dh_dq2 = -self.k3 * c2;
        let cv0 = 2.0 * v[0] * v[1] + v[1] * v[1];
        let cv1 = -v[0] * v[0];
        let dcv_dq2 = DVector::from_vec(vec![dh_dq2 * cv0, dh_dq2 * cv1]);

        let c1 = q[0].cos();
        let s1 = q[0].sin();
        let c12 = (q[0] + q[1]).cos();
        let s12 = (q[0] + q[1]).sin();
        let dg_dq1 = DVector::from_vec(vec![
            -(self.m1 + self.m2) * GRAVITY * self.l1 * s1 - self.m2 * GRAVITY * self.l2 * s12,
            -self.m2 * GRAVITY * self.l2 * s12,
        ]);
        let dg_dq2 = DVector::from_vec(vec![-self.m2 * GRAVITY * self.l2 * s12, -self.m2 * GRAVITY * self.l2 * s12]);

        let mut col_q1 = dg_dq1;
        let mut col_q2 = dm_dq2_a + dcv_dq2 + dg_dq2;

        if self.contact_active {
            let (_, dj_dq1, dj_dq2) = self.jacobian_and_derivatives(q);
            let f_xz = self.contact_force_xz();
            col_q1 -= dj_dq1.transpose() * &f_xz;
            col_q2 -= dj_dq2.transpose() * &f_xz;
        }

        d_tau_dq.set_column(0, &col_q1);
        d_tau_dq.set_column(1, &col_q2);

        let dcv_dv1 = DVector::from_vec(vec![2.0 * h * v[1], -2.0 * h * v[0]]);
        let dcv_dv2 = DVector::from_vec(vec![h * (2.0 * v[0] + 2.0 * v[1]), 0.0]);
        d_tau_dv.set_column(0, &dcv_dv1);
        d_tau_dv.set_column(1, &dcv_dv2);
    }

    fn d_rnea_d_fext(&self, out: &mut DMatrix<f64>) {
        out.fill(0.0);
        if self.contact_active {
            let (j, _, _) = self.jacobian_and_derivatives(&self.q);
            for joint in 0..2 {
                out[(joint, 0)] = -j[(0, joint)];
                out[(joint, 2)] = -j[(1, joint)];
            }
        }
    }

    fn set_contact_forces(&mut self, f: &DVector<f64>) {
        if self.contact_active {
            self.contact_force.copy_from(f);
        } else {
            self.contact_force.fill(0.0);
        }
    }

    fn joint_effort_limit(&self) -> &DVector<f64> {
        &self.effort_limit
    }

    fn joint_velocity_limit(&self) -> &DVector<f64> {
        &self.velocity_limit
    }

    fn lower_joint_position_limit(&self) -> &DVector<f64> {
        &self.lower_limit
    }

    fn upper_joint_position_limit(&self) -> &DVector<f64> {
        &self.upper_limit
    }

    fn contact_distance(&self, out: &mut DVector<f64>) {
        if self.contact_active {
            let (_, z) = self.end_effector(&self.q);
            out[0] = z - self.ground_z;
        }
    }

    fn contact_distance_derivative(&self, out: &mut DMatrix<f64>) {
        if self.contact_active {
            let (j, _, _) = self.jacobian_and_derivatives(&self.q);
            for joint in 0..2 {
                out[(0, joint)] = j[(1, joint)];
            }
        }
    }
}

fn joint_bound_constraints(arm: &PlanarArm) -> Constraints {
    let mut constraints = Constraints::new(1e-3, 0.995);
    constraints.push(ConstraintComponent::JointBound(JointBound {
        axis: JointAxis::Q,
        bound: arm.lower_limit.clone(),
        sign: 1.0,
    }));
    constraints.push(ConstraintComponent::JointBound(JointBound {
        axis: JointAxis::Q,
        bound: arm.upper_limit.clone(),
        sign: -1.0,
    }));
    constraints
}

// Scenario 1: fixed-base arm, no contact, joint-limit PDIP
// constraints only, cost weights q=10/v=1/a=0.01/u=0.01. 20 iterations
// should bring the KKT error well below its starting value.
#[test]
fn fixed_base_arm_with_joint_limits_converges() {
    let arm = PlanarArm::new();
    let constraints = joint_bound_constraints(&arm);
    let cost = QuadraticCost::uniform(2, 2, 0, 10.0, 1.0, 0.01, 0.01);
    let settings = SolverSettings::default();
    let n = 20;
    let mut solver = OcpSolver::new(arm, cost, constraints, 1.0, n, 2, 0, 0, settings).unwrap();

    let q0 = DVector::from_vec(vec![0.4, -0.3]);
    let v0 = DVector::zeros(2);
    solver.set_state_trajectory(&q0, &v0);
    solver.initialize_constraints();

    let initial_error = {
        solver.compute_kkt_residual(&q0, &v0);
        solver.kkt_error()
    };

    let mut last_error = initial_error;
    for _ in 0..n {
        solver.update_solution(&q0, &v0, true).unwrap();
        last_error = solver.kkt_error();
    }

    assert!(last_error < initial_error, "kkt_error should drop from {initial_error} to {last_error}");
    assert!(last_error < 1e-6, "kkt_error = {last_error}");
}

// Scenario 2: fixed-base arm with one end-effector contact held active over
// the whole horizon, friction cone plus contact-distance constraints added
// on top of the joint limits. Expect convergence and a feasible friction
// cone at the final iterate.
#[test]
fn fixed_base_arm_with_contact_satisfies_friction_cone() {
    let arm = PlanarArm::new();
    let mu = 0.5;
    let mut constraints = joint_bound_constraints(&arm);
    constraints.push(ConstraintComponent::FrictionCone(FrictionCone { mu }));
    constraints.push(ConstraintComponent::ContactDistance(ContactDistance));

    let cost = QuadraticCost::uniform(2, 2, 3, 10.0, 1.0, 0.01, 0.01);
    let settings = SolverSettings::default();
    let n = 20;
    let mut solver = OcpSolver::new(arm, cost, constraints, 1.0, n, 2, 3, 1, settings).unwrap();
    solver.activate_contact(0, 0, n);

    let q0 = DVector::from_vec(vec![0.6, -1.0]);
    let v0 = DVector::zeros(2);
    solver.set_state_trajectory(&q0, &v0);
    // Runs one linearize pass so every stage's robot clone caches (q0, v0)
    // kinematics before the contact reference point is read off it.
    solver.compute_kkt_residual(&q0, &v0);
    for t in 0..n {
        solver.set_contact_point_by_kinematics(t);
    }
    solver.initialize_constraints();

    for _ in 0..n {
        solver.update_solution(&q0, &v0, true).unwrap();
    }

    assert!(solver.kkt_error() < 1e-6, "kkt_error = {}", solver.kkt_error());

    for t in 0..n {
        let f = solver.solution(t).f.as_view().clone_owned();
        assert_eq!(f.len(), 3);
        let tol = 1e-4;
        assert!(mu * f[2] - f[0].abs() >= -tol, "friction cone violated at stage {t}: f = {f:?}");
        assert!(mu * f[2] - f[1].abs() >= -tol, "friction cone violated at stage {t}: f = {f:?}");
    }
}

// Scenario 5: zero cost and no constraints, one iteration should reproduce
// the exact dynamics-feasible rollout from the initial state.
#[test]
fn zero_cost_and_no_constraints_matches_exact_rollout() {
    let arm = PlanarArm::new();
    let constraints = Constraints::new(1e-4, 0.995);
    let cost = QuadraticCost::uniform(2, 2, 0, 0.0, 0.0, 0.0, 0.0);
    let n = 10;
    let mut solver = OcpSolver::new(arm, cost, constraints, 1.0, n, 2, 0, 0, SolverSettings::default()).unwrap();

    let q0 = DVector::from_vec(vec![0.2, 0.1]);
    let v0 = DVector::from_vec(vec![0.05, -0.05]);
    solver.set_state_trajectory(&q0, &v0);
    solver.initialize_constraints();

    let made_progress = solver.update_solution(&q0, &v0, false).unwrap();
    assert!(made_progress);
    assert!(solver.kkt_error() < 1e-16, "kkt_error = {}", solver.kkt_error());
}
