//! The primal horizon driver: `ASSEMBLE -> FACTORIZE -> DIRECTION
//! -> STEP_SIZE -> LINE_SEARCH -> UPDATE` per call to
//! [`OcpSolver::update_solution`]. Stage containers are centrally owned in
//! flat `Vec`s indexed by stage, resolving the cyclic stage-to-neighbor
//! references the original expresses via raw pointers into index-based
//! access to centrally owned arrays; the three concurrency barriers fall
//! out of where a sequential loop replaces a `par_iter_mut` fan-out below.

use nalgebra::DVector;
use rayon::prelude::*;

use crate::contact_sequence::ContactSequence;
use crate::constraints::Constraints;
use crate::cost::QuadraticCost;
use crate::error::{OcpError, Result};
use crate::ocp::{forward_pass, SplitOCP, TerminalOCP};
use crate::riccati::{backward_riccati_recursion, RiccatiFactorization, RiccatiGain, RiccatiMatrixInverter};
use crate::robot_model::RobotModel;
use crate::solution::{SplitDirection, SplitSolution};
use crate::solver::{LineSearchFilter, SolverSettings};

pub struct OcpSolver<R: RobotModel> {
    stages: Vec<SplitOCP<R>>,
    terminal: TerminalOCP<R>,
    cost: QuadraticCost,
    constraints: Constraints,
    contact_sequence: ContactSequence,
    solutions: Vec<SplitSolution>,
    directions: Vec<SplitDirection>,
    gains: Vec<RiccatiGain>,
    inverters: Vec<RiccatiMatrixInverter>,
    factorizations: Vec<RiccatiFactorization>,
    filter: LineSearchFilter,
    settings: SolverSettings,
    pool: rayon::ThreadPool,
    dtau: f64,
    n: usize,
    nq: usize,
    nv: usize,
    dim_passive: usize,
}

impl<R: RobotModel> OcpSolver<R> {
    /// `robot` is cloned once per stage plus once for the terminal stage,
    /// one clone per worker; the passed-in value is not itself kept.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        robot: R,
        cost: QuadraticCost,
        constraints: Constraints,
        t_horizon: f64,
        n: usize,
        num_proc: usize,
        max_dimf: usize,
        max_points: usize,
        settings: SolverSettings,
    ) -> Result<Self> {
        if n <= 1 {
            return Err(OcpError::DomainError(format!("N must be > 1, got {n}")));
        }
        if t_horizon <= 0.0 {
            return Err(OcpError::DomainError(format!("T must be positive, got {t_horizon}")));
        }

        let nq = robot.dimq();
        let nv = robot.dimv();
        let dim_passive = robot.dim_passive();
        let dtau = t_horizon / n as f64;

        let contact_sequence = ContactSequence::new(n, max_points);

        let stages = (0..n)
            .map(|t| {
                SplitOCP::new(
                    robot.clone(),
                    nv,
                    max_dimf,
                    dim_passive,
                    contact_sequence.stage(t),
                    &constraints,
                    settings.max_complementarity_violation,
                    settings.barrier,
                    settings.fraction_to_boundary_rate,
                )
            })
            .collect();
        let terminal = TerminalOCP::new(robot, nv);

        let solutions = (0..=n).map(|_| SplitSolution::new(nq, nv, dim_passive, max_dimf)).collect();
        let directions = (0..=n).map(|_| SplitDirection::new(nq, nv, dim_passive, max_dimf)).collect();
        let gains = (0..n).map(|_| RiccatiGain::new(nv, max_dimf, dim_passive)).collect();
        let inverters = (0..n).map(|_| RiccatiMatrixInverter::new(nv, max_dimf, dim_passive)).collect();
        let factorizations = (0..=n).map(|_| RiccatiFactorization::new(nv)).collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_proc)
            .build()
            .map_err(|e| OcpError::DomainError(format!("failed to build a {num_proc}-thread pool: {e}")))?;

        Ok(Self {
            stages,
            terminal,
            cost,
            constraints,
            contact_sequence,
            solutions,
            directions,
            gains,
            inverters,
            factorizations,
            filter: LineSearchFilter::new(settings.filter_margin),
            settings,
            pool,
            dtau,
            n,
            nq,
            nv,
            dim_passive,
        })
    }

    pub fn num_stages(&self) -> usize {
        self.n
    }

    pub fn dimq(&self) -> usize {
        self.nq
    }

    pub fn solution(&self, t: usize) -> &SplitSolution {
        &self.solutions[t]
    }

    /// Broadcasts the same `(q, v)` across every stage of the horizon.
    pub fn set_state_trajectory(&mut self, q: &DVector<f64>, v: &DVector<f64>) {
        for s in &mut self.solutions {
            s.q.as_view_mut().copy_from(q);
            s.v.as_view_mut().copy_from(v);
        }
    }

    /// Raw vector-space linear interpolation between the endpoint states.
    /// Not manifold-aware: for a floating-base `q` this interpolates the
    /// quaternion block componentwise rather than via `slerp`, good enough
    /// for an initial guess that PDIP iterations then correct.
    pub fn set_state_trajectory_interpolated(&mut self, q0: &DVector<f64>, v0: &DVector<f64>, q_n: &DVector<f64>, v_n: &DVector<f64>) {
        let n = self.n as f64;
        for (t, s) in self.solutions.iter_mut().enumerate() {
            let alpha = t as f64 / n;
            s.q.as_view_mut().copy_from(&(q0 * (1.0 - alpha) + q_n * alpha));
            s.v.as_view_mut().copy_from(&(v0 * (1.0 - alpha) + v_n * alpha));
        }
    }

    fn resync_contact_status(&mut self, stage_begin: usize, stage_end: usize) {
        let end = stage_end.min(self.n);
        for t in stage_begin..end {
            let cs = self.contact_sequence.stage(t).clone();
            self.stages[t].set_contact_status(self.nv, self.dim_passive, &cs, &self.constraints);
            self.solutions[t].set_contact_status(self.dim_passive, &cs);
            self.directions[t].set_contact_status(self.dim_passive, &cs);
            self.gains[t].set_contact_status(self.nv, self.dim_passive, &cs);
        }
    }

    pub fn activate_contact(&mut self, i: usize, stage_begin: usize, stage_end: usize) {
        self.contact_sequence.activate_contact(i, stage_begin, stage_end);
        self.resync_contact_status(stage_begin, stage_end);
    }

    pub fn deactivate_contact(&mut self, i: usize, stage_begin: usize, stage_end: usize) {
        self.contact_sequence.deactivate_contact(i, stage_begin, stage_end);
        self.resync_contact_status(stage_begin, stage_end);
    }

    pub fn activate_contacts(&mut self, indices: &[usize], stage_begin: usize, stage_end: usize) {
        self.contact_sequence.activate_contacts(indices, stage_begin, stage_end);
        self.resync_contact_status(stage_begin, stage_end);
    }

    pub fn deactivate_contacts(&mut self, indices: &[usize], stage_begin: usize, stage_end: usize) {
        self.contact_sequence.deactivate_contacts(indices, stage_begin, stage_end);
        self.resync_contact_status(stage_begin, stage_end);
    }

    /// Caches stage `t`'s current frame kinematics as its contact reference
    /// points. A generic `set_contact_point(list)` is not exposed: `RobotModel`
    /// has no setter for an explicit point list, only this kinematics-derived
    /// one (see `DESIGN.md`).
    pub fn set_contact_point_by_kinematics(&mut self, t: usize) {
        self.stages[t].robot_mut().set_contact_points_by_current_kinematics();
    }

    pub fn is_feasible(&self) -> bool {
        self.stages.iter().zip(self.solutions.iter()).all(|(stage, s)| stage.is_feasible(&self.constraints, s))
    }

    /// Seeds slack/dual at every stage, lifting infeasible initial guesses.
    /// Non-fatal; logged, not returned as an error.
    pub fn initialize_constraints(&mut self) {
        if !self.is_feasible() {
            tracing::warn!("initial guess is infeasible; forcing feasibility by slack lifting");
        }
        let dtau = self.dtau;
        for (stage, s) in self.stages.iter_mut().zip(self.solutions.iter()) {
            stage.initialize_constraints(&self.constraints, dtau, s);
        }
    }

    fn linearize_all(&mut self) {
        let cost = &self.cost;
        let constraints = &self.constraints;
        let contact_sequence = &self.contact_sequence;
        let dtau = self.dtau;
        let solutions = &self.solutions;
        let stages = &mut self.stages;
        self.pool.install(|| {
            stages.par_iter_mut().enumerate().for_each(|(t, stage)| {
                let _span = tracing::debug_span!("stage", t).entered();
                stage.linearize(cost, constraints, contact_sequence.stage(t), dtau, &solutions[t], &solutions[t + 1]);
            });
        });
        self.terminal.linearize(&self.cost, &self.solutions[self.n]);
    }

    /// Sequential, inherently serial across stages.
    fn backward_riccati_sweep(&mut self) -> Result<()> {
        self.factorizations[self.n].set_terminal(self.terminal.matrix(), self.terminal.residual());
        let nv = self.nv;
        let dim_passive = self.dim_passive;
        let dtau = self.dtau;
        let epsilon = self.settings.regularization_epsilon;
        for t in (0..self.n).rev() {
            let dimf = self.contact_sequence.stage(t).dimf();
            let (front, back) = self.factorizations.split_at_mut(t + 1);
            let p_next = &back[0];
            let p = &mut front[t];
            backward_riccati_recursion(
                nv,
                dim_passive,
                dimf,
                dtau,
                self.stages[t].matrix(),
                self.stages[t].residual(),
                p_next,
                &mut self.inverters[t],
                &mut self.gains[t],
                p,
                epsilon,
                t,
            )?;
        }
        Ok(())
    }

    /// Sequential forward recursion from `dq_0 = 0, dv_0 = 0`.
    fn forward_pass(&mut self) {
        let nv = self.nv;
        let mut dq = DVector::zeros(nv);
        let mut dv = DVector::zeros(nv);
        for t in 0..self.n {
            self.directions[t].dq.as_view_mut().copy_from(&dq);
            self.directions[t].dv.as_view_mut().copy_from(&dv);
            let (dq_next, dv_next) = forward_pass::forward_step(
                self.dtau,
                self.stages[t].matrix(),
                self.stages[t].residual(),
                &self.gains[t],
                &self.factorizations[t],
                dq.rows(0, nv),
                dv.rows(0, nv),
                &mut self.directions[t],
            );
            dq = dq_next;
            dv = dv_next;
        }
        self.directions[self.n].dq.as_view_mut().copy_from(&dq);
        self.directions[self.n].dv.as_view_mut().copy_from(&dv);
        let (dlmd_n, dgmm_n) = forward_pass::recover_costate_direction(&self.factorizations[self.n], dq.rows(0, nv), dv.rows(0, nv));
        self.directions[self.n].dlmd.as_view_mut().copy_from(&dlmd_n);
        self.directions[self.n].dgmm.as_view_mut().copy_from(&dgmm_n);
    }

    fn compute_condensed_directions(&mut self) {
        let constraints = &self.constraints;
        let dtau = self.dtau;
        let stages = &mut self.stages;
        let directions = &mut self.directions[..self.n];
        self.pool.install(|| {
            stages.par_iter_mut().zip(directions.par_iter_mut()).for_each(|(stage, d)| {
                stage.compute_condensed_primal_direction(d);
                stage.compute_condensed_dual_direction(constraints, dtau, d);
            });
        });
    }

    fn max_primal_step_size(&self) -> f64 {
        let constraints = &self.constraints;
        self.pool
            .install(|| self.stages.par_iter().map(|s| s.max_primal_step_size(constraints)).reduce(|| 1.0, f64::min))
    }

    fn max_dual_step_size(&self) -> f64 {
        let constraints = &self.constraints;
        self.pool
            .install(|| self.stages.par_iter().map(|s| s.max_dual_step_size(constraints)).reduce(|| 1.0, f64::min))
    }

    fn trial_cost_and_violation(&self, step: f64) -> (f64, f64) {
        let mut total_cost = 0.0;
        let mut total_violation = 0.0;
        for t in 0..self.n {
            let mut trial = self.solutions[t].clone();
            self.stages[t].update_primal(&mut trial, step, &self.directions[t]);
            let (c, v) = self.stages[t].cost_and_violation(&self.cost, &self.constraints, self.dtau, &trial);
            total_cost += c;
            total_violation += v;
        }
        let mut trial_n = self.solutions[self.n].clone();
        self.terminal.update_primal(&mut trial_n, step, &self.directions[self.n]);
        total_cost += self.terminal.terminal_cost(&self.cost, &trial_n);
        (total_cost, total_violation)
    }

    /// Backs off geometrically from `max_step` by `step_size_reduction_rate`
    /// until the filter accepts a trial point or `min_step_size` is reached;
    /// exhausting the backoff accepts the smallest step and is logged
    /// rather than surfaced as an error.
    fn line_search(&mut self, max_step: f64) -> f64 {
        let mut step = max_step;
        loop {
            let (cost, violation) = self.trial_cost_and_violation(step);
            let accepted = self.filter.is_acceptable(cost, violation);
            if accepted {
                self.filter.accept(cost, violation);
                return step;
            }
            if step <= self.settings.min_step_size {
                tracing::warn!("line search exhausted at step {step}; accepting smallest trial step (stalled)");
                return step;
            }
            step *= self.settings.step_size_reduction_rate;
        }
    }

    fn apply_step(&mut self, primal_step: f64, dual_step: f64) {
        let constraints = &self.constraints;
        let stages = &mut self.stages;
        let solutions = &mut self.solutions[..self.n];
        let directions = &self.directions[..self.n];
        self.pool.install(|| {
            stages
                .par_iter_mut()
                .zip(solutions.par_iter_mut())
                .zip(directions.par_iter())
                .for_each(|((stage, s), d)| {
                    stage.update_primal(s, primal_step, d);
                    stage.update_dual(constraints, primal_step, dual_step);
                });
        });
        self.terminal.update_primal(&mut self.solutions[self.n], primal_step, &self.directions[self.n]);
    }

    /// One full Newton iteration: pins stage 0 at the measured `(q, v)`,
    /// assembles, factorizes, recovers the direction, steps, and returns
    /// whether a nonzero step was taken.
    pub fn update_solution(&mut self, q: &DVector<f64>, v: &DVector<f64>, use_line_search: bool) -> Result<bool> {
        let _span = tracing::info_span!("ocp_iteration").entered();

        self.solutions[0].q.as_view_mut().copy_from(q);
        self.solutions[0].v.as_view_mut().copy_from(v);

        self.linearize_all();
        self.backward_riccati_sweep()?;
        self.forward_pass();
        self.compute_condensed_directions();

        let max_primal_step = self.max_primal_step_size();
        let dual_step = self.max_dual_step_size();

        let primal_step = if use_line_search {
            self.line_search(max_primal_step)
        } else {
            max_primal_step
        };

        self.apply_step(primal_step, dual_step);
        Ok(primal_step > 0.0)
    }

    /// Re-linearizes at `(q, v)` without taking a step, so [`Self::kkt_error`]
    /// reports the residual at that state.
    pub fn compute_kkt_residual(&mut self, q: &DVector<f64>, v: &DVector<f64>) {
        self.solutions[0].q.as_view_mut().copy_from(q);
        self.solutions[0].v.as_view_mut().copy_from(v);
        self.linearize_all();
    }

    /// Squared L2 norm of the condensed residual, summed over every stage
    /// plus the terminal stage.
    pub fn kkt_error(&self) -> f64 {
        let constraints = &self.constraints;
        let dtau = self.dtau;
        let stage_sum: f64 = self.stages.iter().map(|s| s.squared_kkt_error_norm(constraints, dtau)).sum();
        stage_sum + self.terminal.squared_kkt_error_norm()
    }

    pub fn get_control_input(&self, stage: usize) -> DVector<f64> {
        self.solutions[stage].u.as_view().clone_owned()
    }

    /// `(Kq, Kv)`: the torque feedback gain at `stage`, read directly from
    /// the Riccati gain recovered at the last `update_solution` call.
    pub fn get_state_feedback_gain(&self, stage: usize) -> (nalgebra::DMatrix<f64>, nalgebra::DMatrix<f64>) {
        self.stages[stage].state_feedback_gain(&self.gains[stage])
    }

    pub fn clear_line_search_filter(&mut self) {
        self.filter.clear();
    }

    pub fn print_solution(&self) {
        for (t, s) in self.solutions.iter().enumerate() {
            tracing::info!(stage = t, q = ?s.q.as_view(), v = ?s.v.as_view(), u = ?s.u.as_view(), "split solution");
        }
    }
}
