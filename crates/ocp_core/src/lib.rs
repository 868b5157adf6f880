//! `ocp_core` assembles and solves the stage-wise KKT system of a
//! finite-horizon, contact-constrained rigid-body optimal-control problem.
//!
//! Key components:
//! - **Stage containers**: [`solution::SplitSolution`]/[`solution::SplitDirection`]
//!   hold a stage's primal-dual iterate and Newton step; [`kkt::KktMatrix`]/
//!   [`kkt::KktResidual`] hold its linearized KKT block.
//! - **Constraints**: [`constraints::Constraints`] is a barrier-parameterized
//!   stack of inequality components; [`complementarity::ContactComplementarity`]
//!   couples each contact's force and distance inequalities.
//! - **Contact bookkeeping**: [`contact_status::ContactStatus`] and
//!   [`contact_sequence::ContactSequence`] track which contacts are active
//!   over the horizon.
//! - **Robot interface**: [`robot_model::RobotModel`] is the external
//!   rigid-body-dynamics trait every solver stage is generic over.
//! - **Dynamics**: [`dynamics::StateEquation`] linearizes the discrete
//!   state transition; [`dynamics::RobotDynamics`] condenses the
//!   inverse-dynamics stationarity out of the stage.
//! - **Riccati recursion**: [`riccati::RiccatiMatrixInverter`] and
//!   [`riccati::RiccatiGain`] recover the stage feedback/feedforward gain;
//!   [`riccati::backward_riccati_recursion`] propagates the value function.
//! - **Stage orchestration**: [`ocp::SplitOCP`]/[`ocp::TerminalOCP`] sequence
//!   cost, dynamics, and constraint assembly for one stage;
//!   [`ocp::forward_step`] recovers that stage's Newton step from the
//!   Riccati gain.
//! - **Horizon drivers**: [`solver::OcpSolver`] sequences assembly, backward
//!   Riccati, forward pass, step sizing, and the [`solver::LineSearchFilter`]
//!   into one iteration; [`solver::ParNmpcSolver`] solves the same stages
//!   through a parallel-first coarse/correction sweep. [`solver::SolverSettings`]
//!   groups both drivers' tuning knobs.

pub mod complementarity;
pub mod constraints;
pub mod contact_sequence;
pub mod contact_status;
pub mod cost;
pub mod dynamics;
pub mod error;
pub mod kkt;
pub mod ocp;
pub mod riccati;
pub mod robot_model;
pub mod solution;
pub mod solver;

pub use error::OcpError;
pub use robot_model::RobotModel;
