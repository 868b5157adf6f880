//! Discrete-time dynamics: the state-transition residual and the condensed
//! inverse-dynamics stationarity.

pub mod robot_dynamics;
pub mod state_equation;

pub use robot_dynamics::RobotDynamics;
pub use state_equation::StateEquation;
