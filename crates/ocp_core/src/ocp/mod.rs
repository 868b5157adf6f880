//! Per-stage assembly and the forward-pass recovery of the primal-dual
//! Newton step. [`SplitOCP`] owns everything a single stage needs so a
//! worker can hold one per assigned stage without sharing state with its
//! neighbors; [`TerminalOCP`] is the matching stage-`N` variant, which
//! carries no `(a, f, u)` block.

pub mod forward_pass;
pub mod split_ocp;
pub mod terminal_ocp;

pub use forward_pass::forward_step;
pub use split_ocp::SplitOCP;
pub use terminal_ocp::TerminalOCP;
