//! Riccati recursion over the horizon: per-stage saddle
//! inversion, feedback/feedforward gain, and the backward value-function
//! propagation.

pub mod backward_pass;
pub mod factorization;
pub mod gain;
pub mod inverter;

pub use backward_pass::backward_riccati_recursion;
pub use factorization::RiccatiFactorization;
pub use gain::RiccatiGain;
pub use inverter::RiccatiMatrixInverter;
