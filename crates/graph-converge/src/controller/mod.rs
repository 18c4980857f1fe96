//! Convergence controller and its per-operation session.

pub mod lookup;
pub mod runner;
pub mod session;

pub use lookup::LookupFilter;
pub use runner::Controller;
pub use session::{ConvergenceSession, Operation, Phase, ReadBackPolicy, Timeouts};
