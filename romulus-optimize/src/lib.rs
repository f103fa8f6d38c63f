/// Residual/Jacobian function traits and numerical differentiation
pub mod calculus;
/// Newton drivers with different line search strategies
pub mod newton;
