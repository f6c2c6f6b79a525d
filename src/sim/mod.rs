pub mod driver;
pub mod ode;
pub mod solve;
pub mod thermal;
