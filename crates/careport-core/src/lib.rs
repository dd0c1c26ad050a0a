//! Insurance onboarding core: plan catalog, benefit estimation, and the
//! store facade that owns the patient's connected plan.

pub mod benefits;
pub mod catalog;
pub mod gateway;
pub mod store;
