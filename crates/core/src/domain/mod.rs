pub mod appointment;
pub mod coverage;
pub mod patient;
pub mod plan;
pub mod provider;
pub mod response;
pub mod slot;
