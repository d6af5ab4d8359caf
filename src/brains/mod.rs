pub mod agent;
pub mod learners;
pub mod models;
