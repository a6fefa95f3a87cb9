pub mod cce;
pub mod ecs;
pub mod rds;
