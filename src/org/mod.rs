pub mod hierarchy;
pub mod seed;
