pub mod approval;
pub mod audit;
pub mod delegation;
pub mod document;
pub mod notification;
pub mod org;
pub mod policy;
