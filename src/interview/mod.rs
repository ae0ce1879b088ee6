pub mod report;
pub mod selector;
pub mod session;
