pub mod conversation;
pub mod dataset;
