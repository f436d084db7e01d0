pub mod call;
pub mod catalog;
pub mod endpoint;
pub mod token;
pub mod wait;
