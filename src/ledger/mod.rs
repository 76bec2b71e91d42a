mod dto;
pub mod fraud;
pub mod handlers;
pub mod payment;
pub mod recycling;

pub use handlers::routes as router;
