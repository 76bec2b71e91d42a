mod dto;
pub mod handlers;
pub mod mailer;
pub mod services;

pub use handlers::routes as router;
