// Services module - Business logic

pub mod admin;
pub mod auth;
pub mod availability;
pub mod bookings;
pub mod encryption;
pub mod mercado_pago;
pub mod password;
pub mod payments;
pub mod reports;
pub mod reviews;
pub mod subscriptions;
