// Models module - Database entity representations

pub mod audit_log;
pub mod booking;
pub mod customer;
pub mod employee;
pub mod payment;
pub mod review;
pub mod schedule;
pub mod service;
pub mod subscription;
pub mod tenant;

pub use audit_log::AuditLog;
pub use booking::{Booking, BookingStatus};
pub use customer::Customer;
pub use employee::Employee;
pub use payment::Payment;
pub use review::Review;
pub use schedule::Schedule;
pub use service::Service;
pub use subscription::Subscription;
pub use tenant::Tenant;
