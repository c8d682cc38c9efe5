pub mod booking_service;
pub mod notify;

pub use booking_service::BookingService;
pub use notify::{watch_profiles, ChangeOp, ProfileChange};
