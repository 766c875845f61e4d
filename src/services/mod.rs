// Services module - Business logic

pub mod check_in;
pub mod password;
pub mod qr_generator;
pub mod qr_payload;
pub mod signature;
pub mod token;
