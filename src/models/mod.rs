// Models module - Database entity representations

pub mod check_in;
pub mod program;
pub mod qr_code;
pub mod relationship;
pub mod user;

pub use check_in::CheckIn;
pub use program::LearningProgram;
pub use qr_code::QrCode;
pub use relationship::ParentStudentRelationship;
pub use user::{Role, User};
