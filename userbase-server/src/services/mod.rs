//! Service layer between handlers and repositories

pub mod users;

pub use users::UserService;
