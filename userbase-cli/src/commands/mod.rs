//! Command implementations for the userbase CLI

pub mod serve;

pub use serve::{run_migrations, run_serve};
