pub mod fetch;
pub mod guard;
