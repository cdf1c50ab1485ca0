pub mod convert;
pub mod health;
