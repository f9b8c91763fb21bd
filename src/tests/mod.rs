// Service-level tests on an in-memory database.

pub mod common;

mod application_service_test;
mod combination_service_test;
mod monitor_service_test;
mod program_service_test;
