pub mod clock;
pub mod compactor;
pub mod config;
pub mod conflict;
pub mod engine;
pub mod filters;
pub mod json;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod validator;
pub mod wal;

pub use engine::{NewAppointment, Scheduler, SchedulingError};
