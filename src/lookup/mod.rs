//! Derived lookup fields: the expression language, the recomputation pass and the event driven
//! service that schedules passes.
pub mod engine;
pub mod expr;
pub mod service;

pub use engine::{
    arrays_as_string_are_equal, run_pass, LookupIndex, LookupKey, LookupStatus, PassReport,
    PassRequest,
};
pub use service::LookupService;
