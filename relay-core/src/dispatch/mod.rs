//! Bounded batch dispatch of a payload to many targets.
//!
//! - `types`: target and capability traits, outcomes and the dispatch report
//! - `plan`: partitioning of targets into ordered batches
//! - `dispatcher`: the batch loop that drives sends through the invoker

pub mod dispatcher;
pub mod plan;
pub mod types;

pub use dispatcher::BoundedBatchDispatcher;
pub use plan::BatchPlan;
pub use types::{
    DispatchReport, Messageable, PayloadOf, ReceiptOf, SendErrorOf, TargetOutcome, TargetReport,
    TargetResource,
};
