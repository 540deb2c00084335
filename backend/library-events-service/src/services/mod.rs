pub mod fanout;
pub mod membership;
pub mod visibility;

pub use fanout::{AuditAudience, EventFanout, FanoutConfig};
pub use membership::MembershipResolver;
pub use visibility::{
    GroupingChange, ItemFailure, ItemOutcome, TransitionReport, VisibilityTracker,
    VisibilityTransition,
};
