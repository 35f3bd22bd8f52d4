mod core;
mod policy;
mod source;


pub use core::{FailoverWatchdog, PromotionTarget};
pub use policy::{FailoverPolicy, PolicyDecision};
pub use source::{parse_remaining, HttpQuotaSource, QuotaSource};
