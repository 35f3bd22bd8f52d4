mod http;
mod probe;

pub use http::{classify_body, HttpProber};
pub use probe::{HealthProbe, ProbeOutcome, Prober};
