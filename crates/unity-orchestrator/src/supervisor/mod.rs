mod backoff;
mod cancellation;
mod core;
mod types;

#[cfg(test)]
mod tests;

pub use backoff::RestartBackoff;
pub use cancellation::CancellationToken;
pub use core::SidecarSupervisor;
pub use types::{Designation, Phase};
