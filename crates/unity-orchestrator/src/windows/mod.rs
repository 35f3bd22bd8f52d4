mod host;
mod label;
mod registry;

pub use host::{HeadlessWindowHost, WindowHost};
pub use label::label_for;
pub use registry::WindowRegistry;
