mod identity;
mod measurement_kind;
mod reading;
mod registry;

pub use identity::*;
pub use measurement_kind::*;
pub use reading::*;
pub use registry::*;
