mod devices;
mod groups;
mod ipam;
mod templates;

pub use devices::*;
pub use groups::*;
pub use ipam::*;
pub use templates::*;
