mod configfiles;
mod ippools;

pub use configfiles::*;
pub use ippools::*;
