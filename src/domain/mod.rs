mod account;
mod entry;
mod money;

pub use account::*;
pub use entry::*;
pub use money::*;
