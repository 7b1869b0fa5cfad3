//! CLI command implementations
//!
//! Every command except the listings opens its target through
//! `jtagflash-session` and works on the returned `FlashHandle`.

mod detect;
mod flashmem;
mod list;
mod readmem;

pub use detect::run_detect;
pub use flashmem::run_flashmem;
pub use list::{list_parts, list_targets};
pub use readmem::run_readmem;
