//! File I/O modules
//!
//! Record stashes, text lists and JSON output.

pub mod output;
pub mod records;
pub mod stash;
pub mod textlist;

pub use output::{copy_file, write_json};
pub use records::{ChordRecord, PosteriorRecord};
pub use stash::Stash;
pub use textlist::load_textlist;
