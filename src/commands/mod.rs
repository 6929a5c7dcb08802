pub mod consolidate;
pub mod events;
pub mod run;
pub mod settings;

pub use consolidate::{confirm_merge, merge_folders};
pub use run::{pause_process, resume_process, start_process};
