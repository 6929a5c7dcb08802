pub mod consolidate;
pub mod copy;
pub mod dest_index;
pub mod engine;
pub mod file_dedup;
pub mod filter;
pub mod folder_merge;
pub mod hasher;
pub mod scanner;
pub mod signature;
pub mod state;

pub use consolidate::{consolidate, discover_groups, MergeGroup};
pub use dest_index::DestinationIndex;
pub use engine::{MergeEngine, RunSummary};
pub use filter::FileFilter;
pub use hasher::{ContentKey, HashCache};
pub use scanner::{FileRecord, FileScanner, FolderRecord, ScanResult};
pub use signature::{normalized_name, FolderSignature};
pub use state::{ProgressUpdate, ReportEntry, RunPhase, RunRequest, RunState, RunStats};
