pub mod cache;
pub mod coordinator;
pub mod engine;
pub mod local_scan;
pub mod navigation;
pub mod paths;
pub mod retry;
pub mod selection;
pub mod tree;
pub mod upload;

pub use cache::{DirectoryCache, Location, SharedCache};
pub use coordinator::{FolderCoordinator, FolderError};
pub use engine::{EngineSettings, FolderRemoval, SyncEngine};
pub use navigation::Navigator;
pub use selection::{ItemKey, Selection, SelectionClosure, resolve_closure};
pub use tree::{LabelRenderer, TreeNode, TreeRow, TreeViewModel};
pub use upload::{UploadFile, UploadPipeline, UploadSession, UploadSummary};
