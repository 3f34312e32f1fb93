//! Folder domain entities.

pub mod closure;
pub mod external;
pub mod model;
pub mod tree;

pub use closure::{ClosureEdge, NewClosureEdge};
pub use external::{ExternalReference, ExternalSystemType};
pub use model::{CreateFolder, Folder};
pub use tree::{FolderNode, OrderedFolder};
