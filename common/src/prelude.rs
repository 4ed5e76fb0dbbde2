pub use crate::vcursor::{BitCursor, CursorError, VCursor};
pub use crate::vfile::{VFile, VFileSystem, VFileSystemBuilder};
pub use crate::vpath::{VGlobalPath, VLocalPath, VPath, VSplitPath};
