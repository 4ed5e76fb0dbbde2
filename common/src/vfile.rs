use std::sync::Arc;

use ahash::AHashMap;

use crate::vcursor::VCursor;
use crate::vpath::VPath;

#[derive(Default)]
pub struct VFile {
    pub data: Vec<u8>,
}

/// Read-only in-memory content tree. Built once, then shared; lookups never
/// mutate, so clones can be handed to any number of decode threads.
#[derive(Default, Clone)]
pub struct VFileSystem {
    pub files: Arc<AHashMap<String, VFile>>,
}

impl VFileSystem {
    pub fn new(files: AHashMap<String, VFile>) -> Self {
        Self {
            files: Arc::new(files),
        }
    }

    pub fn get(&self, path: &dyn VPath) -> Option<&[u8]> {
        self.get_str(&path.full_path())
    }

    pub fn get_str(&self, path: &str) -> Option<&[u8]> {
        match self.files.get(path) {
            Some(file) => Some(&file.data[..]),
            None => {
                log::debug!("{:?} file not found", path);
                None
            }
        }
    }

    pub fn cursor(&self, path: &dyn VPath) -> Option<VCursor<'_>> {
        self.get(path).map(VCursor::new)
    }
}

/// Incrementally assembles a [`VFileSystem`]; paths are normalized the same
/// way [`VPath::full_path`] normalizes them.
#[derive(Default)]
pub struct VFileSystemBuilder {
    files: AHashMap<String, VFile>,
}

impl VFileSystemBuilder {
    pub fn insert(&mut self, path: impl Into<String>, data: Vec<u8>) -> &mut Self {
        let path = path.into().to_ascii_lowercase().replace('\\', "/");
        self.files.insert(path, VFile { data });
        self
    }

    pub fn build(self) -> VFileSystem {
        VFileSystem::new(self.files)
    }
}

#[cfg(test)]
mod vfile_tests {
    use super::*;
    use crate::vpath::VGlobalPath;

    #[test]
    fn lookup_is_normalized() {
        let mut b = VFileSystemBuilder::default();
        b.insert("Materials\\Metal\\Fence.VTF", vec![1, 2, 3]);
        let fs = b.build();
        assert_eq!(
            fs.get(&VGlobalPath::from("materials/metal/fence.vtf")),
            Some(&[1u8, 2, 3][..])
        );
        assert!(fs.get_str("materials/metal/missing.vtf").is_none());
    }
}
