use std::fs::Metadata;

/// Identity of a filesystem object that survives renames, used to notice that the path now points to another file.
///
/// On unix it is a device and inode pair. Other platforms do not expose anything comparable through std, so
/// `from_metadata` returns `None` there and rotation is only detected by size.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    pub dev: u64,
    pub inode: u64,
}

impl FileIdentity {
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::prelude::MetadataExt;

        Some(Self {
            dev: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Whether path now refers to a different file than the one we hold open.
///
/// Unknown identity on either side is never treated as a change.
pub fn identity_changed(held: Option<FileIdentity>, current: Option<FileIdentity>) -> bool {
    match (held, current) {
        (Some(held), Some(current)) => held != current,
        _ => false,
    }
}
