/* Tipos de resultado del fsck: qué invariante falló (Violation / Check),
el veredicto que recibe quien llama y el resumen de una imagen sana. */

use std::fmt;

use thiserror::Error;

/// Los doce invariantes, en el orden en que se evalúan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Check {
    RootDirectory = 1,
    InodeType = 2,
    BlockAddress = 3,
    DirectoryFormat = 4,
    ClaimedBlocksMarked = 5,
    MarkedBlocksClaimed = 6,
    DirectBlocksUnique = 7,
    IndirectBlocksUnique = 8,
    InodesReachable = 9,
    EntryTargets = 10,
    FileLinkCount = 11,
    DirectoryParents = 12,
}

impl Check {
    pub fn number(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "check {}", self.number())
    }
}

/// Primer invariante roto. `Display` es el diagnóstico fijo; los campos
/// ubican el inodo o bloque culpable.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("root directory does not exist.")]
    RootMissing,
    #[error("bad inode.")]
    BadInode { inum: u32, kind: i16 },
    #[error("bad direct address in inode.")]
    BadDirectAddress { inum: u32, block: u32 },
    #[error("bad indirect address in inode.")]
    BadIndirectAddress { inum: u32, block: u32 },
    #[error("directory not properly formatted.")]
    DirectoryFormat { inum: u32 },
    #[error("address used by inode but marked free in bitmap.")]
    MarkedFree { inum: u32, block: u32 },
    #[error("bitmap marks block in use but it is not in use.")]
    UnclaimedInBitmap { block: u32 },
    #[error("direct address used more than once.")]
    DirectReused { inum: u32, block: u32 },
    #[error("indirect address used more than once.")]
    IndirectReused { inum: u32, block: u32 },
    #[error("inode marked use but not found in a directory.")]
    Unreferenced { inum: u32 },
    #[error("inode referred to in directory but marked free.")]
    FreeInodeReferenced { dir: u32, inum: u32 },
    #[error("bad reference count for file.")]
    FileLinkCount { inum: u32, nlink: i16, refs: u32 },
    #[error("directory appears more than once in file system.")]
    DirectoryLinkedTwice { inum: u32, parents: u32 },
}

impl Violation {
    pub fn check(&self) -> Check {
        match self {
            Violation::RootMissing => Check::RootDirectory,
            Violation::BadInode { .. } => Check::InodeType,
            Violation::BadDirectAddress { .. } | Violation::BadIndirectAddress { .. } => {
                Check::BlockAddress
            }
            Violation::DirectoryFormat { .. } => Check::DirectoryFormat,
            Violation::MarkedFree { .. } => Check::ClaimedBlocksMarked,
            Violation::UnclaimedInBitmap { .. } => Check::MarkedBlocksClaimed,
            Violation::DirectReused { .. } => Check::DirectBlocksUnique,
            Violation::IndirectReused { .. } => Check::IndirectBlocksUnique,
            Violation::Unreferenced { .. } => Check::InodesReachable,
            Violation::FreeInodeReferenced { .. } => Check::EntryTargets,
            Violation::FileLinkCount { .. } => Check::FileLinkCount,
            Violation::DirectoryLinkedTwice { .. } => Check::DirectoryParents,
        }
    }

    /// Dónde se encontró la violación, para el modo verbose.
    pub fn detail(&self) -> String {
        match self {
            Violation::RootMissing => "inode 1 is not a self-parented directory".to_string(),
            Violation::BadInode { inum, kind } => format!("inode {inum} has type {kind}"),
            Violation::BadDirectAddress { inum, block }
            | Violation::BadIndirectAddress { inum, block }
            | Violation::MarkedFree { inum, block }
            | Violation::DirectReused { inum, block }
            | Violation::IndirectReused { inum, block } => {
                format!("inode {inum}, block {block}")
            }
            Violation::DirectoryFormat { inum } => format!("directory inode {inum}"),
            Violation::UnclaimedInBitmap { block } => format!("block {block}"),
            Violation::Unreferenced { inum } => format!("inode {inum}"),
            Violation::FreeInodeReferenced { dir, inum } => {
                format!("directory {dir} names inode {inum}")
            }
            Violation::FileLinkCount { inum, nlink, refs } => {
                format!("inode {inum} has nlink {nlink} but {refs} directory entries")
            }
            Violation::DirectoryLinkedTwice { inum, parents } => {
                format!("directory inode {inum} is named by {parents} parents")
            }
        }
    }
}

/// Conteos recopilados sobre una imagen consistente.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub size: u32,
    pub nblocks: u32,
    pub ninodes: u32,
    pub data_start: u32,
    pub directories: u32,
    pub files: u32,
    pub devices: u32,
    pub data_blocks_used: u32,
    pub dir_entries: u32,
}

impl Summary {
    pub fn inodes_used(&self) -> u32 {
        self.directories + self.files + self.devices
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Consistent(Summary),
    Inconsistent(Violation),
}

impl Verdict {
    pub fn is_consistent(&self) -> bool {
        matches!(self, Verdict::Consistent(_))
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Verdict::Consistent(_) => None,
            Verdict::Inconsistent(v) => Some(v),
        }
    }

    pub fn failed_check(&self) -> Option<Check> {
        self.violation().map(Violation::check)
    }
}
