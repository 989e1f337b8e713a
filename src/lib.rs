#![forbid(unsafe_code)]

mod bitmap;
mod dir;
mod fs;
pub mod fsck;
pub mod mkfs;
mod walk;

pub use crate::bitmap::Bitmap;
pub use crate::dir::{find_named, DirBlock, DirEntry, ENTRIES_PER_BLOCK};
pub use crate::fs::{
    DiskInode,
    Image,
    ImageError,
    InodeType,
    Layout,
    Superblock,
    BPB,
    BSIZE,
    DIRENT_SIZE,
    DIRSIZ,
    IPB,
    NDIRECT,
    NINDIRECT,
    ROOTINO,
};
pub use crate::walk::{for_each_block, for_each_dir_entry, BlockKind, BlockRef};
