use std::collections::TryReserveError;

use thiserror::Error;
use tracing::debug;

// -----------------------------------------------------------------------------
// Constantes del formato en disco (xv6)
// -----------------------------------------------------------------------------

pub const BSIZE: usize = 512;
pub const ROOTINO: u32 = 1;

pub const NDIRECT: usize = 12;
pub const NINDIRECT: usize = BSIZE / 4;

pub const DINODE_SIZE: usize = 64;
/// Inodos por bloque.
pub const IPB: u32 = (BSIZE / DINODE_SIZE) as u32;
/// Bits de bitmap por bloque.
pub const BPB: u32 = (BSIZE * 8) as u32;

pub const DIRSIZ: usize = 14;
pub const DIRENT_SIZE: usize = 16;

pub const SUPERBLOCK_NUM: u32 = 1;
pub const INODE_TABLE_START: u32 = 2;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: u64, actual: usize },
    #[error("impossible geometry: {0}")]
    Geometry(String),
    #[error("block {block} outside image of {total} blocks")]
    BlockOutOfRange { block: u32, total: u32 },
    #[error("inode {inum} outside inode table of {ninodes} inodes")]
    InodeOutOfRange { inum: u32, ninodes: u32 },
    #[error("could not allocate tracking tables: {0}")]
    Allocation(#[from] TryReserveError),
}

#[inline]
pub(crate) fn read_le_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
fn read_le_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([data[offset], data[offset + 1]])
}

#[inline]
pub(crate) fn read_le_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

// -------------------- Estructuras en disco --------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Superblock {
    /// Bloques totales de la imagen.
    pub size: u32,
    /// Bloques de datos.
    pub nblocks: u32,
    pub ninodes: u32,
}

impl Superblock {
    pub fn parse(block: &[u8]) -> Self {
        Self {
            size: read_le_u32(block, 0),
            nblocks: read_le_u32(block, 4),
            ninodes: read_le_u32(block, 8),
        }
    }

    pub fn encode(&self, block: &mut [u8]) {
        block[0..4].copy_from_slice(&self.size.to_le_bytes());
        block[4..8].copy_from_slice(&self.nblocks.to_le_bytes());
        block[8..12].copy_from_slice(&self.ninodes.to_le_bytes());
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InodeType {
    Unallocated,
    Directory,
    File,
    Device,
}

impl InodeType {
    pub fn from_raw(raw: i16) -> Option<Self> {
        match raw {
            0 => Some(InodeType::Unallocated),
            1 => Some(InodeType::Directory),
            2 => Some(InodeType::File),
            3 => Some(InodeType::Device),
            _ => None,
        }
    }

    pub fn raw(self) -> i16 {
        match self {
            InodeType::Unallocated => 0,
            InodeType::Directory => 1,
            InodeType::File => 2,
            InodeType::Device => 3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DiskInode {
    /// Campo de tipo crudo; no necesariamente uno de los tipos conocidos.
    pub kind: i16,
    pub major: i16,
    pub minor: i16,
    pub nlink: i16,
    pub size: u32,
    pub direct: [u32; NDIRECT],
    pub indirect: u32,
}

impl DiskInode {
    pub const EMPTY: DiskInode = DiskInode {
        kind: 0,
        major: 0,
        minor: 0,
        nlink: 0,
        size: 0,
        direct: [0; NDIRECT],
        indirect: 0,
    };

    pub fn parse(raw: &[u8]) -> Self {
        let mut direct = [0u32; NDIRECT];
        for (slot, addr) in direct.iter_mut().enumerate() {
            *addr = read_le_u32(raw, 12 + slot * 4);
        }
        Self {
            kind: read_le_i16(raw, 0),
            major: read_le_i16(raw, 2),
            minor: read_le_i16(raw, 4),
            nlink: read_le_i16(raw, 6),
            size: read_le_u32(raw, 8),
            direct,
            indirect: read_le_u32(raw, 12 + NDIRECT * 4),
        }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[0..2].copy_from_slice(&self.kind.to_le_bytes());
        raw[2..4].copy_from_slice(&self.major.to_le_bytes());
        raw[4..6].copy_from_slice(&self.minor.to_le_bytes());
        raw[6..8].copy_from_slice(&self.nlink.to_le_bytes());
        raw[8..12].copy_from_slice(&self.size.to_le_bytes());
        for (slot, addr) in self.direct.iter().enumerate() {
            let off = 12 + slot * 4;
            raw[off..off + 4].copy_from_slice(&addr.to_le_bytes());
        }
        let off = 12 + NDIRECT * 4;
        raw[off..off + 4].copy_from_slice(&self.indirect.to_le_bytes());
    }

    /// `None` si el campo de tipo tiene un valor desconocido.
    pub fn inode_type(&self) -> Option<InodeType> {
        InodeType::from_raw(self.kind)
    }

    pub fn is_dir(&self) -> bool {
        self.inode_type() == Some(InodeType::Directory)
    }

    pub fn is_allocated(&self) -> bool {
        self.kind != 0
    }
}

// -----------------------------------------------------------------------------
// Resolución del layout
// -----------------------------------------------------------------------------

/// Límites de cada región, derivados del superblock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub size: u32,
    pub ninodes: u32,
    pub inode_table_start: u32,
    pub bitmap_start: u32,
    pub bitmap_blocks: u32,
    pub data_start: u32,
}

impl Layout {
    /// Primero van el bloque de boot, el superblock y los inodos; luego el bitmap.
    pub fn resolve(sb: &Superblock) -> Result<Self, ImageError> {
        let bitmap_start = sb.ninodes / IPB + 3;
        let bitmap_blocks = sb.nblocks.div_ceil(BPB);
        let data_start = bitmap_start
            .checked_add(bitmap_blocks)
            .ok_or_else(|| ImageError::Geometry("bitmap overflows block numbering".into()))?;

        if data_start > sb.size {
            return Err(ImageError::Geometry(format!(
                "data region starts at block {} but image has {} blocks",
                data_start, sb.size
            )));
        }

        Ok(Self {
            size: sb.size,
            ninodes: sb.ninodes,
            inode_table_start: INODE_TABLE_START,
            bitmap_start,
            bitmap_blocks,
            data_start,
        })
    }

    /// Bloque que contiene el inodo `inum`.
    pub fn inode_block(&self, inum: u32) -> u32 {
        self.inode_table_start + inum / IPB
    }

    pub fn is_data_block(&self, block: u32) -> bool {
        block >= self.data_start && block < self.size
    }
}

// -----------------------------------------------------------------------------
// Acceso a bloques
// -----------------------------------------------------------------------------

/// Vista de sólo lectura sobre la imagen completa. Todos los offsets en bytes
/// se calculan aquí.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    bytes: &'a [u8],
    superblock: Superblock,
    layout: Layout,
}

impl<'a> Image<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, ImageError> {
        let sb_end = (SUPERBLOCK_NUM as usize + 1) * BSIZE;
        if bytes.len() < sb_end {
            return Err(ImageError::Truncated {
                needed: sb_end as u64,
                actual: bytes.len(),
            });
        }

        let sb_off = SUPERBLOCK_NUM as usize * BSIZE;
        let superblock = Superblock::parse(&bytes[sb_off..sb_off + BSIZE]);

        let needed = u64::from(superblock.size) * BSIZE as u64;
        if (bytes.len() as u64) < needed {
            return Err(ImageError::Truncated {
                needed,
                actual: bytes.len(),
            });
        }

        let layout = Layout::resolve(&superblock)?;
        debug!(
            size = superblock.size,
            nblocks = superblock.nblocks,
            ninodes = superblock.ninodes,
            bitmap_start = layout.bitmap_start,
            bitmap_blocks = layout.bitmap_blocks,
            data_start = layout.data_start,
            "resolved image layout"
        );

        Ok(Self {
            bytes,
            superblock,
            layout,
        })
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn ninodes(&self) -> u32 {
        self.superblock.ninodes
    }

    /// Bytes del bloque `n`.
    pub fn block(&self, n: u32) -> Result<&'a [u8], ImageError> {
        if n >= self.superblock.size {
            return Err(ImageError::BlockOutOfRange {
                block: n,
                total: self.superblock.size,
            });
        }
        let off = n as usize * BSIZE;
        Ok(&self.bytes[off..off + BSIZE])
    }

    pub fn inode(&self, inum: u32) -> Result<DiskInode, ImageError> {
        if inum >= self.superblock.ninodes {
            return Err(ImageError::InodeOutOfRange {
                inum,
                ninodes: self.superblock.ninodes,
            });
        }
        let block = self.block(self.layout.inode_block(inum))?;
        let off = (inum % IPB) as usize * DINODE_SIZE;
        Ok(DiskInode::parse(&block[off..off + DINODE_SIZE]))
    }

    /// Inodos `0..ninodes` en el orden de la tabla.
    pub fn inodes(&self) -> impl Iterator<Item = Result<(u32, DiskInode), ImageError>> + '_ {
        (0..self.superblock.ninodes).map(move |inum| self.inode(inum).map(|ip| (inum, ip)))
    }

    /// Decodifica el bloque `n` como bloque indirecto: `NINDIRECT` números de bloque.
    pub fn indirect_entries(&self, n: u32) -> Result<[u32; NINDIRECT], ImageError> {
        let block = self.block(n)?;
        let mut addrs = [0u32; NINDIRECT];
        for (i, addr) in addrs.iter_mut().enumerate() {
            *addr = read_le_u32(block, i * 4);
        }
        Ok(addrs)
    }
}
