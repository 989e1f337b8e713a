// src/mkfs.rs
//
// Constructor de imágenes en memoria. Arma la imagen igual que el mkfs de xv6
// (boot, superblock, tabla de inodos, bitmap, datos) y reparte los bloques de
// datos en orden. Los tests usan los mutadores crudos para corromper una
// imagen que de otro modo sería válida.

use thiserror::Error;
use tracing::trace;

use crate::dir::DirEntry;
use crate::fs::{
    read_le_u32, DiskInode, ImageError, InodeType, Layout, Superblock, BPB, BSIZE, DINODE_SIZE,
    DIRENT_SIZE, DIRSIZ, IPB, NDIRECT, NINDIRECT, ROOTINO, SUPERBLOCK_NUM,
};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid geometry: {0}")]
    Geometry(#[from] ImageError),
    #[error("need at least two inodes, got {0}")]
    TooFewInodes(u32),
    #[error("no free inodes left")]
    OutOfInodes,
    #[error("no free data blocks left")]
    OutOfBlocks,
    #[error("inode {0} would exceed the maximum file size")]
    FileTooLarge(u32),
    #[error("inode {0} is not a directory")]
    NotDirectory(u32),
    #[error("inode {0} does not exist")]
    NoSuchInode(u32),
    #[error("name {0:?} does not fit in a directory entry")]
    NameTooLong(String),
}

pub struct ImageBuilder {
    superblock: Superblock,
    layout: Layout,
    bytes: Vec<u8>,
    inodes: Vec<DiskInode>,
    used: Vec<bool>,
    next_block: u32,
    /// Primer bloque que el bitmap ya no puede describir.
    block_limit: u32,
}

impl ImageBuilder {
    /// Imagen nueva de `size` bloques con `ninodes` inodos y un directorio
    /// raíz vacío en el inodo 1.
    pub fn new(size: u32, ninodes: u32) -> Result<Self, BuildError> {
        if ninodes <= ROOTINO {
            return Err(BuildError::TooFewInodes(ninodes));
        }
        let bitmap_start = ninodes / IPB + 3;
        let bitmap_blocks = size.div_ceil(BPB);
        let superblock = Superblock {
            size,
            nblocks: size.saturating_sub(bitmap_start + bitmap_blocks),
            ninodes,
        };
        let layout = Layout::resolve(&superblock)?;
        let block_limit = size.min(layout.bitmap_blocks.saturating_mul(BPB));

        let mut used = vec![false; size as usize];
        for slot in used.iter_mut().take(layout.data_start as usize) {
            *slot = true;
        }

        let mut builder = Self {
            superblock,
            layout,
            bytes: vec![0u8; size as usize * BSIZE],
            inodes: vec![DiskInode::EMPTY; ninodes as usize],
            used,
            next_block: layout.data_start,
            block_limit,
        };

        let root = builder.alloc_inode(InodeType::Directory)?;
        debug_assert_eq!(root, ROOTINO);
        builder.inodes[root as usize].nlink = 1;
        builder.push_raw_entry(root, root as u16, ".")?;
        builder.push_raw_entry(root, root as u16, "..")?;
        Ok(builder)
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    // -------------------- Asignación --------------------

    pub fn alloc_inode(&mut self, kind: InodeType) -> Result<u32, BuildError> {
        let inum = self
            .inodes
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, ip)| !ip.is_allocated())
            .map(|(i, _)| i as u32)
            .ok_or(BuildError::OutOfInodes)?;
        let ip = &mut self.inodes[inum as usize];
        *ip = DiskInode::EMPTY;
        ip.kind = kind.raw();
        trace!(inum, ?kind, "allocated inode");
        Ok(inum)
    }

    pub fn alloc_block(&mut self) -> Result<u32, BuildError> {
        if self.next_block >= self.block_limit {
            return Err(BuildError::OutOfBlocks);
        }
        let block = self.next_block;
        self.next_block += 1;
        self.used[block as usize] = true;
        Ok(block)
    }

    /// Bloque que respalda el offset `off` de `inum`; se asigna si hace falta.
    fn block_for_offset(&mut self, inum: u32, off: u32) -> Result<u32, BuildError> {
        let fbn = off as usize / BSIZE;
        if fbn < NDIRECT {
            let current = self.inode(inum)?.direct[fbn];
            if current != 0 {
                return Ok(current);
            }
            let block = self.alloc_block()?;
            self.inodes[inum as usize].direct[fbn] = block;
            return Ok(block);
        }

        let idx = fbn - NDIRECT;
        if idx >= NINDIRECT {
            return Err(BuildError::FileTooLarge(inum));
        }
        let mut table = self.inode(inum)?.indirect;
        if table == 0 {
            table = self.alloc_block()?;
            self.inodes[inum as usize].indirect = table;
        }
        let slot = table as usize * BSIZE + idx * 4;
        let current = read_le_u32(&self.bytes, slot);
        if current != 0 {
            return Ok(current);
        }
        let block = self.alloc_block()?;
        self.bytes[slot..slot + 4].copy_from_slice(&block.to_le_bytes());
        Ok(block)
    }

    /// Agrega `data` al final de `inum`, como `iappend` en xv6.
    pub fn append(&mut self, inum: u32, data: &[u8]) -> Result<(), BuildError> {
        let mut written = 0usize;
        while written < data.len() {
            let off = self.inode(inum)?.size;
            let block = self.block_for_offset(inum, off)?;
            let within = off as usize % BSIZE;
            let n = (BSIZE - within).min(data.len() - written);
            let start = block as usize * BSIZE + within;
            self.bytes[start..start + n].copy_from_slice(&data[written..written + n]);
            self.inodes[inum as usize].size += n as u32;
            written += n;
        }
        Ok(())
    }

    // -------------------- Nombres --------------------

    /// Agrega una entrada a `dir` sin tocar ningún contador de enlaces.
    pub fn push_raw_entry(&mut self, dir: u32, inum: u16, name: &str) -> Result<(), BuildError> {
        let mut raw = [0u8; DIRENT_SIZE];
        DirEntry::new(inum, name).encode(&mut raw);
        self.append(dir, &raw)
    }

    /// Nombra `inum` dentro de `dir`; si no es directorio gana un enlace.
    pub fn link(&mut self, dir: u32, name: &str, inum: u32) -> Result<(), BuildError> {
        if !self.inode(dir)?.is_dir() {
            return Err(BuildError::NotDirectory(dir));
        }
        if name.len() > DIRSIZ {
            return Err(BuildError::NameTooLong(name.to_string()));
        }
        let target = self.inode(inum)?;
        let inum16 = u16::try_from(inum).map_err(|_| BuildError::NoSuchInode(inum))?;
        self.push_raw_entry(dir, inum16, name)?;
        if !target.is_dir() {
            self.inodes[inum as usize].nlink += 1;
        }
        Ok(())
    }

    pub fn mkdir(&mut self, parent: u32, name: &str) -> Result<u32, BuildError> {
        if !self.inode(parent)?.is_dir() {
            return Err(BuildError::NotDirectory(parent));
        }
        let dir = self.alloc_inode(InodeType::Directory)?;
        self.inodes[dir as usize].nlink = 1;
        self.push_raw_entry(dir, dir as u16, ".")?;
        self.push_raw_entry(dir, parent as u16, "..")?;
        self.link(parent, name, dir)?;
        Ok(dir)
    }

    pub fn add_file(&mut self, parent: u32, name: &str, data: &[u8]) -> Result<u32, BuildError> {
        let file = self.alloc_inode(InodeType::File)?;
        self.append(file, data)?;
        self.link(parent, name, file)?;
        Ok(file)
    }

    pub fn mknod(&mut self, parent: u32, name: &str, major: i16, minor: i16) -> Result<u32, BuildError> {
        let dev = self.alloc_inode(InodeType::Device)?;
        let ip = &mut self.inodes[dev as usize];
        ip.major = major;
        ip.minor = minor;
        self.link(parent, name, dev)?;
        Ok(dev)
    }

    // -------------------- Acceso crudo --------------------

    pub fn inode(&self, inum: u32) -> Result<DiskInode, BuildError> {
        self.inodes
            .get(inum as usize)
            .copied()
            .ok_or(BuildError::NoSuchInode(inum))
    }

    /// # Panics
    /// Si `inum` está fuera de la tabla de inodos.
    pub fn inode_mut(&mut self, inum: u32) -> &mut DiskInode {
        &mut self.inodes[inum as usize]
    }

    /// # Panics
    /// Si `block` está fuera de la imagen.
    pub fn block_mut(&mut self, block: u32) -> &mut [u8] {
        let start = block as usize * BSIZE;
        &mut self.bytes[start..start + BSIZE]
    }

    /// # Panics
    /// Si `block` está fuera de la imagen.
    pub fn set_bitmap(&mut self, block: u32, used: bool) {
        self.used[block as usize] = used;
    }

    /// Codifica superblock, tabla de inodos y bitmap, y devuelve la imagen.
    pub fn finish(mut self) -> Vec<u8> {
        let sb_off = SUPERBLOCK_NUM as usize * BSIZE;
        self.superblock.encode(&mut self.bytes[sb_off..sb_off + BSIZE]);

        for (inum, ip) in self.inodes.iter().enumerate() {
            let block = self.layout.inode_block(inum as u32) as usize;
            let off = block * BSIZE + (inum % IPB as usize) * DINODE_SIZE;
            ip.encode(&mut self.bytes[off..off + DINODE_SIZE]);
        }

        let bitmap_off = self.layout.bitmap_start as usize * BSIZE;
        let bitmap_len = self.layout.bitmap_blocks as usize * BSIZE;
        let bitmap = &mut self.bytes[bitmap_off..bitmap_off + bitmap_len];
        bitmap.fill(0);
        for (block, &used) in self.used.iter().enumerate() {
            if used && block / 8 < bitmap.len() {
                bitmap[block / 8] |= 1 << (block % 8);
            }
        }
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Image;
    use crate::walk::for_each_dir_entry;

    #[test]
    fn default_geometry_matches_xv6() {
        let b = ImageBuilder::new(1024, 200).expect("builder");
        assert_eq!(b.layout().bitmap_start, 28);
        assert_eq!(b.layout().data_start, 29);
        assert_eq!(b.superblock().nblocks, 995);
    }

    #[test]
    fn root_is_self_parented() {
        let bytes = ImageBuilder::new(64, 16).expect("builder").finish();
        let image = Image::new(&bytes).expect("image");
        let root = image.inode(ROOTINO).expect("root");
        assert!(root.is_dir());
        assert_eq!(root.size as usize, 2 * DIRENT_SIZE);

        let mut names = Vec::new();
        for_each_dir_entry::<ImageError, _>(&image, &root, |de| {
            names.push((de.inum, de.name_lossy().into_owned()));
            Ok(())
        })
        .expect("entries");
        assert_eq!(names, vec![(1, ".".to_string()), (1, "..".to_string())]);
    }

    #[test]
    fn large_file_spills_into_indirect_block() {
        let mut b = ImageBuilder::new(256, 16).expect("builder");
        let data = vec![7u8; (NDIRECT + 3) * BSIZE];
        let file = b.add_file(ROOTINO, "big", &data).expect("file");
        let ip = b.inode(file).expect("inode");
        assert!(ip.direct.iter().all(|&blk| blk != 0));
        assert_ne!(ip.indirect, 0);
        assert_eq!(ip.size as usize, data.len());
        assert_eq!(ip.nlink, 1);
    }

    #[test]
    fn runs_out_of_blocks() {
        let mut b = ImageBuilder::new(12, 8).expect("builder");
        let data = vec![1u8; 20 * BSIZE];
        assert!(matches!(
            b.add_file(ROOTINO, "f", &data),
            Err(BuildError::OutOfBlocks)
        ));
    }

    #[test]
    fn rejects_long_names_and_non_directories() {
        let mut b = ImageBuilder::new(64, 16).expect("builder");
        let file = b.add_file(ROOTINO, "f", b"x").expect("file");
        assert!(matches!(
            b.link(ROOTINO, "a-name-that-is-too-long", file),
            Err(BuildError::NameTooLong(_))
        ));
        assert!(matches!(
            b.mkdir(file, "d"),
            Err(BuildError::NotDirectory(_))
        ));
    }

    #[test]
    fn too_few_inodes() {
        assert!(matches!(
            ImageBuilder::new(64, 1),
            Err(BuildError::TooFewInodes(1))
        ));
    }
}
