use crate::dir::{DirBlock, DirEntry};
use crate::fs::{DiskInode, Image, ImageError};

/// Nivel de direccionamiento por el que se llegó a un bloque.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Direct,
    /// El bloque indirecto en sí (un arreglo de números de bloque).
    IndirectTable,
    /// Un bloque nombrado por la tabla indirecta.
    Indirect,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRef {
    pub block: u32,
    pub kind: BlockKind,
}

impl BlockRef {
    /// Contiene datos de archivo o directorio, no números de bloque.
    pub fn is_content(&self) -> bool {
        self.kind != BlockKind::IndirectTable
    }
}

/// Llama a `visit` por cada bloque no nulo que reclama `inode`: primero los
/// directos en orden, luego la tabla indirecta y después sus entradas.
///
/// La tabla sólo se decodifica después de que `visit` la aceptó, así que un
/// visitante que valida direcciones nunca deja leer fuera de la imagen.
pub fn for_each_block<E, F>(image: &Image<'_>, inode: &DiskInode, mut visit: F) -> Result<(), E>
where
    E: From<ImageError>,
    F: FnMut(BlockRef) -> Result<(), E>,
{
    for &block in inode.direct.iter().filter(|&&b| b != 0) {
        visit(BlockRef {
            block,
            kind: BlockKind::Direct,
        })?;
    }

    if inode.indirect == 0 {
        return Ok(());
    }
    visit(BlockRef {
        block: inode.indirect,
        kind: BlockKind::IndirectTable,
    })?;

    for block in image
        .indirect_entries(inode.indirect)?
        .into_iter()
        .filter(|&b| b != 0)
    {
        visit(BlockRef {
            block,
            kind: BlockKind::Indirect,
        })?;
    }
    Ok(())
}

/// Cada entrada no vacía del directorio `inode`, en todos sus bloques de datos.
pub fn for_each_dir_entry<E, F>(image: &Image<'_>, inode: &DiskInode, mut visit: F) -> Result<(), E>
where
    E: From<ImageError>,
    F: FnMut(DirEntry) -> Result<(), E>,
{
    for_each_block(image, inode, |r| {
        if !r.is_content() {
            return Ok(());
        }
        let block = DirBlock::new(image.block(r.block)?);
        block.live_entries().try_for_each(&mut visit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Superblock, BSIZE, NDIRECT};

    fn blank_image(size: u32) -> Vec<u8> {
        let mut bytes = vec![0u8; size as usize * BSIZE];
        Superblock {
            size,
            nblocks: size - 5,
            ninodes: 8,
        }
        .encode(&mut bytes[BSIZE..2 * BSIZE]);
        bytes
    }

    fn collect(image: &Image<'_>, ip: &DiskInode) -> Result<Vec<BlockRef>, ImageError> {
        let mut seen = Vec::new();
        for_each_block::<ImageError, _>(image, ip, |r| {
            seen.push(r);
            Ok(())
        })?;
        Ok(seen)
    }

    #[test]
    fn canonical_order_direct_then_table_then_entries() {
        let mut bytes = blank_image(32);
        let table = 20usize;
        bytes[table * BSIZE..table * BSIZE + 4].copy_from_slice(&21u32.to_le_bytes());
        bytes[table * BSIZE + 12..table * BSIZE + 16].copy_from_slice(&22u32.to_le_bytes());
        let image = Image::new(&bytes).expect("image");

        let mut ip = DiskInode::EMPTY;
        ip.kind = 2;
        ip.direct[0] = 10;
        ip.direct[3] = 11;
        ip.indirect = 20;

        let seen = collect(&image, &ip).expect("walk");
        let blocks: Vec<(u32, BlockKind)> = seen.iter().map(|r| (r.block, r.kind)).collect();
        assert_eq!(
            blocks,
            vec![
                (10, BlockKind::Direct),
                (11, BlockKind::Direct),
                (20, BlockKind::IndirectTable),
                (21, BlockKind::Indirect),
                (22, BlockKind::Indirect),
            ]
        );
    }

    #[test]
    fn empty_inode_visits_nothing() {
        let bytes = blank_image(16);
        let image = Image::new(&bytes).expect("image");
        assert!(collect(&image, &DiskInode::EMPTY).expect("walk").is_empty());
    }

    #[test]
    fn visitor_error_stops_before_table_is_decoded() {
        let bytes = blank_image(16);
        let image = Image::new(&bytes).expect("image");
        let mut ip = DiskInode::EMPTY;
        ip.indirect = 9999;

        let mut visited = 0;
        let res = for_each_block::<ImageError, _>(&image, &ip, |r| {
            visited += 1;
            if r.kind == BlockKind::IndirectTable {
                return Err(ImageError::Geometry("rejected".into()));
            }
            Ok(())
        });
        assert!(matches!(res, Err(ImageError::Geometry(_))));
        assert_eq!(visited, 1);
    }

    #[test]
    fn unvalidated_table_outside_image_is_a_bounds_error() {
        let bytes = blank_image(16);
        let image = Image::new(&bytes).expect("image");
        let mut ip = DiskInode::EMPTY;
        ip.direct[NDIRECT - 1] = 7;
        ip.indirect = 9999;
        assert!(matches!(
            collect(&image, &ip),
            Err(ImageError::BlockOutOfRange { block: 9999, .. })
        ));
    }
}
