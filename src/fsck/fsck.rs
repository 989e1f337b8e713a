/* Archivo principal del fsck. Resuelve la imagen, reserva las tablas de
conteo y corre los doce chequeos en orden, deteniéndose en la primera
violación. Los chequeos 3, 5, 7 y 8 se evalúan por bloque durante un único
recorrido de los inodos; los que siguen al bitmap necesitan los conteos de
referencias de los directorios. */

use tracing::{debug, trace, warn};

use super::fsck_types::{Summary, Verdict, Violation};
use super::refs::{BlockUsage, RefTables};
use crate::bitmap::Bitmap;
use crate::fs::{DiskInode, Image, ImageError, InodeType, ROOTINO};
use crate::walk::{for_each_block, for_each_dir_entry, BlockKind, BlockRef};

/// Por qué se detuvo una pasada de chequeos.
#[derive(Debug)]
enum Halt {
    Violation(Violation),
    Image(ImageError),
}

impl From<Violation> for Halt {
    fn from(v: Violation) -> Self {
        Halt::Violation(v)
    }
}

impl From<ImageError> for Halt {
    fn from(e: ImageError) -> Self {
        Halt::Image(e)
    }
}

/// Revisa una imagen completa en memoria.
///
/// `Ok(Verdict::Inconsistent(_))` nombra el primer invariante roto. `Err` queda
/// para imágenes cuya geometría ni siquiera se puede resolver y para fallos al
/// reservar las tablas de conteo.
pub fn run_fsck(bytes: &[u8]) -> Result<Verdict, ImageError> {
    let image = Image::new(bytes)?;
    check_image(&image)
}

pub fn check_image(image: &Image<'_>) -> Result<Verdict, ImageError> {
    let mut usage = BlockUsage::new(image.layout().size)?;
    let mut refs = RefTables::new(image.ninodes())?;

    match run_checks(image, &mut usage, &mut refs) {
        Ok(summary) => {
            debug!(
                inodes = summary.inodes_used(),
                blocks = summary.data_blocks_used,
                "image is consistent"
            );
            Ok(Verdict::Consistent(summary))
        }
        Err(Halt::Violation(v)) => {
            warn!(check = v.check().number(), detail = %v.detail(), "{v}");
            Ok(Verdict::Inconsistent(v))
        }
        Err(Halt::Image(e)) => Err(e),
    }
}

fn run_checks(
    image: &Image<'_>,
    usage: &mut BlockUsage,
    refs: &mut RefTables,
) -> Result<Summary, Halt> {
    let bitmap = Bitmap::new(*image);

    check_root_directory(image)?;
    check_inode_types(image)?;
    scan_inodes(image, &bitmap, usage)?;
    check_bitmap_claims(&bitmap, usage)?;

    refs.count_directory_references(image)?;

    check_reachable(image, refs)?;
    check_entry_targets(image)?;
    check_file_links(image, refs)?;
    check_directory_parents(image, refs)?;

    summarize(image, usage, refs)
}

// -----------------------------------------------------------------------------
// Búsqueda de "." / ".." en directorios
// -----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DotEntries {
    dots: u32,
    dot: Option<u16>,
    dotdots: u32,
    dotdot: Option<u16>,
}

fn scan_dot_entries(image: &Image<'_>, dir: &DiskInode) -> Result<DotEntries, ImageError> {
    let mut found = DotEntries::default();
    for_each_dir_entry::<ImageError, _>(image, dir, |de| {
        if de.is_dot() {
            found.dots += 1;
            found.dot.get_or_insert(de.inum);
        } else if de.is_dotdot() {
            found.dotdots += 1;
            found.dotdot.get_or_insert(de.inum);
        }
        Ok(())
    })?;
    Ok(found)
}

// -----------------------------------------------------------------------------
// Chequeos
// -----------------------------------------------------------------------------

/// Chequeo 1. Corre antes de validar direcciones, así que un root con bloques
/// fuera de la imagen cuenta como inexistente.
fn check_root_directory(image: &Image<'_>) -> Result<(), Violation> {
    let root = image.inode(ROOTINO).map_err(|_| Violation::RootMissing)?;
    if !root.is_dir() {
        return Err(Violation::RootMissing);
    }

    let found = scan_dot_entries(image, &root).map_err(|_| Violation::RootMissing)?;
    let root_num = ROOTINO as u16;
    if found.dot != Some(root_num) || found.dotdot != Some(root_num) {
        return Err(Violation::RootMissing);
    }
    Ok(())
}

/// Chequeo 2.
fn check_inode_types(image: &Image<'_>) -> Result<(), Halt> {
    for inode in image.inodes() {
        let (inum, ip) = inode?;
        if ip.inode_type().is_none() {
            return Err(Violation::BadInode {
                inum,
                kind: ip.kind,
            }
            .into());
        }
    }
    Ok(())
}

/// Chequeos 3, 5, 7 y 8 de un bloque: dirección, unicidad y luego bitmap.
fn claim_block(
    image: &Image<'_>,
    bitmap: &Bitmap<'_>,
    usage: &mut BlockUsage,
    inum: u32,
    r: BlockRef,
) -> Result<(), Violation> {
    let block = r.block;
    let direct = r.kind == BlockKind::Direct;

    if !image.layout().is_data_block(block) {
        return Err(if direct {
            Violation::BadDirectAddress { inum, block }
        } else {
            Violation::BadIndirectAddress { inum, block }
        });
    }

    if !usage.claim(block) {
        return Err(if direct {
            Violation::DirectReused { inum, block }
        } else {
            Violation::IndirectReused { inum, block }
        });
    }

    if !bitmap.is_used(block) {
        return Err(Violation::MarkedFree { inum, block });
    }
    Ok(())
}

/// Recorrido de bloques de cada inodo asignado, con el chequeo 4 para cada
/// directorio una vez que sus bloques son válidos.
fn scan_inodes(image: &Image<'_>, bitmap: &Bitmap<'_>, usage: &mut BlockUsage) -> Result<(), Halt> {
    for inode in image.inodes() {
        let (inum, ip) = inode?;
        if !ip.is_allocated() {
            continue;
        }
        trace!(inum, kind = ip.kind, size = ip.size, "scanning inode");

        for_each_block::<Halt, _>(image, &ip, |r| {
            claim_block(image, bitmap, usage, inum, r).map_err(Halt::from)
        })?;

        if ip.is_dir() {
            check_directory_format(image, inum, &ip)?;
        }
    }
    Ok(())
}

/// Chequeo 4.
fn check_directory_format(image: &Image<'_>, inum: u32, dir: &DiskInode) -> Result<(), Violation> {
    let malformed = Violation::DirectoryFormat { inum };
    let found = scan_dot_entries(image, dir).map_err(|_| malformed.clone())?;

    if found.dots != 1 || found.dot.map(u32::from) != Some(inum) || found.dotdots != 1 {
        return Err(malformed);
    }

    let parent_ok = found
        .dotdot
        .and_then(|p| image.inode(u32::from(p)).ok())
        .is_some_and(|parent| parent.is_dir());
    if !parent_ok {
        return Err(malformed);
    }
    Ok(())
}

/// Chequeo 6, sobre toda la región de datos.
fn check_bitmap_claims(bitmap: &Bitmap<'_>, usage: &BlockUsage) -> Result<(), Violation> {
    match bitmap.used_data_blocks().find(|&b| usage.count(b) == 0) {
        Some(block) => Err(Violation::UnclaimedInBitmap { block }),
        None => Ok(()),
    }
}

/// Chequeo 9. El "." de un directorio siempre cuenta como referencia, así que
/// un directorio que no es root sólo es alcanzable por una entrada de su padre.
fn check_reachable(image: &Image<'_>, refs: &RefTables) -> Result<(), Halt> {
    for inode in image.inodes() {
        let (inum, ip) = inode?;
        if !ip.is_allocated() {
            continue;
        }
        let named = if ip.is_dir() && inum != ROOTINO {
            refs.parents(inum) > 0
        } else {
            refs.dir_refs(inum) > 0
        };
        if !named {
            return Err(Violation::Unreferenced { inum }.into());
        }
    }
    Ok(())
}

/// Chequeo 10.
fn check_entry_targets(image: &Image<'_>) -> Result<(), Halt> {
    for inode in image.inodes() {
        let (dir, ip) = inode?;
        if !ip.is_dir() {
            continue;
        }
        for_each_dir_entry::<Halt, _>(image, &ip, |de| {
            let inum = u32::from(de.inum);
            let allocated = image.inode(inum).is_ok_and(|target| target.is_allocated());
            if !allocated {
                return Err(Violation::FreeInodeReferenced { dir, inum }.into());
            }
            Ok(())
        })?;
    }
    Ok(())
}

/// Chequeo 11.
fn check_file_links(image: &Image<'_>, refs: &RefTables) -> Result<(), Halt> {
    for inode in image.inodes() {
        let (inum, ip) = inode?;
        if ip.inode_type() != Some(InodeType::File) {
            continue;
        }
        let refs = refs.dir_refs(inum);
        if i64::from(ip.nlink) != i64::from(refs) {
            return Err(Violation::FileLinkCount {
                inum,
                nlink: ip.nlink,
                refs,
            }
            .into());
        }
    }
    Ok(())
}

/// Chequeo 12.
fn check_directory_parents(image: &Image<'_>, refs: &RefTables) -> Result<(), Halt> {
    for inode in image.inodes() {
        let (inum, ip) = inode?;
        if inum == ROOTINO || !ip.is_dir() {
            continue;
        }
        let parents = refs.parents(inum);
        if parents > 1 {
            return Err(Violation::DirectoryLinkedTwice { inum, parents }.into());
        }
    }
    Ok(())
}

fn summarize(image: &Image<'_>, usage: &BlockUsage, refs: &RefTables) -> Result<Summary, Halt> {
    let sb = image.superblock();
    let mut summary = Summary {
        size: sb.size,
        nblocks: sb.nblocks,
        ninodes: sb.ninodes,
        data_start: image.layout().data_start,
        data_blocks_used: usage.claimed(),
        dir_entries: refs.entries(),
        ..Summary::default()
    };
    for inode in image.inodes() {
        let (_, ip) = inode?;
        match ip.inode_type() {
            Some(InodeType::Directory) => summary.directories += 1,
            Some(InodeType::File) => summary.files += 1,
            Some(InodeType::Device) => summary.devices += 1,
            Some(InodeType::Unallocated) | None => {}
        }
    }
    Ok(summary)
}
