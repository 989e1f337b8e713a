/* Tablas de conteo de una corrida: cuántas veces se reclama cada bloque y
los dos conteos de referencias por inodo que salen del árbol de directorios. */

use tracing::trace;

use crate::fs::{Image, ImageError};
use crate::walk::for_each_dir_entry;

fn zeroed(len: usize) -> Result<Vec<u32>, ImageError> {
    let mut table = Vec::new();
    table.try_reserve_exact(len)?;
    table.resize(len, 0);
    Ok(table)
}

/// Cuántos inodos reclaman cada bloque.
#[derive(Debug)]
pub struct BlockUsage {
    counts: Vec<u32>,
}

impl BlockUsage {
    pub fn new(total_blocks: u32) -> Result<Self, ImageError> {
        Ok(Self {
            counts: zeroed(total_blocks as usize)?,
        })
    }

    /// Registra un reclamo sobre `block`. Devuelve `false`, sin tocar la tabla,
    /// si el bloque ya estaba reclamado. `block` debe estar dentro de la imagen.
    pub fn claim(&mut self, block: u32) -> bool {
        let count = &mut self.counts[block as usize];
        if *count > 0 {
            return false;
        }
        *count = 1;
        true
    }

    pub fn count(&self, block: u32) -> u32 {
        self.counts.get(block as usize).copied().unwrap_or(0)
    }

    pub fn claimed(&self) -> u32 {
        self.counts.iter().filter(|&&c| c > 0).count() as u32
    }
}

/// `dir_refs[i]`: entradas de directorio que nombran el inodo `i`.
/// `parents[i]`: entradas distintas de "." y ".." que nombran el directorio `i`.
#[derive(Debug)]
pub struct RefTables {
    dir_refs: Vec<u32>,
    parents: Vec<u32>,
    entries: u32,
}

impl RefTables {
    pub fn new(ninodes: u32) -> Result<Self, ImageError> {
        Ok(Self {
            dir_refs: zeroed(ninodes as usize)?,
            parents: zeroed(ninodes as usize)?,
            entries: 0,
        })
    }

    /// Cuenta cada entrada de cada directorio. Las direcciones de bloque ya
    /// deben estar validadas; los números de inodo fuera de rango se ignoran.
    pub fn count_directory_references(&mut self, image: &Image<'_>) -> Result<(), ImageError> {
        for inode in image.inodes() {
            let (dir, ip) = inode?;
            if !ip.is_dir() {
                continue;
            }
            for_each_dir_entry::<ImageError, _>(image, &ip, |de| {
                self.entries += 1;
                let inum = usize::from(de.inum);
                let Some(refs) = self.dir_refs.get_mut(inum) else {
                    trace!(dir, inum, "entry names inode outside the table");
                    return Ok(());
                };
                *refs += 1;

                if de.is_dot() || de.is_dotdot() {
                    return Ok(());
                }
                if image.inode(u32::from(de.inum))?.is_dir() {
                    self.parents[inum] += 1;
                }
                Ok(())
            })?;
        }
        Ok(())
    }

    pub fn dir_refs(&self, inum: u32) -> u32 {
        self.dir_refs.get(inum as usize).copied().unwrap_or(0)
    }

    pub fn parents(&self, inum: u32) -> u32 {
        self.parents.get(inum as usize).copied().unwrap_or(0)
    }

    /// Entradas no vacías vistas en todos los directorios.
    pub fn entries(&self) -> u32 {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_refuses_second_claim() {
        let mut usage = BlockUsage::new(8).expect("table");
        assert!(usage.claim(5));
        assert!(!usage.claim(5));
        assert_eq!(usage.count(5), 1);
        assert_eq!(usage.count(6), 0);
        assert_eq!(usage.count(100), 0);
        assert_eq!(usage.claimed(), 1);
    }

    #[test]
    fn fresh_tables_are_zeroed() {
        let refs = RefTables::new(4).expect("tables");
        assert_eq!(refs.dir_refs(1), 0);
        assert_eq!(refs.parents(3), 0);
        assert_eq!(refs.dir_refs(40), 0);
        assert_eq!(refs.entries(), 0);
    }
}
