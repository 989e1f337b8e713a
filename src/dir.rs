// src/dir.rs
use std::borrow::Cow;

use crate::fs::{read_le_u16, BSIZE, DIRENT_SIZE, DIRSIZ};

pub const ENTRIES_PER_BLOCK: usize = BSIZE / DIRENT_SIZE;

/// Una entrada de directorio ya decodificada.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub inum: u16,
    pub name: [u8; DIRSIZ],
}

impl DirEntry {
    pub fn parse(raw: &[u8]) -> Self {
        let mut name = [0u8; DIRSIZ];
        name.copy_from_slice(&raw[2..2 + DIRSIZ]);
        Self {
            inum: read_le_u16(raw, 0),
            name,
        }
    }

    /// Construye una entrada, truncando `name` a `DIRSIZ` bytes.
    pub fn new(inum: u16, name: &str) -> Self {
        let mut buf = [0u8; DIRSIZ];
        let bytes = name.as_bytes();
        let len = bytes.len().min(DIRSIZ);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self { inum, name: buf }
    }

    pub fn encode(&self, raw: &mut [u8]) {
        raw[0..2].copy_from_slice(&self.inum.to_le_bytes());
        raw[2..2 + DIRSIZ].copy_from_slice(&self.name);
    }

    pub fn is_empty(&self) -> bool {
        self.inum == 0
    }

    /// Bytes del nombre hasta el primer NUL, como máximo `DIRSIZ`.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(DIRSIZ);
        &self.name[..end]
    }

    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes())
    }

    pub fn is_dot(&self) -> bool {
        self.name_matches(".")
    }

    pub fn is_dotdot(&self) -> bool {
        self.name_matches("..")
    }

    /// Comparación de ancho fijo: ambos nombres se cortan en `DIRSIZ` bytes o
    /// en su primer NUL, lo que ocurra primero.
    pub fn name_matches(&self, name: &str) -> bool {
        let wanted = name.as_bytes();
        let end = wanted
            .iter()
            .take(DIRSIZ)
            .position(|&b| b == 0)
            .unwrap_or_else(|| wanted.len().min(DIRSIZ));
        self.name_bytes() == &wanted[..end]
    }
}

/// Un bloque interpretado como `ENTRIES_PER_BLOCK` entradas de directorio.
#[derive(Clone, Copy)]
pub struct DirBlock<'a> {
    raw: &'a [u8],
}

impl<'a> DirBlock<'a> {
    pub fn new(raw: &'a [u8]) -> Self {
        Self { raw }
    }

    /// Todas las entradas, incluidas las vacías. Se puede llamar varias veces.
    pub fn entries(&self) -> impl Iterator<Item = DirEntry> + 'a {
        self.raw
            .chunks_exact(DIRENT_SIZE)
            .take(ENTRIES_PER_BLOCK)
            .map(DirEntry::parse)
    }

    pub fn live_entries(&self) -> impl Iterator<Item = DirEntry> + 'a {
        self.entries().filter(|de| !de.is_empty())
    }
}

/// Primera entrada no vacía con nombre `name`.
pub fn find_named(block: DirBlock<'_>, name: &str) -> Option<u16> {
    block
        .live_entries()
        .find(|de| de.name_matches(name))
        .map(|de| de.inum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_with(entries: &[DirEntry]) -> Vec<u8> {
        let mut raw = vec![0u8; BSIZE];
        for (i, de) in entries.iter().enumerate() {
            de.encode(&mut raw[i * DIRENT_SIZE..(i + 1) * DIRENT_SIZE]);
        }
        raw
    }

    #[test]
    fn block_has_fixed_slot_count() {
        let raw = block_with(&[]);
        let block = DirBlock::new(&raw);
        assert_eq!(block.entries().count(), 32);
        assert_eq!(block.live_entries().count(), 0);
    }

    #[test]
    fn entries_are_restartable() {
        let raw = block_with(&[DirEntry::new(1, "."), DirEntry::new(1, "..")]);
        let block = DirBlock::new(&raw);
        let first: Vec<_> = block.live_entries().collect();
        let second: Vec<_> = block.live_entries().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn find_named_skips_empty_slots() {
        let ghost = DirEntry::new(0, "a");
        let raw = block_with(&[ghost, DirEntry::new(5, "a"), DirEntry::new(6, "b")]);
        let block = DirBlock::new(&raw);
        assert_eq!(find_named(block, "a"), Some(5));
        assert_eq!(find_named(block, "b"), Some(6));
        assert_eq!(find_named(block, "c"), None);
    }

    #[test]
    fn dot_does_not_match_dotdot() {
        let raw = block_with(&[DirEntry::new(2, ".."), DirEntry::new(3, ".")]);
        let block = DirBlock::new(&raw);
        assert_eq!(find_named(block, "."), Some(3));
        assert_eq!(find_named(block, ".."), Some(2));
    }

    #[test]
    fn names_compare_up_to_dirsiz() {
        let de = DirEntry::new(9, "abcdefghijklmnopq");
        assert_eq!(de.name_bytes(), b"abcdefghijklmn");
        assert!(de.name_matches("abcdefghijklmn"));
        assert!(de.name_matches("abcdefghijklmnXYZ"));
        assert!(!de.name_matches("abcdefghijklm"));
    }

    #[test]
    fn trailing_garbage_after_nul_is_ignored() {
        let mut de = DirEntry::new(4, "x");
        de.name[5] = b'!';
        assert!(de.name_matches("x"));
        assert_eq!(de.name_lossy(), "x");
    }
}
