/* Listado de directorio para el reporte verbose, decodificado igual que
cuando el fsck recorre directorios. */

use crate::fs::{Image, ImageError, InodeType};
use crate::walk::for_each_dir_entry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing {
    pub inum: u16,
    pub name: String,
    /// `None` si la entrada nombra un inodo fuera de la tabla o con un tipo
    /// desconocido.
    pub kind: Option<InodeType>,
    pub size: u32,
    pub nlink: i16,
}

pub fn list_directory(image: &Image<'_>, dir: u32) -> Result<Vec<Listing>, ImageError> {
    let ip = image.inode(dir)?;
    let mut out = Vec::new();
    if !ip.is_dir() {
        return Ok(out);
    }
    for_each_dir_entry::<ImageError, _>(image, &ip, |de| {
        let target = image.inode(u32::from(de.inum)).ok();
        out.push(Listing {
            inum: de.inum,
            name: de.name_lossy().into_owned(),
            kind: target.and_then(|t| t.inode_type()),
            size: target.map_or(0, |t| t.size),
            nlink: target.map_or(0, |t| t.nlink),
        });
        Ok(())
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::ROOTINO;
    use crate::mkfs::ImageBuilder;

    #[test]
    fn lists_root_with_targets() {
        let mut b = ImageBuilder::new(64, 16).expect("builder");
        b.add_file(ROOTINO, "readme", b"hello").expect("file");
        b.push_raw_entry(ROOTINO, 900, "ghost").expect("entry");
        let bytes = b.finish();
        let image = Image::new(&bytes).expect("image");

        let listing = list_directory(&image, ROOTINO).expect("listing");
        let names: Vec<&str> = listing.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec![".", "..", "readme", "ghost"]);
        assert_eq!(listing[2].kind, Some(InodeType::File));
        assert_eq!(listing[2].size, 5);
        assert_eq!(listing[2].nlink, 1);
        assert_eq!(listing[3].kind, None);
    }

    #[test]
    fn non_directory_lists_nothing() {
        let mut b = ImageBuilder::new(64, 16).expect("builder");
        let file = b.add_file(ROOTINO, "f", b"x").expect("file");
        let bytes = b.finish();
        let image = Image::new(&bytes).expect("image");
        assert!(list_directory(&image, file).expect("listing").is_empty());
    }
}
