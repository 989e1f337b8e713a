use crate::fs::{Image, BPB};

/// Consultas al bitmap de bloques libres. El bit `b` describe el bloque `b`.
#[derive(Clone, Copy)]
pub struct Bitmap<'a> {
    image: Image<'a>,
}

impl<'a> Bitmap<'a> {
    pub fn new(image: Image<'a>) -> Self {
        Self { image }
    }

    /// Los bloques fuera de la imagen, o cuyo bit caería fuera de la región
    /// del bitmap, se leen como libres.
    pub fn is_used(&self, block: u32) -> bool {
        let layout = self.image.layout();
        if block >= layout.size {
            return false;
        }
        let index = block / BPB;
        if index >= layout.bitmap_blocks {
            return false;
        }
        let Ok(bits) = self.image.block(layout.bitmap_start + index) else {
            return false;
        };
        let within = (block % BPB) as usize;
        (bits[within / 8] >> (within % 8)) & 1 == 1
    }

    /// Bits en 1 entre los bloques de datos, en orden ascendente.
    pub fn used_data_blocks(&self) -> impl Iterator<Item = u32> + 'a {
        let bitmap = *self;
        let layout = *self.image.layout();
        (layout.data_start..layout.size).filter(move |&b| bitmap.is_used(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{Superblock, BSIZE};

    fn image_with_bits(set: &[u32]) -> Vec<u8> {
        let mut bytes = vec![0u8; 16 * BSIZE];
        Superblock {
            size: 16,
            nblocks: 12,
            ninodes: 8,
        }
        .encode(&mut bytes[BSIZE..2 * BSIZE]);
        // ninodes = 8 deja el bitmap en el bloque 4.
        let bitmap = 4 * BSIZE;
        for &b in set {
            bytes[bitmap + b as usize / 8] |= 1 << (b % 8);
        }
        bytes
    }

    #[test]
    fn reads_absolute_bit_index() {
        let bytes = image_with_bits(&[0, 1, 2, 3, 4, 9]);
        let image = Image::new(&bytes).expect("image");
        let bitmap = Bitmap::new(image);
        assert!(bitmap.is_used(4));
        assert!(bitmap.is_used(9));
        assert!(!bitmap.is_used(5));
        assert!(!bitmap.is_used(8));
    }

    #[test]
    fn out_of_range_reads_as_free() {
        let bytes = image_with_bits(&[15]);
        let image = Image::new(&bytes).expect("image");
        let bitmap = Bitmap::new(image);
        assert!(bitmap.is_used(15));
        assert!(!bitmap.is_used(16));
        assert!(!bitmap.is_used(u32::MAX));
    }

    #[test]
    fn used_data_blocks_skips_metadata() {
        let bytes = image_with_bits(&[0, 1, 2, 3, 4, 6, 11]);
        let image = Image::new(&bytes).expect("image");
        let used: Vec<u32> = Bitmap::new(image).used_data_blocks().collect();
        assert_eq!(used, vec![6, 11]);
    }
}
