use lazy_static::lazy_static;

/// Distinct values of one fingerprint byte.
const BYTE_SPACE: usize = 256;
/// Two bytes differ in at most 8 bits.
const MAX_BYTE_DISTANCE: usize = 8;

lazy_static! {
    static ref HAMMING: [[u8; BYTE_SPACE]; BYTE_SPACE] = {
        let mut table = [[0u8; BYTE_SPACE]; BYTE_SPACE];
        for i in 0..BYTE_SPACE {
            for j in 0..BYTE_SPACE {
                table[i][j] = (i ^ j).count_ones() as u8;
            }
        }
        table
    };

    static ref NEIGHBOURS: [[Vec<u8>; MAX_BYTE_DISTANCE + 1]; BYTE_SPACE] = {
        let mut table: [[Vec<u8>; MAX_BYTE_DISTANCE + 1]; BYTE_SPACE] =
            std::array::from_fn(|_| std::array::from_fn(|_| Vec::new()));
        for i in 0..BYTE_SPACE {
            for j in 0..BYTE_SPACE {
                table[i][(i ^ j).count_ones() as usize].push(j as u8);
            }
        }
        table
    };
}

/// Hamming distance between two byte values, in `0..=8`.
#[inline(always)]
pub fn byte_distance(a: u8, b: u8) -> u8 {
    HAMMING[a as usize][b as usize]
}

/// Every byte value at exactly `distance` bit flips from `value`.
///
/// Bucket sizes follow `binomial(8, distance)`; the order within a bucket is
/// arbitrary but fixed for the process lifetime.
#[inline(always)]
pub fn bytes_at_distance(value: u8, distance: u8) -> &'static [u8] {
    &NEIGHBOURS[value as usize][distance as usize]
}
