//! Decoding an LC-3 object image: a big-endian origin word followed by a
//! big-endian stream of words, loaded contiguously into memory starting at
//! that origin.
//!
//! Decoding itself never fails. A file that couldn't be opened or read is
//! the host driver's error to report (`main.rs`); a file that opened fine
//! but is too short to hold a full origin word is just an image with
//! nothing useful in it, exactly as in the reference C `read_image_file`,
//! where a short `fread` leaves the word count at zero and the function
//! still returns success.

use crate::bits::swap16;
use crate::io::ConsoleIo;
use crate::memory::{Memory, MEMORY_SIZE};

/// Read a big-endian `u16` out of two bytes without assuming anything about
/// host endianness: reinterpret as little-endian, then byte-swap, which is
/// exactly `u16::from_be_bytes` expressed through `swap16`.
fn read_be_word(bytes: [u8; 2]) -> u16 {
    swap16(u16::from_le_bytes(bytes))
}

/// Load one image into `memory`. Returns the origin address the image was
/// loaded at, or `0` if `bytes` is too short to contain an origin word (in
/// which case nothing is copied). Words beyond the end of the address
/// space are silently dropped rather than treated as an error.
pub fn load_image<IO: ConsoleIo>(bytes: &[u8], memory: &mut Memory<IO>) -> u16 {
    if bytes.len() < 2 {
        return 0;
    }
    let origin = read_be_word([bytes[0], bytes[1]]);
    let mut addr = origin as usize;
    for chunk in bytes[2..].chunks_exact(2) {
        if addr >= MEMORY_SIZE {
            break;
        }
        let word = read_be_word([chunk[0], chunk[1]]);
        memory.write(addr as u16, word);
        addr += 1;
    }
    origin
}
