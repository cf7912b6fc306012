//! sha256d, defined as two rounds of SHA-256.

use sha2::{Digest, Sha256};
use std::io;

/// A type that lets you write out SHA256d (double-SHA256, as in "SHA256
/// doubled") digests incrementally via the `io::Write` interface.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Writer {
    /// Consume the Writer and produce the hash result.
    pub fn finish(self) -> [u8; 32] {
        let first = self.hash.finalize();
        let second = Sha256::digest(&first);
        let mut buffer = [0u8; 32];
        buffer[..].copy_from_slice(&second);
        buffer
    }
}

/// Convenience: sha256d of a byte slice in one call.
pub fn digest(data: &[u8]) -> [u8; 32] {
    use io::Write;
    let mut writer = Writer::default();
    writer
        .write_all(data)
        .expect("sha256d::Writer is infallible");
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        // sha256d of the empty string, a standard vector.
        let expected =
            hex::decode("5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456")
                .unwrap();
        assert_eq!(digest(b"")[..], expected[..]);
    }
}
