//! Transparent decompression for metadata parts.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use xz2::read::XzDecoder;

/// Open a metadata file for reading, decompressing based on the file
/// extension. `.gz`, `.xz` and `.zst` are understood; anything else is
/// read as-is.
pub fn open_metadata_reader(path: &Path) -> Result<Box<dyn BufRead>, std::io::Error> {
    let file = fs_err::File::open(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let reader: Box<dyn Read> = match ext {
        "gz" => Box::new(GzDecoder::new(file)),
        "xz" => Box::new(XzDecoder::new(file)),
        "zst" => Box::new(zstd::stream::read::Decoder::new(file)?),
        _ => Box::new(file),
    };
    Ok(Box::new(BufReader::new(reader)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PAYLOAD: &str = "<metadata packages=\"0\"></metadata>";

    fn read_all(path: &Path) -> String {
        let mut out = String::new();
        open_metadata_reader(path)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn plain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.xml");
        std::fs::write(&path, PAYLOAD).unwrap();
        assert_eq!(read_all(&path), PAYLOAD);
    }

    #[test]
    fn gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.xml.gz");
        let mut enc =
            flate2::write::GzEncoder::new(std::fs::File::create(&path).unwrap(), Default::default());
        enc.write_all(PAYLOAD.as_bytes()).unwrap();
        enc.finish().unwrap();
        assert_eq!(read_all(&path), PAYLOAD);
    }

    #[test]
    fn xz() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.xml.xz");
        let mut enc = xz2::write::XzEncoder::new(std::fs::File::create(&path).unwrap(), 6);
        enc.write_all(PAYLOAD.as_bytes()).unwrap();
        enc.finish().unwrap();
        assert_eq!(read_all(&path), PAYLOAD);
    }

    #[test]
    fn zstd_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("primary.xml.zst");
        let mut enc =
            zstd::stream::write::Encoder::new(std::fs::File::create(&path).unwrap(), 0)
                .unwrap();
        enc.write_all(PAYLOAD.as_bytes()).unwrap();
        enc.finish().unwrap();
        assert_eq!(read_all(&path), PAYLOAD);
    }
}
