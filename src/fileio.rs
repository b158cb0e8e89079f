//src/fileio.rs

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

fn is_gz(path: &Path) -> bool {
    path.extension().map(|ext| ext == "gz").unwrap_or(false)
}

/// Opens `path` for reading, transparently decompressing `.gz` files.
pub fn open_reader<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let f = File::open(path)?;

    let reader: Box<dyn BufRead> = if is_gz(path) {
        Box::new(BufReader::new(MultiGzDecoder::new(f)))
    } else {
        Box::new(BufReader::new(f))
    };
    Ok(reader)
}

/// Creates `path` for writing, compressing when it ends in `.gz`.
///
/// Callers must `flush` the writer; dropping a gzip writer finishes the
/// stream but swallows errors.
pub fn create_writer<P: AsRef<Path>>(path: P) -> io::Result<Box<dyn Write>> {
    let path = path.as_ref();
    let f = File::create(path)?;

    let writer: Box<dyn Write> = if is_gz(path) {
        Box::new(BufWriter::new(GzEncoder::new(f, Compression::default())))
    } else {
        Box::new(BufWriter::new(f))
    };
    Ok(writer)
}

/// File name without directories, e.g. `/data/x.rma6` -> `x.rma6`.
pub fn file_name_without_path(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

/// File name without directories and without its last extension,
/// e.g. `/data/x.rma6` -> `x`.
pub fn file_base_name(path: &str) -> &str {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_names() {
        assert_eq!(file_name_without_path("/data/run1.rma6"), "run1.rma6");
        assert_eq!(file_base_name("/data/run1.rma6"), "run1");
        assert_eq!(file_base_name("run1"), "run1");
    }

    #[test]
    fn test_gz_round_trip() -> io::Result<()> {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("megan-doc-fileio-{}.txt.gz", std::process::id()));
        {
            let mut w = create_writer(&path)?;
            w.write_all(b"@MEGAN4\nhello\n")?;
            w.flush()?;
        }
        let mut text = String::new();
        open_reader(&path)?.read_to_string(&mut text)?;
        std::fs::remove_file(&path)?;
        assert_eq!(text, "@MEGAN4\nhello\n");
        Ok(())
    }
}
