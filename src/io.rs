use crate::codec::Utf8Transcoder;
use crate::error::{ImportError, ImportResult};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;

/// Boxed byte source handed to `csv_async`.
pub type CsvByteSource = Box<dyn AsyncRead + Unpin + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Zstd,
}

#[derive(Debug, Clone)]
pub struct CsvMeta {
    pub compression: Compression,
    /// File name, used for diagnostics.
    pub name_hint: String,
    /// Character encoding of the source; anything but UTF-8 is transcoded.
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for CsvMeta {
    fn default() -> Self {
        Self {
            compression: Compression::None,
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

impl CsvMeta {
    /// Derives compression from the file name. Returns `None` for non-CSV names.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let compression = if lower.ends_with(".csv") {
            Compression::None
        } else if lower.ends_with(".csv.gz") {
            Compression::Gzip
        } else if lower.ends_with(".csv.zst") {
            Compression::Zstd
        } else {
            return None;
        };
        Some(Self {
            compression,
            name_hint: name.to_string(),
            ..Default::default()
        })
    }
}

/// Wraps a raw byte source with decompression and UTF-8 transcoding as `meta` requires.
pub fn build_csv_reader<R>(raw: R, meta: &CsvMeta) -> CsvByteSource
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = BufReader::with_capacity(1 << 16, raw);
    let decompressed: CsvByteSource = match meta.compression {
        Compression::Gzip => Box::new(GzipDecoder::new(buf)),
        Compression::Zstd => Box::new(ZstdDecoder::new(buf)),
        Compression::None => Box::new(buf),
    };

    if meta.charset == encoding_rs::UTF_8 {
        return decompressed;
    }
    let framed = FramedRead::new(decompressed, Utf8Transcoder::new(meta.charset));
    Box::new(StreamReader::new(framed))
}

/// Opens a local CSV file (optionally `.gz`/`.zst`) for reading.
pub async fn reader_from_path(
    path: &Path,
    charset: &'static encoding_rs::Encoding,
) -> ImportResult<(CsvByteSource, CsvMeta)> {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut meta =
        CsvMeta::from_file_name(name).ok_or_else(|| ImportError::NotCsv(path.to_path_buf()))?;
    meta.charset = charset;

    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ImportError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    if file.metadata().await?.is_dir() {
        return Err(ImportError::NotCsv(path.to_path_buf()));
    }

    Ok((build_csv_reader(file, &meta), meta))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compression_follows_extension() {
        assert_eq!(
            CsvMeta::from_file_name("a.CSV").map(|m| m.compression),
            Some(Compression::None)
        );
        assert_eq!(
            CsvMeta::from_file_name("a.csv.gz").map(|m| m.compression),
            Some(Compression::Gzip)
        );
        assert_eq!(
            CsvMeta::from_file_name("a.csv.zst").map(|m| m.compression),
            Some(Compression::Zstd)
        );
        assert!(CsvMeta::from_file_name("a.xlsx").is_none());
        assert!(CsvMeta::from_file_name("a.gz").is_none());
    }

    #[tokio::test]
    async fn missing_file_and_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.csv");
        assert!(matches!(
            reader_from_path(&missing, encoding_rs::UTF_8).await,
            Err(ImportError::FileNotFound(_))
        ));

        let txt = dir.path().join("notes.txt");
        std::fs::write(&txt, "a,b\n").unwrap();
        assert!(matches!(
            reader_from_path(&txt, encoding_rs::UTF_8).await,
            Err(ImportError::NotCsv(_))
        ));
    }
}
