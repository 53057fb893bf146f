use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::Writable;

const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// WritableFile is a buffered, append-only file that must not exist before it is created.
pub struct WritableFile {
    path: PathBuf,
    f: BufWriter<File>,
    size: u64,
}

impl WritableFile {
    pub async fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = OpenOptions::new()
            .create_new(true)
            .write(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            f: BufWriter::with_capacity(WRITE_BUFFER_SIZE, f),
            size: 0,
        })
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// close flushes buffered bytes, fsyncs the file and releases the handle.
    pub async fn close(mut self) -> io::Result<()> {
        self.sync().await?;
        self.f.shutdown().await
    }
}

#[async_trait]
impl Writable for WritableFile {
    async fn append(&mut self, data: &[u8]) -> io::Result<usize> {
        self.f.write_all(data).await?;
        self.size += data.len() as u64;
        Ok(data.len())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.f.flush().await
    }

    async fn sync(&mut self) -> io::Result<()> {
        self.f.flush().await?;
        self.f.get_ref().sync_all().await
    }

    fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use crate::file::WritableFile;
    use crate::Writable;

    #[tokio::test]
    async fn test_writable_file_append_and_pad() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("000001");

        let mut f = WritableFile::create(&path).await?;
        f.append(b"head").await?;
        f.pad_to(8).await?;
        f.append(b"body").await?;
        assert_eq!(f.size(), 12);
        assert!(f.pad_to(4).await.is_err());
        f.close().await?;

        let data = tokio::fs::read(&path).await?;
        assert_eq!(data.as_slice(), b"head\0\0\0\0body");
        Ok(())
    }

    #[tokio::test]
    async fn test_writable_file_create_new() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("index");

        WritableFile::create(&path).await?.close().await?;
        assert!(WritableFile::create(&path).await.is_err());
        Ok(())
    }
}
