#[macro_use]
extern crate async_trait;

use std::io;

pub mod file;
pub mod mmap;

/// Writable is an append-only sink. Bytes land in the order `append` is called and the
/// write position only moves forward.
#[async_trait]
pub trait Writable: Send {
    async fn append(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Pads the sink with zero bytes until its size reaches `offset`.
    async fn pad_to(&mut self, offset: u64) -> io::Result<()> {
        let size = self.size();
        if offset < size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("pad offset {} is behind write position {}", offset, size),
            ));
        }

        const ZEROS: [u8; 64] = [0; 64];
        let mut remaining = (offset - size) as usize;
        while remaining > 0 {
            let n = remaining.min(ZEROS.len());
            self.append(&ZEROS[..n]).await?;
            remaining -= n;
        }
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()>;

    async fn sync(&mut self) -> io::Result<()>;

    /// size returns the number of bytes appended so far.
    fn size(&self) -> u64;
}

#[async_trait]
pub trait RandomAccessFile: Send + Sync {
    async fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;
    fn size(&self) -> u64;
    async fn close(self) -> io::Result<()>;
}

#[async_trait]
pub trait RandomAccessFileExt: RandomAccessFile {
    async fn read_u8(&self, offset: u64) -> io::Result<u8> {
        let mut buf = [0; 1];
        self.read(offset, &mut buf).await?;
        Ok(buf[0])
    }

    async fn read_u32(&self, offset: u64) -> io::Result<u32> {
        let mut buf = [0; 4];
        self.read(offset, &mut buf).await?;
        Ok(u32::from_be_bytes(buf))
    }

    async fn read_u64(&self, offset: u64) -> io::Result<u64> {
        let mut buf = [0; 8];
        self.read(offset, &mut buf).await?;
        Ok(u64::from_be_bytes(buf))
    }

    /// read_vec reads up to `len` bytes at `offset`, stopping early at the end of the file.
    async fn read_vec(&self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let available = self.size().saturating_sub(offset) as usize;
        let mut buf = vec![0_u8; len.min(available)];
        self.read(offset, &mut buf).await?;
        Ok(buf)
    }
}

impl<R: RandomAccessFile + ?Sized> RandomAccessFileExt for R {}
