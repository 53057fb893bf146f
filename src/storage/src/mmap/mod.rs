use std::io::ErrorKind;
use std::path::Path;
use std::{io, ptr};

use memmap2::{Mmap, MmapOptions};
use tokio::fs::File;

use crate::RandomAccessFile;

/// MmapReadableFile maps a sealed file read-only. An empty file is kept without a mapping.
pub struct MmapReadableFile {
    f: File,
    len: usize,
    mmap: Option<Mmap>,
}

impl MmapReadableFile {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let f = File::open(path).await?;

        let meta = f.metadata().await?;
        let len = meta.len() as usize;

        let mmap = if len == 0 {
            None
        } else {
            Some(unsafe { MmapOptions::new().offset(0).len(len).map(&f)? })
        };

        Ok(Self { f, len, mmap })
    }
}

#[async_trait]
impl RandomAccessFile for MmapReadableFile {
    async fn read(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let size = buf.len();
        if size == 0 {
            return Ok(0);
        }

        let offset = offset as usize;
        let upper = offset + size;
        let mmap = match &self.mmap {
            Some(mmap) if upper <= self.len => mmap,
            _ => {
                return Err(io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("read [{}, {}) beyond file size {}", offset, upper, self.len),
                ))
            }
        };

        let data = &mmap[offset..upper];
        unsafe {
            ptr::copy(data.as_ptr(), buf.as_mut_ptr(), size);
        }

        Ok(size)
    }

    fn size(&self) -> u64 {
        self.len as u64
    }

    async fn close(self) -> io::Result<()> {
        drop(self.mmap);
        drop(self.f);
        Ok(())
    }
}
