mod writable_file;

pub use writable_file::WritableFile;
