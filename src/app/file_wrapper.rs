//! `wsgi.file_wrapper` (§4.F, §6): iterates fixed-size blocks from any readable file,
//! closing it once iteration is exhausted.

use std::fs::File;
use std::io::Read;

use bytes::Bytes;

pub struct FileWrapper {
    file: Option<File>,
    block_size: usize,
}

impl FileWrapper {
    pub fn new(file: File, block_size: usize) -> Self {
        Self { file: Some(file), block_size: block_size.max(1) }
    }
}

impl Iterator for FileWrapper {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        let file = self.file.as_mut()?;
        let mut block = vec![0u8; self.block_size];
        match file.read(&mut block) {
            Ok(0) | Err(_) => {
                self.file.take();
                None
            }
            Ok(n) => {
                block.truncate(n);
                Some(Bytes::from(block))
            }
        }
    }
}
