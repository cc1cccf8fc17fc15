//! `wsgi.input` (§4.F, §6): a synchronous, in-memory view over a pre-buffered request
//! body. The body is drained asynchronously by the connection pipeline before the app
//! is invoked (see `pipeline::serve_one`), so every method here is a plain slice
//! operation — no blocking-on-async hazard, no socket access from app code at all.

use bytes::Bytes;
use memchr::memchr;

pub struct InputStream {
    data: Bytes,
    pos: usize,
}

impl InputStream {
    pub fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    pub fn len_remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// `read(size=-1)`: negative or overlong `size` reads whatever remains.
    pub fn read(&mut self, size: i64) -> Bytes {
        let remaining = self.len_remaining();
        let want = if size < 0 { remaining } else { (size as usize).min(remaining) };
        let chunk = self.data.slice(self.pos..self.pos + want);
        self.pos += want;
        chunk
    }

    /// `readline(size=-1)`: LF-terminated (LF included), `size` is an advisory cap.
    pub fn readline(&mut self, size: i64) -> Bytes {
        let remaining = &self.data[self.pos..];
        let cap = if size < 0 { remaining.len() } else { (size as usize).min(remaining.len()) };
        let window = &remaining[..cap];
        let end = memchr(b'\n', window).map(|i| i + 1).unwrap_or(cap);
        let chunk = self.data.slice(self.pos..self.pos + end);
        self.pos += end;
        chunk
    }

    /// `readlines(hint=-1)`: stop once the accumulated length reaches `hint`, same as
    /// CPython's file-object contract.
    pub fn readlines(&mut self, hint: i64) -> Vec<Bytes> {
        let mut out = Vec::new();
        let mut total = 0usize;
        while self.len_remaining() > 0 {
            let line = self.readline(-1);
            total += line.len();
            out.push(line);
            if hint >= 0 && total >= hint as usize {
                break;
            }
        }
        out
    }
}

impl Iterator for InputStream {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        if self.len_remaining() == 0 {
            return None;
        }
        Some(self.readline(-1))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn read_all_then_exhausted() {
        let mut input = InputStream::new(Bytes::from_static(b"hello"));
        assert_eq!(&input.read(-1)[..], b"hello");
        assert_eq!(&input.read(-1)[..], b"");
    }

    #[test]
    fn readline_keeps_terminator() {
        let mut input = InputStream::new(Bytes::from_static(b"a\nb\nc"));
        assert_eq!(&input.readline(-1)[..], b"a\n");
        assert_eq!(&input.readline(-1)[..], b"b\n");
        assert_eq!(&input.readline(-1)[..], b"c");
    }

    #[test]
    fn readlines_stops_at_hint() {
        let mut input = InputStream::new(Bytes::from_static(b"aa\nbb\ncc\n"));
        let lines = input.readlines(4);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn iterates_lines() {
        let input = InputStream::new(Bytes::from_static(b"a\nb\n"));
        let lines: Vec<_> = input.collect();
        assert_eq!(lines.len(), 2);
    }
}
