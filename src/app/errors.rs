//! `wsgi.errors` (§4.F, §6): writes forwarded to the host's error log rather than a raw
//! stderr handle, matching this crate's tracing-based ambient logging instead of the
//! original's bare `std::cerr`.

#[derive(Clone, Copy, Default)]
pub struct ErrorStream;

impl ErrorStream {
    pub fn write(&self, message: &str) {
        tracing::error!(target: "wsgi_boost::app", "{message}");
    }

    pub fn writelines(&self, lines: &[String]) {
        for line in lines {
            self.write(line);
        }
    }

    pub fn flush(&self) {}
}
