use std::fmt;
use std::io;

/// Routes machine output to an `io::Write`.
///
/// `fmt::Error` carries no detail, so the first I/O error is kept here for
/// the caller to report.
pub struct Console<W: io::Write> {
    inner: W,
    error: Option<io::Error>,
}

impl<W: io::Write> Console<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, error: None }
    }

    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> fmt::Write for Console<W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_all(s.as_bytes()).map_err(|err| {
            if self.error.is_none() {
                self.error = Some(err);
            }
            fmt::Error
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fmt::Write;

    struct Closed;

    impl io::Write for Closed {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn forwards_text() -> fmt::Result {
        let mut console = Console::new(Vec::new());
        write!(console, "{}\n", 42)?;
        console.write_char('x')?;
        assert_eq!(console.into_inner(), b"42\nx");
        Ok(())
    }

    #[test]
    fn keeps_the_io_error() {
        let mut console = Console::new(Closed);
        assert!(console.write_str("hi").is_err());
        let err = console.take_error();
        assert_eq!(err.map(|err| err.kind()), Some(io::ErrorKind::BrokenPipe));
    }
}
