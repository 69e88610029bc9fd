//! Positional reads and writes against caller supplied byte sources and sinks.
use std::io::{Read, Seek, SeekFrom, Write};

/// Fill `buf` from `data`, stopping early only at end of stream.
///
/// Returns `(eof, len)` where `len` is how much of `buf` was filled.
pub fn fill_buf<R: Read>(data: &mut R, buf: &mut [u8]) -> std::io::Result<(bool, usize)> {
    let mut buf_read = 0;

    while buf_read < buf.len() {
        match data.read(&mut buf[buf_read..]) {
            Ok(0) => return Ok((true, buf_read)),
            Ok(x) => buf_read += x,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
    }
    Ok((false, buf_read))
}

/// Read up to `len` bytes starting at `offset`, fewer if the source ends first.
pub fn read_at<S: Read + Seek>(source: &mut S, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
    source.seek(SeekFrom::Start(offset))?;

    let mut data = vec![0u8; len];
    let (_, read) = fill_buf(source, &mut data)?;
    data.truncate(read);
    Ok(data)
}

/// Write all of `data` at absolute position `offset`.
pub fn write_at<W: Write + Seek>(sink: &mut W, offset: u64, data: &[u8]) -> std::io::Result<()> {
    sink.seek(SeekFrom::Start(offset))?;
    sink.write_all(data)
}

#[cfg(test)]
mod test_fill_buf {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn short_source_hits_eof() {
        let mut in_buf = Cursor::new(vec![1u8, 2]);
        let mut buf = [0u8; 4];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (true, 2));
        assert_eq!(&buf[..2], &[1, 2]);
    }

    #[test]
    fn long_source_fills_buffer() {
        let mut in_buf = Cursor::new(vec![1u8, 2, 3, 4]);
        let mut buf = [0u8; 2];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (false, 2));
        assert_eq!(in_buf.position(), 2);
    }

    // Fails with Interrupted on the first read only
    struct Flaky {
        inner: Cursor<Vec<u8>>,
        interrupted: bool,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(std::io::ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    #[test]
    fn interrupted_read_is_retried() {
        let mut in_buf = Flaky {
            inner: Cursor::new(vec![5, 6, 7]),
            interrupted: false,
        };
        let mut buf: [u8; 4] = [0; 4];

        assert_eq!(fill_buf(&mut in_buf, &mut buf).unwrap(), (true, 3));
        assert!(in_buf.interrupted);
        assert_eq!(&buf, &[5, 6, 7, 0]);
    }

    #[test]
    fn other_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
            }
        }

        let mut buf: [u8; 2] = [0; 2];
        let err = fill_buf(&mut Broken, &mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}

#[cfg(test)]
mod test_positional {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn read_middle() {
        let mut source = Cursor::new((0u8..10).collect::<Vec<u8>>());
        assert_eq!(read_at(&mut source, 3, 4).unwrap(), vec![3, 4, 5, 6]);
    }

    #[test]
    fn read_past_end_is_short() {
        let mut source = Cursor::new((0u8..10).collect::<Vec<u8>>());
        assert_eq!(read_at(&mut source, 8, 4).unwrap(), vec![8, 9]);
        assert_eq!(read_at(&mut source, 20, 4).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn write_out_of_order() {
        let mut sink = Cursor::new(Vec::new());
        write_at(&mut sink, 4, &[5, 6]).unwrap();
        write_at(&mut sink, 0, &[1, 2, 3, 4]).unwrap();

        assert_eq!(sink.into_inner(), vec![1, 2, 3, 4, 5, 6]);
    }
}
