use std::io::{self, ErrorKind, Read, Write};

/// Largest chunk moved per read/write pair.
pub(crate) const CHUNK_LEN: usize = i16::MAX as usize;

/// Copy `input` from its current position to its end into `output` at
/// `output`'s current position. Returns the number of bytes copied.
pub fn copy_stream<R, W>(input: &mut R, output: &mut W) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; CHUNK_LEN];
    copy_stream_with(input, output, &mut buf)
}

/// [`copy_stream`] through a caller-owned scratch buffer, so repeated copies
/// don't allocate. The buffer's length is the chunk size.
pub fn copy_stream_with<R, W>(input: &mut R, output: &mut W, buf: &mut [u8]) -> io::Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    if buf.is_empty() {
        return Err(io::Error::new(ErrorKind::InvalidInput, "empty copy buffer"));
    }
    let mut total = 0u64;
    loop {
        let n = match input.read(buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        output.write_all(&buf[..n])?;
        total += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Seek, SeekFrom};

    fn pattern() -> Vec<u8> {
        (0..u16::MAX as usize).map(|i| (i % 0x7E) as u8).collect()
    }

    #[test]
    fn copies_from_current_positions_in_memory() {
        let expected = pattern();
        let mut input = Cursor::new(expected.clone());
        let mut output = Cursor::new(Vec::new());
        output.write_all(&[0xFF]).expect("lead byte");

        let count = copy_stream(&mut input, &mut output).expect("copy");

        assert_eq!(count, expected.len() as u64);
        let actual = output.into_inner();
        assert_eq!(actual[0], 0xFF);
        assert_eq!(&actual[1..], &expected[..]);
    }

    #[test]
    fn copies_only_the_tail_after_a_seek() {
        let expected = pattern();
        let mut input = Cursor::new(expected.clone());
        input.seek(SeekFrom::Start(100)).expect("seek");
        let mut output = Vec::new();

        let count = copy_stream(&mut input, &mut output).expect("copy");

        assert_eq!(count, expected.len() as u64 - 100);
        assert_eq!(&output[..], &expected[100..]);
    }

    #[test]
    fn copies_between_files() {
        let expected = pattern();
        let mut input = tempfile::tempfile().expect("input file");
        input.write_all(&expected).expect("fill input");
        input.seek(SeekFrom::Start(0)).expect("rewind input");

        let mut output = tempfile::tempfile().expect("output file");
        output.write_all(&[0]).expect("lead byte");

        let count = copy_stream(&mut input, &mut output).expect("copy");
        assert_eq!(count, expected.len() as u64);

        let mut actual = Vec::new();
        output.seek(SeekFrom::Start(0)).expect("rewind output");
        output.read_to_end(&mut actual).expect("read back");
        assert_eq!(actual.len(), expected.len() + 1);
        assert_eq!(actual[0], 0);
        assert_eq!(&actual[1..], &expected[..]);
    }

    #[test]
    fn empty_input_copies_nothing() {
        let mut input = Cursor::new(Vec::<u8>::new());
        let mut output = Vec::new();
        assert_eq!(copy_stream(&mut input, &mut output).expect("copy"), 0);
        assert!(output.is_empty());
    }

    #[test]
    fn small_scratch_buffer_copies_everything() {
        let expected = pattern();
        let mut input = Cursor::new(expected.clone());
        let mut output = Vec::new();
        let mut buf = [0u8; 7];

        let count = copy_stream_with(&mut input, &mut output, &mut buf).expect("copy");

        assert_eq!(count, expected.len() as u64);
        assert_eq!(output, expected);
    }

    #[test]
    fn empty_scratch_buffer_is_rejected() {
        let mut input = Cursor::new(vec![1u8, 2, 3]);
        let mut output = Vec::new();
        let err = copy_stream_with(&mut input, &mut output, &mut []).expect_err("empty buffer");
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(input.position(), 0);
    }
}
