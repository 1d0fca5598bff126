//! QDataStream reader and writer
//!
//! Implements Qt's QDataStream binary format (version Qt_5_1 = 14) as far as
//! tdata needs it. All integers are Big Endian.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

use crate::{Error, Result};

/// Marker for null QByteArray
const NULL_MARKER: u32 = 0xFFFFFFFF;

/// Marker for extended 64-bit length (Qt 6.7+, not used in tdata)
const EXTENDED_LENGTH_MARKER: u32 = 0xFFFFFFFE;

/// QDataStream reader for parsing Qt binary serialization format
pub struct QDataStream<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> QDataStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Get current position in the stream
    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    /// Check if we've reached the end of the stream
    pub fn at_end(&self) -> bool {
        self.cursor.position() >= self.cursor.get_ref().len() as u64
    }

    /// Get remaining bytes count
    pub fn remaining(&self) -> usize {
        let pos = self.cursor.position() as usize;
        let len = self.cursor.get_ref().len();
        len.saturating_sub(pos)
    }

    fn eof(&self) -> Error {
        Error::UnexpectedEof {
            offset: self.position(),
        }
    }

    /// Read an unsigned 32-bit integer (quint32)
    pub fn read_u32(&mut self) -> Result<u32> {
        self.cursor
            .read_u32::<BigEndian>()
            .map_err(|_| self.eof())
    }

    /// Read a signed 32-bit integer (qint32)
    pub fn read_i32(&mut self) -> Result<i32> {
        self.cursor
            .read_i32::<BigEndian>()
            .map_err(|_| self.eof())
    }

    /// Read an unsigned 64-bit integer (quint64)
    pub fn read_u64(&mut self) -> Result<u64> {
        self.cursor
            .read_u64::<BigEndian>()
            .map_err(|_| self.eof())
    }

    /// Read a signed 64-bit integer (qint64)
    pub fn read_i64(&mut self) -> Result<i64> {
        self.cursor
            .read_i64::<BigEndian>()
            .map_err(|_| self.eof())
    }

    /// Read raw bytes of specified length
    pub fn read_raw(&mut self, len: usize) -> Result<Vec<u8>> {
        if self.remaining() < len {
            return Err(self.eof());
        }

        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|_| self.eof())?;
        Ok(buf)
    }

    /// Read a QByteArray
    ///
    /// Wire format:
    /// - 4 bytes: length (quint32 BE)
    ///   - 0xFFFFFFFF = null QByteArray (returns empty vec)
    ///   - 0xFFFFFFFE = extended 64-bit length (followed by quint64)
    /// - N bytes: raw data
    pub fn read_qbytearray(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()?;

        match len {
            NULL_MARKER => Ok(Vec::new()),
            EXTENDED_LENGTH_MARKER => {
                let real_len = self.read_u64()?;
                let real_len = usize::try_from(real_len)
                    .map_err(|_| Error::qdatastream("QByteArray length overflows usize"))?;
                self.read_raw(real_len)
            }
            _ => self.read_raw(len as usize),
        }
    }
}

/// QDataStream writer, the counterpart of [`QDataStream`]
#[derive(Debug, Default)]
pub struct QDataStreamWriter {
    buf: Vec<u8>,
}

impl QDataStreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    // Writes into a Vec<u8> cannot fail, so the io::Result is dropped.

    pub fn write_u32(&mut self, value: u32) -> &mut Self {
        let _ = self.buf.write_u32::<BigEndian>(value);
        self
    }

    pub fn write_i32(&mut self, value: i32) -> &mut Self {
        let _ = self.buf.write_i32::<BigEndian>(value);
        self
    }

    pub fn write_i64(&mut self, value: i64) -> &mut Self {
        let _ = self.buf.write_i64::<BigEndian>(value);
        self
    }

    /// Append bytes without a length prefix
    pub fn write_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Write a QByteArray (u32 length prefix, then data)
    ///
    /// An empty slice is written as an empty (not null) array.
    pub fn write_qbytearray(&mut self, data: &[u8]) -> &mut Self {
        self.write_u32(data.len() as u32);
        self.write_raw(data)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32() {
        let data = [0x12, 0x34, 0x56, 0x78];
        let mut stream = QDataStream::new(&data);
        assert_eq!(stream.read_u32().unwrap(), 0x12345678);
    }

    #[test]
    fn test_read_i32() {
        let data = [0xFF, 0xFF, 0xFF, 0xFE]; // -2 in big endian
        let mut stream = QDataStream::new(&data);
        assert_eq!(stream.read_i32().unwrap(), -2);
    }

    #[test]
    fn test_read_qbytearray() {
        let data = [0x00, 0x00, 0x00, 0x04, 0x01, 0x02, 0x03, 0x04];
        let mut stream = QDataStream::new(&data);
        assert_eq!(
            stream.read_qbytearray().unwrap(),
            vec![0x01, 0x02, 0x03, 0x04]
        );
        assert!(stream.at_end());
    }

    #[test]
    fn test_read_null_qbytearray() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut stream = QDataStream::new(&data);
        assert!(stream.read_qbytearray().unwrap().is_empty());
    }

    #[test]
    fn test_truncated_qbytearray() {
        let data = [0x00, 0x00, 0x00, 0x08, 0x01, 0x02];
        let mut stream = QDataStream::new(&data);
        assert!(matches!(
            stream.read_qbytearray(),
            Err(Error::UnexpectedEof { offset: 4 })
        ));
    }

    #[test]
    fn test_position_and_remaining() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        let mut stream = QDataStream::new(&data);

        assert_eq!(stream.position(), 0);
        assert_eq!(stream.remaining(), 5);

        stream.read_raw(1).unwrap();
        assert_eq!(stream.position(), 1);
        assert_eq!(stream.remaining(), 4);

        stream.read_raw(2).unwrap();
        assert_eq!(stream.position(), 3);
        assert_eq!(stream.remaining(), 2);
    }

    #[test]
    fn test_writer_layout() {
        let mut writer = QDataStreamWriter::new();
        writer.write_i32(-1).write_qbytearray(&[0xAA, 0xBB]);

        assert_eq!(
            writer.into_inner(),
            vec![0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x02, 0xAA, 0xBB]
        );
    }

    #[test]
    fn test_writer_output_is_readable() {
        let mut writer = QDataStreamWriter::new();
        writer
            .write_i64(-1)
            .write_i64(123_456_789_012)
            .write_i32(4)
            .write_qbytearray(b"");

        let data = writer.into_inner();
        let mut stream = QDataStream::new(&data);
        assert_eq!(stream.read_i64().unwrap(), -1);
        assert_eq!(stream.read_i64().unwrap(), 123_456_789_012);
        assert_eq!(stream.read_i32().unwrap(), 4);
        assert!(stream.read_qbytearray().unwrap().is_empty());
        assert!(stream.at_end());
    }
}
