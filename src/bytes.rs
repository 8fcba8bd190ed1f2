use std::io;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use uuid::Uuid;

/// Field-level wire serialization. Every multi-byte integer in this protocol
/// is big-endian.
pub trait Bytes: Sized {
    fn write(&self, writer: &mut impl WriteBytesExt) -> Result<(), io::Error>;
    fn read(reader: &mut impl ReadBytesExt) -> Result<Self, io::Error>;
}

impl Bytes for Uuid {
    fn write(&self, writer: &mut impl WriteBytesExt) -> Result<(), io::Error> {
        writer.write_all(self.as_bytes())
    }

    fn read(reader: &mut impl ReadBytesExt) -> Result<Self, io::Error> {
        let mut buf = [0u8; 16];
        reader.read_exact(&mut buf)?;
        Ok(Uuid::from_bytes(buf))
    }
}

/// Length-prefixed string: i32 length followed by the raw bytes, no
/// terminator.
pub fn write_string(writer: &mut impl WriteBytesExt, s: &str) -> Result<(), io::Error> {
    writer.write_i32::<BigEndian>(s.len() as i32)?;
    writer.write_all(s.as_bytes())
}

pub fn read_string(reader: &mut impl ReadBytesExt) -> Result<String, io::Error> {
    let len = reader.read_i32::<BigEndian>()?;
    if len < 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "negative string length",
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
