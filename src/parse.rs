//! Sample readers over byte-ordered streams.

use std::io::Error as IOError;

use byteordered::{byteorder::ReadBytesExt, ByteOrdered, Endian};

/// A fixed-width value that can be read from a byte stream.
pub(crate) trait Parseable: Sized {
    type Error;
    fn parse<T: ReadBytesExt, E: Endian>(r: &mut ByteOrdered<T, E>) -> Result<Self, Self::Error>;
}

macro_rules! impl_parseable {
    ($ty:ty, $method:ident) => {
        impl Parseable for $ty {
            type Error = IOError;
            fn parse<T: ReadBytesExt, E: Endian>(
                r: &mut ByteOrdered<T, E>,
            ) -> Result<Self, IOError> {
                r.$method()
            }
        }
    };
}

impl_parseable!(u8, read_u8);
impl_parseable!(u16, read_u16);

/// Read `count` little-endian values from `bytes`.
pub(crate) fn parse_le_samples<S>(bytes: &[u8], count: usize) -> Result<Vec<S>, IOError>
where
    S: Parseable<Error = IOError>,
{
    let mut rdr = ByteOrdered::le(bytes);
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(S::parse(&mut rdr)?);
    }
    Ok(out)
}
