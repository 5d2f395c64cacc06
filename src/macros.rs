/// Tries to read a little-endian primitive from the cursor, if reading fails, captures position nicely.
macro_rules! try_read {
    ($cursor: ident, read_u8, $what: expr) => {
        $cursor.read_u8().map_err(|e| {
            $crate::err::DeserializationError::FailedToRead {
                what: $what,
                offset: $cursor.position(),
                source: e,
            }
        })?
    };

    ($cursor: ident, $ty: ident, $what: expr) => {
        $cursor
            .$ty::<byteorder::LittleEndian>()
            .map_err(|e| $crate::err::DeserializationError::FailedToRead {
                what: $what,
                offset: $cursor.position(),
                source: e,
            })?
    };
}

/// Reads exactly `N` bytes into a fixed array.
macro_rules! try_read_array {
    ($cursor: ident, $len: expr, $what: expr) => {{
        let mut buf = [0_u8; $len];
        std::io::Read::read_exact(&mut *$cursor, &mut buf).map_err(|e| {
            $crate::err::DeserializationError::FailedToRead {
                what: $what,
                offset: $cursor.position(),
                source: e,
            }
        })?;
        buf
    }};
}
