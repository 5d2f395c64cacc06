use std::fmt::{self, Write};

const BYTES_PER_LINE: usize = 16;

/// Renders `data` in canonical hex+ASCII form (`hexdump -C`).
///
/// With `elide`, runs of identical lines collapse into a single `*` line.
pub fn hexdump(data: &[u8], elide: bool) -> String {
    let mut out = String::with_capacity((data.len() / BYTES_PER_LINE + 1) * 80);
    write_hexdump(&mut out, data, elide).expect("writing to a String cannot fail");
    out
}

pub fn write_hexdump<W: Write>(out: &mut W, data: &[u8], elide: bool) -> fmt::Result {
    let mut previous: Option<&[u8]> = None;
    let mut eliding = false;

    for (i, line) in data.chunks(BYTES_PER_LINE).enumerate() {
        if elide && previous == Some(line) {
            if !eliding {
                writeln!(out, "*")?;
                eliding = true;
            }
            continue;
        }

        eliding = false;
        write_line(out, line, i * BYTES_PER_LINE)?;
        previous = Some(line);
    }

    Ok(())
}

fn write_line<W: Write>(out: &mut W, line: &[u8], address: usize) -> fmt::Result {
    // print address (ex - 000000d0)
    write!(out, "{:08x} ", address)?;

    for i in 0..BYTES_PER_LINE {
        if i % 8 == 0 {
            out.write_char(' ')?;
        }
        match line.get(i) {
            Some(b) => write!(out, "{:02x} ", b)?,
            None => out.write_str("   ")?,
        }
    }

    // print ASCII repr, replacing everything unprintable with dots
    out.write_str(" |")?;
    for &c in line {
        let c = if c.is_ascii_graphic() || c == b' ' {
            c as char
        } else {
            '.'
        };
        out.write_char(c)?;
    }
    out.write_str("|\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_full_line_layout() {
        let data: Vec<u8> = (0x41..0x51).collect();
        assert_eq!(
            hexdump(&data, false),
            "00000000  41 42 43 44 45 46 47 48  49 4a 4b 4c 4d 4e 4f 50  |ABCDEFGHIJKLMNOP|\n"
        );
    }

    #[test]
    fn test_short_line_keeps_ascii_column_aligned() {
        let dump = hexdump(&[0x00, 0x00, 0x01, 0x00], false);
        assert!(dump.starts_with("00000000  00 00 01 00 "));
        assert_eq!(dump.find('|'), Some(60));
        assert!(dump.ends_with("|....|\n"));
    }

    #[test]
    fn test_elides_repeated_lines() {
        let mut data = vec![0xFF; 64];
        data.extend_from_slice(b"tail");

        let dump = hexdump(&data, true);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("00000000  ff ff"));
        assert_eq!(lines[1], "*");
        assert!(lines[2].starts_with("00000040  74 61 69 6c"));

        assert_eq!(hexdump(&data, false).lines().count(), 5);
    }

    #[test]
    fn test_empty_input_renders_nothing() {
        assert_eq!(hexdump(&[], true), "");
    }
}
