//! Hex dump formatting for received payloads.

/// Formats bytes as a hex dump with offset, hex and ASCII columns.
pub fn format_hex_dump(data: &[u8]) -> String {
    if data.is_empty() {
        return String::from("(empty)");
    }

    let mut result = String::new();
    let mut offset = 0;

    for chunk in data.chunks(16) {
        result.push_str(&format!("{offset:08x}  "));

        for (i, byte) in chunk.iter().enumerate() {
            if i == 8 {
                result.push(' ');
            }
            result.push_str(&format!("{byte:02x} "));
        }

        let padding = 16 - chunk.len();
        for i in 0..padding {
            if chunk.len() + i == 8 {
                result.push(' ');
            }
            result.push_str("   ");
        }

        result.push_str(" |");
        for byte in chunk {
            if byte.is_ascii_graphic() || *byte == b' ' {
                result.push(*byte as char);
            } else {
                result.push('.');
            }
        }
        result.push('|');
        result.push('\n');

        offset += 16;
    }

    result.pop();
    result
}

/// Prints a titled hex dump of `data` to stdout.
pub fn print_dump(title: &str, data: &[u8]) {
    println!("{} ({} bytes):", title, data.len());
    println!("{}", format_hex_dump(data));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(format_hex_dump(&[]), "(empty)");
    }

    #[test]
    fn short_line() {
        let dump = format_hex_dump(b"Hi");
        assert!(dump.contains("48 69"));
        assert!(dump.contains("|Hi|"));
    }

    #[test]
    fn full_line() {
        let data: Vec<u8> = (0..16).collect();
        let dump = format_hex_dump(&data);
        assert!(dump.starts_with("00000000"));
        assert!(dump.contains("00 01 02 03 04 05 06 07  08 09 0a 0b 0c 0d 0e 0f"));
    }

    #[test]
    fn multiple_lines_carry_offsets() {
        let data: Vec<u8> = (0..20).collect();
        let dump = format_hex_dump(&data);
        assert!(dump.contains("00000000"));
        assert!(dump.contains("00000010"));
    }

    #[test]
    fn non_printable_bytes_become_dots() {
        let dump = format_hex_dump(&[0x00, b'a', 0xff]);
        assert!(dump.contains("|.a.|"));
    }
}
