// 8.3 short name generation
// Mirrors the console's FAT driver: the numeric tail is only used when the
// long name cannot be represented exactly

use nandgen_core::{NandGenError, Result};

use super::constants::*;

/// Characters allowed in a short name besides A-Z and 0-9
const SHORT_NAME_SYMBOLS: &str = "$%'-_@~`!(){}^#&";

fn is_short_name_char(ch: char) -> bool {
    ch.is_ascii_uppercase()
        || ch.is_ascii_digit()
        || SHORT_NAME_SYMBOLS.contains(ch)
        || ('\u{80}'..='\u{FF}').contains(&ch)
}

/// Split a file name into stem and extension at the last dot.
///
/// A trailing dot yields an empty extension. A name that is all extension
/// (".profile") is returned whole as the stem, dot included.
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) => (name, ""),
        Some(dot) if dot + 1 == name.len() => (&name[..dot], ""),
        Some(dot) => (&name[..dot], &name[dot + 1..]),
        None => (name, ""),
    }
}

/// Result of sanitising one half of a name
struct Sanitized {
    text: Vec<u8>,
    lossy: bool,
}

/// Uppercase `part`, drop spaces (and dots when `strip_dots`), replace
/// anything else a short name can't hold with '_', then cut to `max_len`
fn sanitize(part: &str, strip_dots: bool, max_len: usize) -> Sanitized {
    let mut lossy = false;
    let mut text = Vec::with_capacity(part.len());

    for ch in part.to_uppercase().chars() {
        if ch == ' ' || (strip_dots && ch == '.') {
            lossy = true;
        } else if is_short_name_char(ch) {
            text.push(ch as u32 as u8);
        } else {
            lossy = true;
            text.push(b'_');
        }
    }

    if text.len() > max_len {
        lossy = true;
        text.truncate(max_len);
    }

    Sanitized { text, lossy }
}

/// Pack a stem and extension into the space-padded 11-byte on-disk form
pub fn pack_short_name(base: &[u8], ext: &[u8]) -> [u8; SHORT_NAME_LEN] {
    let mut packed = [b' '; SHORT_NAME_LEN];
    let base_len = base.len().min(SHORT_BASE_LEN);
    let ext_len = ext.len().min(SHORT_EXT_LEN);
    packed[..base_len].copy_from_slice(&base[..base_len]);
    packed[SHORT_BASE_LEN..SHORT_BASE_LEN + ext_len].copy_from_slice(&ext[..ext_len]);
    packed
}

/// Pick the short name for `long_name` given the short names already present
/// in the target directory.
///
/// Names that survive sanitising unchanged are used as-is. Anything lossy gets
/// the lowest `~N` tail that doesn't collide with a sibling.
pub fn generate_short_name(
    long_name: &str,
    siblings: &[[u8; SHORT_NAME_LEN]],
) -> Result<[u8; SHORT_NAME_LEN]> {
    short_name_avoiding(long_name, |candidate| siblings.contains(candidate))
}

/// Short name for `long_name` whose tailed candidates are rejected while
/// `is_taken` holds
fn short_name_avoiding<F>(long_name: &str, is_taken: F) -> Result<[u8; SHORT_NAME_LEN]>
where
    F: Fn(&[u8; SHORT_NAME_LEN]) -> bool,
{
    let (stem, ext) = split_extension(long_name);
    let base = sanitize(stem, true, SHORT_BASE_LEN);
    let ext = sanitize(ext, true, SHORT_EXT_LEN);

    if !base.lossy && !ext.lossy {
        return Ok(pack_short_name(&base.text, &ext.text));
    }

    let mut suffix = 1u32;
    loop {
        let tail = format!("~{}", suffix);
        if tail.len() - 1 > MAX_SUFFIX_DIGITS {
            return Err(NandGenError::ShortNameSuffixExhausted(long_name.to_string()));
        }

        let keep = base.text.len().min(SHORT_BASE_LEN - tail.len());
        let mut candidate_base = base.text[..keep].to_vec();
        candidate_base.extend_from_slice(tail.as_bytes());
        let candidate = pack_short_name(&candidate_base, &ext.text);

        if !is_taken(&candidate) {
            return Ok(candidate);
        }
        suffix += 1;
    }
}

/// Render an 11-byte short name as "BASE.EXT", mapping bytes as Latin-1
pub fn display_short_name(short_name: &[u8; SHORT_NAME_LEN]) -> String {
    let latin1 = |bytes: &[u8]| -> String { bytes.iter().map(|&b| b as char).collect() };
    let base = latin1(&short_name[..SHORT_BASE_LEN]);
    let ext = latin1(&short_name[SHORT_BASE_LEN..]);
    let (base, ext) = (base.trim_end(), ext.trim_end());
    if ext.is_empty() {
        base.to_string()
    } else {
        format!("{}.{}", base, ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short(name: &str) -> [u8; 11] {
        generate_short_name(name, &[]).unwrap()
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("file.txt"), ("file", "txt"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", "gz"));
        assert_eq!(split_extension("noext"), ("noext", ""));
        assert_eq!(split_extension("trailing."), ("trailing", ""));
        assert_eq!(split_extension(".profile"), (".profile", ""));
    }

    #[test]
    fn test_exact_names_kept() {
        assert_eq!(&short("title.tmd"), b"TITLE   TMD");
        assert_eq!(&short("00000000.app"), b"00000000APP");
        assert_eq!(&short("sys"), b"SYS        ");
    }

    #[test]
    fn test_lossy_names_get_tail() {
        assert_eq!(&short("a file 1.txt"), b"AFILE1~1TXT");
        assert_eq!(&short("verylongname.bin"), b"VERYLO~1BIN");
        assert_eq!(&short("data.jpeg"), b"DATA~1  JPE");
        assert_eq!(&short("a+b.txt"), b"A_B~1   TXT");
        assert_eq!(&short("archive.tar.gz"), b"ARCHIV~1GZ ");
        assert_eq!(&short(".profile"), b"PROFIL~1   ");
    }

    #[test]
    fn test_tail_skips_existing_siblings() {
        let mut siblings: Vec<[u8; 11]> = Vec::new();
        for expected in [b"AFILE1~1TXT", b"AFILE1~2TXT", b"AFILE1~3TXT"] {
            let name = generate_short_name("a file 1.txt", &siblings).unwrap();
            assert_eq!(&name, expected);
            siblings.push(name);
        }
    }

    #[test]
    fn test_tail_shrinks_base_for_more_digits() {
        let mut siblings: Vec<[u8; 11]> = (1..=9)
            .map(|n| pack_short_name(format!("LONGNA~{}", n).as_bytes(), b"BIN"))
            .collect();
        siblings.push(*b"LONGN~10BIN");
        let name = generate_short_name("longname here.bin", &siblings).unwrap();
        assert_eq!(&name, b"LONGN~11BIN");
    }

    #[test]
    fn test_extension_is_sanitized_like_the_base() {
        assert_eq!(&short("file.c+"), b"FILE~1  C_ ");
        assert_eq!(&short("notes.t t"), b"NOTES~1 TT ");
    }

    #[test]
    fn test_latin1_characters_stored_raw() {
        assert_eq!(short("caf\u{e9}.txt"), *b"CAF\xC9    TXT");
        assert_eq!(&short("\u{3b1}.txt"), b"_~1     TXT");
    }

    #[test]
    fn test_six_digit_tail_is_the_last_one_tried() {
        let name = short_name_avoiding("a b.txt", |candidate| candidate != b"A~999999TXT").unwrap();
        assert_eq!(&name, b"A~999999TXT");
    }

    #[test]
    fn test_suffixes_exhausted() {
        let result = short_name_avoiding("a b.txt", |_| true);
        match result {
            Err(NandGenError::ShortNameSuffixExhausted(name)) => assert_eq!(name, "a b.txt"),
            other => panic!("expected exhausted suffixes, got {:?}", other),
        }
        // names that need no tail never consult the siblings
        assert_eq!(&short_name_avoiding("ab.txt", |_| true).unwrap(), b"AB      TXT");
    }

    #[test]
    fn test_display() {
        assert_eq!(display_short_name(b"TITLE   TMD"), "TITLE.TMD");
        assert_eq!(display_short_name(b"..         "), "..");
    }
}
