// src/tokenizer/scripts.rs

/// Unicode scripts the `UnicodeScripts` pre-tokenizer distinguishes.
///
/// `Any` marks characters that never start a new piece (spaces and combining
/// marks), everything outside the table below is `Common`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Script {
    Any,
    Common,
    Latin,
    Greek,
    Cyrillic,
    Armenian,
    Hebrew,
    Arabic,
    Devanagari,
    Bengali,
    Thai,
    Georgian,
    Hangul,
    Hiragana,
    Katakana,
    Han,
    Ethiopic,
    Inherited,
}

// Sorted, non-overlapping, inclusive ranges.
const SCRIPT_RANGES: &[(u32, u32, Script)] = &[
    (0x0041, 0x005A, Script::Latin),
    (0x0061, 0x007A, Script::Latin),
    (0x00AA, 0x00AA, Script::Latin),
    (0x00BA, 0x00BA, Script::Latin),
    (0x00C0, 0x00D6, Script::Latin),
    (0x00D8, 0x00F6, Script::Latin),
    (0x00F8, 0x024F, Script::Latin),
    (0x0250, 0x02AF, Script::Latin),
    (0x0300, 0x036F, Script::Inherited),
    (0x0370, 0x0373, Script::Greek),
    (0x0375, 0x0377, Script::Greek),
    (0x037A, 0x037D, Script::Greek),
    (0x037F, 0x037F, Script::Greek),
    (0x0384, 0x0384, Script::Greek),
    (0x0386, 0x0386, Script::Greek),
    (0x0388, 0x03E1, Script::Greek),
    (0x03F0, 0x03FF, Script::Greek),
    (0x0400, 0x0484, Script::Cyrillic),
    (0x0485, 0x0486, Script::Inherited),
    (0x0487, 0x052F, Script::Cyrillic),
    (0x0531, 0x0556, Script::Armenian),
    (0x0559, 0x058A, Script::Armenian),
    (0x058D, 0x058F, Script::Armenian),
    (0x0591, 0x05C7, Script::Hebrew),
    (0x05D0, 0x05EA, Script::Hebrew),
    (0x05EF, 0x05F4, Script::Hebrew),
    (0x0600, 0x0604, Script::Arabic),
    (0x0606, 0x060B, Script::Arabic),
    (0x060D, 0x061A, Script::Arabic),
    (0x061C, 0x061E, Script::Arabic),
    (0x0620, 0x063F, Script::Arabic),
    (0x0641, 0x064A, Script::Arabic),
    (0x064B, 0x0655, Script::Inherited),
    (0x0656, 0x066F, Script::Arabic),
    (0x0671, 0x06DC, Script::Arabic),
    (0x06DE, 0x06FF, Script::Arabic),
    (0x0750, 0x077F, Script::Arabic),
    (0x0900, 0x0950, Script::Devanagari),
    (0x0951, 0x0954, Script::Inherited),
    (0x0955, 0x0963, Script::Devanagari),
    (0x0966, 0x097F, Script::Devanagari),
    (0x0980, 0x09FE, Script::Bengali),
    (0x0E01, 0x0E3A, Script::Thai),
    (0x0E40, 0x0E5B, Script::Thai),
    (0x10A0, 0x10FA, Script::Georgian),
    (0x10FC, 0x10FF, Script::Georgian),
    (0x1100, 0x11FF, Script::Hangul),
    (0x1200, 0x139F, Script::Ethiopic),
    (0x1AB0, 0x1AFF, Script::Inherited),
    (0x1C90, 0x1CBF, Script::Georgian),
    (0x1DC0, 0x1DFF, Script::Inherited),
    (0x1E00, 0x1EFF, Script::Latin),
    (0x1F00, 0x1FFE, Script::Greek),
    (0x200C, 0x200D, Script::Inherited),
    (0x20D0, 0x20F0, Script::Inherited),
    (0x2C60, 0x2C7F, Script::Latin),
    (0x2D00, 0x2D2D, Script::Georgian),
    (0x2D80, 0x2DDE, Script::Ethiopic),
    (0x2E80, 0x2FD5, Script::Han),
    (0x3005, 0x3005, Script::Han),
    (0x3007, 0x3007, Script::Han),
    (0x3021, 0x3029, Script::Han),
    (0x302A, 0x302D, Script::Inherited),
    (0x3038, 0x303B, Script::Han),
    (0x3041, 0x3096, Script::Hiragana),
    (0x3099, 0x309A, Script::Inherited),
    (0x309D, 0x309F, Script::Hiragana),
    (0x30A1, 0x30FA, Script::Katakana),
    (0x30FD, 0x30FF, Script::Katakana),
    (0x3131, 0x318E, Script::Hangul),
    (0x31F0, 0x31FF, Script::Katakana),
    (0x3400, 0x4DBF, Script::Han),
    (0x4E00, 0x9FFF, Script::Han),
    (0xA640, 0xA69F, Script::Cyrillic),
    (0xA720, 0xA721, Script::Common),
    (0xA722, 0xA7FF, Script::Latin),
    (0xA960, 0xA97C, Script::Hangul),
    (0xAB30, 0xAB6F, Script::Latin),
    (0xAC00, 0xD7A3, Script::Hangul),
    (0xD7B0, 0xD7FB, Script::Hangul),
    (0xF900, 0xFAFF, Script::Han),
    (0xFB00, 0xFB06, Script::Latin),
    (0xFB1D, 0xFB4F, Script::Hebrew),
    (0xFB50, 0xFDFF, Script::Arabic),
    (0xFE00, 0xFE0F, Script::Inherited),
    (0xFE20, 0xFE2D, Script::Inherited),
    (0xFE70, 0xFEFC, Script::Arabic),
    (0xFF21, 0xFF3A, Script::Latin),
    (0xFF41, 0xFF5A, Script::Latin),
    (0xFF66, 0xFF6F, Script::Katakana),
    (0xFF71, 0xFF9D, Script::Katakana),
    (0xFFA0, 0xFFDC, Script::Hangul),
    (0x20000, 0x2A6DF, Script::Han),
    (0x2A700, 0x2EBE0, Script::Han),
    (0x30000, 0x3134A, Script::Han),
];

pub fn get_script(c: char) -> Script {
    let cp = c as u32;
    let idx = SCRIPT_RANGES.partition_point(|(_, end, _)| *end < cp);
    match SCRIPT_RANGES.get(idx) {
        Some((start, _, script)) if *start <= cp => *script,
        _ => Script::Common,
    }
}
