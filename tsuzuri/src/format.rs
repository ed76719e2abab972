//! バイナリ辞書形式の定数。
//!
//! 書き込み側と読み込み側で共有される、マジックナンバー・セクション ID・
//! ノード配列のエンコーディング定数を定義します。read/write の実装は
//! サブモジュールにあります。

pub(crate) mod read;
pub(crate) mod write;

/// .spl ファイル先頭の 8 バイト。
pub const SPELL_MAGIC: &[u8; 8] = b"VIMspell";
/// .spl 形式のバージョン。
pub const SPELL_VERSION: u8 = 50;
/// .sug ファイル先頭の 6 バイト。
pub const SUG_MAGIC: &[u8; 6] = b"VIMsug";
/// .sug 形式のバージョン。
pub const SUG_VERSION: u8 = 1;

// セクション ID。<sectionID> <sectionflags> <sectionlen> <中身> の並びで
// SN_END まで続きます。
pub const SN_REGION: u8 = 0;
pub const SN_CHARFLAGS: u8 = 1;
pub const SN_MIDWORD: u8 = 2;
pub const SN_PREFCOND: u8 = 3;
pub const SN_REP: u8 = 4;
pub const SN_SAL: u8 = 5;
pub const SN_SOFO: u8 = 6;
pub const SN_MAP: u8 = 7;
pub const SN_COMPOUND: u8 = 8;
pub const SN_SYLLABLE: u8 = 9;
pub const SN_NOBREAK: u8 = 10;
pub const SN_SUGFILE: u8 = 11;
pub const SN_REPSAL: u8 = 12;
pub const SN_WORDS: u8 = 13;
pub const SN_NOSPLITSUGS: u8 = 14;
pub const SN_INFO: u8 = 15;
pub const SN_NOCOMPOUNDSUGS: u8 = 16;
pub const SN_END: u8 = 255;

/// セクションフラグ: 理解できない場合に読み込みを失敗させる。
pub const SNF_REQUIRED: u8 = 1;

// ノード配列内の特殊バイト値。
/// フラグも地域もない語の終端。
pub const BY_NOFLAGS: u8 = 0;
/// 子が共有されている。3 バイトのインデックスが続く。
pub const BY_INDEX: u8 = 1;
/// 語の終端。<flags> が続く。
pub const BY_FLAGS: u8 = 2;
/// 語の終端。<flags> と <flags2> が続く。
pub const BY_FLAGS2: u8 = 3;
/// 特殊バイトの最大値。
pub const BY_SPECIAL: u8 = BY_FLAGS2;

// SN_SAL の <salflags> ビット。
pub const SAL_F0LLOWUP: u8 = 1;
pub const SAL_COLLAPSE: u8 = 2;
pub const SAL_REM_ACCENTS: u8 = 4;

// SN_CHARFLAGS の文字フラグ。
pub const CF_WORD: u8 = 0x01;
pub const CF_UPPER: u8 = 0x02;

/// 読み込み時に idxs[] で「共有ノードへの参照」を区別する一時ビット。
pub(crate) const SHARED_MASK: u32 = 0x0800_0000;
