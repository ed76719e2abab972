//! コンパイル済み辞書の読み込みと検索。
//!
//! .spl ファイルを読み込んだ [`Dictionary`] と、.sug ファイルを読み込んだ
//! [`SugFile`] を提供します。単語木はフラットな `byts` / `idxs` 配列の
//! まま保持され、検索は配列上を歩きます。サウンドフォールドによる
//! 候補検索のため、.spl を書き出した直後に読み戻す用途にも使われます。

use std::fs::File;
use std::io::Read;
use std::path::Path;

use hashbrown::HashSet;
use memmap2::Mmap;

use crate::builder::FromTo;
use crate::errors::{Result, SpellError};
use crate::flags::{case_fold, WF_AFX, WF_REGION};
use crate::format::read::{read_tree, Cursor};
use crate::format::{
    SAL_COLLAPSE, SAL_F0LLOWUP, SAL_REM_ACCENTS, SNF_REQUIRED, SN_CHARFLAGS, SN_COMPOUND, SN_END,
    SN_INFO, SN_MAP, SN_MIDWORD, SN_NOBREAK, SN_NOCOMPOUNDSUGS, SN_NOSPLITSUGS, SN_PREFCOND,
    SN_REGION, SN_REP, SN_REPSAL, SN_SAL, SN_SOFO, SN_SUGFILE, SN_SYLLABLE, SN_WORDS, SPELL_MAGIC,
    SPELL_VERSION, SUG_MAGIC, SUG_VERSION,
};
use crate::tree::WordAttr;

pub use crate::format::read::TreeData;

/// 読み込み済みのスペル辞書。
///
/// 3 本の単語木とサジェスト用のセクションデータを保持します。
pub struct Dictionary {
    pub(crate) fold: TreeData,
    pub(crate) keep: TreeData,
    pub(crate) prefix: TreeData,

    info: String,
    /// 地域名、1 地域につき 2 文字。
    region_names: Vec<String>,
    /// コードポイント 128..256 の CF_* フラグ。
    char_flags: Vec<u8>,
    /// 同じコードポイントのケースフォールド結果。
    fold_chars: Vec<char>,
    midword: Option<String>,
    prefcond: Vec<Option<String>>,

    pub(crate) rep: Vec<FromTo>,
    pub(crate) repsal: Vec<FromTo>,
    pub(crate) sal: Vec<FromTo>,
    pub(crate) followup: bool,
    pub(crate) collapse: bool,
    pub(crate) rem_accents: bool,
    pub(crate) sofofr: Option<String>,
    pub(crate) sofoto: Option<String>,
    map: String,
    common_words: HashSet<String>,

    compflags: Vec<u8>,
    compmax: u8,
    compminlen: u8,
    compsylmax: u8,
    compoptions: u8,
    comppat: Vec<String>,
    syllable: Option<String>,

    nobreak: bool,
    nosplitsugs: bool,
    nocompoundsugs: bool,
    sugtime: u64,
}

impl Dictionary {
    /// .spl ファイルをメモリマップして読み込みます。
    ///
    /// # エラー
    ///
    /// * [`SpellError::Io`] - ファイルが開けない場合
    /// * [`SpellError::BadMagic`] - スペル辞書ファイルでない場合
    /// * [`SpellError::TooOld`] / [`SpellError::TooNew`] - バージョンが
    ///   対応範囲の外の場合
    /// * [`SpellError::Truncated`] / [`SpellError::Malformed`] - 内容が
    ///   壊れている場合
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(&mmap)
    }

    /// リーダーから全体を読み込みます。
    pub fn read<R: Read>(mut rdr: R) -> Result<Self> {
        let mut buf = Vec::new();
        rdr.read_to_end(&mut buf)?;
        Self::from_bytes(&buf)
    }

    /// バイト列から読み込みます。
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);

        // <HEADER>: <fileID> <versionnr>
        if cur.take(SPELL_MAGIC.len(), "magic bytes")? != SPELL_MAGIC {
            return Err(SpellError::BadMagic);
        }
        let version = cur.u8("version")?;
        if version < SPELL_VERSION {
            return Err(SpellError::TooOld {
                found: version,
                supported: SPELL_VERSION,
            });
        }
        if version > SPELL_VERSION {
            return Err(SpellError::TooNew {
                found: version,
                supported: SPELL_VERSION,
            });
        }

        let mut dict = Self {
            fold: TreeData::default(),
            keep: TreeData::default(),
            prefix: TreeData::default(),
            info: String::new(),
            region_names: Vec::new(),
            char_flags: Vec::new(),
            fold_chars: Vec::new(),
            midword: None,
            prefcond: Vec::new(),
            rep: Vec::new(),
            repsal: Vec::new(),
            sal: Vec::new(),
            followup: false,
            collapse: false,
            rem_accents: false,
            sofofr: None,
            sofoto: None,
            map: String::new(),
            common_words: HashSet::new(),
            compflags: Vec::new(),
            compmax: 0,
            compminlen: 0,
            compsylmax: 0,
            compoptions: 0,
            comppat: Vec::new(),
            syllable: None,
            nobreak: false,
            nosplitsugs: false,
            nocompoundsugs: false,
            sugtime: 0,
        };

        // <SECTIONS>: <section> ... <sectionend>
        loop {
            let id = cur.u8("section ID")?;
            if id == SN_END {
                break;
            }
            let flags = cur.u8("section flags")?;
            let len = cur.u32("section length")? as usize;
            let payload = cur.take(len, "section data")?;
            dict.read_section(id, flags, payload)?;
        }

        // <LWORDTREE> <KWORDTREE> <PREFIXTREE>
        dict.fold = read_tree(&mut cur, false, 0)?;
        dict.keep = read_tree(&mut cur, false, 0)?;
        dict.prefix = read_tree(&mut cur, true, dict.prefcond.len())?;

        Ok(dict)
    }

    fn read_section(&mut self, id: u8, flags: u8, payload: &[u8]) -> Result<()> {
        let mut cur = Cursor::new(payload);
        match id {
            SN_INFO => self.info = std::str::from_utf8(payload)?.to_string(),
            SN_REGION => {
                let names = std::str::from_utf8(payload)?;
                if names.len() > 16 {
                    return Err(SpellError::malformed("too many regions"));
                }
                self.region_names = names
                    .as_bytes()
                    .chunks(2)
                    .map(|c| String::from_utf8_lossy(c).into_owned())
                    .collect();
            }
            SN_CHARFLAGS => {
                let flagslen = cur.u8("char flags length")? as usize;
                self.char_flags = cur.take(flagslen, "char flags")?.to_vec();
                let follen = cur.u16("fold chars length")? as usize;
                let folchars = std::str::from_utf8(cur.take(follen, "fold chars")?)?;
                self.fold_chars = folchars.chars().collect();
                if self.fold_chars.len() != flagslen {
                    return Err(SpellError::malformed("char flags table mismatch"));
                }
            }
            SN_MIDWORD => self.midword = Some(std::str::from_utf8(payload)?.to_string()),
            SN_PREFCOND => {
                let count = cur.u16("prefix condition count")? as usize;
                for _ in 0..count {
                    let l = cur.u8("prefix condition length")? as usize;
                    if l == 0 {
                        self.prefcond.push(None);
                    } else {
                        let s = std::str::from_utf8(cur.take(l, "prefix condition")?)?;
                        self.prefcond.push(Some(s.to_string()));
                    }
                }
            }
            SN_REP => self.rep = read_fromto(&mut cur)?,
            SN_REPSAL => self.repsal = read_fromto(&mut cur)?,
            SN_SAL => {
                let salflags = cur.u8("sal flags")?;
                self.followup = salflags & SAL_F0LLOWUP != 0;
                self.collapse = salflags & SAL_COLLAPSE != 0;
                self.rem_accents = salflags & SAL_REM_ACCENTS != 0;
                self.sal = read_fromto(&mut cur)?;
            }
            SN_SOFO => {
                let l = cur.u16("sofo from length")? as usize;
                let fr = std::str::from_utf8(cur.take(l, "sofo from")?)?;
                self.sofofr = Some(fr.to_string());
                let l = cur.u16("sofo to length")? as usize;
                let to = std::str::from_utf8(cur.take(l, "sofo to")?)?;
                self.sofoto = Some(to.to_string());
            }
            SN_MAP => self.map = std::str::from_utf8(payload)?.to_string(),
            SN_WORDS => {
                for word in payload.split(|&b| b == 0) {
                    if !word.is_empty() {
                        self.common_words
                            .insert(std::str::from_utf8(word)?.to_string());
                    }
                }
            }
            SN_SUGFILE => self.sugtime = cur.u64("sug timestamp")?,
            SN_NOSPLITSUGS => self.nosplitsugs = true,
            SN_NOCOMPOUNDSUGS => self.nocompoundsugs = true,
            SN_COMPOUND => {
                self.compmax = cur.u8("compound max")?;
                self.compminlen = cur.u8("compound min length")?;
                self.compsylmax = cur.u8("compound syllable max")?;
                cur.u8("compound padding")?;
                self.compoptions = cur.u8("compound options")?;
                let patcount = cur.u16("compound pattern count")? as usize;
                for _ in 0..patcount {
                    let l = cur.u8("compound pattern length")? as usize;
                    let p = std::str::from_utf8(cur.take(l, "compound pattern")?)?;
                    self.comppat.push(p.to_string());
                }
                let mut rest = Vec::new();
                while !cur.is_empty() {
                    rest.push(cur.u8("compound flags")?);
                }
                self.compflags = rest;
            }
            SN_NOBREAK => self.nobreak = true,
            SN_SYLLABLE => self.syllable = Some(std::str::from_utf8(payload)?.to_string()),
            _ => {
                // An unknown section, it may be from a newer writer.
                if flags & SNF_REQUIRED != 0 {
                    return Err(SpellError::malformed(format!(
                        "unsupported required section {id}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// INFO セクションの内容を返します。
    pub fn info(&self) -> &str {
        &self.info
    }

    /// 地域名のリストを返します。地域が 1 つの辞書では空です。
    pub fn region_names(&self) -> &[String] {
        &self.region_names
    }

    /// 対応する .sug ファイルのタイムスタンプを返します。0 なら .sug なし。
    pub fn sugtime(&self) -> u64 {
        self.sugtime
    }

    /// MIDWORD の文字列を返します。
    pub fn midword(&self) -> Option<&str> {
        self.midword.as_deref()
    }

    /// REP の置換の組を返します。
    pub fn rep(&self) -> &[FromTo] {
        &self.rep
    }

    /// REPSAL の置換の組を返します。
    pub fn repsal(&self) -> &[FromTo] {
        &self.repsal
    }

    /// SAL 規則の組を返します。
    pub fn sal(&self) -> &[FromTo] {
        &self.sal
    }

    /// SOFO の from と to の組を返します。
    pub fn sofo(&self) -> Option<(&str, &str)> {
        match (&self.sofofr, &self.sofoto) {
            (Some(fr), Some(to)) => Some((fr, to)),
            _ => None,
        }
    }

    /// MAP セクションの文字列を返します。
    pub fn map_chars(&self) -> &str {
        &self.map
    }

    /// よく使われる語として登録されているかを返します。
    pub fn is_common(&self, word: &str) -> bool {
        self.common_words.contains(word)
    }

    /// よく使われる語の数を返します。
    pub fn common_word_count(&self) -> usize {
        self.common_words.len()
    }

    /// 振り直し済みの compound フラグ列を返します。空なら複合語なし。
    pub fn compound_flags(&self) -> &[u8] {
        &self.compflags
    }

    /// 複合語の制限 (compmax, compminlen, compsylmax, compoptions) を返します。
    pub fn compound_limits(&self) -> (u8, u8, u8, u8) {
        (
            self.compmax,
            self.compminlen,
            self.compsylmax,
            self.compoptions,
        )
    }

    /// CHECKCOMPOUNDPATTERN のパターン列を返します。
    pub fn compound_patterns(&self) -> &[String] {
        &self.comppat
    }

    /// SYLLABLE の文字列を返します。
    pub fn syllable(&self) -> Option<&str> {
        self.syllable.as_deref()
    }

    /// NOBREAK 辞書かどうかを返します。
    pub fn nobreak(&self) -> bool {
        self.nobreak
    }

    /// 単語分割した候補を作らない辞書かどうかを返します。
    pub fn nosplitsugs(&self) -> bool {
        self.nosplitsugs
    }

    /// 複合語の候補を作らない辞書かどうかを返します。
    pub fn nocompoundsugs(&self) -> bool {
        self.nocompoundsugs
    }

    /// 後置プレフィックス条件の数を返します。
    pub fn prefcond_count(&self) -> usize {
        self.prefcond.len()
    }

    /// 単語を構成する文字かどうかを返します。
    ///
    /// コードポイント 128..256 は辞書に埋め込まれた文字フラグ表に
    /// 従い、それ以外は Unicode の分類に従います。
    pub fn is_word_char(&self, c: char) -> bool {
        let cp = c as u32;
        if (128..256).contains(&cp) && !self.char_flags.is_empty() {
            if let Some(&f) = self.char_flags.get(cp as usize - 128) {
                return f & crate::format::CF_WORD != 0;
            }
        }
        c.is_alphabetic()
    }

    /// 辞書の文字表によるケースフォールド結果を返します。
    pub fn fold_char(&self, c: char) -> char {
        let cp = c as u32;
        if (128..256).contains(&cp) {
            if let Some(&f) = self.fold_chars.get(cp as usize - 128) {
                return f;
            }
        }
        c.to_lowercase().next().unwrap_or(c)
    }

    /// ケースフォールド木の単語数を返します。
    pub fn fold_word_count(&self) -> usize {
        let mut n = 0;
        let _ = walk_words(&self.fold, |_| {
            n += 1;
            Ok(())
        });
        n
    }

    fn all_region_mask(&self) -> u16 {
        (1u16 << self.region_names.len().max(1)) - 1
    }

    /// 単語を検索します。
    ///
    /// ケースフォールドした形で fold 木を、元の形で keep 木を引き、
    /// 見つかった終端の属性をすべて返します。未知語では空になります。
    ///
    /// # 引数
    ///
    /// * `word` - 検索する単語
    pub fn lookup(&self, word: &str) -> Vec<WordAttr> {
        let all = self.all_region_mask();
        let folded = case_fold(word);
        let mut out = tree_lookup(&self.fold, folded.as_bytes(), all);
        out.extend(tree_lookup(&self.keep, word.as_bytes(), all));
        out
    }

    /// fold 木の単語番号 `nr` にある単語を返します。
    ///
    /// 単語番号は木の整列順で数えた通し番号で、.sug ファイルの
    /// テーブルが指すものと同じです。
    pub fn word_at(&self, nr: u32) -> Option<String> {
        let mut count = 0u32;
        let mut buf = Vec::new();
        word_at_rec(&self.fold, 0, nr, &mut count, &mut buf)
    }
}

/// <count> <fromlen> <from> <tolen> <to> ... を読みます。
fn read_fromto(cur: &mut Cursor) -> Result<Vec<FromTo>> {
    let count = cur.u16("from-to count")? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let l = cur.u8("from length")? as usize;
        let from = std::str::from_utf8(cur.take(l, "from text")?)?.to_string();
        let l = cur.u8("to length")? as usize;
        let to = std::str::from_utf8(cur.take(l, "to text")?)?.to_string();
        out.push(FromTo { from, to });
    }
    Ok(out)
}

/// 単語木配列上で 1 語を検索し、終端の属性を復号して返します。
fn tree_lookup(tree: &TreeData, word: &[u8], all_regions: u16) -> Vec<WordAttr> {
    if tree.is_empty() {
        return Vec::new();
    }
    let mut arridx = 0usize;
    for &b in word {
        let len = tree.byts[arridx] as usize;
        let mut found = None;
        for i in 1..=len {
            let c = tree.byts[arridx + i];
            if c == b {
                found = Some(arridx + i);
                break;
            }
            if c > b {
                break;
            }
        }
        match found {
            Some(n) => arridx = tree.idxs[n] as usize,
            None => return Vec::new(),
        }
    }

    let len = tree.byts[arridx] as usize;
    let mut out = Vec::new();
    for i in 1..=len {
        if tree.byts[arridx + i] != 0 {
            break;
        }
        out.push(decode_attr(tree.idxs[arridx + i], all_regions));
    }
    out
}

/// idxs[] の終端値をフラグ・地域・接辞 ID に展開します。
fn decode_attr(v: u32, all_regions: u16) -> WordAttr {
    let flags = (v & 0xFFFF) as u16;
    let region = if flags & WF_REGION != 0 {
        ((v >> 16) & 0xFF) as u16
    } else {
        all_regions
    };
    let affix_id = if flags & WF_AFX != 0 {
        (v >> 24) as u8
    } else {
        0
    };
    WordAttr {
        flags,
        region,
        affix_id,
    }
}

/// 到達可能な単語を整列順に 1 語ずつ訪問します。
///
/// 同じ単語のフラグ違いの終端(連続する NUL 兄弟)は 1 回だけ数えます。
pub(crate) fn walk_words<F>(tree: &TreeData, mut f: F) -> Result<()>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    if tree.is_empty() {
        return Ok(());
    }
    let mut buf = Vec::new();
    walk_words_rec(tree, 0, &mut buf, &mut f)
}

fn walk_words_rec<F>(tree: &TreeData, arridx: usize, buf: &mut Vec<u8>, f: &mut F) -> Result<()>
where
    F: FnMut(&[u8]) -> Result<()>,
{
    let len = tree.byts[arridx] as usize;
    let mut emitted = false;
    for i in 1..=len {
        let b = tree.byts[arridx + i];
        if b == 0 {
            // The NUL siblings come first and all belong to one word.
            if !emitted {
                f(buf)?;
                emitted = true;
            }
        } else {
            buf.push(b);
            walk_words_rec(tree, tree.idxs[arridx + i] as usize, buf, f)?;
            buf.pop();
        }
    }
    Ok(())
}

fn word_at_rec(
    tree: &TreeData,
    arridx: usize,
    target: u32,
    count: &mut u32,
    buf: &mut Vec<u8>,
) -> Option<String> {
    if tree.is_empty() {
        return None;
    }
    let len = tree.byts[arridx] as usize;
    let mut counted = false;
    for i in 1..=len {
        let b = tree.byts[arridx + i];
        if b == 0 {
            if !counted {
                if *count == target {
                    return Some(String::from_utf8_lossy(buf).into_owned());
                }
                *count += 1;
                counted = true;
            }
        } else {
            buf.push(b);
            if let Some(w) = word_at_rec(tree, tree.idxs[arridx + i] as usize, target, count, buf) {
                return Some(w);
            }
            buf.pop();
        }
    }
    None
}

/// 読み込み済みの .sug ファイル。
///
/// サウンドフォールド語の木と、各サウンドフォールド語に対応する
/// 単語番号テーブルを保持します。
pub struct SugFile {
    sugtime: u64,
    tree: TreeData,
    table: Vec<Vec<u8>>,
}

impl SugFile {
    /// .sug ファイルをメモリマップして読み込みます。
    ///
    /// # エラー
    ///
    /// * [`SpellError::BadMagic`] - .sug ファイルでない場合
    /// * [`SpellError::TooNew`] - バージョンが新しすぎる場合
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(&mmap)
    }

    /// バイト列から読み込みます。
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(buf);

        // <SUGHEADER>: <fileID> <versionnr> <timestamp>
        if cur.take(SUG_MAGIC.len(), "sug magic bytes")? != SUG_MAGIC {
            return Err(SpellError::BadMagic);
        }
        let version = cur.u8("sug version")?;
        if version > SUG_VERSION {
            return Err(SpellError::TooNew {
                found: version,
                supported: SUG_VERSION,
            });
        }
        let sugtime = cur.u64("sug timestamp")?;

        // <SUGWORDTREE>
        let mut tree = read_tree(&mut cur, false, 0)?;

        // <SUGTABLE>: <sugwcount> <sugline> ...
        let wcount = cur.u32("sug word count")? as usize;
        let mut table = Vec::with_capacity(wcount);
        for _ in 0..wcount {
            let mut line = Vec::new();
            loop {
                let b = cur.u8("sug table line")?;
                if b == 0 {
                    break;
                }
                line.push(b);
            }
            check_sug_line(&line)?;
            table.push(line);
        }

        // The word numbers are not in the file, they follow from the word
        // order in the tree.
        count_tree_words(&mut tree);

        Ok(Self {
            sugtime,
            tree,
            table,
        })
    }

    /// タイムスタンプを返します。
    pub fn sugtime(&self) -> u64 {
        self.sugtime
    }

    /// テーブルの行数(サウンドフォールド語の数)を返します。
    pub fn word_count(&self) -> usize {
        self.table.len()
    }

    /// .spl 側のタイムスタンプとの一致を検査します。
    ///
    /// 単語番号が正確に一致する必要があるため、組で作られたファイル
    /// 以外との併用はエラーです。
    ///
    /// # エラー
    ///
    /// * [`SpellError::SugTimestampMismatch`]
    pub fn check_timestamp(&self, dict: &Dictionary) -> Result<()> {
        if dict.sugtime() != self.sugtime {
            return Err(SpellError::SugTimestampMismatch {
                spl: dict.sugtime(),
                sug: self.sugtime,
            });
        }
        Ok(())
    }

    /// サウンドフォールドした語に対応する単語番号のリストを返します。
    ///
    /// 番号は [`Dictionary::word_at`] で単語に戻せます。一致する
    /// サウンドフォールド語がなければ空です。
    ///
    /// # 引数
    ///
    /// * `soundfolded` - サウンドフォールド済みの語
    pub fn similar_word_nrs(&self, soundfolded: &str) -> Vec<u32> {
        let Some(line_nr) = self.soundfold_find(soundfolded.as_bytes()) else {
            return Vec::new();
        };
        let line = &self.table[line_nr as usize];
        let mut out = Vec::new();
        let mut pos = 0usize;
        let mut prev = 0u32;
        // The lines were validated on load, decoding cannot fail here.
        while pos < line.len() {
            let Some((nr, used)) = bytes_to_offset(&line[pos..]) else {
                break;
            };
            prev += nr;
            out.push(prev);
            pos += used;
        }
        out
    }

    /// サウンドフォールド語の木上での単語番号を返します。
    fn soundfold_find(&self, word: &[u8]) -> Option<u32> {
        let tree = &self.tree;
        if tree.is_empty() {
            return None;
        }
        let mut arridx = 0usize;
        let mut wordnr = 0u32;
        for &b in word {
            let len = tree.byts[arridx] as usize;
            let mut found = None;
            for i in 1..=len {
                let c = tree.byts[arridx + i];
                if c == b {
                    found = Some(arridx + i);
                    break;
                }
                if c > b {
                    break;
                }
                // Add the words in the subtrees of the siblings before the
                // match, and the word ending here.
                if c == 0 {
                    wordnr += 1;
                } else {
                    let child = tree.idxs[arridx + i] as usize;
                    wordnr += tree.idxs[child];
                }
            }
            arridx = tree.idxs[found?] as usize;
        }
        let len = tree.byts[arridx] as usize;
        if len >= 1 && tree.byts[arridx + 1] == 0 {
            Some(wordnr)
        } else {
            None
        }
    }
}

/// 各ノードの長さスロットに、そのノード配下の単語数を書き込みます。
///
/// 共有された部分木の数え直しを避けるため、部分木ごとの数を
/// 持たせておき、検索時に足し合わせて単語番号を求めます。
fn count_tree_words(tree: &mut TreeData) {
    if tree.is_empty() {
        return;
    }
    count_tree_words_rec(tree, 0);
}

fn count_tree_words_rec(tree: &mut TreeData, arridx: usize) -> u32 {
    let len = tree.byts[arridx] as usize;
    let mut count = 0u32;
    let mut counted = false;
    for i in 1..=len {
        let b = tree.byts[arridx + i];
        if b == 0 {
            if !counted {
                count += 1;
                counted = true;
            }
        } else {
            count += count_tree_words_rec(tree, tree.idxs[arridx + i] as usize);
        }
    }
    tree.idxs[arridx] = count;
    count
}

/// テーブルの 1 行が復号可能なオフセット列であることを検査します。
///
/// # エラー
///
/// * [`SpellError::Malformed`] - 途中で切れている、または値が不正な場合
fn check_sug_line(line: &[u8]) -> Result<()> {
    let mut pos = 0usize;
    while pos < line.len() {
        match bytes_to_offset(&line[pos..]) {
            Some((_, used)) => pos += used,
            None => return Err(SpellError::malformed("bad suggestion table entry")),
        }
    }
    Ok(())
}

/// 可変長の単語番号オフセットを復号します。
///
/// # 戻り値
///
/// 復号した値と消費したバイト数。列が途中で切れているか、格納値が
/// 0 のバイトを含むときは `None` です。
fn bytes_to_offset(buf: &[u8]) -> Option<(u32, usize)> {
    // Each component is stored plus one to avoid NUL bytes, so a stored
    // zero component marks a corrupted line.
    let comp = |i: usize| -> Option<u32> {
        match *buf.get(i)? as u32 {
            0 => None,
            b => Some(b - 1),
        }
    };
    let c = *buf.first()? as u32;
    if c & 0x80 == 0 {
        Some((comp(0)?, 1))
    } else if c & 0xc0 == 0x80 {
        let nr = (c & 0x3f).checked_sub(1)?;
        Some((nr * 255 + comp(1)?, 2))
    } else if c & 0xe0 == 0xc0 {
        let mut nr = (c & 0x1f).checked_sub(1)?;
        nr = nr * 255 + comp(1)?;
        Some((nr * 255 + comp(2)?, 3))
    } else {
        let mut nr = (c & 0x0f).checked_sub(1)?;
        nr = nr * 255 + comp(1)?;
        nr = nr * 255 + comp(2)?;
        Some((nr * 255 + comp(3)?, 4))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::read::read_tree;
    use crate::format::write::write_tree;
    use crate::tree::{TreeKind, WordTree};
    use crate::CancelToken;

    fn load_fold_tree(words: &[&[u8]]) -> TreeData {
        let mut tree = WordTree::new(TreeKind::Fold);
        for w in words {
            tree.insert(w, 0, 1, 0);
        }
        tree.compress(&CancelToken::new()).unwrap();
        let mut buf = Vec::new();
        write_tree(&mut buf, &tree, 0, false);
        read_tree(&mut Cursor::new(&buf), false, 0).unwrap()
    }

    #[test]
    fn walk_words_visits_in_sorted_order() {
        let data = load_fold_tree(&[b"walk", b"ant", b"walking", b"bee"]);
        let mut seen = Vec::new();
        walk_words(&data, |w| {
            seen.push(String::from_utf8(w.to_vec()).unwrap());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, ["ant", "bee", "walk", "walking"]);
    }

    #[test]
    fn word_numbers_follow_tree_order() {
        let mut data = load_fold_tree(&[b"walk", b"ant", b"walking", b"bee"]);
        count_tree_words(&mut data);
        // The count slot of the root holds the total.
        assert_eq!(data.idxs[0], 4);
    }

    #[test]
    fn offsets_roundtrip() {
        for nr in [0u32, 1, 0x7f, 0x80, 254, 255, 64000, 1 << 20, 1 << 26] {
            let mut enc = Vec::new();
            crate::soundfold::offset_to_bytes(&mut enc, nr);
            let (dec, used) = bytes_to_offset(&enc).unwrap();
            assert_eq!((dec, used), (nr, enc.len()), "nr={nr}");
        }
    }

    #[test]
    fn bad_sug_table_line_is_malformed() {
        let mut buf = Vec::from(crate::format::SUG_MAGIC.as_slice());
        buf.push(crate::format::SUG_VERSION);
        buf.extend_from_slice(&0u64.to_be_bytes()); // timestamp
        buf.extend_from_slice(&0u32.to_be_bytes()); // empty tree
        buf.extend_from_slice(&1u32.to_be_bytes()); // one table line
        buf.push(0x85); // two-byte marker with no second byte
        buf.push(0); // line terminator
        buf.push(0);
        assert!(matches!(
            SugFile::from_bytes(&buf),
            Err(SpellError::Malformed(_))
        ));
    }
}
