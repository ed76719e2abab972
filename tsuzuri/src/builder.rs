//! 辞書の構築とコンパイルの進行管理。
//!
//! .aff/.dic の組や単語リストを読み込んで 3 本の単語木を育て、
//! 圧縮してバイナリへ書き出すまでの全体を [`SpellInfo`] が束ねます。

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashSet;

use crate::affix::{self, expand, AffFile};
use crate::errors::{Result, SpellError};
use crate::flags::{captype, case_fold, CapType};
use crate::flags::{WF_BANNED, WF_FIXCAP, WF_KEEPCAP, WF_RARE, WF_REGION};
use crate::tree::{TreeKind, WordTree, MAXWLEN};
use crate::{soundfold, CancelToken};

// Compression is slow, so only run it when the tree has grown enough.
// Numbers are in allocation blocks and added words, see added_word().
const COMPRESS_START: i64 = 30000;
const COMPRESS_INC: i64 = 100;
const COMPRESS_ADDED: u64 = 500_000;

/// REP/SAL/REPSAL の from-to の組です。格納時にケースフォールドされます。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FromTo {
    pub from: String,
    pub to: String,
}

impl FromTo {
    pub(crate) fn folded(from: &str, to: &str) -> Self {
        Self {
            from: case_fold(from),
            to: case_fold(to),
        }
    }
}

/// コンパイルの動作オプションです。
#[derive(Clone, Default)]
pub struct CompileOptions {
    /// 非 ASCII の語と接辞規則を捨てます。
    pub ascii: bool,
    /// 既存の出力ファイルを上書きします。
    pub overwrite: bool,
    /// 中断用トークン。
    pub cancel: CancelToken,
}

/// 構築中の全状態です。
///
/// 3 本の単語木（ケースフォールド、ケース保持、後置プレフィックス）と、
/// .aff から集めたサジェスト関連のデータを保持します。
pub struct SpellInfo {
    pub(crate) fold: WordTree,
    pub(crate) keep: WordTree,
    pub(crate) prefix: WordTree,

    /// 非 ASCII を捨てるモード。
    pub(crate) ascii: bool,
    /// .add ファイルの構築（文字表セクションを書かない）。
    pub(crate) add_file: bool,

    /// 現在読み込み中の地域のビットマスク。
    pub(crate) region: u16,
    pub(crate) region_count: usize,
    /// 地域名、1 地域につき 2 文字。
    pub(crate) region_name: String,

    pub(crate) rep: Vec<FromTo>,
    pub(crate) repsal: Vec<FromTo>,
    pub(crate) sal: Vec<FromTo>,
    pub(crate) followup: bool,
    pub(crate) collapse: bool,
    pub(crate) rem_accents: bool,
    /// MAP の行を '/' でつないだもの。
    pub(crate) map: String,
    pub(crate) sofofr: Option<String>,
    pub(crate) sofoto: Option<String>,
    pub(crate) common_words: HashSet<String>,
    pub(crate) midword: Option<String>,
    pub(crate) info: String,
    pub(crate) syllable: Option<String>,
    pub(crate) nobreak: bool,
    pub(crate) nosplitsugs: bool,
    pub(crate) nocompoundsugs: bool,
    pub(crate) nosugfile: bool,

    /// 振り直された compound フラグ列（ID と正規表現メタ文字）。
    pub(crate) compflags: Vec<u8>,
    pub(crate) compmax: u16,
    pub(crate) compminlen: u16,
    pub(crate) compsylmax: u16,
    pub(crate) compoptions: u8,
    pub(crate) comppat: Vec<(String, String)>,

    /// 後置プレフィックスの条件、条件番号の順。
    pub(crate) prefcond: Vec<Option<String>>,
    /// 後置プレフィックス ID は 1 から上へ。
    pub(crate) new_pref_id: u8,
    /// compound ID は 127（使い切ったら 255）から下へ。
    pub(crate) new_comp_id: u8,

    /// .sug ファイルと対応づけるためのタイムスタンプ。0 なら .sug なし。
    pub(crate) sugtime: u64,

    pub(crate) fold_words: usize,
    pub(crate) keep_words: usize,
    msg_count: u64,
    blocks_cnt: i64,
    last_blocks: u64,
    compress_cnt: u64,

    pub(crate) cancel: CancelToken,
}

impl SpellInfo {
    pub(crate) fn new(cancel: CancelToken) -> Self {
        Self {
            fold: WordTree::new(TreeKind::Fold),
            keep: WordTree::new(TreeKind::KeepCase),
            prefix: WordTree::new(TreeKind::Prefix),
            ascii: false,
            add_file: false,
            region: 1,
            region_count: 1,
            region_name: String::new(),
            rep: Vec::new(),
            repsal: Vec::new(),
            sal: Vec::new(),
            followup: true,
            collapse: false,
            rem_accents: true,
            map: String::new(),
            sofofr: None,
            sofoto: None,
            common_words: HashSet::new(),
            midword: None,
            info: String::new(),
            syllable: None,
            nobreak: false,
            nosplitsugs: false,
            nocompoundsugs: false,
            nosugfile: false,
            compflags: Vec::new(),
            compmax: 0,
            compminlen: 0,
            compsylmax: 0,
            compoptions: 0,
            comppat: Vec::new(),
            prefcond: Vec::new(),
            new_pref_id: 0,
            new_comp_id: 127,
            sugtime: 0,
            fold_words: 0,
            keep_words: 0,
            msg_count: 0,
            blocks_cnt: 0,
            last_blocks: 0,
            compress_cnt: 0,
            cancel,
        }
    }

    /// 後置プレフィックスと compound の ID が衝突しないよう番号域を
    /// 切り替えます。まず 1..=127 を使い、使い切ったら 128..=255 へ。
    pub(crate) fn check_renumber(&mut self) {
        if self.new_pref_id == self.new_comp_id && self.new_comp_id < 128 {
            self.new_pref_id = 127;
            self.new_comp_id = 255;
        }
    }

    /// 1 語を単語木に格納します。
    ///
    /// ケースフォールドした形を fold 木へ、KEEPCAP の語は元の形も
    /// keep 木へ入れます。`pfxlist` の各 ID につき 1 終端を作り、
    /// `need_affix` でなければ ID なしの終端も作ります。
    ///
    /// # エラー
    ///
    /// * [`SpellError::Interrupted`] - 途中の圧縮が中断された場合
    pub(crate) fn store_word(
        &mut self,
        word: &str,
        flags: u16,
        region: u16,
        pfxlist: &[u8],
        need_affix: bool,
    ) -> Result<()> {
        let ct = captype(word);
        let folded = case_fold(word);
        let word_flags = ct.word_flags() | flags;

        for &id in pfxlist {
            self.fold.insert(folded.as_bytes(), word_flags, region, id);
            self.added_word()?;
        }
        if !need_affix {
            self.fold.insert(folded.as_bytes(), word_flags, region, 0);
            self.added_word()?;
        }
        self.fold_words += 1;

        if ct == CapType::KeepCap || (flags & WF_KEEPCAP) != 0 {
            for &id in pfxlist {
                self.keep.insert(word.as_bytes(), flags, region, id);
                self.added_word()?;
            }
            if !need_affix {
                self.keep.insert(word.as_bytes(), flags, region, 0);
                self.added_word()?;
            }
            self.keep_words += 1;
        }
        Ok(())
    }

    /// 語の追加後に呼ばれ、必要なら途中圧縮を走らせます。
    ///
    /// 圧縮は重いので次の場合だけ行います:
    /// 1. まだ一度も圧縮していない: 割り当てブロックが一定数に達したとき。
    /// 2. 圧縮済みで、一定語数を足す前にさらにブロックが増えたとき。
    /// 3. 圧縮済みで一定語数を足し、空きノードが最大語長を下回ったとき。
    fn added_word(&mut self) -> Result<()> {
        self.msg_count += 1;
        if self.msg_count % 10000 == 0 {
            log::debug!(
                "{} words stored so far",
                self.fold_words + self.keep_words
            );
        }

        let total =
            self.fold.blocks_used() + self.keep.blocks_used() + self.prefix.blocks_used();
        self.blocks_cnt += (total - self.last_blocks) as i64;
        self.last_blocks = total;

        if self.compress_cnt > 1 {
            // Did enough words to lower the block count limit.
            self.compress_cnt -= 1;
            if self.compress_cnt == 1 {
                self.blocks_cnt += COMPRESS_INC;
            }
        }

        let do_compress = if self.compress_cnt == 1 {
            self.fold.free_count() + self.keep.free_count() < MAXWLEN
        } else {
            self.blocks_cnt >= COMPRESS_START
        };
        if do_compress {
            // The lowered limit makes the next compression happen when the
            // freed up room has been used again, unless enough words have
            // been added in the meantime.
            self.blocks_cnt -= COMPRESS_INC;
            self.compress_cnt = COMPRESS_ADDED;

            log::info!("Compressing word tree...");
            let cancel = self.cancel.clone();
            self.fold.compress(&cancel)?;
            self.keep.compress(&cancel)?;
        }
        Ok(())
    }

    /// .dic ファイルを読み込み、接辞展開した語を木へ格納します。
    ///
    /// # エラー
    ///
    /// * [`SpellError::Io`] - ファイルが読めない場合
    /// * [`SpellError::Utf8`] - UTF-8 として解釈できない場合
    /// * [`SpellError::Syntax`] - ファイルが空の場合
    /// * [`SpellError::Interrupted`] - 中断された場合
    pub(crate) fn read_dic(&mut self, path: &Path, aff: &AffFile) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let text = std::str::from_utf8(&bytes)?;
        let fname = path.display().to_string();

        log::info!("Reading dictionary file {}", fname);

        // Only used to detect duplicate words.
        let mut seen: HashSet<String> = HashSet::new();
        let mut duplicates = 0usize;
        let mut non_ascii = 0usize;

        let mut lines = text.lines();

        // The first line is the word count, it is ignored. A count that is
        // not a number only gets a warning, but a file without even that
        // line holds no words at all.
        match lines.next() {
            Some(first)
                if first
                    .trim_start()
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit()) => {}
            Some(_) => log::warn!("No word count in {}", fname),
            None => return Err(SpellError::syntax(&fname, 1, "no word count")),
        }

        for (lnum0, raw) in lines.enumerate() {
            let lnum = lnum0 + 2;
            self.cancel.check()?;

            // Comment lines.
            if raw.starts_with('#') || raw.starts_with('/') {
                continue;
            }
            // White space halfway through the word is kept to allow
            // multi-word terms like "et al.".
            let line = raw.trim_end();
            if line.is_empty() {
                continue;
            }

            // Truncate the word at the "/", what follows is the affix list.
            // "\/" stands for "/" and "\\" for "\".
            let (word, afflist) = split_dic_line(line);

            if self.ascii && !word.is_ascii() {
                non_ascii += 1;
                continue;
            }

            if !seen.insert(word.clone()) {
                if duplicates == 0 {
                    log::warn!("First duplicate word in {} line {}: {}", fname, lnum, word);
                }
                duplicates += 1;
            }

            let mut flags = 0;
            let mut store_afflist: Vec<u8> = Vec::new();
            let mut pfxlen = 0;
            let mut need_affix = false;

            if let Some(afflist) = &afflist {
                flags |= affix::get_affix_flags(aff, afflist);

                if aff.needaffix != 0
                    && affix::flag_in_afflist(aff.flag_type, afflist, aff.needaffix)
                {
                    need_affix = true;
                }

                // The list of prefix IDs is stored with the word, the
                // compound IDs are concatenated after them.
                if aff.pfxpostpone {
                    store_afflist = affix::get_pfxlist(aff, afflist);
                    pfxlen = store_afflist.len();
                }
                if !self.compflags.is_empty() {
                    store_afflist.extend(affix::get_compflags(aff, afflist));
                }
            }

            let region = self.region;
            self.store_word(&word, flags, region, &store_afflist, need_affix)?;

            if let Some(afflist) = &afflist {
                // All matching suffixes, plus prefixes that combine.
                expand::store_aff_word(
                    self,
                    &word,
                    afflist,
                    aff,
                    &aff.suffixes,
                    Some(&aff.prefixes),
                    affix::CONDIT_SUF,
                    flags,
                    &store_afflist,
                    pfxlen,
                )?;
                // All matching prefixes.
                expand::store_aff_word(
                    self,
                    &word,
                    afflist,
                    aff,
                    &aff.prefixes,
                    None,
                    affix::CONDIT_SUF,
                    flags,
                    &store_afflist,
                    pfxlen,
                )?;
            }
        }

        if duplicates > 0 {
            log::warn!("{} duplicate word(s) in {}", duplicates, fname);
        }
        if self.ascii && non_ascii > 0 {
            log::info!(
                "Ignored {} words with non-ASCII characters in {}",
                non_ascii,
                fname
            );
        }
        Ok(())
    }

    /// プレーンな単語リストを読み込みます。
    ///
    /// 語の後ろの `/=`（ケース保持）、`/!`（禁止語）、`/?`（まれな語）、
    /// 地域番号を解釈します。先頭が `/` の行は `/encoding=` と
    /// `/regions=` だけを受け付けます。
    pub(crate) fn read_wordfile(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let text = std::str::from_utf8(&bytes)?;
        let fname = path.display().to_string();

        log::info!("Reading word file {}", fname);

        let mut did_word = false;
        let mut non_ascii = 0usize;

        for (lnum0, raw) in text.lines().enumerate() {
            let lnum = lnum0 + 1;
            self.cancel.check()?;

            if raw.starts_with('#') {
                continue;
            }
            let line = raw.trim_end();
            if line.is_empty() {
                continue;
            }

            if let Some(rest) = line.strip_prefix('/') {
                if let Some(enc) = rest.strip_prefix("encoding=") {
                    if did_word {
                        log::warn!(
                            "/encoding= line after word ignored in {} line {}: {}",
                            fname,
                            lnum,
                            line
                        );
                    } else {
                        let enc = enc.to_ascii_lowercase();
                        if enc != "utf-8" && enc != "utf8" {
                            log::warn!(
                                "Conversion in {} not supported: from {}",
                                fname,
                                enc
                            );
                        }
                    }
                    continue;
                }
                if let Some(regions) = rest.strip_prefix("regions=") {
                    if self.region_count > 1 {
                        log::warn!(
                            "Duplicate /regions= line ignored in {} line {}: {}",
                            fname,
                            lnum,
                            line
                        );
                    } else if regions.len() > 16 {
                        log::warn!("Too many regions in {} line {}: {}", fname, lnum, regions);
                    } else {
                        self.region_count = regions.len() / 2;
                        self.region_name = regions.to_string();
                        // A word without region digits is valid everywhere.
                        self.region = (1 << self.region_count) - 1;
                    }
                    continue;
                }
                log::warn!("/ line ignored in {} line {}: {}", fname, lnum, line);
                continue;
            }

            let mut flags: u16 = 0;
            let mut regionmask = self.region;
            let word = match line.split_once('/') {
                Some((word, after)) => {
                    for c in after.chars() {
                        match c {
                            '=' => flags |= WF_KEEPCAP | WF_FIXCAP,
                            '!' => flags |= WF_BANNED,
                            '?' => flags |= WF_RARE,
                            '1'..='9' => {
                                let l = c as u16 - '0' as u16;
                                if l as usize > self.region_count {
                                    log::warn!(
                                        "Invalid region nr in {} line {}: {}",
                                        fname,
                                        lnum,
                                        c
                                    );
                                    break;
                                }
                                if (flags & WF_REGION) == 0 {
                                    regionmask = 0;
                                }
                                flags |= WF_REGION;
                                regionmask |= 1 << (l - 1);
                            }
                            _ => {
                                log::warn!(
                                    "Unrecognized flags in {} line {}: {}",
                                    fname,
                                    lnum,
                                    after
                                );
                                break;
                            }
                        }
                    }
                    word
                }
                None => line,
            };

            if self.ascii && !word.is_ascii() {
                non_ascii += 1;
                continue;
            }

            self.store_word(word, flags, regionmask, &[], false)?;
            did_word = true;
        }

        if self.ascii && non_ascii > 0 {
            log::info!(
                "Ignored {} words with non-ASCII characters in {}",
                non_ascii,
                fname
            );
        }
        Ok(())
    }
}

/// .dic の行を語と接辞フラグ列に分けます。`\/` と `\\` を解決します。
fn split_dic_line(line: &str) -> (String, Option<String>) {
    let mut word = String::with_capacity(line.len());
    let mut chars = line.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.clone().next() {
                Some((_, e @ ('\\' | '/'))) => {
                    word.push(e);
                    chars.next();
                }
                _ => word.push('\\'),
            },
            '/' => return (word, Some(line[i + 1..].to_string())),
            _ => word.push(c),
        }
    }
    (word, None)
}

/// 出力ファイル名を入力名から作ります。
///
/// `.spl` で終わる名前はそのまま、それ以外は `{名前}.utf-8.spl`
/// （ASCII モードでは `{名前}.ascii.spl`）とします。
pub fn output_name(name: &str, ascii: bool) -> PathBuf {
    if name.ends_with(".spl") {
        PathBuf::from(name)
    } else if name.ends_with(".add") {
        PathBuf::from(format!("{name}.spl"))
    } else {
        PathBuf::from(format!("{name}.{}.spl", if ascii { "ascii" } else { "utf-8" }))
    }
}

/// 1 つ以上の入力からスペル辞書ファイルを作ります。
///
/// 各入力 `name` について `name.aff` があれば `.aff` + `.dic` の組として、
/// なければ単語リストとして読み込みます。入力が複数のときは各名前が
/// `_xx`（地域名）で終わっている必要があります。書き出した辞書に
/// サウンドフォールド情報があれば、続けて `.sug` ファイルも作ります。
///
/// # 引数
///
/// * `inputs` - 入力のベース名（最大 8 個）
/// * `out` - 出力する .spl ファイルのパス
/// * `opts` - 動作オプション
///
/// # エラー
///
/// * [`SpellError::InvalidArgument`] - 入力が 0 個または 9 個以上、
///   地域名が不正、出力名に `_` が含まれる場合など
/// * [`SpellError::PathIsDirectory`] - 出力先がディレクトリの場合
/// * [`SpellError::Interrupted`] - 中断された場合
pub fn compile(inputs: &[String], out: impl AsRef<Path>, opts: &CompileOptions) -> Result<()> {
    let out = out.as_ref();
    if inputs.is_empty() {
        return Err(SpellError::invalid_argument(
            "inputs",
            "at least one input file is required",
        ));
    }
    if inputs.len() > 8 {
        return Err(SpellError::invalid_argument(
            "inputs",
            "only up to 8 regions are supported",
        ));
    }

    let tail = out
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    if tail.contains('_') {
        return Err(SpellError::invalid_argument(
            "out",
            "output file name must not have a region name",
        ));
    }
    if out.is_dir() {
        return Err(SpellError::PathIsDirectory(out.to_path_buf()));
    }
    if !opts.overwrite && out.exists() {
        return Err(SpellError::invalid_argument("out", "output file already exists"));
    }

    let mut spin = SpellInfo::new(opts.cancel.clone());
    spin.ascii = opts.ascii;
    spin.add_file = tail.contains(".add.");

    // With more than one input the region names come from the "_xx"
    // suffixes of the input names.
    if inputs.len() > 1 {
        let mut names = String::with_capacity(inputs.len() * 2);
        for name in inputs {
            let tail = Path::new(name)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let ok = tail.len() >= 5
                && name.len() >= 3
                && name.as_bytes()[name.len() - 3] == b'_'
                && name[name.len() - 2..].chars().all(|c| c.is_ascii_alphabetic());
            if !ok {
                return Err(SpellError::invalid_argument(
                    "inputs",
                    format!("invalid region in {name}"),
                ));
            }
            names.push_str(&name[name.len() - 2..].to_ascii_lowercase());
        }
        spin.region_name = names;
    }
    spin.region_count = inputs.len();

    // Read all the .aff and .dic files, words go into the trees.
    for (i, name) in inputs.iter().enumerate() {
        spin.region = 1 << i;

        let aff_path = PathBuf::from(format!("{name}.aff"));
        if aff_path.exists() {
            let aff = affix::read_aff(&mut spin, &aff_path)?;
            let dic_path = PathBuf::from(format!("{name}.dic"));
            spin.read_dic(&dic_path, &aff)?;
        } else {
            // No .aff file, read it as a plain word list.
            spin.read_wordfile(Path::new(name))?;
        }
    }

    if !spin.compflags.is_empty() && spin.nobreak {
        log::warn!("Warning: both compounding and NOBREAK specified");
    }

    // Combine tails in the trees.
    log::info!("Compressing word tree...");
    spin.fold.compress(&opts.cancel)?;
    spin.keep.compress(&opts.cancel)?;
    spin.prefix.compress(&opts.cancel)?;

    log::info!("Writing spell file {}", out.display());
    if (!spin.sal.is_empty() || (spin.sofofr.is_some() && spin.sofoto.is_some()))
        && !spin.nosugfile
    {
        spin.sugtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
    }
    crate::format::write::write_spell(&spin, out)?;
    log::info!(
        "Done: {} case-folded and {} keep-case words",
        spin.fold_words,
        spin.keep_words
    );

    // When there is soundfolding info and no NOSUGFILE item, create the
    // .sug file with the soundfolded word trie.
    if spin.sugtime != 0 {
        soundfold::make_sug_file(&mut spin, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dic_line_escapes() {
        assert_eq!(split_dic_line("word/ABC"), ("word".into(), Some("ABC".into())));
        assert_eq!(split_dic_line("et al."), ("et al.".into(), None));
        assert_eq!(split_dic_line(r"and\/or/X"), ("and/or".into(), Some("X".into())));
        assert_eq!(split_dic_line(r"back\\slash"), (r"back\slash".into(), None));
    }

    #[test]
    fn output_names() {
        assert_eq!(output_name("en", false), PathBuf::from("en.utf-8.spl"));
        assert_eq!(output_name("en", true), PathBuf::from("en.ascii.spl"));
        assert_eq!(output_name("out.spl", false), PathBuf::from("out.spl"));
        assert_eq!(output_name("mine.add", false), PathBuf::from("mine.add.spl"));
    }

    #[test]
    fn keepcap_words_go_into_both_trees() {
        let mut spin = SpellInfo::new(CancelToken::new());
        spin.store_word("NATO", 0, 1, &[], false).unwrap();
        spin.store_word("walk", 0, 1, &[], false).unwrap();
        assert_eq!(spin.fold_words, 2);
        // ALLCAP words are not keep-case, they are recognized by flags.
        assert_eq!(spin.keep_words, 0);

        spin.store_word("McDonald", 0, 1, &[], false).unwrap();
        assert_eq!(spin.keep_words, 1);
        assert!(!spin.keep.lookup(b"McDonald").is_empty());
        assert!(!spin.fold.lookup(b"mcdonald").is_empty());
    }

    #[test]
    fn renumber_switches_ranges() {
        let mut spin = SpellInfo::new(CancelToken::new());
        spin.new_pref_id = 100;
        spin.new_comp_id = 100;
        spin.check_renumber();
        assert_eq!(spin.new_pref_id, 127);
        assert_eq!(spin.new_comp_id, 255);
    }
}
