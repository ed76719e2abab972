//! .aff ファイル（接辞定義）の解析。
//!
//! Myspell/Hunspell 形式の .aff ファイルを読み込み、接辞ブロックと
//! 各種ディレクティブを [`AffFile`] と構築コンテキストへ反映します。
//! 後置プレフィックス（PFXPOSTPONE）はここでプレフィックス木へ
//! 直接挿入されます。

pub(crate) mod expand;

use std::path::Path;

use hashbrown::HashMap;
use regex::Regex;

use crate::builder::{FromTo, SpellInfo};
use crate::errors::{Result, SpellError};
use crate::flags::{WFP_COMPFORBID, WFP_COMPPERMIT, WFP_NC, WFP_UP};
use crate::tree::PFX_FLAGS;

// 接辞が単語へ付くときの条件ビット。再帰展開の深さ制御に使います。
pub(crate) const CONDIT_COMB: u8 = 1; // 反対側の接辞と結合できる
pub(crate) const CONDIT_CFIX: u8 = 2; // CIRCUMFIX フラグが必要
pub(crate) const CONDIT_SUF: u8 = 4; // さらにサフィックスを試してよい
pub(crate) const CONDIT_AFF: u8 = 8; // 展開元がすでに接辞付き

// CHECKCOMPOUND* に対応する compoptions のビット。
pub(crate) const COMP_CHECKDUP: u8 = 1;
pub(crate) const COMP_CHECKREP: u8 = 2;
pub(crate) const COMP_CHECKCASE: u8 = 4;
pub(crate) const COMP_CHECKTRIPLE: u8 = 8;

/// FLAG ディレクティブで選ばれるフラグ表現の種別です。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FlagType {
    /// 1 文字 1 フラグ（既定）。
    #[default]
    Char,
    /// 2 文字で 1 フラグ（`FLAG long`）。
    Long,
    /// 先頭が大文字のときだけ 2 文字（`FLAG caplong`）。
    CapLong,
    /// カンマ区切りの番号（`FLAG num`）。
    Num,
}

/// PFX/SFX ブロック内の 1 規則です。
pub(crate) struct AffixEntry {
    /// 適用前に語から取り除く文字列。
    pub(crate) chop: Option<String>,
    /// 付け加える文字列。
    pub(crate) add: Option<String>,
    /// 条件の原文（`.` は None）。
    pub(crate) cond: Option<String>,
    /// 条件をアンカー付きで regex 化したもの。未変形の語に対して評価します。
    pub(crate) prog: Option<Regex>,
    /// `add/flags` 形式で規則に付いた二次フラグ列。
    pub(crate) flags: Option<String>,
    /// 二次フラグに COMPOUNDPERMITFLAG が含まれていた。
    pub(crate) comppermit: bool,
    /// 二次フラグに COMPOUNDFORBIDFLAG が含まれていた。
    pub(crate) compforbid: bool,
    /// 後置プレフィックスで chop を除去し大文字化へ置き換えた印。
    pub(crate) upper: bool,
}

/// PFX/SFX の 1 ブロック（同一フラグの規則の集まり）です。
pub(crate) struct AffixHeader {
    /// フラグの数値表現。
    pub(crate) flag: u32,
    /// 反対側の接辞と同時に使えるか（Y/N 列）。
    pub(crate) combine: bool,
    /// 後置プレフィックスに割り当てた ID。0 なら後置しません。
    pub(crate) new_id: u8,
    /// Myspell の継続ブロック印（末尾の "S"）。
    pub(crate) follows: bool,
    /// このブロックのどれかの規則が実際に後置された。
    pub(crate) postponed: bool,
    pub(crate) entries: Vec<AffixEntry>,
}

/// 解析済みの .aff ファイル全体です。
///
/// 特殊フラグ（RARE/KEEPCASE など）は 0 を「未設定」として u32 で
/// 保持します。compound 用フラグの振り直し結果は `comp_ids` に
/// キー文字列 → ID で残ります。
#[derive(Default)]
pub struct AffFile {
    pub(crate) flag_type: FlagType,
    pub(crate) prefixes: HashMap<String, AffixHeader>,
    pub(crate) suffixes: HashMap<String, AffixHeader>,
    pub(crate) comp_ids: HashMap<String, u8>,
    pub(crate) pfxpostpone: bool,
    pub(crate) ignoreextra: bool,
    pub(crate) rare: u32,
    pub(crate) keepcase: u32,
    pub(crate) bad: u32,
    pub(crate) needaffix: u32,
    pub(crate) circumfix: u32,
    pub(crate) nosuggest: u32,
    pub(crate) needcomp: u32,
    pub(crate) comproot: u32,
    pub(crate) compforbid: u32,
    pub(crate) comppermit: u32,
}

/// .aff ファイルを読み込みます。
///
/// REP/SAL/MAP や COMPOUND 系のディレクティブは `spin` 側に蓄積され、
/// 後置プレフィックスは `spin` のプレフィックス木へ挿入されます。
///
/// # 引数
///
/// * `spin` - 構築コンテキスト
/// * `path` - .aff ファイルのパス
///
/// # 戻り値
///
/// 解析済みの [`AffFile`] を返します。
///
/// # エラー
///
/// * [`SpellError::Io`] - ファイルが読めない場合
/// * [`SpellError::Utf8`] - UTF-8 として解釈できない場合
pub(crate) fn read_aff(spin: &mut SpellInfo, path: &Path) -> Result<AffFile> {
    let bytes = std::fs::read(path)?;
    let text = std::str::from_utf8(&bytes)?;
    let fname = path.display().to_string();

    log::info!("Reading affix file {}", fname);

    let mut aff = AffFile::default();

    // Only one of each of these sections is used; track what this file set
    // so cross-file differences can be reported at the end.
    let mut compflags: Option<String> = None;
    let mut compmax = 0u16;
    let mut compminlen = 0u16;
    let mut compsylmax = 0u16;
    let mut compoptions = 0u8;
    let mut syllable: Option<String> = None;
    let mut sofofrom: Option<String> = None;
    let mut sofoto: Option<String> = None;
    let mut midword: Option<String> = None;
    let mut found_map = false;

    // REP/SAL/MAP/REPSAL only go into the first .aff file that defines them.
    let do_rep = spin.rep.is_empty();
    let do_repsal = spin.repsal.is_empty();
    let do_sal = spin.sal.is_empty();
    let do_mapline = spin.map.is_empty();

    // Block currently being filled, keyed into prefixes/suffixes.
    let mut cur_key: Option<(bool, String)> = None;
    let mut aff_todo = 0usize;

    for (lnum0, raw) in text.lines().enumerate() {
        let lnum = lnum0 + 1;
        let line = raw.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let items: Vec<&str> = line.split_whitespace().collect();
        if items.is_empty() {
            continue;
        }

        if is_rule(&items, "SET", 2) {
            let enc = items[1].to_ascii_lowercase();
            if enc != "utf-8" && enc != "utf8" {
                log::warn!(
                    "Conversion in {} not supported: from {}",
                    fname,
                    items[1]
                );
            }
        } else if is_rule(&items, "FLAG", 2) && aff.flag_type == FlagType::Char {
            match items[1] {
                "long" => aff.flag_type = FlagType::Long,
                "num" => aff.flag_type = FlagType::Num,
                "caplong" => aff.flag_type = FlagType::CapLong,
                _ => log::warn!(
                    "Invalid value for FLAG in {} line {}: {}",
                    fname,
                    lnum,
                    items[1]
                ),
            }
            if aff.rare != 0
                || aff.keepcase != 0
                || aff.bad != 0
                || aff.needaffix != 0
                || aff.circumfix != 0
                || aff.needcomp != 0
                || aff.comproot != 0
                || aff.nosuggest != 0
                || compflags.is_some()
                || !aff.suffixes.is_empty()
                || !aff.prefixes.is_empty()
            {
                log::warn!("FLAG after using flags in {} line {}: {}", fname, lnum, items[1]);
            }
        } else if is_info_item(items[0]) && items.len() > 1 {
            if !spin.info.is_empty() {
                spin.info.push('\n');
            }
            spin.info.push_str(items[0]);
            spin.info.push(' ');
            spin.info.push_str(items[1]);
        } else if is_rule(&items, "MIDWORD", 2) && midword.is_none() {
            midword = Some(items[1].to_string());
        } else if is_rule(&items, "TRY", 2) {
            // ignored, the tree tells us what characters can appear
        } else if (is_rule(&items, "RAR", 2) || is_rule(&items, "RARE", 2)) && aff.rare == 0 {
            aff.rare = affitem2flag(aff.flag_type, items[1], &fname, lnum);
        } else if (is_rule(&items, "KEP", 2) || is_rule(&items, "KEEPCASE", 2))
            && aff.keepcase == 0
        {
            aff.keepcase = affitem2flag(aff.flag_type, items[1], &fname, lnum);
        } else if (is_rule(&items, "BAD", 2) || is_rule(&items, "FORBIDDENWORD", 2))
            && aff.bad == 0
        {
            aff.bad = affitem2flag(aff.flag_type, items[1], &fname, lnum);
        } else if is_rule(&items, "NEEDAFFIX", 2) && aff.needaffix == 0 {
            aff.needaffix = affitem2flag(aff.flag_type, items[1], &fname, lnum);
        } else if is_rule(&items, "CIRCUMFIX", 2) && aff.circumfix == 0 {
            aff.circumfix = affitem2flag(aff.flag_type, items[1], &fname, lnum);
        } else if is_rule(&items, "NOSUGGEST", 2) && aff.nosuggest == 0 {
            aff.nosuggest = affitem2flag(aff.flag_type, items[1], &fname, lnum);
        } else if (is_rule(&items, "NEEDCOMPOUND", 2) || is_rule(&items, "ONLYINCOMPOUND", 2))
            && aff.needcomp == 0
        {
            aff.needcomp = affitem2flag(aff.flag_type, items[1], &fname, lnum);
        } else if is_rule(&items, "COMPOUNDROOT", 2) && aff.comproot == 0 {
            aff.comproot = affitem2flag(aff.flag_type, items[1], &fname, lnum);
        } else if is_rule(&items, "COMPOUNDFORBIDFLAG", 2) && aff.compforbid == 0 {
            aff.compforbid = affitem2flag(aff.flag_type, items[1], &fname, lnum);
            if !aff.prefixes.is_empty() {
                log::warn!(
                    "Defining COMPOUNDFORBIDFLAG after PFX item may give wrong results in {} line {}",
                    fname,
                    lnum
                );
            }
        } else if is_rule(&items, "COMPOUNDPERMITFLAG", 2) && aff.comppermit == 0 {
            aff.comppermit = affitem2flag(aff.flag_type, items[1], &fname, lnum);
            if !aff.prefixes.is_empty() {
                log::warn!(
                    "Defining COMPOUNDPERMITFLAG after PFX item may give wrong results in {} line {}",
                    fname,
                    lnum
                );
            }
        } else if is_rule(&items, "COMPOUNDFLAG", 2) && compflags.is_none() {
            // Turn flag "c" into COMPOUNDRULE compatible string "c+".
            compflags = Some(format!("{}+", items[1]));
        } else if is_rule(&items, "COMPOUNDRULES", 2) {
            // Only the count is checked, the value itself is unused.
            if items[1].parse::<usize>().unwrap_or(0) == 0 {
                log::warn!(
                    "Wrong COMPOUNDRULES value in {} line {}: {}",
                    fname,
                    lnum,
                    items[1]
                );
            }
        } else if is_rule(&items, "COMPOUNDRULE", 2) {
            // Don't use the first rule if it is a number (it's the count).
            if compflags.is_some() || !items[1].chars().all(|c| c.is_ascii_digit()) {
                match compflags {
                    Some(ref mut s) => {
                        s.push('/');
                        s.push_str(items[1]);
                    }
                    None => compflags = Some(items[1].to_string()),
                }
            }
        } else if is_rule(&items, "COMPOUNDWORDMAX", 2) && compmax == 0 {
            compmax = items[1].parse().unwrap_or(0);
            if compmax == 0 {
                log::warn!(
                    "Wrong COMPOUNDWORDMAX value in {} line {}: {}",
                    fname,
                    lnum,
                    items[1]
                );
            }
        } else if is_rule(&items, "COMPOUNDMIN", 2) && compminlen == 0 {
            compminlen = items[1].parse().unwrap_or(0);
            if compminlen == 0 {
                log::warn!(
                    "Wrong COMPOUNDMIN value in {} line {}: {}",
                    fname,
                    lnum,
                    items[1]
                );
            }
        } else if is_rule(&items, "COMPOUNDSYLMAX", 2) && compsylmax == 0 {
            compsylmax = items[1].parse().unwrap_or(0);
            if compsylmax == 0 {
                log::warn!(
                    "Wrong COMPOUNDSYLMAX value in {} line {}: {}",
                    fname,
                    lnum,
                    items[1]
                );
            }
        } else if is_rule(&items, "CHECKCOMPOUNDDUP", 1) {
            compoptions |= COMP_CHECKDUP;
        } else if is_rule(&items, "CHECKCOMPOUNDREP", 1) {
            compoptions |= COMP_CHECKREP;
        } else if is_rule(&items, "CHECKCOMPOUNDCASE", 1) {
            compoptions |= COMP_CHECKCASE;
        } else if is_rule(&items, "CHECKCOMPOUNDTRIPLE", 1) {
            compoptions |= COMP_CHECKTRIPLE;
        } else if is_rule(&items, "CHECKCOMPOUNDPATTERN", 2) {
            if items[1].parse::<usize>().unwrap_or(0) == 0 {
                log::warn!(
                    "Wrong CHECKCOMPOUNDPATTERN value in {} line {}: {}",
                    fname,
                    lnum,
                    items[1]
                );
            }
        } else if is_rule(&items, "CHECKCOMPOUNDPATTERN", 3) {
            let pair = (items[1].to_string(), items[2].to_string());
            if !spin.comppat.contains(&pair) {
                spin.comppat.push(pair);
            }
        } else if is_rule(&items, "SYLLABLE", 2) && syllable.is_none() {
            syllable = Some(items[1].to_string());
        } else if is_rule(&items, "NOBREAK", 1) {
            spin.nobreak = true;
        } else if is_rule(&items, "NOSPLITSUGS", 1) {
            spin.nosplitsugs = true;
        } else if is_rule(&items, "NOCOMPOUNDSUGS", 1) {
            spin.nocompoundsugs = true;
        } else if is_rule(&items, "NOSUGFILE", 1) {
            spin.nosugfile = true;
        } else if is_rule(&items, "PFXPOSTPONE", 1) {
            aff.pfxpostpone = true;
        } else if is_rule(&items, "IGNOREEXTRA", 1) {
            aff.ignoreextra = true;
        } else if (items[0] == "PFX" || items[0] == "SFX") && aff_todo == 0 && items.len() >= 4 {
            let prefix = items[0] == "PFX";
            read_affix_header(spin, &mut aff, &items, prefix, &fname, lnum);
            cur_key = Some((prefix, items[1].to_string()));
            aff_todo = items[3].parse().unwrap_or(0);
        } else if (items[0] == "PFX" || items[0] == "SFX")
            && aff_todo > 0
            && cur_key.as_ref().is_some_and(|(p, k)| {
                *p == (items[0] == "PFX") && k == items[1]
            })
            && items.len() >= 5
        {
            aff_todo -= 1;
            let last = aff_todo == 0;
            let (prefix, key) = cur_key.clone().unwrap();
            read_affix_entry(spin, &mut aff, &items, prefix, &key, last, &fname, lnum);
        } else if is_rule(&items, "FOL", 2)
            || is_rule(&items, "LOW", 2)
            || is_rule(&items, "UPP", 2)
        {
            // Case tables are taken from Unicode, these are accepted and
            // ignored so old affix files keep loading.
            log::debug!("Ignoring {} table in {} line {}", items[0], fname, lnum);
        } else if (is_rule(&items, "REP", 2) || is_rule(&items, "REPSAL", 2))
            && items[1].chars().next().is_some_and(|c| c.is_ascii_digit())
        {
            // Ignore the REP/REPSAL count.
        } else if (items[0] == "REP" || items[0] == "REPSAL") && items.len() >= 3 {
            if if items[0] == "REPSAL" { do_repsal } else { do_rep } {
                // An underscore stands for a space.
                let from = items[1].replace('_', " ");
                let to = items[2].replace('_', " ");
                let gap = if items[0] == "REPSAL" {
                    &mut spin.repsal
                } else {
                    &mut spin.rep
                };
                gap.push(FromTo::folded(&from, &to));
            }
        } else if is_rule(&items, "MAP", 2) {
            if !found_map {
                // First line contains the count.
                found_map = true;
                if !items[1].chars().next().is_some_and(|c| c.is_ascii_digit()) {
                    log::warn!("Expected MAP count in {} line {}", fname, lnum);
                }
            } else if do_mapline {
                // Check that every character appears only once.
                for (i, c) in items[1].char_indices() {
                    let rest = &items[1][i + c.len_utf8()..];
                    if spin.map.contains(c) || rest.contains(c) {
                        log::warn!("Duplicate character in MAP in {} line {}", fname, lnum);
                    }
                }
                // The MAP strings are simply concatenated, separated by '/'.
                spin.map.push_str(items[1]);
                spin.map.push('/');
            }
        } else if is_rule(&items, "SAL", 3) {
            if do_sal {
                match items[1] {
                    "followup" => spin.followup = sal_to_bool(items[2]),
                    "collapse_result" => spin.collapse = sal_to_bool(items[2]),
                    "remove_accents" => spin.rem_accents = sal_to_bool(items[2]),
                    // When "to" is "_" it means empty.
                    _ => spin.sal.push(FromTo::folded(
                        items[1],
                        if items[2] == "_" { "" } else { items[2] },
                    )),
                }
            }
        } else if is_rule(&items, "SOFOFROM", 2) && sofofrom.is_none() {
            sofofrom = Some(items[1].to_string());
        } else if is_rule(&items, "SOFOTO", 2) && sofoto.is_none() {
            sofoto = Some(items[1].to_string());
        } else if items[0] == "COMMON" {
            for word in &items[1..] {
                spin.common_words.insert((*word).to_string());
            }
        } else {
            log::warn!(
                "Unrecognized or duplicate item in {} line {}: {}",
                fname,
                lnum,
                items[0]
            );
        }
    }

    // Merge the compound specifications into the spell info, warning when
    // a second .aff file uses different values.
    if compmax != 0 {
        aff_check_number(spin.compmax, compmax, "COMPOUNDWORDMAX");
        spin.compmax = compmax;
    }
    if compminlen != 0 {
        aff_check_number(spin.compminlen, compminlen, "COMPOUNDMIN");
        spin.compminlen = compminlen;
    }
    if compsylmax != 0 {
        if syllable.is_none() {
            log::warn!("COMPOUNDSYLMAX used without SYLLABLE");
        }
        aff_check_number(spin.compsylmax, compsylmax, "COMPOUNDSYLMAX");
        spin.compsylmax = compsylmax;
    }
    if compoptions != 0 {
        aff_check_number(spin.compoptions, compoptions, "COMPOUND options");
        spin.compoptions |= compoptions;
    }
    if let Some(flags) = compflags {
        process_compflags(spin, &mut aff, &flags);
    }

    // Check that we didn't use too many renumbered flags.
    if spin.new_comp_id < spin.new_pref_id {
        if spin.new_comp_id == 127 || spin.new_comp_id == 255 {
            log::warn!("Too many postponed prefixes");
        } else if spin.new_pref_id == 0 || spin.new_pref_id == 127 {
            log::warn!("Too many compound flags");
        } else {
            log::warn!("Too many postponed prefixes and/or compound flags");
        }
    }

    if let Some(s) = syllable {
        aff_check_string(&spin.syllable, &Some(s.clone()), "SYLLABLE");
        spin.syllable = Some(s);
    }
    if sofofrom.is_some() || sofoto.is_some() {
        if sofofrom.is_none() || sofoto.is_none() {
            log::warn!(
                "Missing SOFO{} line in {}",
                if sofofrom.is_none() { "FROM" } else { "TO" },
                fname
            );
        } else if !spin.sal.is_empty() {
            log::warn!("Both SAL and SOFO lines in {}", fname);
        } else {
            aff_check_string(&spin.sofofr, &sofofrom, "SOFOFROM");
            aff_check_string(&spin.sofoto, &sofoto, "SOFOTO");
            spin.sofofr = sofofrom;
            spin.sofoto = sofoto;
        }
    }
    if let Some(s) = midword {
        aff_check_string(&spin.midword, &Some(s.clone()), "MIDWORD");
        spin.midword = Some(s);
    }

    Ok(aff)
}

/// PFX/SFX のブロック先頭行を処理します。
fn read_affix_header(
    spin: &mut SpellInfo,
    aff: &mut AffFile,
    items: &[&str],
    prefix: bool,
    fname: &str,
    lnum: usize,
) {
    let table = if prefix { &mut aff.prefixes } else { &mut aff.suffixes };
    let combine = items[2] == "Y";
    if items[2] != "Y" && items[2] != "N" {
        log::warn!("Expected Y or N in {} line {}: {}", fname, lnum, items[2]);
    }

    // Myspell allows the same affix name to be used multiple times; such
    // files carry an undocumented "S" item on all but the last block.
    let follows = items.len() > 4 && items[4] == "S";
    if items.len() > 4 && !follows && !aff.ignoreextra && !items[4].starts_with('#') {
        log::warn!("Trailing text in {} line {}: {}", fname, lnum, items[4]);
    }

    if let Some(cur) = table.get_mut(items[1]) {
        if cur.combine != combine {
            log::warn!(
                "Different combining flag in continued affix block in {} line {}: {}",
                fname,
                lnum,
                items[1]
            );
        }
        if !cur.follows {
            log::warn!("Duplicate affix in {} line {}: {}", fname, lnum, items[1]);
        }
        cur.follows = follows;
        if prefix && aff.pfxpostpone && cur.new_id == 0 {
            spin.check_renumber();
            spin.new_pref_id += 1;
            cur.new_id = spin.new_pref_id;
        }
        return;
    }

    let flag = affitem2flag(aff.flag_type, items[1], fname, lnum);
    if flag != 0
        && (flag == aff.bad
            || flag == aff.rare
            || flag == aff.keepcase
            || flag == aff.needaffix
            || flag == aff.circumfix
            || flag == aff.nosuggest
            || flag == aff.needcomp
            || flag == aff.comproot)
    {
        log::warn!(
            "Affix also used for BAD/RARE/KEEPCASE/NEEDAFFIX/NEEDCOMPOUND/NOSUGGEST in {} line {}: {}",
            fname,
            lnum,
            items[1]
        );
    }

    let mut new_id = 0;
    if prefix && aff.pfxpostpone {
        // Assign a new number now so multiple .aff files can be combined;
        // it is taken back when no entry actually gets postponed.
        spin.check_renumber();
        spin.new_pref_id += 1;
        new_id = spin.new_pref_id;
    }

    let table = if prefix { &mut aff.prefixes } else { &mut aff.suffixes };
    table.insert(
        items[1].to_string(),
        AffixHeader {
            flag,
            combine,
            new_id,
            follows,
            postponed: false,
            entries: Vec::new(),
        },
    );
}

/// PFX/SFX の規則行を処理します。
///
/// 後置プレフィックスになれる規則はここでプレフィックス木へ挿入し、
/// ブロックの最後の規則まで一度も後置できなかった場合は予約した ID を
/// 返上します。
#[allow(clippy::too_many_arguments)]
fn read_affix_entry(
    spin: &mut SpellInfo,
    aff: &mut AffFile,
    items: &[&str],
    prefix: bool,
    key: &str,
    last_entry: bool,
    fname: &str,
    lnum: usize,
) {
    if items.len() > 5 && !items[5].starts_with('#') && !aff.ignoreextra && items[5] != "-" {
        log::warn!("Trailing text in {} line {}: {}", fname, lnum, items[5]);
    }

    let mut entry = AffixEntry {
        chop: (items[2] != "0").then(|| items[2].to_string()),
        add: None,
        cond: None,
        prog: None,
        flags: None,
        comppermit: false,
        compforbid: false,
        upper: false,
    };

    if items[3] != "0" {
        // Recognize flags on the affix: abcd/XYZ
        match items[3].split_once('/') {
            Some((add, flags)) => {
                entry.add = Some(add.to_string());
                let mut flags = flags.to_string();
                strip_compound_flags(aff, &mut flags, &mut entry);
                if !flags.is_empty() {
                    entry.flags = Some(flags);
                }
            }
            None => entry.add = Some(items[3].to_string()),
        }
    }

    // Affix entries with non-ASCII characters are dropped in ASCII mode.
    if spin.ascii
        && (entry.chop.as_deref().is_some_and(has_non_ascii)
            || entry.add.as_deref().is_some_and(has_non_ascii))
    {
        return;
    }

    if items[4] != "." {
        entry.cond = Some(items[4].to_string());
        match cond_to_regex(items[4], prefix) {
            Ok(prog) => entry.prog = Some(prog),
            Err(_) => {
                log::warn!("Broken condition in {} line {}: {}", fname, lnum, items[4]);
            }
        }
    }

    let mut did_postpone = false;
    if prefix && aff.pfxpostpone && entry.flags.is_none() {
        maybe_upper_entry(&mut entry, prefix);

        if entry.chop.is_none() {
            // Find a previously used condition, or add a new one.
            let idx = match spin.prefcond.iter().position(|c| c.as_deref() == entry.cond.as_deref())
            {
                Some(idx) => idx,
                None => {
                    spin.prefcond.push(entry.cond.clone());
                    spin.prefcond.len() - 1
                }
            };

            let header = &aff.prefixes[key];
            let mut n = PFX_FLAGS;
            if !header.combine {
                n |= WFP_NC;
            }
            if entry.upper {
                n |= WFP_UP;
            }
            if entry.comppermit {
                n |= WFP_COMPPERMIT;
            }
            if entry.compforbid {
                n |= WFP_COMPFORBID;
            }

            let word = entry.add.clone().unwrap_or_default();
            let new_id = header.new_id;
            spin.prefix.insert(word.as_bytes(), n, idx as u16, new_id);
            did_postpone = true;
        }
    }

    let pfxpostpone = aff.pfxpostpone;
    let header = aff
        .tables_mut(prefix)
        .get_mut(key)
        .expect("header exists for entries");
    if did_postpone {
        header.postponed = true;
    }
    // Take the reserved ID back when no entry of the block got postponed.
    if prefix && pfxpostpone && last_entry && !header.postponed && header.new_id != 0 {
        spin.new_pref_id -= 1;
        header.new_id = 0;
    }
    header.entries.push(entry);
}

impl AffFile {
    fn tables_mut(&mut self, prefix: bool) -> &mut HashMap<String, AffixHeader> {
        if prefix {
            &mut self.prefixes
        } else {
            &mut self.suffixes
        }
    }
}

/// chop が小文字 1 文字で add がその大文字で終わるプレフィックス規則を、
/// 語頭の大文字化として表現し直します。条件は実際の語と照合されるので
/// 先頭だけ大文字化した形で regex を作り直します。
fn maybe_upper_entry(entry: &mut AffixEntry, prefix: bool) {
    let (Some(chop), Some(add)) = (entry.chop.clone(), entry.add.clone()) else {
        return;
    };
    let mut chop_chars = chop.chars();
    let Some(c) = chop_chars.next() else { return };
    if chop_chars.next().is_some() {
        return;
    }
    let c_up: Vec<char> = c.to_uppercase().collect();
    let [c_up] = c_up[..] else { return };
    if c_up == c {
        return;
    }
    if let Some(cond) = &entry.cond {
        if cond.chars().next() != Some(c) {
            return;
        }
    }
    let Some(last) = add.chars().last() else { return };
    if last != c_up {
        return;
    }

    entry.upper = true;
    entry.chop = None;
    entry.add = Some(add[..add.len() - c_up.len_utf8()].to_string());

    if let Some(cond) = entry.cond.take() {
        // Capitalize the condition's first character to match the word.
        let mut capped = String::with_capacity(cond.len());
        let mut chars = cond.chars();
        if let Some(first) = chars.next() {
            capped.extend(first.to_uppercase());
            capped.push_str(chars.as_str());
        }
        if let Ok(prog) = cond_to_regex(&capped, prefix) {
            entry.prog = Some(prog);
        }
        entry.cond = Some(capped);
    }
}

/// 規則の二次フラグ列から COMPOUNDPERMITFLAG / COMPOUNDFORBIDFLAG を
/// 取り除き、entry 側のブールへ移します。
fn strip_compound_flags(aff: &AffFile, flags: &mut String, entry: &mut AffixEntry) {
    if aff.comppermit == 0 && aff.compforbid == 0 {
        return;
    }
    let mut kept = String::with_capacity(flags.len());
    for (flag, text) in afflist_items(aff.flag_type, flags) {
        if flag != 0 && flag == aff.comppermit {
            entry.comppermit = true;
        } else if flag != 0 && flag == aff.compforbid {
            entry.compforbid = true;
        } else {
            if aff.flag_type == FlagType::Num && !kept.is_empty() {
                kept.push(',');
            }
            kept.push_str(text);
        }
    }
    *flags = kept;
}

/// COMPOUNDRULE 等で使われたフラグ列を 1 バイトの ID へ振り直し、
/// `spin.compflags` へ追記します。ワイルドカード文字は素通しです。
pub(crate) fn process_compflags(spin: &mut SpellInfo, aff: &mut AffFile, compflags: &str) {
    if !spin.compflags.is_empty() {
        spin.compflags.push(b'/');
    }

    let mut rest = compflags;
    while !rest.is_empty() {
        let c = rest.chars().next().unwrap();
        // Copy non-flag characters directly.
        if "/?*+[]".contains(c) {
            spin.compflags.push(c as u8);
            rest = &rest[c.len_utf8()..];
            continue;
        }
        let (flag, text, tail) = take_affitem(aff.flag_type, rest);
        if tail.len() == rest.len() {
            // Malformed item, skip one character to make progress.
            rest = &rest[c.len_utf8()..];
            continue;
        }
        rest = tail;
        if flag != 0 {
            let id = match aff.comp_ids.get(text) {
                Some(&id) => id,
                None => {
                    // Avoid IDs that have a special meaning in a regexp,
                    // also inside [].
                    let id = loop {
                        spin.check_renumber();
                        let id = spin.new_comp_id;
                        spin.new_comp_id -= 1;
                        if !b"/?*+[]\\-^".contains(&id) {
                            break id;
                        }
                    };
                    aff.comp_ids.insert(text.to_string(), id);
                    id
                }
            };
            spin.compflags.push(id);
        }
        if aff.flag_type == FlagType::Num && rest.starts_with(',') {
            rest = &rest[1..];
        }
    }
}

/// 単語のフラグ列から WF_* ビットを作ります。
pub(crate) fn get_affix_flags(aff: &AffFile, afflist: &str) -> u16 {
    use crate::flags::*;
    let mut flags = 0;
    let has = |f: u32| f != 0 && flag_in_afflist(aff.flag_type, afflist, f);
    if has(aff.keepcase) {
        flags |= WF_KEEPCAP | WF_FIXCAP;
    }
    if has(aff.rare) {
        flags |= WF_RARE;
    }
    if has(aff.bad) {
        flags |= WF_BANNED;
    }
    if has(aff.needcomp) {
        flags |= WF_NEEDCOMP;
    }
    if has(aff.comproot) {
        flags |= WF_COMPROOT;
    }
    if has(aff.nosuggest) {
        flags |= WF_NOSUGGEST;
    }
    flags
}

/// フラグ列に含まれる後置プレフィックスの ID を集めます。
pub(crate) fn get_pfxlist(aff: &AffFile, afflist: &str) -> Vec<u8> {
    let mut ids = Vec::new();
    for (flag, text) in afflist_items(aff.flag_type, afflist) {
        if flag == 0 {
            continue;
        }
        if let Some(h) = aff.prefixes.get(text) {
            if h.new_id != 0 {
                ids.push(h.new_id);
            }
        }
    }
    ids
}

/// フラグ列に含まれる compound フラグの ID を集めます。
pub(crate) fn get_compflags(aff: &AffFile, afflist: &str) -> Vec<u8> {
    let mut ids = Vec::new();
    for (flag, text) in afflist_items(aff.flag_type, afflist) {
        if flag == 0 {
            continue;
        }
        if let Some(&id) = aff.comp_ids.get(text) {
            ids.push(id);
        }
    }
    ids
}

/// ディレクティブ引数のフラグを数値にします。失敗は 0 を返して警告します。
fn affitem2flag(ft: FlagType, item: &str, fname: &str, lnum: usize) -> u32 {
    let (flag, _, rest) = take_affitem(ft, item);
    if flag == 0 || !rest.is_empty() {
        if ft == FlagType::Num {
            log::warn!("Flag is not a number in {} line {}: {}", fname, lnum, item);
        } else {
            log::warn!("Illegal flag in {} line {}: {}", fname, lnum, item);
        }
        return 0;
    }
    flag
}

/// フラグ列の先頭から 1 フラグを切り出します。
///
/// 戻り値は（数値、原文、残り）。不正なら数値 0 で残りを進めません。
fn take_affitem(ft: FlagType, s: &str) -> (u32, &str, &str) {
    match ft {
        FlagType::Num => {
            let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
            if end == 0 {
                return (0, "", s);
            }
            let text = &s[..end];
            match text.parse::<u32>() {
                Ok(n) if n <= 65000 => (n, text, &s[end..]),
                _ => (0, "", s),
            }
        }
        _ => {
            let mut chars = s.char_indices();
            let Some((_, c1)) = chars.next() else {
                return (0, "", s);
            };
            let mut flag = c1 as u32;
            let mut end = c1.len_utf8();
            if ft == FlagType::Long || (ft == FlagType::CapLong && c1.is_ascii_uppercase()) {
                if let Some((i, c2)) = chars.next() {
                    flag = (flag << 16) + c2 as u32;
                    end = i + c2.len_utf8();
                } else if ft == FlagType::Long {
                    return (0, "", s);
                }
            }
            (flag, &s[..end], &s[end..])
        }
    }
}

/// フラグ列を（数値、原文）の並びとして順に返します。
fn afflist_items(ft: FlagType, list: &str) -> Vec<(u32, &str)> {
    let mut out = Vec::new();
    let mut rest = list;
    while !rest.is_empty() {
        let (flag, text, tail) = take_affitem(ft, rest);
        if tail.len() == rest.len() {
            // Malformed item, skip one character to make progress.
            let c = rest.chars().next().unwrap();
            rest = &rest[c.len_utf8()..];
            continue;
        }
        out.push((flag, text));
        rest = tail;
        if ft == FlagType::Num && rest.starts_with(',') {
            rest = &rest[1..];
        }
    }
    out
}

/// フラグ列に `flag` が含まれるかどうかを返します。
pub(crate) fn flag_in_afflist(ft: FlagType, afflist: &str, flag: u32) -> bool {
    afflist_items(ft, afflist).iter().any(|&(f, _)| f == flag)
}

/// 接辞条件をアンカー付きの正規表現へ変換します。
///
/// 条件で意味を持つのは文字クラス `[...]`（`^` 否定つき）と `.` だけで、
/// それ以外の文字はリテラルとして扱います。
fn cond_to_regex(cond: &str, prefix: bool) -> Result<Regex> {
    let mut pat = String::with_capacity(cond.len() + 2);
    if prefix {
        pat.push('^');
    }
    let mut in_class = false;
    let mut class_start = false;
    for c in cond.chars() {
        match c {
            '[' if !in_class => {
                in_class = true;
                class_start = true;
                pat.push('[');
                continue;
            }
            ']' if in_class => {
                in_class = false;
                pat.push(']');
            }
            '^' if class_start => pat.push('^'),
            '.' if !in_class => pat.push('.'),
            _ => {
                if c.is_ascii() && !c.is_ascii_alphanumeric() {
                    pat.push('\\');
                }
                pat.push(c);
            }
        }
        class_start = false;
    }
    if !prefix {
        pat.push('$');
    }
    Regex::new(&pat)
        .map_err(|e| SpellError::invalid_argument("cond", format!("broken condition: {e}")))
}

fn sal_to_bool(s: &str) -> bool {
    s == "1" || s == "true"
}

fn has_non_ascii(s: &str) -> bool {
    !s.is_ascii()
}

fn is_rule(items: &[&str], name: &str, mincount: usize) -> bool {
    items[0] == name && items.len() >= mincount
}

fn is_info_item(item: &str) -> bool {
    matches!(item, "NAME" | "HOME" | "VERSION" | "AUTHOR" | "EMAIL" | "COPYRIGHT")
}

fn aff_check_number(spinval: impl Into<u32>, affval: impl Into<u32>, name: &str) {
    let spinval = spinval.into();
    if spinval != 0 && spinval != affval.into() {
        log::warn!("{} value differs from what is used in another .aff file", name);
    }
}

fn aff_check_string(spinval: &Option<String>, affval: &Option<String>, name: &str) {
    if let (Some(a), Some(b)) = (spinval, affval) {
        if a != b {
            log::warn!("{} value differs from what is used in another .aff file", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_long_flags() {
        let (f, text, rest) = take_affitem(FlagType::Long, "AbCd");
        assert_eq!(f, (('A' as u32) << 16) + 'b' as u32);
        assert_eq!(text, "Ab");
        assert_eq!(rest, "Cd");
    }

    #[test]
    fn take_num_flags() {
        assert!(flag_in_afflist(FlagType::Num, "12,345,6", 345));
        assert!(!flag_in_afflist(FlagType::Num, "12,345,6", 34));
        // Values above 65000 are invalid.
        let (f, _, _) = take_affitem(FlagType::Num, "70000");
        assert_eq!(f, 0);
    }

    #[test]
    fn caplong_takes_two_only_after_capital() {
        assert!(flag_in_afflist(FlagType::CapLong, "Aa", (('A' as u32) << 16) + 'a' as u32));
        assert!(flag_in_afflist(FlagType::CapLong, "bAa", 'b' as u32));
    }

    #[test]
    fn condition_regexes_are_anchored() {
        let re = cond_to_regex("[^aeiou]y", false).unwrap();
        assert!(re.is_match("happy"));
        assert!(!re.is_match("play"));
        assert!(!re.is_match("happyx"));

        let re = cond_to_regex("qu", true).unwrap();
        assert!(re.is_match("quick"));
        assert!(!re.is_match("acquit"));
    }
}
