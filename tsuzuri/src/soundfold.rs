//! サウンドフォールド(発音の正規化)と .sug ファイルの生成。
//!
//! 辞書の SOFO 文字対応表、または SAL 規則を使って単語を発音形へ
//! 畳み込みます。SAL は最長一致で適用し、salflags に従って連続重複の
//! 除去とアクセント記号の除去を行います。`make_sug_file` は書き出した
//! 直後の .spl を読み戻し、fold 木の全単語を畳み込んだ木と単語番号
//! テーブルを .sug ファイルへ書きます。

use std::path::Path;

use crate::builder::{FromTo, SpellInfo};
use crate::dictionary::{self, Dictionary};
use crate::errors::{Result, SpellError};
use crate::tree::{NodeId, TreeKind, WordTree, MAXWLEN, NIL};

/// 1 本の SAL 規則。
///
/// `from` 側は先頭の一致文字列、括弧内の選択文字、および後続の
/// 制御文字(`^` 語頭のみ、`$` 語末のみ、`<` 置換結果を再走査、
/// 数字と `-` は優先度情報で照合では無視)に分解されます。
#[derive(Debug, Clone)]
struct SalRule {
    lead: Vec<char>,
    oneof: Vec<char>,
    at_start: bool,
    at_end: bool,
    retry: bool,
    to: Vec<char>,
}

impl SalRule {
    fn parse(item: &FromTo) -> Self {
        let mut lead = Vec::new();
        let mut oneof = Vec::new();
        let mut at_start = false;
        let mut at_end = false;
        let mut retry = false;

        let mut chars = item.from.chars().peekable();
        while let Some(&c) = chars.peek() {
            if c == '(' || "^$-<".contains(c) || c.is_ascii_digit() {
                break;
            }
            lead.extend(c.to_lowercase());
            chars.next();
        }
        if chars.peek() == Some(&'(') {
            chars.next();
            for c in chars.by_ref() {
                if c == ')' {
                    break;
                }
                oneof.extend(c.to_lowercase());
            }
        }
        for c in chars {
            match c {
                '^' => at_start = true,
                '$' => at_end = true,
                '<' => retry = true,
                // Digits give a priority and '-' marks a partial
                // replacement, both only refine rule order.
                _ => {}
            }
        }

        let to: Vec<char> = if item.to == "_" {
            Vec::new()
        } else {
            item.to.chars().flat_map(|c| c.to_lowercase()).collect()
        };
        Self {
            lead,
            oneof,
            at_start,
            at_end,
            retry,
            to,
        }
    }

    /// `word[pos..]` に一致したら消費する文字数を返します。
    fn matches(&self, word: &[char], pos: usize) -> Option<usize> {
        if self.at_start && pos != 0 {
            return None;
        }
        let rest = &word[pos..];
        if rest.len() < self.lead.len() || rest[..self.lead.len()] != self.lead[..] {
            return None;
        }
        let mut used = self.lead.len();
        if !self.oneof.is_empty() {
            match rest.get(used) {
                Some(c) if self.oneof.contains(c) => used += 1,
                _ => return None,
            }
        }
        if self.at_end && pos + used != word.len() {
            return None;
        }
        Some(used)
    }
}

enum Method {
    /// SOFO の 1 文字対応。対応のない文字は落とします。
    Sofo { from: Vec<char>, to: Vec<char> },
    /// SAL 規則の列。
    Sal(Vec<SalRule>),
    /// 畳み込み情報なし。ケースフォールドのみ行います。
    None,
}

/// 単語を発音形へ畳み込む変換器。
pub struct SoundFolder {
    method: Method,
    followup: bool,
    collapse: bool,
    rem_accents: bool,
}

impl SoundFolder {
    /// 読み込み済み辞書の畳み込み情報から作ります。
    ///
    /// # エラー
    ///
    /// * [`SpellError::Malformed`] - SOFO の from と to の文字数が
    ///   一致しない場合
    pub fn from_dictionary(dict: &Dictionary) -> Result<Self> {
        if let (Some(fr), Some(to)) = (&dict.sofofr, &dict.sofoto) {
            return Self::from_sofo(fr, to);
        }
        if !dict.sal.is_empty() {
            return Ok(Self::from_sal(
                &dict.sal,
                dict.followup,
                dict.collapse,
                dict.rem_accents,
            ));
        }
        Ok(Self {
            method: Method::None,
            followup: false,
            collapse: false,
            rem_accents: false,
        })
    }

    /// SOFO の対応表から作ります。
    pub fn from_sofo(from: &str, to: &str) -> Result<Self> {
        let from: Vec<char> = from.chars().collect();
        let to: Vec<char> = to.chars().collect();
        if from.len() != to.len() {
            return Err(SpellError::malformed(
                "SOFOFROM and SOFOTO differ in length",
            ));
        }
        Ok(Self {
            method: Method::Sofo { from, to },
            followup: false,
            collapse: false,
            rem_accents: false,
        })
    }

    /// SAL 規則とフラグから作ります。
    pub fn from_sal(items: &[FromTo], followup: bool, collapse: bool, rem_accents: bool) -> Self {
        Self {
            method: Method::Sal(items.iter().map(SalRule::parse).collect()),
            followup,
            collapse,
            rem_accents,
        }
    }

    /// 単語をサウンドフォールドします。
    ///
    /// 入力はケースフォールド済みでなくても構いません。空白の並びは
    /// 1 つの空白にまとめられます。
    ///
    /// # 引数
    ///
    /// * `word` - 畳み込む単語
    pub fn fold(&self, word: &str) -> String {
        let mut chars: Vec<char> = Vec::with_capacity(word.len());
        let mut in_white = false;
        for c in word.chars().flat_map(|c| c.to_lowercase()) {
            if self.rem_accents && ('\u{300}'..='\u{36f}').contains(&c) {
                continue;
            }
            if c.is_whitespace() {
                if !in_white {
                    chars.push(' ');
                }
                in_white = true;
            } else {
                chars.push(c);
                in_white = false;
            }
        }

        match &self.method {
            Method::Sofo { from, to } => self.fold_sofo(&chars, from, to),
            Method::Sal(rules) => self.fold_sal(chars, rules),
            Method::None => chars.into_iter().collect(),
        }
    }

    fn fold_sofo(&self, word: &[char], from: &[char], to: &[char]) -> String {
        let mut out = String::with_capacity(word.len());
        for &c in word {
            if c == ' ' {
                out.push(' ');
            } else if let Some(i) = from.iter().position(|&f| f == c) {
                out.push(to[i]);
            }
            // Characters without a mapping are dropped.
        }
        out
    }

    fn fold_sal(&self, mut word: Vec<char>, rules: &[SalRule]) -> String {
        let mut out: Vec<char> = Vec::with_capacity(word.len());
        let push = |out: &mut Vec<char>, c: char, collapse: bool| {
            if !(collapse && out.last() == Some(&c)) {
                out.push(c);
            }
        };

        let mut pos = 0usize;
        // Retry rules splice their replacement back into the word, cap the
        // number of steps so a rule set cannot loop forever.
        let mut steps = word.len().saturating_mul(8) + 64;
        while pos < word.len() {
            if steps == 0 {
                push(&mut out, word[pos], self.collapse);
                pos += 1;
                continue;
            }
            steps -= 1;

            // Longest match wins, ties go to the rule listed first.
            let mut best: Option<(usize, &SalRule)> = None;
            for rule in rules {
                if let Some(used) = rule.matches(&word, pos) {
                    if best.map_or(true, |(b, _)| used > b) {
                        best = Some((used, rule));
                    }
                }
            }

            match best {
                Some((used, rule)) if self.followup && rule.retry => {
                    // Replace the match and examine the result again.
                    word.splice(pos..pos + used, rule.to.iter().copied());
                }
                Some((used, rule)) => {
                    for &c in &rule.to {
                        push(&mut out, c, self.collapse);
                    }
                    pos += used;
                }
                None => {
                    push(&mut out, word[pos], self.collapse);
                    pos += 1;
                }
            }
        }
        out.into_iter().collect()
    }
}

/// 単語番号のオフセットを 1〜4 バイトに詰めます。
///
/// UTF-8 に似ていますが後続バイトの印が要らない分だけ詰まっています。
/// 各成分は NUL を避けるため 1 を足して格納されます。
pub(crate) fn offset_to_bytes(buf: &mut Vec<u8>, nr: u32) {
    let b1 = nr % 255 + 1;
    let mut rem = nr / 255;
    let b2 = rem % 255 + 1;
    rem /= 255;
    let b3 = rem % 255 + 1;
    let b4 = rem / 255 + 1;

    if b4 > 1 || b3 > 0x1f {
        buf.push((0xe0 + b4) as u8);
        buf.push(b3 as u8);
        buf.push(b2 as u8);
        buf.push(b1 as u8);
    } else if b3 > 1 || b2 > 0x3f {
        buf.push((0xc0 + b3) as u8);
        buf.push(b2 as u8);
        buf.push(b1 as u8);
    } else if b2 > 1 || b1 > 0x7f {
        buf.push((0x80 + b2) as u8);
        buf.push(b1 as u8);
    } else {
        buf.push(b1 as u8);
    }
}

/// .sug ファイルを作ります。
///
/// 書き出した直後の .spl を読み戻し、fold 木の各単語を畳み込んで
/// サウンドフォールド木を作り、単語番号テーブルとともに `.spl` を
/// `.sug` に変えた名前で書き出します。
///
/// # エラー
///
/// * [`SpellError::Interrupted`] - 中断された場合
/// * 読み戻しや書き出しの入出力エラー
pub(crate) fn make_sug_file(spin: &mut SpellInfo, wfname: &Path) -> Result<()> {
    log::info!("Reading back spell file...");
    let dict = Dictionary::from_path(wfname)?;
    let folder = SoundFolder::from_dictionary(&dict)?;

    // Go through the whole case-folded tree, soundfold each word and put
    // it in the soundfold trie. The "flags" field holds the MSB of the
    // word number, "region" the LSB.
    log::info!("Performing soundfolding...");
    let cancel = spin.cancel.clone();
    let mut tree = WordTree::new(TreeKind::Sound);
    let mut words_done: u32 = 0;
    dictionary::walk_words(&dict.fold, |word| {
        cancel.check()?;
        let folded = folder.fold(std::str::from_utf8(word)?);
        let mut bytes = folded.into_bytes();
        bytes.truncate(MAXWLEN);
        tree.insert(
            &bytes,
            (words_done >> 16) as u16,
            (words_done & 0xffff) as u16,
            0,
        );
        words_done += 1;
        Ok(())
    })?;
    log::info!("Total number of words: {}", words_done);

    // Make the table that links each word in the soundfold trie to the
    // words it can be produced from.
    let mut table = Vec::new();
    let first = tree.first();
    sug_filltable(&mut tree, first, &mut table);
    log::info!("Number of words after soundfolding: {}", table.len());

    log::info!("Compressing word tree...");
    tree.compress(&cancel)?;

    let sug_path = wfname.with_extension("sug");
    log::info!("Writing suggestion file {}", sug_path.display());
    crate::format::write::write_sug(spin.sugtime, &tree, &table, &sug_path)?;
    Ok(())
}

/// 終端ごとの単語番号の行を作り、余分な終端を木から取り除きます。
///
/// 1 つのサウンドフォールド語の行には、そこへ畳み込まれた全単語の
/// 番号が前との差分で並びます。残した終端のフラグを消しておくと
/// 後の圧縮がよく効きます。
fn sug_filltable(tree: &mut WordTree, node: NodeId, table: &mut Vec<Vec<u8>>) {
    let mut p = node;
    while p != NIL {
        if tree.node_ref(p).byte == 0 {
            let mut line = Vec::new();
            let mut prev_nr = 0u32;
            let mut np = p;
            while np != NIL && tree.node_ref(np).byte == 0 {
                let n = tree.node_ref(np);
                let nr = ((n.flags as u32) << 16) + (n.region as u32 & 0xffff);
                offset_to_bytes(&mut line, nr - prev_nr);
                prev_nr = nr;
                np = n.sibling;
            }
            table.push(line);

            // Remove the extra NUL entries, they are no longer needed.
            loop {
                let sib = tree.node_ref(p).sibling;
                if sib == NIL || tree.node_ref(sib).byte != 0 {
                    break;
                }
                tree.node_ref_mut(p).sibling = tree.node_ref(sib).sibling;
                tree.free_node(sib);
            }
            // Clear the flags on the remaining NUL node, that makes the
            // compression work a lot better.
            let n = tree.node_ref_mut(p);
            n.flags = 0;
            n.region = 0;
            p = n.sibling;
        } else {
            let (child, sibling) = {
                let n = tree.node_ref(p);
                (n.child, n.sibling)
            };
            sug_filltable(tree, child, table);
            p = sibling;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ft(from: &str, to: &str) -> FromTo {
        FromTo {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn sofo_maps_and_drops() {
        let f = SoundFolder::from_sofo("abc", "xyz").unwrap();
        assert_eq!(f.fold("cab"), "zxy");
        // Characters outside the table are dropped, spaces are kept.
        assert_eq!(f.fold("a-b c"), "xy z");
    }

    #[test]
    fn sofo_length_mismatch_is_an_error() {
        assert!(SoundFolder::from_sofo("abc", "xy").is_err());
    }

    #[test]
    fn sal_longest_match_wins() {
        let rules = [ft("SCH", "S"), ft("CH", "X"), ft("C", "K")];
        let f = SoundFolder::from_sal(&rules, false, false, false);
        assert_eq!(f.fold("schch"), "sx");
        assert_eq!(f.fold("cat"), "kat");
    }

    #[test]
    fn sal_oneof_and_anchors() {
        // "K(AO)" eats the K and one vowel from the set, so the vowel does
        // not show up in the output.
        let rules = [ft("K(ao)", "k"), ft("T$", "d"), ft("^H", "")];
        let f = SoundFolder::from_sal(&rules, false, false, false);
        assert_eq!(f.fold("kat"), "kd");
        assert_eq!(f.fold("kit"), "kid");
        assert_eq!(f.fold("hat"), "ad");
        assert_eq!(f.fold("aha"), "aha");
    }

    #[test]
    fn sal_collapse_removes_doubles() {
        let f = SoundFolder::from_sal(&[], false, true, false);
        assert_eq!(f.fold("aabba"), "aba");
    }

    #[test]
    fn sal_retry_reexamines_replacement() {
        let rules = [ft("Z<", "s"), ft("SH", "x")];
        let f = SoundFolder::from_sal(&rules, true, false, false);
        // "z" becomes "s", then "sh" matches the SH rule.
        assert_eq!(f.fold("zh"), "x");
        // Without followup the retry flag is ignored.
        let f = SoundFolder::from_sal(&rules, false, false, false);
        assert_eq!(f.fold("zh"), "sh");
    }

    #[test]
    fn accents_and_white_space_are_normalized() {
        let f = SoundFolder::from_sal(&[], false, false, true);
        assert_eq!(f.fold("cafe\u{301}"), "cafe");
        let f = SoundFolder::from_sal(&[], false, false, false);
        assert_eq!(f.fold("et \t al"), "et al");
    }
}
