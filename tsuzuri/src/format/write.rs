//! .spl / .sug ファイルの書き出し。
//!
//! ヘッダとセクション列を書いたあと、3 本の単語木をノード配列として
//! 直列化します。直列化は 2 パスで行います。1 パス目は出力せずに
//! ノード数を数え、共有される兄弟リストへインデックスを割り当てます。
//! 2 パス目は同じ順序をたどって実際のバイト列を書きます。読み込み側の
//! `read_tree_node` とバイト単位で対応している必要があります。

use std::path::Path;

use crate::builder::SpellInfo;
use crate::errors::Result;
use crate::flags::{WF_AFX, WF_REGION};
use crate::tree::{NodeId, WordTree, NIL, PFX_FLAGS};

use super::{
    BY_FLAGS, BY_FLAGS2, BY_INDEX, BY_NOFLAGS, CF_UPPER, CF_WORD, SAL_COLLAPSE, SAL_F0LLOWUP,
    SAL_REM_ACCENTS, SNF_REQUIRED, SN_CHARFLAGS, SN_COMPOUND, SN_END, SN_INFO, SN_MAP, SN_MIDWORD,
    SN_NOBREAK, SN_NOCOMPOUNDSUGS, SN_NOSPLITSUGS, SN_PREFCOND, SN_REGION, SN_REP, SN_REPSAL,
    SN_SAL, SN_SOFO, SN_SUGFILE, SN_SYLLABLE, SN_WORDS, SPELL_MAGIC, SPELL_VERSION, SUG_MAGIC,
    SUG_VERSION,
};

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u24(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes()[1..]);
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// <sectionID> <sectionflags> <sectionlen> <中身> を書きます。
fn section(buf: &mut Vec<u8>, id: u8, flags: u8, payload: &[u8]) {
    buf.push(id);
    buf.push(flags);
    put_u32(buf, payload.len() as u32);
    buf.extend_from_slice(payload);
}

/// 単語木の直列化器。
///
/// `index` は各兄弟リスト先頭の書き出し位置、`owner` はそのリストを
/// 最初に参照した親リストの先頭です。カウントパスで埋められ、書き出し
/// パスで「別の場所に書かれた子」の判定に使われます。
struct TreeWriter<'a> {
    tree: &'a WordTree,
    index: Vec<u32>,
    owner: Vec<NodeId>,
}

impl<'a> TreeWriter<'a> {
    fn new(tree: &'a WordTree) -> Self {
        let len = tree.arena_len();
        Self {
            tree,
            index: vec![0; len],
            owner: vec![NIL; len],
        }
    }

    /// 兄弟リスト 1 本とその子孫を書き出します。
    ///
    /// まず <siblingcount>、次に各兄弟のバイト(終端はフラグ類、共有の
    /// 子は BY_INDEX と 3 バイトのインデックス)、最後にこのリストが
    /// 所有する子リストを再帰的に書きます。`out` が `None` のときは
    /// 数えるだけです。戻り値は次に使うインデックスで、ルート呼び出し
    /// では総ノード数になります。
    fn put_node(
        &mut self,
        mut out: Option<&mut Vec<u8>>,
        node: NodeId,
        idx: u32,
        regionmask: u16,
        prefixtree: bool,
    ) -> u32 {
        if node == NIL {
            return 0;
        }
        let tree = self.tree;
        self.index[node as usize] = idx;

        let mut siblingcount: u32 = 0;
        let mut np = node;
        while np != NIL {
            siblingcount += 1;
            np = tree.node_ref(np).sibling;
        }
        if let Some(buf) = out.as_deref_mut() {
            buf.push(siblingcount as u8); // <siblingcount>
        }

        let mut np = node;
        while np != NIL {
            let n = tree.node_ref(np);
            if n.byte == 0 {
                if let Some(buf) = out.as_deref_mut() {
                    if prefixtree {
                        // The affix ID and the condition nr (kept in the
                        // region field) follow. The flag byte is only
                        // written when some WFP_ bit is set.
                        if n.flags == PFX_FLAGS {
                            buf.push(BY_NOFLAGS);
                        } else {
                            buf.push(BY_FLAGS);
                            buf.push(n.flags as u8); // <pflags>
                        }
                        buf.push(n.affix_id); // <affixID>
                        put_u16(buf, n.region); // <prefcondnr>
                    } else {
                        let mut flags = n.flags;
                        if regionmask != 0 && n.region != regionmask {
                            flags |= WF_REGION;
                        }
                        if n.affix_id != 0 {
                            flags |= WF_AFX;
                        }
                        if flags == 0 {
                            // Word without flags or region.
                            buf.push(BY_NOFLAGS);
                        } else {
                            if n.flags >= 0x100 {
                                buf.push(BY_FLAGS2);
                                buf.push(flags as u8); // <flags>
                                buf.push((flags >> 8) as u8); // <flags2>
                            } else {
                                buf.push(BY_FLAGS);
                                buf.push(flags as u8); // <flags>
                            }
                            if (flags & WF_REGION) != 0 {
                                buf.push(n.region as u8); // <region>
                            }
                            if (flags & WF_AFX) != 0 {
                                buf.push(n.affix_id); // <affixID>
                            }
                        }
                    }
                }
            } else {
                let child = n.child as usize;
                if self.index[child] != 0 && self.owner[child] != node {
                    // The child is written elsewhere, write the reference.
                    if let Some(buf) = out.as_deref_mut() {
                        buf.push(BY_INDEX);
                        put_u24(buf, self.index[child]); // <nodeidx>
                    }
                } else if self.owner[child] == NIL {
                    // We will write the child below and give it an index.
                    self.owner[child] = node;
                }
                if let Some(buf) = out.as_deref_mut() {
                    buf.push(n.byte); // <byte> or <xbyte>
                }
            }
            np = n.sibling;
        }

        // Space used in the array when reading: one for each sibling and
        // one for the count.
        let mut newindex = idx + siblingcount + 1;

        let mut np = node;
        while np != NIL {
            let n = tree.node_ref(np);
            if n.byte != 0 && self.owner[n.child as usize] == node {
                newindex =
                    self.put_node(out.as_deref_mut(), n.child, newindex, regionmask, prefixtree);
            }
            np = n.sibling;
        }
        newindex
    }
}

/// 単語木 1 本を <nodecount> とノード配列として書きます。
pub(crate) fn write_tree(buf: &mut Vec<u8>, tree: &WordTree, regionmask: u16, prefixtree: bool) {
    let mut tw = TreeWriter::new(tree);
    let nodecount = tw.put_node(None, tree.first(), 0, regionmask, prefixtree);
    put_u32(buf, nodecount); // <nodecount>
    tw.put_node(Some(buf), tree.first(), 0, regionmask, prefixtree);
}

/// <prefcondcnt> と各条件を書きます。条件のない番号は長さ 0 とします。
fn write_prefcond(buf: &mut Vec<u8>, prefcond: &[Option<String>]) {
    put_u16(buf, prefcond.len() as u16); // <prefcondcnt>
    for cond in prefcond {
        match cond {
            Some(c) => {
                buf.push(c.len() as u8); // <condlen>
                buf.extend_from_slice(c.as_bytes()); // <condstr>
            }
            None => buf.push(0),
        }
    }
}

/// コードポイント 128..256 の文字フラグ表とケースフォールド表を書きます。
///
/// 辞書を作るときと使うときとで同じ文字が単語構成文字と認識されるように
/// するためのものです。
fn write_charflags(buf: &mut Vec<u8>) {
    let mut folchars: Vec<u8> = Vec::with_capacity(256);
    let mut fbuf = [0u8; 4];
    for i in 128u32..256 {
        let c = char::from_u32(i).unwrap_or(char::REPLACEMENT_CHARACTER);
        let folded = c.to_lowercase().next().unwrap_or(c);
        folchars.extend_from_slice(folded.encode_utf8(&mut fbuf).as_bytes());
    }

    let mut payload = Vec::with_capacity(1 + 128 + 2 + folchars.len());
    payload.push(128); // <charflagslen>
    for i in 128u32..256 {
        let c = char::from_u32(i).unwrap_or(char::REPLACEMENT_CHARACTER);
        let mut flags = 0u8;
        if c.is_alphabetic() {
            flags |= CF_WORD;
        }
        if c.is_uppercase() {
            flags |= CF_UPPER;
        }
        payload.push(flags); // <charflags>
    }
    put_u16(&mut payload, folchars.len() as u16); // <folcharslen>
    payload.extend_from_slice(&folchars); // <folchars>
    section(buf, SN_CHARFLAGS, SNF_REQUIRED, &payload);
}

/// from-to のリストを <count> <fromlen> <from> <tolen> <to> ... と書きます。
fn put_fromto(buf: &mut Vec<u8>, items: &[crate::builder::FromTo]) {
    put_u16(buf, items.len() as u16);
    for ft in items {
        buf.push(ft.from.len() as u8);
        buf.extend_from_slice(ft.from.as_bytes());
        buf.push(ft.to.len() as u8);
        buf.extend_from_slice(ft.to.as_bytes());
    }
}

/// .spl ファイルを書き出します。
///
/// # 引数
///
/// * `spin` - 圧縮済みの単語木を含む構築状態
/// * `path` - 出力先
///
/// # エラー
///
/// * [`crate::SpellError::Io`] - ファイルが書けない場合
pub(crate) fn write_spell(spin: &SpellInfo, path: &Path) -> Result<()> {
    let mut buf: Vec<u8> = Vec::new();

    // <HEADER>: <fileID> <versionnr>
    buf.extend_from_slice(SPELL_MAGIC);
    buf.push(SPELL_VERSION);

    // SN_INFO: <infotext>
    if !spin.info.is_empty() {
        section(&mut buf, SN_INFO, 0, spin.info.as_bytes());
    }

    // SN_REGION: <regionname> ...
    // Only written when there is more than one region.
    let regionmask: u16 = if spin.region_count > 1 {
        section(&mut buf, SN_REGION, SNF_REQUIRED, spin.region_name.as_bytes());
        (1 << spin.region_count) - 1
    } else {
        0
    };

    // SN_CHARFLAGS: <charflagslen> <charflags> <folcharslen> <folchars>
    // Skipped for ASCII dictionaries. Also skipped for an .add.spl file,
    // the main spell file must contain the table.
    if !spin.ascii && !spin.add_file {
        write_charflags(&mut buf);
    }

    // SN_MIDWORD: <midword>
    if let Some(midword) = &spin.midword {
        section(&mut buf, SN_MIDWORD, SNF_REQUIRED, midword.as_bytes());
    }

    // SN_PREFCOND: <prefcondcnt> <prefcond> ...
    if !spin.prefcond.is_empty() {
        let mut payload = Vec::new();
        write_prefcond(&mut payload, &spin.prefcond);
        section(&mut buf, SN_PREFCOND, SNF_REQUIRED, &payload);
    }

    // SN_REP: <repcount> <rep> ...
    // The items are sorted on the "from" string for the binary search
    // done when suggesting.
    if !spin.rep.is_empty() {
        let mut rep = spin.rep.clone();
        rep.sort_by(|a, b| a.from.cmp(&b.from));
        let mut payload = Vec::new();
        put_fromto(&mut payload, &rep);
        section(&mut buf, SN_REP, 0, &payload);
    }

    // SN_SAL: <salflags> <salcount> <sal> ...
    // Not written when a SN_SOFO section is used.
    let have_sofo = spin.sofofr.is_some() && spin.sofoto.is_some();
    if !have_sofo && !spin.sal.is_empty() {
        let mut payload = Vec::new();
        let mut salflags = 0u8;
        if spin.followup {
            salflags |= SAL_F0LLOWUP;
        }
        if spin.collapse {
            salflags |= SAL_COLLAPSE;
        }
        if spin.rem_accents {
            salflags |= SAL_REM_ACCENTS;
        }
        payload.push(salflags); // <salflags>
        put_fromto(&mut payload, &spin.sal);
        section(&mut buf, SN_SAL, 0, &payload);
    }

    // SN_REPSAL: <repcount> <rep> ...
    if !spin.repsal.is_empty() {
        let mut repsal = spin.repsal.clone();
        repsal.sort_by(|a, b| a.from.cmp(&b.from));
        let mut payload = Vec::new();
        put_fromto(&mut payload, &repsal);
        section(&mut buf, SN_REPSAL, 0, &payload);
    }

    // SN_SOFO: <sofofromlen> <sofofrom> <sofotolen> <sofoto>
    if let (Some(fr), Some(to)) = (&spin.sofofr, &spin.sofoto) {
        let mut payload = Vec::new();
        put_u16(&mut payload, fr.len() as u16);
        payload.extend_from_slice(fr.as_bytes());
        put_u16(&mut payload, to.len() as u16);
        payload.extend_from_slice(to.as_bytes());
        section(&mut buf, SN_SOFO, 0, &payload);
    }

    // SN_WORDS: <word> ...
    if !spin.common_words.is_empty() {
        let mut words: Vec<&String> = spin.common_words.iter().collect();
        words.sort();
        let mut payload = Vec::new();
        for w in words {
            payload.extend_from_slice(w.as_bytes());
            payload.push(0);
        }
        section(&mut buf, SN_WORDS, 0, &payload);
    }

    // SN_MAP: <mapstr>
    if !spin.map.is_empty() {
        section(&mut buf, SN_MAP, 0, spin.map.as_bytes());
    }

    // SN_SUGFILE: <timestamp>
    // Tells that a .sug file may be available and allows checking that a
    // found .sug file matches this .spl file, the word numbers must be
    // exactly right.
    if spin.sugtime != 0 {
        let mut payload = Vec::new();
        put_u64(&mut payload, spin.sugtime);
        section(&mut buf, SN_SUGFILE, 0, &payload);
    }

    // SN_NOSPLITSUGS: nothing, the presence of the section flags the feature.
    if spin.nosplitsugs {
        section(&mut buf, SN_NOSPLITSUGS, 0, &[]);
    }

    // SN_NOCOMPOUNDSUGS: nothing.
    if spin.nocompoundsugs {
        section(&mut buf, SN_NOCOMPOUNDSUGS, 0, &[]);
    }

    // SN_COMPOUND: compound info. Not required, without it all compound
    // words are bad words.
    if !spin.compflags.is_empty() {
        let mut payload = Vec::new();
        payload.push(spin.compmax as u8); // <compmax>
        payload.push(spin.compminlen as u8); // <compminlen>
        payload.push(spin.compsylmax as u8); // <compsylmax>
        payload.push(0); // for 7.0b compatibility
        payload.push(spin.compoptions); // <compoptions>
        put_u16(&mut payload, (spin.comppat.len() * 2) as u16); // <comppatcount>
        for (p1, p2) in &spin.comppat {
            for p in [p1, p2] {
                payload.push(p.len() as u8); // <comppatlen>
                payload.extend_from_slice(p.as_bytes()); // <comppattext>
            }
        }
        payload.extend_from_slice(&spin.compflags); // <compflags>
        section(&mut buf, SN_COMPOUND, 0, &payload);
    }

    // SN_NOBREAK: nothing.
    if spin.nobreak {
        section(&mut buf, SN_NOBREAK, 0, &[]);
    }

    // SN_SYLLABLE: syllable info. Not required, without it syllables are
    // not counted.
    if let Some(syllable) = &spin.syllable {
        section(&mut buf, SN_SYLLABLE, 0, syllable.as_bytes());
    }

    buf.push(SN_END); // <sectionend>

    // <LWORDTREE> <KWORDTREE> <PREFIXTREE>
    write_tree(&mut buf, &spin.fold, regionmask, false);
    write_tree(&mut buf, &spin.keep, regionmask, false);
    write_tree(&mut buf, &spin.prefix, regionmask, true);

    // One more byte so that a full file system is caught on write.
    buf.push(0);

    std::fs::write(path, &buf)?;
    Ok(())
}

/// .sug ファイルを書き出します。
///
/// # 引数
///
/// * `sugtime` - 対応する .spl と共通のタイムスタンプ
/// * `tree` - 圧縮済みのサウンドフォールド木
/// * `table` - 単語番号テーブル。1 行が 1 サウンドフォールド語に対応し、
///   NUL は含みません。
pub(crate) fn write_sug(
    sugtime: u64,
    tree: &WordTree,
    table: &[Vec<u8>],
    path: &Path,
) -> Result<()> {
    let mut buf: Vec<u8> = Vec::new();

    // <SUGHEADER>: <fileID> <versionnr> <timestamp>
    buf.extend_from_slice(SUG_MAGIC);
    buf.push(SUG_VERSION);
    put_u64(&mut buf, sugtime);

    // <SUGWORDTREE>
    write_tree(&mut buf, tree, 0, false);

    // <SUGTABLE>: <sugwcount> <sugline> ...
    put_u32(&mut buf, table.len() as u32); // <sugwcount>
    for line in table {
        buf.extend_from_slice(line); // <sugline>: <sugnr> ...
        buf.push(0);
    }

    buf.push(0);

    std::fs::write(path, &buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TreeKind;

    #[test]
    fn empty_tree_is_a_zero_count() {
        let tree = WordTree::new(TreeKind::Fold);
        let mut buf = Vec::new();
        write_tree(&mut buf, &tree, 0, false);
        assert_eq!(buf, vec![0, 0, 0, 0]);
    }

    #[test]
    fn single_word_tree_layout() {
        let mut tree = WordTree::new(TreeKind::Fold);
        tree.insert(b"ab", 0, 1, 0);
        let mut buf = Vec::new();
        write_tree(&mut buf, &tree, 0, false);

        // One sibling per level: "a", "b", then the NUL terminal without
        // flags. Three sibling lists, each one count byte and one node.
        assert_eq!(buf, vec![0, 0, 0, 6, 1, b'a', 1, b'b', 1, BY_NOFLAGS]);
    }

    #[test]
    fn shared_tail_uses_by_index() {
        // "bed" reaches the "d" list that "ad" owns, from a different
        // parent list, so it is written as a reference.
        let mut tree = WordTree::new(TreeKind::Fold);
        tree.insert(b"ad", 0, 1, 0);
        tree.insert(b"bed", 0, 1, 0);
        let cancel = crate::CancelToken::new();
        tree.compress(&cancel).unwrap();

        let mut buf = Vec::new();
        write_tree(&mut buf, &tree, 0, false);

        let nodecount = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(nodecount, 9);
        assert_eq!(
            &buf[4..],
            &[
                2, b'a', b'b', // root list at index 0
                1, b'd', // "d" list at index 3, owned by "a"
                1, BY_NOFLAGS, // terminal list at index 5
                1, BY_INDEX, 0, 0, 3, b'e', // "e" list, child is the "d" list
            ]
        );
    }
}
