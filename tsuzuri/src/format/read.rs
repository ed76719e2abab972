//! バイト列カーソルと単語木ノード配列の読み込み。
//!
//! セクションの解釈は `dictionary` モジュールが行い、ここでは
//! バイト単位の取り出しと木の展開だけを扱います。展開は書き込み側の
//! `put_node` と対になっていて、インデックスをファイルに書かずに済む
//! よう同じ割り当て順をたどります。

use crate::errors::{Result, SpellError};
use crate::flags::{WF_AFX, WF_REGION};

use super::{BY_FLAGS, BY_FLAGS2, BY_INDEX, BY_NOFLAGS, BY_SPECIAL, SHARED_MASK};

/// バイト列上を前進するカーソル。
///
/// すべての取り出しは長さ検査つきで、足りない場合は
/// [`SpellError::Truncated`] に読んでいた項目の名前が入ります。
pub(crate) struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&e| e <= self.buf.len())
            .ok_or(SpellError::Truncated(what))?;
        let s = &self.buf[self.pos..end];
        self.pos = end;
        Ok(s)
    }

    pub(crate) fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    pub(crate) fn u16(&mut self, what: &'static str) -> Result<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u24(&mut self, what: &'static str) -> Result<u32> {
        let b = self.take(3, what)?;
        Ok(u32::from_be_bytes([0, b[0], b[1], b[2]]))
    }

    pub(crate) fn u32(&mut self, what: &'static str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self, what: &'static str) -> Result<u64> {
        let b = self.take(8, what)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(u64::from_be_bytes(a))
    }
}

/// 読み込んだ単語木のフラットな表現。
///
/// `byts[n]` が兄弟リストの長さまたはバイト値、`idxs[n]` が子リストの
/// 位置(終端ではフラグ類の詰め合わせ)です。
#[derive(Debug, Default)]
pub struct TreeData {
    pub(crate) byts: Vec<u8>,
    pub(crate) idxs: Vec<u32>,
}

impl TreeData {
    pub fn is_empty(&self) -> bool {
        self.byts.is_empty()
    }
}

/// <nodecount> とノード配列を読み込みます。
///
/// # 引数
///
/// * `prefixtree` - 接頭辞木として終端を解釈するか
/// * `prefixcnt` - <prefcondnr> の上限(条件の総数)
pub(crate) fn read_tree(cur: &mut Cursor, prefixtree: bool, prefixcnt: usize) -> Result<TreeData> {
    let len = cur.u32("node count")? as usize;
    let mut tree = TreeData {
        byts: vec![0; len],
        idxs: vec![0; len],
    };
    if len > 0 {
        read_tree_node(cur, &mut tree, len, 0, prefixtree, prefixcnt)?;
    }
    Ok(tree)
}

/// 兄弟リスト 1 本を読み、子リストを再帰的に読み込みます。
///
/// # 戻り値
///
/// この呼び出しが消費した配列領域の次のインデックス
fn read_tree_node(
    cur: &mut Cursor,
    tree: &mut TreeData,
    maxidx: usize,
    startidx: usize,
    prefixtree: bool,
    maxprefcondnr: usize,
) -> Result<usize> {
    let mut idx = startidx;
    let len = cur.u8("sibling count")? as usize;
    if len == 0 {
        // The byte is there but a sibling list can never be empty.
        return Err(SpellError::malformed("zero sibling count"));
    }
    if startidx + len >= maxidx {
        return Err(SpellError::malformed("node index out of range"));
    }
    tree.byts[idx] = len as u8;
    idx += 1;

    // Read the byte values, flag/region bytes and shared indexes.
    for _ in 0..len {
        let mut c = cur.u8("node byte")?;
        if c <= BY_SPECIAL {
            if c == BY_NOFLAGS && !prefixtree {
                // No flags, all regions.
                tree.idxs[idx] = 0;
                c = 0;
            } else if c != BY_INDEX {
                if prefixtree {
                    // The optional pflags byte, the prefix ID and the
                    // condition nr. In idxs[] store the prefix ID in the
                    // low byte, the condition index shifted up 8 bits,
                    // the flags shifted up 24 bits.
                    let mut v: u32 = if c == BY_FLAGS {
                        (cur.u8("prefix flags")? as u32) << 24
                    } else {
                        0
                    };
                    v |= cur.u8("affix ID")? as u32;
                    let n = cur.u16("prefix condition nr")? as usize;
                    if n >= maxprefcondnr {
                        return Err(SpellError::malformed("prefix condition nr out of range"));
                    }
                    v |= (n as u32) << 8;
                    tree.idxs[idx] = v;
                } else {
                    // BY_FLAGS or BY_FLAGS2: flags and optional region and
                    // affix ID. In idxs[] the flags go in the low two
                    // bytes, region above that and affix ID above the
                    // region.
                    let c2 = c;
                    let mut v = cur.u8("word flags")? as u32;
                    if c2 == BY_FLAGS2 {
                        v |= (cur.u8("word flags")? as u32) << 8;
                    }
                    if v & WF_REGION as u32 != 0 {
                        v |= (cur.u8("word region")? as u32) << 16;
                    }
                    if v & WF_AFX as u32 != 0 {
                        v |= (cur.u8("affix ID")? as u32) << 24;
                    }
                    tree.idxs[idx] = v;
                }
                c = 0;
            } else {
                // BY_INDEX: the sibling is stored elsewhere.
                let n = cur.u24("shared node index")?;
                if n as usize >= maxidx {
                    return Err(SpellError::malformed("shared node index out of range"));
                }
                tree.idxs[idx] = n + SHARED_MASK;
                c = cur.u8("node byte")?;
            }
        }
        tree.byts[idx] = c;
        idx += 1;
    }

    // Recursively read the children for non-shared siblings. Skip the
    // end-of-word ones (zero byte value) and the shared ones.
    for i in 1..=len {
        if tree.byts[startidx + i] != 0 {
            if tree.idxs[startidx + i] & SHARED_MASK != 0 {
                tree.idxs[startidx + i] &= !SHARED_MASK;
            } else {
                tree.idxs[startidx + i] = idx as u32;
                idx = read_tree_node(cur, tree, maxidx, idx, prefixtree, maxprefcondnr)?;
            }
        }
    }
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::write::write_tree;
    use crate::tree::{TreeKind, WordTree};
    use crate::CancelToken;

    fn roundtrip(tree: &WordTree) -> TreeData {
        let mut buf = Vec::new();
        write_tree(&mut buf, tree, 0, false);
        let mut cur = Cursor::new(&buf);
        let data = read_tree(&mut cur, false, 0).unwrap();
        assert!(cur.is_empty());
        data
    }

    #[test]
    fn cursor_truncation_names_the_item() {
        let mut cur = Cursor::new(&[1, 2]);
        assert_eq!(cur.u16("pair").unwrap(), 0x0102);
        match cur.u32("node count") {
            Err(SpellError::Truncated("node count")) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tree_with_shared_tail_reads_back() {
        let mut tree = WordTree::new(TreeKind::Fold);
        tree.insert(b"ad", 0, 1, 0);
        tree.insert(b"bed", 0, 1, 0);
        tree.compress(&CancelToken::new()).unwrap();

        let data = roundtrip(&tree);

        // Walk "bed" through the shared reference.
        let mut arridx = 0usize;
        for &b in b"bed" {
            let len = data.byts[arridx] as usize;
            let pos = (1..=len)
                .find(|&i| data.byts[arridx + i] == b)
                .expect("byte present");
            arridx = data.idxs[arridx + pos] as usize;
        }
        let len = data.byts[arridx] as usize;
        assert!(len >= 1);
        assert_eq!(data.byts[arridx + 1], 0);
    }

    #[test]
    fn empty_tree_reads_back() {
        let tree = WordTree::new(TreeKind::Fold);
        let data = roundtrip(&tree);
        assert!(data.is_empty());
    }

    #[test]
    fn truncated_sibling_list_is_an_error() {
        // Node count says 10 but no node data follows.
        let buf = [0u8, 0, 0, 10];
        let mut cur = Cursor::new(&buf);
        assert!(matches!(
            read_tree(&mut cur, false, 0),
            Err(SpellError::Truncated(_))
        ));
    }

    #[test]
    fn zero_sibling_count_is_malformed() {
        // The count byte is present, so this is not a truncation.
        let buf = [0u8, 0, 0, 10, 0];
        let mut cur = Cursor::new(&buf);
        assert!(matches!(
            read_tree(&mut cur, false, 0),
            Err(SpellError::Malformed(_))
        ));
    }
}
