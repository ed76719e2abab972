//! 木の圧縮(DAWG化)
//!
//! 構築後の単語木に対して深さ優先で部分木のハッシュキーを計算し、
//! 構造的に同一な兄弟リストを1つに統合します。ハッシュ衝突時は
//! 要素ごとの構造比較で真の同一性を確認します。参照カウントが0に
//! なった部分木は再帰的にフリーリストへ返されます。

use hashbrown::HashMap;

use crate::errors::Result;
use crate::tree::{NodeId, WordTree, NIL};
use crate::CancelToken;

/// 圧縮結果の統計
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressStats {
    /// 圧縮前の総ノード数(リスト長フィールド込み)
    pub total: usize,
    /// 統合によって削減されたノード数
    pub compressed: usize,
}

/// 兄弟リストのハッシュキー
///
/// 先頭バイトは兄弟数、残り4バイトはローリングハッシュです。
/// C実装がキーをNUL終端文字列として扱う都合で0バイトを1に
/// 置き換えていたため、フォーマット互換の観点から同じ変換を保ちます。
type HashKey = [u8; 5];

pub(crate) fn compress_tree(tree: &mut WordTree, cancel: &CancelToken) -> Result<CompressStats> {
    let mut stats = CompressStats::default();
    if tree.first() == NIL {
        return Ok(stats);
    }

    let mut table: HashMap<HashKey, Vec<NodeId>> = HashMap::new();
    let first = tree.first();
    let (compressed, _key) = compress_list(tree, first, &mut table, &mut stats.total, cancel)?;
    stats.compressed = compressed;

    let remaining = stats.total - stats.compressed;
    let perc = if stats.total > 1_000_000 {
        remaining / (stats.total / 100)
    } else if stats.total == 0 {
        0
    } else {
        remaining * 100 / stats.total
    };
    log::info!(
        "Compressed {} of {} nodes; {} ({}%) remaining",
        stats.compressed,
        stats.total,
        remaining,
        perc
    );

    Ok(stats)
}

/// 1つの兄弟リストとその子を深さ優先で圧縮します。
///
/// 戻り値は (削減ノード数, このリストのハッシュキー) です。キーは
/// 子リストの圧縮が済んでから計算します。圧縮で子ポインタが
/// 付け替わるため、先に計算すると無効になります。
fn compress_list(
    tree: &mut WordTree,
    list: NodeId,
    table: &mut HashMap<HashKey, Vec<NodeId>>,
    tot: &mut usize,
    cancel: &CancelToken,
) -> Result<(usize, HashKey)> {
    let mut compressed = 0usize;
    let mut len = 0usize;

    let mut np = list;
    while np != NIL {
        cancel.check()?;
        len += 1;
        let child = tree.node_ref(np).child;
        if child != NIL {
            // Compress the child list first, this yields its hash key.
            let (c, key) = compress_list(tree, child, table, tot, cancel)?;
            compressed += c;

            // Try to find an identical, previously seen child.
            let chain = table.entry(key).or_default();
            let mut matched = NIL;
            for &cand in chain.iter() {
                // Skip entries freed by an earlier merge in this pass.
                if tree.node_ref(cand).refs == 0 {
                    continue;
                }
                if node_equal(tree, child, cand) {
                    matched = cand;
                    break;
                }
            }
            if matched != NIL {
                if matched != child {
                    // Use the earlier child in place of the current one,
                    // unlinking the redundant subtree.
                    tree.node_ref_mut(matched).refs += 1;
                    compressed += deref_list(tree, child);
                    tree.node_ref_mut(np).child = matched;
                }
            } else {
                table.get_mut(&key).unwrap().push(child);
            }
        }
        np = tree.node_ref(np).sibling;
    }

    // Add one for the node that stores the length.
    *tot += len + 1;

    Ok((compressed, hash_key(tree, list, len)))
}

/// 兄弟リストのハッシュキーを計算します。
fn hash_key(tree: &WordTree, list: NodeId, len: usize) -> HashKey {
    let mut nr: u32 = 0;
    let mut np = list;
    while np != NIL {
        let n = tree.node_ref(np);
        let item: u32 = if n.byte == 0 {
            // End node: flags, region and affix ID.
            (n.flags as u32)
                .wrapping_add((n.region as u32) << 8)
                .wrapping_add((n.affix_id as u32) << 16)
        } else {
            // Byte node: byte value and the child handle.
            (n.byte as u32).wrapping_add(n.child.wrapping_shl(8))
        };
        nr = nr.wrapping_mul(101).wrapping_add(item);
        np = n.sibling;
    }

    let mut key = [0u8; 5];
    key[0] = len as u8;
    for (i, slot) in key[1..].iter_mut().enumerate() {
        let b = (nr >> (8 * i)) as u8;
        // Zero bytes would terminate the key in the original format.
        *slot = if b == 0 { 1 } else { b };
    }
    key
}

/// 2つの兄弟リストが構造的に同一かを判定します。
///
/// 同じバイト列、かつ終端は属性が等しく、非終端は子ハンドルが
/// 同一であることを要求します(子は既に圧縮済みのため、同一構造
/// なら同一ハンドルです)。
fn node_equal(tree: &WordTree, a: NodeId, b: NodeId) -> bool {
    let mut p1 = a;
    let mut p2 = b;
    while p1 != NIL && p2 != NIL {
        let n1 = tree.node_ref(p1);
        let n2 = tree.node_ref(p2);
        if n1.byte != n2.byte {
            return false;
        }
        if n1.byte == 0 {
            if n1.flags != n2.flags || n1.region != n2.region || n1.affix_id != n2.affix_id {
                return false;
            }
        } else if n1.child != n2.child {
            return false;
        }
        p1 = n1.sibling;
        p2 = n2.sibling;
    }
    p1 == NIL && p2 == NIL
}

/// リスト先頭の参照カウントを減らし、0になったら部分木を解放します。
///
/// # 戻り値
///
/// 実際に解放されたノード数(リスト長フィールド分を1加算)
pub(crate) fn deref_list(tree: &mut WordTree, list: NodeId) -> usize {
    let mut cnt = 0;
    tree.node_ref_mut(list).refs -= 1;
    if tree.node_ref(list).refs == 0 {
        let mut np = list;
        while np != NIL {
            let child = tree.node_ref(np).child;
            if child != NIL {
                cnt += deref_list(tree, child);
            }
            let sib = tree.node_ref(np).sibling;
            tree.free_node(np);
            cnt += 1;
            np = sib;
        }
        cnt += 1; // length field
    }
    cnt
}

#[cfg(test)]
mod tests {
    use crate::tree::{TreeKind, WordTree};
    use crate::CancelToken;

    #[test]
    fn test_compress_preserves_word_set() {
        let mut t = WordTree::new(TreeKind::Fold);
        for w in [&b"cat"[..], b"cats", b"dog", b"dogs", b"dot", b"dots"] {
            t.insert(w, 0, 1, 0);
        }
        let before = t.word_set();
        let nodes_before = t.node_count();
        t.compress(&CancelToken::new()).unwrap();
        assert_eq!(t.word_set(), before);
        assert!(t.node_count() <= nodes_before);
    }

    #[test]
    fn test_compress_shares_identical_tails() {
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"cats", 0, 1, 0);
        t.insert(b"dogs", 0, 1, 0);
        let before = t.node_count();
        let stats = t.compress(&CancelToken::new()).unwrap();
        // The "s" -> end tail is identical for both words.
        assert!(stats.compressed > 0);
        assert!(t.node_count() < before);
        assert_eq!(t.lookup(b"cats").len(), 1);
        assert_eq!(t.lookup(b"dogs").len(), 1);
    }

    #[test]
    fn test_compress_is_monotone_and_idempotent_on_node_count() {
        let mut t = WordTree::new(TreeKind::Fold);
        for w in [&b"walk"[..], b"walks", b"talk", b"talks", b"milk", b"milks"] {
            t.insert(w, 0, 1, 0);
        }
        t.compress(&CancelToken::new()).unwrap();
        let once = t.node_count();
        t.compress(&CancelToken::new()).unwrap();
        assert_eq!(t.node_count(), once);
    }

    #[test]
    fn test_distinct_attrs_not_merged() {
        use crate::flags::WF_RARE;
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"cats", 0, 1, 0);
        t.insert(b"dogs", WF_RARE, 1, 0);
        t.compress(&CancelToken::new()).unwrap();
        assert_eq!(t.lookup(b"cats")[0].flags, 0);
        assert_eq!(t.lookup(b"dogs")[0].flags, WF_RARE);
    }

    #[test]
    fn test_compress_interrupted() {
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"cat", 0, 1, 0);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(t.compress(&cancel).is_err());
    }
}
