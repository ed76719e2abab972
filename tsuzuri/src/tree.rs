//! 単語木(トライ)の実装
//!
//! このモジュールは、辞書ビルドの中核となる共有構造トライを定義します。
//! ノードは生ポインタではなくアリーナ内の整数ハンドルで接続され、
//! 兄弟リストの先頭ノードが参照カウントを持ちます。参照カウントが
//! 1を超えるリストへの挿入は、リスト全体の複製(コピーオンライト)を
//! 経由して行われるため、圧縮によって共有された部分木は他の親から
//! 見て不変のままです。
//!
//! 解放されたノードはアロケータへ返さず内部のフリーリストに保持し、
//! 以後の挿入で再利用します。

pub(crate) mod compress;

pub use compress::CompressStats;

use crate::errors::Result;
use crate::CancelToken;

/// アリーナ内のノードを指す整数ハンドル
pub(crate) type NodeId = u32;

/// 「ノードなし」を表す番兵値
pub(crate) const NIL: NodeId = u32::MAX;

/// 接頭辞木の終端ノードに格納される基底フラグ値
///
/// 下位バイトに WFP_* ビットが入ります。シリアライズ時、この値と
/// 等しい終端はフラグバイトなしで書き出されます。
pub(crate) const PFX_FLAGS: u16 = 0xFF00;

/// 単語の最大バイト長
pub(crate) const MAXWLEN: usize = 254;

// One arena "block" worth of node allocations, used by the periodic
// compression trigger in the builder.
pub(crate) const NODES_PER_BLOCK: u64 = 400;

/// 木の種類
///
/// 終端ノードの整列規則と重複判定が木の種類によって異なります。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeKind {
    /// case-fold された単語の主検索木
    Fold,
    /// 大文字小文字を保持する単語の木
    KeepCase,
    /// 後置接頭辞の条件木
    Prefix,
    /// 音声畳み込み(soundfold)の木
    Sound,
}

/// トライの1ノード
///
/// `byte == 0` は単語の終端を表し、そのときに限り `flags` / `region` /
/// `affix_id` が有効です。`refs` は兄弟リストの先頭でのみ意味を持ちます。
#[derive(Debug, Clone)]
pub(crate) struct WordNode {
    pub(crate) byte: u8,
    pub(crate) flags: u16,
    pub(crate) region: u16,
    pub(crate) affix_id: u8,
    pub(crate) refs: u32,
    pub(crate) sibling: NodeId,
    pub(crate) child: NodeId,
}

impl Default for WordNode {
    fn default() -> Self {
        // The links must start out at NIL, not at node 0.
        Self {
            byte: 0,
            flags: 0,
            region: 0,
            affix_id: 0,
            refs: 0,
            sibling: NIL,
            child: NIL,
        }
    }
}

/// 終端ノードの属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct WordAttr {
    /// WF_* フラグの組み合わせ
    pub flags: u16,
    /// 単語が属する地域のビットマスク
    pub region: u16,
    /// 必要とされる接辞 ID、0 はなし
    pub affix_id: u8,
}

/// 挿入位置を保持するスロット
///
/// C 実装の `wordnode_st **prev` に相当します。リスト先頭・親の子
/// スロット・前の兄弟のいずれかを明示的に区別します。
#[derive(Debug, Clone, Copy)]
enum Slot {
    First,
    Child(NodeId),
    Sibling(NodeId),
}

/// 共有構造トライ
///
/// ビルド中の単語木です。挿入と圧縮をサポートし、到達可能な
/// (単語, フラグ, 地域, 接辞ID) の組の集合が木の意味です。
pub struct WordTree {
    kind: TreeKind,
    nodes: Vec<WordNode>,
    free: Vec<NodeId>,
    first: NodeId,
    fresh_allocs: u64,
}

impl WordTree {
    /// 空の木を作成します。
    ///
    /// # 引数
    ///
    /// * `kind` - 木の種類
    pub fn new(kind: TreeKind) -> Self {
        Self {
            kind,
            nodes: Vec::new(),
            free: Vec::new(),
            first: NIL,
            fresh_allocs: 0,
        }
    }

    /// 木の種類を返します。
    #[inline]
    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    /// 木が空かどうかを返します。
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first == NIL
    }

    /// 生存しているノード数を返します。
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// これまでに消費したアリーナブロック数を返します。
    ///
    /// ビルダーの定期圧縮トリガーが使用します。
    pub(crate) fn blocks_used(&self) -> u64 {
        self.fresh_allocs / NODES_PER_BLOCK
    }

    /// フリーリスト上のノード数を返します。
    pub(crate) fn free_count(&self) -> usize {
        self.free.len()
    }

    fn alloc(&mut self) -> NodeId {
        if let Some(id) = self.free.pop() {
            self.nodes[id as usize] = WordNode::default();
            id
        } else {
            self.fresh_allocs += 1;
            self.nodes.push(WordNode::default());
            (self.nodes.len() - 1) as NodeId
        }
    }

    #[inline]
    fn node(&self, id: NodeId) -> &WordNode {
        &self.nodes[id as usize]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut WordNode {
        &mut self.nodes[id as usize]
    }

    fn get_slot(&self, slot: Slot) -> NodeId {
        match slot {
            Slot::First => self.first,
            Slot::Child(p) => self.node(p).child,
            Slot::Sibling(p) => self.node(p).sibling,
        }
    }

    fn set_slot(&mut self, slot: Slot, id: NodeId) {
        match slot {
            Slot::First => self.first = id,
            Slot::Child(p) => self.node_mut(p).child = id,
            Slot::Sibling(p) => self.node_mut(p).sibling = id,
        }
    }

    /// 兄弟リスト全体を複製します(コピーオンライト)。
    ///
    /// 元のリストの参照カウントは呼び出し側で既に減算されている前提です。
    /// 部分的な共有は最適化せず、常にリスト全体を写します。
    fn clone_list(&mut self, head: NodeId, slot: Slot) -> NodeId {
        let mut src = head;
        let mut dst_slot = slot;
        let mut new_head = NIL;
        while src != NIL {
            let np = self.alloc();
            let srcn = self.node(src).clone();
            {
                let n = self.node_mut(np);
                n.byte = srcn.byte;
                n.child = srcn.child;
                if srcn.byte == 0 {
                    n.flags = srcn.flags;
                    n.region = srcn.region;
                    n.affix_id = srcn.affix_id;
                }
                n.refs = 1;
            }
            if srcn.child != NIL {
                // The child list gains one more parent slot.
                self.node_mut(srcn.child).refs += 1;
            }
            self.set_slot(dst_slot, np);
            dst_slot = Slot::Sibling(np);
            if new_head == NIL {
                new_head = np;
            }
            src = srcn.sibling;
        }
        self.set_slot(dst_slot, NIL);
        new_head
    }

    /// 整列のためにノードが挿入点より前に来るかを判定します。
    ///
    /// 兄弟はバイト値の昇順に並びます。終端(byte==0)同士は木の種類に
    /// 応じた副次キーで並びます。
    fn precedes(&self, id: NodeId, byte: u8, flags: u16, region: u16, affix_id: u8) -> bool {
        let n = self.node(id);
        if n.byte < byte {
            return true;
        }
        if n.byte != 0 || byte != 0 {
            return false;
        }
        match self.kind {
            TreeKind::Prefix => n.affix_id < affix_id,
            TreeKind::Sound => n.flags < flags || (n.flags == flags && n.region < region),
            TreeKind::Fold | TreeKind::KeepCase => {
                n.flags < flags || (n.flags == flags && n.affix_id < affix_id)
            }
        }
    }

    /// 単語を1つ挿入します。
    ///
    /// 単語はバイト列として終端の0バイトまで1バイトずつ木に追加されます。
    /// 途中で参照カウントが1を超える兄弟リストに出会った場合は、
    /// リストを複製してから変更します。同一の (単語, flags, affix_id)
    /// の再挿入は region のORのみを行い、冪等です。
    ///
    /// # 引数
    ///
    /// * `word` - 挿入する単語のバイト列(終端の0は含めない)
    /// * `flags` - WF_* フラグ(接頭辞木では PFX_FLAGS | WFP_*)
    /// * `region` - 地域ビットマスク(接頭辞木では条件番号)
    /// * `affix_id` - 接辞 ID、0 はなし
    pub fn insert(&mut self, word: &[u8], flags: u16, region: u16, affix_id: u8) {
        let mut slot = Slot::First;

        for i in 0..=word.len() {
            let byte = if i < word.len() { word[i] } else { 0 };

            // When there is more than one reference to this sibling list
            // we need to make a copy, so that we can modify it.
            let head = self.get_slot(slot);
            let mut node = head;
            if head != NIL && self.node(head).refs > 1 {
                self.node_mut(head).refs -= 1;
                node = self.clone_list(head, slot);
            }

            // Look for the sibling that has the same byte. They are sorted
            // on byte value, thus stop searching when a sibling is found
            // with a higher byte value.
            while node != NIL && self.precedes(node, byte, flags, region, affix_id) {
                slot = Slot::Sibling(node);
                node = self.node(node).sibling;
            }

            let need_new = node == NIL
                || self.node(node).byte != byte
                || (byte == 0
                    && match self.kind {
                        // Prefix and soundfold terminals are never merged
                        // here, duplicates are handled upstream.
                        TreeKind::Prefix | TreeKind::Sound => true,
                        TreeKind::Fold | TreeKind::KeepCase => {
                            self.node(node).flags != flags
                                || self.node(node).affix_id != affix_id
                        }
                    });

            if need_new {
                let np = self.alloc();
                self.node_mut(np).byte = byte;
                // A new head inherits the list's external reference count,
                // the displaced node keeps exactly one.
                if node == NIL {
                    self.node_mut(np).refs = 1;
                } else {
                    let r = self.node(node).refs;
                    self.node_mut(np).refs = r;
                    self.node_mut(node).refs = 1;
                }
                self.set_slot(slot, np);
                self.node_mut(np).sibling = node;
                node = np;
            }

            if byte == 0 {
                let n = self.node_mut(node);
                n.flags = flags;
                n.region |= region;
                n.affix_id = affix_id;
                break;
            }

            slot = Slot::Child(node);
        }
    }

    /// 単語を検索し、終端の属性をすべて返します。
    ///
    /// # 引数
    ///
    /// * `word` - 検索する単語のバイト列
    ///
    /// # 戻り値
    ///
    /// 一致した終端ノードの属性のベクター。未知語の場合は空です。
    pub fn lookup(&self, word: &[u8]) -> Vec<WordAttr> {
        let mut list = self.first;
        for &b in word {
            let mut found = NIL;
            let mut n = list;
            while n != NIL {
                let nn = self.node(n);
                if nn.byte == b {
                    found = n;
                    break;
                }
                if nn.byte > b {
                    break;
                }
                n = nn.sibling;
            }
            if found == NIL {
                return Vec::new();
            }
            list = self.node(found).child;
        }

        let mut out = Vec::new();
        let mut n = list;
        while n != NIL {
            let nn = self.node(n);
            if nn.byte != 0 {
                break;
            }
            out.push(WordAttr {
                flags: nn.flags,
                region: nn.region,
                affix_id: nn.affix_id,
            });
            n = nn.sibling;
        }
        out
    }

    /// 到達可能なすべての (単語, 属性) の組を訪問します。
    ///
    /// テストとラウンドトリップ検証に使用します。訪問順は兄弟リストの
    /// 整列順に従った深さ優先です。
    pub fn for_each_word<F>(&self, mut f: F)
    where
        F: FnMut(&[u8], WordAttr),
    {
        let mut buf = Vec::with_capacity(MAXWLEN);
        self.walk_words(self.first, &mut buf, &mut f);
    }

    fn walk_words<F>(&self, list: NodeId, buf: &mut Vec<u8>, f: &mut F)
    where
        F: FnMut(&[u8], WordAttr),
    {
        let mut n = list;
        while n != NIL {
            let nn = self.node(n);
            if nn.byte == 0 {
                f(
                    buf,
                    WordAttr {
                        flags: nn.flags,
                        region: nn.region,
                        affix_id: nn.affix_id,
                    },
                );
            } else {
                buf.push(nn.byte);
                self.walk_words(nn.child, buf, f);
                buf.pop();
            }
            n = nn.sibling;
        }
    }

    /// 到達可能な組の集合を整列済みベクターとして返します。
    pub fn word_set(&self) -> Vec<(Vec<u8>, WordAttr)> {
        let mut out = Vec::new();
        self.for_each_word(|w, a| out.push((w.to_vec(), a)));
        out.sort();
        out
    }

    pub(crate) fn first(&self) -> NodeId {
        self.first
    }

    /// アリーナの長さ(解放済みノードを含む)を返します。
    ///
    /// NodeId で添字する補助配列の確保に使用します。
    pub(crate) fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> &WordNode {
        self.node(id)
    }

    pub(crate) fn node_ref_mut(&mut self, id: NodeId) -> &mut WordNode {
        self.node_mut(id)
    }

    /// ノードをフリーリストへ返します。
    ///
    /// ハンドルはアロケータへ返却されず、以後の挿入で再利用されます。
    pub(crate) fn free_node(&mut self, id: NodeId) {
        self.node_mut(id).refs = 0;
        self.free.push(id);
    }

    /// 木を圧縮し、構造的に同一な部分木を共有します。
    ///
    /// 意味は保存されます: 到達可能な組の集合は圧縮の前後で変化しません。
    ///
    /// # 引数
    ///
    /// * `cancel` - 協調的キャンセルのトークン
    ///
    /// # 戻り値
    ///
    /// 圧縮前の総ノード数と削減されたノード数
    ///
    /// # エラー
    ///
    /// キャンセルが要求された場合は [`crate::SpellError::Interrupted`] を返します。
    pub fn compress(&mut self, cancel: &CancelToken) -> Result<compress::CompressStats> {
        compress::compress_tree(self, cancel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{WF_KEEPCAP, WF_RARE};

    fn attr(flags: u16, region: u16, affix_id: u8) -> WordAttr {
        WordAttr {
            flags,
            region,
            affix_id,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"walk", 0, 1, 0);
        t.insert(b"walking", WF_RARE, 1, 0);
        assert_eq!(t.lookup(b"walk"), vec![attr(0, 1, 0)]);
        assert_eq!(t.lookup(b"walking"), vec![attr(WF_RARE, 1, 0)]);
        assert!(t.lookup(b"wal").is_empty());
        assert!(t.lookup(b"walks").is_empty());
    }

    #[test]
    fn test_fresh_nodes_have_nil_links() {
        // A freshly allocated node must not point at node 0, that would
        // make a two-byte word loop back to the root list.
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"ab", 0, 1, 0);
        assert_eq!(t.word_set(), vec![(b"ab".to_vec(), attr(0, 1, 0))]);
        t.compress(&CancelToken::new()).unwrap();
        assert_eq!(t.word_set(), vec![(b"ab".to_vec(), attr(0, 1, 0))]);
    }

    #[test]
    fn test_insert_idempotent() {
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"cat", 0, 1, 0);
        let before = t.word_set();
        let count = t.node_count();
        t.insert(b"cat", 0, 1, 0);
        assert_eq!(t.word_set(), before);
        assert_eq!(t.node_count(), count);
    }

    #[test]
    fn test_region_mask_is_ored() {
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"cat", 0, 1, 0);
        t.insert(b"cat", 0, 2, 0);
        assert_eq!(t.lookup(b"cat"), vec![attr(0, 3, 0)]);
    }

    #[test]
    fn test_distinct_terminal_attrs_coexist() {
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"cat", 0, 1, 0);
        t.insert(b"cat", WF_KEEPCAP, 1, 0);
        t.insert(b"cat", 0, 1, 3);
        let attrs = t.lookup(b"cat");
        assert_eq!(attrs.len(), 3);
        // Sorted by flags, then affix ID.
        assert_eq!(attrs[0], attr(0, 1, 0));
        assert_eq!(attrs[1], attr(0, 1, 3));
        assert_eq!(attrs[2], attr(WF_KEEPCAP, 1, 0));
    }

    #[test]
    fn test_siblings_sorted_by_byte() {
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"cb", 0, 1, 0);
        t.insert(b"ca", 0, 1, 0);
        t.insert(b"cc", 0, 1, 0);
        let words: Vec<Vec<u8>> = t.word_set().into_iter().map(|(w, _)| w).collect();
        assert_eq!(words, vec![b"ca".to_vec(), b"cb".to_vec(), b"cc".to_vec()]);
    }

    #[test]
    fn test_insert_after_compress_preserves_shared_subtree() {
        // Two words sharing the "s" tail after compression; inserting
        // another word through the shared part must not corrupt the other.
        let mut t = WordTree::new(TreeKind::Fold);
        t.insert(b"cats", 0, 1, 0);
        t.insert(b"dogs", 0, 1, 0);
        let cancel = CancelToken::new();
        t.compress(&cancel).unwrap();
        let before: Vec<_> = t.lookup(b"dogs");

        // Goes through the shared "s" sibling list.
        t.insert(b"catsup", 0, 1, 0);

        assert_eq!(t.lookup(b"dogs"), before);
        assert_eq!(t.lookup(b"cats"), vec![attr(0, 1, 0)]);
        assert_eq!(t.lookup(b"catsup"), vec![attr(0, 1, 0)]);
    }
}
