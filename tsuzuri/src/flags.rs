//! 単語属性フラグとファイルフォーマット定数
//!
//! バイナリフォーマットに書き込まれるビット値をそのまま定義します。
//! 値はフォーマット互換性のために固定であり、変更されることは想定されていません。

/// region バイトが後続することを示す
pub const WF_REGION: u16 = 0x01;
/// 先頭のみ大文字の単語(または全て大文字)
pub const WF_ONECAP: u16 = 0x02;
/// 全て大文字でなければならない単語
pub const WF_ALLCAP: u16 = 0x04;
/// まれな単語
pub const WF_RARE: u16 = 0x08;
/// 禁止された単語
pub const WF_BANNED: u16 = 0x10;
/// affix ID バイトが後続することを示す
pub const WF_AFX: u16 = 0x20;
/// keep-case 単語、全大文字は不可
pub const WF_FIXCAP: u16 = 0x40;
/// keep-case 単語
pub const WF_KEEPCAP: u16 = 0x80;

// 0x100 以上のフラグは <flags2> バイトに入ります。
/// 単語が接辞を含む
pub const WF_HAS_AFF: u16 = 0x0100;
/// 複合語の中でのみ有効な単語
pub const WF_NEEDCOMP: u16 = 0x0200;
/// 提案に使わない単語
pub const WF_NOSUGGEST: u16 = 0x0400;
/// 既に複合された単語 (COMPOUNDROOT)
pub const WF_COMPROOT: u16 = 0x0800;
/// この単語の前では複合しない
pub const WF_NOCOMPBEF: u16 = 0x1000;
/// この単語の後では複合しない
pub const WF_NOCOMPAFT: u16 = 0x2000;

/// 後置接頭辞のフラグ: まれな接頭辞
pub const WFP_RARE: u16 = 0x01;
/// 後置接頭辞のフラグ: 結合しない接頭辞
pub const WFP_NC: u16 = 0x02;
/// 後置接頭辞のフラグ: 大文字化する接頭辞
pub const WFP_UP: u16 = 0x04;
/// 後置接頭辞のフラグ: COMPOUNDPERMITFLAG 付き
pub const WFP_COMPPERMIT: u16 = 0x08;
/// 後置接頭辞のフラグ: COMPOUNDFORBIDFLAG 付き
pub const WFP_COMPFORBID: u16 = 0x10;

/// 単語の大文字・小文字の種別
///
/// 格納時に単語を分類し、case-fold 木に属性として記録します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapType {
    /// すべて小文字、そのまま照合できる
    Plain,
    /// 先頭のみ大文字
    OneCap,
    /// すべて大文字
    AllCap,
    /// 大文字小文字が混在、元の綴りを保持する必要がある
    KeepCap,
}

impl CapType {
    /// この種別に対応する WF_* フラグを返します。
    pub const fn word_flags(self) -> u16 {
        match self {
            CapType::Plain => 0,
            CapType::OneCap => WF_ONECAP,
            CapType::AllCap => WF_ALLCAP,
            CapType::KeepCap => WF_KEEPCAP,
        }
    }
}

/// 単語の大文字・小文字の種別を判定します。
///
/// 先頭文字が大文字で残りが小文字なら `OneCap`、すべて大文字なら
/// `AllCap`、先頭以外に大文字が混ざるなら `KeepCap` になります。
///
/// # 引数
///
/// * `word` - 判定する単語
///
/// # 戻り値
///
/// 判定された[`CapType`]
pub fn captype(word: &str) -> CapType {
    let mut chars = word.chars().filter(|c| c.is_alphabetic());
    let first = match chars.next() {
        Some(c) => c,
        None => return CapType::Plain,
    };
    let firstcap = first.is_uppercase();
    let mut allcap = firstcap;
    let mut past_second = false;

    for c in chars {
        if c.is_uppercase() {
            if !allcap {
                // UlU or lU: a capital after a lower-case letter means
                // the exact spelling must be kept.
                return CapType::KeepCap;
            }
        } else {
            if past_second && allcap {
                // UUl: a lower-case letter after two capitals.
                return CapType::KeepCap;
            }
            allcap = false;
        }
        past_second = true;
    }

    if allcap && firstcap {
        CapType::AllCap
    } else if firstcap {
        CapType::OneCap
    } else {
        CapType::Plain
    }
}

/// 単語を小文字に畳み込みます。
///
/// case-fold 木への挿入前の正規化です。FOL テーブルが .aff で宣言
/// されている場合は[`crate::affix::AffFile`]側の写像が優先されます。
pub fn case_fold(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for c in word.chars() {
        for l in c.to_lowercase() {
            out.push(l);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captype_plain() {
        assert_eq!(captype("walk"), CapType::Plain);
        assert_eq!(captype(""), CapType::Plain);
    }

    #[test]
    fn test_captype_onecap() {
        assert_eq!(captype("Amsterdam"), CapType::OneCap);
        assert_eq!(captype("A"), CapType::AllCap);
    }

    #[test]
    fn test_captype_allcap() {
        assert_eq!(captype("NATO"), CapType::AllCap);
    }

    #[test]
    fn test_captype_keepcap() {
        assert_eq!(captype("iPod"), CapType::KeepCap);
        assert_eq!(captype("McDonald"), CapType::KeepCap);
    }

    #[test]
    fn test_case_fold() {
        assert_eq!(case_fold("Straße"), "straße");
        assert_eq!(case_fold("NATO"), "nato");
    }
}
