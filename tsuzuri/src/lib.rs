//! # Tsuzuri
//!
//! Tsuzuriは、共有構造トライに基づくスペルチェック辞書のコンパイラ兼リーダの実装です。
//!
//! ## 概要
//!
//! このライブラリは、Hunspell/Myspell形式のソース（.aff + .dic）やプレーンな
//! 単語リストからスペル辞書を構築し、バイナリ形式（`VIMspell`）へ書き出す
//! ためのツール群を提供します。構築されるトライは部分木単位の構造共有で圧縮
//! され、サジェスト用のサウンドフォールド索引（`VIMsug`）も同時に生成できます。
//!
//! ## 主な機能
//!
//! - **接辞展開**: .aff ファイルの PFX/SFX 規則による語形の生成
//! - **構造共有トライ**: 参照カウント付きノード配列と事後の部分木マージ
//! - **バイナリ入出力**: セクション化されたビッグエンディアン形式の読み書き
//! - **サウンドフォールド**: SOFO / SAL 規則による発音正規化と .sug 索引
//!
//! ## 使用例
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use tsuzuri::{CompileOptions, Dictionary};
//!
//! let opts = CompileOptions::default();
//! // "en" から en.aff と en.dic を読み、en.utf-8.spl を書き出します。
//! tsuzuri::compile(&["en".into()], "en.utf-8.spl", &opts)?;
//!
//! let dict = Dictionary::from_path("en.utf-8.spl")?;
//! assert!(!dict.lookup("hello").is_empty());
//! # Ok(())
//! # }
//! ```

pub mod affix;
pub mod builder;
pub mod dictionary;
pub mod errors;
pub mod flags;
pub mod format;
pub mod soundfold;
pub mod tree;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use builder::{compile, CompileOptions};
pub use dictionary::{Dictionary, SugFile};
pub use errors::{Result, SpellError};
pub use flags::CapType;
pub use soundfold::SoundFolder;
pub use tree::{CompressStats, TreeKind, WordAttr, WordTree};

/// 長時間かかる構築処理を外部から中断するためのトークンです。
///
/// クローンはすべて同じフラグを共有します。圧縮やシリアライズの
/// ループは定期的に [`CancelToken::check`] を呼び、キャンセル済みなら
/// [`SpellError::Interrupted`] で抜けます。
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// 新しいトークンを生成します。
    pub fn new() -> Self {
        Self::default()
    }

    /// キャンセルを要求します。以後の [`check`](Self::check) は失敗します。
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// キャンセル済みかどうかを返します。
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// キャンセル済みなら [`SpellError::Interrupted`] を返します。
    ///
    /// # エラー
    ///
    /// * [`SpellError::Interrupted`] - [`cancel`](Self::cancel) が呼ばれた後の場合
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SpellError::Interrupted)
        } else {
            Ok(())
        }
    }
}
