//! エラー型の定義
//!
//! このモジュールは、Tsuzuriライブラリで使用されるすべてのエラー型を定義します。
//! テキスト入力の構文エラー(回復可能)、バイナリ入力のフォーマットエラー
//! (そのロード操作について致命的)、リソースエラー、および中断を区別します。

use std::fmt;
use std::path::PathBuf;

/// Tsuzuri専用のResult型
///
/// エラー型としてデフォルトで[`SpellError`]を使用します。
pub type Result<T, E = SpellError> = std::result::Result<T, E>;

/// Tsuzuriのエラー型
///
/// このライブラリで発生する可能性のあるすべてのエラーを表現します。
/// バイナリ入力の失敗は「切り詰め」「不正形式」「バージョン不一致」を
/// 区別して報告するため、呼び出し側はリトライと再生成を判断できます。
#[derive(Debug, thiserror::Error)]
pub enum SpellError {
    /// 無効な引数エラー
    #[error("InvalidArgumentError: {arg}: {msg}")]
    InvalidArgument {
        /// 引数の名前
        arg: &'static str,
        /// エラーメッセージ
        msg: String,
    },

    /// テキスト入力の構文エラー
    ///
    /// .aff / .dic / 単語リストの1行が不正な場合に使用されます。
    /// ファイル名と行番号を常に含みます。
    #[error("Syntax error in {file} line {line}: {msg}")]
    Syntax {
        /// 入力ファイル名
        file: String,
        /// 行番号(1始まり)
        line: usize,
        /// エラーメッセージ
        msg: String,
    },

    /// バイナリ入力が予期したより短い
    #[error("Truncated spell file: {0}")]
    Truncated(&'static str),

    /// バイナリ入力の形式が不正
    #[error("Malformed spell file: {0}")]
    Malformed(String),

    /// マジックバイトが一致しない
    #[error("Not a spell file: bad magic bytes")]
    BadMagic,

    /// ファイルのバージョンがリーダーより新しい
    #[error("Spell file is too new for this reader: version {found}, supported {supported}")]
    TooNew {
        /// ファイルに記録されたバージョン
        found: u8,
        /// このリーダーが対応するバージョン
        supported: u8,
    },

    /// ファイルのバージョンがリーダーより古い
    #[error("Spell file is too old for this reader: version {found}, supported {supported}")]
    TooOld {
        /// ファイルに記録されたバージョン
        found: u8,
        /// このリーダーが対応するバージョン
        supported: u8,
    },

    /// .sug ファイルのタイムスタンプが .spl と一致しない
    #[error("Suggestion file timestamp mismatch: .spl has {spl}, .sug has {sug}")]
    SugTimestampMismatch {
        /// .spl 側のタイムスタンプ
        spl: u64,
        /// .sug 側のタイムスタンプ
        sug: u64,
    },

    /// ビルドがキャンセルトークンにより中断された
    #[error("Dictionary build was interrupted")]
    Interrupted,

    /// ディレクトリが指定されたエラー
    #[error("The path '{0}' is a directory, but a file was expected.")]
    PathIsDirectory(PathBuf),

    /// 標準I/Oエラー
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// UTF-8エンコーディングエラー
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

impl SpellError {
    /// 無効な引数エラーを生成します
    ///
    /// # 引数
    ///
    /// * `arg` - 引数の名前
    /// * `msg` - エラーメッセージ
    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument {
            arg,
            msg: msg.into(),
        }
    }

    /// 構文エラーを生成します
    ///
    /// # 引数
    ///
    /// * `file` - 入力ファイル名
    /// * `line` - 行番号
    /// * `msg` - エラーメッセージ
    pub(crate) fn syntax<F, S>(file: F, line: usize, msg: S) -> Self
    where
        F: fmt::Display,
        S: Into<String>,
    {
        Self::Syntax {
            file: file.to_string(),
            line,
            msg: msg.into(),
        }
    }

    /// 不正形式エラーを生成します
    pub(crate) fn malformed<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Malformed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_errors_are_distinct() {
        let too_new = SpellError::TooNew {
            found: 51,
            supported: 50,
        };
        let too_old = SpellError::TooOld {
            found: 49,
            supported: 50,
        };
        assert!(too_new.to_string().contains("too new"));
        assert!(too_old.to_string().contains("too old"));
    }

    #[test]
    fn test_syntax_error_carries_location() {
        let e = SpellError::syntax("latin.aff", 12, "expected 4 items");
        assert_eq!(
            e.to_string(),
            "Syntax error in latin.aff line 12: expected 4 items"
        );
    }
}
