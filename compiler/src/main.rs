//! Tsuzuri 辞書コンパイラのメインエントリーポイント
//!
//! このモジュールは、スペル辞書を扱うためのサブコマンドを提供します。
//! .aff/.dic の組や単語リストからのバイナリ辞書のコンパイル、辞書内容の
//! 表示、単語の検査など、辞書に関する操作を統合した CLI ツールです。

mod check;
mod compile;
mod info;

use clap::Parser;
use thiserror::Error;

use crate::{check::CheckError, compile::CompileError, info::InfoError};

/// コマンドライン引数の構造体
///
/// `clap`を使用してコマンドライン引数をパースします。
#[derive(Parser, Debug)]
#[clap(name = "tsuzuric", version)]
struct Cli {
    /// 実行するサブコマンド
    #[clap(subcommand)]
    command: Command,
}

/// 利用可能なサブコマンド
#[derive(Parser, Debug)]
enum Command {
    /// ソースファイルからバイナリ辞書をコンパイルします
    ///
    /// 各入力名について name.aff があれば .aff + .dic の組として、
    /// なければ単語リストとして読み込み、.spl ファイル(と、サウンド
    /// フォールド情報があれば .sug ファイル)を書き出します。
    Compile(compile::Args),

    /// コンパイル済み辞書の概要を表示します
    ///
    /// 地域、単語数、サジェスト関連セクションの有無などを出力します。
    Info(info::Args),

    /// 辞書で単語を検査します
    ///
    /// 単語が登録されているかと、終端のフラグ・地域を表示します。
    Check(check::Args),
}

/// コンパイラの実行中に発生する可能性のあるエラー
///
/// 各サブコマンドで発生したエラーをラップします。
#[derive(Debug, Error)]
pub enum CliError {
    /// 辞書コンパイル中のエラー
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// 概要表示中のエラー
    #[error(transparent)]
    Info(#[from] InfoError),
    /// 単語検査中のエラー
    #[error(transparent)]
    Check(#[from] CheckError),
}

/// メイン関数
///
/// コマンドライン引数をパースし、指定されたサブコマンドを実行します。
///
/// # エラー
///
/// 各サブコマンドの実行中にエラーが発生した場合、そのエラーが返されます。
fn main() -> Result<(), CliError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    match cli.command {
        Command::Compile(args) => Ok(compile::run(args)?),
        Command::Info(args) => Ok(info::run(args)?),
        Command::Check(args) => Ok(check::run(args)?),
    }
}
