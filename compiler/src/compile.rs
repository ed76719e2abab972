//! 辞書コンパイルのサブコマンド
//!
//! .aff/.dic の組や単語リストからバイナリの .spl 辞書を生成します。
//! 辞書にサウンドフォールド情報が含まれる場合、対応する .sug ファイルも
//! 同時に生成されます。

use std::io;
use std::path::PathBuf;

use clap::Parser;

use tsuzuri::builder::output_name;
use tsuzuri::{CompileOptions, SpellError};

/// コンパイルコマンドの引数
///
/// 入力のベース名と出力先、動作モードを指定します。
#[derive(Parser, Debug)]
#[clap(
    name = "compile",
    about = "A program to compile spell dictionaries from .aff/.dic sources."
)]
pub struct Args {
    /// Input base names. For each name, when `name.aff` exists the pair
    /// `name.aff` + `name.dic` is read, otherwise the name itself is read
    /// as a plain word list. With more than one input each name must end
    /// in "_xx" with a two-letter region name.
    #[clap(required = true)]
    inputs: Vec<String>,

    /// File to which the binary dictionary is output.
    ///
    /// If this argument is not specified, the name is derived from the
    /// first input: `{name}.utf-8.spl`, or `{name}.ascii.spl` with
    /// `--ascii`.
    #[clap(short = 'o', long)]
    out: Option<PathBuf>,

    /// Discard words and affix rules with non-ASCII characters.
    #[clap(long)]
    ascii: bool,

    /// Overwrite an existing output file.
    #[clap(short = 'f', long)]
    force: bool,
}

/// コンパイル処理中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 辞書構築エラー
    #[error("Dictionary compilation failed: {0}")]
    Tsuzuri(#[from] SpellError),
}

/// コンパイルコマンドを実行する
///
/// # 引数
///
/// * `args` - コマンドライン引数
///
/// # エラー
///
/// 入力の読み込みまたは辞書の書き出しに失敗した場合、`CompileError`を返します。
pub fn run(args: Args) -> Result<(), CompileError> {
    let out = match args.out {
        Some(out) => out,
        None => {
            // Strip a region suffix so that "en_us" becomes "en.utf-8.spl".
            let first = args.inputs[0].as_str();
            let base = match first.char_indices().rev().nth(2) {
                Some((i, '_')) if args.inputs.len() > 1 => &first[..i],
                _ => first,
            };
            output_name(base, args.ascii)
        }
    };

    let opts = CompileOptions {
        ascii: args.ascii,
        overwrite: args.force,
        ..CompileOptions::default()
    };
    tsuzuri::compile(&args.inputs, &out, &opts)?;
    log::info!("Wrote {}", out.display());
    Ok(())
}
