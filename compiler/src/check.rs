//! 単語照合のサブコマンド
//!
//! コンパイル済み辞書に対して単語を照合し、付与されたフラグを表示します。
//! `--suggest` を指定すると .sug ファイル経由で発音の近い単語も表示します。

use std::io;
use std::path::PathBuf;

use clap::Parser;

use tsuzuri::flags::{WF_BANNED, WF_KEEPCAP, WF_NOSUGGEST, WF_RARE};
use tsuzuri::{Dictionary, SoundFolder, SpellError, SugFile};

/// 照合コマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "check", about = "A program to look up words in a compiled dictionary.")]
pub struct Args {
    /// Compiled dictionary file (.spl).
    dict: PathBuf,

    /// Words to look up.
    #[clap(required = true)]
    words: Vec<String>,

    /// Also show sound-alike words from the companion .sug file.
    #[clap(short = 's', long)]
    suggest: bool,
}

/// 照合中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 辞書読み込みエラー
    #[error("Dictionary loading failed: {0}")]
    Tsuzuri(#[from] SpellError),
}

/// 照合コマンドを実行する
///
/// # エラー
///
/// 辞書ファイルまたは .sug ファイルが読めない場合、`CheckError`を返します。
pub fn run(args: Args) -> Result<(), CheckError> {
    let dict = Dictionary::from_path(&args.dict)?;

    let sug = if args.suggest && dict.sugtime() != 0 {
        let sug = SugFile::from_path(args.dict.with_extension("sug"))?;
        sug.check_timestamp(&dict)?;
        Some((sug, SoundFolder::from_dictionary(&dict)?))
    } else {
        None
    };

    for word in &args.words {
        let attrs = dict.lookup(word);
        if attrs.is_empty() {
            println!("{word}: unknown");
        } else {
            for attr in &attrs {
                let mut notes = Vec::new();
                if attr.flags & WF_BANNED != 0 {
                    notes.push("banned");
                }
                if attr.flags & WF_RARE != 0 {
                    notes.push("rare");
                }
                if attr.flags & WF_KEEPCAP != 0 {
                    notes.push("keep-case");
                }
                if attr.flags & WF_NOSUGGEST != 0 {
                    notes.push("nosuggest");
                }
                print!(
                    "{word}: flags={:#06x} region={:#x} affix={}",
                    attr.flags, attr.region, attr.affix_id
                );
                if notes.is_empty() {
                    println!();
                } else {
                    println!(" ({})", notes.join(", "));
                }
            }
        }

        if let Some((sug, folder)) = &sug {
            let folded = folder.fold(word);
            let mut similar = Vec::new();
            for nr in sug.similar_word_nrs(&folded) {
                if let Some(w) = dict.word_at(nr) {
                    similar.push(w);
                }
            }
            if !similar.is_empty() {
                println!("  sounds like: {}", similar.join(" "));
            }
        }
    }
    Ok(())
}
