//! 辞書概要表示のサブコマンド
//!
//! コンパイル済みの .spl ファイルを読み込み、セクションの内容を
//! 人が読める形で出力します。

use std::io;
use std::path::PathBuf;

use clap::Parser;

use tsuzuri::{Dictionary, SpellError};

/// 概要表示コマンドの引数
#[derive(Parser, Debug)]
#[clap(name = "info", about = "A program to show a summary of a compiled dictionary.")]
pub struct Args {
    /// Compiled dictionary file (.spl).
    dict: PathBuf,
}

/// 概要表示中に発生する可能性のあるエラー
#[derive(Debug, thiserror::Error)]
pub enum InfoError {
    /// 入出力エラー
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// 辞書読み込みエラー
    #[error("Dictionary loading failed: {0}")]
    Tsuzuri(#[from] SpellError),
}

/// 概要表示コマンドを実行する
///
/// # エラー
///
/// 辞書ファイルが読めない場合、`InfoError`を返します。
pub fn run(args: Args) -> Result<(), InfoError> {
    let dict = Dictionary::from_path(&args.dict)?;

    println!("file: {}", args.dict.display());
    if !dict.info().is_empty() {
        println!("info: {}", dict.info());
    }
    if dict.region_names().is_empty() {
        println!("regions: 1");
    } else {
        println!("regions: {}", dict.region_names().join(" "));
    }
    println!("words (case-folded): {}", dict.fold_word_count());
    if let Some(midword) = dict.midword() {
        println!("midword: {midword}");
    }
    println!("prefix conditions: {}", dict.prefcond_count());
    println!("rep: {} repsal: {}", dict.rep().len(), dict.repsal().len());
    if let Some((fr, to)) = dict.sofo() {
        println!("sofo: {} -> {}", fr.len(), to.len());
    } else {
        println!("sal: {}", dict.sal().len());
    }
    if !dict.map_chars().is_empty() {
        println!("map: {}", dict.map_chars());
    }
    if dict.common_word_count() > 0 {
        println!("common words: {}", dict.common_word_count());
    }
    if !dict.compound_flags().is_empty() {
        let (compmax, compminlen, compsylmax, compoptions) = dict.compound_limits();
        println!(
            "compounding: flags={} max={} minlen={} sylmax={} options={:#x} patterns={}",
            dict.compound_flags().len(),
            compmax,
            compminlen,
            compsylmax,
            compoptions,
            dict.compound_patterns().len(),
        );
    }
    if let Some(syllable) = dict.syllable() {
        println!("syllable: {syllable}");
    }
    if dict.nobreak() {
        println!("nobreak: yes");
    }
    if dict.nosplitsugs() {
        println!("nosplitsugs: yes");
    }
    if dict.nocompoundsugs() {
        println!("nocompoundsugs: yes");
    }
    if dict.sugtime() != 0 {
        println!("sug timestamp: {}", dict.sugtime());
    }
    Ok(())
}
