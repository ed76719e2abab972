//! サウンドフォールドと .sug ファイルに関するテスト
//!
//! SOFO/SAL 付きの辞書から .sug ファイルが作られ、発音の近い
//! 単語が引けることを検証します。

use std::fs;
use std::path::PathBuf;

use tempfile::{tempdir, TempDir};

use crate::{compile, CompileOptions, Dictionary, SoundFolder, SpellError, SugFile};

const SOFO_AFF: &str = "SET UTF-8\n\
    SOFOFROM abcdefghijklmnopqrstuvwxyz\n\
    SOFOTO   ebctefghejklnnepkrstevvkes\n";

fn compile_with_sug(dir: &TempDir, aff: &str, dic: &str) -> PathBuf {
    let base = dir.path().join("en");
    fs::write(base.with_extension("aff"), aff).unwrap();
    fs::write(base.with_extension("dic"), dic).unwrap();

    let out = dir.path().join("en.utf-8.spl");
    let inputs = vec![base.to_str().unwrap().to_string()];
    compile(&inputs, &out, &CompileOptions::default()).unwrap();
    out
}

#[test]
fn sofo_dictionary_gets_a_sug_file() {
    let dir = tempdir().unwrap();
    let out = compile_with_sug(&dir, SOFO_AFF, "3\nwalk\nwolk\ntalk\n");

    let sug_path = out.with_extension("sug");
    assert!(sug_path.exists());

    let dict = Dictionary::from_path(&out).unwrap();
    assert_ne!(dict.sugtime(), 0);

    let sug = SugFile::from_path(&sug_path).unwrap();
    sug.check_timestamp(&dict).unwrap();
    // "walk" and "wolk" share one soundfold group, "talk" has its own.
    assert_eq!(sug.word_count(), 2);
}

#[test]
fn similar_words_are_recovered() {
    let dir = tempdir().unwrap();
    let out = compile_with_sug(&dir, SOFO_AFF, "3\nwalk\nwolk\ntalk\n");

    let dict = Dictionary::from_path(&out).unwrap();
    let sug = SugFile::from_path(out.with_extension("sug")).unwrap();
    let folder = SoundFolder::from_dictionary(&dict).unwrap();

    let folded = folder.fold("walc");
    assert_eq!(folded, "velc");
    // No word folds to "velc" itself, but "walk" does fold to "velk".
    let mut words: Vec<String> = sug
        .similar_word_nrs(&folder.fold("wallk"))
        .into_iter()
        .filter_map(|nr| dict.word_at(nr))
        .collect();
    assert!(words.is_empty());

    words = sug
        .similar_word_nrs(&folder.fold("walk"))
        .into_iter()
        .filter_map(|nr| dict.word_at(nr))
        .collect();
    words.sort();
    assert_eq!(words, ["walk", "wolk"]);

    let talk: Vec<String> = sug
        .similar_word_nrs(&folder.fold("talk"))
        .into_iter()
        .filter_map(|nr| dict.word_at(nr))
        .collect();
    assert_eq!(talk, ["talk"]);
}

#[test]
fn stale_sug_file_is_detected() {
    let dir = tempdir().unwrap();
    let out = compile_with_sug(&dir, SOFO_AFF, "1\nwalk\n");
    let sug_path = out.with_extension("sug");

    let sug = SugFile::from_path(&sug_path).unwrap();

    // Pretend the .spl file was rebuilt later without soundfolding.
    let base = dir.path().join("en");
    fs::write(base.with_extension("aff"), "SET UTF-8\n").unwrap();
    let inputs = vec![base.to_str().unwrap().to_string()];
    let opts = CompileOptions {
        overwrite: true,
        ..Default::default()
    };
    compile(&inputs, &out, &opts).unwrap();

    let dict = Dictionary::from_path(&out).unwrap();
    assert!(matches!(
        sug.check_timestamp(&dict),
        Err(SpellError::SugTimestampMismatch { .. })
    ));
}

#[test]
fn sal_rules_drive_the_folding() {
    let dir = tempdir().unwrap();
    let out = compile_with_sug(
        &dir,
        "SET UTF-8\n\
         SAL CIA X\n\
         SAL CH X\n\
         SAL C K\n\
         SAL K K\n",
        "2\nchrome\ncrome\n",
    );

    let dict = Dictionary::from_path(&out).unwrap();
    let folder = SoundFolder::from_dictionary(&dict).unwrap();
    // CH wins over C by being the longer match.
    assert_eq!(folder.fold("chrome"), "xrome");
    assert_eq!(folder.fold("crome"), "krome");

    let sug = SugFile::from_path(out.with_extension("sug")).unwrap();
    let words: Vec<String> = sug
        .similar_word_nrs("xrome")
        .into_iter()
        .filter_map(|nr| dict.word_at(nr))
        .collect();
    assert_eq!(words, ["chrome"]);
}

#[test]
fn nosugfile_suppresses_the_sug_file() {
    let dir = tempdir().unwrap();
    let aff = format!("{SOFO_AFF}NOSUGFILE\n");
    let out = compile_with_sug(&dir, &aff, "1\nwalk\n");

    assert!(!out.with_extension("sug").exists());
    let dict = Dictionary::from_path(&out).unwrap();
    assert_eq!(dict.sugtime(), 0);
}
