//! 辞書ファイル読み込みに関するテスト
//!
//! ヘッダ検証、壊れたファイルの扱い、`Read` 経由の読み込みを
//! 検証します。

use std::fs;

use tempfile::tempdir;

use crate::format::{SPELL_MAGIC, SPELL_VERSION};
use crate::{compile, CompileOptions, Dictionary, SpellError};

#[test]
fn bad_magic_is_rejected() {
    let res = Dictionary::from_bytes(b"NOTSPELLxxxx");
    assert!(matches!(res, Err(SpellError::BadMagic)));
}

#[test]
fn version_mismatch_is_reported() {
    let mut buf = Vec::from(SPELL_MAGIC.as_slice());
    buf.push(SPELL_VERSION - 1);
    assert!(matches!(
        Dictionary::from_bytes(&buf),
        Err(SpellError::TooOld { found, .. }) if found == SPELL_VERSION - 1
    ));

    buf.pop();
    buf.push(SPELL_VERSION + 1);
    assert!(matches!(
        Dictionary::from_bytes(&buf),
        Err(SpellError::TooNew { found, .. }) if found == SPELL_VERSION + 1
    ));
}

#[test]
fn truncated_file_is_an_error() {
    // Magic and version only, the section list is missing.
    let mut buf = Vec::from(SPELL_MAGIC.as_slice());
    buf.push(SPELL_VERSION);
    assert!(matches!(
        Dictionary::from_bytes(&buf),
        Err(SpellError::Truncated(_))
    ));
}

#[test]
fn unknown_required_section_is_malformed() {
    let mut buf = Vec::from(SPELL_MAGIC.as_slice());
    buf.push(SPELL_VERSION);
    // Unknown section id 200 marked SNF_REQUIRED with an empty payload.
    buf.push(200);
    buf.push(crate::format::SNF_REQUIRED);
    buf.extend_from_slice(&0u32.to_be_bytes());
    assert!(matches!(
        Dictionary::from_bytes(&buf),
        Err(SpellError::Malformed(_))
    ));
}

#[test]
fn reader_and_mmap_paths_agree() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("en");
    fs::write(base.with_extension("aff"), "SET UTF-8\n").unwrap();
    fs::write(base.with_extension("dic"), "2\nwalk\ntalk\n").unwrap();

    let out = dir.path().join("en.utf-8.spl");
    let inputs = vec![base.to_str().unwrap().to_string()];
    compile(&inputs, &out, &CompileOptions::default()).unwrap();

    let mapped = Dictionary::from_path(&out).unwrap();
    let read = Dictionary::read(fs::File::open(&out).unwrap()).unwrap();
    assert_eq!(mapped.fold_word_count(), 2);
    assert_eq!(read.fold_word_count(), 2);
    assert!(!mapped.lookup("talk").is_empty());
    assert!(!read.lookup("talk").is_empty());
}

#[test]
fn truncated_tree_is_an_error() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("en");
    fs::write(base.with_extension("aff"), "SET UTF-8\n").unwrap();
    fs::write(base.with_extension("dic"), "1\nwalk\n").unwrap();

    let out = dir.path().join("en.utf-8.spl");
    let inputs = vec![base.to_str().unwrap().to_string()];
    compile(&inputs, &out, &CompileOptions::default()).unwrap();

    let bytes = fs::read(&out).unwrap();
    let cut = &bytes[..bytes.len() - 4];
    assert!(Dictionary::from_bytes(cut).is_err());
}
