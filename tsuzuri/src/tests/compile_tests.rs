//! 辞書コンパイルに関するテスト
//!
//! .aff/.dic の組や単語リストから .spl ファイルを作り、
//! 読み戻した辞書で単語が引けることを検証します。

use std::fs;
use std::path::PathBuf;

use tempfile::{tempdir, TempDir};

use crate::flags::{WF_BANNED, WF_KEEPCAP, WF_RARE};
use crate::{compile, CompileOptions, Dictionary, SpellError};

/// .aff と .dic を書き込んでコンパイルし、出力パスを返します。
fn compile_pair(dir: &TempDir, aff: &str, dic: &str) -> PathBuf {
    let base = dir.path().join("en");
    fs::write(base.with_extension("aff"), aff).unwrap();
    fs::write(base.with_extension("dic"), dic).unwrap();

    let out = dir.path().join("en.utf-8.spl");
    let inputs = vec![base.to_str().unwrap().to_string()];
    compile(&inputs, &out, &CompileOptions::default()).unwrap();
    out
}

#[test]
fn affixed_forms_are_found() {
    let dir = tempdir().unwrap();
    let out = compile_pair(
        &dir,
        "SET UTF-8\n\
         SFX S Y 2\n\
         SFX S 0 s [^y]\n\
         SFX S y ies y\n\
         PFX R Y 1\n\
         PFX R 0 re .\n",
        "2\nwalk/SR\nberry/S\n",
    );

    let dict = Dictionary::from_path(&out).unwrap();
    for word in ["walk", "walks", "rewalk", "rewalks", "berry", "berries"] {
        assert!(!dict.lookup(word).is_empty(), "{word} should be known");
    }
    for word in ["walking", "reberry", "berrys", "walkies"] {
        assert!(dict.lookup(word).is_empty(), "{word} should be unknown");
    }
}

#[test]
fn postponed_prefixes_are_not_expanded() {
    let dir = tempdir().unwrap();
    let out = compile_pair(
        &dir,
        "SET UTF-8\n\
         PFXPOSTPONE\n\
         PFX R Y 1\n\
         PFX R 0 re .\n\
         SFX S Y 1\n\
         SFX S 0 s .\n",
        "1\nwalk/RS\n",
    );

    let dict = Dictionary::from_path(&out).unwrap();
    // The prefix went into the condition table instead of the word tree.
    assert_eq!(dict.prefcond_count(), 1);
    assert!(dict.lookup("rewalk").is_empty());
    // The stem carries the prefix ID so a matcher can combine them later.
    assert!(dict.lookup("walk").iter().any(|a| a.affix_id != 0));
    assert!(dict.lookup("walks").iter().any(|a| a.affix_id != 0));
}

#[test]
fn keepcase_words_keep_their_case() {
    let dir = tempdir().unwrap();
    let out = compile_pair(&dir, "SET UTF-8\n", "2\nMcDonald\nwalk\n");

    let dict = Dictionary::from_path(&out).unwrap();
    let attrs = dict.lookup("McDonald");
    assert!(!attrs.is_empty());
    // The case-folded copy carries WF_KEEPCAP so the exact-case tree
    // is known to hold the real spelling.
    assert!(dict.lookup("mcdonald").iter().any(|a| a.flags & WF_KEEPCAP != 0));
    assert!(!dict.lookup("walk").is_empty());
}

#[test]
fn forbidden_and_rare_flags_survive() {
    let dir = tempdir().unwrap();
    let out = compile_pair(
        &dir,
        "SET UTF-8\nFORBIDDENWORD !\nRARE ?\n",
        "3\nwalk\nwlak/!\ngrey/?\n",
    );

    let dict = Dictionary::from_path(&out).unwrap();
    assert!(dict.lookup("wlak").iter().any(|a| a.flags & WF_BANNED != 0));
    assert!(dict.lookup("grey").iter().any(|a| a.flags & WF_RARE != 0));
    assert!(dict.lookup("walk").iter().all(|a| a.flags & (WF_BANNED | WF_RARE) == 0));
}

#[test]
fn regions_come_from_input_suffixes() {
    let dir = tempdir().unwrap();
    let us = dir.path().join("en_US");
    let gb = dir.path().join("en_GB");
    fs::write(&us, "walk\ncolor\n").unwrap();
    fs::write(&gb, "walk\ncolour\n").unwrap();

    let out = dir.path().join("en.utf-8.spl");
    let inputs = vec![
        us.to_str().unwrap().to_string(),
        gb.to_str().unwrap().to_string(),
    ];
    compile(&inputs, &out, &CompileOptions::default()).unwrap();

    let dict = Dictionary::from_path(&out).unwrap();
    assert_eq!(dict.region_names(), ["us", "gb"]);

    let mask = |word: &str| dict.lookup(word).iter().fold(0u16, |m, a| m | a.region);
    assert_eq!(mask("color"), 0x1);
    assert_eq!(mask("colour"), 0x2);
    assert_eq!(mask("walk"), 0x3);
}

#[test]
fn rep_and_midword_round_trip() {
    let dir = tempdir().unwrap();
    let out = compile_pair(
        &dir,
        "SET UTF-8\nMIDWORD '-\nREP 2\nREP f ph\nREP ph f\n",
        "1\nwalk\n",
    );

    let dict = Dictionary::from_path(&out).unwrap();
    assert_eq!(dict.midword(), Some("'-"));
    assert_eq!(dict.rep().len(), 2);
    // REP items are written sorted on the "from" text.
    assert_eq!(dict.rep()[0].from, "f");
    assert_eq!(dict.rep()[1].from, "ph");
}

#[test]
fn existing_output_is_not_overwritten() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("en");
    fs::write(base.with_extension("aff"), "SET UTF-8\n").unwrap();
    fs::write(base.with_extension("dic"), "1\nwalk\n").unwrap();

    let out = dir.path().join("en.utf-8.spl");
    let inputs = vec![base.to_str().unwrap().to_string()];
    compile(&inputs, &out, &CompileOptions::default()).unwrap();

    let again = compile(&inputs, &out, &CompileOptions::default());
    assert!(matches!(again, Err(SpellError::InvalidArgument { .. })));

    let opts = CompileOptions {
        overwrite: true,
        ..Default::default()
    };
    compile(&inputs, &out, &opts).unwrap();
}

#[test]
fn empty_dic_is_a_syntax_error() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("en");
    fs::write(base.with_extension("aff"), "SET UTF-8\n").unwrap();
    fs::write(base.with_extension("dic"), "").unwrap();

    let out = dir.path().join("en.utf-8.spl");
    let inputs = vec![base.to_str().unwrap().to_string()];
    let res = compile(&inputs, &out, &CompileOptions::default());
    assert!(matches!(res, Err(SpellError::Syntax { line: 1, .. })));
}

#[test]
fn output_name_with_region_is_rejected() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("en");
    fs::write(base.with_extension("aff"), "SET UTF-8\n").unwrap();
    fs::write(base.with_extension("dic"), "1\nwalk\n").unwrap();

    let out = dir.path().join("en_us.spl");
    let inputs = vec![base.to_str().unwrap().to_string()];
    let res = compile(&inputs, &out, &CompileOptions::default());
    assert!(matches!(res, Err(SpellError::InvalidArgument { .. })));
}
