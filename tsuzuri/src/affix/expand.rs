//! 接辞規則の適用（語形の展開）。
//!
//! 基本語に PFX/SFX 規則を適用して派生語を作り、単語木へ格納します。
//! 規則側に二次フラグが付いていれば、そこからさらに別の接辞を
//! 再帰的に適用します。

use hashbrown::HashMap;

use crate::affix::{
    flag_in_afflist, get_affix_flags, get_compflags, get_pfxlist, AffFile, AffixHeader,
    CONDIT_AFF, CONDIT_CFIX, CONDIT_COMB, CONDIT_SUF,
};
use crate::builder::SpellInfo;
use crate::errors::Result;
use crate::flags::{WF_HAS_AFF, WF_NOCOMPAFT, WF_NOCOMPBEF};

/// 接辞を適用してできる語をすべて格納します。
///
/// `ht` は適用する規則の表で、`xht` が Some のときは適用後の語に
/// さらにプレフィックスを組み合わせます（`xht` が None なら `ht` は
/// プレフィックス表）。`pfxlist` の先頭 `pfxlen` バイトは後置
/// プレフィックスの ID、残りは compound の ID です。
///
/// # エラー
///
/// * [`SpellError::Interrupted`](crate::SpellError::Interrupted) - 中断された場合
#[allow(clippy::too_many_arguments)]
pub(crate) fn store_aff_word(
    spin: &mut SpellInfo,
    word: &str,
    afflist: &str,
    aff: &AffFile,
    ht: &HashMap<String, AffixHeader>,
    xht: Option<&HashMap<String, AffixHeader>>,
    condit: u8,
    flags: u16,
    pfxlist: &[u8],
    pfxlen: usize,
) -> Result<()> {
    let pfxlen = pfxlen.min(pfxlist.len());

    for ah in ht.values() {
        // Check that the affix combines, if required, and that the word
        // supports this affix.
        if (condit & CONDIT_COMB) != 0 && !ah.combine {
            continue;
        }
        if !flag_in_afflist(aff.flag_type, afflist, ah.flag) {
            continue;
        }

        for ae in &ah.entries {
            // The condition is matched with the unmodified word; that is not
            // logical but required for compatibility with Myspell. Myspell
            // also requires the chop string to be shorter than the word.
            // For postponed prefixes only entries with a chop string or
            // secondary flags are expanded here.
            // When a previously added affix had CIRCUMFIX this one must have
            // it too, and the other way around.
            let postponable = xht.is_none()
                && aff.pfxpostpone
                && ae.chop.is_none()
                && ae.flags.is_none();
            if postponable {
                continue;
            }
            if let Some(chop) = &ae.chop {
                if chop.len() >= word.len() {
                    continue;
                }
            }
            if let Some(prog) = &ae.prog {
                if !prog.is_match(word) {
                    continue;
                }
            }
            let has_cfix = (condit & CONDIT_AFF) != 0
                && ae.flags.as_deref().is_some_and(|f| {
                    aff.circumfix != 0 && flag_in_afflist(aff.flag_type, f, aff.circumfix)
                });
            if ((condit & CONDIT_CFIX) == 0) != !has_cfix {
                continue;
            }

            // Match. Remove the chop and add the affix.
            let newword = if xht.is_none() {
                // prefix: chop/add at the start of the word
                let mut w = ae.add.clone().unwrap_or_default();
                let rest = match &ae.chop {
                    Some(chop) => skip_chars(word, chop.chars().count()),
                    None => word,
                };
                w.push_str(rest);
                w
            } else {
                // suffix: chop/add at the end of the word
                let mut w = word.to_string();
                if let Some(chop) = &ae.chop {
                    for _ in 0..chop.chars().count() {
                        w.pop();
                    }
                }
                if let Some(add) = &ae.add {
                    w.push_str(add);
                }
                w
            };

            let mut use_flags = flags;
            let mut use_condit = condit | CONDIT_COMB | CONDIT_AFF;
            let mut need_affix = false;
            let mut owned: Vec<u8>;
            let mut use_pfxlist: &[u8] = pfxlist;
            let mut use_pfxlen = pfxlen;

            if let Some(ae_flags) = &ae.flags {
                // Extract flags from the affix list.
                use_flags |= get_affix_flags(aff, ae_flags);

                if aff.needaffix != 0
                    && flag_in_afflist(aff.flag_type, ae_flags, aff.needaffix)
                {
                    need_affix = true;
                }

                // When there is a CIRCUMFIX flag the other affix must also
                // have it and the word is not added with only one affix.
                if aff.circumfix != 0
                    && flag_in_afflist(aff.flag_type, ae_flags, aff.circumfix)
                {
                    use_condit |= CONDIT_CFIX;
                    if (condit & CONDIT_CFIX) == 0 {
                        need_affix = true;
                    }
                }

                if aff.pfxpostpone || !spin.compflags.is_empty() {
                    // Prefix IDs from the affix flags, merged with the
                    // caller's. The same ID is not added twice.
                    owned = if aff.pfxpostpone {
                        get_pfxlist(aff, ae_flags)
                    } else {
                        Vec::new()
                    };
                    for &id in &pfxlist[..pfxlen] {
                        if !owned.contains(&id) {
                            owned.push(id);
                        }
                    }
                    use_pfxlen = owned.len();

                    // Compound IDs are concatenated after the prefix IDs.
                    if !spin.compflags.is_empty() {
                        owned.extend(get_compflags(aff, ae_flags));
                    }
                    for &id in &pfxlist[pfxlen..] {
                        if !owned[use_pfxlen..].contains(&id) {
                            owned.push(id);
                        }
                    }
                    use_pfxlist = &owned;
                }
            }

            // Obey a COMPOUNDFORBIDFLAG of the affix: don't use the
            // compound flags.
            if ae.compforbid {
                use_pfxlist = &use_pfxlist[..use_pfxlen];
            }

            // When there are postponed prefixes...
            if !spin.prefix.is_empty() {
                // ... mark that an affix was used.
                use_flags |= WF_HAS_AFF;

                // ... don't use a prefix list if combining affixes is not
                // allowed, but do keep the compound flags after them.
                if !ah.combine {
                    use_pfxlist = &use_pfxlist[use_pfxlen.min(use_pfxlist.len())..];
                }
            }

            // When compounding is supported and there is no
            // COMPOUNDPERMITFLAG, forbid compounding on the side where the
            // affix is applied.
            if !spin.compflags.is_empty() && !ae.comppermit {
                if xht.is_some() {
                    use_flags |= WF_NOCOMPAFT;
                } else {
                    use_flags |= WF_NOCOMPBEF;
                }
            }

            // Store the modified word.
            let region = spin.region;
            spin.store_word(&newword, use_flags, region, use_pfxlist, need_affix)?;

            // When a prefix or a first suffix was added and the affix has
            // flags, a(nother) suffix may be added. RECURSIVE!
            if (condit & CONDIT_SUF) != 0 {
                if let Some(ae_flags) = ae.flags.clone() {
                    let rec_condit = if xht.is_none() {
                        use_condit
                    } else {
                        use_condit & !CONDIT_SUF
                    };
                    store_aff_word(
                        spin,
                        &newword,
                        &ae_flags,
                        aff,
                        &aff.suffixes,
                        xht,
                        rec_condit,
                        use_flags,
                        use_pfxlist,
                        pfxlen,
                    )?;
                }
            }

            // When a suffix was added and combining is allowed, also try
            // adding a prefix, both for the word flags and for the affix
            // flags. RECURSIVE!
            if let Some(pref) = xht {
                if ah.combine {
                    store_aff_word(
                        spin,
                        &newword,
                        afflist,
                        aff,
                        pref,
                        None,
                        use_condit,
                        use_flags,
                        use_pfxlist,
                        pfxlen,
                    )?;
                    if let Some(ae_flags) = ae.flags.clone() {
                        store_aff_word(
                            spin,
                            &newword,
                            &ae_flags,
                            aff,
                            pref,
                            None,
                            use_condit,
                            use_flags,
                            use_pfxlist,
                            pfxlen,
                        )?;
                    }
                }
            }
        }
    }

    Ok(())
}

/// 先頭から `n` 文字を読み飛ばした残りを返します。
fn skip_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[i..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use tempfile::{tempdir, TempDir};

    use crate::affix;
    use crate::builder::SpellInfo;
    use crate::CancelToken;

    /// .aff/.dic を書き込んで読み込み、構築済みの SpellInfo を返します。
    fn build(dir: &TempDir, aff: &str, dic: &str) -> SpellInfo {
        let base: PathBuf = dir.path().join("t");
        fs::write(base.with_extension("aff"), aff).unwrap();
        fs::write(base.with_extension("dic"), dic).unwrap();

        let mut spin = SpellInfo::new(CancelToken::new());
        spin.region = 1;
        spin.region_count = 1;
        let aff = affix::read_aff(&mut spin, &base.with_extension("aff")).unwrap();
        spin.read_dic(&base.with_extension("dic"), &aff).unwrap();
        spin
    }

    #[test]
    fn suffix_and_prefix_cross_product() {
        let dir = tempdir().unwrap();
        let spin = build(
            &dir,
            "SET UTF-8\n\
             SFX S Y 1\n\
             SFX S 0 ing .\n\
             PFX P Y 1\n\
             PFX P 0 re .\n",
            "1\nwalk/SP\n",
        );

        for word in ["walk", "walking", "rewalk", "rewalking"] {
            assert!(!spin.fold.lookup(word.as_bytes()).is_empty(), "{word}");
        }
        assert!(spin.fold.lookup(b"ingwalk").is_empty());
    }

    #[test]
    fn non_combining_prefix_stays_out_of_suffixed_forms() {
        let dir = tempdir().unwrap();
        let spin = build(
            &dir,
            "SET UTF-8\n\
             SFX S Y 1\n\
             SFX S 0 ing .\n\
             PFX P N 1\n\
             PFX P 0 re .\n",
            "1\nwalk/SP\n",
        );

        assert!(!spin.fold.lookup(b"rewalk").is_empty());
        assert!(!spin.fold.lookup(b"walking").is_empty());
        assert!(spin.fold.lookup(b"rewalking").is_empty());
    }

    #[test]
    fn condition_is_checked_against_the_base_word() {
        let dir = tempdir().unwrap();
        let spin = build(
            &dir,
            "SET UTF-8\n\
             SFX S Y 2\n\
             SFX S y ies [^aeiou]y\n\
             SFX S 0 s [aeiou]y\n",
            "2\nberry/S\nplay/S\n",
        );

        assert!(!spin.fold.lookup(b"berries").is_empty());
        assert!(!spin.fold.lookup(b"plays").is_empty());
        assert!(spin.fold.lookup(b"berrys").is_empty());
        assert!(spin.fold.lookup(b"plaies").is_empty());
    }

    #[test]
    fn needaffix_base_is_not_a_word() {
        let dir = tempdir().unwrap();
        let spin = build(
            &dir,
            "SET UTF-8\n\
             NEEDAFFIX X\n\
             SFX S Y 1\n\
             SFX S 0 ed .\n",
            "1\ntalk/SX\n",
        );

        // The bare stem gets no terminal, only the derived form does.
        assert!(spin.fold.lookup(b"talk").is_empty());
        assert!(!spin.fold.lookup(b"talked").is_empty());
    }

    #[test]
    fn chop_must_be_shorter_than_the_word() {
        let dir = tempdir().unwrap();
        let spin = build(
            &dir,
            "SET UTF-8\n\
             SFX S Y 1\n\
             SFX S abc xyz .\n",
            "1\nabc/S\n",
        );

        // A chop as long as the whole word never applies.
        assert!(spin.fold.lookup(b"xyz").is_empty());
        assert!(!spin.fold.lookup(b"abc").is_empty());
    }
}
