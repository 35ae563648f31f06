//! Replaying user decisions onto a re-parsed book

mod common;

use common::*;
use pretty_assertions::assert_eq;
use scriptura_core::character::AMBIGUOUS_CHARACTER;
use scriptura_core::{
    Block, BookScript, MultiBlockQuote, ReferenceLanguageSettings, ReplayOptions, ReplayReport,
};

/// A previous parse in which verse 1 was split between narrator and Jesus
fn split_source() -> BookScript {
    let mut head = narrator(1, 1, &format!("{}He said, ", v("1")));
    head.split_id = Some(0);
    let mut tail = quote(1, 1, "Jesus", "“Come.” ", MultiBlockQuote::None);
    tail.split_id = Some(0);
    tail.user_confirmed = true;
    book(vec![head, tail, narrator(1, 2, &format!("{}Then they went.", v("2")))])
}

fn split_ids(book: &BookScript) -> Vec<Option<u32>> {
    book.blocks().iter().map(|b| b.split_id).collect()
}

#[test]
fn split_already_present_only_gets_ids() {
    let source = split_source();
    let mut target = book(
        source
            .blocks()
            .iter()
            .map(|b| {
                let mut fresh = b.clone();
                fresh.split_id = None;
                fresh.set_character_id(NARRATOR);
                fresh.user_confirmed = false;
                fresh
            })
            .collect(),
    );
    let report = target.apply_user_decisions(&source, None).unwrap();
    assert_eq!(report.splits_applied, 1);
    assert_eq!(split_ids(&target), vec![Some(0), Some(0), None]);
    assert_eq!(target.blocks()[1].character_id(), "Jesus");
}

#[test]
fn split_is_replayed_onto_an_equal_combined_block() {
    let source = split_source();
    let mut target = book(vec![
        narrator(1, 1, &format!("{}He said, “Come.” ", v("1"))),
        narrator(1, 2, &format!("{}Then they went.", v("2"))),
    ]);
    let report = target.apply_user_decisions(&source, None).unwrap();

    assert_eq!(report.splits_applied, 1);
    assert_eq!(target.len(), 3);
    assert_eq!(target.blocks()[0].get_text(false, false), "He said, ");
    assert_eq!(target.blocks()[1].get_text(false, false), "“Come.” ");
    assert_eq!(target.blocks()[1].character_id(), "Jesus");
    assert!(target.blocks()[1].user_confirmed);
    assert_eq!(split_ids(&target), vec![Some(0), Some(0), None]);
}

#[test]
fn split_is_found_inside_an_unchunked_block() {
    let source = split_source();
    let mut target = book(vec![narrator(
        1,
        1,
        &format!("{}He said, “Come.” {}Then they went.", v("1"), v("2")),
    )]);
    let report = target.apply_user_decisions(&source, None).unwrap();

    assert_eq!(report.splits_applied, 1);
    let texts: Vec<String> = target.blocks().iter().map(|b| b.get_text(true, false)).collect();
    assert_eq!(
        texts,
        vec![
            format!("{}He said, ", v("1")),
            "“Come.” ".to_string(),
            format!("{}Then they went.", v("2")),
        ]
    );
    assert_eq!(split_ids(&target), vec![Some(0), Some(0), None]);
    assert_eq!(target.blocks()[2].initial_start_verse_number(), 2);
}

#[test]
fn split_after_a_sound_cue_is_replayed() {
    let mut head = narrator(1, 1, &format!("{}Hello {{F8 Music--Starts @ v1}}world ", v("1")));
    head.split_id = Some(0);
    let mut tail = quote(1, 1, "Jesus", "wide ", MultiBlockQuote::None);
    tail.split_id = Some(0);
    let source = book(vec![head, tail]);

    let mut target = book(vec![narrator(
        1,
        1,
        &format!("{}Hello {{F8 Music--Starts @ v1}}world wide ", v("1")),
    )]);
    let report = target.apply_user_decisions(&source, None).unwrap();

    assert_eq!(report.splits_applied, 1);
    assert_eq!(target.len(), 2);
    assert_eq!(target.blocks()[0].get_text(false, false), "Hello world ");
    assert_eq!(target.blocks()[1].get_text(false, false), "wide ");
    assert_eq!(target.blocks()[1].character_id(), "Jesus");
}

#[test]
fn unchunked_matching_can_be_disabled() {
    let source = split_source();
    let mut target = book(vec![narrator(
        1,
        1,
        &format!("{}He said, “Come.” {}Then they went.", v("1"), v("2")),
    )]);
    let options = ReplayOptions {
        match_unchunked_blocks: false,
        ..ReplayOptions::default()
    };
    let report = target.apply_user_decisions_with(&source, None, &options).unwrap();
    assert_eq!(report.splits_unapplied, 1);
    assert_eq!(target.len(), 1);
    assert_eq!(target.unapplied_splits().len(), 1);
}

#[test]
fn split_lost_to_revised_text_is_kept_as_unapplied() {
    let source = split_source();
    let mut target = book(vec![
        narrator(1, 1, &format!("{}He told them, “Come here.” ", v("1"))),
        narrator(1, 2, &format!("{}Then they went.", v("2"))),
    ]);
    let report = target.apply_user_decisions(&source, None).unwrap();
    assert_eq!(
        report,
        ReplayReport {
            splits_unapplied: 1,
            ..ReplayReport::default()
        }
    );
    assert_eq!(target.len(), 2);
    assert_eq!(target.unapplied_splits()[0].len(), 2);

    // A later replay tries the pending group again
    let mut next = book(vec![
        narrator(1, 1, &format!("{}He said, “Come.” ", v("1"))),
        narrator(1, 2, &format!("{}Then they went.", v("2"))),
    ]);
    let report = next.apply_user_decisions(&target, None).unwrap();
    assert_eq!(report.splits_applied, 1);
    assert_eq!(next.len(), 3);
}

// ============================================================================
// Reference alignments
// ============================================================================

fn aligned(block: Block, reference: Block) -> Block {
    let mut block = block;
    block.set_matched_reference_block(reference).unwrap();
    block
}

#[test]
fn alignments_are_restored_for_equal_verse_spans() {
    let source = book(vec![
        aligned(
            narrator(1, 1, &format!("{}Il dit ", v("1"))),
            narrator(1, 1, &format!("{}He said", v("1"))),
        ),
        narrator(1, 2, &format!("{}Ensuite", v("2"))),
    ]);
    let mut target = book(vec![
        narrator(1, 1, &format!("{}Il dit ", v("1"))),
        narrator(1, 2, &format!("{}Ensuite", v("2"))),
    ]);
    let language = ReferenceLanguageSettings::default();
    let report = target.apply_user_decisions(&source, Some(&language)).unwrap();
    assert_eq!(report.alignments_restored, 1);
    assert_eq!(
        target.blocks()[0].reference_block_at(0).unwrap().get_text(false, false),
        "He said"
    );
    assert!(!target.blocks()[1].matches_reference_text());
}

#[test]
fn alignments_are_not_restored_without_a_reference_language() {
    let source = book(vec![aligned(
        narrator(1, 1, &format!("{}Il dit", v("1"))),
        narrator(1, 1, &format!("{}He said", v("1"))),
    )]);
    let mut target = book(vec![narrator(1, 1, &format!("{}Il dit", v("1")))]);
    let report = target.apply_user_decisions(&source, None).unwrap();
    assert_eq!(report.alignments_restored, 0);
    assert!(!target.blocks()[0].matches_reference_text());
}

#[test]
fn alignment_split_is_recreated_when_new_parse_lacks_it() {
    let source = book(vec![
        aligned(
            narrator(1, 1, &format!("{}Il dit : ", v("1"))),
            narrator(1, 1, &format!("{}He said,", v("1"))),
        ),
        aligned(
            quote(1, 1, "Jesus", "« Viens. »", MultiBlockQuote::None),
            quote(1, 1, "Jesus", "“Come.”", MultiBlockQuote::None),
        ),
    ]);
    let mut target = book(vec![narrator(1, 1, &format!("{}Il dit : « Viens. »", v("1")))]);
    let language = ReferenceLanguageSettings::default();
    let report = target.apply_user_decisions(&source, Some(&language)).unwrap();

    assert_eq!(report.alignments_restored, 1);
    assert_eq!(target.len(), 2);
    assert_eq!(target.blocks()[1].get_text(false, false), "« Viens. »");
    assert_eq!(
        target.blocks()[1].reference_block_at(0).unwrap().get_text(false, false),
        "“Come.”"
    );
}

#[test]
fn backing_alignment_is_dropped_when_language_has_none() {
    let backed = aligned(
        narrator(1, 1, &format!("{}He said", v("1"))),
        narrator(1, 1, &format!("{}Er sagte", v("1"))),
    );
    let source = book(vec![aligned(narrator(1, 1, &format!("{}Il dit", v("1"))), backed)]);

    let mut without = book(vec![narrator(1, 1, &format!("{}Il dit", v("1")))]);
    let language = ReferenceLanguageSettings::default();
    without.apply_user_decisions(&source, Some(&language)).unwrap();
    assert_eq!(without.blocks()[0].reference_depth(), 1);

    let mut with = book(vec![narrator(1, 1, &format!("{}Il dit", v("1")))]);
    let language = ReferenceLanguageSettings::new("he said.", " ").with_backing(ReferenceLanguageSettings::default());
    with.apply_user_decisions(&source, Some(&language)).unwrap();
    assert_eq!(with.blocks()[0].reference_depth(), 2);
}

// ============================================================================
// Confirmations and quote chains
// ============================================================================

#[test]
fn confirmed_assignments_are_copied_by_content() {
    let mut confirmed = quote(1, 2, "Peter", &format!("{}“Lord, save us!”", v("2")), MultiBlockQuote::None);
    confirmed.user_confirmed = true;
    confirmed.delivery = Some("afraid".to_string());
    let source = book(vec![narrator(1, 1, &format!("{}A storm arose.", v("1"))), confirmed]);

    let mut target = book(vec![
        narrator(1, 1, &format!("{}A storm arose.", v("1"))),
        quote(1, 2, UNKNOWN, &format!("{}“Lord, save us!”", v("2")), MultiBlockQuote::None),
    ]);
    let report = target.apply_user_decisions(&source, None).unwrap();
    assert_eq!(report.confirmations_applied, 1);
    assert_eq!(target.blocks()[1].character_id(), "Peter");
    assert_eq!(target.blocks()[1].delivery.as_deref(), Some("afraid"));
    assert!(target.blocks()[1].user_confirmed);
}

#[test]
fn confirmation_is_not_copied_when_paragraph_start_differs() {
    let mut confirmed = quote(1, 2, "Peter", &format!("{}“Save us!”", v("2")), MultiBlockQuote::None);
    confirmed.user_confirmed = true;
    confirmed.is_paragraph_start = true;
    let source = book(vec![confirmed]);

    let mut target = book(vec![quote(1, 2, UNKNOWN, &format!("{}“Save us!”", v("2")), MultiBlockQuote::None)]);
    let report = target.apply_user_decisions(&source, None).unwrap();
    assert_eq!(report.confirmations_applied, 0);
    assert_eq!(target.blocks()[0].character_id(), UNKNOWN);
}

const UNKNOWN: &str = scriptura_core::character::UNKNOWN_CHARACTER;

#[test]
fn disagreeing_chain_becomes_ambiguous() {
    let source = book(vec![]);
    let mut first = quote(1, 1, "Peter", &format!("{}“We", v("1")), MultiBlockQuote::Start);
    first.user_confirmed = true;
    first.delivery = Some("bold".to_string());
    let mut target = book(vec![
        first,
        quote(1, 1, "John", "have left all.”", MultiBlockQuote::Continuation),
    ]);
    let report = target.apply_user_decisions(&source, None).unwrap();
    assert_eq!(report.chains_reconciled, 1);
    for block in target.blocks() {
        assert_eq!(block.character_id(), AMBIGUOUS_CHARACTER);
        assert_eq!(block.delivery, None);
        assert!(!block.user_confirmed);
    }
}

#[test]
fn chain_with_unknown_members_is_unified() {
    let source = book(vec![]);
    let mut target = book(vec![
        quote(1, 1, UNKNOWN, &format!("{}“We", v("1")), MultiBlockQuote::Start),
        quote(1, 1, "Peter", "have left", MultiBlockQuote::Continuation),
        quote(1, 1, AMBIGUOUS_CHARACTER, "all.”", MultiBlockQuote::Continuation),
    ]);
    let report = target.apply_user_decisions(&source, None).unwrap();
    assert_eq!(report.chains_reconciled, 1);
    assert!(target.blocks().iter().all(|b| b.character_id() == "Peter"));
}

#[test]
fn degenerate_pending_groups_are_dropped_with_logging_enabled() {
    let mut source = serde_json::to_value(split_source()).unwrap();
    source["unappliedSplits"] = serde_json::json!([[], [serde_json::to_value(narrator(1, 1, "x")).unwrap()]]);
    let source: BookScript = serde_json::from_value(source).unwrap();
    assert_eq!(source.unapplied_splits().len(), 2);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .finish();
    let mut target = book(source.blocks().to_vec());
    let report = tracing::subscriber::with_default(subscriber, || {
        target.apply_user_decisions(&source, None).unwrap()
    });

    assert_eq!(report.splits_applied, 1);
    assert_eq!(report.splits_unapplied, 0);
    assert!(target.unapplied_splits().is_empty());
}
