mod common;

use mediassist_backend::core::config::settings::ChunkingSettings;
use mediassist_backend::core::errors::RagError;
use mediassist_backend::rag::chunker::{chunk_pages, Chunker};
use mediassist_backend::rag::extractor::DocumentExtractor;
use mediassist_backend::rag::{ingest_directory, ChunkType};

use common::{line, write_centrifuge_manual, write_data_sheet, write_pdf, write_subset_font_manual};

#[test]
fn two_column_page_reads_left_column_first() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("centrifuge.pdf");
    write_centrifuge_manual(&path);

    let pages = DocumentExtractor::default().extract(&path).unwrap();
    assert_eq!(pages.len(), 3);
    assert!(pages.iter().all(|p| p.total_pages == 3));

    let page_two = &pages[1].text;
    let weight = page_two.find("| Weight | 62 kg |").expect("table rows");
    let prose = page_two.find("The centrifuge must stand").expect("right column");
    assert!(weight < prose, "left column must precede right column:\n{}", page_two);
    assert!(page_two.contains("| GMDN Code | 17489 |"));
    assert!(page_two.contains("bench with ten centimetres of free\nspace around the housing"));
}

#[test]
fn chapters_carry_forward_until_the_next_heading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("centrifuge.pdf");
    write_centrifuge_manual(&path);

    let pages = DocumentExtractor::default().extract(&path).unwrap();
    let chapters: Vec<Option<&str>> = pages.iter().map(|p| p.chapter.as_deref()).collect();
    assert_eq!(
        chapters,
        vec![
            Some("Chapter 1 Introduction"),
            Some("Chapter 1 Introduction"),
            Some("Chapter 2 Maintenance"),
        ]
    );
}

#[test]
fn table_becomes_one_isolated_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("centrifuge.pdf");
    write_centrifuge_manual(&path);

    let pages = DocumentExtractor::default().extract(&path).unwrap();
    let chunks = Chunker::from_settings(&ChunkingSettings::default())
        .unwrap()
        .chunk(&pages);

    let tables: Vec<_> = chunks
        .iter()
        .filter(|c| c.chunk_type == ChunkType::Table)
        .collect();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].page, 2);
    assert!(tables[0].text.contains("| GMDN Code | 17489 |"));
    assert!(tables[0].text.contains("| Weight | 62 kg |"));
    assert!(tables[0].text.starts_with("[Chapter 1 Introduction"));

    assert!(chunks
        .iter()
        .filter(|c| c.chunk_type == ChunkType::Structured)
        .all(|c| !c.text.contains("17489")));
    assert!(chunks
        .windows(2)
        .all(|pair| pair[0].chunk_id < pair[1].chunk_id));
    assert!(chunks.iter().all(|c| c.char_count == c.text.chars().count()));
}

#[test]
fn subset_fonts_decode_through_their_maps_in_column_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("incubator.pdf");
    write_subset_font_manual(&path);

    let pages = DocumentExtractor::default().extract(&path).unwrap();
    assert_eq!(pages.len(), 1);
    let text = &pages[0].text;

    assert!(text.starts_with("# Chapter 3 Operation"), "{}", text);
    assert_eq!(pages[0].chapter.as_deref(), Some("Chapter 3 Operation"));
    assert!(text.contains(
        "Switch on the incubator at the rear\npanel and let the chamber warm up\nfor at least thirty minutes first."
    ));
    assert!(text.contains(
        "Load the culture flasks only after\nthe display shows the set point and\nthe door alarm has been tested."
    ));
    let left = text.find("for at least thirty").unwrap();
    let right = text.find("Load the culture").unwrap();
    assert!(left < right, "left column must precede right column:\n{}", text);
}

#[test]
fn value_column_right_of_the_middle_stays_in_its_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("datasheet.pdf");
    write_data_sheet(&path);

    let pages = DocumentExtractor::default().extract(&path).unwrap();
    assert!(pages[0].text.contains("| GMDN Code | 17489 |"), "{}", pages[0].text);

    let chunks = Chunker::from_settings(&ChunkingSettings::default())
        .unwrap()
        .chunk(&pages);
    let tables: Vec<_> = chunks
        .iter()
        .filter(|c| c.chunk_type == ChunkType::Table)
        .collect();
    assert_eq!(tables.len(), 1);
    assert!(tables[0].text.starts_with("[Chapter 4 Technical Data]"));
    assert!(tables[0].text.contains("| Rated voltage | 230 V |"));
    assert!(tables[0].text.contains("| Max speed | 4000 rpm |"));

    let prose = chunks
        .iter()
        .position(|c| c.text.contains("standard mains version"))
        .unwrap();
    let table = chunks
        .iter()
        .position(|c| c.chunk_type == ChunkType::Table)
        .unwrap();
    assert!(prose < table);
}

#[test]
fn overlap_not_below_chunk_size_is_rejected() {
    let result = chunk_pages(&[], 100, 150);
    assert!(matches!(result, Err(RagError::Config(_))));
}

#[test]
fn single_page_and_metadata_lookups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("centrifuge.pdf");
    write_centrifuge_manual(&path);
    let extractor = DocumentExtractor::default();

    let text = extractor.page_text(&path, 3).unwrap();
    assert!(text.starts_with("# Chapter 2 Maintenance"));
    assert!(matches!(
        extractor.page_text(&path, 4),
        Err(RagError::InvalidInput(_))
    ));

    let metadata = extractor.metadata(&path).unwrap();
    assert_eq!(metadata.file_name, "centrifuge.pdf");
    assert_eq!(metadata.total_pages, 3);
    assert_eq!(metadata.title.as_deref(), Some("C-400 Centrifuge"));
    assert_eq!(metadata.sha256.len(), 64);
}

#[tokio::test]
async fn ingestion_skips_broken_files_and_short_pages() {
    let data = tempfile::tempdir().unwrap();
    let state = common::state(data.path(), None).await;
    let docs = &state.paths.documents_dir;

    write_centrifuge_manual(&docs.join("centrifuge.pdf"));
    write_pdf(
        &docs.join("cover.pdf"),
        "Cover",
        &[vec![line(72, 700, 24, "Pipette P-20")]],
    );
    std::fs::write(docs.join("broken.pdf"), b"%PDF-1.4 truncated").unwrap();

    let report = ingest_directory(docs, &state.extractor, &state.chunker, &state.index)
        .await
        .unwrap();

    assert_eq!(report.files_found, 3);
    assert_eq!(report.files_processed, 2);
    assert_eq!(report.files_failed, 1);
    assert_eq!(report.failures[0].file, "broken.pdf");
    assert_eq!(report.pages_extracted, 3);
    assert_eq!(report.entries_indexed, report.chunks_created);
    assert_eq!(report.stats.as_ref().unwrap().table_chunks, 1);
    assert!(state.index.has_data().await.unwrap());

    let again = ingest_directory(docs, &state.extractor, &state.chunker, &state.index)
        .await
        .unwrap();
    assert_eq!(again.entries_indexed, report.entries_indexed);

    state.shutdown().await;
}
