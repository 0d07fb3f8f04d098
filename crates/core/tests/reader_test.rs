//! Document reader tests: xref variants, rebuild-by-scan and the object
//! store.

mod common;

use bytes::Bytes;
use common::{PdfBuilder, add_basic_document, simple_pdf};
use vellum_core::codec::FilterRegistry;
use vellum_core::document::{MAX_OBJECT_NUMBER, PdfSource, XrefEntry, XrefResolver};
use vellum_core::{PdfError, PdfReader, ReaderOptions};

fn open(data: Vec<u8>) -> PdfReader {
    PdfReader::from_bytes(data, ReaderOptions::default()).unwrap()
}

fn content_of_first_page(reader: &PdfReader) -> Vec<u8> {
    let page = reader.get_page(0).unwrap();
    let contents = reader.resolve(page.contents().unwrap()).unwrap();
    reader.decode_stream(contents.as_stream().unwrap()).unwrap()
}

#[test]
fn test_simple_document() {
    let reader = open(simple_pdf());
    assert!(!reader.is_rebuilt());
    assert!(!reader.is_encrypted());
    assert!(!reader.uses_xref_stream());
    assert_eq!(reader.version(), "1.4");
    assert_eq!(reader.object_count(), 5);
    assert_eq!(reader.header_offset(), 0);

    let catalog = reader.catalog().unwrap();
    assert_eq!(catalog.as_dict().unwrap().type_name(), Some("Catalog"));
    assert_eq!(reader.page_count().unwrap(), 1);
    assert_eq!(content_of_first_page(&reader), b"BT /F1 12 Tf (Hi) Tj ET");
    assert!(reader.get(42).unwrap().is_none());
}

#[test]
fn test_catalog_version_overrides_header() {
    let mut b = PdfBuilder::new("1.4");
    b.object(1, "<< /Type /Catalog /Pages 2 0 R /Version /1.7 >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>");
    b.xref_table(" /Root 1 0 R");
    let reader = open(b.finish());
    assert_eq!(reader.version(), "1.7");
    assert_eq!(reader.page_count().unwrap(), 0);
}

#[test]
fn test_corrupted_startxref_rebuilds() {
    let mut data = simple_pdf();
    let pos = data
        .windows(10)
        .rposition(|w| w == b"startxref\n")
        .unwrap();
    data.truncate(pos);
    data.extend_from_slice(b"startxref\n99999999\n%%EOF\n");

    let reader = open(data);
    assert!(reader.is_rebuilt());
    assert_eq!(reader.page_count().unwrap(), 1);
    assert_eq!(content_of_first_page(&reader), b"BT /F1 12 Tf (Hi) Tj ET");
}

#[test]
fn test_missing_startxref_rebuilds() {
    let mut b = PdfBuilder::new("1.3");
    add_basic_document(&mut b);
    b.raw(b"trailer\n<< /Root 1 0 R >>\n");
    let reader = open(b.finish());
    assert!(reader.is_rebuilt());
    assert_eq!(
        reader.xref_entry(3),
        Some(XrefEntry::Offset {
            offset: reader_offset(&reader, 3),
            generation: 0
        })
    );
}

fn reader_offset(reader: &PdfReader, num: u32) -> usize {
    let needle = format!("{} 0 obj", num);
    reader
        .source_bytes()
        .windows(needle.len())
        .position(|w| w == needle.as_bytes())
        .unwrap()
}

#[test]
fn test_leading_junk_before_header() {
    let mut b = PdfBuilder::with_junk(b"GARBAGE-BYTES\n", "1.5");
    add_basic_document(&mut b);
    b.xref_table(" /Root 1 0 R");
    let reader = open(b.finish());
    assert_eq!(reader.header_offset(), 14);
    assert!(!reader.is_rebuilt());
    assert_eq!(reader.version(), "1.5");
    assert_eq!(content_of_first_page(&reader), b"BT /F1 12 Tf (Hi) Tj ET");
}

#[test]
fn test_prev_loop_detected_and_rebuilt() {
    let mut b = PdfBuilder::new("1.4");
    add_basic_document(&mut b);
    let start = b.pos();
    b.xref_table(&format!(" /Root 1 0 R /Prev {}", start));
    let data = b.finish();

    let source = PdfSource::new(Bytes::from(data.clone()));
    let filters = FilterRegistry::default();
    let err = XrefResolver::new(&source, &filters).resolve(start).unwrap_err();
    assert!(matches!(err, PdfError::XRefLoop(off) if off == start));

    let reader = open(data);
    assert!(reader.is_rebuilt());
    assert_eq!(reader.page_count().unwrap(), 1);
}

#[test]
fn test_newer_section_frees_object() {
    let mut b = PdfBuilder::new("1.4");
    add_basic_document(&mut b);
    b.object(5, "(obsolete)");
    let first = b.xref_table(" /Root 1 0 R");
    let second = b.pos();
    b.raw(
        format!(
            "xref\n0 1\n0000000000 65535 f\r\n5 1\n0000000000 00001 f\r\n\
             trailer\n<< /Size 6 /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            first, second
        )
        .as_bytes(),
    );
    let reader = open(b.finish());
    assert!(!reader.is_rebuilt());
    assert_eq!(reader.xref_entry(5), Some(XrefEntry::Free { next: 0, generation: 1 }));
    assert!(reader.get(5).unwrap().is_none());
    assert!(reader.get(4).unwrap().is_some());
}

#[test]
fn test_subsection_starting_at_one_is_shifted() {
    let mut b = PdfBuilder::new("1.4");
    add_basic_document(&mut b);
    let start = b.pos();
    let mut xref = String::from("xref\n1 5\n0000000000 65535 f\r\n");
    for num in 1..=4 {
        xref.push_str(&format!("{:010} 00000 n\r\n", b.offset_of(num)));
    }
    xref.push_str(&format!(
        "trailer\n<< /Size 5 /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        start
    ));
    b.raw(xref.as_bytes());

    let reader = open(b.finish());
    assert!(!reader.is_rebuilt());
    assert_eq!(
        reader.xref_entry(1),
        Some(XrefEntry::Offset {
            offset: b.offset_of(1),
            generation: 0
        })
    );
    assert_eq!(reader.page_count().unwrap(), 1);
}

#[test]
fn test_hybrid_xref_stream_wins() {
    let mut b = PdfBuilder::new("1.5");
    add_basic_document(&mut b);
    let stm = b.xref_stream(5, "");
    // The classic lines claim object 4 is free; the stream knows better.
    b.xref_table_with(&format!(" /Root 1 0 R /XRefStm {}", stm), |n| n != 4);

    let reader = open(b.finish());
    assert!(!reader.is_rebuilt());
    assert!(!reader.uses_xref_stream());
    assert!(matches!(reader.xref_entry(4), Some(XrefEntry::Offset { .. })));
    assert_eq!(content_of_first_page(&reader), b"BT /F1 12 Tf (Hi) Tj ET");
}

#[test]
fn test_object_stream_members() {
    let mut b = PdfBuilder::new("1.5");
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object_stream(
            5,
            &[
                (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
                (3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>"),
            ],
        )
        .stream(4, "", b"q Q", None);
    b.xref_stream(6, " /Root 1 0 R");

    for partial in [false, true] {
        let reader =
            PdfReader::from_bytes(b.finish(), ReaderOptions::default().with_partial(partial))
                .unwrap();
        assert!(reader.uses_xref_stream());
        assert_eq!(
            reader.xref_entry(3),
            Some(XrefEntry::InStream {
                stream: 5,
                index: 1
            })
        );
        let pages = reader.get(2).unwrap().unwrap();
        assert_eq!(pages.as_dict().unwrap().type_name(), Some("Pages"));
        assert_eq!(reader.page_count().unwrap(), 1);
        assert_eq!(content_of_first_page(&reader), b"q Q");
    }
}

#[test]
fn test_object_streams_found_by_rebuild() {
    let mut b = PdfBuilder::new("1.5");
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>").object_stream(
        5,
        &[
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>"),
            (3, "<< /Type /Page /Parent 2 0 R >>"),
        ],
    );
    b.raw(b"trailer\n<< /Root 1 0 R >>\nstartxref\n0\n%%EOF\n");

    let reader = open(b.finish());
    assert!(reader.is_rebuilt());
    assert_eq!(
        reader.xref_entry(2),
        Some(XrefEntry::InStream {
            stream: 5,
            index: 0
        })
    );
    assert_eq!(reader.page_count().unwrap(), 1);
}

#[test]
fn test_wrong_stream_length_recomputed() {
    let mut b = PdfBuilder::new("1.4");
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(3, "<< /Type /Page /Parent 2 0 R /Contents 4 0 R >>")
        .stream(4, "", b"0 0 m 10 10 l S", Some("3"));
    b.xref_table(" /Root 1 0 R");

    let reader = open(b.finish());
    let obj = reader.get(4).unwrap().unwrap();
    let stream = obj.as_stream().unwrap();
    assert_eq!(&stream.raw()[..], b"0 0 m 10 10 l S");
    assert_eq!(stream.dict.get_i64("Length"), Some(15));
}

#[test]
fn test_indirect_and_self_referencing_length() {
    let mut b = PdfBuilder::new("1.4");
    b.object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .stream(3, "", b"abcdef", Some("5 0 R"))
        .stream(4, "", b"ghijkl", Some("4 0 R"))
        .object(5, "6");
    b.xref_table(" /Root 1 0 R");

    let reader = open(b.finish());
    let three = reader.get(3).unwrap().unwrap();
    assert_eq!(&three.as_stream().unwrap().raw()[..], b"abcdef");
    let four = reader.get(4).unwrap().unwrap();
    assert_eq!(&four.as_stream().unwrap().raw()[..], b"ghijkl");
}

#[test]
fn test_missing_root_is_error() {
    let mut b = PdfBuilder::new("1.4");
    b.object(1, "<< /Foo 1 >>");
    b.xref_table("");
    let err = PdfReader::from_bytes(b.finish(), ReaderOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, PdfError::MissingRoot));
}

#[test]
fn test_missing_root_recovered_from_catalog() {
    let mut b = PdfBuilder::new("1.4");
    add_basic_document(&mut b);
    b.xref_table("");
    let reader = open(b.finish());
    assert!(reader.is_rebuilt());
    assert_eq!(reader.page_count().unwrap(), 1);
}

#[test]
fn test_partial_get_and_release() {
    let reader =
        PdfReader::from_bytes(simple_pdf(), ReaderOptions::default().with_partial(true)).unwrap();
    assert!(reader.is_partial());

    let first = reader.get(4).unwrap().unwrap();
    assert!(reader.release(4));
    assert!(!reader.release(4));
    let second = reader.get(4).unwrap().unwrap();
    assert_eq!(first, second);

    assert!(reader.release_last());
    assert!(!reader.release_last());
}

#[test]
fn test_release_is_noop_when_not_partial() {
    let reader = open(simple_pdf());
    reader.get(4).unwrap();
    assert!(!reader.release(4));
    assert!(!reader.release_last());
}

fn pdf_with_orphan() -> Vec<u8> {
    let mut b = PdfBuilder::new("1.4");
    add_basic_document(&mut b);
    b.object(9, "(nobody points here)");
    b.xref_table(" /Root 1 0 R");
    b.finish()
}

#[test]
fn test_remove_unused_objects() {
    let mut reader = open(pdf_with_orphan());
    assert!(reader.get(9).unwrap().is_some());

    assert_eq!(reader.remove_unused_objects().unwrap(), 1);
    assert!(reader.get(9).unwrap().is_none());
    assert!(reader.xref_entry(9).unwrap().is_free());
    assert_eq!(reader.page_count().unwrap(), 1);
}

#[test]
fn test_duplicate_is_independent() {
    let reader = open(pdf_with_orphan());
    let mut copy = reader.duplicate();
    assert_eq!(copy.remove_unused_objects().unwrap(), 1);

    assert!(copy.get(9).unwrap().is_none());
    assert!(reader.get(9).unwrap().is_some());
    assert_eq!(reader.get(1).unwrap(), copy.get(1).unwrap());
}

#[test]
fn test_from_path() {
    let path = std::env::temp_dir().join(format!("vellum-reader-{}.pdf", std::process::id()));
    std::fs::write(&path, simple_pdf()).unwrap();
    let reader = PdfReader::from_path(&path, ReaderOptions::default()).unwrap();
    assert_eq!(reader.page_count().unwrap(), 1);
    drop(reader);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_not_a_pdf() {
    let err = PdfReader::from_bytes(b"hello world".to_vec(), ReaderOptions::default())
        .err()
        .unwrap();
    assert!(matches!(err, PdfError::NoValidXRef(_) | PdfError::MissingRoot));
}

fn xref_with_extra(b: &mut PdfBuilder, extra_subsection: &str, size: u64) {
    let start = b.pos();
    let mut xref = String::from("xref\n0 5\n0000000000 65535 f\r\n");
    for num in 1..=4 {
        xref.push_str(&format!("{:010} 00000 n\r\n", b.offset_of(num)));
    }
    xref.push_str(extra_subsection);
    xref.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        size, start
    ));
    b.raw(xref.as_bytes());
}

#[test]
fn test_huge_size_is_clamped_without_allocating() {
    let mut b = PdfBuilder::new("1.4");
    add_basic_document(&mut b);
    xref_with_extra(&mut b, "", 20_000_000);

    let reader = open(b.finish());
    assert!(!reader.is_rebuilt());
    assert_eq!(reader.object_count(), MAX_OBJECT_NUMBER as usize + 1);
    assert_eq!(reader.page_count().unwrap(), 1);
    assert!(reader.get(7_000_000).unwrap().is_none());
}

#[test]
fn test_out_of_range_subsection_is_ignored() {
    let mut b = PdfBuilder::new("1.4");
    add_basic_document(&mut b);
    xref_with_extra(&mut b, "4000000000 2\n0000000010 00000 n\r\n0000000010 00000 n\r\n", 5);

    let reader = open(b.finish());
    assert!(!reader.is_rebuilt());
    assert_eq!(reader.object_count(), 5);
    assert_eq!(reader.xref_entry(4_000_000_000), None);
    assert_eq!(reader.xref_entry(u32::MAX), None);
    assert_eq!(content_of_first_page(&reader), b"BT /F1 12 Tf (Hi) Tj ET");
}

#[test]
fn test_rebuild_ignores_out_of_range_object_numbers() {
    let mut b = PdfBuilder::new("1.4");
    add_basic_document(&mut b);
    b.raw(b"4000000000 0 obj\n<< /Junk true >>\nendobj\n");
    b.raw(b"trailer\n<< /Root 1 0 R >>\n");

    let reader = open(b.finish());
    assert!(reader.is_rebuilt());
    assert_eq!(reader.object_count(), 5);
    assert_eq!(reader.xref_entry(4_000_000_000), None);
    assert_eq!(reader.page_count().unwrap(), 1);
}

#[test]
fn test_undecodable_xref_stream_rebuilds() {
    let mut b = PdfBuilder::new("1.5");
    add_basic_document(&mut b);
    b.xref_stream(5, " /Root 1 0 R /Filter /NoSuchDecode");

    let reader = open(b.finish());
    assert!(reader.is_rebuilt());
    assert_eq!(reader.page_count().unwrap(), 1);
    assert_eq!(content_of_first_page(&reader), b"BT /F1 12 Tf (Hi) Tj ET");
}
