extern crate gffkit;
#[macro_use]
extern crate matches;

use gffkit::{AnnotationModel, CdsGrouping, Error, FeatureRole, GffReader, GffWriter,
             ParseMode, Record, SortOrder, Strand};


static MIXED_GFF: &'static str = include_str!("data/mixed.gff3");
static MIXED_EXPECTED_GFF: &'static str = include_str!("data/mixed.expected.gff3");


fn read(raw: &str) -> Vec<Record> {
    GffReader::from_reader(raw.as_bytes()).read_records().expect("records")
}

fn write(model: &AnnotationModel, sort_order: SortOrder) -> String {
    let mut writer = GffWriter::from_memory();
    let _ = writer.sort_order(sort_order).write_model(model).expect("a written model");
    String::from_utf8(writer.into_inner().expect("a buffer")).expect("utf-8 output")
}

fn gene_lines(out: &str) -> Vec<&str> {
    out.lines()
        .filter(|line| line.split('\t').nth(2).map_or(false, |t| t.ends_with("gene")))
        .collect()
}

#[test]
fn reader_classifies_records() {
    let recs = read(MIXED_GFF);
    // the UTR line is filtered out and the sequence section is never read
    assert_eq!(recs.len(), 13);

    let first = &recs[0];
    assert_eq!(first.scaffold(), "chrI");
    assert_eq!(first.source(), "src");
    assert_eq!(first.role(), FeatureRole::Gene);
    assert_eq!(first.start(), 5000);
    assert_eq!(first.end(), 6000);
    assert_eq!(first.strand(), &Strand::Forward);
    assert_eq!(first.id(), Some("gene10"));
    assert_eq!(first.name(), Some("g10"));
    assert_eq!(first.line(), 3);

    let cds = &recs[3];
    assert_eq!(cds.role(), FeatureRole::Cds);
    assert_eq!(cds.score(), Some(0.5));
    assert_eq!(cds.phase(), Some(0));
    assert_eq!(cds.parents(), &["gene10.t1".to_owned()]);
    assert_eq!(cds.attribute("protein_id"), Some("P10".to_owned()));

    let pseudo = recs.iter().find(|rec| rec.id() == Some("gene2")).expect("a pseudogene");
    assert_eq!(pseudo.role(), FeatureRole::Gene);
    assert_eq!(pseudo.strand(), &Strand::Reverse);
}

#[test]
fn reader_strict_rejects_unknown_type() {
    let raw = "##gff-version 3\n\
               chrI\tsrc\tgene\t1\t90\t.\t+\t.\tID=g1\n\
               chrI\tsrc\tmystery_feature\t1\t90\t.\t+\t.\tID=m1;Parent=g1\n";
    let mut reader = GffReader::from_reader(raw.as_bytes());
    let result = reader.read_records();
    assert!(matches!(result, Err(Error::UnknownFeatureType { line: 3, .. })));

    let mut reader = GffReader::from_reader(raw.as_bytes());
    let recs = reader.mode(ParseMode::Lenient).read_records().expect("records");
    assert_eq!(recs.len(), 1);
}

#[test]
fn writer_canonical_output() {
    let model = AnnotationModel::from_records(read(MIXED_GFF), CdsGrouping::Parented)
        .expect("a model");
    assert_eq!(model.num_genes(), 3);
    assert_eq!(model.num_transcripts(), 6);
    assert_eq!(write(&model, SortOrder::Lexicographic), MIXED_EXPECTED_GFF);
}

#[test]
fn writer_output_is_stable() {
    let model = AnnotationModel::from_records(read(MIXED_GFF), CdsGrouping::Parented)
        .expect("a model");
    let first = write(&model, SortOrder::Lexicographic);

    let reparsed = AnnotationModel::from_records(read(&first), CdsGrouping::Parented)
        .expect("a reparsed model");
    let second = write(&reparsed, SortOrder::Lexicographic);
    assert_eq!(first, second);
}

#[test]
fn writer_gene_sort_orders() {
    let model = AnnotationModel::from_records(read(MIXED_GFF), CdsGrouping::Parented)
        .expect("a model");

    let lexicographic = write(&model, SortOrder::Lexicographic);
    let ids: Vec<&str> = gene_lines(&lexicographic).iter()
        .filter_map(|line| line.split("ID=").nth(1))
        .map(|attrs| attrs.split(';').next().unwrap_or(""))
        .collect();
    assert_eq!(ids, vec!["gene10", "gene2", "gene3"]);

    let natural = write(&model, SortOrder::Natural);
    let ids: Vec<&str> = gene_lines(&natural).iter()
        .filter_map(|line| line.split("ID=").nth(1))
        .map(|attrs| attrs.split(';').next().unwrap_or(""))
        .collect();
    assert_eq!(ids, vec!["gene2", "gene3", "gene10"]);

    // same records, different gene order
    assert_eq!(lexicographic.lines().count(), natural.lines().count());
}

#[test]
fn writer_keeps_extension_attributes() {
    let model = AnnotationModel::from_records(read(MIXED_GFF), CdsGrouping::Parented)
        .expect("a model");
    let mut writer = GffWriter::from_memory();
    let _ = writer.keep_attributes(true).write_model(&model).expect("a written model");
    let out = String::from_utf8(writer.into_inner().expect("a buffer")).expect("utf-8 output");
    assert!(out.contains("ID=gene10.c1;Parent=gene10.t1;protein_id=P10\n"));
}

#[test]
fn writer_keeps_score_as_written() {
    let raw = "chr1\ts\tgene\t1\t90\t1.0\t+\t.\tID=g1;Name=g1\n\
               chr1\ts\tmRNA\t1\t90\t0.50\t+\t.\tID=t1;Parent=g1\n";
    let model = AnnotationModel::from_records(read(raw), CdsGrouping::Parented)
        .expect("a model");
    let out = write(&model, SortOrder::Lexicographic);
    assert!(out.contains("chr1\ts\tgene\t1\t90\t1.0\t+\t.\tID=g1;Name=g1\n"));
    assert!(out.contains("\tmRNA\t1\t90\t0.50\t+\t"));
}
