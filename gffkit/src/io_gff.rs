/*! Reader and writer for GFF3 annotation files.

The reader turns lines into classified [`Record`]s and stops at an embedded `##FASTA` section.
Attribute values are taken literally, without percent-decoding.

The writer emits a finalized [`AnnotationModel`] in gene-major order: each gene record is
followed by its transcripts, and each transcript by its exons and then its CDS segments.
*/
use std::cmp::Ordering;
use std::fs;
use std::io::{self, BufRead, Write};
use std::iter;
use std::path::Path;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use regex::Regex;
use tempfile::NamedTempFile;

use crate::classify::TypeAliases;
use crate::consts::{FASTA_DIRECTIVE, GFF3_HEADER, MRNA_STR};
use crate::model::{AnnotationModel, Gene, Transcript};
use crate::record::Record;
use crate::Error;


/// Pattern of the tokens compared by the natural sort order.
const NATURAL_TOKEN_PAT: &str = r"(\d+)|(\D+)";

/// Transcript type written as `mRNA` when coding transcripts are normalized.
const GENERIC_TRANSCRIPT_STR: &str = "transcript";

/// How malformed lines are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Malformed lines and unknown feature types stop the read.
    Strict,
    /// Malformed lines and unknown feature types are logged and dropped.
    Lenient,
}

impl Default for ParseMode {
    fn default() -> ParseMode {
        ParseMode::Strict
    }
}

/// GFF3 reader.
pub struct Reader<R: io::Read> {
    inner: io::BufReader<R>,
    aliases: TypeAliases,
    mode: ParseMode,
}

impl<R: io::Read> Reader<R> {

    /// Creates a GFF3 reader from another reader.
    pub fn from_reader(in_reader: R) -> Reader<R> {
        Reader {
            inner: io::BufReader::new(in_reader),
            aliases: TypeAliases::default(),
            mode: ParseMode::default(),
        }
    }

    /// Sets the alias table used to classify feature types.
    pub fn aliases(&mut self, aliases: TypeAliases) -> &mut Self {
        self.aliases = aliases;
        self
    }

    /// Sets how malformed lines are handled.
    pub fn mode(&mut self, mode: ParseMode) -> &mut Self {
        self.mode = mode;
        self
    }

    /// Creates an iterator of records.
    pub fn records(&mut self) -> GffRecords<R> {
        GffRecords {
            lines: (&mut self.inner).lines(),
            aliases: &self.aliases,
            mode: self.mode,
            line_no: 0,
            num_dropped: 0,
            done: false,
        }
    }

    /// Reads every record into memory.
    pub fn read_records(&mut self) -> crate::Result<Vec<Record>> {
        let mut records = self.records();
        let recs = records.by_ref().collect::<crate::Result<Vec<Record>>>()?;
        if records.num_dropped() > 0 {
            warn!("dropped {} malformed or unclassified record(s)", records.num_dropped());
        }
        info!("read {} record(s) from {} line(s)", recs.len(), records.line_no);
        Ok(recs)
    }
}

impl Reader<fs::File> {

    /// Creates a GFF3 reader that reads from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        fs::File::open(path).map(Reader::from_reader)
    }
}

/// Iterator over the records of a GFF3 file.
pub struct GffRecords<'a, R: 'a> where R: io::Read {
    lines: io::Lines<&'a mut io::BufReader<R>>,
    aliases: &'a TypeAliases,
    mode: ParseMode,
    line_no: usize,
    num_dropped: usize,
    done: bool,
}

impl<'a, R> GffRecords<'a, R> where R: io::Read {

    /// Number of records dropped so far in lenient mode.
    pub fn num_dropped(&self) -> usize {
        self.num_dropped
    }

    fn recoverable(err: &Error) -> bool {
        match err {
            Error::MalformedRecord { .. }
            | Error::MalformedAttribute { .. }
            | Error::UnknownFeatureType { .. } => true,
            _ => false,
        }
    }
}

impl<'a, R> Iterator for GffRecords<'a, R> where R: io::Read {

    type Item = crate::Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let text = match self.lines.next()? {
                Ok(text) => text,
                Err(err) => {
                    self.done = true;
                    return Some(Err(Error::from(err)));
                },
            };
            self.line_no += 1;
            if text.starts_with(FASTA_DIRECTIVE) {
                debug!("sequence section starts at line {}", self.line_no);
                self.done = true;
                break;
            }
            match Record::from_line(self.line_no, &text, self.aliases) {
                Ok(Some(rec)) => return Some(Ok(rec)),
                Ok(None) => {},
                Err(ref err) if self.mode == ParseMode::Lenient && Self::recoverable(err) => {
                    warn!("dropping {}", err);
                    self.num_dropped += 1;
                },
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                },
            }
        }
        None
    }
}

/// Order of genes in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Byte-wise comparison of gene keys, so `gene10` comes before `gene2`.
    Lexicographic,
    /// Digit runs compare by numeric value, so `gene2` comes before `gene10`.
    Natural,
}

impl Default for SortOrder {
    fn default() -> SortOrder {
        SortOrder::Lexicographic
    }
}

/// Sort key token of the natural order; numbers sort before text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum NaturalToken {
    Number(usize, String, usize),
    Text(String),
}

fn natural_key(token_re: &Regex, value: &str) -> Vec<NaturalToken> {
    token_re.captures_iter(value)
        .filter_map(|cap| {
            if let Some(digits) = cap.get(1) {
                let raw = digits.as_str();
                let trimmed = raw.trim_start_matches('0');
                Some(NaturalToken::Number(trimmed.len(), trimmed.to_owned(), raw.len()))
            } else {
                cap.get(2).map(|text| NaturalToken::Text(text.as_str().to_owned()))
            }
        })
        .collect()
}

impl SortOrder {

    /// Sorts genes by their keys. Genes with equal keys keep their relative order.
    pub(crate) fn sort_genes(self, genes: &mut Vec<&Gene>) -> crate::Result<()> {
        match self {
            SortOrder::Lexicographic => genes.sort_by(|a, b| a.id().cmp(b.id())),
            SortOrder::Natural => {
                let token_re = Regex::new(NATURAL_TOKEN_PAT)?;
                genes.sort_by_cached_key(|gene| natural_key(&token_re, gene.id()));
            },
        }
        Ok(())
    }

    /// Compares two gene keys.
    pub fn compare(self, a: &str, b: &str) -> crate::Result<Ordering> {
        match self {
            SortOrder::Lexicographic => Ok(a.cmp(b)),
            SortOrder::Natural => {
                let token_re = Regex::new(NATURAL_TOKEN_PAT)?;
                Ok(natural_key(&token_re, a).cmp(&natural_key(&token_re, b)))
            },
        }
    }
}

/// GFF3 writer.
pub struct Writer<W: io::Write> {
    inner: csv::Writer<W>,
    sort_order: SortOrder,
    keep_attributes: bool,
    coding_as_mrna: bool,
}

impl<W: io::Write> Writer<W> {

    /// Creates a GFF3 writer from another writer.
    pub fn from_writer(in_writer: W) -> Writer<W> {
        Writer {
            inner: WriterBuilder::new()
                .delimiter(b'\t')
                .quote_style(QuoteStyle::Never)
                .terminator(Terminator::Any(b'\n'))
                .flexible(true)
                .from_writer(in_writer),
            sort_order: SortOrder::default(),
            keep_attributes: false,
            coding_as_mrna: true,
        }
    }

    /// Sets the order of genes in the output.
    pub fn sort_order(&mut self, sort_order: SortOrder) -> &mut Self {
        self.sort_order = sort_order;
        self
    }

    /// Sets whether attributes other than `ID`, `Name`, and `Parent` are written.
    pub fn keep_attributes(&mut self, keep_attributes: bool) -> &mut Self {
        self.keep_attributes = keep_attributes;
        self
    }

    /// Sets whether transcripts typed `transcript` are written as `mRNA`.
    pub fn coding_as_mrna(&mut self, coding_as_mrna: bool) -> &mut Self {
        self.coding_as_mrna = coding_as_mrna;
        self
    }

    /// Writes the header line and every record of the model.
    ///
    /// Transcripts of a gene are written in order of the priority of their written type;
    /// transcripts of equal priority keep the model's order. Returns the number of records
    /// written.
    pub fn write_model(&mut self, model: &AnnotationModel) -> crate::Result<usize> {
        self.inner.write_record(iter::once(GFF3_HEADER))?;

        let mut genes: Vec<&Gene> = model.genes().collect();
        self.sort_order.sort_genes(&mut genes)?;

        let mut num_written = 0;
        for gene in genes {
            let gene_rec = match gene.record() {
                Some(rec) => rec,
                None => {
                    debug!("skipping placeholder gene '{}'", gene.id());
                    continue;
                },
            };
            self.write_record(gene_rec, gene_rec.feature_type())?;
            num_written += 1;

            let mut transcripts: Vec<(&str, &Transcript)> = model.gene_transcripts(gene)
                .map(|trx| (written_type(trx, self.coding_as_mrna), trx))
                .collect();
            transcripts.sort_by_key(|&(ftype, _)| model.aliases().priority(ftype));

            for (ftype, trx) in transcripts {
                self.write_record(trx.record(), ftype)?;
                for exon in trx.exons() {
                    self.write_record(exon, exon.feature_type())?;
                }
                for cds in trx.cds() {
                    self.write_record(cds, cds.feature_type())?;
                }
                num_written += 1 + trx.exons().len() + trx.cds().len();
            }
        }
        self.inner.flush()?;
        debug!("wrote {} record(s)", num_written);
        Ok(num_written)
    }

    fn write_record(&mut self, record: &Record, feature_type: &str) -> crate::Result<()> {
        self.inner.write_record(&record.columns(feature_type, self.keep_attributes))
            .map_err(Error::from)
    }

    /// Flushes and returns the underlying writer.
    pub fn into_inner(self) -> crate::Result<W> {
        self.inner.into_inner()
            .map_err(|e| Error::from(e.into_error()))
    }
}

impl Writer<fs::File> {

    /// Creates a GFF3 writer that writes to the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let f = fs::File::create(path)?;
        Ok(Writer::from_writer(f))
    }
}

impl Writer<Vec<u8>> {

    /// Creates a GFF3 writer that writes to an in-memory buffer.
    ///
    /// The initial capacity of the buffer is 64 KiB.
    pub fn from_memory() -> Writer<Vec<u8>> {
        Writer::from_writer(Vec::with_capacity(1024 * 64))
    }
}

/// Feature type written for a transcript.
fn written_type(trx: &Transcript, coding_as_mrna: bool) -> &str {
    match trx.output_type() {
        GENERIC_TRANSCRIPT_STR if coding_as_mrna => MRNA_STR,
        other => other,
    }
}

/// Replaces the file at the given path with the given contents.
///
/// The contents go to a temporary file in the same directory first, which is then renamed over
/// the target. On failure the target is left as it was.
pub fn write_atomically<P: AsRef<Path>>(path: P, contents: &[u8]) -> crate::Result<()> {
    write_all_atomically(&[(path, contents)])
}

/// Replaces several files, staging all of them before any target is touched.
///
/// A failure while staging leaves every target as it was.
pub fn write_all_atomically<P: AsRef<Path>>(files: &[(P, &[u8])]) -> crate::Result<()> {
    let mut staged = Vec::with_capacity(files.len());
    for &(ref path, contents) in files.iter() {
        let path = path.as_ref();
        if path.is_dir() {
            return Err(Error::from(io::Error::new(
                io::ErrorKind::Other, format!("'{}' is a directory", path.display()))));
        }
        staged.push((stage(path, contents)?, path));
    }
    for (tmp, path) in staged {
        let _ = tmp.persist(path).map_err(|e| e.error)?;
    }
    Ok(())
}

fn stage(path: &Path, contents: &[u8]) -> crate::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.flush()?;
    Ok(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn natural(a: &str, b: &str) -> Ordering {
        SortOrder::Natural.compare(a, b).unwrap()
    }

    #[test]
    fn natural_order() {
        assert_eq!(natural("gene2", "gene10"), Ordering::Less);
        assert_eq!(natural("gene10", "gene10"), Ordering::Equal);
        assert_eq!(natural("g1.2", "g1.10"), Ordering::Less);
        assert_eq!(natural("10a", "a10"), Ordering::Less);
        assert_eq!(natural("gene02", "gene2"), Ordering::Greater);
        assert_eq!(natural("gene02", "gene3"), Ordering::Less);
        assert_eq!(SortOrder::Lexicographic.compare("gene2", "gene10").unwrap(),
                   Ordering::Greater);
    }

    #[test]
    fn reader_stops_at_fasta() {
        let raw = "##gff-version 3\n\
                   chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1\n\
                   ##FASTA\n\
                   >chr1\n\
                   ACGT\n";
        let recs = Reader::from_reader(raw.as_bytes()).read_records().unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].line(), 2);
    }

    #[test]
    fn reader_lenient_drops() {
        let raw = "chr1\ts\tgene\t1\t90\n\
                   chr1\ts\tintron\t1\t90\t.\t+\t.\tID=i1\n\
                   chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1;x\n\
                   chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g2\n";
        let mut reader = Reader::from_reader(raw.as_bytes());
        let recs = reader.mode(ParseMode::Lenient).read_records().unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].id(), Some("g2"));

        let mut reader = Reader::from_reader(raw.as_bytes());
        match reader.read_records() {
            Err(Error::MalformedRecord { line, .. }) => assert_eq!(line, 1),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn written_type_of_generic_transcripts() {
        let raw = "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1\n\
                   chr1\ts\ttranscript\t1\t90\t.\t+\t.\tID=t1;Parent=g1\n";
        let recs = Reader::from_reader(raw.as_bytes()).read_records().unwrap();
        let model = AnnotationModel::from_records(recs, Default::default()).unwrap();

        let mut writer = Writer::from_memory();
        assert_eq!(writer.write_model(&model).unwrap(), 2);
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(out.contains("\tmRNA\t"));

        let mut writer = Writer::from_memory();
        let _ = writer.coding_as_mrna(false).write_model(&model).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert!(out.contains("\ttranscript\t"));
    }
}
