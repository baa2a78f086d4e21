use bio_types::strand::Strand;
use linked_hash_map::LinkedHashMap;

use crate::classify::{FeatureRole, TypeAliases};
use crate::consts::{self, ID_KEY, NAME_KEY, PARENT_KEY, UNK_STR};
use crate::utils::strand_to_char;
use crate::Error;


/// Number of tab-separated columns of a well-formed record.
const NUM_COLUMNS: usize = 9;

/// Attributes that are not one of the reserved `ID`, `Name`, and `Parent` keys.
///
/// Keys are unique; the map keeps the order in which they were first seen.
pub type Attributes = LinkedHashMap<String, String>;

macro_rules! malformed {
    ($line:expr, $raw:expr, $($reason:tt)+) => (
        Error::MalformedRecord {
            line: $line,
            raw: $raw.to_owned(),
            reason: format!($($reason)+),
        }
    );
}

/// One annotation record.
///
/// Coordinates are 1-based and inclusive. `ID`, `Name`, and `Parent` are held in typed fields;
/// every other attribute lives in the open extension map.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub(crate) scaffold: String,
    pub(crate) source: String,
    pub(crate) feature_type: String,
    pub(crate) role: FeatureRole,
    pub(crate) start: u64,
    pub(crate) end: u64,
    pub(crate) score: Option<f64>,
    /// Score column as written in the input, kept so that it is emitted unchanged.
    pub(crate) score_text: Option<String>,
    pub(crate) strand: Strand,
    pub(crate) phase: Option<u8>,
    pub(crate) id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) parents: Vec<String>,
    pub(crate) attributes: Attributes,
    pub(crate) line: usize,
    pub(crate) raw: String,
}

impl Record {

    /// Parses one line of a GFF3 file.
    ///
    /// Returns `Ok(None)` for lines that carry no feature: blank lines, comments, and records
    /// of the filtered `three_prime_UTR`, `five_prime_UTR`, and `region` types.
    pub fn from_line(line: usize, text: &str, aliases: &TypeAliases) -> crate::Result<Option<Record>> {
        let text = text.trim_end_matches(|c: char| c == '\n' || c == '\r');
        if text.trim().is_empty() || text.starts_with('#') {
            return Ok(None);
        }

        let columns: Vec<&str> = text.split('\t').collect();
        if columns.len() != NUM_COLUMNS {
            return Err(malformed!(line, text, "expected {} columns, found {}",
                                  NUM_COLUMNS, columns.len()));
        }

        let feature_type = columns[2];
        if TypeAliases::is_filtered(feature_type) {
            return Ok(None);
        }
        let role = aliases.classify(feature_type)
            .ok_or_else(|| Error::UnknownFeatureType {
                line,
                raw: text.to_owned(),
                feature_type: feature_type.to_owned(),
            })?;

        let pairs = parse_attributes(line, text, columns[8])?;

        let start = columns[3].parse::<u64>()
            .map_err(|_| malformed!(line, text, "invalid start '{}'", columns[3]))?;
        let end = columns[4].parse::<u64>()
            .map_err(|_| malformed!(line, text, "invalid end '{}'", columns[4]))?;
        if start > end {
            return Err(malformed!(line, text, "start {} is after end {}", start, end));
        }

        let (score, score_text) = match columns[5] {
            UNK_STR => (None, None),
            raw_score => {
                let value = raw_score.parse::<f64>()
                    .map_err(|_| malformed!(line, text, "invalid score '{}'", raw_score))?;
                (Some(value), Some(raw_score.to_owned()))
            },
        };

        let strand = match columns[6] {
            "+" => Strand::Forward,
            "-" => Strand::Reverse,
            UNK_STR => Strand::Unknown,
            other => return Err(malformed!(line, text, "invalid strand '{}'", other)),
        };

        let phase = match columns[7] {
            UNK_STR => None,
            "0" => Some(0),
            "1" => Some(1),
            "2" => Some(2),
            other => return Err(malformed!(line, text, "invalid phase '{}'", other)),
        };

        let mut record = Record {
            scaffold: columns[0].to_owned(),
            source: columns[1].to_owned(),
            feature_type: feature_type.to_owned(),
            role,
            start,
            end,
            score,
            score_text,
            strand,
            phase,
            id: None,
            name: None,
            parents: Vec::new(),
            attributes: Attributes::new(),
            line,
            raw: text.to_owned(),
        };
        for (key, value) in pairs {
            record.set_attribute(key, value);
        }

        Ok(Some(record))
    }

    pub fn scaffold(&self) -> &str {
        self.scaffold.as_str()
    }

    pub fn set_scaffold<T>(&mut self, scaffold: T)
        where T: Into<String>
    {
        self.scaffold = scaffold.into()
    }

    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    pub fn set_source<T>(&mut self, source: T)
        where T: Into<String>
    {
        self.source = source.into()
    }

    /// The raw feature type string, as found in the input.
    pub fn feature_type(&self) -> &str {
        self.feature_type.as_str()
    }

    pub fn role(&self) -> FeatureRole {
        self.role
    }

    /// Sets both the raw type string and the role it maps to.
    pub fn set_kind<T>(&mut self, feature_type: T, role: FeatureRole)
        where T: Into<String>
    {
        self.feature_type = feature_type.into();
        self.role = role;
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn strand(&self) -> &Strand {
        &self.strand
    }

    pub fn phase(&self) -> Option<u8> {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Option<u8>) {
        self.phase = phase
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn set_id<T>(&mut self, id: Option<T>)
        where T: Into<String>
    {
        self.id = id.map(|v| v.into())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name<T>(&mut self, name: Option<T>)
        where T: Into<String>
    {
        self.name = name.map(|v| v.into())
    }

    pub fn parents(&self) -> &[String] {
        self.parents.as_slice()
    }

    pub fn set_parents(&mut self, parents: Vec<String>) {
        self.parents = parents
    }

    /// The Parent reference that owns this feature in the hierarchy.
    pub fn owner(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    /// Identity key of gene records: the ID if present, the Name otherwise.
    pub fn key(&self) -> Option<&str> {
        self.id().or_else(|| self.name())
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    /// Returns the value of any attribute, reserved keys included.
    pub fn attribute(&self, key: &str) -> Option<String> {
        match key {
            ID_KEY => self.id.clone(),
            NAME_KEY => self.name.clone(),
            PARENT_KEY if !self.parents.is_empty() => Some(self.parents.join(",")),
            PARENT_KEY => None,
            other => self.attributes.get(other).cloned(),
        }
    }

    /// Sets any attribute, routing the reserved keys to their typed fields.
    pub fn set_attribute<K, V>(&mut self, key: K, value: V)
        where K: Into<String>, V: Into<String>
    {
        let (key, value) = (key.into(), value.into());
        match key.as_str() {
            ID_KEY => self.id = Some(value),
            NAME_KEY => self.name = Some(value),
            PARENT_KEY => {
                self.parents = value.split(',')
                    .filter(|v| !v.is_empty())
                    .map(|v| v.to_owned())
                    .collect();
            },
            _ => {
                let _ = self.attributes.insert(key, value);
            },
        }
    }

    /// 1-based line number of the input line this record came from; 0 if synthesized.
    pub fn line(&self) -> usize {
        self.line
    }

    /// The input line this record came from; empty if synthesized.
    pub fn raw(&self) -> &str {
        self.raw.as_str()
    }

    /// Rebuilds the attribute column.
    ///
    /// The reserved attributes come first as `ID=...;Name=...;Parent=...`, each omitted when
    /// absent. Extension attributes follow in their original order when requested.
    pub fn attribute_column(&self, with_extra: bool) -> String {
        let mut parts = Vec::with_capacity(3 + self.attributes.len());
        if let Some(ref id) = self.id {
            parts.push(format!("{}={}", ID_KEY, id));
        }
        if let Some(ref name) = self.name {
            parts.push(format!("{}={}", NAME_KEY, name));
        }
        if !self.parents.is_empty() {
            parts.push(format!("{}={}", PARENT_KEY, self.parents.join(",")));
        }
        if with_extra {
            parts.extend(self.attributes.iter().map(|(k, v)| format!("{}={}", k, v)));
        }

        if parts.is_empty() { UNK_STR.to_owned() } else { parts.join(";") }
    }

    /// The nine output columns of the record.
    pub fn columns(&self, feature_type: &str, with_extra: bool) -> Vec<String> {
        let score = match (&self.score_text, self.score) {
            (Some(text), _) => text.clone(),
            (None, Some(value)) => value.to_string(),
            (None, None) => UNK_STR.to_owned(),
        };
        let phase = self.phase
            .map(|p| p.to_string())
            .unwrap_or_else(|| UNK_STR.to_owned());
        vec![self.scaffold.clone(), self.source.clone(), feature_type.to_owned(),
             self.start.to_string(), self.end.to_string(), score,
             strand_to_char(&self.strand).to_string(), phase,
             self.attribute_column(with_extra)]
    }

    /// Formats the record as one GFF3 line, without the line terminator.
    pub fn to_line(&self, feature_type: &str, with_extra: bool) -> String {
        self.columns(feature_type, with_extra).join("\t")
    }

    /// Merges a later record describing the same feature into this one.
    ///
    /// Columns and attributes of the later record overwrite the earlier ones; attributes only
    /// present in this record are kept. Returns whether any value changed.
    pub(crate) fn update_from(&mut self, other: Record) -> bool {
        let before = self.clone();
        self.scaffold = other.scaffold;
        self.source = other.source;
        self.feature_type = other.feature_type;
        self.role = other.role;
        self.start = other.start;
        self.end = other.end;
        self.score = other.score;
        self.score_text = other.score_text;
        self.strand = other.strand;
        self.phase = other.phase;
        if other.id.is_some() {
            self.id = other.id;
        }
        if other.name.is_some() {
            self.name = other.name;
        }
        if !other.parents.is_empty() {
            self.parents = other.parents;
        }
        for (key, value) in other.attributes {
            let _ = self.attributes.insert(key, value);
        }

        *self != before
    }
}

/// Splits the attribute column into key-value pairs.
///
/// Segments are separated by `;`, and empty segments are skipped. Every remaining segment must
/// contain exactly one `=`.
fn parse_attributes(line: usize, raw: &str, column: &str) -> crate::Result<Vec<(String, String)>> {
    if column == UNK_STR {
        return Ok(Vec::new());
    }
    column.split(';')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut parts = segment.split('=');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(key), Some(value), None) => Ok((key.to_owned(), value.to_owned())),
                _ => Err(Error::MalformedAttribute {
                    line,
                    raw: raw.to_owned(),
                    segment: segment.to_owned(),
                }),
            }
        })
        .collect()
}

/// Builder for records that are synthesized rather than parsed.
pub struct RecordBuilder {
    scaffold: String,
    start: u64,
    end: u64,
    feature_type: String,
    role: FeatureRole,
    source: String,
    score: Option<f64>,
    score_text: Option<String>,
    strand: Strand,
    phase: Option<u8>,
    id: Option<String>,
    name: Option<String>,
    parents: Vec<String>,
    attributes: Attributes,
    line: usize,
}

impl RecordBuilder {

    pub fn new<T, F>(scaffold: T, start: u64, end: u64, feature_type: F, role: FeatureRole) -> Self
        where T: Into<String>, F: Into<String>
    {
        RecordBuilder {
            scaffold: scaffold.into(),
            start,
            end,
            feature_type: feature_type.into(),
            role,
            source: UNK_STR.to_owned(),
            score: None,
            score_text: None,
            strand: Strand::Unknown,
            phase: None,
            id: None,
            name: None,
            parents: Vec::new(),
            attributes: Attributes::new(),
            line: 0,
        }
    }

    /// Starts a builder from the columns and extension attributes of an existing record.
    ///
    /// Identity attributes and the phase are not copied.
    pub fn from_template<F>(template: &Record, feature_type: F, role: FeatureRole) -> Self
        where F: Into<String>
    {
        let mut builder = RecordBuilder::new(template.scaffold.as_str(), template.start,
                                             template.end, feature_type, role)
            .source(template.source.as_str())
            .score(template.score)
            .strand(template.strand)
            .attributes(template.attributes.clone())
            .line(template.line);
        builder.score_text = template.score_text.clone();
        builder
    }

    pub fn coords(mut self, start: u64, end: u64) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn source<T>(mut self, source: T) -> Self
        where T: Into<String>
    {
        self.source = source.into();
        self
    }

    pub fn score(mut self, score: Option<f64>) -> Self {
        self.score = score;
        self.score_text = None;
        self
    }

    pub fn strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    pub fn phase(mut self, phase: Option<u8>) -> Self {
        self.phase = phase;
        self
    }

    pub fn id<T>(mut self, id: T) -> Self
        where T: Into<String>
    {
        self.id = Some(id.into());
        self
    }

    pub fn name<T>(mut self, name: T) -> Self
        where T: Into<String>
    {
        self.name = Some(name.into());
        self
    }

    pub fn parent<T>(mut self, parent: T) -> Self
        where T: Into<String>
    {
        self.parents.push(parent.into());
        self
    }

    pub fn attribute<K, V>(mut self, key: K, value: V) -> Self
        where K: Into<String>, V: Into<String>
    {
        let _ = self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Line number reported in diagnostics about the built record.
    pub fn line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn build(self) -> crate::Result<Record> {
        if self.start > self.end {
            return Err(Error::InvalidInterval {
                id: self.id.unwrap_or_else(|| consts::DEF_ID.to_owned()),
                start: self.start,
                end: self.end,
            });
        }
        Ok(Record {
            scaffold: self.scaffold,
            source: self.source,
            feature_type: self.feature_type,
            role: self.role,
            start: self.start,
            end: self.end,
            score: self.score,
            score_text: self.score_text,
            strand: self.strand,
            phase: self.phase,
            id: self.id,
            name: self.name,
            parents: self.parents,
            attributes: self.attributes,
            line: self.line,
            raw: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> crate::Result<Option<Record>> {
        Record::from_line(7, text, &TypeAliases::default())
    }

    #[test]
    fn from_line_cds() {
        let rec = parse("chr1\tsrc\tCDS\t100\t200\t.\t-\t2\tID=c1;Parent=t1,t2;note=x")
            .expect("a parse result")
            .expect("a record");
        assert_eq!(rec.scaffold(), "chr1");
        assert_eq!(rec.source(), "src");
        assert_eq!(rec.role(), FeatureRole::Cds);
        assert_eq!((rec.start(), rec.end()), (100, 200));
        assert_eq!(rec.score(), None);
        assert_eq!(rec.strand(), &Strand::Reverse);
        assert_eq!(rec.phase(), Some(2));
        assert_eq!(rec.id(), Some("c1"));
        assert_eq!(rec.name(), None);
        assert_eq!(rec.parents(), &["t1".to_owned(), "t2".to_owned()]);
        assert_eq!(rec.owner(), Some("t1"));
        assert_eq!(rec.attributes().get("note"), Some(&"x".to_owned()));
        assert_eq!(rec.line(), 7);
    }

    #[test]
    fn from_line_skips() {
        assert!(parse("").unwrap().is_none());
        assert!(parse("##gff-version 3").unwrap().is_none());
        assert!(parse("chr1\tsrc\tfive_prime_UTR\t1\t5\t.\t+\t.\tParent=t1").unwrap().is_none());
        assert!(parse("chr1\tsrc\tregion\t1\t500\t.\t.\t.\tID=chr1").unwrap().is_none());
    }

    #[test]
    fn from_line_filtered_before_attributes() {
        let utr = parse("chr1\tsrc\tthree_prime_UTR\t1\t5\t.\t+\t.\tParent=t1;broken");
        assert!(utr.unwrap().is_none());
    }

    #[test]
    fn from_line_empty_attribute_column() {
        let rec = parse("chr1\tsrc\tgene\t1\t5\t.\t+\t.\t\r\n")
            .expect("a parse result")
            .expect("a record");
        assert_eq!(rec.id(), None);
        assert!(rec.attributes().is_empty());
        assert_eq!(rec.attribute_column(true), ".");
    }

    #[test]
    fn score_text_kept() {
        let rec = parse("chr1\tsrc\tCDS\t1\t90\t1.0\t+\t0\tID=c1;Parent=t1")
            .unwrap()
            .unwrap();
        assert_eq!(rec.score(), Some(1.0));
        assert_eq!(rec.to_line("CDS", false), "chr1\tsrc\tCDS\t1\t90\t1.0\t+\t0\tID=c1;Parent=t1");

        let copy = RecordBuilder::from_template(&rec, "exon", FeatureRole::Exon).build().unwrap();
        assert_eq!(copy.columns("exon", false)[5], "1.0");
        let rescored = RecordBuilder::from_template(&rec, "exon", FeatureRole::Exon)
            .score(Some(2.5))
            .build()
            .unwrap();
        assert_eq!(rescored.columns("exon", false)[5], "2.5");
    }

    #[test]
    fn from_line_wrong_column_count() {
        match parse("chr1\tsrc\tgene\t1\t5\t.\t+\t.") {
            Err(Error::MalformedRecord { line, .. }) => assert_eq!(line, 7),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn from_line_bad_attribute() {
        match parse("chr1\tsrc\tgene\t1\t5\t.\t+\t.\tID=g1;Name") {
            Err(Error::MalformedAttribute { segment, raw, .. }) => {
                assert_eq!(segment, "Name");
                assert!(raw.starts_with("chr1\tsrc\tgene"));
            },
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(parse("chr1\tsrc\tgene\t1\t5\t.\t+\t.\tID=g1=g2").is_err());
    }

    #[test]
    fn from_line_unknown_type() {
        match parse("chr1\tsrc\tintron\t1\t5\t.\t+\t.\tParent=t1") {
            Err(Error::UnknownFeatureType { feature_type, .. }) => {
                assert_eq!(feature_type, "intron")
            },
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn from_line_bad_columns() {
        assert!(parse("chr1\tsrc\tgene\tx\t5\t.\t+\t.\tID=g1").is_err());
        assert!(parse("chr1\tsrc\tgene\t9\t5\t.\t+\t.\tID=g1").is_err());
        assert!(parse("chr1\tsrc\tgene\t1\t5\tx\t+\t.\tID=g1").is_err());
        assert!(parse("chr1\tsrc\tgene\t1\t5\t.\t*\t.\tID=g1").is_err());
        assert!(parse("chr1\tsrc\tCDS\t1\t5\t.\t+\t3\tID=c1;Parent=t1").is_err());
    }

    #[test]
    fn attribute_column_order() {
        let rec = parse("chr1\tsrc\tmRNA\t1\t50\t0.5\t+\t.\tnote=a;Parent=g1;Name=T;ID=t1")
            .unwrap()
            .unwrap();
        assert_eq!(rec.attribute_column(false), "ID=t1;Name=T;Parent=g1");
        assert_eq!(rec.attribute_column(true), "ID=t1;Name=T;Parent=g1;note=a");
        assert_eq!(rec.to_line("mRNA", false),
                   "chr1\tsrc\tmRNA\t1\t50\t0.5\t+\t.\tID=t1;Name=T;Parent=g1");
    }

    #[test]
    fn update_from_overwrites() {
        let mut first = parse("chr1\tsrc\tgene\t1\t50\t.\t+\t.\tID=g1;Name=A;note=a;keep=k")
            .unwrap()
            .unwrap();
        let second = parse("chr1\tsrc\tgene\t1\t60\t.\t+\t.\tID=g1;note=b")
            .unwrap()
            .unwrap();
        assert!(first.update_from(second));
        assert_eq!(first.end(), 60);
        assert_eq!(first.name(), Some("A"));
        assert_eq!(first.attributes().get("note"), Some(&"b".to_owned()));
        assert_eq!(first.attributes().get("keep"), Some(&"k".to_owned()));

        let same = first.clone();
        assert!(!first.update_from(same));
    }

    #[test]
    fn builder_invalid_interval() {
        let built = RecordBuilder::new("chr1", 10, 5, "exon", FeatureRole::Exon)
            .id("e1")
            .build();
        match built {
            Err(Error::InvalidInterval { id, .. }) => assert_eq!(id, "e1"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
