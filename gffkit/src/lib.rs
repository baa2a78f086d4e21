/*! Reconstruction and repair of GFF3 gene models.

`gffkit` reads loosely-structured GFF3 annotation files, rebuilds the
gene → transcript → exon/CDS tree from the flat records, repairs identifiers and scaffold
names, optionally synthesizes missing structural features, and writes the result back as a
canonically ordered GFF3 file.

The usual entry point is [`reformat_file`], driven by a [`ReformatOptions`] value. Each stage
is also usable on its own: [`GffReader`] for parsing, the functions in the `normalize` group
for identifier repair, [`Synonyms`] for scaffold remapping, [`AnnotationModel`] for the
hierarchy, and [`GffWriter`] for serialization.
*/
#![deny(
        trivial_casts, trivial_numeric_casts,
        unsafe_code,
        unstable_features,
        unused_import_braces)]
#![warn(unused_results, unused_qualifications)]

extern crate bio;
extern crate bio_types;
extern crate csv;
extern crate itertools;
extern crate linked_hash_map;
#[macro_use]
extern crate log;
extern crate multimap;
#[macro_use]
extern crate quick_error;
extern crate regex;
extern crate tempfile;

use std::io;

pub use bio_types::strand::Strand;

mod classify;
pub use crate::classify::{FeatureRole, TypeAliases};

mod record;
pub use crate::record::{Attributes, Record, RecordBuilder};

mod normalize;
pub use crate::normalize::{NameMode, add_id_prefix, infer_names, make_ids_unique,
                           rename_source, strip_name_prefixes, strip_prefixes};

mod synonyms;
pub use crate::synonyms::Synonyms;

mod model;
pub use crate::model::{AnnotationModel, CdsGrouping, FeatureState, Gene, Transcript};

mod extrapolate;

mod datacheck;
pub use crate::datacheck::{CheckMode, DataCheckReport, DataChecks, fasta_scaffold_names};

mod io_gff;
pub use crate::io_gff::{Reader as GffReader, Writer as GffWriter, GffRecords, ParseMode,
                        SortOrder, write_all_atomically, write_atomically};

mod pipeline;
pub use crate::pipeline::{AttributeFilter, Extrapolation, Reformatted, ReformatOptions,
                          reconcile, reformat_file};


quick_error! {
    /// Errors that can occur while reconciling an annotation.
    #[derive(Debug)]
    pub enum Error {
        /// A line that does not have the nine expected columns, or whose columns do not parse.
        MalformedRecord { line: usize, raw: String, reason: String } {
            display("malformed record at line {} ({}):\n{}", line, reason, raw)
        }
        /// An attribute segment without exactly one '=' separator.
        MalformedAttribute { line: usize, raw: String, segment: String } {
            display("malformed attribute '{}' at line {}:\n{}", segment, line, raw)
        }
        /// A feature type that is absent from the alias table.
        UnknownFeatureType { line: usize, raw: String, feature_type: String } {
            display("unexpected feature type '{}' at line {}:\n{}", feature_type, line, raw)
        }
        /// A gene record with neither an ID nor a Name attribute.
        MissingGeneIdentity { line: usize, raw: String } {
            display("gene has neither an ID nor a Name attribute at line {}:\n{}", line, raw)
        }
        /// A transcript record without an ID attribute.
        MissingTranscriptId { line: usize, raw: String } {
            display("transcript does not have an ID attribute at line {}:\n{}", line, raw)
        }
        /// A child record without a Parent attribute.
        MissingParent { line: usize, raw: String, feature_type: String } {
            display("{} does not have a Parent attribute at line {}:\n{}",
                    feature_type, line, raw)
        }
        /// A CDS record without an ID while grouping CDS segments by their own ID.
        MissingFeatureId { line: usize, raw: String, feature_type: String } {
            display("{} does not have an ID attribute at line {}:\n{}", feature_type, line, raw)
        }
        /// A Parent reference that never resolves to a feature of the expected role.
        UnknownParent { line: usize, id: String, parent: String, expected: &'static str } {
            display("feature '{}' at line {} refers to parent '{}', which is not a known {}",
                    id, line, parent, expected)
        }
        /// More CDS segments share one ID than a synthesized transcript can be built from.
        MultipleCdsSegments { id: String, count: usize } {
            display("cannot make an mRNA from {} CDS segments sharing the ID '{}'", count, id)
        }
        /// A scaffold name missing from the synonym table.
        UnmappedScaffold(name: String) {
            display("no synonym found for scaffold '{}'", name)
        }
        /// A synonym table row that does not have four columns.
        MalformedSynonyms { line: usize, raw: String } {
            display("seq region synonyms file should have 4 columns, line {}:\n{}", line, raw)
        }
        /// No unique synonym table could be found in the working directory.
        SynonymsFileNotFound(count: usize) {
            display("expected 1 but found {} files ending with seq_region_synonyms.tsv", count)
        }
        /// Gene extrapolation requested for a scaffold without gene features.
        NoGenesOnScaffold(name: String) {
            display("no gene features found on scaffold '{}'", name)
        }
        /// Gene extrapolation requested for a scaffold without transcript features.
        NoTranscriptsOnScaffold(name: String) {
            display("no transcript features found on scaffold '{}'", name)
        }
        /// Genes without a Name attribute, found by the gene name data check.
        MissingGeneName(ids: Vec<String>) {
            display("{} gene(s) do not have a Name attribute (first: '{}'); \
                     consider inferring names from IDs",
                    ids.len(), ids.first().map(String::as_str).unwrap_or(consts::DEF_ID))
        }
        /// Scaffolds used by the annotation but absent from the assembly FASTA.
        ScaffoldsNotInFasta(names: Vec<String>) {
            display("these scaffolds exist in the gff but not in the fasta file: {}",
                    names.join(", "))
        }
        /// A feature whose start coordinate lies after its end coordinate.
        InvalidInterval { id: String, start: u64, end: u64 } {
            display("invalid interval {}..{} for feature '{}'", start, end, id)
        }
        /// A gene attribute split condition that is not a 'key=value' list.
        InvalidAttributeFilter(raw: String) {
            display("invalid attribute condition '{}', expected key=value[;key=value]", raw)
        }
        /// Records added to a model that has already been finalized.
        ModelFinalized {
            display("annotation model is already finalized")
        }
        /// Generic wrapper for I/O errors.
        Io(err: io::Error) {
            display("{}", err)
            from()
            source(err)
        }
        /// Generic wrapper for errors from the regex crate.
        Regex(err: regex::Error) {
            display("{}", err)
            from()
            source(err)
        }
        /// Generic wrapper for errors from the csv crate.
        Csv(err: csv::Error) {
            display("{}", err)
            from()
            source(err)
        }
    }
}

pub type Result<T> = ::std::result::Result<T, Error>;

// Crate-wide constants
mod consts {
    // Reserved attribute keys.
    pub(crate) const ID_KEY: &str = "ID";
    pub(crate) const NAME_KEY: &str = "Name";
    pub(crate) const PARENT_KEY: &str = "Parent";

    // Feature types written for synthesized features.
    pub(crate) const GENE_STR: &str = "gene";
    pub(crate) const MRNA_STR: &str = "mRNA";
    pub(crate) const EXON_STR: &str = "exon";
    pub(crate) const CDS_STR: &str = "CDS";
    pub(crate) const PSEUDOGENIC_TRANSCRIPT_STR: &str = "pseudogenic_transcript";
    pub(crate) const NONTRANSLATING_TRANSCRIPT_STR: &str = "nontranslating_transcript";

    // Suffixes of synthesized identifiers.
    pub(crate) const MRNA_SUFFIX: &str = "_mRNA";
    pub(crate) const GENE_SUFFIX: &str = "_gene";
    pub(crate) const SYNTH_GENE_SUFFIX: &str = ".gene";
    pub(crate) const SYNTH_CDS_SUFFIX: &str = ".cds";

    // Value for unknown columns.
    pub(crate) const UNK_STR: &str = ".";
    pub(crate) const UNK_CHAR: char = '.';

    // Header line of every written file.
    pub(crate) const GFF3_HEADER: &str = "##gff-version 3";

    // Directive after which a GFF3 file carries sequences instead of features.
    pub(crate) const FASTA_DIRECTIVE: &str = "##FASTA";

    // Source written when the source column is rewritten.
    pub const WORMBASE_SOURCE: &str = "WormBase_imported";

    // Value for optionally known strings.
    pub(crate) const DEF_ID: &str = "<unknown>";
}

pub use crate::consts::WORMBASE_SOURCE as DEFAULT_SOURCE;

// Generic utilities
mod utils {
    use bio_types::strand::Strand;

    /// Removes each of the given prefixes, in order, from the start of the value.
    #[inline]
    pub(crate) fn lstrip_all<S: AsRef<str>>(value: &mut String, prefixes: &[S]) {
        for prefix in prefixes {
            let prefix = prefix.as_ref();
            if !prefix.is_empty() && value.starts_with(prefix) {
                let _ = value.drain(..prefix.len());
            }
        }
    }

    /// Character for the given strand, as written in the strand column.
    #[inline]
    pub(crate) fn strand_to_char(strand: &Strand) -> char {
        match strand {
            Strand::Forward => '+',
            Strand::Reverse => '-',
            Strand::Unknown => super::consts::UNK_CHAR,
        }
    }

}
