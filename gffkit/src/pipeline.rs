/*! The reformatting pipeline.

[`reconcile`] runs every in-memory stage on parsed records: column rewrites, identifier repair,
scaffold remapping, hierarchy building, extrapolation, splitting, and data checks.
[`reformat_file`] adds the file boundaries around it. Output is serialized in memory first and
only written once every stage has succeeded; all output files are then replaced together.
*/
use std::env;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::classify::TypeAliases;
use crate::datacheck::{self, DataCheckReport, DataChecks};
use crate::io_gff::{ParseMode, Reader, SortOrder, Writer, write_all_atomically, write_atomically};
use crate::model::{AnnotationModel, CdsGrouping};
use crate::normalize::{self, NameMode};
use crate::record::Record;
use crate::synonyms::Synonyms;
use crate::Error;


/// Path that stands for the standard input or output streams.
const STD_STREAM: &str = "-";

/// File name of the split-off genes, written next to the main output.
const EXTRACTED_FILE_NAME: &str = "extracted.gff3";

/// Missing structural features to synthesize for one scaffold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extrapolation {
    /// Transcripts and exons from genes and CDS segments.
    Transcripts(String),
    /// Genes from transcripts.
    Genes(String),
    /// Exons from CDS segments.
    Exons(String),
    /// CDS segments from exons.
    Cds(String),
}

/// Conditions on gene attributes, all of which must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeFilter {
    conditions: Vec<(String, String)>,
}

impl AttributeFilter {

    pub fn conditions(&self) -> &[(String, String)] {
        self.conditions.as_slice()
    }

    /// Whether the record satisfies every condition.
    pub fn matches(&self, record: &Record) -> bool {
        self.conditions.iter()
            .all(|(key, value)| record.attribute(key).as_deref() == Some(value.as_str()))
    }
}

impl FromStr for AttributeFilter {
    type Err = Error;

    /// Parses `key=value` conditions separated by `;`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidAttributeFilter(s.to_owned());
        let conditions = s.split(';')
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                let mut parts = segment.splitn(2, '=');
                match (parts.next(), parts.next()) {
                    (Some(key), Some(value)) if !key.is_empty() => {
                        Ok((key.to_owned(), value.to_owned()))
                    },
                    _ => Err(invalid()),
                }
            })
            .collect::<crate::Result<Vec<_>>>()?;
        if conditions.is_empty() {
            return Err(invalid());
        }
        Ok(AttributeFilter { conditions })
    }
}

/// Settings of one reformatting run.
///
/// The defaults leave every column as it is and run no data checks; the command line tool
/// turns the legacy rewrites on.
#[derive(Debug, Clone)]
pub struct ReformatOptions {
    pub parse_mode: ParseMode,
    pub aliases: TypeAliases,
    pub grouping: CdsGrouping,
    /// Replacement for the source column of every record.
    pub source: Option<String>,
    /// Whether scaffolds are renamed through a synonym table.
    pub remap_scaffolds: bool,
    /// Synonym table; looked up in the working directory when not set.
    pub synonyms_file: Option<PathBuf>,
    pub name_mode: Option<NameMode>,
    /// Literal prefix added to every ID, Name, and Parent reference.
    pub gene_prefix: Option<String>,
    /// Literal prefixes stripped from every text column.
    pub prefixes: Vec<String>,
    /// Literal prefixes stripped from Name attributes.
    pub name_prefixes: Vec<String>,
    /// Extrapolations, applied in order before the model is finalized.
    pub extrapolations: Vec<Extrapolation>,
    /// Genes moved into a separate output.
    pub split_on: Option<AttributeFilter>,
    pub checks: DataChecks,
    /// Whether model scaffolds are checked against the assembly.
    pub check_fasta: bool,
    /// Assembly FASTA; looked up in the working directory when not set.
    pub fasta: Option<PathBuf>,
    pub sort_order: SortOrder,
    pub keep_attributes: bool,
    /// Whether data check findings are written as ID lists next to the output.
    pub finding_lists: bool,
}

impl Default for ReformatOptions {
    fn default() -> ReformatOptions {
        ReformatOptions {
            parse_mode: ParseMode::default(),
            aliases: TypeAliases::default(),
            grouping: CdsGrouping::default(),
            source: None,
            remap_scaffolds: false,
            synonyms_file: None,
            name_mode: None,
            gene_prefix: None,
            prefixes: Vec::new(),
            name_prefixes: Vec::new(),
            extrapolations: Vec::new(),
            split_on: None,
            checks: DataChecks::default(),
            check_fasta: false,
            fasta: None,
            sort_order: SortOrder::default(),
            keep_attributes: false,
            finding_lists: false,
        }
    }
}

impl ReformatOptions {

    /// Serializes a model with the configured output settings.
    pub fn serialize(&self, model: &AnnotationModel) -> crate::Result<Vec<u8>> {
        let mut writer = Writer::from_memory();
        let _ = writer.sort_order(self.sort_order)
            .keep_attributes(self.keep_attributes)
            .write_model(model)?;
        writer.into_inner()
    }
}

/// Models produced by a run.
#[derive(Debug, Clone)]
pub struct Reformatted {
    pub main: AnnotationModel,
    /// Genes split off by the attribute filter, if one was set.
    pub extracted: Option<AnnotationModel>,
    /// Data check findings on the main model.
    pub report: DataCheckReport,
    /// Data check findings on the split-off genes.
    pub extracted_report: Option<DataCheckReport>,
}

/// Runs every in-memory stage on parsed records.
///
/// `synonyms` is required when scaffold remapping is on.
pub fn reconcile(
    mut records: Vec<Record>,
    options: &ReformatOptions,
    synonyms: Option<&Synonyms>,
) -> crate::Result<Reformatted> {

    if let Some(ref source) = options.source {
        info!("setting the source of every record to '{}'", source);
        normalize::rename_source(&mut records, source);
    }

    let renamed = normalize::make_ids_unique(&mut records, options.grouping);
    if renamed > 0 {
        info!("made {} duplicate ID(s) unique", renamed);
    }

    if let Some(mode) = options.name_mode {
        let named = normalize::infer_names(&mut records, mode);
        info!("set {} Name attribute(s) from IDs", named);
    }

    if let Some(ref prefix) = options.gene_prefix {
        info!("adding prefix '{}' to IDs and Names", prefix);
        normalize::add_id_prefix(&mut records, prefix);
    }

    if options.remap_scaffolds {
        match synonyms {
            Some(synonyms) => {
                info!("renaming scaffolds using {} synonym(s)", synonyms.len());
                synonyms.remap(&mut records)?;
            },
            None => {
                let first = records.first().map(|rec| rec.scaffold().to_owned());
                if let Some(name) = first {
                    return Err(Error::UnmappedScaffold(name));
                }
            },
        }
    }

    if !options.prefixes.is_empty() {
        info!("removing prefixes {:?} from every column", options.prefixes);
        normalize::strip_prefixes(&mut records, &options.prefixes);
    }
    if !options.name_prefixes.is_empty() {
        info!("removing prefixes {:?} from Names", options.name_prefixes);
        normalize::strip_name_prefixes(&mut records, &options.name_prefixes);
    }

    let mut model = AnnotationModel::with_aliases(options.grouping, options.aliases.clone());
    model.extend(records)?;

    for extrapolation in options.extrapolations.iter() {
        match *extrapolation {
            Extrapolation::Transcripts(ref scaffold) => {
                let _ = model.extrapolate_transcripts(scaffold)?;
            },
            Extrapolation::Genes(ref scaffold) => {
                let _ = model.extrapolate_genes(scaffold)?;
            },
            Extrapolation::Exons(ref scaffold) => {
                let _ = model.extrapolate_exons(scaffold)?;
            },
            Extrapolation::Cds(ref scaffold) => {
                let _ = model.extrapolate_cds(scaffold)?;
            },
        }
    }

    model.finalize()?;

    let mut extracted = match options.split_on {
        Some(ref filter) => Some(split_genes(&mut model, filter)),
        None => None,
    };

    let extracted_report = match extracted {
        Some(ref mut extracted) => {
            info!("running data checks on the extracted genes");
            Some(options.checks.run(extracted)?)
        },
        None => None,
    };
    let report = options.checks.run(&mut model)?;

    Ok(Reformatted { main: model, extracted, report, extracted_report })
}

/// Moves genes matching the filter, with their transcripts, into a new model.
fn split_genes(model: &mut AnnotationModel, filter: &AttributeFilter) -> AnnotationModel {
    let matching: Vec<String> = model.genes()
        .filter(|gene| gene.record().map_or(false, |rec| filter.matches(rec)))
        .map(|gene| gene.id().to_owned())
        .collect();

    let mut extracted = model.empty_like();
    for gid in matching.iter() {
        if let Some((gene, transcripts)) = model.remove_gene(gid) {
            extracted.insert_gene(gene, transcripts);
        }
    }
    info!("split off {} gene(s) matching the attribute filter", matching.len());
    extracted
}

fn is_std_stream(path: &Path) -> bool {
    path == Path::new(STD_STREAM)
}

/// Reads, reconciles, checks, and writes one annotation file.
///
/// A path of `-` stands for standard input or output. Split-off genes go to `extracted.gff3`
/// in the directory of the output, and so do the finding lists when they are enabled; lists
/// of the split-off genes are prefixed with `extracted_`. Nothing is written unless every
/// stage succeeds, except the list of scaffolds missing from the assembly.
pub fn reformat_file<P, Q>(input: P, output: Q, options: &ReformatOptions) -> crate::Result<Reformatted>
    where P: AsRef<Path>, Q: AsRef<Path>
{
    let (input, output) = (input.as_ref(), output.as_ref());

    let records = if is_std_stream(input) {
        info!("reading records from standard input");
        read_records(Reader::from_reader(io::stdin()), options)?
    } else {
        info!("reading records from {}", input.display());
        read_records(Reader::from_file(input)?, options)?
    };

    let synonyms = if options.remap_scaffolds {
        let path = match options.synonyms_file {
            Some(ref path) => path.clone(),
            None => Synonyms::find_in_current_dir()?,
        };
        info!("reading scaffold synonyms from {}", path.display());
        Some(Synonyms::from_file(path)?)
    } else {
        None
    };

    let result = reconcile(records, options, synonyms.as_ref())?;

    let mut lists = Vec::new();
    if options.check_fasta {
        lists.extend(check_fasta(&result, options, output)?);
    }

    let main_bytes = options.serialize(&result.main)?;
    let mut files: Vec<(PathBuf, Vec<u8>)> = Vec::new();
    if let Some(ref extracted) = result.extracted {
        files.push((extracted_path(output), options.serialize(extracted)?));
    }
    if options.finding_lists {
        if let Some(ref report) = result.extracted_report {
            lists.extend(report.lists(datacheck::EXTRACTED_LIST_PREFIX));
        }
        lists.extend(result.report.lists(""));
        files.extend(lists.into_iter().map(|(name, contents)| (side_path(output, &name), contents)));
    }
    let stdout_bytes = if is_std_stream(output) {
        Some(main_bytes)
    } else {
        files.push((output.to_path_buf(), main_bytes));
        None
    };

    let staged: Vec<(&Path, &[u8])> = files.iter()
        .map(|&(ref path, ref contents)| (path.as_path(), contents.as_slice()))
        .collect();
    write_all_atomically(&staged)?;
    for &(ref path, _) in files.iter() {
        info!("wrote {}", path.display());
    }

    if let Some(bytes) = stdout_bytes {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle.write_all(&bytes)?;
        handle.flush()?;
    }

    Ok(result)
}

fn read_records<R: io::Read>(mut reader: Reader<R>, options: &ReformatOptions) -> crate::Result<Vec<Record>> {
    reader.aliases(options.aliases.clone())
        .mode(options.parse_mode)
        .read_records()
}

/// Checks model scaffolds against the assembly and returns the finding lists to write.
///
/// The list of scaffolds missing from the assembly is written before the error is returned.
fn check_fasta(result: &Reformatted, options: &ReformatOptions, output: &Path)
    -> crate::Result<Vec<(String, Vec<u8>)>>
{
    let path = match options.fasta {
        Some(ref path) => Some(path.clone()),
        None => datacheck::find_fasta_in_dir(env::current_dir()?)?,
    };
    let path = match path {
        Some(path) => path,
        None => {
            warn!("no FASTA file found, skipping the scaffold check");
            return Ok(Vec::new());
        },
    };
    info!("checking scaffolds against {}", path.display());
    let names = datacheck::fasta_scaffold_names(&path)?;

    let mut checked = vec![("", &result.main)];
    if let Some(ref extracted) = result.extracted {
        checked.push((datacheck::EXTRACTED_LIST_PREFIX, extracted));
    }
    let mut lists = Vec::new();
    for (prefix, model) in checked {
        match DataChecks::check_scaffolds(model, &names) {
            Ok(unused) => {
                lists.extend(datacheck::finding_list(prefix, datacheck::NOT_IN_GFF_LIST, &unused));
            },
            Err(Error::ScaffoldsNotInFasta(missing)) => {
                if options.finding_lists {
                    let list = datacheck::finding_list(prefix, datacheck::NOT_IN_FASTA_LIST, &missing);
                    if let Some((name, contents)) = list {
                        write_atomically(side_path(output, &name), &contents)?;
                    }
                }
                return Err(Error::ScaffoldsNotInFasta(missing));
            },
            Err(e) => return Err(e),
        }
    }
    Ok(lists)
}

/// Path of a file written next to the output.
fn side_path(output: &Path, file_name: &str) -> PathBuf {
    match output.parent() {
        Some(dir) if !is_std_stream(output) => dir.join(file_name),
        _ => PathBuf::from(file_name),
    }
}

fn extracted_path(output: &Path) -> PathBuf {
    side_path(output, EXTRACTED_FILE_NAME)
}
