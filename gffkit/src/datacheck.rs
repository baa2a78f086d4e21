/*! Consistency checks run on a finalized model.

Every check looks at the model as it was handed over, so a transcript fixed by one check is
still reported by the others. Findings are logged and can be written out as lists of IDs, one
per line; only missing gene names and scaffolds absent from the assembly stop the run.
*/
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use bio::io::fasta;
use itertools::Itertools;

use crate::classify::TypeAliases;
use crate::consts::NONTRANSLATING_TRANSCRIPT_STR;
use crate::model::{AnnotationModel, Transcript};
use crate::Error;


/// Extension of assembly files looked up in a directory.
const FASTA_EXTENSION: &str = "fa";

/// Prefix of the finding lists of split-off genes.
pub(crate) const EXTRACTED_LIST_PREFIX: &str = "extracted_";

// File names of the finding lists.
const CDS_WITHOUT_EXONS_LIST: &str = "cds_not_exons_transcripts.txt";
const CDS_OUTSIDE_EXONS_LIST: &str = "cds_not_within_exons_transcripts.txt";
const CODING_WITHOUT_CDS_LIST: &str = "without_CDS_transcripts.txt";
pub(crate) const NOT_IN_FASTA_LIST: &str = "in_GFF_not_in_FASTA_scaffolds.txt";
pub(crate) const NOT_IN_GFF_LIST: &str = "in_FASTA_not_in_GFF_scaffolds.txt";

/// Whether a fixable check runs, and whether it repairs what it finds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckMode {
    Off,
    Report,
    Fix,
}

impl CheckMode {

    fn enabled(self) -> bool {
        self != CheckMode::Off
    }

    fn fixes(self) -> bool {
        self == CheckMode::Fix
    }
}

/// Selection of data checks.
///
/// The default selection runs nothing; [`DataChecks::all`] runs and fixes everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataChecks {
    /// Every gene must carry a Name attribute.
    pub gene_names: bool,
    /// Coding transcripts with CDS segments but no exons.
    pub cds_without_exons: CheckMode,
    /// Coding transcripts whose CDS span reaches past their exon span.
    pub cds_outside_exons: CheckMode,
    /// Coding transcripts without CDS segments.
    pub coding_without_cds: CheckMode,
}

impl Default for DataChecks {
    fn default() -> DataChecks {
        DataChecks {
            gene_names: false,
            cds_without_exons: CheckMode::Off,
            cds_outside_exons: CheckMode::Off,
            coding_without_cds: CheckMode::Off,
        }
    }
}

/// Transcripts found by each check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataCheckReport {
    pub cds_without_exons: Vec<String>,
    pub cds_outside_exons: Vec<String>,
    pub coding_without_cds: Vec<String>,
    /// Number of transcripts retyped as non-translating.
    pub num_fixed: usize,
}

impl DataCheckReport {

    pub fn is_clean(&self) -> bool {
        self.cds_without_exons.is_empty()
            && self.cds_outside_exons.is_empty()
            && self.coding_without_cds.is_empty()
    }

    /// File names and contents of the non-empty transcript lists, each name led by `prefix`.
    pub fn lists(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        vec![
            finding_list(prefix, CDS_WITHOUT_EXONS_LIST, &self.cds_without_exons),
            finding_list(prefix, CDS_OUTSIDE_EXONS_LIST, &self.cds_outside_exons),
            finding_list(prefix, CODING_WITHOUT_CDS_LIST, &self.coding_without_cds),
        ].into_iter()
            .flatten()
            .collect()
    }
}

/// One ID per line under `<prefix><name>`, or nothing for an empty list.
pub(crate) fn finding_list(prefix: &str, name: &str, ids: &[String]) -> Option<(String, Vec<u8>)> {
    if ids.is_empty() {
        return None;
    }
    let mut contents = ids.join("\n");
    contents.push('\n');
    Some((format!("{}{}", prefix, name), contents.into_bytes()))
}

impl DataChecks {

    /// Runs and fixes every check.
    pub fn all() -> DataChecks {
        DataChecks {
            gene_names: true,
            cds_without_exons: CheckMode::Fix,
            cds_outside_exons: CheckMode::Fix,
            coding_without_cds: CheckMode::Fix,
        }
    }

    /// Runs the selected checks, applying fixes to the model.
    pub fn run(&self, model: &mut AnnotationModel) -> crate::Result<DataCheckReport> {
        if self.gene_names {
            check_gene_names(model)?;
        }

        let mut report = DataCheckReport::default();
        for trx in model.transcripts().filter(|trx| is_coding(trx)) {
            if self.cds_without_exons.enabled() && !trx.cds().is_empty() && trx.exons().is_empty() {
                report.cds_without_exons.push(trx.id().to_owned());
            }
            if self.cds_outside_exons.enabled() && cds_outside_exons(trx) {
                report.cds_outside_exons.push(trx.id().to_owned());
            }
            if self.coding_without_cds.enabled() && trx.cds().is_empty() {
                report.coding_without_cds.push(trx.id().to_owned());
            }
        }

        log_findings("have CDS but no exons", &report.cds_without_exons);
        log_findings("have CDS outside of their exon boundaries", &report.cds_outside_exons);
        log_findings("are coding but have no CDS", &report.coding_without_cds);

        let mut fixed = HashSet::new();
        let fixes = [
            (self.cds_without_exons, &report.cds_without_exons, true),
            (self.cds_outside_exons, &report.cds_outside_exons, true),
            (self.coding_without_cds, &report.coding_without_cds, false),
        ];
        for &(mode, tids, drop_cds) in fixes.iter() {
            if !mode.fixes() {
                continue;
            }
            for tid in tids.iter() {
                if let Some(trx) = model.transcripts.get_mut(tid) {
                    trx.type_override = Some(NONTRANSLATING_TRANSCRIPT_STR);
                    if drop_cds {
                        trx.cds.clear();
                    }
                    let _ = fixed.insert(tid.clone());
                }
            }
        }
        report.num_fixed = fixed.len();
        if report.num_fixed > 0 {
            info!("changed the type of {} transcript(s) to '{}'",
                  report.num_fixed, NONTRANSLATING_TRANSCRIPT_STR);
        }
        Ok(report)
    }

    /// Compares the scaffolds of the model with those of the assembly.
    ///
    /// Scaffolds used by the model but missing from the assembly are an error. Assembly
    /// scaffolds without features are returned and logged.
    pub fn check_scaffolds<S>(model: &AnnotationModel, fasta_names: &[S]) -> crate::Result<Vec<String>>
        where S: AsRef<str>
    {
        let model_names = model_scaffolds(model);
        let fasta_set: HashSet<&str> = fasta_names.iter().map(|n| n.as_ref()).collect();
        let model_set: HashSet<&str> = model_names.iter().map(|n| n.as_str()).collect();

        let missing: Vec<String> = model_names.iter()
            .filter(|name| !fasta_set.contains(name.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::ScaffoldsNotInFasta(missing));
        }

        let unused: Vec<String> = fasta_names.iter()
            .map(|n| n.as_ref())
            .filter(|name| !model_set.contains(name))
            .map(|name| name.to_owned())
            .collect();
        if !unused.is_empty() {
            warn!("{} scaffold(s) of the assembly have no features: {}",
                  unused.len(), unused.iter().join(", "));
        }
        Ok(unused)
    }
}

/// Scaffold names of every record in the model, in first-seen order.
pub(crate) fn model_scaffolds(model: &AnnotationModel) -> Vec<String> {
    let genes = model.genes()
        .filter_map(|gene| gene.record())
        .map(|rec| rec.scaffold());
    let transcripts = model.transcripts()
        .flat_map(|trx| {
            Some(trx.record()).into_iter()
                .chain(trx.exons().iter())
                .chain(trx.cds().iter())
        })
        .map(|rec| rec.scaffold());
    genes.chain(transcripts)
        .unique()
        .map(|name| name.to_owned())
        .collect()
}

/// Reads the sequence names of a FASTA file.
pub fn fasta_scaffold_names<P: AsRef<Path>>(path: P) -> crate::Result<Vec<String>> {
    let reader = fasta::Reader::new(fs::File::open(path)?);
    let mut names = Vec::new();
    for record in reader.records() {
        names.push(record?.id().to_owned());
    }
    Ok(names)
}

/// Finds the assembly FASTA (`*.fa`) in the given directory.
///
/// With several candidates the first one by name is used.
pub(crate) fn find_fasta_in_dir<P: AsRef<Path>>(dir: P) -> crate::Result<Option<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == FASTA_EXTENSION) {
            found.push(path);
        }
    }
    found.sort();
    if found.len() > 1 {
        warn!("found {} FASTA files, using {}", found.len(), found[0].display());
    }
    Ok(found.into_iter().next())
}

fn check_gene_names(model: &AnnotationModel) -> crate::Result<()> {
    let unnamed: Vec<String> = model.genes()
        .filter(|gene| gene.record().map_or(true, |rec| rec.name().is_none()))
        .map(|gene| gene.id().to_owned())
        .collect();
    if unnamed.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingGeneName(unnamed))
    }
}

fn is_coding(trx: &Transcript) -> bool {
    TypeAliases::is_coding_transcript(trx.output_type())
}

fn cds_outside_exons(trx: &Transcript) -> bool {
    let span = |recs: &[crate::Record]| {
        recs.iter().map(|rec| (rec.start(), rec.end()))
            .reduce(|a, b| (a.0.min(b.0), a.1.max(b.1)))
    };
    match (span(trx.exons()), span(trx.cds())) {
        (Some(exons), Some(cds)) => cds.0 < exons.0 || cds.1 > exons.1,
        _ => false,
    }
}

fn log_findings(what: &str, tids: &[String]) {
    if !tids.is_empty() {
        warn!("{} transcript(s) {}: {}", tids.len(), what, tids.iter().join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CdsGrouping;
    use crate::record::Record;

    fn model(lines: &[&str]) -> AnnotationModel {
        let aliases = TypeAliases::default();
        let recs = lines.iter()
            .enumerate()
            .filter_map(|(idx, line)| Record::from_line(idx + 1, line, &aliases).unwrap());
        AnnotationModel::from_records(recs, CdsGrouping::Parented).unwrap()
    }

    static CODING: [&str; 10] = [
        "chr1\ts\tgene\t1\t900\t.\t+\t.\tID=g1;Name=g1",
        "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=ok;Parent=g1",
        "chr1\ts\texon\t1\t90\t.\t+\t.\tParent=ok",
        "chr1\ts\tCDS\t10\t80\t.\t+\t0\tParent=ok",
        "chr1\ts\tmRNA\t100\t190\t.\t+\t.\tID=noexon;Parent=g1",
        "chr1\ts\tCDS\t110\t180\t.\t+\t0\tParent=noexon",
        "chr1\ts\tmRNA\t200\t290\t.\t+\t.\tID=outside;Parent=g1",
        "chr1\ts\texon\t210\t250\t.\t+\t.\tParent=outside",
        "chr1\ts\tCDS\t200\t240\t.\t+\t0\tParent=outside",
        "chr1\ts\tmRNA\t300\t390\t.\t+\t.\tID=nocds;Parent=g1",
    ];

    #[test]
    fn report_only() {
        let mut m = model(&CODING);
        let checks = DataChecks {
            gene_names: true,
            cds_without_exons: CheckMode::Report,
            cds_outside_exons: CheckMode::Report,
            coding_without_cds: CheckMode::Report,
        };
        let report = checks.run(&mut m).unwrap();
        assert_eq!(report.cds_without_exons, vec!["noexon"]);
        assert_eq!(report.cds_outside_exons, vec!["outside"]);
        assert_eq!(report.coding_without_cds, vec!["nocds"]);
        assert_eq!(report.num_fixed, 0);
        assert!(!report.is_clean());
        assert_eq!(m.transcript("noexon").unwrap().output_type(), "mRNA");
    }

    #[test]
    fn report_lists() {
        let report = DataCheckReport {
            cds_without_exons: vec!["t1".to_owned(), "t2".to_owned()],
            coding_without_cds: vec!["t3".to_owned()],
            ..Default::default()
        };
        let lists = report.lists("extracted_");
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].0, "extracted_cds_not_exons_transcripts.txt");
        assert_eq!(lists[0].1, b"t1\nt2\n".to_vec());
        assert_eq!(lists[1].0, "extracted_without_CDS_transcripts.txt");
        assert!(DataCheckReport::default().lists("").is_empty());
    }

    #[test]
    fn fix_all() {
        let mut m = model(&CODING);
        let report = DataChecks::all().run(&mut m).unwrap();
        assert_eq!(report.num_fixed, 3);
        for tid in &["noexon", "outside", "nocds"] {
            assert_eq!(m.transcript(tid).unwrap().output_type(), "nontranslating_transcript");
        }
        assert!(m.transcript("noexon").unwrap().cds().is_empty());
        assert!(m.transcript("outside").unwrap().cds().is_empty());
        assert_eq!(m.transcript("ok").unwrap().output_type(), "mRNA");
        assert_eq!(m.transcript("ok").unwrap().cds().len(), 1);
    }

    #[test]
    fn pseudogenic_transcripts_skipped() {
        let mut m = model(&[
            "chr1\ts\tpseudogene\t1\t90\t.\t+\t.\tID=p1;Name=p1",
            "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=t1;Parent=p1",
        ]);
        let report = DataChecks::all().run(&mut m).unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn gene_names_required() {
        let mut m = model(&[
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1;Name=a",
            "chr1\ts\tgene\t100\t190\t.\t+\t.\tID=g2",
        ]);
        match DataChecks::all().run(&mut m) {
            Err(Error::MissingGeneName(ids)) => assert_eq!(ids, vec!["g2"]),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(DataChecks::default().run(&mut m).is_ok());
    }

    #[test]
    fn scaffold_match() {
        let m = model(&[
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1",
            "chr2\ts\tgene\t1\t90\t.\t+\t.\tID=g2",
        ]);
        let unused = DataChecks::check_scaffolds(&m, &["chr2", "chr1", "chrM"]).unwrap();
        assert_eq!(unused, vec!["chrM"]);
        match DataChecks::check_scaffolds(&m, &["chr1"]) {
            Err(Error::ScaffoldsNotInFasta(names)) => assert_eq!(names, vec!["chr2"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
