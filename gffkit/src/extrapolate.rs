//! Synthesis of missing structural features for a single scaffold.
//!
//! All extrapolations work on a model that has not been finalized yet, so that synthesized
//! features pass through the same child resolution and ordering as parsed ones.
use std::collections::HashMap;

use crate::classify::FeatureRole;
use crate::consts::{CDS_STR, EXON_STR, GENE_STR, GENE_SUFFIX, MRNA_STR, MRNA_SUFFIX};
use crate::model::AnnotationModel;
use crate::record::{Attributes, Record, RecordBuilder};
use crate::Error;


impl AnnotationModel {

    /// Builds a transcript and exons for every gene on the given scaffold.
    ///
    /// Each gene `G` receives an mRNA `G_mRNA` spanning the gene. CDS segments on the scaffold
    /// that name `G` as their parent are moved to `G_mRNA`, and every CDS segment on the scaffold
    /// gets a copy of itself as an exon `T-N`, where `T` is its transcript and `N` counts from 1.
    /// CDS groups without parents become exons of the transcript they will be resolved into.
    /// Features on other scaffolds are not changed.
    ///
    /// Returns the number of synthesized transcripts and exons.
    pub fn extrapolate_transcripts(&mut self, scaffold: &str) -> crate::Result<(usize, usize)> {
        if self.is_finalized() {
            return Err(Error::ModelFinalized);
        }
        let gene_records: Vec<_> = self.genes.values()
            .filter_map(|gene| gene.record.as_ref())
            .filter(|rec| rec.scaffold() == scaffold)
            .cloned()
            .collect();
        if gene_records.is_empty() {
            return Err(Error::NoGenesOnScaffold(scaffold.to_owned()));
        }

        for gene_rec in gene_records.iter() {
            let gid = gene_rec.key().unwrap_or_default().to_owned();
            let tid = format!("{}{}", gid, MRNA_SUFFIX);
            let transcript = RecordBuilder::from_template(gene_rec, MRNA_STR,
                                                          FeatureRole::Transcript)
                .id(tid.as_str())
                .name(tid.as_str())
                .parent(gid.as_str())
                .build()?;
            self.add_transcript(transcript)?;

            if let Some(segments) = self.pending_cds.remove(&gid) {
                for mut seg in segments {
                    if seg.scaffold() == scaffold {
                        seg.parents = vec![tid.clone()];
                        self.pending_cds.insert(tid.clone(), seg);
                    } else {
                        self.pending_cds.insert(gid.clone(), seg);
                    }
                }
            }
        }

        let num_exons = self.exons_from_cds(scaffold)?;

        info!("extrapolated {} transcript(s) and {} exon(s) on scaffold '{}'",
              gene_records.len(), num_exons, scaffold);
        Ok((gene_records.len(), num_exons))
    }

    /// Builds an exon `T-N` for every CDS segment on the given scaffold.
    ///
    /// Exons share the parent transcript `T` of their CDS segment; `N` counts from 1 per
    /// transcript. Returns the number of synthesized exons.
    pub fn extrapolate_exons(&mut self, scaffold: &str) -> crate::Result<usize> {
        if self.is_finalized() {
            return Err(Error::ModelFinalized);
        }
        let num_exons = self.exons_from_cds(scaffold)?;
        if num_exons == 0 {
            warn!("no CDS on scaffold '{}' to extrapolate exons from", scaffold);
        }
        info!("extrapolated {} exon(s) on scaffold '{}'", num_exons, scaffold);
        Ok(num_exons)
    }

    /// Builds a CDS segment `T-N` for every exon on the given scaffold.
    ///
    /// Segments share the parent transcript `T` of their exon; `N` counts from 1 per transcript.
    /// Returns the number of synthesized segments.
    pub fn extrapolate_cds(&mut self, scaffold: &str) -> crate::Result<usize> {
        if self.is_finalized() {
            return Err(Error::ModelFinalized);
        }
        let sources = self.pending_exons.iter_all()
            .map(|(parent, exons)| (parent, exons.as_slice()));
        let segments = copies_on_scaffold(sources, scaffold, CDS_STR, FeatureRole::Cds)?;
        let num_segments = segments.len();
        for (parent, seg) in segments {
            self.pending_cds.insert(parent, seg);
        }
        if num_segments == 0 {
            warn!("no exons on scaffold '{}' to extrapolate CDS from", scaffold);
        }
        info!("extrapolated {} CDS segment(s) on scaffold '{}'", num_segments, scaffold);
        Ok(num_segments)
    }

    /// Adds an exon for every parented or parentless CDS segment on the scaffold.
    fn exons_from_cds(&mut self, scaffold: &str) -> crate::Result<usize> {
        let sources = self.pending_cds.iter_all()
            .chain(self.parentless_cds.iter())
            .map(|(parent, segments)| (parent, segments.as_slice()));
        let exons = copies_on_scaffold(sources, scaffold, EXON_STR, FeatureRole::Exon)?;
        let num_exons = exons.len();
        for (parent, exon) in exons {
            self.pending_exons.insert(parent, exon);
        }
        Ok(num_exons)
    }

    /// Builds a gene for every transcript on the given scaffold.
    ///
    /// Each transcript `T` is moved under a new gene `T_gene` spanning the transcript.
    /// Placeholder genes left without transcripts are dropped. Features on other scaffolds are
    /// not changed.
    ///
    /// Returns the number of synthesized genes.
    pub fn extrapolate_genes(&mut self, scaffold: &str) -> crate::Result<usize> {
        if self.is_finalized() {
            return Err(Error::ModelFinalized);
        }
        let tids: Vec<String> = self.transcripts.values()
            .filter(|trx| trx.scaffold() == scaffold)
            .map(|trx| trx.id().to_owned())
            .collect();
        if tids.is_empty() {
            return Err(Error::NoTranscriptsOnScaffold(scaffold.to_owned()));
        }

        for tid in tids.iter() {
            let gid = format!("{}{}", tid, GENE_SUFFIX);
            let (old_gid, gene) = match self.transcripts.get_mut(tid) {
                Some(trx) => {
                    let gene = RecordBuilder::from_template(&trx.record, GENE_STR,
                                                            FeatureRole::Gene)
                        .attributes(Attributes::new())
                        .id(gid.as_str())
                        .name(gid.as_str())
                        .build()?;
                    trx.record.parents = vec![gid.clone()];
                    let old_gid = std::mem::replace(&mut trx.gene_id, gid.clone());
                    (old_gid, gene)
                },
                None => continue,
            };
            self.detach_transcript(&old_gid, tid);
            self.add_gene(gene)?;
            self.register_child(&gid, tid);
        }

        info!("extrapolated {} gene(s) on scaffold '{}'", tids.len(), scaffold);
        Ok(tids.len())
    }
}

/// Copies the records on a scaffold as features of another type, keyed by parent.
///
/// Copies are identified `P-N` after their parent `P` and carry no phase.
fn copies_on_scaffold<'a, I>(
    sources: I,
    scaffold: &str,
    feature_type: &str,
    role: FeatureRole,
) -> crate::Result<Vec<(String, Record)>>
    where I: Iterator<Item=(&'a String, &'a [Record])>
{
    let mut ordinals: HashMap<&str, usize> = HashMap::new();
    let mut copies = Vec::new();
    for (parent, records) in sources {
        for rec in records.iter().filter(|rec| rec.scaffold() == scaffold) {
            let ordinal = ordinals.entry(parent.as_str()).or_insert(0);
            *ordinal += 1;
            let cid = format!("{}-{}", parent, ordinal);
            let copy = RecordBuilder::from_template(rec, feature_type, role)
                .id(cid.as_str())
                .name(cid.as_str())
                .parent(parent.as_str())
                .build()?;
            copies.push((parent.clone(), copy));
        }
    }
    Ok(copies)
}

#[cfg(test)]
mod tests {
    use crate::classify::TypeAliases;
    use crate::model::{AnnotationModel, CdsGrouping};
    use crate::record::Record;
    use crate::Error;

    fn model(lines: &[&str]) -> AnnotationModel {
        grouped_model(CdsGrouping::Parented, lines)
    }

    fn grouped_model(grouping: CdsGrouping, lines: &[&str]) -> AnnotationModel {
        let aliases = TypeAliases::default();
        let mut model = AnnotationModel::new(grouping);
        for (idx, line) in lines.iter().enumerate() {
            if let Some(rec) = Record::from_line(idx + 1, line, &aliases).unwrap() {
                model.add(rec).unwrap();
            }
        }
        model
    }

    #[test]
    fn transcripts_for_scaffold() {
        let mut m = model(&[
            "chrM\ts\tgene\t1\t90\t.\t+\t.\tID=g1;Name=nd1",
            "chrM\ts\tCDS\t1\t30\t.\t+\t0\tID=c1;Parent=g1",
            "chrM\ts\tCDS\t40\t90\t.\t+\t0\tID=c2;Parent=g1",
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g2",
            "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=t2;Parent=g2",
        ]);
        assert_eq!(m.extrapolate_transcripts("chrM").unwrap(), (1, 2));
        m.finalize().unwrap();

        let trx = m.transcript("g1_mRNA").expect("a synthesized transcript");
        assert_eq!(trx.gene_id(), "g1");
        assert_eq!(trx.record().name(), Some("g1_mRNA"));
        assert_eq!((trx.record().start(), trx.record().end()), (1, 90));
        let exons: Vec<_> = trx.exons().iter().map(|e| e.id().unwrap()).collect();
        assert_eq!(exons, vec!["g1_mRNA-1", "g1_mRNA-2"]);
        assert_eq!(trx.exons()[1].start(), 40);
        assert_eq!(trx.exons()[1].phase(), None);
        assert_eq!(trx.cds().len(), 2);
        assert_eq!(trx.cds()[0].parents(), &["g1_mRNA".to_owned()]);

        let untouched = m.transcript("t2").unwrap();
        assert_eq!(untouched.exons().len(), 0);
        assert!(m.transcript("g2_mRNA").is_none());
    }

    #[test]
    fn transcripts_for_empty_scaffold() {
        let mut m = model(&["chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1"]);
        match m.extrapolate_transcripts("chrM") {
            Err(Error::NoGenesOnScaffold(name)) => assert_eq!(name, "chrM"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn genes_for_scaffold() {
        let mut m = model(&[
            "chrM\ts\tmRNA\t5\t90\t.\t-\t.\tID=t1;Parent=x",
            "chrM\ts\texon\t5\t90\t.\t-\t.\tID=e1;Parent=t1",
            "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=t2;Parent=g2",
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g2",
        ]);
        assert_eq!(m.extrapolate_genes("chrM").unwrap(), 1);
        m.finalize().unwrap();

        assert!(m.gene("x").is_none());
        let gene = m.gene("t1_gene").expect("a synthesized gene");
        let rec = gene.record().unwrap();
        assert_eq!((rec.start(), rec.end()), (5, 90));
        assert_eq!(gene.transcript_ids(), &["t1".to_owned()]);
        assert_eq!(m.transcript("t1").unwrap().record().parents(), &["t1_gene".to_owned()]);
        assert_eq!(m.gene("g2").unwrap().transcript_ids(), &["t2".to_owned()]);
    }

    #[test]
    fn transcripts_for_parentless_scaffold() {
        let mut m = grouped_model(CdsGrouping::Parentless, &[
            "chrM\ts\tgene\t1\t300\t.\t+\t.\tID=g1",
            "chrM\ts\tCDS\t1\t90\t.\t+\t0\tID=c1",
            "chrM\ts\tCDS\t200\t300\t.\t+\t0\tID=c1",
        ]);
        assert_eq!(m.extrapolate_transcripts("chrM").unwrap(), (1, 2));
        m.finalize().unwrap();

        let trx = m.transcript("c1").expect("a transcript resolved from CDS");
        let exons: Vec<_> = trx.exons().iter().map(|e| e.id().unwrap()).collect();
        assert_eq!(exons, vec!["c1-1", "c1-2"]);
        assert_eq!(trx.cds().len(), 2);
    }

    #[test]
    fn exons_for_scaffold() {
        let mut m = model(&[
            "chrM\ts\tgene\t1\t90\t.\t+\t.\tID=g1",
            "chrM\ts\tmRNA\t1\t90\t.\t+\t.\tID=t1;Parent=g1",
            "chrM\ts\tCDS\t1\t30\t.\t+\t0\tID=c1;Parent=t1",
            "chrM\ts\tCDS\t40\t90\t.\t+\t2\tID=c2;Parent=t1",
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g2",
            "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=t2;Parent=g2",
            "chr1\ts\tCDS\t1\t90\t.\t+\t0\tID=c3;Parent=t2",
        ]);
        assert_eq!(m.extrapolate_exons("chrM").unwrap(), 2);
        m.finalize().unwrap();

        let trx = m.transcript("t1").unwrap();
        let exons: Vec<_> = trx.exons().iter()
            .map(|e| (e.id().unwrap(), e.start(), e.end(), e.phase()))
            .collect();
        assert_eq!(exons, vec![("t1-1", 1, 30, None), ("t1-2", 40, 90, None)]);
        assert_eq!(trx.exons()[0].name(), Some("t1-1"));
        assert!(m.transcript("t2").unwrap().exons().is_empty());
        assert_eq!(m.num_genes(), 2);
    }

    #[test]
    fn cds_for_scaffold() {
        let mut m = model(&[
            "chrM\ts\tgene\t1\t90\t.\t-\t.\tID=g1",
            "chrM\ts\tmRNA\t1\t90\t.\t-\t.\tID=t1;Parent=g1",
            "chrM\ts\texon\t1\t30\t.\t-\t.\tID=e1;Parent=t1",
            "chrM\ts\texon\t40\t90\t.\t-\t.\tID=e2;Parent=t1",
            "chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g2",
            "chr1\ts\tmRNA\t1\t90\t.\t+\t.\tID=t2;Parent=g2",
            "chr1\ts\texon\t1\t90\t.\t+\t.\tID=e3;Parent=t2",
        ]);
        assert_eq!(m.extrapolate_cds("chrM").unwrap(), 2);
        assert_eq!(m.extrapolate_cds("chrX").unwrap(), 0);
        m.finalize().unwrap();

        let trx = m.transcript("t1").unwrap();
        let cds: Vec<_> = trx.cds().iter()
            .map(|c| (c.id().unwrap(), c.start(), c.end(), c.feature_type()))
            .collect();
        assert_eq!(cds, vec![("t1-1", 1, 30, "CDS"), ("t1-2", 40, 90, "CDS")]);
        assert_eq!(trx.cds()[1].parents(), &["t1".to_owned()]);
        assert_eq!(trx.exons().len(), 2);
        assert!(m.transcript("t2").unwrap().cds().is_empty());
    }

    #[test]
    fn extrapolate_after_finalize() {
        let mut m = model(&["chr1\ts\tgene\t1\t90\t.\t+\t.\tID=g1"]);
        m.finalize().unwrap();
        assert!(m.extrapolate_genes("chr1").is_err());
        assert!(m.extrapolate_transcripts("chr1").is_err());
        assert!(m.extrapolate_exons("chr1").is_err());
        assert!(m.extrapolate_cds("chr1").is_err());
    }
}
